//! Configuration: CLI flags (via [`clap`]) layered over an optional TOML
//! file, with environment-variable overrides for every field — the same
//! three-source layering `blaze.go`'s `--rpcProvider`/config-file/env
//! handling does, made explicit with `clap(env)`.

use std::path::{Path, PathBuf};

use clap::parser::ValueSource;
use clap::{ArgMatches, CommandFactory, FromArgMatches, Parser};
use serde::Deserialize;

use crate::error::IndexError;

/// Runtime configuration for the indexer. Every field has a `clap` flag and
/// environment variable; [`Config::load`] additionally layers a TOML file
/// underneath the CLI/env values when `--config` points at one.
#[derive(Parser, Debug, Clone)]
#[command(version, about, long_about = None)]
pub struct Config {
    /// JSON-RPC HTTP endpoint of an archive node with `trace_block` enabled.
    #[arg(long, env = "CHIFRA_RPC_PROVIDER")]
    pub rpc_provider: String,

    /// Chain name, used only for logging and the config file's `[chains.*]`
    /// section lookup.
    #[arg(long, env = "CHIFRA_CHAIN", default_value = "mainnet")]
    pub chain: String,

    /// Root directory for `unripe/`, `ripe/`, `staging/`, `finalized/`, and
    /// `ts.bin`.
    #[arg(long, env = "CHIFRA_INDEX_ROOT", default_value = "./index")]
    pub index_root: PathBuf,

    /// Blocks behind the chain head still considered reorg-able; blocks at
    /// or below `head - unripe_dist` are written to `ripe/`.
    #[arg(long, env = "CHIFRA_UNRIPE_DIST", default_value_t = 28)]
    pub unripe_dist: u32,

    /// Worker count per pipeline stage.
    #[arg(long, env = "CHIFRA_N_CHANNELS", default_value_t = 4)]
    pub n_channels: usize,

    /// Blocks fetched per progression iteration.
    #[arg(long, env = "CHIFRA_BATCH_SIZE", default_value_t = 2000)]
    pub batch_size: u32,

    /// Seconds to sleep between progression iterations once caught up to
    /// the chain head.
    #[arg(long, env = "CHIFRA_SLEEP_SECS", default_value_t = 14)]
    pub sleep_secs: u64,

    /// Appearance count threshold that triggers consolidating a contiguous
    /// ripe run into a finalized chunk.
    #[arg(long, env = "CHIFRA_PER_CHUNK", default_value_t = 200_000)]
    pub appearances_per_chunk: usize,

    /// Optional TOML file providing defaults for any field not given on the
    /// command line or via environment variable.
    #[arg(long, env = "CHIFRA_CONFIG_FILE")]
    pub config_file: Option<PathBuf>,
}

/// Mirrors [`Config`]'s non-required fields for TOML deserialization; every
/// field is optional so a partial file only overrides what it names.
#[derive(Debug, Deserialize, Default)]
struct FileConfig {
    rpc_provider: Option<String>,
    chain: Option<String>,
    index_root: Option<PathBuf>,
    unripe_dist: Option<u32>,
    n_channels: Option<usize>,
    batch_size: Option<u32>,
    sleep_secs: Option<u64>,
    appearances_per_chunk: Option<usize>,
}

impl Config {
    /// Parses CLI/env arguments, then layers a TOML file's values in under
    /// anything left unset by either: CLI flags and environment variables
    /// both win over the file, since clap already resolved those two against
    /// each other before this runs and [`ArgMatches::value_source`] still
    /// remembers which one (if either) supplied a field.
    pub fn load() -> Result<Self, IndexError> {
        let matches = Config::command().get_matches();
        let mut config =
            Config::from_arg_matches(&matches).map_err(|err| IndexError::Usage(err.to_string()))?;
        if let Some(path) = config.config_file.clone() {
            config.apply_file(&path, &matches)?;
        }
        config.chain()?;
        Ok(config)
    }

    /// Parses [`Config::chain`] into an [`alloy_chains::Chain`], rejecting
    /// unrecognized names before the controller starts rather than failing
    /// confusingly on the first RPC call.
    pub fn chain(&self) -> Result<alloy_chains::Chain, IndexError> {
        self.chain
            .parse()
            .map_err(|_| IndexError::Usage(format!("unrecognized chain: {}", self.chain)))
    }

    /// Layers `path`'s TOML values into whichever fields `matches` shows were
    /// left at their `clap` default — a field the user set explicitly, on
    /// the command line or via its environment variable, is never
    /// overwritten by the file.
    fn apply_file(&mut self, path: &Path, matches: &ArgMatches) -> Result<(), IndexError> {
        let contents = std::fs::read_to_string(path).map_err(|err| IndexError::io(path, err))?;
        let file: FileConfig = toml::from_str(&contents)
            .map_err(|err| IndexError::Usage(format!("invalid config file {}: {err}", path.display())))?;

        if let Some(value) = file.rpc_provider {
            if !explicitly_set(matches, "rpc_provider") {
                self.rpc_provider = value;
            }
        }
        if let Some(value) = file.chain {
            if !explicitly_set(matches, "chain") {
                self.chain = value;
            }
        }
        if let Some(value) = file.index_root {
            if !explicitly_set(matches, "index_root") {
                self.index_root = value;
            }
        }
        if let Some(value) = file.unripe_dist {
            if !explicitly_set(matches, "unripe_dist") {
                self.unripe_dist = value;
            }
        }
        if let Some(value) = file.n_channels {
            if !explicitly_set(matches, "n_channels") {
                self.n_channels = value;
            }
        }
        if let Some(value) = file.batch_size {
            if !explicitly_set(matches, "batch_size") {
                self.batch_size = value;
            }
        }
        if let Some(value) = file.sleep_secs {
            if !explicitly_set(matches, "sleep_secs") {
                self.sleep_secs = value;
            }
        }
        if let Some(value) = file.appearances_per_chunk {
            if !explicitly_set(matches, "appearances_per_chunk") {
                self.appearances_per_chunk = value;
            }
        }
        Ok(())
    }
}

/// True if `id` was supplied on the command line or via its environment
/// variable, as opposed to falling back to its `clap` default (or being
/// altogether absent, for fields with no default).
fn explicitly_set(matches: &ArgMatches, id: &str) -> bool {
    matches!(
        matches.value_source(id),
        Some(ValueSource::CommandLine) | Some(ValueSource::EnvVariable)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matches_from(args: &[&str]) -> (Config, ArgMatches) {
        let matches = Config::command().get_matches_from(args);
        let config = Config::from_arg_matches(&matches).unwrap();
        (config, matches)
    }

    #[test]
    fn file_config_only_overrides_fields_it_left_at_default() {
        let (mut config, matches) =
            matches_from(&["indexer", "--rpc-provider", "https://cli.example"]);
        let dir = tempfile::tempdir().unwrap();
        let file_path = dir.path().join("config.toml");
        std::fs::write(&file_path, "sleep_secs = 30\nchain = \"sepolia\"\n").unwrap();

        config.apply_file(&file_path, &matches).unwrap();
        assert_eq!(config.sleep_secs, 30);
        assert_eq!(config.chain, "sepolia");
        assert_eq!(config.rpc_provider, "https://cli.example");
        assert!(config.chain().is_ok());
    }

    #[test]
    fn cli_flag_wins_over_file_value() {
        let (mut config, matches) = matches_from(&[
            "indexer",
            "--rpc-provider",
            "https://cli.example",
            "--sleep-secs",
            "5",
        ]);
        let dir = tempfile::tempdir().unwrap();
        let file_path = dir.path().join("config.toml");
        std::fs::write(&file_path, "sleep_secs = 30\n").unwrap();

        config.apply_file(&file_path, &matches).unwrap();
        assert_eq!(config.sleep_secs, 5);
    }

    #[test]
    fn unrecognized_chain_name_is_rejected() {
        let config = Config {
            rpc_provider: "https://cli.example".into(),
            chain: "not-a-real-chain".into(),
            index_root: PathBuf::from("./index"),
            unripe_dist: 28,
            n_channels: 4,
            batch_size: 2000,
            sleep_secs: 14,
            appearances_per_chunk: 200_000,
            config_file: None,
        };
        assert!(config.chain().is_err());
    }
}
