//! The forever-loop controller: advances the indexed range toward the chain
//! head, consolidates finalized chunks, and sleeps only when it has actually
//! caught up. Mirrors `handle_scrape_blaze.go`'s outer loop — fetch head,
//! run Blaze over the next batch, gap-fill timestamps, maybe build a chunk,
//! sleep if there was nothing to do.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::chunk;
use crate::config::Config;
use crate::error::IndexError;
use crate::paths::IndexPaths;
use crate::pipeline;
use crate::rpc::AppearanceRpc;
use crate::timestamp;

/// Cooperative pause/stop signal shared between the controller and whatever
/// drives it (a CLI signal handler, a test harness, an admin endpoint).
#[derive(Debug, Clone, Default)]
pub struct ControlHandle {
    paused: Arc<AtomicBool>,
    stopped: Arc<AtomicBool>,
}

impl ControlHandle {
    /// A fresh handle, running and unpaused.
    pub fn new() -> Self {
        Self::default()
    }

    /// Suspends the controller before its next head check; in-flight work
    /// finishes first.
    pub fn pause(&self) {
        self.paused.store(true, Ordering::SeqCst);
    }

    /// Resumes a paused controller.
    pub fn resume(&self) {
        self.paused.store(false, Ordering::SeqCst);
    }

    /// Requests the controller loop exit after its current iteration.
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }

    fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }
}

/// Drives the indexer forward until `handle.stop()` is called. Never
/// returns `Err` for retryable RPC failures — those are logged and retried
/// after the normal sleep; only [`IndexError::Usage`]-class misconfiguration
/// propagates.
pub async fn run(
    config: &Config,
    paths: Arc<IndexPaths>,
    rpc: Arc<dyn AppearanceRpc>,
    handle: ControlHandle,
) -> Result<(), IndexError> {
    paths.ensure_dirs().map_err(|err| IndexError::io(paths.root(), err))?;

    loop {
        if handle.is_stopped() {
            return Ok(());
        }
        if handle.is_paused() {
            tokio::time::sleep(Duration::from_secs(1)).await;
            continue;
        }

        match advance(config, &paths, Arc::clone(&rpc)).await {
            Ok(Progress::Advanced) => continue,
            Ok(Progress::CaughtUp { distance_from_head }) => {
                let secs = effective_sleep_secs(config, distance_from_head);
                tokio::time::sleep(Duration::from_secs(secs)).await;
            }
            Err(err) if err.is_retryable() => {
                warn!(error = %err, "retrying after rpc failure");
                tokio::time::sleep(Duration::from_secs(config.sleep_secs)).await;
            }
            Err(err) => return Err(err),
        }
    }
}

enum Progress {
    Advanced,
    CaughtUp { distance_from_head: u64 },
}

/// Sleep policy: `sleep_secs` values of 13 or 14 signal "use adaptive
/// pacing" — when `distance_from_head` is within `2 * unripe_dist` of the
/// tip, the effective sleep is pinned to 13s; any other configured value is
/// honored verbatim regardless of distance from head.
fn effective_sleep_secs(config: &Config, distance_from_head: u64) -> u64 {
    let adaptive = matches!(config.sleep_secs, 13 | 14);
    if adaptive && distance_from_head <= 2 * config.unripe_dist as u64 {
        13
    } else {
        config.sleep_secs
    }
}

async fn advance(
    config: &Config,
    paths: &IndexPaths,
    rpc: Arc<dyn AppearanceRpc>,
) -> Result<Progress, IndexError> {
    let head = rpc.block_number().await?;
    let next_block = next_unprocessed_block(paths).await?;
    let ripe_block = head.saturating_sub(config.unripe_dist as u64) as u32;
    if next_block > ripe_block {
        let distance_from_head = head.saturating_sub(next_block as u64);
        return Ok(Progress::CaughtUp { distance_from_head });
    }

    let end = (next_block as u64 + config.batch_size as u64).min(ripe_block as u64 + 1) as u32;

    info!(start = next_block, end, head, "processing block range");
    let output = match pipeline::run(
        Arc::new(paths.clone()),
        Arc::clone(&rpc),
        next_block..end,
        ripe_block,
        config.n_channels,
    )
    .await
    {
        Ok(output) => output,
        Err(err) => return Err(handle_partial_failure(paths, next_block, end, ripe_block, err).await),
    };

    for warning in &output.warnings {
        warn!(block = warning.block, error = %warning.warning.error, "extraction warning");
    }

    timestamp::append_gap_filled(&paths.timestamp_file(), output.timestamps, end, rpc.as_ref()).await?;

    maybe_consolidate(paths, ripe_block, config.appearances_per_chunk).await?;

    Ok(Progress::Advanced)
}

/// Handles a failed pipeline run for `[start, end)`: counts how many blocks
/// in the range have no ripe/unripe file, and if any are missing, cleans
/// the temporary folders and reports an [`IndexError::Integrity`] instead of
/// the original cause, matching `handle_scrape_blaze.go`'s
/// `CleanTemporaryFolders`-then-fail behavior for an aborted batch. If every
/// block in the range somehow already has a file, the original error is
/// returned unchanged.
async fn handle_partial_failure(
    paths: &IndexPaths,
    start: u32,
    end: u32,
    ripe_block: u32,
    cause: IndexError,
) -> IndexError {
    tracing::error!(error = %cause, start, end, "pipeline aborted, checking for missing blocks");

    let mut missing = 0usize;
    for block in start..end {
        if !paths.appearance_file(block, ripe_block).exists() {
            missing += 1;
        }
    }

    if missing == 0 {
        return cause;
    }

    if let Err(err) = clean_temporary_folders(paths).await {
        tracing::error!(error = %err, "failed to clean temporary folders after partial failure");
    }

    IndexError::Integrity {
        start: start as u64,
        end: end as u64,
        missing,
    }
}

/// Deletes every file directly under `unripe/`, `ripe/`, and `staging/`,
/// leaving `finalized/` and `ts.bin` untouched. Used after an aborted batch
/// so the next attempt starts from a clean slate rather than a mix of
/// partially written files.
async fn clean_temporary_folders(paths: &IndexPaths) -> std::io::Result<()> {
    for dir in [paths.unripe_dir(), paths.ripe_dir(), paths.staging_dir()] {
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => continue,
            Err(err) => return Err(err),
        };
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_file() {
                tokio::fs::remove_file(entry.path()).await?;
            }
        }
    }
    Ok(())
}

async fn next_unprocessed_block(paths: &IndexPaths) -> Result<u32, IndexError> {
    let ts_path = paths.timestamp_file();
    match tokio::fs::metadata(&ts_path).await {
        Ok(meta) => Ok((meta.len() / 8) as u32),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(0),
        Err(err) => Err(IndexError::io(&ts_path, err)),
    }
}

/// Highest `last` block among `finalized/*.bin` chunk names, if any.
fn last_finalized_block(paths: &IndexPaths) -> std::io::Result<Option<u32>> {
    let mut highest = None;
    if !paths.finalized_dir().exists() {
        return Ok(None);
    }
    for entry in std::fs::read_dir(paths.finalized_dir())? {
        let entry = entry?;
        let name = entry.file_name();
        let Some(stem) = name.to_str().and_then(|n| n.strip_suffix(".bin")) else {
            continue;
        };
        let Some((_, last)) = stem.split_once('-') else {
            continue;
        };
        if let Ok(last) = last.parse::<u32>() {
            highest = Some(highest.map_or(last, |h: u32| h.max(last)));
        }
    }
    Ok(highest)
}

/// Consolidates the contiguous ripe-classified run since the last finalized
/// chunk into a new chunk, once its total appearance count reaches
/// `threshold`. Counts appearances by reading each candidate ripe file's
/// line count, same way `scrape_indexer.go`'s chunk builder sizes a batch
/// before committing to it.
async fn maybe_consolidate(paths: &IndexPaths, ripe_block: u32, threshold: usize) -> Result<(), IndexError> {
    let start = last_finalized_block(paths)
        .map_err(|err| IndexError::io(paths.finalized_dir(), err))?
        .map_or(0, |last| last + 1);
    if start > ripe_block {
        return Ok(());
    }

    let mut blocks = Vec::new();
    let mut total_appearances = 0usize;
    for block in start..=ripe_block {
        let path = paths.appearance_file(block, ripe_block);
        let Ok(contents) = tokio::fs::read_to_string(&path).await else {
            break;
        };
        blocks.push(block);
        total_appearances += contents.lines().count();
        if total_appearances >= threshold {
            break;
        }
    }

    if total_appearances >= threshold && !blocks.is_empty() {
        let (bin_path, _) = chunk::consolidate(paths, &blocks).await?;
        info!(path = %bin_path.display(), blocks = blocks.len(), "finalized chunk");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn last_finalized_block_parses_stem_range() {
        let dir = tempfile::tempdir().unwrap();
        let paths = IndexPaths::new(dir.path());
        paths.ensure_dirs().unwrap();
        std::fs::write(paths.finalized_dir().join("000000001-000000100.bin"), b"").unwrap();
        std::fs::write(paths.finalized_dir().join("000000101-000000250.bin"), b"").unwrap();
        assert_eq!(last_finalized_block(&paths).unwrap(), Some(250));
    }

    #[test]
    fn last_finalized_block_is_none_when_empty() {
        let dir = tempfile::tempdir().unwrap();
        let paths = IndexPaths::new(dir.path());
        paths.ensure_dirs().unwrap();
        assert_eq!(last_finalized_block(&paths).unwrap(), None);
    }
}
