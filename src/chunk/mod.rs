//! Chunk consolidation: merges a contiguous run of finalized ripe files into
//! one immutable, bloom-filtered `.bin`/`.bloom` pair under `finalized/`
//! (§4.6). Mirrors the original scraper's chunk-builder stage: move the
//! ripe files into `staging/` first so a crash mid-merge leaves the ripe
//! files recoverable rather than half-consumed, merge-sort and dedup their
//! lines, write the new chunk atomically, then delete the staged files.

pub mod bloom;
pub mod format;

use std::collections::BTreeMap;
use std::path::PathBuf;

use alloy_primitives::Address;
use tokio::io::{AsyncBufReadExt, BufReader};

use self::bloom::build_page;
use self::format::{AppearanceRecord, ChunkData};
use crate::error::IndexError;
use crate::paths::IndexPaths;
use crate::ripe::write_atomic;

/// Parses one `render_line`-formatted row back into its fields. Returns
/// `None` on malformed input rather than erroring — a corrupt ripe line
/// would otherwise wedge the whole consolidation.
fn parse_line(line: &str) -> Option<(Address, u32, u32)> {
    let mut parts = line.split('\t');
    let address = parts.next()?.parse::<Address>().ok()?;
    let block: u32 = parts.next()?.parse().ok()?;
    let txid: u32 = parts.next()?.parse().ok()?;
    Some((address, block, txid))
}

/// Moves the ripe files for `blocks` into `staging/`, leaving the ripe
/// directory empty of them. If a move fails partway, the already-moved
/// files stay in `staging/`; the next pass will pick them up again since
/// the caller retains the block range until this call returns `Ok`.
async fn stage(paths: &IndexPaths, blocks: &[u32]) -> Result<(), IndexError> {
    tokio::fs::create_dir_all(paths.staging_dir())
        .await
        .map_err(|err| IndexError::io(paths.staging_dir(), err))?;
    for &block in blocks {
        let from = paths.appearance_file(block, block);
        let to = paths.staged_file(block);
        tokio::fs::rename(&from, &to)
            .await
            .map_err(|err| IndexError::io(&from, err))?;
    }
    Ok(())
}

/// Reads every staged file for `blocks`, parsing and grouping lines by
/// address. Appearances are deduplicated per-address (a `BTreeSet` is not
/// used directly so the final per-address list preserves the block/txid
/// ordering `format::ChunkData` expects).
async fn merge(paths: &IndexPaths, blocks: &[u32]) -> Result<ChunkData, IndexError> {
    let mut by_address: BTreeMap<Address, Vec<AppearanceRecord>> = BTreeMap::new();
    for &block in blocks {
        let path = paths.staged_file(block);
        let file = tokio::fs::File::open(&path)
            .await
            .map_err(|err| IndexError::io(&path, err))?;
        let mut lines = BufReader::new(file).lines();
        while let Some(line) = lines
            .next_line()
            .await
            .map_err(|err| IndexError::io(&path, err))?
        {
            let Some((address, block, txid)) = parse_line(&line) else {
                continue;
            };
            by_address
                .entry(address)
                .or_default()
                .push(AppearanceRecord { block, txid });
        }
    }
    for records in by_address.values_mut() {
        records.sort();
        records.dedup();
    }
    Ok(ChunkData { by_address })
}

/// Deletes the staged files for `blocks`; called only after both the
/// `.bin` and `.bloom` files have been fsync'd and renamed into place.
async fn cleanup_staged(paths: &IndexPaths, blocks: &[u32]) -> Result<(), IndexError> {
    for &block in blocks {
        let path = paths.staged_file(block);
        tokio::fs::remove_file(&path)
            .await
            .map_err(|err| IndexError::io(&path, err))?;
    }
    Ok(())
}

/// Consolidates the contiguous ripe blocks `first..=last` into one finalized
/// chunk. `blocks` must be sorted and contiguous; the caller (the
/// progression controller) is responsible for only calling this once the
/// run has accumulated at least `appearances_per_chunk` appearances.
///
/// On success, the ripe files for `blocks` no longer exist anywhere; on
/// failure, any files already moved to `staging/` are left there so the
/// next attempt can resume instead of re-reading from `ripe/`.
pub async fn consolidate(paths: &IndexPaths, blocks: &[u32]) -> Result<(PathBuf, PathBuf), IndexError> {
    let (first, last) = match (blocks.first(), blocks.last()) {
        (Some(&f), Some(&l)) => (f, l),
        _ => return Err(IndexError::Usage("consolidate called with no blocks".into())),
    };

    stage(paths, blocks).await?;
    let data = merge(paths, blocks).await?;

    let bloom_page = build_page(data.addresses());
    let bin_bytes = data.encode();
    let bloom_bytes = bloom::encode_sidecar(&[bloom_page]);

    let (bin_path, bloom_path) = paths.chunk_files(first, last);
    write_atomic(&bin_path, &bin_bytes).await?;
    write_atomic(&bloom_path, &bloom_bytes).await?;

    cleanup_staged(paths, blocks).await?;
    Ok((bin_path, bloom_path))
}
