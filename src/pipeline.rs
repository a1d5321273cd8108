//! The three-stage "Blaze" fan-out pipeline: fetch, extract, timestamp.
//! Mirrors `blaze.go`'s goroutines-plus-channels-plus-`WaitGroup` shape with
//! bounded `tokio::sync::mpsc` channels and `tokio::spawn` worker pools in
//! place of raw goroutines.
//!
//! Stage 1 (fetch) pulls `trace_block`/`eth_getLogs` for each block
//! concurrently across `n_channels` workers. Stage 2 (extract) turns each
//! block's traces/logs into appearances and writes the ripe/unripe file.
//! Stage 3 (timestamp) collects each block's timestamp for the later
//! gap-fill pass. All three run concurrently; a block flows through without
//! waiting for its neighbors.

use std::ops::Range;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::{IndexError, RpcError};
use crate::extract::{self, ExtractWarning};
use crate::paths::IndexPaths;
use crate::ripe;
use crate::rpc::types::{Log, LocalizedTransactionTrace};
use crate::rpc::AppearanceRpc;
use crate::timestamp::Timestamp;

/// A non-fatal problem encountered while processing one block, kept
/// alongside the block number for logging at the call site.
#[derive(Debug)]
pub struct BlockWarning {
    /// Block the warning was produced for.
    pub block: u32,
    /// The warning itself.
    pub warning: ExtractWarning,
}

/// What a completed pipeline run produced: every block it wrote a ripe file
/// for, their timestamps (unsorted, gap-filling happens downstream), and any
/// non-fatal extraction warnings.
#[derive(Debug, Default)]
pub struct PipelineOutput {
    /// Blocks this run wrote an appearance file for, not necessarily sorted.
    pub written_blocks: Vec<u32>,
    /// Collected `(block, unix_ts)` pairs, handed to [`crate::timestamp::append_gap_filled`].
    pub timestamps: Vec<Timestamp>,
    /// Non-fatal extraction warnings, one per offending trace/log.
    pub warnings: Vec<BlockWarning>,
}

struct Fetched {
    block: u32,
    traces: Vec<LocalizedTransactionTrace>,
    logs: Vec<Log>,
}

/// Runs the full fetch → extract → timestamp pipeline over `blocks`,
/// writing each block's appearances to `ripe/` or `unripe/` (per
/// `ripe_block`) as it completes. Returns once every block in the range has
/// been processed or the first fatal (non-RPC) error is hit.
pub async fn run(
    paths: Arc<IndexPaths>,
    rpc: Arc<dyn AppearanceRpc>,
    blocks: Range<u32>,
    ripe_block: u32,
    n_channels: usize,
) -> Result<PipelineOutput, IndexError> {
    let total = blocks.len();
    let (fetch_tx, fetch_rx) = mpsc::channel::<u32>(n_channels.max(1) * 4);
    let (extract_tx, extract_rx) = mpsc::channel::<Result<Fetched, IndexError>>(n_channels.max(1) * 4);
    let (output_tx, mut output_rx) = mpsc::channel::<Result<(u32, Vec<ExtractWarning>), IndexError>>(total.max(1));
    let (ts_tx, mut ts_rx) = mpsc::channel::<Result<Timestamp, IndexError>>(total.max(1));

    let fetch_handles = spawn_fetch_stage(n_channels, fetch_rx, extract_tx, Arc::clone(&rpc));
    let extract_handles = spawn_extract_stage(
        n_channels,
        extract_rx,
        output_tx,
        ts_tx,
        Arc::clone(&paths),
        Arc::clone(&rpc),
        ripe_block,
    );

    let feeder = tokio::spawn(async move {
        for block in blocks {
            if fetch_tx.send(block).await.is_err() {
                break;
            }
        }
    });

    let mut output = PipelineOutput::default();
    let mut remaining = total;
    let mut fatal: Option<IndexError> = None;
    while remaining > 0 {
        tokio::select! {
            Some(result) = output_rx.recv() => {
                remaining -= 1;
                match result {
                    Ok((block, warnings)) => {
                        output.written_blocks.push(block);
                        output.warnings.extend(
                            warnings.into_iter().map(|warning| BlockWarning { block, warning }),
                        );
                    }
                    Err(err) => {
                        if fatal.is_none() {
                            fatal = Some(err);
                        }
                    }
                }
            }
            else => break,
        }
    }
    drop(output_rx);

    while let Some(result) = ts_rx.recv().await {
        match result {
            Ok(ts) => output.timestamps.push(ts),
            Err(err) if fatal.is_none() => fatal = Some(err),
            Err(_) => {}
        }
    }

    let _ = feeder.await;
    for handle in fetch_handles {
        let _ = handle.await;
    }
    for handle in extract_handles {
        let _ = handle.await;
    }

    match fatal {
        Some(err) => Err(err),
        None => Ok(output),
    }
}

fn spawn_fetch_stage(
    n_channels: usize,
    fetch_rx: mpsc::Receiver<u32>,
    extract_tx: mpsc::Sender<Result<Fetched, IndexError>>,
    rpc: Arc<dyn AppearanceRpc>,
) -> Vec<JoinHandle<()>> {
    let fetch_rx = Arc::new(tokio::sync::Mutex::new(fetch_rx));
    (0..n_channels.max(1))
        .map(|_| {
            let fetch_rx = Arc::clone(&fetch_rx);
            let extract_tx = extract_tx.clone();
            let rpc = Arc::clone(&rpc);
            tokio::spawn(async move {
                loop {
                    let block = {
                        let mut rx = fetch_rx.lock().await;
                        rx.recv().await
                    };
                    let Some(block) = block else { break };
                    let fetched = fetch_one(block, rpc.as_ref()).await;
                    if extract_tx.send(fetched).await.is_err() {
                        break;
                    }
                }
            })
        })
        .collect()
}

async fn fetch_one(block: u32, rpc: &dyn AppearanceRpc) -> Result<Fetched, IndexError> {
    let (traces, logs) = tokio::try_join!(rpc.trace_block(block as u64), rpc.get_logs(block as u64))
        .map_err(IndexError::from)?;
    Ok(Fetched { block, traces, logs })
}

#[allow(clippy::too_many_arguments)]
fn spawn_extract_stage(
    n_channels: usize,
    extract_rx: mpsc::Receiver<Result<Fetched, IndexError>>,
    output_tx: mpsc::Sender<Result<(u32, Vec<ExtractWarning>), IndexError>>,
    ts_tx: mpsc::Sender<Result<Timestamp, IndexError>>,
    paths: Arc<IndexPaths>,
    rpc: Arc<dyn AppearanceRpc>,
    ripe_block: u32,
) -> Vec<JoinHandle<()>> {
    let extract_rx = Arc::new(tokio::sync::Mutex::new(extract_rx));
    (0..n_channels.max(1))
        .map(|_| {
            let extract_rx = Arc::clone(&extract_rx);
            let output_tx = output_tx.clone();
            let ts_tx = ts_tx.clone();
            let paths = Arc::clone(&paths);
            let rpc = Arc::clone(&rpc);
            tokio::spawn(async move {
                loop {
                    let item = {
                        let mut rx = extract_rx.lock().await;
                        rx.recv().await
                    };
                    let Some(item) = item else { break };
                    let result = extract_and_write(item, &paths, rpc.as_ref(), ripe_block, &ts_tx).await;
                    if output_tx.send(result).await.is_err() {
                        break;
                    }
                }
            })
        })
        .collect()
}

async fn extract_and_write(
    fetched: Result<Fetched, IndexError>,
    paths: &IndexPaths,
    rpc: &dyn AppearanceRpc,
    ripe_block: u32,
    ts_tx: &mpsc::Sender<Result<Timestamp, IndexError>>,
) -> Result<(u32, Vec<ExtractWarning>), IndexError> {
    let fetched = fetched?;
    let block = fetched.block;

    let (mut appearances, mut warnings) = extract::from_traces(block, &fetched.traces, rpc).await;
    appearances.extend(extract::from_logs(block, &fetched.logs));
    warnings.dedup_by(|a, b| a.index == b.index);

    ripe::write_block(paths, block, ripe_block, &appearances).await?;

    let ts_result = rpc
        .get_block_timestamp(block as u64)
        .await
        .map(|unix_ts| Timestamp { block, unix_ts })
        .map_err(IndexError::from);
    let _ = ts_tx.send(ts_result).await;

    Ok((block, warnings))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc::types::TransactionReceipt;
    use std::collections::HashMap;
    use std::sync::Mutex as StdMutex;

    struct FakeRpc {
        timestamps: StdMutex<HashMap<u64, u32>>,
    }

    #[async_trait::async_trait]
    impl AppearanceRpc for FakeRpc {
        async fn trace_block(&self, _block: u64) -> Result<Vec<LocalizedTransactionTrace>, RpcError> {
            Ok(Vec::new())
        }
        async fn get_logs(&self, _block: u64) -> Result<Vec<Log>, RpcError> {
            Ok(Vec::new())
        }
        async fn get_transaction_receipt(
            &self,
            _hash: alloy_primitives::B256,
        ) -> Result<Option<TransactionReceipt>, RpcError> {
            Ok(None)
        }
        async fn block_number(&self) -> Result<u64, RpcError> {
            Ok(0)
        }
        async fn get_block_timestamp(&self, block: u64) -> Result<u32, RpcError> {
            Ok(*self.timestamps.lock().unwrap().entry(block).or_insert(1_700_000_000 + block as u32))
        }
    }

    #[tokio::test]
    async fn totality_every_block_in_range_gets_a_ripe_file() {
        let dir = tempfile::tempdir().unwrap();
        let paths = Arc::new(IndexPaths::new(dir.path()));
        paths.ensure_dirs().unwrap();
        let rpc: Arc<dyn AppearanceRpc> = Arc::new(FakeRpc {
            timestamps: StdMutex::new(HashMap::new()),
        });

        let output = run(Arc::clone(&paths), rpc, 10..15, 14, 2).await.unwrap();
        let mut written = output.written_blocks.clone();
        written.sort();
        assert_eq!(written, vec![10, 11, 12, 13, 14]);
        assert_eq!(output.timestamps.len(), 5);
        for block in 10..15u32 {
            assert!(paths.appearance_file(block, 14).exists());
        }
    }
}
