//! Append-only, gap-filled `ts.bin` writer. Mirrors the original scraper's
//! timestamp stage: accumulate `(block, ts)` pairs during the pipeline, then
//! after it drains, sort and gap-fill against the RPC (S6).

use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};

use crate::error::IndexError;
use crate::rpc::AppearanceRpc;

/// One `(block, unix_ts)` record as collected by the pipeline's timestamp
/// stage, before gap-filling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timestamp {
    /// Block number.
    pub block: u32,
    /// Unix seconds.
    pub unix_ts: u32,
}

const RECORD_LEN: u64 = 8;

/// Appends gap-filled records for every block in `[n_ts, stop)` to `ts.bin`,
/// where `n_ts` is `current_len / 8`. `collected` need not be sorted or
/// dense; it is sorted here and consulted opportunistically — any block it's
/// missing is fetched via `rpc.get_block_timestamp`.
pub async fn append_gap_filled(
    ts_bin_path: &std::path::Path,
    mut collected: Vec<Timestamp>,
    stop: u32,
    rpc: &dyn AppearanceRpc,
) -> Result<(), IndexError> {
    collected.sort_by_key(|ts| ts.block);

    let mut file = tokio::fs::OpenOptions::new()
        .create(true)
        .read(true)
        .append(true)
        .open(ts_bin_path)
        .await
        .map_err(|err| IndexError::io(ts_bin_path, err))?;

    let len = file
        .seek(std::io::SeekFrom::End(0))
        .await
        .map_err(|err| IndexError::io(ts_bin_path, err))?;
    let n_ts = (len / RECORD_LEN) as u32;

    let mut cursor = 0usize;
    for block in n_ts..stop {
        let unix_ts = if let Some(next) = collected.get(cursor) {
            if next.block == block {
                cursor += 1;
                next.unix_ts
            } else {
                rpc.get_block_timestamp(block as u64).await?
            }
        } else {
            rpc.get_block_timestamp(block as u64).await?
        };

        let mut record = [0u8; 8];
        record[0..4].copy_from_slice(&block.to_le_bytes());
        record[4..8].copy_from_slice(&unix_ts.to_le_bytes());
        file.write_all(&record)
            .await
            .map_err(|err| IndexError::io(ts_bin_path, err))?;
    }
    file.flush().await.map_err(|err| IndexError::io(ts_bin_path, err))?;
    Ok(())
}

/// Reads every `(block, unix_ts)` record from `ts.bin`, for tests and
/// property checks that the file stays dense (§8 invariant 7).
pub async fn read_all(ts_bin_path: &std::path::Path) -> Result<Vec<Timestamp>, IndexError> {
    let mut file = tokio::fs::File::open(ts_bin_path)
        .await
        .map_err(|err| IndexError::io(ts_bin_path, err))?;
    let mut buf = Vec::new();
    file.read_to_end(&mut buf)
        .await
        .map_err(|err| IndexError::io(ts_bin_path, err))?;
    Ok(buf
        .chunks_exact(8)
        .map(|chunk| Timestamp {
            block: u32::from_le_bytes(chunk[0..4].try_into().unwrap()),
            unix_ts: u32::from_le_bytes(chunk[4..8].try_into().unwrap()),
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc::types::{Log, TransactionReceipt};
    use alloy_rpc_types_trace::parity::LocalizedTransactionTrace;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingRpc {
        calls: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl AppearanceRpc for CountingRpc {
        async fn trace_block(
            &self,
            _block: u64,
        ) -> Result<Vec<LocalizedTransactionTrace>, crate::error::RpcError> {
            Ok(Vec::new())
        }
        async fn get_logs(&self, _block: u64) -> Result<Vec<Log>, crate::error::RpcError> {
            Ok(Vec::new())
        }
        async fn get_transaction_receipt(
            &self,
            _hash: alloy_primitives::B256,
        ) -> Result<Option<TransactionReceipt>, crate::error::RpcError> {
            Ok(None)
        }
        async fn block_number(&self) -> Result<u64, crate::error::RpcError> {
            Ok(0)
        }
        async fn get_block_timestamp(&self, block: u64) -> Result<u32, crate::error::RpcError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(1_000_000 + block as u32)
        }
    }

    #[tokio::test]
    async fn s6_gap_fill() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ts.bin");
        // Pre-seed n_ts = 5 by writing 5 dummy records.
        {
            let mut file = tokio::fs::File::create(&path).await.unwrap();
            for block in 0..5u32 {
                file.write_all(&block.to_le_bytes()).await.unwrap();
                file.write_all(&(block + 100).to_le_bytes()).await.unwrap();
            }
        }

        let rpc = CountingRpc {
            calls: AtomicUsize::new(0),
        };
        let collected = vec![
            Timestamp {
                block: 5,
                unix_ts: 555,
            },
            Timestamp {
                block: 7,
                unix_ts: 777,
            },
        ];
        append_gap_filled(&path, collected, 8, &rpc).await.unwrap();

        let records = read_all(&path).await.unwrap();
        assert_eq!(records.len(), 8);
        assert_eq!(records[5], Timestamp { block: 5, unix_ts: 555 });
        assert_eq!(records[6].block, 6);
        assert_eq!(records[6].unix_ts, 1_000_006);
        assert_eq!(records[7], Timestamp { block: 7, unix_ts: 777 });
        assert_eq!(rpc.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn density_invariant() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ts.bin");
        let rpc = CountingRpc {
            calls: AtomicUsize::new(0),
        };
        append_gap_filled(&path, vec![], 4, &rpc).await.unwrap();
        let records = read_all(&path).await.unwrap();
        for (i, record) in records.iter().enumerate() {
            assert_eq!(record.block, i as u32);
        }
    }
}
