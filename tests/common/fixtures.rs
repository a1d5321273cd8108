//! An in-memory [`AppearanceRpc`] double for integration tests: every method
//! answers from data supplied up front, with no network access, mirroring
//! the role the teacher's `runner.rs` helpers play for EVM execution tests.

use std::collections::HashMap;
use std::sync::Mutex;

use alloy_primitives::B256;
use appearance_index::rpc::types::{Log, LocalizedTransactionTrace, TransactionReceipt};
use appearance_index::rpc::AppearanceRpc;
use appearance_index::error::RpcError;

/// A fixed chain head plus per-block traces/logs/timestamps, served without
/// touching the network.
#[derive(Debug, Default)]
pub struct MockRpc {
    pub head: u64,
    pub traces: HashMap<u64, Vec<LocalizedTransactionTrace>>,
    pub logs: HashMap<u64, Vec<Log>>,
    pub timestamps: HashMap<u64, u32>,
    pub receipts: Mutex<HashMap<B256, TransactionReceipt>>,
}

impl MockRpc {
    /// An empty double with `head` as the chain tip; every block not given
    /// explicit traces/logs/a timestamp answers with empty traces/logs and
    /// a deterministic synthetic timestamp.
    pub fn new(head: u64) -> Self {
        Self {
            head,
            ..Default::default()
        }
    }
}

#[async_trait::async_trait]
impl AppearanceRpc for MockRpc {
    async fn trace_block(&self, block: u64) -> Result<Vec<LocalizedTransactionTrace>, RpcError> {
        Ok(self.traces.get(&block).cloned().unwrap_or_default())
    }

    async fn get_logs(&self, block: u64) -> Result<Vec<Log>, RpcError> {
        Ok(self.logs.get(&block).cloned().unwrap_or_default())
    }

    async fn get_transaction_receipt(&self, hash: B256) -> Result<Option<TransactionReceipt>, RpcError> {
        Ok(self.receipts.lock().unwrap().get(&hash).cloned())
    }

    async fn block_number(&self) -> Result<u64, RpcError> {
        Ok(self.head)
    }

    async fn get_block_timestamp(&self, block: u64) -> Result<u32, RpcError> {
        Ok(self
            .timestamps
            .get(&block)
            .copied()
            .unwrap_or(1_700_000_000 + block as u32))
    }
}
