//! Typed async RPC surface consumed by the scraper: `trace_block`,
//! `eth_getLogs`, `eth_getTransactionReceipt`, `eth_blockNumber`, and a
//! block-timestamp lookup.
//!
//! The pipeline and controller are generic over [`AppearanceRpc`] so tests can
//! supply an in-memory double with no network access (see
//! `tests/common/fixtures.rs`); [`HttpRpcClient`] is the production
//! implementation, built the same way the teacher's examples build an
//! `alloy_provider` (`ProviderBuilder::new().on_http(url)`).

pub mod types;

use std::sync::Arc;

use alloy_primitives::B256;
use alloy_provider::{ext::TraceApi, Provider, ProviderBuilder, RootProvider};
use alloy_rpc_types::{BlockId, BlockNumberOrTag, BlockTransactionsKind, Filter};
use alloy_transport_http::Http;
use async_trait::async_trait;
use reqwest::{Client, Url};

use crate::error::RpcError;
use types::{Log, LocalizedTransactionTrace, TransactionReceipt};

/// Everything the scraper needs from a node, behind a trait so it can be
/// mocked in tests.
#[async_trait]
pub trait AppearanceRpc: Send + Sync {
    /// `trace_block` — every trace (call/create/reward/selfdestruct) touched
    /// by the block.
    async fn trace_block(&self, block: u64) -> Result<Vec<LocalizedTransactionTrace>, RpcError>;

    /// `eth_getLogs` restricted to a single block.
    async fn get_logs(&self, block: u64) -> Result<Vec<Log>, RpcError>;

    /// `eth_getTransactionReceipt`, used only for `create` traces that
    /// errored out without reporting a contract address.
    async fn get_transaction_receipt(
        &self,
        hash: B256,
    ) -> Result<Option<TransactionReceipt>, RpcError>;

    /// `eth_blockNumber` — the current chain head.
    async fn block_number(&self) -> Result<u64, RpcError>;

    /// Block timestamp, as a unix second count truncated to `u32` (matching
    /// the on-disk `ts.bin` record width).
    async fn get_block_timestamp(&self, block: u64) -> Result<u32, RpcError>;
}

/// Production [`AppearanceRpc`] backed by an HTTP JSON-RPC endpoint.
#[derive(Clone)]
pub struct HttpRpcClient {
    provider: Arc<RootProvider<Http<Client>>>,
}

impl std::fmt::Debug for HttpRpcClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpRpcClient").finish_non_exhaustive()
    }
}

impl HttpRpcClient {
    /// Builds a client talking to `url` over plain HTTP JSON-RPC.
    pub fn new(url: Url) -> Self {
        let provider = ProviderBuilder::new().on_http(url);
        Self {
            provider: Arc::new(provider),
        }
    }
}

#[async_trait]
impl AppearanceRpc for HttpRpcClient {
    async fn trace_block(&self, block: u64) -> Result<Vec<LocalizedTransactionTrace>, RpcError> {
        self.provider
            .trace_block(BlockId::Number(BlockNumberOrTag::Number(block)))
            .await
            .map_err(|err| RpcError::Transport {
                method: "trace_block",
                message: err.to_string(),
            })
    }

    async fn get_logs(&self, block: u64) -> Result<Vec<Log>, RpcError> {
        let filter = Filter::new().select(block);
        self.provider
            .get_logs(&filter)
            .await
            .map_err(|err| RpcError::Transport {
                method: "eth_getLogs",
                message: err.to_string(),
            })
    }

    async fn get_transaction_receipt(
        &self,
        hash: B256,
    ) -> Result<Option<TransactionReceipt>, RpcError> {
        self.provider
            .get_transaction_receipt(hash)
            .await
            .map_err(|err| RpcError::Transport {
                method: "eth_getTransactionReceipt",
                message: err.to_string(),
            })
    }

    async fn block_number(&self) -> Result<u64, RpcError> {
        self.provider
            .get_block_number()
            .await
            .map_err(|err| RpcError::Transport {
                method: "eth_blockNumber",
                message: err.to_string(),
            })
    }

    async fn get_block_timestamp(&self, block: u64) -> Result<u32, RpcError> {
        let header = self
            .provider
            .get_block(BlockId::number(block), BlockTransactionsKind::Hashes)
            .await
            .map_err(|err| RpcError::Transport {
                method: "eth_getBlockByNumber",
                message: err.to_string(),
            })?
            .ok_or_else(|| RpcError::Decode {
                method: "eth_getBlockByNumber",
                message: format!("block {block} not found"),
            })?;
        u32::try_from(header.header.timestamp).map_err(|_| RpcError::Decode {
            method: "eth_getBlockByNumber",
            message: format!("timestamp overflowed u32 for block {block}"),
        })
    }
}
