//! Thin re-exports of the JSON-RPC result shapes this crate consumes.
//!
//! Parity-style traces, logs, and receipts are all already typed in the
//! `alloy` ecosystem; we re-export under short names here so the rest of the
//! crate reads close to the original scraper's vocabulary
//! (`TraceResult`/`Action`/`Receipt`) without redeclaring the wire format by
//! hand, the way the original Go client's `rpcClient` package did.

pub use alloy_primitives::{Address, TxHash, B256};
pub use alloy_rpc_types::{Log, TransactionReceipt};
pub use alloy_rpc_types_trace::parity::{
    Action, CallAction, CreateAction, LocalizedTransactionTrace, RewardAction, RewardType,
    SelfdestructAction, TraceOutput, TransactionTrace,
};
