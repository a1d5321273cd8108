//! Address-appearance indexer: scans an EVM-compatible chain's traces and
//! logs for every address that "appears" in each block, writing a
//! content-addressable, bloom-filtered index a downstream client can query
//! without replaying the chain.

pub mod address;
pub mod chunk;
pub mod config;
pub mod error;
pub mod extract;
pub mod paths;
pub mod pipeline;
pub mod progression;
pub mod ripe;
pub mod rpc;
pub mod timestamp;

pub use config::Config;
pub use error::{IndexError, Result};
pub use paths::IndexPaths;
pub use rpc::{AppearanceRpc, HttpRpcClient};
