//! CLI entry point: parses [`Config`], sets up structured logging, and
//! drives the forever-loop controller until interrupted.

use std::sync::Arc;

use appearance_index::rpc::AppearanceRpc;
use appearance_index::{Config, HttpRpcClient, IndexPaths};
use reqwest::Url;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = Config::load()?;
    let rpc_url = Url::parse(&config.rpc_provider)?;
    let rpc: Arc<dyn AppearanceRpc> = Arc::new(HttpRpcClient::new(rpc_url));
    let paths = Arc::new(IndexPaths::new(config.index_root.clone()));

    let handle = appearance_index::progression::ControlHandle::new();
    let signal_handle = handle.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("received shutdown signal, stopping after current batch");
            signal_handle.stop();
        }
    });

    appearance_index::progression::run(&config, paths, rpc, handle).await?;
    Ok(())
}
