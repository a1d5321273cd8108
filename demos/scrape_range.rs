//! Runs the Blaze pipeline over a fixed block range against a live RPC
//! endpoint and reports what it wrote. Adapted from the teacher's
//! mainnet-check demo: same `clap` + `tokio::runtime::Runtime` shape, now
//! driving the appearance pipeline instead of executing one block.

use std::sync::Arc;

use appearance_index::rpc::AppearanceRpc;
use appearance_index::{HttpRpcClient, IndexPaths};
use clap::Parser;
use reqwest::Url;
use tokio::runtime::Runtime;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// JSON RPC URL
    #[arg(long, env, default_value = "https://eth.llamarpc.com")]
    rpc_url: String,

    /// First block to scrape (inclusive).
    #[arg()]
    start_block: u32,

    /// Last block to scrape (exclusive).
    #[arg()]
    end_block: u32,

    /// Directory to write unripe/ripe/staging/finalized/ts.bin into.
    #[arg(long, default_value = "./demo-index")]
    index_root: String,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let rpc_url = Url::parse(&args.rpc_url)?;
    let runtime = Runtime::new()?;

    let rpc: Arc<dyn AppearanceRpc> = Arc::new(HttpRpcClient::new(rpc_url));
    let paths = Arc::new(IndexPaths::new(&args.index_root));
    paths.ensure_dirs()?;

    let output = runtime.block_on(appearance_index::pipeline::run(
        Arc::clone(&paths),
        Arc::clone(&rpc),
        args.start_block..args.end_block,
        args.end_block.saturating_sub(1),
        4,
    ))?;

    println!(
        "wrote {} block(s), {} timestamp(s), {} warning(s)",
        output.written_blocks.len(),
        output.timestamps.len(),
        output.warnings.len()
    );
    runtime.block_on(appearance_index::timestamp::append_gap_filled(
        &paths.timestamp_file(),
        output.timestamps,
        args.end_block,
        rpc.as_ref(),
    ))?;

    Ok(())
}
