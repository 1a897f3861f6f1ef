//! Shim binary that calls into the `potline_controller` library's `inner_main`.
use clap::Parser as _;
use eyre::Result;
use potline_controller::cli::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    // Delegate to library entrypoint
    potline_controller::inner_main(Cli::parse()).await
}
