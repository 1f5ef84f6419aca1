use anyhow::Result;
use clap::Parser;

use sponsor::cli::{self, args::Cli};

#[tokio::main]
async fn main() -> Result<()> {
    cli::run(Cli::parse()).await
}
