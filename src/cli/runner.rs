use anyhow::{Result, anyhow};
use tracing::info;

use crate::cli::args::{Cli, Command};
use crate::cli::commands::{self, swap, transfer};
use crate::cli::context::{init_configs, init_tracing};
use crate::config::load_config;

pub async fn run(cli: Cli) -> Result<()> {
    let Cli { config, command } = cli;
    let command = match command {
        Command::Init(args) => return init_configs(args),
        other => other,
    };

    let config = load_config(config).map_err(|err| anyhow!(err))?;
    init_tracing(&config.global.logging)?;

    if config.prometheus.enable {
        crate::monitoring::try_init_prometheus(&config.prometheus.listen)?;
    }
    info!(
        target: "cli",
        sponsored_mint = %config.sponsored_token.mint,
        "配置加载完成"
    );

    match command {
        Command::Init(_) => Ok(()),
        Command::CheckConfig => commands::check_config(&config),
        Command::Quote(cmd) => swap::quote(&config, cmd).await,
        Command::Submit(cmd) => swap::submit(&config, cmd).await,
        Command::Stream(cmd) => swap::stream(&config, cmd).await,
        Command::Transfer(cmd) => transfer::build(&config, cmd).await,
        Command::EstimateTransferFee(cmd) => transfer::estimate_fee(&config, cmd).await,
    }
}
