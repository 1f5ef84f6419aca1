pub mod swap;
pub mod transfer;

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::warn;

use crate::config::SponsorConfig;
use crate::engine::FeePayer;

pub(crate) fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let rendered = serde_json::to_string_pretty(value).context("响应序列化失败")?;
    println!("{rendered}");
    Ok(())
}

/// 校验已加载的配置，不访问网络。
pub fn check_config(config: &SponsorConfig) -> Result<()> {
    config.validate().context("配置非法")?;

    let rpc = config.global.primary_rpc_url().unwrap_or("(default)");
    println!("rpc:              {rpc}");
    println!("commitment:       {}", config.global.commitment);
    println!("quote url:        {}", config.jupiter.quote_url);
    println!(
        "sponsored token:  {} ({} decimals)",
        config.sponsored_token.mint, config.sponsored_token.decimals
    );
    println!(
        "fees:             buy {} bps, sell {} bps, min trade {}",
        config.policy.fee_bps.buy, config.policy.fee_bps.sell, config.policy.min_trade_size
    );
    println!(
        "slippage:         user [{}, {}], auto {} (max {}), default {}",
        config.policy.min_slippage_bps,
        config.policy.max_user_slippage_bps,
        config.policy.auto_slippage,
        config.policy.max_auto_slippage_bps,
        config.policy.max_default_slippage_bps
    );
    println!("build attempts:   {}", config.policy.max_build_attempts);
    match FeePayer::from_wallet(&config.global.wallet) {
        Ok(payer) => println!("fee payer:        {}", payer.pubkey),
        Err(err) => {
            warn!(target: "cli::config", error = %err, "fee payer 私钥不可用");
            println!("fee payer:        not configured");
        }
    }
    Ok(())
}
