use std::fs;
use std::sync::Arc;

use anyhow::{Result, anyhow};
use time::{UtcOffset, macros::format_description};
use tracing_subscriber::fmt::time::OffsetTime;
use tracing_subscriber::{EnvFilter, fmt};

use crate::config::{LoggingConfig, LoggingProfile, SponsorConfig};
use crate::engine::{SponsorService, WalletAddressAuth};

const CONFIG_TEMPLATE: &str = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/sponsor.toml"));

/// 初始化 tracing，支持文本与 JSON 两种输出。
pub fn init_tracing(config: &LoggingConfig) -> Result<()> {
    let mut filter = EnvFilter::try_new(&config.level).unwrap_or_else(|_| EnvFilter::new("info"));

    // 依赖库日志默认静默，除非 level 中显式指定。
    if matches!(config.profile, LoggingProfile::Lean) {
        const QUIET_TARGETS: &[(&str, &str)] = &[
            ("hyper", "warn"),
            ("hyper_util::client::legacy", "warn"),
            ("reqwest", "info"),
            ("solana_rpc_client", "warn"),
        ];
        for (module, level) in QUIET_TARGETS {
            if !config.level.contains(module) {
                if let Ok(directive) = format!("{module}={level}").parse() {
                    filter = filter.add_directive(directive);
                }
            }
        }
    }

    if matches!(config.profile, LoggingProfile::Verbose) {
        const VERBOSE_TARGETS: &[(&str, &str)] = &[
            ("jupiter::quote", "debug"),
            ("jupiter::swap", "debug"),
            ("engine::builder", "debug"),
            ("engine::submitter", "debug"),
            ("monitoring::swap", "info"),
        ];
        for (module, level) in VERBOSE_TARGETS {
            if let Ok(directive) = format!("{module}={level}").parse() {
                filter = filter.add_directive(directive);
            }
        }
    }

    let time_format =
        format_description!("[year]-[month]-[day] [hour]:[minute]:[second].[subsecond digits:3]");
    let offset = UtcOffset::from_hms(config.timezone_offset_hours, 0, 0).map_err(|err| {
        anyhow!(
            "日志时区偏移无效 {}: {err}",
            config.timezone_offset_hours
        )
    })?;
    let offset_timer = OffsetTime::new(offset, time_format);

    let base = fmt()
        .with_timer(offset_timer)
        .with_file(false)
        .with_line_number(false)
        .with_thread_ids(false)
        .with_target(true)
        .with_level(true);

    if config.json {
        base.json()
            .with_current_span(false)
            .with_span_list(false)
            .with_env_filter(filter)
            .try_init()
            .map_err(|err| anyhow!(err.to_string()))?;
    } else {
        base.with_env_filter(filter)
            .event_format(fmt::format().compact())
            .try_init()
            .map_err(|err| anyhow!(err.to_string()))?;
    }
    Ok(())
}

pub fn init_configs(args: crate::cli::args::InitCmd) -> Result<()> {
    let output_dir = match args.output {
        Some(dir) => dir,
        None => std::env::current_dir()?,
    };
    fs::create_dir_all(&output_dir)?;

    let target_path = output_dir.join("sponsor.toml");
    if target_path.exists() && !args.force {
        println!(
            "跳过 {}（文件已存在，使用 --force 覆盖）",
            target_path.display()
        );
        return Ok(());
    }
    fs::write(&target_path, CONFIG_TEMPLATE)?;
    println!("wrote {}", target_path.display());
    Ok(())
}

/// Local commands act for the wallet named on the command line, so the
/// wallet address doubles as the bearer token.
pub async fn build_service(config: &SponsorConfig) -> Result<SponsorService> {
    SponsorService::from_config(config, Arc::new(WalletAddressAuth))
        .await
        .map_err(|err| anyhow!(err))
}
