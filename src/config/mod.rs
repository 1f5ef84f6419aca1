use std::collections::HashSet;

use serde::Deserialize;
use serde::de::Deserializer;
use solana_sdk::pubkey::Pubkey;

pub mod loader;
pub mod service;
pub mod types;

pub use loader::*;
pub use service::ConfigService;
pub use types::*;

use self::types as cfg;

/// 主网 USDC，默认的代付 token。
pub const DEFAULT_SPONSORED_MINT: Pubkey =
    solana_sdk::pubkey!("EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v");

pub(crate) fn default_true() -> bool {
    true
}

pub(crate) fn default_logging_level() -> String {
    "info".to_string()
}

pub(crate) fn default_logging_profile() -> cfg::LoggingProfile {
    cfg::LoggingProfile::Lean
}

pub(crate) fn default_slow_quote_warn_ms() -> u64 {
    300
}

pub(crate) fn default_slow_swap_warn_ms() -> u64 {
    500
}

pub(crate) fn default_timezone_offset_hours() -> i8 {
    0
}

pub(crate) fn default_commitment() -> String {
    "confirmed".to_string()
}

pub(crate) fn default_quote_url() -> String {
    "https://lite-api.jup.ag/swap/v1/quote".to_string()
}

pub(crate) fn default_swap_url() -> String {
    "https://lite-api.jup.ag/swap/v1/swap-instructions".to_string()
}

pub(crate) fn default_quote_timeout_ms() -> u64 {
    2_000
}

pub(crate) fn default_swap_timeout_ms() -> u64 {
    3_000
}

pub(crate) fn default_max_accounts() -> Option<u16> {
    Some(48)
}

pub(crate) fn default_sponsored_mint() -> Pubkey {
    DEFAULT_SPONSORED_MINT
}

pub(crate) fn default_sponsored_decimals() -> u8 {
    6
}

pub(crate) fn default_min_slippage_bps() -> u16 {
    10
}

pub(crate) fn default_max_user_slippage_bps() -> u16 {
    500
}

pub(crate) fn default_max_auto_slippage_bps() -> u16 {
    300
}

pub(crate) fn default_max_default_slippage_bps() -> u16 {
    100
}

pub(crate) fn default_max_build_attempts() -> u32 {
    3
}

pub(crate) fn default_fee_bps() -> u16 {
    50
}

pub(crate) fn default_min_trade_size() -> u64 {
    10_000
}

pub(crate) fn default_unit_limit() -> u32 {
    200_000
}

pub(crate) fn default_unit_limit_margin() -> f64 {
    1.1
}

pub(crate) fn default_transfer_unit_limit() -> u32 {
    60_000
}

pub(crate) fn default_min_unit_price() -> u64 {
    1_000
}

pub(crate) fn default_max_unit_price() -> u64 {
    2_000_000
}

pub(crate) fn default_priority_fee_percentile() -> u8 {
    50
}

pub(crate) fn default_registry_ttl_secs() -> u64 {
    300
}

pub(crate) fn default_registry_max_entries() -> usize {
    10_000
}

pub(crate) fn default_registry_sweep_interval_secs() -> u64 {
    30
}

pub(crate) fn default_stream_interval_ms() -> u64 {
    5_000
}

pub(crate) fn default_confirm_poll_interval_ms() -> u64 {
    500
}

pub(crate) fn default_prometheus_listen() -> String {
    "0.0.0.0:9898".to_string()
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RpcUrlField {
    Single(String),
    Multiple(Vec<String>),
}

pub(crate) fn deserialize_rpc_urls<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let helper = Option::<RpcUrlField>::deserialize(deserializer)?;
    let mut seen = HashSet::new();
    let mut urls = Vec::new();

    let values = match helper {
        Some(RpcUrlField::Single(url)) => vec![url],
        Some(RpcUrlField::Multiple(list)) => list,
        None => Vec::new(),
    };

    for value in values {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            continue;
        }
        if seen.insert(trimmed.to_string()) {
            urls.push(trimmed.to_string());
        }
    }

    Ok(urls)
}

impl Default for cfg::SponsorConfig {
    fn default() -> Self {
        Self {
            global: cfg::GlobalConfig::default(),
            jupiter: cfg::JupiterApiConfig::default(),
            sponsored_token: cfg::SponsoredTokenConfig::default(),
            policy: cfg::PolicyConfig::default(),
            compute_budget: cfg::ComputeBudgetConfig::default(),
            registry: cfg::RegistryConfig::default(),
            stream: cfg::StreamConfig::default(),
            submission: cfg::SubmissionConfig::default(),
            prometheus: cfg::PrometheusConfig::default(),
        }
    }
}

impl Default for cfg::GlobalConfig {
    fn default() -> Self {
        Self {
            rpc_urls: Vec::new(),
            commitment: default_commitment(),
            wallet: cfg::WalletConfig::default(),
            logging: cfg::LoggingConfig::default(),
        }
    }
}

impl Default for cfg::LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_logging_level(),
            json: false,
            profile: default_logging_profile(),
            slow_quote_warn_ms: default_slow_quote_warn_ms(),
            slow_swap_warn_ms: default_slow_swap_warn_ms(),
            timezone_offset_hours: default_timezone_offset_hours(),
        }
    }
}

impl Default for cfg::JupiterApiConfig {
    fn default() -> Self {
        Self {
            quote_url: default_quote_url(),
            swap_url: default_swap_url(),
            timeouts: cfg::JupiterTimeoutConfig::default(),
            only_direct_routes: false,
            restrict_intermediate_tokens: true,
            max_accounts: default_max_accounts(),
            use_shared_accounts: None,
        }
    }
}

impl Default for cfg::JupiterTimeoutConfig {
    fn default() -> Self {
        Self {
            quote_ms: default_quote_timeout_ms(),
            swap_ms: default_swap_timeout_ms(),
        }
    }
}

impl Default for cfg::SponsoredTokenConfig {
    fn default() -> Self {
        Self {
            mint: default_sponsored_mint(),
            decimals: default_sponsored_decimals(),
        }
    }
}

impl Default for cfg::PolicyConfig {
    fn default() -> Self {
        Self {
            min_slippage_bps: default_min_slippage_bps(),
            max_user_slippage_bps: default_max_user_slippage_bps(),
            max_auto_slippage_bps: default_max_auto_slippage_bps(),
            max_default_slippage_bps: default_max_default_slippage_bps(),
            auto_slippage: true,
            max_build_attempts: default_max_build_attempts(),
            fee_bps: cfg::FeeBpsConfig::default(),
            min_trade_size: default_min_trade_size(),
            trade_fee_recipient: None,
        }
    }
}

impl Default for cfg::FeeBpsConfig {
    fn default() -> Self {
        Self {
            buy: default_fee_bps(),
            sell: default_fee_bps(),
        }
    }
}

impl Default for cfg::ComputeBudgetConfig {
    fn default() -> Self {
        Self {
            simulate: true,
            default_unit_limit: default_unit_limit(),
            transfer_unit_limit: default_transfer_unit_limit(),
            unit_limit_margin: default_unit_limit_margin(),
            min_unit_price_micro_lamports: default_min_unit_price(),
            max_unit_price_micro_lamports: default_max_unit_price(),
            priority_fee_percentile: default_priority_fee_percentile(),
        }
    }
}

impl Default for cfg::RegistryConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_registry_ttl_secs(),
            max_entries: default_registry_max_entries(),
            sweep_interval_secs: default_registry_sweep_interval_secs(),
        }
    }
}

impl Default for cfg::StreamConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_stream_interval_ms(),
        }
    }
}

impl Default for cfg::SubmissionConfig {
    fn default() -> Self {
        Self {
            skip_preflight: false,
            max_retries: None,
            confirm_poll_interval_ms: default_confirm_poll_interval_ms(),
        }
    }
}

impl Default for cfg::PrometheusConfig {
    fn default() -> Self {
        Self {
            enable: false,
            listen: default_prometheus_listen(),
        }
    }
}
