use serde::Deserialize;
use serde_with::{DisplayFromStr, serde_as};
use solana_sdk::pubkey::Pubkey;
use url::Url;

use super::loader::ConfigError;

#[derive(Debug, Clone, Deserialize)]
pub struct SponsorConfig {
    #[serde(default)]
    pub global: GlobalConfig,
    #[serde(default)]
    pub jupiter: JupiterApiConfig,
    #[serde(default)]
    pub sponsored_token: SponsoredTokenConfig,
    #[serde(default)]
    pub policy: PolicyConfig,
    #[serde(default)]
    pub compute_budget: ComputeBudgetConfig,
    #[serde(default)]
    pub registry: RegistryConfig,
    #[serde(default)]
    pub stream: StreamConfig,
    #[serde(default)]
    pub submission: SubmissionConfig,
    #[serde(default)]
    pub prometheus: PrometheusConfig,
}

impl SponsorConfig {
    /// 拒绝会导致所有构建失败的配置组合。
    pub fn validate(&self) -> Result<(), ConfigError> {
        for url in self
            .global
            .rpc_urls
            .iter()
            .chain([&self.jupiter.quote_url, &self.jupiter.swap_url])
        {
            Url::parse(url)
                .map_err(|err| ConfigError::Invalid(format!("invalid url {url}: {err}")))?;
        }
        self.policy.validate()?;
        if self.compute_budget.min_unit_price_micro_lamports
            > self.compute_budget.max_unit_price_micro_lamports
        {
            return Err(ConfigError::Invalid(
                "compute_budget.min_unit_price_micro_lamports exceeds max".into(),
            ));
        }
        if self.compute_budget.priority_fee_percentile > 100 {
            return Err(ConfigError::Invalid(
                "compute_budget.priority_fee_percentile must be within 0..=100".into(),
            ));
        }
        if self.registry.ttl_secs == 0 || self.registry.max_entries == 0 {
            return Err(ConfigError::Invalid(
                "registry.ttl_secs and registry.max_entries must be positive".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct GlobalConfig {
    #[serde(default, deserialize_with = "super::deserialize_rpc_urls")]
    pub rpc_urls: Vec<String>,
    #[serde(default = "super::default_commitment")]
    pub commitment: String,
    #[serde(default)]
    pub wallet: WalletConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl GlobalConfig {
    pub fn primary_rpc_url(&self) -> Option<&str> {
        self.rpc_urls.first().map(|s| s.as_str())
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct WalletConfig {
    /// Fee payer 私钥：base58、JSON 字节数组或逗号分隔的字节。
    #[serde(default)]
    pub private_key: String,
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LoggingProfile {
    Lean,
    Verbose,
}

impl Default for LoggingProfile {
    fn default() -> Self {
        Self::Lean
    }
}

impl LoggingProfile {
    pub fn is_verbose(self) -> bool {
        matches!(self, Self::Verbose)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "super::default_logging_level")]
    pub level: String,
    #[serde(default)]
    pub json: bool,
    #[serde(default = "super::default_logging_profile")]
    pub profile: LoggingProfile,
    #[serde(default = "super::default_slow_quote_warn_ms")]
    pub slow_quote_warn_ms: u64,
    #[serde(default = "super::default_slow_swap_warn_ms")]
    pub slow_swap_warn_ms: u64,
    #[serde(default = "super::default_timezone_offset_hours")]
    pub timezone_offset_hours: i8,
}

/// `[jupiter]`：聚合器地址与路由默认参数。
#[derive(Debug, Clone, Deserialize)]
pub struct JupiterApiConfig {
    #[serde(default = "super::default_quote_url")]
    pub quote_url: String,
    #[serde(default = "super::default_swap_url")]
    pub swap_url: String,
    #[serde(default)]
    pub timeouts: JupiterTimeoutConfig,
    #[serde(default)]
    pub only_direct_routes: bool,
    #[serde(default = "super::default_true")]
    pub restrict_intermediate_tokens: bool,
    #[serde(default = "super::default_max_accounts")]
    pub max_accounts: Option<u16>,
    #[serde(default)]
    pub use_shared_accounts: Option<bool>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JupiterTimeoutConfig {
    #[serde(default = "super::default_quote_timeout_ms")]
    pub quote_ms: u64,
    #[serde(default = "super::default_swap_timeout_ms")]
    pub swap_ms: u64,
}

/// 用户支付手续费所用的 token。
#[serde_as]
#[derive(Debug, Clone, Deserialize)]
pub struct SponsoredTokenConfig {
    #[serde_as(as = "DisplayFromStr")]
    #[serde(default = "super::default_sponsored_mint")]
    pub mint: Pubkey,
    #[serde(default = "super::default_sponsored_decimals")]
    pub decimals: u8,
}

/// 实时 policy。每次构建只取一次 `Arc` 快照，之后的 reload 不会影响它。
#[serde_as]
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct PolicyConfig {
    #[serde(default = "super::default_min_slippage_bps")]
    pub min_slippage_bps: u16,
    #[serde(default = "super::default_max_user_slippage_bps")]
    pub max_user_slippage_bps: u16,
    #[serde(default = "super::default_max_auto_slippage_bps")]
    pub max_auto_slippage_bps: u16,
    #[serde(default = "super::default_max_default_slippage_bps")]
    pub max_default_slippage_bps: u16,
    #[serde(default = "super::default_true")]
    pub auto_slippage: bool,
    #[serde(default = "super::default_max_build_attempts")]
    pub max_build_attempts: u32,
    #[serde(default)]
    pub fee_bps: FeeBpsConfig,
    /// 最小交易数量（代付 token 最小单位）。
    #[serde(default = "super::default_min_trade_size")]
    pub min_trade_size: u64,
    /// 未设置时回退为 fee payer。
    #[serde_as(as = "Option<DisplayFromStr>")]
    #[serde(default)]
    pub trade_fee_recipient: Option<Pubkey>,
}

impl PolicyConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.min_slippage_bps > self.max_user_slippage_bps {
            return Err(ConfigError::Invalid(format!(
                "policy.min_slippage_bps ({}) exceeds max_user_slippage_bps ({})",
                self.min_slippage_bps, self.max_user_slippage_bps
            )));
        }
        if self.max_build_attempts == 0 {
            return Err(ConfigError::Invalid(
                "policy.max_build_attempts must be at least 1".into(),
            ));
        }
        if self.fee_bps.buy > 10_000 || self.fee_bps.sell > 10_000 {
            return Err(ConfigError::Invalid(
                "policy.fee_bps values must not exceed 10000".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct FeeBpsConfig {
    #[serde(default = "super::default_fee_bps")]
    pub buy: u16,
    #[serde(default = "super::default_fee_bps")]
    pub sell: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ComputeBudgetConfig {
    /// 对每条编译后的消息做模拟，以确定 unit limit。
    #[serde(default = "super::default_true")]
    pub simulate: bool,
    #[serde(default = "super::default_unit_limit")]
    pub default_unit_limit: u32,
    #[serde(default = "super::default_transfer_unit_limit")]
    pub transfer_unit_limit: u32,
    #[serde(default = "super::default_unit_limit_margin")]
    pub unit_limit_margin: f64,
    #[serde(default = "super::default_min_unit_price")]
    pub min_unit_price_micro_lamports: u64,
    #[serde(default = "super::default_max_unit_price")]
    pub max_unit_price_micro_lamports: u64,
    #[serde(default = "super::default_priority_fee_percentile")]
    pub priority_fee_percentile: u8,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RegistryConfig {
    #[serde(default = "super::default_registry_ttl_secs")]
    pub ttl_secs: u64,
    #[serde(default = "super::default_registry_max_entries")]
    pub max_entries: usize,
    #[serde(default = "super::default_registry_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StreamConfig {
    #[serde(default = "super::default_stream_interval_ms")]
    pub interval_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SubmissionConfig {
    #[serde(default)]
    pub skip_preflight: bool,
    #[serde(default)]
    pub max_retries: Option<usize>,
    #[serde(default = "super::default_confirm_poll_interval_ms")]
    pub confirm_poll_interval_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PrometheusConfig {
    #[serde(default)]
    pub enable: bool,
    #[serde(default = "super::default_prometheus_listen")]
    pub listen: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Deserialize)]
    struct Wrapper {
        global: GlobalConfig,
    }

    #[test]
    fn deserialize_single_rpc_url_string() {
        let raw = "[global]\nrpc_urls = \"http://localhost:8899\"\n";
        let wrapper: Wrapper = toml::from_str(raw).expect("parse toml");
        assert_eq!(wrapper.global.rpc_urls, vec!["http://localhost:8899".to_string()]);
    }

    #[test]
    fn deserialize_multiple_rpc_urls_dedup() {
        let raw = "[global]\nrpc_urls = [\"http://a:8899\", \"http://b:8899\", \"http://a:8899\"]\n";
        let wrapper: Wrapper = toml::from_str(raw).expect("parse toml");
        assert_eq!(
            wrapper.global.rpc_urls,
            vec!["http://a:8899".to_string(), "http://b:8899".to_string()]
        );
    }

    #[test]
    fn policy_section_parses_pubkeys_and_defaults() {
        let raw = r#"
            [policy]
            max_build_attempts = 5
            trade_fee_recipient = "11111111111111111111111111111111"

            [policy.fee_bps]
            sell = 75
        "#;
        let config: SponsorConfig = toml::from_str(raw).expect("parse toml");
        assert_eq!(config.policy.max_build_attempts, 5);
        assert_eq!(config.policy.fee_bps.sell, 75);
        assert_eq!(config.policy.fee_bps.buy, 50);
        assert_eq!(
            config.policy.trade_fee_recipient,
            Some(Pubkey::default())
        );
        assert!(config.policy.auto_slippage);
        assert_eq!(config.registry.ttl_secs, 300);
    }

    #[test]
    fn validate_rejects_inverted_slippage_bounds() {
        let mut config = SponsorConfig::default();
        config.policy.min_slippage_bps = 600;
        config.policy.max_user_slippage_bps = 500;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn validate_rejects_malformed_urls() {
        let mut config = SponsorConfig::default();
        config.global.rpc_urls = vec!["not a url".to_string()];
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn default_config_is_valid() {
        SponsorConfig::default()
            .validate()
            .expect("defaults should validate");
    }
}
