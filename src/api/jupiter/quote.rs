use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use solana_sdk::pubkey::Pubkey;

use crate::api::serde_helpers::{decimal_from_string, field_as_string};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum SwapMode {
    #[default]
    #[serde(rename = "ExactIn", alias = "exactIn")]
    ExactIn,
    #[serde(rename = "ExactOut", alias = "exactOut")]
    ExactOut,
}

impl SwapMode {
    pub fn as_str(self) -> &'static str {
        match self {
            SwapMode::ExactIn => "ExactIn",
            SwapMode::ExactOut => "ExactOut",
        }
    }
}

/// 路由允许的滑点。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlippageSetting {
    /// 固定滑点（bps）。
    Fixed(u16),
    /// 由聚合器自动选择，不超过上限。
    Auto { max_bps: u16 },
}

/// `/quote` request, sent as a query string.
#[derive(Debug, Clone)]
pub struct QuoteRequest {
    pub input_mint: Pubkey,
    pub output_mint: Pubkey,
    pub amount: u64,
    pub swap_mode: SwapMode,
    pub slippage: SlippageSetting,
    pub only_direct_routes: Option<bool>,
    pub restrict_intermediate_tokens: Option<bool>,
    pub max_accounts: Option<u16>,
}

impl QuoteRequest {
    pub fn new(input_mint: Pubkey, output_mint: Pubkey, amount: u64, slippage: SlippageSetting) -> Self {
        Self {
            input_mint,
            output_mint,
            amount,
            swap_mode: SwapMode::ExactIn,
            slippage,
            only_direct_routes: None,
            restrict_intermediate_tokens: None,
            max_accounts: None,
        }
    }

    pub fn to_query_params(&self) -> Vec<(String, String)> {
        let mut params = Vec::with_capacity(10);
        params.push(("inputMint".to_string(), self.input_mint.to_string()));
        params.push(("outputMint".to_string(), self.output_mint.to_string()));
        params.push(("amount".to_string(), self.amount.to_string()));
        params.push(("swapMode".to_string(), self.swap_mode.as_str().to_string()));
        match self.slippage {
            SlippageSetting::Fixed(bps) => {
                params.push(("slippageBps".to_string(), bps.to_string()));
            }
            SlippageSetting::Auto { max_bps } => {
                params.push(("autoSlippage".to_string(), "true".to_string()));
                params.push(("maxAutoSlippageBps".to_string(), max_bps.to_string()));
            }
        }
        if let Some(value) = self.only_direct_routes {
            params.push(("onlyDirectRoutes".to_string(), value.to_string()));
        }
        if let Some(value) = self.restrict_intermediate_tokens {
            params.push(("restrictIntermediateTokens".to_string(), value.to_string()));
        }
        if let Some(value) = self.max_accounts {
            params.push(("maxAccounts".to_string(), value.to_string()));
        }
        params
    }
}

/// `/quote` 响应体，原样回传给 `/swap-instructions`。
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuoteResponsePayload {
    #[serde(with = "field_as_string")]
    pub input_mint: Pubkey,
    #[serde(with = "field_as_string")]
    pub output_mint: Pubkey,
    #[serde(with = "field_as_string")]
    pub in_amount: u64,
    #[serde(with = "field_as_string")]
    pub out_amount: u64,
    /// Minimum output after slippage for ExactIn routes.
    #[serde(with = "field_as_string")]
    pub other_amount_threshold: u64,
    pub swap_mode: SwapMode,
    pub slippage_bps: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub computed_auto_slippage: Option<u16>,
    #[serde(with = "decimal_from_string")]
    pub price_impact_pct: Decimal,
    #[serde(default)]
    pub context_slot: Option<u64>,
    #[serde(default)]
    pub time_taken: Option<f64>,
    #[serde(default)]
    pub route_plan: Vec<Value>,
    #[serde(default)]
    pub platform_fee: Option<Value>,
}

#[derive(Clone, Debug)]
pub struct QuoteResponse {
    data: QuoteResponsePayload,
}

impl QuoteResponse {
    pub fn try_from_value(value: Value) -> Result<Self, serde_json::Error> {
        let data: QuoteResponsePayload = serde_json::from_value(value)?;
        Ok(Self { data })
    }

    pub fn payload(&self) -> &QuoteResponsePayload {
        &self.data
    }

    pub fn into_payload(self) -> QuoteResponsePayload {
        self.data
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn param<'a>(params: &'a [(String, String)], key: &str) -> Option<&'a str> {
        params
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    #[test]
    fn auto_slippage_sends_ceiling_instead_of_fixed_bps() {
        let request = QuoteRequest::new(
            Pubkey::new_unique(),
            Pubkey::new_unique(),
            1_000,
            SlippageSetting::Auto { max_bps: 300 },
        );
        let params = request.to_query_params();
        assert_eq!(param(&params, "autoSlippage"), Some("true"));
        assert_eq!(param(&params, "maxAutoSlippageBps"), Some("300"));
        assert_eq!(param(&params, "slippageBps"), None);
    }

    #[test]
    fn fixed_slippage_sends_bps_only() {
        let mut request = QuoteRequest::new(
            Pubkey::new_unique(),
            Pubkey::new_unique(),
            1_000,
            SlippageSetting::Fixed(75),
        );
        request.max_accounts = Some(48);
        let params = request.to_query_params();
        assert_eq!(param(&params, "slippageBps"), Some("75"));
        assert_eq!(param(&params, "autoSlippage"), None);
        assert_eq!(param(&params, "maxAccounts"), Some("48"));
    }

    #[test]
    fn parses_string_encoded_amounts() {
        let input = Pubkey::new_unique();
        let output = Pubkey::new_unique();
        let value = json!({
            "inputMint": input.to_string(),
            "outputMint": output.to_string(),
            "inAmount": "1000000",
            "outAmount": "4200",
            "otherAmountThreshold": "4158",
            "swapMode": "ExactIn",
            "slippageBps": 100,
            "priceImpactPct": "0.0012",
            "contextSlot": 321,
            "routePlan": []
        });
        let quote = QuoteResponse::try_from_value(value).expect("parse quote");
        let payload = quote.payload();
        assert_eq!(payload.input_mint, input);
        assert_eq!(payload.in_amount, 1_000_000);
        assert_eq!(payload.other_amount_threshold, 4_158);
        assert_eq!(payload.context_slot, Some(321));
    }
}
