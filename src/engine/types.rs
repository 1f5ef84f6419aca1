use std::sync::Arc;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use serde_with::{DisplayFromStr, PickFirst, serde_as};
use solana_sdk::message::VersionedMessage;
use solana_sdk::pubkey::Pubkey;

use crate::api::serde_helpers::field_as_string;
use crate::config::PolicyConfig;
use crate::instructions::token::associated_token_address;

/// 用户的 swap 意图，发出后不可变。
#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SwapRequest {
    #[serde(with = "field_as_string")]
    pub buy_token_id: Pubkey,
    #[serde(with = "field_as_string")]
    pub sell_token_id: Pubkey,
    /// 卖出 token 的最小单位数量。输出为整数，输入也接受十进制字符串。
    #[serde_as(as = "PickFirst<(_, DisplayFromStr)>")]
    pub sell_quantity: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slippage_bps: Option<u16>,
}

/// A swap request resolved against a wallet: token programs and the
/// associated accounts involved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveSwapRequest {
    pub request: SwapRequest,
    pub user: Pubkey,
    pub sell_token_program: Pubkey,
    pub buy_token_program: Pubkey,
    pub sell_token_account: Pubkey,
    pub buy_token_account: Pubkey,
}

impl ActiveSwapRequest {
    pub fn derive(
        request: SwapRequest,
        user: Pubkey,
        sell_token_program: Pubkey,
        buy_token_program: Pubkey,
    ) -> Self {
        let sell_token_account =
            associated_token_address(&user, &request.sell_token_id, &sell_token_program);
        let buy_token_account =
            associated_token_address(&user, &request.buy_token_id, &buy_token_program);
        Self {
            request,
            user,
            sell_token_program,
            buy_token_program,
            sell_token_account,
            buy_token_account,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionType {
    Buy,
    SellPartial,
    SellAll,
    Transfer,
}

impl TransactionType {
    pub fn as_str(self) -> &'static str {
        match self {
            TransactionType::Buy => "BUY",
            TransactionType::SellPartial => "SELL_PARTIAL",
            TransactionType::SellAll => "SELL_ALL",
            TransactionType::Transfer => "TRANSFER",
        }
    }

    pub fn is_sell(self) -> bool {
        matches!(self, TransactionType::SellPartial | TransactionType::SellAll)
    }
}

/// 重建所需信息：原始请求与构建时的 policy。
#[derive(Debug, Clone)]
pub struct RebuildSnapshot {
    pub request: SwapRequest,
    pub policy: Arc<PolicyConfig>,
}

#[derive(Debug, Clone)]
pub struct TransactionRegistryEntry {
    pub message: VersionedMessage,
    pub last_valid_block_height: u64,
    pub transaction_type: TransactionType,
    pub created_at: Instant,
    pub build_attempts: u32,
    /// 滑点由服务选择而非用户指定。
    pub auto_slippage: bool,
    pub context_slot: Option<u64>,
    pub user: Pubkey,
    pub snapshot: Option<RebuildSnapshot>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SwapResponse {
    #[serde(flatten)]
    pub request: SwapRequest,
    pub transaction_message_base64: String,
    pub has_fee: bool,
    #[serde(with = "field_as_string")]
    pub fee_amount: u64,
    pub transaction_type: TransactionType,
    /// unix 毫秒时间戳。
    pub timestamp: u64,
    pub build_attempts: u32,
    pub last_valid_block_height: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PresignedSwapResponse {
    #[serde(flatten)]
    pub swap: SwapResponse,
    /// fee payer 对消息的 base58 签名。
    pub fee_payer_signature: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SubmissionOutcome {
    Success { txid: String },
    Fail { reason: String },
    Rebuild { new_response: Box<SwapResponse> },
}

impl SubmissionOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            SubmissionOutcome::Success { .. } => "success",
            SubmissionOutcome::Fail { .. } => "fail",
            SubmissionOutcome::Rebuild { .. } => "rebuild",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ResponseType {
    Success,
    Fail,
    Rebuild,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionResponse {
    pub response_type: ResponseType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub txid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rebuild: Option<SwapResponse>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<SubmissionOutcome> for SubmissionResponse {
    fn from(value: SubmissionOutcome) -> Self {
        match value {
            SubmissionOutcome::Success { txid } => Self {
                response_type: ResponseType::Success,
                txid: Some(txid),
                rebuild: None,
                error: None,
            },
            SubmissionOutcome::Fail { reason } => Self {
                response_type: ResponseType::Fail,
                txid: None,
                rebuild: None,
                error: Some(reason),
            },
            SubmissionOutcome::Rebuild { new_response } => Self {
                response_type: ResponseType::Rebuild,
                txid: None,
                rebuild: Some(*new_response),
                error: None,
            },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TransferRequest {
    #[serde(with = "field_as_string")]
    pub recipient: Pubkey,
    /// Mint being sent; the native mint means SOL.
    #[serde(with = "field_as_string")]
    pub token_id: Pubkey,
    #[serde(with = "field_as_string")]
    pub amount: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TransferResponse {
    #[serde(flatten)]
    pub request: TransferRequest,
    pub transaction_message_base64: String,
    pub has_fee: bool,
    #[serde(with = "field_as_string")]
    pub fee_amount: u64,
    pub timestamp: u64,
    pub last_valid_block_height: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TransferFeeEstimate {
    #[serde(with = "field_as_string")]
    pub fee_amount: u64,
    pub recipient_account_exists: bool,
}

pub fn unix_timestamp_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn swap_request_takes_integer_quantity() {
        let buy = Pubkey::new_unique();
        let sell = Pubkey::new_unique();
        let request: SwapRequest = serde_json::from_value(json!({
            "buyTokenId": buy.to_string(),
            "sellTokenId": sell.to_string(),
            "sellQuantity": 2_500_000,
            "slippageBps": 75
        }))
        .expect("parse request");
        assert_eq!(request.buy_token_id, buy);
        assert_eq!(request.sell_quantity, 2_500_000);
        assert_eq!(request.slippage_bps, Some(75));

        let wire = serde_json::to_value(&request).expect("serialize request");
        assert_eq!(wire["sellQuantity"], json!(2_500_000));
        assert_eq!(wire["buyTokenId"], json!(buy.to_string()));
    }

    #[test]
    fn swap_request_still_accepts_string_quantity() {
        let request: SwapRequest = serde_json::from_value(json!({
            "buyTokenId": Pubkey::new_unique().to_string(),
            "sellTokenId": Pubkey::new_unique().to_string(),
            "sellQuantity": "2500000"
        }))
        .expect("parse request");
        assert_eq!(request.sell_quantity, 2_500_000);
        assert_eq!(request.slippage_bps, None);
    }

    #[test]
    fn swap_response_echoes_integer_quantity() {
        let response = SwapResponse {
            request: SwapRequest {
                buy_token_id: Pubkey::new_unique(),
                sell_token_id: Pubkey::new_unique(),
                sell_quantity: 7,
                slippage_bps: None,
            },
            transaction_message_base64: "AA==".into(),
            has_fee: false,
            fee_amount: 0,
            transaction_type: TransactionType::Buy,
            timestamp: 1,
            build_attempts: 1,
            last_valid_block_height: 10,
        };
        let wire = serde_json::to_value(&response).expect("serialize response");
        assert_eq!(wire["sellQuantity"], json!(7));
        let back: SwapResponse = serde_json::from_value(wire).expect("parse response");
        assert_eq!(back.request.sell_quantity, 7);
    }

    #[test]
    fn rebuild_outcome_maps_to_rebuild_response() {
        let response = SwapResponse {
            request: SwapRequest {
                buy_token_id: Pubkey::new_unique(),
                sell_token_id: Pubkey::new_unique(),
                sell_quantity: 10,
                slippage_bps: None,
            },
            transaction_message_base64: "AA==".into(),
            has_fee: true,
            fee_amount: 1,
            transaction_type: TransactionType::SellPartial,
            timestamp: 1,
            build_attempts: 2,
            last_valid_block_height: 100,
        };
        let wire = SubmissionResponse::from(SubmissionOutcome::Rebuild {
            new_response: Box::new(response.clone()),
        });
        let value = serde_json::to_value(&wire).expect("serialize");
        assert_eq!(value["responseType"], json!("rebuild"));
        assert_eq!(value["rebuild"]["buildAttempts"], json!(2));
        assert_eq!(value["rebuild"]["transactionType"], json!("SELL_PARTIAL"));
        assert!(value.get("txid").is_none());
    }

    #[test]
    fn active_request_derives_associated_accounts() {
        let user = Pubkey::new_unique();
        let request = SwapRequest {
            buy_token_id: Pubkey::new_unique(),
            sell_token_id: Pubkey::new_unique(),
            sell_quantity: 1,
            slippage_bps: Some(50),
        };
        let active =
            ActiveSwapRequest::derive(request.clone(), user, spl_token::ID, spl_token_2022::ID);
        assert_eq!(
            active.sell_token_account,
            associated_token_address(&user, &request.sell_token_id, &spl_token::ID)
        );
        assert_eq!(
            active.buy_token_account,
            associated_token_address(&user, &request.buy_token_id, &spl_token_2022::ID)
        );
    }
}
