use serde::{Deserialize, Serialize};
use serde_json::Value;
use solana_sdk::instruction::{AccountMeta, Instruction};
use solana_sdk::pubkey::Pubkey;

use super::quote::QuoteResponsePayload;
use crate::api::serde_helpers::{field_as_string, option_field_as_string};

/// `/swap-instructions` request.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SwapInstructionsRequest {
    pub quote_response: QuoteResponsePayload,
    #[serde(with = "field_as_string")]
    pub user_public_key: Pubkey,
    /// 为路由新建账户支付租金的账户。
    #[serde(
        with = "option_field_as_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub payer: Option<Pubkey>,
    #[serde(
        with = "option_field_as_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub destination_token_account: Option<Pubkey>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dynamic_compute_unit_limit: Option<bool>,
    pub wrap_and_unwrap_sol: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub use_shared_accounts: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skip_user_accounts_rpc_calls: Option<bool>,
}

impl SwapInstructionsRequest {
    pub fn from_quote(response: QuoteResponsePayload, user: Pubkey) -> Self {
        Self {
            quote_response: response,
            user_public_key: user,
            payer: None,
            destination_token_account: None,
            dynamic_compute_unit_limit: None,
            wrap_and_unwrap_sol: false,
            use_shared_accounts: None,
            skip_user_accounts_rpc_calls: None,
        }
    }
}

/// `/swap-instructions` response.
#[derive(Debug, Clone)]
pub struct SwapInstructionsResponse {
    pub compute_budget_instructions: Vec<Instruction>,
    pub setup_instructions: Vec<Instruction>,
    pub swap_instruction: Instruction,
    pub cleanup_instructions: Vec<Instruction>,
    pub other_instructions: Vec<Instruction>,
    pub address_lookup_table_addresses: Vec<Pubkey>,
    pub compute_unit_limit: Option<u32>,
}

impl SwapInstructionsResponse {
    pub fn try_from(value: Value) -> Result<Self, serde_json::Error> {
        let internal: SwapInstructionsResponseInternal = serde_json::from_value(value)?;
        Ok(Self::from(internal))
    }

    /// 路由指令，已剔除 Jupiter 自带的 compute budget。
    pub fn route_instructions(&self) -> Vec<Instruction> {
        let mut instructions = Vec::with_capacity(
            self.setup_instructions.len()
                + 1
                + self.cleanup_instructions.len()
                + self.other_instructions.len(),
        );
        instructions.extend(self.setup_instructions.iter().cloned());
        instructions.push(self.swap_instruction.clone());
        instructions.extend(self.cleanup_instructions.iter().cloned());
        instructions.extend(self.other_instructions.iter().cloned());
        instructions
    }
}

impl From<SwapInstructionsResponseInternal> for SwapInstructionsResponse {
    fn from(value: SwapInstructionsResponseInternal) -> Self {
        let mut cleanup: Vec<Instruction> = value
            .cleanup_instructions
            .into_iter()
            .map(Into::into)
            .collect();
        if let Some(single) = value.cleanup_instruction {
            cleanup.push(single.into());
        }

        Self {
            compute_budget_instructions: value
                .compute_budget_instructions
                .into_iter()
                .map(Into::into)
                .collect(),
            setup_instructions: value
                .setup_instructions
                .into_iter()
                .map(Into::into)
                .collect(),
            swap_instruction: value.swap_instruction.into(),
            cleanup_instructions: cleanup,
            other_instructions: value
                .other_instructions
                .into_iter()
                .map(Into::into)
                .collect(),
            address_lookup_table_addresses: value
                .address_lookup_table_addresses
                .into_iter()
                .map(|wrapper| wrapper.0)
                .collect(),
            compute_unit_limit: value.compute_unit_limit,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SwapInstructionsResponseInternal {
    #[serde(default)]
    compute_budget_instructions: Vec<InstructionInternal>,
    #[serde(default)]
    setup_instructions: Vec<InstructionInternal>,
    swap_instruction: InstructionInternal,
    #[serde(default)]
    cleanup_instruction: Option<InstructionInternal>,
    #[serde(default)]
    cleanup_instructions: Vec<InstructionInternal>,
    #[serde(default)]
    other_instructions: Vec<InstructionInternal>,
    #[serde(default)]
    address_lookup_table_addresses: Vec<PubkeyWrapper>,
    #[serde(default)]
    compute_unit_limit: Option<u32>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InstructionInternal {
    #[serde(with = "field_as_string")]
    program_id: Pubkey,
    accounts: Vec<AccountMetaInternal>,
    #[serde(with = "base64_serde")]
    data: Vec<u8>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AccountMetaInternal {
    #[serde(with = "field_as_string")]
    pubkey: Pubkey,
    is_signer: bool,
    is_writable: bool,
}

#[derive(Debug, Clone, Deserialize)]
struct PubkeyWrapper(#[serde(with = "field_as_string")] Pubkey);

impl From<AccountMetaInternal> for AccountMeta {
    fn from(value: AccountMetaInternal) -> Self {
        Self {
            pubkey: value.pubkey,
            is_signer: value.is_signer,
            is_writable: value.is_writable,
        }
    }
}

impl From<InstructionInternal> for Instruction {
    fn from(value: InstructionInternal) -> Self {
        Self {
            program_id: value.program_id,
            accounts: value.accounts.into_iter().map(Into::into).collect(),
            data: value.data,
        }
    }
}

mod base64_serde {
    use base64::{Engine, engine::general_purpose};
    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        general_purpose::STANDARD
            .decode(raw.as_bytes())
            .map_err(|err| serde::de::Error::custom(format!("base64 decode error: {err}")))
    }
}

#[cfg(test)]
mod tests {
    use base64::{Engine, engine::general_purpose};
    use serde_json::json;

    use super::*;

    fn raw_instruction(program: Pubkey, tag: u8) -> Value {
        json!({
            "programId": program.to_string(),
            "accounts": [{
                "pubkey": Pubkey::new_unique().to_string(),
                "isSigner": false,
                "isWritable": true
            }],
            "data": general_purpose::STANDARD.encode([tag]),
        })
    }

    #[test]
    fn route_instructions_skip_compute_budget_and_keep_order() {
        let program = Pubkey::new_unique();
        let table = Pubkey::new_unique();
        let value = json!({
            "computeBudgetInstructions": [raw_instruction(crate::instructions::compute_budget::COMPUTE_BUDGET_PROGRAM_ID, 2)],
            "setupInstructions": [raw_instruction(program, 1)],
            "swapInstruction": raw_instruction(program, 2),
            "cleanupInstruction": raw_instruction(program, 3),
            "otherInstructions": [],
            "addressLookupTableAddresses": [table.to_string()],
            "computeUnitLimit": 180000
        });

        let response = SwapInstructionsResponse::try_from(value).expect("parse response");
        let tags: Vec<u8> = response
            .route_instructions()
            .iter()
            .map(|ix| ix.data[0])
            .collect();
        assert_eq!(tags, vec![1, 2, 3]);
        assert_eq!(response.address_lookup_table_addresses, vec![table]);
        assert_eq!(response.compute_unit_limit, Some(180_000));
        assert_eq!(response.compute_budget_instructions.len(), 1);
    }

    #[test]
    fn missing_swap_instruction_is_rejected() {
        let value = json!({ "setupInstructions": [] });
        assert!(SwapInstructionsResponse::try_from(value).is_err());
    }

    #[test]
    fn request_serializes_payer_and_omits_empty_options() {
        let payload: QuoteResponsePayload = serde_json::from_value(json!({
            "inputMint": Pubkey::new_unique().to_string(),
            "outputMint": Pubkey::new_unique().to_string(),
            "inAmount": "10",
            "outAmount": "9",
            "otherAmountThreshold": "9",
            "swapMode": "ExactIn",
            "slippageBps": 50,
            "priceImpactPct": "0"
        }))
        .expect("parse quote");
        let user = Pubkey::new_unique();
        let payer = Pubkey::new_unique();
        let mut request = SwapInstructionsRequest::from_quote(payload, user);
        request.payer = Some(payer);

        let value = serde_json::to_value(&request).expect("serialize request");
        assert_eq!(value["userPublicKey"], json!(user.to_string()));
        assert_eq!(value["payer"], json!(payer.to_string()));
        assert_eq!(value["wrapAndUnwrapSol"], json!(false));
        assert!(value.get("destinationTokenAccount").is_none());
    }
}
