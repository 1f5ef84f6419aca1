use std::sync::Arc;

use anyhow::anyhow;
use solana_sdk::hash::Hash;
use solana_sdk::instruction::Instruction;
use solana_sdk::message::v0::Message as V0Message;
use solana_sdk::message::{AddressLookupTableAccount, VersionedMessage};
use solana_sdk::pubkey::Pubkey;
use tracing::{debug, warn};

use crate::chain::{ChainClient, unsigned_transaction};
use crate::config::ComputeBudgetConfig;
use crate::instructions::compute_budget::{
    MAX_COMPUTE_UNIT_LIMIT, is_compute_budget, scaled_unit_limit, unit_price_from_recent_fees,
    with_compute_budget,
};

use super::error::{SponsorError, SponsorResult};

/// 网络接受的最大序列化交易大小。
pub const PACKET_DATA_SIZE: usize = 1232;
/// `getRecentPrioritizationFees` 最多接受的账户数。
const MAX_FEE_ACCOUNTS: usize = 128;

#[derive(Debug, Clone)]
pub struct CompiledMessage {
    pub message: VersionedMessage,
    pub last_valid_block_height: u64,
    pub unit_limit: u32,
    pub unit_price: u64,
}

/// Compiles fee-payer v0 messages with a sized compute budget.
#[derive(Clone)]
pub struct TransactionBuilder {
    chain: Arc<dyn ChainClient>,
    fee_payer: Pubkey,
    budget: ComputeBudgetConfig,
}

impl TransactionBuilder {
    pub fn new(chain: Arc<dyn ChainClient>, fee_payer: Pubkey, budget: ComputeBudgetConfig) -> Self {
        Self {
            chain,
            fee_payer,
            budget,
        }
    }

    pub fn budget(&self) -> &ComputeBudgetConfig {
        &self.budget
    }

    /// 移除调用方的 compute budget 指令，前置 `[limit, price]`，
    /// 并检查结果能放进一个 packet。
    pub async fn compile(
        &self,
        instructions: Vec<Instruction>,
        tables: &[AddressLookupTableAccount],
        fallback_limit: u32,
    ) -> SponsorResult<CompiledMessage> {
        let instructions: Vec<Instruction> = instructions
            .into_iter()
            .filter(|ix| !is_compute_budget(ix))
            .collect();
        if instructions.is_empty() {
            return Err(SponsorError::Validation("没有可编译的指令".into()));
        }

        let blockhash = self.chain.latest_blockhash().await?;
        let writable = writable_accounts(&instructions);

        let (unit_price, unit_limit) = futures::future::join(
            self.unit_price(&writable),
            self.unit_limit(&instructions, tables, blockhash.blockhash, fallback_limit),
        )
        .await;
        let unit_limit = unit_limit?;

        let sequence = with_compute_budget(instructions, unit_limit, unit_price);
        let message = VersionedMessage::V0(compile_message(
            &self.fee_payer,
            &sequence,
            tables,
            blockhash.blockhash,
        )?);
        ensure_fits_packet(&message)?;

        debug!(
            target: "engine::builder",
            unit_limit,
            unit_price,
            instructions = sequence.len(),
            lookup_tables = tables.len(),
            last_valid_block_height = blockhash.last_valid_block_height,
            "消息编译完成"
        );

        Ok(CompiledMessage {
            message,
            last_valid_block_height: blockhash.last_valid_block_height,
            unit_limit,
            unit_price,
        })
    }

    async fn unit_limit(
        &self,
        instructions: &[Instruction],
        tables: &[AddressLookupTableAccount],
        blockhash: Hash,
        fallback_limit: u32,
    ) -> SponsorResult<u32> {
        if !self.budget.simulate {
            return Ok(fallback_limit);
        }
        let draft = with_compute_budget(instructions.to_vec(), MAX_COMPUTE_UNIT_LIMIT, 0);
        let message = VersionedMessage::V0(compile_message(
            &self.fee_payer,
            &draft,
            tables,
            blockhash,
        )?);
        match self.chain.simulate_compute_units(&message).await {
            Ok(Some(units)) => Ok(scaled_unit_limit(units, self.budget.unit_limit_margin)),
            Ok(None) => Ok(fallback_limit),
            Err(err) => {
                warn!(
                    target: "engine::builder",
                    error = %err,
                    fallback_limit,
                    "compute unit 模拟失败"
                );
                Ok(fallback_limit)
            }
        }
    }

    async fn unit_price(&self, writable: &[Pubkey]) -> u64 {
        let min = self.budget.min_unit_price_micro_lamports;
        let max = self.budget.max_unit_price_micro_lamports;
        match self.chain.recent_prioritization_fees(writable).await {
            Ok(fees) => {
                unit_price_from_recent_fees(fees, self.budget.priority_fee_percentile, min, max)
            }
            Err(err) => {
                warn!(
                    target: "engine::builder",
                    error = %err,
                    "查询优先费失败，使用最低价格"
                );
                min
            }
        }
    }
}

fn compile_message(
    payer: &Pubkey,
    instructions: &[Instruction],
    tables: &[AddressLookupTableAccount],
    blockhash: Hash,
) -> SponsorResult<V0Message> {
    V0Message::try_compile(payer, instructions, tables, blockhash)
        .map_err(|err| SponsorError::Transaction(anyhow!(err)))
}

fn writable_accounts(instructions: &[Instruction]) -> Vec<Pubkey> {
    let mut accounts: Vec<Pubkey> = Vec::new();
    for meta in instructions.iter().flat_map(|ix| ix.accounts.iter()) {
        if meta.is_writable && !accounts.contains(&meta.pubkey) {
            accounts.push(meta.pubkey);
            if accounts.len() == MAX_FEE_ACCOUNTS {
                break;
            }
        }
    }
    accounts
}

fn ensure_fits_packet(message: &VersionedMessage) -> SponsorResult<()> {
    let transaction = unsigned_transaction(message.clone());
    let encoded = bincode::serde::encode_to_vec(&transaction, bincode::config::legacy())
        .map_err(|err| SponsorError::Transaction(anyhow!(err)))?;
    if encoded.len() > PACKET_DATA_SIZE {
        return Err(SponsorError::Transaction(anyhow!(
            "交易大小 {} 字节，超过上限 {PACKET_DATA_SIZE}",
            encoded.len()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use crate::config::ComputeBudgetConfig;
    use crate::engine::testing::MockChain;
    use crate::instructions::compute_budget::{
        COMPUTE_BUDGET_PROGRAM_ID, compute_unit_limit_instruction,
    };
    use crate::instructions::token::native_transfer;

    use super::*;

    fn builder(chain: Arc<MockChain>, fee_payer: Pubkey) -> TransactionBuilder {
        TransactionBuilder::new(chain, fee_payer, ComputeBudgetConfig::default())
    }

    fn limit_of(message: &VersionedMessage) -> u32 {
        let keys = message.static_account_keys();
        let ix = message
            .instructions()
            .iter()
            .find(|ix| {
                keys[usize::from(ix.program_id_index)] == COMPUTE_BUDGET_PROGRAM_ID
                    && ix.data[0] == 2
            })
            .expect("limit instruction");
        u32::from_le_bytes(ix.data[1..5].try_into().expect("u32"))
    }

    #[tokio::test]
    async fn simulated_units_are_scaled_by_margin() {
        let chain = Arc::new(MockChain::new());
        chain.set_simulated_units(Some(100_000));
        let payer = Pubkey::new_unique();
        let compiled = builder(chain, payer)
            .compile(
                vec![native_transfer(&payer, &Pubkey::new_unique(), 5)],
                &[],
                200_000,
            )
            .await
            .expect("compile");
        assert_eq!(compiled.unit_limit, 110_000);
        assert_eq!(limit_of(&compiled.message), 110_000);
        assert_eq!(compiled.message.static_account_keys()[0], payer);
    }

    #[tokio::test]
    async fn failed_simulation_falls_back_to_default_limit() {
        let chain = Arc::new(MockChain::new());
        chain.set_simulated_units(None);
        let payer = Pubkey::new_unique();
        let compiled = builder(chain, payer)
            .compile(
                vec![native_transfer(&payer, &Pubkey::new_unique(), 5)],
                &[],
                60_000,
            )
            .await
            .expect("compile");
        assert_eq!(compiled.unit_limit, 60_000);
    }

    #[tokio::test]
    async fn existing_budget_instructions_are_replaced() {
        let chain = Arc::new(MockChain::new());
        chain.set_simulated_units(Some(50_000));
        chain.set_prioritization_fees(vec![10, 5_000, 20_000]);
        let payer = Pubkey::new_unique();
        let compiled = builder(chain, payer)
            .compile(
                vec![
                    compute_unit_limit_instruction(999_999),
                    native_transfer(&payer, &Pubkey::new_unique(), 5),
                ],
                &[],
                200_000,
            )
            .await
            .expect("compile");
        let keys = compiled.message.static_account_keys();
        let budget_count = compiled
            .message
            .instructions()
            .iter()
            .filter(|ix| keys[usize::from(ix.program_id_index)] == COMPUTE_BUDGET_PROGRAM_ID)
            .count();
        assert_eq!(budget_count, 2);
        assert_eq!(compiled.unit_price, 5_000);
        assert_eq!(limit_of(&compiled.message), 55_000);
    }

    #[tokio::test]
    async fn empty_instruction_list_is_rejected() {
        let chain = Arc::new(MockChain::new());
        let err = builder(chain, Pubkey::new_unique())
            .compile(Vec::new(), &[], 200_000)
            .await
            .expect_err("empty");
        assert!(matches!(err, SponsorError::Validation(_)));
    }

    #[test]
    fn writable_accounts_are_deduplicated() {
        let payer = Pubkey::new_unique();
        let to = Pubkey::new_unique();
        let ixs = vec![native_transfer(&payer, &to, 1), native_transfer(&payer, &to, 2)];
        assert_eq!(writable_accounts(&ixs), vec![payer, to]);
    }
}
