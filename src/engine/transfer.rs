use std::sync::Arc;

use solana_sdk::instruction::Instruction;
use solana_sdk::pubkey::Pubkey;

use crate::chain::ChainClient;
use crate::config::PolicyConfig;
use crate::instructions::token::{
    NATIVE_MINT, associated_account_len, associated_token_address,
    create_associated_account_idempotent, native_transfer, transfer_checked,
};
use crate::monitoring::events;

use super::error::{SponsorError, SponsorResult};
use super::fee::FeeService;
use super::submitter::{RegistrationMeta, TransactionSubmitter};
use super::types::{
    TransactionType, TransferFeeEstimate, TransferRequest, TransferResponse, unix_timestamp_ms,
};

/// 单笔转账编译前的指令与手续费。
struct TransferPlan {
    instructions: Vec<Instruction>,
    fee_amount: u64,
}

/// Builds sponsored SOL and sponsored-token transfers. Transfers are never
/// rebuilt.
pub struct TransferAssembler {
    chain: Arc<dyn ChainClient>,
    fees: Arc<FeeService>,
    submitter: Arc<TransactionSubmitter>,
    unit_limit: u32,
}

impl TransferAssembler {
    pub fn new(
        chain: Arc<dyn ChainClient>,
        fees: Arc<FeeService>,
        submitter: Arc<TransactionSubmitter>,
        unit_limit: u32,
    ) -> Self {
        Self {
            chain,
            fees,
            submitter,
            unit_limit,
        }
    }

    pub async fn build_transfer(
        &self,
        request: &TransferRequest,
        user: &Pubkey,
        cfg: Arc<PolicyConfig>,
    ) -> SponsorResult<TransferResponse> {
        let plan = self.plan(request, user, &cfg).await?;
        let prepared = self
            .submitter
            .prepare(
                plan.instructions,
                &[],
                self.unit_limit,
                RegistrationMeta {
                    transaction_type: TransactionType::Transfer,
                    build_attempts: 1,
                    auto_slippage: false,
                    context_slot: None,
                    user: *user,
                    snapshot: None,
                },
            )
            .await?;

        events::transfer_built(
            user,
            request.token_id == NATIVE_MINT,
            request.amount,
            plan.fee_amount,
        );

        Ok(TransferResponse {
            request: request.clone(),
            transaction_message_base64: prepared.key,
            has_fee: plan.fee_amount > 0,
            fee_amount: plan.fee_amount,
            timestamp: unix_timestamp_ms(),
            last_valid_block_height: prepared.last_valid_block_height,
        })
    }

    /// Fee the sender would be charged, without building anything.
    pub async fn estimate_transfer_fee(
        &self,
        request: &TransferRequest,
    ) -> SponsorResult<TransferFeeEstimate> {
        if request.token_id == NATIVE_MINT {
            let exists = self.chain.account_exists(&request.recipient).await?;
            return Ok(TransferFeeEstimate {
                fee_amount: 0,
                recipient_account_exists: exists,
            });
        }
        let token = *self.fees.sponsored_token();
        self.ensure_sponsored(request, &token.mint)?;
        let destination =
            associated_token_address(&request.recipient, &token.mint, &token.token_program);
        let exists = self.chain.account_exists(&destination).await?;
        let fee_amount = if exists {
            0
        } else {
            self.rent_fee(&token.token_program).await?
        };
        Ok(TransferFeeEstimate {
            fee_amount,
            recipient_account_exists: exists,
        })
    }

    async fn plan(
        &self,
        request: &TransferRequest,
        user: &Pubkey,
        cfg: &PolicyConfig,
    ) -> SponsorResult<TransferPlan> {
        if request.amount == 0 {
            return Err(SponsorError::Validation("转账数量必须大于 0".into()));
        }
        if request.recipient == *user {
            return Err(SponsorError::Validation("不能转账给自己".into()));
        }
        if request.token_id == NATIVE_MINT {
            self.plan_native(request, user).await
        } else {
            self.plan_sponsored(request, user, cfg).await
        }
    }

    async fn plan_native(&self, request: &TransferRequest, user: &Pubkey) -> SponsorResult<TransferPlan> {
        let (balance, exists) = futures::future::try_join(
            self.chain.native_balance(user),
            self.chain.account_exists(&request.recipient),
        )
        .await?;
        if balance < request.amount {
            return Err(SponsorError::InsufficientBalance {
                required: request.amount,
                available: balance,
            });
        }
        if !exists {
            let minimum = self.chain.minimum_balance_for_rent_exemption(0).await?;
            if request.amount < minimum {
                return Err(SponsorError::Validation(format!(
                    "收款账户不存在，至少需要转账 {minimum} lamports"
                )));
            }
        }
        Ok(TransferPlan {
            instructions: vec![native_transfer(user, &request.recipient, request.amount)],
            fee_amount: 0,
        })
    }

    async fn plan_sponsored(
        &self,
        request: &TransferRequest,
        user: &Pubkey,
        cfg: &PolicyConfig,
    ) -> SponsorResult<TransferPlan> {
        let token = *self.fees.sponsored_token();
        self.ensure_sponsored(request, &token.mint)?;

        let source = associated_token_address(user, &token.mint, &token.token_program);
        let destination =
            associated_token_address(&request.recipient, &token.mint, &token.token_program);
        let (balance, exists) = futures::future::try_join(
            self.chain.token_balance(&source),
            self.chain.account_exists(&destination),
        )
        .await?;
        let balance = balance.unwrap_or(0);

        let mut instructions = Vec::with_capacity(3);
        let fee_amount = if exists {
            0
        } else {
            instructions.push(create_associated_account_idempotent(
                self.submitter.fee_payer(),
                &request.recipient,
                &token.mint,
                &token.token_program,
            ));
            self.rent_fee(&token.token_program).await?
        };

        let required = request.amount.saturating_add(fee_amount);
        if balance < required {
            return Err(SponsorError::InsufficientBalance {
                required,
                available: balance,
            });
        }

        instructions.push(
            transfer_checked(
                &token.token_program,
                &source,
                &token.mint,
                &destination,
                user,
                request.amount,
                token.decimals,
            )
            .map_err(SponsorError::Instruction)?,
        );
        if fee_amount > 0 {
            instructions.push(
                self.fees
                    .create_fee_transfer_instruction(&source, user, fee_amount, cfg)?,
            );
        }
        Ok(TransferPlan {
            instructions,
            fee_amount,
        })
    }

    fn ensure_sponsored(&self, request: &TransferRequest, mint: &Pubkey) -> SponsorResult<()> {
        if request.token_id != *mint {
            return Err(SponsorError::Validation(format!(
                "仅代付 SOL 与 {mint} 的转账"
            )));
        }
        Ok(())
    }

    async fn rent_fee(&self, token_program: &Pubkey) -> SponsorResult<u64> {
        let lamports = self
            .chain
            .minimum_balance_for_rent_exemption(associated_account_len(token_program))
            .await?;
        self.fees.calculate_rent_exemption_fee_amount(lamports).await
    }
}
