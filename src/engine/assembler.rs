use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use solana_sdk::pubkey::Pubkey;
use tracing::debug;

use crate::api::SlippageSetting;
use crate::chain::ChainClient;
use crate::config::PolicyConfig;
use crate::instructions::token::{close_account, reassign_account_rent_payer};
use crate::monitoring::events;

use super::error::{SponsorError, SponsorResult};
use super::fee::FeeService;
use super::quote::{QuoteProvider, RouteParams};
use super::submitter::{RegistrationMeta, TransactionSubmitter};
use super::types::{
    ActiveSwapRequest, RebuildSnapshot, SwapRequest, SwapResponse, TransactionType,
    unix_timestamp_ms,
};

/// 单次 swap 交易构建。
#[async_trait]
pub trait SwapBuilder: Send + Sync {
    async fn build_swap_response(
        &self,
        request: &SwapRequest,
        user: &Pubkey,
        cfg: Arc<PolicyConfig>,
        build_attempt: u32,
    ) -> SponsorResult<SwapResponse>;
}

/// 滑点优先级：用户指定值 > 自动滑点（不超过上限）> 固定默认值。
pub fn select_slippage(
    request: &SwapRequest,
    cfg: &PolicyConfig,
) -> SponsorResult<SlippageSetting> {
    match request.slippage_bps {
        Some(bps) if bps < cfg.min_slippage_bps || bps > cfg.max_user_slippage_bps => {
            Err(SponsorError::Validation(format!(
                "滑点 {bps} bps 超出范围 [{}, {}]",
                cfg.min_slippage_bps, cfg.max_user_slippage_bps
            )))
        }
        Some(bps) => Ok(SlippageSetting::Fixed(bps)),
        None if cfg.auto_slippage => Ok(SlippageSetting::Auto {
            max_bps: cfg.max_auto_slippage_bps,
        }),
        None => Ok(SlippageSetting::Fixed(cfg.max_default_slippage_bps)),
    }
}

/// 构建代付 swap 交易：报价、手续费、租金处理、compute budget 与登记。
pub struct SwapAssembler {
    chain: Arc<dyn ChainClient>,
    quotes: Arc<dyn QuoteProvider>,
    fees: Arc<FeeService>,
    submitter: Arc<TransactionSubmitter>,
    default_unit_limit: u32,
}

impl SwapAssembler {
    pub fn new(
        chain: Arc<dyn ChainClient>,
        quotes: Arc<dyn QuoteProvider>,
        fees: Arc<FeeService>,
        submitter: Arc<TransactionSubmitter>,
        default_unit_limit: u32,
    ) -> Self {
        Self {
            chain,
            quotes,
            fees,
            submitter,
            default_unit_limit,
        }
    }

    async fn resolve(&self, request: &SwapRequest, user: &Pubkey) -> SponsorResult<ActiveSwapRequest> {
        if request.buy_token_id == request.sell_token_id {
            return Err(SponsorError::Validation(
                "买入与卖出 token 不能相同".into(),
            ));
        }
        let sponsored = self.fees.sponsored_token();
        if request.buy_token_id != sponsored.mint && request.sell_token_id != sponsored.mint {
            return Err(SponsorError::Validation(format!(
                "swap 的一侧必须是 {}",
                sponsored.mint
            )));
        }
        let program_of = |mint: Pubkey| async move {
            if mint == sponsored.mint {
                Ok(sponsored.token_program)
            } else {
                self.chain.token_program_of(&mint).await
            }
        };
        let (sell_program, buy_program) = futures::future::try_join(
            program_of(request.sell_token_id),
            program_of(request.buy_token_id),
        )
        .await?;
        Ok(ActiveSwapRequest::derive(
            request.clone(),
            *user,
            sell_program,
            buy_program,
        ))
    }

    async fn classify(&self, active: &ActiveSwapRequest) -> SponsorResult<TransactionType> {
        let quantity = active.request.sell_quantity;
        let balance = self
            .chain
            .token_balance(&active.sell_token_account)
            .await?
            .unwrap_or(0);
        if quantity > balance {
            return Err(SponsorError::InsufficientBalance {
                required: quantity,
                available: balance,
            });
        }
        Ok(if active.request.sell_token_id == self.fees.sponsored_token().mint {
            TransactionType::Buy
        } else if quantity == balance {
            TransactionType::SellAll
        } else {
            TransactionType::SellPartial
        })
    }
}

#[async_trait]
impl SwapBuilder for SwapAssembler {
    async fn build_swap_response(
        &self,
        request: &SwapRequest,
        user: &Pubkey,
        cfg: Arc<PolicyConfig>,
        build_attempt: u32,
    ) -> SponsorResult<SwapResponse> {
        let started = Instant::now();
        if request.sell_quantity == 0 {
            return Err(SponsorError::Validation("卖出数量必须大于 0".into()));
        }
        let slippage = select_slippage(request, &cfg)?;
        let active = self.resolve(request, user).await?;
        let tx_type = self.classify(&active).await?;
        let fee_payer = *self.submitter.fee_payer();

        let (swap_amount, buy_fee) = if tx_type == TransactionType::Buy {
            let fee = self
                .fees
                .calculate_fee_amount(request.sell_quantity, tx_type, &cfg)?;
            let remaining = request.sell_quantity - fee;
            if remaining == 0 {
                return Err(SponsorError::Validation(
                    "卖出数量全部被手续费抵扣".into(),
                ));
            }
            (remaining, fee)
        } else {
            (request.sell_quantity, 0)
        };

        let plan = self
            .quotes
            .get_swap_instructions(&RouteParams {
                input_mint: request.sell_token_id,
                output_mint: request.buy_token_id,
                amount: swap_amount,
                slippage,
                user: *user,
                payer: fee_payer,
            })
            .await?;
        if plan.instructions.is_empty() {
            return Err(SponsorError::QuoteUnavailable(
                "路由未返回任何指令".into(),
            ));
        }

        let (fee_amount, fee_source) = if tx_type.is_sell() {
            let fee = self.fees.calculate_fee_amount(
                plan.quote.other_amount_threshold,
                tx_type,
                &cfg,
            )?;
            (fee, active.buy_token_account)
        } else {
            (buy_fee, active.sell_token_account)
        };

        let mut instructions = plan.instructions;
        if fee_amount > 0 {
            instructions.push(
                self.fees
                    .create_fee_transfer_instruction(&fee_source, user, fee_amount, &cfg)?,
            );
        }
        if tx_type == TransactionType::SellAll {
            instructions.push(
                close_account(
                    &active.sell_token_program,
                    &active.sell_token_account,
                    &fee_payer,
                    user,
                )
                .map_err(SponsorError::Instruction)?,
            );
        }
        let reassigned = reassign_account_rent_payer(&mut instructions, user, &fee_payer);
        if reassigned > 0 {
            debug!(
                target: "engine::assembler",
                reassigned,
                "账户租金改由 fee payer 支付"
            );
        }

        let prepared = self
            .submitter
            .prepare(
                instructions,
                &plan.lookup_tables,
                self.default_unit_limit,
                RegistrationMeta {
                    transaction_type: tx_type,
                    build_attempts: build_attempt,
                    auto_slippage: request.slippage_bps.is_none(),
                    context_slot: plan.quote.context_slot,
                    user: *user,
                    snapshot: Some(RebuildSnapshot {
                        request: request.clone(),
                        policy: Arc::clone(&cfg),
                    }),
                },
            )
            .await?;

        events::swap_built(
            user,
            tx_type,
            build_attempt,
            fee_amount,
            plan.quote.slippage_bps,
            started.elapsed(),
        );

        Ok(SwapResponse {
            request: request.clone(),
            transaction_message_base64: prepared.key,
            has_fee: fee_amount > 0,
            fee_amount,
            transaction_type: tx_type,
            timestamp: unix_timestamp_ms(),
            build_attempts: build_attempt,
            last_valid_block_height: prepared.last_valid_block_height,
        })
    }
}
