use std::sync::Arc;

use solana_sdk::instruction::Instruction;
use solana_sdk::pubkey::Pubkey;
use tracing::debug;

use crate::config::PolicyConfig;
use crate::instructions::token::{associated_token_address, transfer_checked};

use super::error::{SponsorError, SponsorResult};
use super::quote::PriceOracle;
use super::types::TransactionType;

const BPS_DENOMINATOR: u128 = 10_000;

/// 收取手续费的 token，附带其所属的 token program。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SponsoredToken {
    pub mint: Pubkey,
    pub decimals: u8,
    pub token_program: Pubkey,
}

/// Prices trades and rent in the sponsored token and builds the
/// instruction that collects the fee.
#[derive(Clone)]
pub struct FeeService {
    fee_payer: Pubkey,
    token: SponsoredToken,
    oracle: Arc<dyn PriceOracle>,
}

impl FeeService {
    pub fn new(fee_payer: Pubkey, token: SponsoredToken, oracle: Arc<dyn PriceOracle>) -> Self {
        Self {
            fee_payer,
            token,
            oracle,
        }
    }

    pub fn sponsored_token(&self) -> &SponsoredToken {
        &self.token
    }

    pub fn fee_recipient(&self, cfg: &PolicyConfig) -> Pubkey {
        cfg.trade_fee_recipient.unwrap_or(self.fee_payer)
    }

    /// `floor(quantity * bps / 10_000)`，`quantity` 以代付 token 最小单位计。
    /// 转账不收交易手续费。
    pub fn calculate_fee_amount(
        &self,
        quantity: u64,
        tx_type: TransactionType,
        cfg: &PolicyConfig,
    ) -> SponsorResult<u64> {
        let bps = match tx_type {
            TransactionType::Transfer => return Ok(0),
            TransactionType::Buy => cfg.fee_bps.buy,
            TransactionType::SellPartial | TransactionType::SellAll => cfg.fee_bps.sell,
        };
        if quantity < cfg.min_trade_size {
            return Err(SponsorError::Validation(format!(
                "交易数量 {quantity} 低于最小值 {}",
                cfg.min_trade_size
            )));
        }
        let fee = (u128::from(quantity) * u128::from(bps)) / BPS_DENOMINATOR;
        Ok(u64::try_from(fee).unwrap_or(u64::MAX).min(quantity))
    }

    /// 折算 `lamports` 租金所需的代付 token 数量。
    pub async fn calculate_rent_exemption_fee_amount(&self, lamports: u64) -> SponsorResult<u64> {
        if lamports == 0 {
            return Ok(0);
        }
        let amount = self.oracle.sponsored_units_for_lamports(lamports).await?;
        debug!(
            target: "engine::fee",
            lamports,
            amount,
            mint = %self.token.mint,
            "租金已折算为代付 token"
        );
        Ok(amount)
    }

    /// Moves `amount` of the sponsored token from `source` (owned by
    /// `owner`) to the fee recipient's associated account.
    pub fn create_fee_transfer_instruction(
        &self,
        source: &Pubkey,
        owner: &Pubkey,
        amount: u64,
        cfg: &PolicyConfig,
    ) -> SponsorResult<Instruction> {
        if amount == 0 {
            return Err(SponsorError::Validation(
                "手续费转账数量必须大于 0".into(),
            ));
        }
        let recipient = self.fee_recipient(cfg);
        let destination =
            associated_token_address(&recipient, &self.token.mint, &self.token.token_program);
        transfer_checked(
            &self.token.token_program,
            source,
            &self.token.mint,
            &destination,
            owner,
            amount,
            self.token.decimals,
        )
        .map_err(SponsorError::Instruction)
    }
}
