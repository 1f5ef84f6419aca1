//! In-memory chain, router and oracle used by engine tests.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use solana_sdk::hash::Hash;
use solana_sdk::instruction::{AccountMeta, Instruction};
use solana_sdk::message::{AddressLookupTableAccount, VersionedMessage};
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Signature;
use solana_sdk::transaction::VersionedTransaction;

use crate::api::QuoteResponsePayload;
use crate::api::jupiter::SwapMode;
use crate::chain::{BlockhashInfo, ChainClient, ChainError, ChainResult, SignatureState};
use crate::instructions::token::associated_account_len;

use super::error::{SponsorError, SponsorResult};
use super::quote::{PriceOracle, QuoteProvider, RouteParams, RoutePlan};

pub const LAST_VALID_BLOCK_HEIGHT: u64 = 1_000;
pub const RENT_PER_BYTE_YEAR: u64 = 6_960;

#[derive(Default)]
struct ChainState {
    block_height: u64,
    simulated_units: Option<u64>,
    prioritization_fees: Vec<u64>,
    native_balances: HashMap<Pubkey, u64>,
    token_balances: HashMap<Pubkey, u64>,
    accounts: HashSet<Pubkey>,
    token_programs: HashMap<Pubkey, Pubkey>,
    send_failures: VecDeque<String>,
    status_failures: VecDeque<String>,
    sent: Vec<VersionedTransaction>,
}

pub struct MockChain {
    state: Mutex<ChainState>,
}

impl MockChain {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(ChainState {
                block_height: LAST_VALID_BLOCK_HEIGHT - 100,
                simulated_units: Some(80_000),
                ..ChainState::default()
            }),
        }
    }

    pub fn set_block_height(&self, height: u64) {
        self.state.lock().block_height = height;
    }

    pub fn set_simulated_units(&self, units: Option<u64>) {
        self.state.lock().simulated_units = units;
    }

    pub fn set_prioritization_fees(&self, fees: Vec<u64>) {
        self.state.lock().prioritization_fees = fees;
    }

    pub fn set_native_balance(&self, account: Pubkey, lamports: u64) {
        let mut state = self.state.lock();
        state.native_balances.insert(account, lamports);
        state.accounts.insert(account);
    }

    pub fn set_token_balance(&self, account: Pubkey, amount: u64) {
        let mut state = self.state.lock();
        state.token_balances.insert(account, amount);
        state.accounts.insert(account);
    }

    pub fn set_token_program(&self, mint: Pubkey, program: Pubkey) {
        let mut state = self.state.lock();
        state.token_programs.insert(mint, program);
        state.accounts.insert(mint);
    }

    pub fn fail_next_send(&self, reason: &str) {
        self.state.lock().send_failures.push_back(reason.to_string());
    }

    pub fn fail_next_status(&self, reason: &str) {
        self.state.lock().status_failures.push_back(reason.to_string());
    }

    pub fn sent_transactions(&self) -> Vec<VersionedTransaction> {
        self.state.lock().sent.clone()
    }

    pub fn rent_for(data_len: usize) -> u64 {
        (data_len as u64 + 128) * RENT_PER_BYTE_YEAR * 2
    }

    pub fn token_account_rent(token_program: &Pubkey) -> u64 {
        Self::rent_for(associated_account_len(token_program))
    }
}

#[async_trait]
impl ChainClient for MockChain {
    async fn latest_blockhash(&self) -> ChainResult<BlockhashInfo> {
        Ok(BlockhashInfo {
            blockhash: Hash::new_unique(),
            last_valid_block_height: LAST_VALID_BLOCK_HEIGHT,
        })
    }

    async fn block_height(&self) -> ChainResult<u64> {
        Ok(self.state.lock().block_height)
    }

    async fn native_balance(&self, account: &Pubkey) -> ChainResult<u64> {
        Ok(self
            .state
            .lock()
            .native_balances
            .get(account)
            .copied()
            .unwrap_or_default())
    }

    async fn token_balance(&self, account: &Pubkey) -> ChainResult<Option<u64>> {
        Ok(self.state.lock().token_balances.get(account).copied())
    }

    async fn account_exists(&self, account: &Pubkey) -> ChainResult<bool> {
        Ok(self.state.lock().accounts.contains(account))
    }

    async fn token_program_of(&self, mint: &Pubkey) -> ChainResult<Pubkey> {
        self.state
            .lock()
            .token_programs
            .get(mint)
            .copied()
            .ok_or(ChainError::AccountNotFound(*mint))
    }

    async fn minimum_balance_for_rent_exemption(&self, data_len: usize) -> ChainResult<u64> {
        Ok(Self::rent_for(data_len))
    }

    async fn lookup_tables(
        &self,
        _addresses: &[Pubkey],
    ) -> ChainResult<Vec<AddressLookupTableAccount>> {
        Ok(Vec::new())
    }

    async fn simulate_compute_units(&self, _message: &VersionedMessage) -> ChainResult<Option<u64>> {
        Ok(self.state.lock().simulated_units)
    }

    async fn recent_prioritization_fees(&self, _accounts: &[Pubkey]) -> ChainResult<Vec<u64>> {
        Ok(self.state.lock().prioritization_fees.clone())
    }

    async fn send_transaction(&self, transaction: &VersionedTransaction) -> ChainResult<Signature> {
        let mut state = self.state.lock();
        if let Some(reason) = state.send_failures.pop_front() {
            return Err(ChainError::fatal(reason));
        }
        state.sent.push(transaction.clone());
        Ok(transaction.signatures[0])
    }

    async fn signature_status(&self, _signature: &Signature) -> ChainResult<SignatureState> {
        Ok(match self.state.lock().status_failures.pop_front() {
            Some(reason) => SignatureState::Failed(reason),
            None => SignatureState::Landed,
        })
    }
}

/// Router that returns a single opaque swap instruction, optionally failing
/// a fixed number of times first.
pub struct MockQuoteProvider {
    /// Output units per input unit, as a fraction.
    numerator: u64,
    denominator: u64,
    failures: AtomicU64,
    calls: Mutex<Vec<RouteParams>>,
}

impl MockQuoteProvider {
    pub const SWAP_PROGRAM: Pubkey =
        solana_sdk::pubkey!("JUP6LkbZbjS1jKKwapdHNy74zcZ3tLUZoi5QNyVTaV4");

    pub fn new(numerator: u64, denominator: u64) -> Self {
        Self {
            numerator,
            denominator,
            failures: AtomicU64::new(0),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(self, times: u64) -> Self {
        self.failures.store(times, Ordering::SeqCst);
        self
    }

    pub fn calls(&self) -> Vec<RouteParams> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl QuoteProvider for MockQuoteProvider {
    async fn get_swap_instructions(&self, params: &RouteParams) -> SponsorResult<RoutePlan> {
        self.calls.lock().push(params.clone());
        let remaining = self.failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failures.store(remaining - 1, Ordering::SeqCst);
            return Err(SponsorError::QuoteUnavailable("no route".into()));
        }
        let out_amount = (u128::from(params.amount) * u128::from(self.numerator)
            / u128::from(self.denominator.max(1))) as u64;
        let slippage_bps = match params.slippage {
            crate::api::SlippageSetting::Fixed(bps) => bps,
            crate::api::SlippageSetting::Auto { max_bps } => max_bps,
        };
        let threshold =
            (u128::from(out_amount) * u128::from(10_000 - u64::from(slippage_bps.min(10_000)))
                / 10_000) as u64;
        let swap = Instruction {
            program_id: Self::SWAP_PROGRAM,
            accounts: vec![
                AccountMeta::new(params.user, true),
                AccountMeta::new(Pubkey::new_unique(), false),
            ],
            data: vec![0xe5, 0x17],
        };
        Ok(RoutePlan {
            instructions: vec![swap],
            lookup_tables: Vec::new(),
            quote: QuoteResponsePayload {
                input_mint: params.input_mint,
                output_mint: params.output_mint,
                in_amount: params.amount,
                out_amount,
                other_amount_threshold: threshold,
                swap_mode: SwapMode::ExactIn,
                slippage_bps,
                computed_auto_slippage: None,
                price_impact_pct: Decimal::ZERO,
                context_slot: Some(42),
                time_taken: None,
                route_plan: Vec::new(),
                platform_fee: None,
            },
        })
    }
}

/// Converts lamports at a fixed divisor.
pub struct FixedRateOracle {
    lamports_per_unit: u64,
}

impl FixedRateOracle {
    pub fn new(lamports_per_unit: u64) -> Self {
        Self {
            lamports_per_unit: lamports_per_unit.max(1),
        }
    }
}

#[async_trait]
impl PriceOracle for FixedRateOracle {
    async fn sponsored_units_for_lamports(&self, lamports: u64) -> SponsorResult<u64> {
        Ok(lamports / self.lamports_per_unit)
    }
}
