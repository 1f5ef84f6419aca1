//! Chain access behind a trait so the engine can run against a mock.

pub mod error;
pub mod rpc;

use async_trait::async_trait;
use solana_sdk::hash::Hash;
use solana_sdk::message::{AddressLookupTableAccount, VersionedMessage};
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Signature;
use solana_sdk::transaction::VersionedTransaction;

pub use error::{ChainError, ChainResult};
pub use rpc::RpcChainClient;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockhashInfo {
    pub blockhash: Hash,
    pub last_valid_block_height: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignatureState {
    Pending,
    Landed,
    Failed(String),
}

#[async_trait]
pub trait ChainClient: Send + Sync {
    async fn latest_blockhash(&self) -> ChainResult<BlockhashInfo>;

    async fn block_height(&self) -> ChainResult<u64>;

    /// `account` 持有的 lamports，账户不存在时为 0。
    async fn native_balance(&self, account: &Pubkey) -> ChainResult<u64>;

    /// token 账户余额，账户不存在时返回 `None`。
    async fn token_balance(&self, account: &Pubkey) -> ChainResult<Option<u64>>;

    async fn account_exists(&self, account: &Pubkey) -> ChainResult<bool>;

    /// Program owning `mint` (classic token or Token-2022).
    async fn token_program_of(&self, mint: &Pubkey) -> ChainResult<Pubkey>;

    async fn minimum_balance_for_rent_exemption(&self, data_len: usize) -> ChainResult<u64>;

    async fn lookup_tables(
        &self,
        addresses: &[Pubkey],
    ) -> ChainResult<Vec<AddressLookupTableAccount>>;

    /// 未签名模拟消耗的 compute units，模拟失败时返回 `None`。
    async fn simulate_compute_units(&self, message: &VersionedMessage) -> ChainResult<Option<u64>>;

    async fn recent_prioritization_fees(&self, accounts: &[Pubkey]) -> ChainResult<Vec<u64>>;

    async fn send_transaction(&self, transaction: &VersionedTransaction) -> ChainResult<Signature>;

    async fn signature_status(&self, signature: &Signature) -> ChainResult<SignatureState>;
}

/// Wraps a message with placeholder signatures for simulation.
pub fn unsigned_transaction(message: VersionedMessage) -> VersionedTransaction {
    let required = usize::from(message.header().num_required_signatures);
    VersionedTransaction {
        signatures: vec![Signature::default(); required],
        message,
    }
}
