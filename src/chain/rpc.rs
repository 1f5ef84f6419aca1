use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_client::rpc_config::{RpcSendTransactionConfig, RpcSimulateTransactionConfig};
use solana_commitment_config::CommitmentConfig;
use solana_sdk::message::{AddressLookupTableAccount, VersionedMessage};
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Signature;
use solana_sdk::transaction::VersionedTransaction;
use spl_token_2022::extension::StateWithExtensions;
use spl_token_2022::state::Account as TokenAccount;
use tracing::{debug, info, warn};

use crate::cache::AltCache;
use crate::config::{GlobalConfig, SubmissionConfig};

use super::error::{ChainError, ChainResult};
use super::{BlockhashInfo, ChainClient, SignatureState, unsigned_transaction};

const DEFAULT_RPC_URL: &str = "https://api.mainnet-beta.solana.com";
const ALT_BATCH_LIMIT: usize = 100;

#[derive(Clone)]
pub struct RpcChainClient {
    client: Arc<RpcClient>,
    send_config: RpcSendTransactionConfig,
    alt_cache: AltCache,
    token_programs: Arc<DashMap<Pubkey, Pubkey>>,
}

impl RpcChainClient {
    pub fn new(client: Arc<RpcClient>, submission: &SubmissionConfig) -> Self {
        let send_config = RpcSendTransactionConfig {
            skip_preflight: submission.skip_preflight,
            preflight_commitment: Some(client.commitment().commitment),
            max_retries: submission.max_retries,
            ..RpcSendTransactionConfig::default()
        };
        Self {
            client,
            send_config,
            alt_cache: AltCache::new(),
            token_programs: Arc::new(DashMap::new()),
        }
    }

    /// 根据 `[global]` 构造客户端，若设置了 `SPONSOR_RPC_URL` 则优先使用。
    pub fn from_config(global: &GlobalConfig, submission: &SubmissionConfig) -> ChainResult<Self> {
        let url = std::env::var("SPONSOR_RPC_URL")
            .ok()
            .filter(|value| !value.trim().is_empty())
            .or_else(|| global.primary_rpc_url().map(str::to_string))
            .unwrap_or_else(|| DEFAULT_RPC_URL.to_string());
        let commitment = CommitmentConfig::from_str(global.commitment.trim()).map_err(|err| {
            ChainError::fatal(format!("invalid commitment {}: {err}", global.commitment))
        })?;
        let client = Arc::new(RpcClient::new_with_commitment(url, commitment));
        Ok(Self::new(client, submission))
    }

    pub fn url(&self) -> String {
        self.client.url()
    }

    async fn fetch_account(&self, account: &Pubkey) -> ChainResult<Option<solana_sdk::account::Account>> {
        let response = self
            .client
            .get_account_with_commitment(account, self.client.commitment())
            .await?;
        Ok(response.value)
    }
}

#[async_trait]
impl ChainClient for RpcChainClient {
    async fn latest_blockhash(&self) -> ChainResult<BlockhashInfo> {
        let (blockhash, last_valid_block_height) = self
            .client
            .get_latest_blockhash_with_commitment(self.client.commitment())
            .await?;
        Ok(BlockhashInfo {
            blockhash,
            last_valid_block_height,
        })
    }

    async fn block_height(&self) -> ChainResult<u64> {
        Ok(self.client.get_block_height().await?)
    }

    async fn native_balance(&self, account: &Pubkey) -> ChainResult<u64> {
        Ok(self.client.get_balance(account).await?)
    }

    async fn token_balance(&self, account: &Pubkey) -> ChainResult<Option<u64>> {
        let Some(data) = self.fetch_account(account).await? else {
            return Ok(None);
        };
        let state = StateWithExtensions::<TokenAccount>::unpack(&data.data).map_err(|err| {
            ChainError::Decode {
                account: *account,
                reason: err.to_string(),
            }
        })?;
        Ok(Some(state.base.amount))
    }

    async fn account_exists(&self, account: &Pubkey) -> ChainResult<bool> {
        Ok(self.fetch_account(account).await?.is_some())
    }

    async fn token_program_of(&self, mint: &Pubkey) -> ChainResult<Pubkey> {
        if let Some(program) = self.token_programs.get(mint) {
            return Ok(*program);
        }
        let account = self
            .fetch_account(mint)
            .await?
            .ok_or(ChainError::AccountNotFound(*mint))?;
        if account.owner != spl_token::ID && account.owner != spl_token_2022::ID {
            return Err(ChainError::Decode {
                account: *mint,
                reason: format!("owner {} is not a token program", account.owner),
            });
        }
        self.token_programs.insert(*mint, account.owner);
        Ok(account.owner)
    }

    async fn minimum_balance_for_rent_exemption(&self, data_len: usize) -> ChainResult<u64> {
        Ok(self
            .client
            .get_minimum_balance_for_rent_exemption(data_len)
            .await?)
    }

    async fn lookup_tables(
        &self,
        addresses: &[Pubkey],
    ) -> ChainResult<Vec<AddressLookupTableAccount>> {
        let (mut tables, missing) = self.alt_cache.partition(addresses);
        for chunk in missing.chunks(ALT_BATCH_LIMIT) {
            let accounts = self.client.get_multiple_accounts(chunk).await?;
            for (address, account) in chunk.iter().zip(accounts) {
                if let Some(table) = self.alt_cache.store(address, account) {
                    tables.push(table);
                }
            }
        }
        debug!(
            target: "chain::rpc",
            requested = addresses.len(),
            resolved = tables.len(),
            cached = self.alt_cache.len(),
            "ALT 拉取完成"
        );
        Ok(tables)
    }

    async fn simulate_compute_units(&self, message: &VersionedMessage) -> ChainResult<Option<u64>> {
        let transaction = unsigned_transaction(message.clone());
        let config = RpcSimulateTransactionConfig {
            sig_verify: false,
            replace_recent_blockhash: true,
            commitment: Some(self.client.commitment()),
            ..RpcSimulateTransactionConfig::default()
        };
        let response = self
            .client
            .simulate_transaction_with_config(&transaction, config)
            .await?;
        let result = response.value;
        if let Some(err) = result.err {
            let tail: Vec<String> = result
                .logs
                .unwrap_or_default()
                .into_iter()
                .rev()
                .take(3)
                .collect();
            warn!(
                target: "chain::rpc",
                error = ?err,
                logs = ?tail,
                "交易模拟失败"
            );
            return Ok(None);
        }
        Ok(result.units_consumed)
    }

    async fn recent_prioritization_fees(&self, accounts: &[Pubkey]) -> ChainResult<Vec<u64>> {
        let fees = self.client.get_recent_prioritization_fees(accounts).await?;
        Ok(fees.into_iter().map(|fee| fee.prioritization_fee).collect())
    }

    async fn send_transaction(&self, transaction: &VersionedTransaction) -> ChainResult<Signature> {
        let signature = self
            .client
            .send_transaction_with_config(transaction, self.send_config.clone())
            .await?;
        info!(
            target: "chain::rpc",
            signature = %signature,
            endpoint = %self.client.url(),
            skip_preflight = self.send_config.skip_preflight,
            max_retries = ?self.send_config.max_retries,
            "交易已通过 RPC 提交"
        );
        Ok(signature)
    }

    async fn signature_status(&self, signature: &Signature) -> ChainResult<SignatureState> {
        let status = self.client.get_signature_status(signature).await?;
        Ok(match status {
            None => SignatureState::Pending,
            Some(Ok(())) => SignatureState::Landed,
            Some(Err(err)) => SignatureState::Failed(err.to_string()),
        })
    }
}
