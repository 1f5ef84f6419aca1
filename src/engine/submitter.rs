use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use solana_sdk::instruction::Instruction;
use solana_sdk::message::{AddressLookupTableAccount, VersionedMessage};
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Signature;
use solana_sdk::transaction::VersionedTransaction;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::chain::{ChainClient, SignatureState};
use crate::config::{PolicyConfig, SubmissionConfig};
use crate::monitoring::events;

use super::builder::TransactionBuilder;
use super::error::{SponsorError, SponsorResult};
use super::identity::FeePayer;
use super::registry::TransactionRegistry;
use super::types::{
    RebuildSnapshot, SubmissionOutcome, SwapRequest, SwapResponse, TransactionRegistryEntry,
    TransactionType,
};

/// 确认轮询上限，约为一个 blockhash 的有效期。
const CONFIRMATION_TIMEOUT: Duration = Duration::from_secs(90);

/// Produces a fresh swap for a request whose submission failed.
#[async_trait]
pub trait SwapRebuilder: Send + Sync {
    async fn rebuild(
        &self,
        request: &SwapRequest,
        user: &Pubkey,
        policy: Arc<PolicyConfig>,
        prior_attempts: u32,
    ) -> SponsorResult<SwapResponse>;
}

/// 与编译后消息一同登记的元数据。
#[derive(Debug, Clone)]
pub struct RegistrationMeta {
    pub transaction_type: TransactionType,
    pub build_attempts: u32,
    pub auto_slippage: bool,
    pub context_slot: Option<u64>,
    pub user: Pubkey,
    pub snapshot: Option<RebuildSnapshot>,
}

#[derive(Debug, Clone)]
pub struct PreparedMessage {
    /// Registry key, also the base64 message handed to the client.
    pub key: String,
    pub message: VersionedMessage,
    pub last_valid_block_height: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Confirmation {
    Landed,
    Failed(String),
    Expired,
}

pub struct TransactionSubmitter {
    chain: Arc<dyn ChainClient>,
    builder: TransactionBuilder,
    registry: Arc<TransactionRegistry>,
    fee_payer: Arc<FeePayer>,
    poll_interval: Duration,
}

impl TransactionSubmitter {
    pub fn new(
        chain: Arc<dyn ChainClient>,
        builder: TransactionBuilder,
        registry: Arc<TransactionRegistry>,
        fee_payer: Arc<FeePayer>,
        submission: &SubmissionConfig,
    ) -> Self {
        Self {
            chain,
            builder,
            registry,
            fee_payer,
            poll_interval: Duration::from_millis(submission.confirm_poll_interval_ms.max(1)),
        }
    }

    pub fn fee_payer(&self) -> &Pubkey {
        &self.fee_payer.pubkey
    }

    pub fn registry(&self) -> &Arc<TransactionRegistry> {
        &self.registry
    }

    /// 按估算的 compute budget 编译并登记消息。
    pub async fn prepare(
        &self,
        instructions: Vec<Instruction>,
        tables: &[AddressLookupTableAccount],
        fallback_unit_limit: u32,
        meta: RegistrationMeta,
    ) -> SponsorResult<PreparedMessage> {
        let compiled = self
            .builder
            .compile(instructions, tables, fallback_unit_limit)
            .await?;
        let entry = TransactionRegistryEntry {
            message: compiled.message.clone(),
            last_valid_block_height: compiled.last_valid_block_height,
            transaction_type: meta.transaction_type,
            created_at: Instant::now(),
            build_attempts: meta.build_attempts,
            auto_slippage: meta.auto_slippage,
            context_slot: meta.context_slot,
            user: meta.user,
            snapshot: meta.snapshot,
        };
        let key = self.registry.register(entry);
        Ok(PreparedMessage {
            key,
            message: compiled.message,
            last_valid_block_height: compiled.last_valid_block_height,
        })
    }

    /// Fee payer signature over an issued message, for clients that
    /// assemble the transaction themselves.
    pub fn presign(&self, message_base64: &str) -> SponsorResult<Signature> {
        // 只为本服务发出的消息联合签名。
        if !self.registry.contains(message_base64.trim()) {
            return Err(SponsorError::RegistryMiss);
        }
        let bytes = BASE64
            .decode(message_base64.trim())
            .map_err(|err| SponsorError::Validation(format!("invalid message encoding: {err}")))?;
        Ok(self.fee_payer.sign_message(&bytes))
    }

    /// 取出（消费）`message_base64` 对应的条目并提交。
    pub async fn submit(
        &self,
        user: &Pubkey,
        user_signature: &Signature,
        message_base64: &str,
        cfg: Arc<PolicyConfig>,
        rebuilder: &dyn SwapRebuilder,
    ) -> SponsorResult<SubmissionOutcome> {
        let bytes = BASE64
            .decode(message_base64.trim())
            .map_err(|err| SponsorError::Validation(format!("invalid message encoding: {err}")))?;
        // 先校验签名，避免无效签名消耗掉条目。
        verify_user_signature(user, user_signature, &bytes)?;
        let entry = self.registry.get(message_base64.trim())?;
        self.sign_and_send(user, user_signature, entry, cfg, rebuilder)
            .await
    }

    pub async fn sign_and_send(
        &self,
        user: &Pubkey,
        user_signature: &Signature,
        entry: TransactionRegistryEntry,
        cfg: Arc<PolicyConfig>,
        rebuilder: &dyn SwapRebuilder,
    ) -> SponsorResult<SubmissionOutcome> {
        if entry.user != *user {
            return Err(SponsorError::Validation(
                "交易属于其他钱包".into(),
            ));
        }
        let bytes = entry.message.serialize();
        verify_user_signature(user, user_signature, &bytes)?;

        let height = self.chain.block_height().await?;
        if height > entry.last_valid_block_height {
            debug!(
                target: "engine::submitter",
                height,
                last_valid_block_height = entry.last_valid_block_height,
                "登记的 blockhash 已过期"
            );
            return Err(SponsorError::RegistryMiss);
        }

        let fee_payer_signature = self.fee_payer.sign_message(&bytes);
        let transaction = self.assemble(&entry.message, user, *user_signature, fee_payer_signature)?;

        let outcome = match self.chain.send_transaction(&transaction).await {
            Ok(signature) => match self
                .await_confirmation(&signature, entry.last_valid_block_height)
                .await
            {
                Confirmation::Landed => {
                    info!(
                        target: "engine::submitter",
                        signature = %signature,
                        tx_type = entry.transaction_type.as_str(),
                        "交易已落地"
                    );
                    SubmissionOutcome::Success {
                        txid: signature.to_string(),
                    }
                }
                Confirmation::Failed(reason) => self.on_failure(&entry, &cfg, reason, rebuilder).await,
                Confirmation::Expired => {
                    self.on_failure(
                        &entry,
                        &cfg,
                        "transaction expired before confirmation".into(),
                        rebuilder,
                    )
                    .await
                }
            },
            Err(err) => {
                self.on_failure(&entry, &cfg, err.to_string(), rebuilder)
                    .await
            }
        };

        events::submission_outcome(
            entry.transaction_type,
            outcome.label(),
            entry.build_attempts,
        );
        Ok(outcome)
    }

    fn assemble(
        &self,
        message: &VersionedMessage,
        user: &Pubkey,
        user_signature: Signature,
        fee_payer_signature: Signature,
    ) -> SponsorResult<VersionedTransaction> {
        let required = usize::from(message.header().num_required_signatures);
        let mut signatures = Vec::with_capacity(required);
        for key in message.static_account_keys().iter().take(required) {
            if *key == self.fee_payer.pubkey {
                signatures.push(fee_payer_signature);
            } else if key == user {
                signatures.push(user_signature);
            } else {
                return Err(SponsorError::Validation(format!(
                    "消息需要意外的签名者 {key}"
                )));
            }
        }
        Ok(VersionedTransaction {
            signatures,
            message: message.clone(),
        })
    }

    async fn await_confirmation(
        &self,
        signature: &Signature,
        last_valid_block_height: u64,
    ) -> Confirmation {
        let deadline = Instant::now() + CONFIRMATION_TIMEOUT;
        loop {
            match self.chain.signature_status(signature).await {
                Ok(SignatureState::Landed) => return Confirmation::Landed,
                Ok(SignatureState::Failed(reason)) => return Confirmation::Failed(reason),
                Ok(SignatureState::Pending) => {}
                Err(err) => {
                    warn!(
                        target: "engine::submitter",
                        signature = %signature,
                        error = %err,
                        "查询签名状态失败"
                    );
                }
            }
            match self.chain.block_height().await {
                Ok(height) if height > last_valid_block_height => return Confirmation::Expired,
                Ok(_) => {}
                Err(err) => {
                    warn!(
                        target: "engine::submitter",
                        error = %err,
                        "查询区块高度失败"
                    );
                }
            }
            if Instant::now() >= deadline {
                return Confirmation::Expired;
            }
            sleep(self.poll_interval).await;
        }
    }

    async fn on_failure(
        &self,
        entry: &TransactionRegistryEntry,
        cfg: &PolicyConfig,
        reason: String,
        rebuilder: &dyn SwapRebuilder,
    ) -> SubmissionOutcome {
        warn!(
            target: "engine::submitter",
            tx_type = entry.transaction_type.as_str(),
            attempt = entry.build_attempts,
            reason = %reason,
            "交易提交失败"
        );
        let exhausted = entry.build_attempts.saturating_add(1) >= cfg.max_build_attempts;
        if entry.transaction_type == TransactionType::Transfer || !entry.auto_slippage || exhausted
        {
            return SubmissionOutcome::Fail { reason };
        }
        let Some(snapshot) = entry.snapshot.as_ref() else {
            return SubmissionOutcome::Fail { reason };
        };
        match rebuilder
            .rebuild(
                &snapshot.request,
                &entry.user,
                Arc::clone(&snapshot.policy),
                entry.build_attempts,
            )
            .await
        {
            Ok(response) => SubmissionOutcome::Rebuild {
                new_response: Box::new(response),
            },
            Err(err) => SubmissionOutcome::Fail {
                reason: format!("{reason}; 重新构建失败: {err}"),
            },
        }
    }
}

fn verify_user_signature(user: &Pubkey, signature: &Signature, message: &[u8]) -> SponsorResult<()> {
    if signature.verify(user.as_ref(), message) {
        Ok(())
    } else {
        Err(SponsorError::Validation("用户签名与消息不匹配".into()))
    }
}

#[cfg(test)]
mod tests {
    use parking_lot::Mutex;
    use solana_sdk::signature::{Keypair, Signer};

    use crate::config::ComputeBudgetConfig;
    use crate::engine::testing::MockChain;
    use crate::instructions::token::native_transfer;

    use super::*;

    struct RecordingRebuilder {
        calls: Mutex<Vec<u32>>,
        fail: bool,
    }

    impl RecordingRebuilder {
        fn new(fail: bool) -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                fail,
            }
        }
    }

    #[async_trait]
    impl SwapRebuilder for RecordingRebuilder {
        async fn rebuild(
            &self,
            request: &SwapRequest,
            _user: &Pubkey,
            _policy: Arc<PolicyConfig>,
            prior_attempts: u32,
        ) -> SponsorResult<SwapResponse> {
            self.calls.lock().push(prior_attempts);
            if self.fail {
                return Err(SponsorError::QuoteUnavailable("dry".into()));
            }
            Ok(SwapResponse {
                request: request.clone(),
                transaction_message_base64: "rebuilt".into(),
                has_fee: false,
                fee_amount: 0,
                transaction_type: TransactionType::SellPartial,
                timestamp: 0,
                build_attempts: prior_attempts + 1,
                last_valid_block_height: 0,
            })
        }
    }

    struct Harness {
        chain: Arc<MockChain>,
        submitter: TransactionSubmitter,
        user: Keypair,
    }

    fn harness() -> Harness {
        let chain = Arc::new(MockChain::new());
        let fee_payer = Arc::new(FeePayer::new(Keypair::new()));
        let builder = TransactionBuilder::new(
            chain.clone(),
            fee_payer.pubkey,
            ComputeBudgetConfig::default(),
        );
        let submission = SubmissionConfig {
            confirm_poll_interval_ms: 1,
            ..SubmissionConfig::default()
        };
        let submitter = TransactionSubmitter::new(
            chain.clone(),
            builder,
            Arc::new(TransactionRegistry::new(Duration::from_secs(60), 64)),
            fee_payer,
            &submission,
        );
        Harness {
            chain,
            submitter,
            user: Keypair::new(),
        }
    }

    fn swap_request() -> SwapRequest {
        SwapRequest {
            buy_token_id: Pubkey::new_unique(),
            sell_token_id: Pubkey::new_unique(),
            sell_quantity: 1_000_000,
            slippage_bps: None,
        }
    }

    async fn prepare(
        harness: &Harness,
        transaction_type: TransactionType,
        auto_slippage: bool,
        build_attempts: u32,
    ) -> PreparedMessage {
        let user = harness.user.pubkey();
        let snapshot = RebuildSnapshot {
            request: swap_request(),
            policy: Arc::new(PolicyConfig::default()),
        };
        harness
            .submitter
            .prepare(
                vec![native_transfer(&user, &Pubkey::new_unique(), 10)],
                &[],
                60_000,
                RegistrationMeta {
                    transaction_type,
                    build_attempts,
                    auto_slippage,
                    context_slot: None,
                    user,
                    snapshot: Some(snapshot),
                },
            )
            .await
            .expect("prepare")
    }

    fn policy(max_build_attempts: u32) -> Arc<PolicyConfig> {
        Arc::new(PolicyConfig {
            max_build_attempts,
            ..PolicyConfig::default()
        })
    }

    #[tokio::test]
    async fn landed_transaction_carries_both_signatures() {
        let h = harness();
        let prepared = prepare(&h, TransactionType::SellPartial, true, 1).await;
        let signature = h.user.sign_message(&prepared.message.serialize());
        let rebuilder = RecordingRebuilder::new(false);

        let outcome = h
            .submitter
            .submit(&h.user.pubkey(), &signature, &prepared.key, policy(3), &rebuilder)
            .await
            .expect("submit");

        let sent = h.chain.sent_transactions();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].verify_with_results().iter().all(|ok| *ok));
        assert_eq!(
            outcome,
            SubmissionOutcome::Success {
                txid: sent[0].signatures[0].to_string()
            }
        );
    }

    #[tokio::test]
    async fn invalid_signature_is_rejected_without_consuming() {
        let h = harness();
        let prepared = prepare(&h, TransactionType::Buy, true, 1).await;
        let forged = Keypair::new().sign_message(&prepared.message.serialize());
        let rebuilder = RecordingRebuilder::new(false);

        let err = h
            .submitter
            .submit(&h.user.pubkey(), &forged, &prepared.key, policy(3), &rebuilder)
            .await
            .expect_err("forged signature");
        assert!(matches!(err, SponsorError::Validation(_)));
        assert_eq!(h.submitter.registry().len(), 1);
    }

    #[tokio::test]
    async fn second_submission_is_a_registry_miss() {
        let h = harness();
        let prepared = prepare(&h, TransactionType::Buy, true, 1).await;
        let signature = h.user.sign_message(&prepared.message.serialize());
        let rebuilder = RecordingRebuilder::new(false);
        h.submitter
            .submit(&h.user.pubkey(), &signature, &prepared.key, policy(3), &rebuilder)
            .await
            .expect("first submit");
        let err = h
            .submitter
            .submit(&h.user.pubkey(), &signature, &prepared.key, policy(3), &rebuilder)
            .await
            .expect_err("second submit");
        assert!(matches!(err, SponsorError::RegistryMiss));
    }

    #[tokio::test]
    async fn expired_blockhash_is_a_registry_miss() {
        let h = harness();
        let prepared = prepare(&h, TransactionType::Buy, true, 1).await;
        h.chain.set_block_height(prepared.last_valid_block_height + 1);
        let signature = h.user.sign_message(&prepared.message.serialize());
        let err = h
            .submitter
            .submit(
                &h.user.pubkey(),
                &signature,
                &prepared.key,
                policy(3),
                &RecordingRebuilder::new(false),
            )
            .await
            .expect_err("expired");
        assert!(matches!(err, SponsorError::RegistryMiss));
        assert!(h.chain.sent_transactions().is_empty());
    }

    #[tokio::test]
    async fn failed_auto_slippage_swap_is_rebuilt() {
        let h = harness();
        h.chain.fail_next_status("slippage tolerance exceeded");
        let prepared = prepare(&h, TransactionType::SellPartial, true, 1).await;
        let signature = h.user.sign_message(&prepared.message.serialize());
        let rebuilder = RecordingRebuilder::new(false);

        let outcome = h
            .submitter
            .submit(&h.user.pubkey(), &signature, &prepared.key, policy(3), &rebuilder)
            .await
            .expect("submit");
        match outcome {
            SubmissionOutcome::Rebuild { new_response } => {
                assert_eq!(new_response.build_attempts, 2)
            }
            other => panic!("expected rebuild, got {other:?}"),
        }
        assert_eq!(*rebuilder.calls.lock(), vec![1]);
    }

    #[tokio::test]
    async fn explicit_slippage_failure_is_final() {
        let h = harness();
        h.chain.fail_next_status("slippage tolerance exceeded");
        let prepared = prepare(&h, TransactionType::SellAll, false, 1).await;
        let signature = h.user.sign_message(&prepared.message.serialize());
        let rebuilder = RecordingRebuilder::new(false);
        let outcome = h
            .submitter
            .submit(&h.user.pubkey(), &signature, &prepared.key, policy(3), &rebuilder)
            .await
            .expect("submit");
        assert!(matches!(outcome, SubmissionOutcome::Fail { .. }));
        assert!(rebuilder.calls.lock().is_empty());
    }

    #[tokio::test]
    async fn transfer_failure_is_final() {
        let h = harness();
        h.chain.fail_next_send("blockhash not found");
        let prepared = prepare(&h, TransactionType::Transfer, true, 1).await;
        let signature = h.user.sign_message(&prepared.message.serialize());
        let rebuilder = RecordingRebuilder::new(false);
        let outcome = h
            .submitter
            .submit(&h.user.pubkey(), &signature, &prepared.key, policy(3), &rebuilder)
            .await
            .expect("submit");
        assert!(matches!(outcome, SubmissionOutcome::Fail { .. }));
        assert!(rebuilder.calls.lock().is_empty());
    }

    #[tokio::test]
    async fn exhausted_attempts_fail_instead_of_rebuilding() {
        let h = harness();
        h.chain.fail_next_status("slippage tolerance exceeded");
        let prepared = prepare(&h, TransactionType::Buy, true, 2).await;
        let signature = h.user.sign_message(&prepared.message.serialize());
        let rebuilder = RecordingRebuilder::new(false);
        let outcome = h
            .submitter
            .submit(&h.user.pubkey(), &signature, &prepared.key, policy(3), &rebuilder)
            .await
            .expect("submit");
        assert!(matches!(outcome, SubmissionOutcome::Fail { .. }));
        assert!(rebuilder.calls.lock().is_empty());
    }

    #[tokio::test]
    async fn failed_rebuild_reports_both_reasons() {
        let h = harness();
        h.chain.fail_next_status("custom program error: 0x1771");
        let prepared = prepare(&h, TransactionType::Buy, true, 1).await;
        let signature = h.user.sign_message(&prepared.message.serialize());
        let rebuilder = RecordingRebuilder::new(true);
        let outcome = h
            .submitter
            .submit(&h.user.pubkey(), &signature, &prepared.key, policy(3), &rebuilder)
            .await
            .expect("submit");
        match outcome {
            SubmissionOutcome::Fail { reason } => {
                assert!(reason.contains("0x1771"));
                assert!(reason.contains("重新构建失败"));
            }
            other => panic!("expected fail, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn wrong_wallet_is_rejected() {
        let h = harness();
        let prepared = prepare(&h, TransactionType::Buy, true, 1).await;
        let other = Keypair::new();
        let signature = other.sign_message(&prepared.message.serialize());
        let entry = h.submitter.registry().get(&prepared.key).expect("entry");
        let err = h
            .submitter
            .sign_and_send(
                &other.pubkey(),
                &signature,
                entry,
                policy(3),
                &RecordingRebuilder::new(false),
            )
            .await
            .expect_err("wrong wallet");
        assert!(matches!(err, SponsorError::Validation(_)));
    }
}
