use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use solana_sdk::signature::Signature;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::api::JupiterApiClient;
use crate::chain::{ChainClient, RpcChainClient};
use crate::config::{ConfigService, PolicyConfig, SponsorConfig};

use super::assembler::SwapAssembler;
use super::auth::{AuthService, UserContext};
use super::builder::TransactionBuilder;
use super::error::{SponsorError, SponsorResult};
use super::fee::{FeeService, SponsoredToken};
use super::identity::FeePayer;
use super::quote::{JupiterPriceOracle, JupiterQuoteProvider, PriceOracle, QuoteProvider};
use super::rebuild::RebuildCoordinator;
use super::registry::TransactionRegistry;
use super::stream::{SwapSource, SwapStream, SwapStreamRegistry};
use super::submitter::TransactionSubmitter;
use super::transfer::TransferAssembler;
use super::types::{
    PresignedSwapResponse, SubmissionResponse, SwapRequest, SwapResponse, TransferFeeEstimate,
    TransferRequest, TransferResponse,
};

/// 构造服务所需的外部依赖。
pub struct SponsorComponents {
    pub chain: Arc<dyn ChainClient>,
    pub quotes: Arc<dyn QuoteProvider>,
    pub oracle: Arc<dyn PriceOracle>,
    pub auth: Arc<dyn AuthService>,
    pub fee_payer: Arc<FeePayer>,
}

/// Stream ticks run the same build path as one-shot requests, under the
/// policy live at the time of the tick.
struct CoordinatorSource {
    coordinator: Arc<RebuildCoordinator>,
    config: Arc<ConfigService>,
    registry: Arc<TransactionRegistry>,
}

#[async_trait]
impl SwapSource for CoordinatorSource {
    async fn build(&self, request: &SwapRequest, user: &UserContext) -> SponsorResult<SwapResponse> {
        self.coordinator
            .build_with_rebuild(request, &user.wallet, self.config.snapshot(), 0)
            .await
    }

    fn discard(&self, response: &SwapResponse) {
        self.registry.delete(&response.transaction_message_base64);
    }
}

/// 所有代付操作的入口。每次调用先校验 bearer token，再以其对应的钱包身份执行。
pub struct SponsorService {
    auth: Arc<dyn AuthService>,
    config: Arc<ConfigService>,
    fee_payer: Arc<FeePayer>,
    registry: Arc<TransactionRegistry>,
    submitter: Arc<TransactionSubmitter>,
    coordinator: Arc<RebuildCoordinator>,
    transfers: TransferAssembler,
    streams: SwapStreamRegistry,
    shutdown: CancellationToken,
}

impl SponsorService {
    pub async fn new(config: &SponsorConfig, components: SponsorComponents) -> SponsorResult<Self> {
        config
            .validate()
            .map_err(|err| SponsorError::InvalidConfig(err.to_string()))?;
        let SponsorComponents {
            chain,
            quotes,
            oracle,
            auth,
            fee_payer,
        } = components;

        let mint = config.sponsored_token.mint;
        let token = SponsoredToken {
            mint,
            decimals: config.sponsored_token.decimals,
            token_program: chain.token_program_of(&mint).await?,
        };
        let fees = Arc::new(FeeService::new(fee_payer.pubkey, token, oracle));

        let shutdown = CancellationToken::new();
        let registry = Arc::new(TransactionRegistry::from_config(&config.registry));
        registry.spawn_sweeper(
            Duration::from_secs(config.registry.sweep_interval_secs.max(1)),
            shutdown.child_token(),
        );

        let builder = TransactionBuilder::new(
            Arc::clone(&chain),
            fee_payer.pubkey,
            config.compute_budget.clone(),
        );
        let submitter = Arc::new(TransactionSubmitter::new(
            Arc::clone(&chain),
            builder,
            Arc::clone(&registry),
            Arc::clone(&fee_payer),
            &config.submission,
        ));
        let assembler = Arc::new(SwapAssembler::new(
            Arc::clone(&chain),
            quotes,
            Arc::clone(&fees),
            Arc::clone(&submitter),
            config.compute_budget.default_unit_limit,
        ));
        let coordinator = Arc::new(RebuildCoordinator::new(assembler));
        let transfers = TransferAssembler::new(
            chain,
            fees,
            Arc::clone(&submitter),
            config.compute_budget.transfer_unit_limit,
        );
        let policy = Arc::new(ConfigService::new(config.policy.clone()));
        let streams = SwapStreamRegistry::new(
            Arc::new(CoordinatorSource {
                coordinator: Arc::clone(&coordinator),
                config: Arc::clone(&policy),
                registry: Arc::clone(&registry),
            }),
            Duration::from_millis(config.stream.interval_ms),
        );

        info!(
            target: "engine::service",
            fee_payer = %fee_payer.pubkey,
            sponsored_mint = %token.mint,
            token_program = %token.token_program,
            "代付服务已就绪"
        );

        Ok(Self {
            auth,
            config: policy,
            fee_payer,
            registry,
            submitter,
            coordinator,
            transfers,
            streams,
            shutdown,
        })
    }

    /// 根据配置组装 RPC 客户端与 Jupiter 路由。
    pub async fn from_config(
        config: &SponsorConfig,
        auth: Arc<dyn AuthService>,
    ) -> SponsorResult<Self> {
        let chain: Arc<dyn ChainClient> = Arc::new(RpcChainClient::from_config(
            &config.global,
            &config.submission,
        )?);
        let http = reqwest::Client::builder()
            .build()
            .map_err(|err| SponsorError::InvalidConfig(format!("HTTP 客户端构建失败: {err}")))?;
        let jupiter = JupiterApiClient::new(http, &config.jupiter, &config.global.logging);
        let quotes = Arc::new(JupiterQuoteProvider::new(
            jupiter.clone(),
            Arc::clone(&chain),
            &config.jupiter,
        ));
        let oracle = Arc::new(JupiterPriceOracle::new(jupiter, config.sponsored_token.mint));
        let fee_payer = Arc::new(FeePayer::from_wallet(&config.global.wallet)?);
        Self::new(
            config,
            SponsorComponents {
                chain,
                quotes,
                oracle,
                auth,
                fee_payer,
            },
        )
        .await
    }

    async fn authenticate(&self, token: &str) -> SponsorResult<UserContext> {
        Ok(self.auth.get_user_context(token).await?)
    }

    pub async fn build_swap(&self, token: &str, request: &SwapRequest) -> SponsorResult<SwapResponse> {
        let user = self.authenticate(token).await?;
        self.coordinator
            .build_with_rebuild(request, &user.wallet, self.config.snapshot(), 0)
            .await
    }

    /// Like `build_swap`, with the fee payer signature attached so the
    /// client can broadcast on its own.
    pub async fn build_presigned_swap(
        &self,
        token: &str,
        request: &SwapRequest,
    ) -> SponsorResult<PresignedSwapResponse> {
        let swap = self.build_swap(token, request).await?;
        let signature = self.submitter.presign(&swap.transaction_message_base64)?;
        Ok(PresignedSwapResponse {
            swap,
            fee_payer_signature: signature.to_string(),
        })
    }

    pub async fn submit_transaction(
        &self,
        token: &str,
        message_base64: &str,
        user_signature: &str,
    ) -> SponsorResult<SubmissionResponse> {
        let user = self.authenticate(token).await?;
        let signature = Signature::from_str(user_signature.trim())
            .map_err(|err| SponsorError::Validation(format!("用户签名格式非法: {err}")))?;
        let outcome = self
            .submitter
            .submit(
                &user.wallet,
                &signature,
                message_base64,
                self.config.snapshot(),
                self.coordinator.as_ref(),
            )
            .await?;
        Ok(outcome.into())
    }

    pub async fn build_transfer(
        &self,
        token: &str,
        request: &TransferRequest,
    ) -> SponsorResult<TransferResponse> {
        let user = self.authenticate(token).await?;
        self.transfers
            .build_transfer(request, &user.wallet, self.config.snapshot())
            .await
    }

    pub async fn estimate_transfer_fee(
        &self,
        token: &str,
        request: &TransferRequest,
    ) -> SponsorResult<TransferFeeEstimate> {
        self.authenticate(token).await?;
        self.transfers.estimate_transfer_fee(request).await
    }

    pub async fn start_swap_stream(
        &self,
        token: &str,
        request: SwapRequest,
    ) -> SponsorResult<Arc<SwapStream>> {
        let user = self.authenticate(token).await?;
        Ok(self.streams.start(user, request))
    }

    pub async fn update_swap_request(&self, token: &str, request: SwapRequest) -> SponsorResult<()> {
        let user = self.authenticate(token).await?;
        self.streams.update(&user.user_id, request)
    }

    pub async fn stop_swap_stream(&self, token: &str) -> SponsorResult<bool> {
        let user = self.authenticate(token).await?;
        Ok(self.streams.stop(&user.user_id))
    }

    pub fn config(&self) -> &ConfigService {
        &self.config
    }

    pub fn reload_policy(&self, policy: PolicyConfig) -> SponsorResult<()> {
        self.config
            .reload(policy)
            .map_err(|err| SponsorError::InvalidConfig(err.to_string()))
    }

    pub fn fee_payer(&self) -> &FeePayer {
        &self.fee_payer
    }

    pub fn pending_transactions(&self) -> usize {
        self.registry.len()
    }

    pub fn shutdown(&self) {
        if self.shutdown.is_cancelled() {
            return;
        }
        warn!(
            target: "engine::service",
            active_streams = self.streams.len(),
            pending = self.registry.len(),
            "代付服务正在关闭"
        );
        self.streams.shutdown();
        self.shutdown.cancel();
    }
}

impl Drop for SponsorService {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}
