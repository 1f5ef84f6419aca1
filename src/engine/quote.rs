use std::sync::Arc;

use async_trait::async_trait;
use solana_sdk::instruction::Instruction;
use solana_sdk::message::AddressLookupTableAccount;
use solana_sdk::pubkey::Pubkey;
use tracing::{debug, warn};

use crate::api::{
    JupiterApiClient, JupiterError, QuoteRequest, QuoteResponsePayload, SlippageSetting,
    SwapInstructionsRequest,
};
use crate::chain::ChainClient;
use crate::config::JupiterApiConfig;
use crate::instructions::token::NATIVE_MINT;

use super::error::{SponsorError, SponsorResult};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteParams {
    pub input_mint: Pubkey,
    pub output_mint: Pubkey,
    /// 精确输入数量（`input_mint` 最小单位）。
    pub amount: u64,
    pub slippage: SlippageSetting,
    pub user: Pubkey,
    /// 为路由所需租金付款的账户。
    pub payer: Pubkey,
}

/// A routed swap ready to be placed in a transaction. Instructions carry no
/// compute-budget directives.
#[derive(Debug, Clone)]
pub struct RoutePlan {
    pub instructions: Vec<Instruction>,
    pub lookup_tables: Vec<AddressLookupTableAccount>,
    pub quote: QuoteResponsePayload,
}

#[async_trait]
pub trait QuoteProvider: Send + Sync {
    async fn get_swap_instructions(&self, params: &RouteParams) -> SponsorResult<RoutePlan>;
}

/// Converts lamports into sponsored-token base units.
#[async_trait]
pub trait PriceOracle: Send + Sync {
    async fn sponsored_units_for_lamports(&self, lamports: u64) -> SponsorResult<u64>;
}

fn map_quote_error(err: JupiterError) -> SponsorError {
    if err.is_no_route() {
        SponsorError::QuoteUnavailable(err.describe())
    } else {
        SponsorError::Quote(err)
    }
}

/// 路由引用的 ALT 必须全部存在，否则其地址会被内联，消息超出 packet 上限。
fn ensure_lookup_tables_resolved(
    requested: &[Pubkey],
    resolved: &[AddressLookupTableAccount],
) -> SponsorResult<()> {
    let missing: Vec<String> = requested
        .iter()
        .filter(|address| !resolved.iter().any(|table| table.key == **address))
        .map(ToString::to_string)
        .collect();
    if missing.is_empty() {
        return Ok(());
    }
    warn!(
        target: "engine::quote",
        requested = requested.len(),
        missing = ?missing,
        "路由 ALT 拉取不全"
    );
    Err(SponsorError::QuoteUnavailable(format!(
        "路由 ALT 不存在: {}",
        missing.join(", ")
    )))
}

/// 正数租金折算后至少收取 1 个最小单位。
fn charged_units(out_amount: u64) -> u64 {
    out_amount.max(1)
}

#[derive(Clone)]
pub struct JupiterQuoteProvider {
    client: JupiterApiClient,
    chain: Arc<dyn ChainClient>,
    only_direct_routes: bool,
    restrict_intermediate_tokens: bool,
    max_accounts: Option<u16>,
    use_shared_accounts: Option<bool>,
}

impl JupiterQuoteProvider {
    pub fn new(
        client: JupiterApiClient,
        chain: Arc<dyn ChainClient>,
        config: &JupiterApiConfig,
    ) -> Self {
        Self {
            client,
            chain,
            only_direct_routes: config.only_direct_routes,
            restrict_intermediate_tokens: config.restrict_intermediate_tokens,
            max_accounts: config.max_accounts,
            use_shared_accounts: config.use_shared_accounts,
        }
    }

    fn quote_request(&self, params: &RouteParams) -> QuoteRequest {
        let mut request = QuoteRequest::new(
            params.input_mint,
            params.output_mint,
            params.amount,
            params.slippage,
        );
        request.only_direct_routes = Some(self.only_direct_routes);
        request.restrict_intermediate_tokens = Some(self.restrict_intermediate_tokens);
        request.max_accounts = self.max_accounts;
        request
    }
}

#[async_trait]
impl QuoteProvider for JupiterQuoteProvider {
    async fn get_swap_instructions(&self, params: &RouteParams) -> SponsorResult<RoutePlan> {
        let quote = self
            .client
            .quote(&self.quote_request(params))
            .await
            .map_err(map_quote_error)?
            .into_payload();

        if quote.out_amount == 0 {
            return Err(SponsorError::QuoteUnavailable(format!(
                "路由 {} -> {} 对数量 {} 输出为 0",
                params.input_mint, params.output_mint, params.amount
            )));
        }

        let mut request = SwapInstructionsRequest::from_quote(quote.clone(), params.user);
        request.payer = Some(params.payer);
        request.use_shared_accounts = self.use_shared_accounts;

        let response = self
            .client
            .swap_instructions(&request)
            .await
            .map_err(map_quote_error)?;

        let lookup_tables = self
            .chain
            .lookup_tables(&response.address_lookup_table_addresses)
            .await?;
        ensure_lookup_tables_resolved(&response.address_lookup_table_addresses, &lookup_tables)?;

        debug!(
            target: "engine::quote",
            input = %params.input_mint,
            output = %params.output_mint,
            in_amount = quote.in_amount,
            out_amount = quote.out_amount,
            min_out = quote.other_amount_threshold,
            slippage_bps = quote.slippage_bps,
            "路由解析完成"
        );

        Ok(RoutePlan {
            instructions: response.route_instructions(),
            lookup_tables,
            quote,
        })
    }
}

/// Prices SOL in the sponsored token with an exact-in Jupiter quote.
#[derive(Clone)]
pub struct JupiterPriceOracle {
    client: JupiterApiClient,
    sponsored_mint: Pubkey,
}

impl JupiterPriceOracle {
    const PRICE_SLIPPAGE_BPS: u16 = 50;

    pub fn new(client: JupiterApiClient, sponsored_mint: Pubkey) -> Self {
        Self {
            client,
            sponsored_mint,
        }
    }
}

#[async_trait]
impl PriceOracle for JupiterPriceOracle {
    async fn sponsored_units_for_lamports(&self, lamports: u64) -> SponsorResult<u64> {
        if lamports == 0 {
            return Ok(0);
        }
        let request = QuoteRequest::new(
            NATIVE_MINT,
            self.sponsored_mint,
            lamports,
            SlippageSetting::Fixed(Self::PRICE_SLIPPAGE_BPS),
        );
        let quote = self
            .client
            .quote(&request)
            .await
            .map_err(map_quote_error)?
            .into_payload();
        Ok(charged_units(quote.out_amount))
    }
}
