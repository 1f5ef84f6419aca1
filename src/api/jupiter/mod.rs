//! Jupiter 聚合器 HTTP 客户端封装。

pub mod quote;
pub mod swap_instructions;

use std::fmt;
use std::time::{Duration, Instant};

use metrics::{counter, histogram};
use reqwest::{RequestBuilder, StatusCode};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, trace, warn};

use crate::config::{JupiterApiConfig, LoggingConfig};
use crate::monitoring::metrics::prometheus_enabled;

pub use quote::{QuoteRequest, QuoteResponse, QuoteResponsePayload, SlippageSetting, SwapMode};
pub use swap_instructions::{SwapInstructionsRequest, SwapInstructionsResponse};

#[derive(Debug, Error)]
pub enum JupiterError {
    #[error("Jupiter API 请求失败: {0}")]
    Http(#[from] reqwest::Error),
    #[error("请求 {endpoint} 超时（{timeout_ms}ms）")]
    Timeout {
        endpoint: String,
        timeout_ms: u64,
        #[source]
        source: reqwest::Error,
    },
    #[error("响应解析失败: {0}")]
    Json(#[from] serde_json::Error),
    #[error("请求 {endpoint} 返回状态 {status}: {body}")]
    ApiStatus {
        endpoint: String,
        status: StatusCode,
        body: String,
    },
    #[error("请求 {endpoint} 被限流，状态 {status}: {body}")]
    RateLimited {
        endpoint: String,
        status: StatusCode,
        body: String,
    },
    #[error("Jupiter 响应结构异常: {0}")]
    Schema(String),
}

impl JupiterError {
    pub fn describe(&self) -> String {
        use std::error::Error as _;
        let mut parts = vec![self.to_string()];
        let mut current = self.source();
        while let Some(err) = current {
            let text = err.to_string();
            if parts.last().map(|last| last == &text).unwrap_or(false) {
                current = err.source();
                continue;
            }
            parts.push(text);
            current = err.source();
        }
        parts.join(" | caused by: ")
    }

    /// 无可用路由时 Jupiter 返回 400 与 `COULD_NOT_FIND_ANY_ROUTE`。
    pub fn is_no_route(&self) -> bool {
        match self {
            JupiterError::ApiStatus { status, body, .. } => {
                *status == StatusCode::BAD_REQUEST
                    && (body.contains("COULD_NOT_FIND_ANY_ROUTE")
                        || body.contains("NO_ROUTES_FOUND")
                        || body.contains("TOKEN_NOT_TRADABLE"))
            }
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Endpoint {
    Quote,
    Swap,
}

impl Endpoint {
    fn target(self) -> &'static str {
        match self {
            Endpoint::Quote => "jupiter::quote",
            Endpoint::Swap => "jupiter::swap",
        }
    }

    fn counter_name(self) -> &'static str {
        match self {
            Endpoint::Quote => "sponsor_jupiter_quote_total",
            Endpoint::Swap => "sponsor_jupiter_swap_total",
        }
    }

    fn latency_name(self) -> &'static str {
        match self {
            Endpoint::Quote => "sponsor_jupiter_quote_latency_ms",
            Endpoint::Swap => "sponsor_jupiter_swap_latency_ms",
        }
    }
}

#[derive(Clone)]
pub struct JupiterApiClient {
    quote_url: String,
    swap_url: String,
    client: reqwest::Client,
    quote_timeout: Duration,
    swap_timeout: Duration,
    slow_quote_warn_ms: u64,
    slow_swap_warn_ms: u64,
}

impl fmt::Debug for JupiterApiClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JupiterApiClient")
            .field("quote_url", &self.quote_url)
            .field("swap_url", &self.swap_url)
            .field("quote_timeout", &self.quote_timeout)
            .field("swap_timeout", &self.swap_timeout)
            .finish()
    }
}

impl JupiterApiClient {
    pub fn new(client: reqwest::Client, config: &JupiterApiConfig, logging: &LoggingConfig) -> Self {
        Self {
            quote_url: config.quote_url.clone(),
            swap_url: config.swap_url.clone(),
            client,
            quote_timeout: Duration::from_millis(config.timeouts.quote_ms),
            swap_timeout: Duration::from_millis(config.timeouts.swap_ms),
            slow_quote_warn_ms: logging.slow_quote_warn_ms,
            slow_swap_warn_ms: logging.slow_swap_warn_ms,
        }
    }

    pub async fn quote(&self, request: &QuoteRequest) -> Result<QuoteResponse, JupiterError> {
        trace!(
            target: "jupiter::quote",
            input_mint = %request.input_mint,
            output_mint = %request.output_mint,
            amount = request.amount,
            slippage = ?request.slippage,
            "请求 Jupiter 报价"
        );

        let params = request.to_query_params();
        let builder = self
            .client
            .get(&self.quote_url)
            .timeout(self.quote_timeout)
            .query(&params);
        let started = Instant::now();
        let json = self
            .execute(Endpoint::Quote, &self.quote_url, self.quote_timeout, builder)
            .await?;

        let quote = QuoteResponse::try_from_value(json).map_err(|err| {
            record_metrics(Endpoint::Quote, "schema_error", None, None);
            warn!(
                target: "jupiter::quote",
                endpoint = %self.quote_url,
                error = %err,
                "Jupiter 报价结构校验失败"
            );
            JupiterError::Schema(err.to_string())
        })?;

        let elapsed_ms = started.elapsed().as_secs_f64() * 1_000.0;
        if elapsed_ms > self.slow_quote_warn_ms as f64 {
            warn!(
                target: "jupiter::quote",
                elapsed_ms = format_args!("{elapsed_ms:.3}"),
                threshold_ms = self.slow_quote_warn_ms,
                "Jupiter 报价耗时过长"
            );
        } else {
            debug!(
                target: "jupiter::quote",
                elapsed_ms = format_args!("{elapsed_ms:.3}"),
                in_amount = quote.payload().in_amount,
                out_amount = quote.payload().out_amount,
                "Jupiter 报价完成"
            );
        }
        record_metrics(Endpoint::Quote, "success", Some(elapsed_ms), None);
        Ok(quote)
    }

    pub async fn swap_instructions(
        &self,
        request: &SwapInstructionsRequest,
    ) -> Result<SwapInstructionsResponse, JupiterError> {
        let mut payload = serde_json::to_value(request)
            .map_err(|err| JupiterError::Schema(format!("failed to encode swap request: {err}")))?;
        prune_nulls(&mut payload);
        trace!(
            target: "jupiter::swap",
            payload = %payload,
            "请求 Jupiter swap 指令"
        );

        let builder = self
            .client
            .post(&self.swap_url)
            .timeout(self.swap_timeout)
            .json(&payload);
        let started = Instant::now();
        let json = self
            .execute(Endpoint::Swap, &self.swap_url, self.swap_timeout, builder)
            .await?;

        let instructions = SwapInstructionsResponse::try_from(json).map_err(|err| {
            record_metrics(Endpoint::Swap, "schema_error", None, None);
            warn!(
                target: "jupiter::swap",
                endpoint = %self.swap_url,
                error = %err,
                "Jupiter swap 指令结构校验失败"
            );
            JupiterError::Schema(err.to_string())
        })?;

        let elapsed_ms = started.elapsed().as_secs_f64() * 1_000.0;
        if elapsed_ms > self.slow_swap_warn_ms as f64 {
            warn!(
                target: "jupiter::swap",
                elapsed_ms = format_args!("{elapsed_ms:.3}"),
                threshold_ms = self.slow_swap_warn_ms,
                "Jupiter swap 指令耗时过长"
            );
        } else {
            debug!(
                target: "jupiter::swap",
                elapsed_ms = format_args!("{elapsed_ms:.3}"),
                setup = instructions.setup_instructions.len(),
                lookup_tables = instructions.address_lookup_table_addresses.len(),
                "Jupiter swap 指令获取完成"
            );
        }
        record_metrics(Endpoint::Swap, "success", Some(elapsed_ms), None);
        Ok(instructions)
    }

    async fn execute(
        &self,
        endpoint: Endpoint,
        url: &str,
        timeout: Duration,
        builder: RequestBuilder,
    ) -> Result<Value, JupiterError> {
        let target = endpoint.target();
        let timeout_ms = timeout.as_millis() as u64;
        let classify = |err: reqwest::Error, stage: &'static str, status: Option<StatusCode>| {
            if err.is_timeout() {
                record_metrics(endpoint, "timeout", None, status);
                warn!(target: "jupiter", api = target, endpoint = %url, timeout_ms, stage, "Jupiter 请求超时");
                JupiterError::Timeout {
                    endpoint: url.to_string(),
                    timeout_ms,
                    source: err,
                }
            } else {
                record_metrics(endpoint, "transport_error", None, status);
                warn!(target: "jupiter", api = target, endpoint = %url, error = %err, stage, "Jupiter 请求失败");
                JupiterError::from(err)
            }
        };

        let response = builder
            .send()
            .await
            .map_err(|err| classify(err, "send", None))?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|err| classify(err, "read", Some(status)))?;

        if status == StatusCode::TOO_MANY_REQUESTS {
            let summary = summarize_error_body(body);
            record_metrics(endpoint, "rate_limited", None, Some(status));
            warn!(
                target: "jupiter",
                api = target,
                endpoint = %url,
                status = status.as_u16(),
                body = %summary,
                "Jupiter 请求被限流"
            );
            return Err(JupiterError::RateLimited {
                endpoint: url.to_string(),
                status,
                body: summary,
            });
        }

        if !status.is_success() {
            let summary = summarize_error_body(body);
            record_metrics(endpoint, "http_error", None, Some(status));
            warn!(
                target: "jupiter",
                api = target,
                endpoint = %url,
                status = status.as_u16(),
                body = %summary,
                "Jupiter 返回非成功状态"
            );
            return Err(JupiterError::ApiStatus {
                endpoint: url.to_string(),
                status,
                body: summary,
            });
        }

        serde_json::from_str(&body).map_err(|err| {
            record_metrics(endpoint, "decode_error", None, Some(status));
            warn!(
                target: "jupiter",
                api = target,
                endpoint = %url,
                error = %err,
                "Jupiter 响应不是合法 JSON"
            );
            JupiterError::Json(err)
        })
    }
}

fn record_metrics(
    endpoint: Endpoint,
    status: &'static str,
    elapsed_ms: Option<f64>,
    http_status: Option<StatusCode>,
) {
    if !prometheus_enabled() {
        return;
    }
    counter!(
        endpoint.counter_name(),
        "status" => status,
        "http_status" => http_status
            .map(|code| code.as_u16().to_string())
            .unwrap_or_else(|| "none".to_string())
    )
    .increment(1);
    if let Some(value) = elapsed_ms {
        histogram!(endpoint.latency_name(), "status" => status).record(value);
    }
}

fn summarize_error_body(body: String) -> String {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return "(empty response body)".to_string();
    }
    let mut single_line = trimmed.replace(['\n', '\r'], " ");
    const MAX_LEN: usize = 512;
    if single_line.len() > MAX_LEN {
        let mut cut = MAX_LEN;
        while !single_line.is_char_boundary(cut) {
            cut -= 1;
        }
        single_line.truncate(cut);
        single_line.push('…');
    }
    single_line
}

fn prune_nulls(value: &mut Value) {
    match value {
        Value::Object(map) => {
            map.retain(|_, entry| {
                prune_nulls(entry);
                !entry.is_null()
            });
        }
        Value::Array(array) => {
            for item in array.iter_mut() {
                prune_nulls(item);
            }
            array.retain(|item| !item.is_null());
        }
        _ => {}
    }
}
