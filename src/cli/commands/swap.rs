use std::fs;
use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use solana_sdk::signature::{Keypair, Signer};
use tokio_stream::StreamExt as _;
use tracing::{info, warn};

use crate::cli::args::{QuoteCmd, StreamCmd, SubmitCmd, SwapArgs};
use crate::cli::context::build_service;
use crate::config::SponsorConfig;
use crate::engine::{ResponseType, SponsorService, SwapRequest, parse_keypair_string};

use super::print_json;

fn request_of(args: &SwapArgs) -> SwapRequest {
    SwapRequest {
        buy_token_id: args.buy,
        sell_token_id: args.sell,
        sell_quantity: args.amount,
        slippage_bps: args.slippage_bps,
    }
}

pub async fn quote(config: &SponsorConfig, cmd: QuoteCmd) -> Result<()> {
    let service = build_service(config).await?;
    let token = cmd.wallet.to_string();
    let request = request_of(&cmd.swap);
    let result = if cmd.presign {
        service
            .build_presigned_swap(&token, &request)
            .await
            .map_err(|err| anyhow!(err))
            .and_then(|response| print_json(&response))
    } else {
        service
            .build_swap(&token, &request)
            .await
            .map_err(|err| anyhow!(err))
            .and_then(|response| print_json(&response))
    };
    service.shutdown();
    result
}

pub async fn submit(config: &SponsorConfig, cmd: SubmitCmd) -> Result<()> {
    let raw = fs::read_to_string(&cmd.keypair)
        .with_context(|| format!("读取 {} 失败", cmd.keypair.display()))?;
    let user = parse_keypair_string(raw.trim())
        .with_context(|| format!("解析私钥 {} 失败", cmd.keypair.display()))?;

    let service = build_service(config).await?;
    let outcome = sign_and_submit(&service, &user, &request_of(&cmd.swap)).await;
    service.shutdown();
    outcome
}

async fn sign_and_submit(service: &SponsorService, user: &Keypair, request: &SwapRequest) -> Result<()> {
    let token = user.pubkey().to_string();
    let mut swap = service
        .build_swap(&token, request)
        .await
        .map_err(|err| anyhow!(err))?;
    loop {
        let bytes = BASE64
            .decode(&swap.transaction_message_base64)
            .context("服务返回的消息格式非法")?;
        let signature = user.sign_message(&bytes).to_string();
        let response = service
            .submit_transaction(&token, &swap.transaction_message_base64, &signature)
            .await
            .map_err(|err| anyhow!(err))?;
        match (response.response_type, response.rebuild.clone()) {
            (ResponseType::Rebuild, Some(next)) => {
                info!(
                    target: "cli::submit",
                    attempt = next.build_attempts,
                    "提交失败，签名重建后的 swap"
                );
                swap = next;
            }
            (ResponseType::Success, _) => return print_json(&response),
            _ => {
                print_json(&response)?;
                bail!(
                    "提交失败: {}",
                    response.error.unwrap_or_else(|| "unknown reason".into())
                );
            }
        }
    }
}

pub async fn stream(config: &SponsorConfig, cmd: StreamCmd) -> Result<()> {
    let service = build_service(config).await?;
    let token = cmd.wallet.to_string();
    let stream = service
        .start_swap_stream(&token, request_of(&cmd.swap))
        .await
        .map_err(|err| anyhow!(err))?;
    info!(
        target: "cli::stream",
        stream_id = %stream.id,
        duration_secs = cmd.duration_secs,
        "swap stream 已启动"
    );

    let mut updates = Box::pin(stream.updates());
    let deadline = tokio::time::sleep(Duration::from_secs(cmd.duration_secs));
    tokio::pin!(deadline);
    let result = loop {
        tokio::select! {
            _ = &mut deadline => break Ok(()),
            signal = tokio::signal::ctrl_c() => {
                if let Err(err) = signal {
                    warn!(target: "cli::stream", error = %err, "ctrl-c 监听失败");
                }
                break Ok(());
            }
            update = updates.next() => match update {
                Some(update) => {
                    if let Err(err) = print_json(&update) {
                        break Err(err);
                    }
                }
                None => break Ok(()),
            },
        }
    };

    if let Err(err) = service.stop_swap_stream(&token).await {
        warn!(target: "cli::stream", error = %err, "停止 swap stream 失败");
    }
    service.shutdown();
    result
}
