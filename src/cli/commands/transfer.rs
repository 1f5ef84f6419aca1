use anyhow::{Result, anyhow};

use crate::cli::args::TransferCmd;
use crate::cli::context::build_service;
use crate::config::SponsorConfig;
use crate::engine::TransferRequest;

use super::print_json;

fn request_of(cmd: &TransferCmd) -> TransferRequest {
    TransferRequest {
        recipient: cmd.recipient,
        token_id: cmd.token,
        amount: cmd.amount,
    }
}

pub async fn build(config: &SponsorConfig, cmd: TransferCmd) -> Result<()> {
    let service = build_service(config).await?;
    let response = service
        .build_transfer(&cmd.wallet.to_string(), &request_of(&cmd))
        .await
        .map_err(|err| anyhow!(err));
    service.shutdown();
    print_json(&response?)
}

pub async fn estimate_fee(config: &SponsorConfig, cmd: TransferCmd) -> Result<()> {
    let service = build_service(config).await?;
    let estimate = service
        .estimate_transfer_fee(&cmd.wallet.to_string(), &request_of(&cmd))
        .await
        .map_err(|err| anyhow!(err));
    service.shutdown();
    print_json(&estimate?)
}
