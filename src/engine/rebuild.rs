use std::sync::Arc;

use async_trait::async_trait;
use solana_sdk::pubkey::Pubkey;

use crate::config::PolicyConfig;
use crate::monitoring::events;

use super::assembler::SwapBuilder;
use super::error::{SponsorError, SponsorResult};
use super::submitter::SwapRebuilder;
use super::types::{SwapRequest, SwapResponse};

/// Drives build attempts for one logical request chain. Attempts run
/// back to back without backoff.
#[derive(Clone)]
pub struct RebuildCoordinator {
    builder: Arc<dyn SwapBuilder>,
}

impl RebuildCoordinator {
    pub fn new(builder: Arc<dyn SwapBuilder>) -> Self {
        Self { builder }
    }

    /// Tries attempts `prior_attempts + 1 ..= max_build_attempts`. Only
    /// requests without an explicit slippage are retried.
    pub async fn build_with_rebuild(
        &self,
        request: &SwapRequest,
        user: &Pubkey,
        cfg: Arc<PolicyConfig>,
        prior_attempts: u32,
    ) -> SponsorResult<SwapResponse> {
        if prior_attempts >= cfg.max_build_attempts {
            return Err(SponsorError::Submission(format!(
                "构建次数上限 {} 已用尽",
                cfg.max_build_attempts
            )));
        }
        let mut attempt = prior_attempts + 1;
        loop {
            match self
                .builder
                .build_swap_response(request, user, Arc::clone(&cfg), attempt)
                .await
            {
                Ok(response) => return Ok(response),
                Err(err) => {
                    let retry = attempt < cfg.max_build_attempts
                        && request.slippage_bps.is_none()
                        && err.is_retriable();
                    events::swap_build_failed(user, attempt, &err.to_string(), retry);
                    if !retry {
                        return Err(err);
                    }
                    attempt += 1;
                }
            }
        }
    }
}

#[async_trait]
impl SwapRebuilder for RebuildCoordinator {
    async fn rebuild(
        &self,
        request: &SwapRequest,
        user: &Pubkey,
        policy: Arc<PolicyConfig>,
        prior_attempts: u32,
    ) -> SponsorResult<SwapResponse> {
        self.build_with_rebuild(request, user, policy, prior_attempts)
            .await
    }
}
