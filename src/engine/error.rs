use thiserror::Error;

use crate::api::JupiterError;
use crate::chain::ChainError;

use super::auth::AuthError;

#[derive(Debug, Error)]
pub enum SponsorError {
    #[error("参数校验失败: {0}")]
    Validation(String),
    #[error("无可用路由: {0}")]
    QuoteUnavailable(String),
    #[error("transaction not found or expired, rebuild a new transaction")]
    RegistryMiss,
    #[error("余额不足: 需要 {required}，可用 {available}")]
    InsufficientBalance { required: u64, available: u64 },
    #[error("交易提交失败: {0}")]
    Submission(String),
    #[error("No active swap stream found to update")]
    StreamNotFound,
    #[error("报价服务错误: {}", .0.describe())]
    Quote(#[from] JupiterError),
    #[error("链上访问错误: {0}")]
    Chain(#[from] ChainError),
    #[error("鉴权失败: {0}")]
    Auth(#[from] AuthError),
    #[error("指令构建失败: {0}")]
    Instruction(String),
    #[error("交易构建失败: {0}")]
    Transaction(#[from] anyhow::Error),
    #[error("配置缺失或非法: {0}")]
    InvalidConfig(String),
}

impl SponsorError {
    /// 确定性错误，重新报价也无法修复。
    pub fn is_retriable(&self) -> bool {
        !matches!(
            self,
            SponsorError::Validation(_)
                | SponsorError::InsufficientBalance { .. }
                | SponsorError::Auth(_)
                | SponsorError::InvalidConfig(_)
                | SponsorError::StreamNotFound
        )
    }

    pub fn label(&self) -> &'static str {
        match self {
            SponsorError::Validation(_) => "validation",
            SponsorError::QuoteUnavailable(_) => "quote_unavailable",
            SponsorError::RegistryMiss => "registry_miss",
            SponsorError::InsufficientBalance { .. } => "insufficient_balance",
            SponsorError::Submission(_) => "submission",
            SponsorError::StreamNotFound => "stream_not_found",
            SponsorError::Quote(_) => "quote",
            SponsorError::Chain(_) => "chain",
            SponsorError::Auth(_) => "auth",
            SponsorError::Instruction(_) => "instruction",
            SponsorError::Transaction(_) => "transaction",
            SponsorError::InvalidConfig(_) => "invalid_config",
        }
    }
}

pub type SponsorResult<T> = Result<T, SponsorError>;
