use solana_client::client_error::ClientError;
use solana_sdk::pubkey::Pubkey;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ChainError {
    #[error("RPC 请求失败: {0}")]
    Rpc(#[from] Box<ClientError>),
    #[error("账户 {0} 不存在")]
    AccountNotFound(Pubkey),
    #[error("解析账户 {account} 失败: {reason}")]
    Decode { account: Pubkey, reason: String },
    #[error("{0}")]
    Fatal(String),
}

impl From<ClientError> for ChainError {
    fn from(value: ClientError) -> Self {
        Self::Rpc(Box::new(value))
    }
}

impl ChainError {
    pub fn fatal(reason: impl std::fmt::Display) -> Self {
        Self::Fatal(reason.to_string())
    }
}

pub type ChainResult<T> = Result<T, ChainError>;
