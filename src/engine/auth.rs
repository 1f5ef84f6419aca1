use std::str::FromStr;

use async_trait::async_trait;
use dashmap::DashMap;
use solana_sdk::pubkey::Pubkey;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserContext {
    pub user_id: String,
    pub wallet: Pubkey,
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("缺少 bearer token")]
    MissingToken,
    #[error("token 无效: {0}")]
    InvalidToken(String),
    #[error("鉴权服务不可用: {0}")]
    Unavailable(String),
}

/// Resolves a bearer token to the wallet it acts for.
#[async_trait]
pub trait AuthService: Send + Sync {
    async fn get_user_context(&self, token: &str) -> Result<UserContext, AuthError>;
}

/// 固定的 token 表，由配置或测试填充。
#[derive(Debug, Default)]
pub struct StaticTokenAuth {
    tokens: DashMap<String, UserContext>,
}

impl StaticTokenAuth {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, token: impl Into<String>, context: UserContext) {
        self.tokens.insert(token.into(), context);
    }
}

#[async_trait]
impl AuthService for StaticTokenAuth {
    async fn get_user_context(&self, token: &str) -> Result<UserContext, AuthError> {
        let token = token.trim();
        if token.is_empty() {
            return Err(AuthError::MissingToken);
        }
        self.tokens
            .get(token)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| AuthError::InvalidToken("unknown token".into()))
    }
}

/// Treats the token itself as the wallet address. Used by the local CLI,
/// where the operator is the user.
#[derive(Debug, Default, Clone, Copy)]
pub struct WalletAddressAuth;

#[async_trait]
impl AuthService for WalletAddressAuth {
    async fn get_user_context(&self, token: &str) -> Result<UserContext, AuthError> {
        let token = token.trim();
        if token.is_empty() {
            return Err(AuthError::MissingToken);
        }
        let wallet =
            Pubkey::from_str(token).map_err(|err| AuthError::InvalidToken(err.to_string()))?;
        Ok(UserContext {
            user_id: wallet.to_string(),
            wallet,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn static_tokens_resolve_known_users_only() {
        let auth = StaticTokenAuth::new();
        let wallet = Pubkey::new_unique();
        auth.insert(
            "token-a",
            UserContext {
                user_id: "alice".into(),
                wallet,
            },
        );
        let context = auth.get_user_context("token-a").await.expect("known");
        assert_eq!(context.wallet, wallet);
        assert!(matches!(
            auth.get_user_context("token-b").await,
            Err(AuthError::InvalidToken(_))
        ));
        assert!(matches!(
            auth.get_user_context(" ").await,
            Err(AuthError::MissingToken)
        ));
    }

    #[tokio::test]
    async fn wallet_auth_parses_address() {
        let wallet = Pubkey::new_unique();
        let context = WalletAddressAuth
            .get_user_context(&wallet.to_string())
            .await
            .expect("wallet");
        assert_eq!(context.wallet, wallet);
        assert!(WalletAddressAuth.get_user_context("nope").await.is_err());
    }
}
