use std::env;
use std::sync::Arc;

use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::{Keypair, Signature, Signer};

use crate::config::WalletConfig;

use super::error::{SponsorError, SponsorResult};

const PRIVATE_KEY_ENV: &str = "SPONSOR_PRIVATE_KEY";

/// 代付钱包：支付网络手续费与租金，并为服务发出的每笔交易签名。
#[derive(Clone)]
pub struct FeePayer {
    pub pubkey: Pubkey,
    signer: Arc<Keypair>,
}

impl std::fmt::Debug for FeePayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeePayer")
            .field("pubkey", &self.pubkey)
            .finish_non_exhaustive()
    }
}

impl FeePayer {
    pub fn new(signer: Keypair) -> Self {
        Self {
            pubkey: signer.pubkey(),
            signer: Arc::new(signer),
        }
    }

    pub fn from_wallet(wallet: &WalletConfig) -> SponsorResult<Self> {
        let signer = load_keypair(wallet)?;
        Ok(Self::new(signer))
    }

    pub fn sign_message(&self, message: &[u8]) -> Signature {
        self.signer.sign_message(message)
    }
}

fn load_keypair(wallet: &WalletConfig) -> SponsorResult<Keypair> {
    if let Ok(value) = env::var(PRIVATE_KEY_ENV) {
        if !value.trim().is_empty() {
            return parse_keypair_string(value.trim()).map_err(|err| {
                SponsorError::InvalidConfig(format!("{PRIVATE_KEY_ENV} 无效: {err}"))
            });
        }
    }

    if !wallet.private_key.trim().is_empty() {
        return parse_keypair_string(wallet.private_key.trim()).map_err(|err| {
            SponsorError::InvalidConfig(format!("global.wallet.private_key 无效: {err}"))
        });
    }

    Err(SponsorError::InvalidConfig(format!(
        "缺少 fee payer 私钥，请设置 global.wallet.private_key 或 {PRIVATE_KEY_ENV}"
    )))
}

pub(crate) fn parse_keypair_string(raw: &str) -> Result<Keypair, anyhow::Error> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        anyhow::bail!("私钥字符串为空");
    }

    if trimmed.starts_with('[') {
        let bytes: Vec<u8> = serde_json::from_str(trimmed)?;
        Ok(Keypair::try_from(bytes.as_slice())?)
    } else if trimmed.contains(',') {
        let bytes = trimmed
            .split(',')
            .map(|part| part.trim())
            .filter(|part| !part.is_empty())
            .map(|part| part.parse::<u8>())
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Keypair::try_from(bytes.as_slice())?)
    } else {
        let data = bs58::decode(trimmed).into_vec()?;
        Ok(Keypair::try_from(data.as_slice())?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_all_supported_key_encodings() {
        let keypair = Keypair::new();
        let bytes = keypair.to_bytes();

        let json = serde_json::to_string(&bytes.to_vec()).expect("json");
        let comma = bytes
            .iter()
            .map(|b| b.to_string())
            .collect::<Vec<_>>()
            .join(",");
        let base58 = bs58::encode(bytes).into_string();

        for encoded in [json, comma, base58] {
            let parsed = parse_keypair_string(&encoded).expect("parse keypair");
            assert_eq!(parsed.pubkey(), keypair.pubkey());
        }
    }

    #[test]
    fn rejects_empty_key() {
        assert!(parse_keypair_string("   ").is_err());
    }

    #[test]
    fn fee_payer_signature_verifies() {
        let payer = FeePayer::new(Keypair::new());
        let signature = payer.sign_message(b"sponsored");
        assert!(signature.verify(payer.pubkey.as_ref(), b"sponsored"));
    }
}
