use std::sync::Arc;

use dashmap::DashMap;
use solana_address_lookup_table_interface::state::AddressLookupTable;
use solana_sdk::account::Account;
use solana_sdk::message::AddressLookupTableAccount;
use solana_sdk::pubkey::Pubkey;
use tracing::warn;

/// 已解码的地址查找表，按表地址索引。
#[derive(Clone, Default)]
pub struct AltCache {
    inner: Arc<DashMap<Pubkey, AddressLookupTableAccount>>,
}

impl AltCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// 将 `keys` 拆分为已缓存的表与仍需拉取的地址。
    pub fn partition(&self, keys: &[Pubkey]) -> (Vec<AddressLookupTableAccount>, Vec<Pubkey>) {
        let mut hits = Vec::with_capacity(keys.len());
        let mut missing = Vec::new();
        for key in keys {
            match self.inner.get(key) {
                Some(entry) => hits.push(entry.clone()),
                None => missing.push(*key),
            }
        }
        (hits, missing)
    }

    /// Decodes and stores a fetched account. Undecodable or absent accounts
    /// are skipped with a warning.
    pub fn store(
        &self,
        address: &Pubkey,
        account: Option<Account>,
    ) -> Option<AddressLookupTableAccount> {
        let Some(account) = account else {
            warn!(target: "cache::alt", address = %address, "ALT 账户不存在");
            self.inner.remove(address);
            return None;
        };
        match AddressLookupTable::deserialize(&account.data) {
            Ok(table) => {
                let decoded = AddressLookupTableAccount {
                    key: *address,
                    addresses: table.addresses.into_owned(),
                };
                self.inner.insert(*address, decoded.clone());
                Some(decoded)
            }
            Err(err) => {
                warn!(
                    target: "cache::alt",
                    address = %address,
                    error = %err,
                    "反序列化 ALT 失败"
                );
                self.inner.remove(address);
                None
            }
        }
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}
