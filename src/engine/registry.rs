use std::sync::Arc;
use std::time::Duration;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use dashmap::DashMap;
use solana_sdk::message::VersionedMessage;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::config::RegistryConfig;
use crate::monitoring::events;

use super::error::{SponsorError, SponsorResult};
use super::types::TransactionRegistryEntry;

/// 序列化消息的 base64，客户端提交时回传的 key。
pub fn message_key(message: &VersionedMessage) -> String {
    BASE64.encode(message.serialize())
}

/// 服务已发出、愿意联合签名的交易。
///
/// 读取即消费：`get` 会移除条目，即使并发提交，同一消息也最多提交一次。
#[derive(Debug)]
pub struct TransactionRegistry {
    entries: DashMap<String, TransactionRegistryEntry>,
    ttl: Duration,
    max_entries: usize,
}

impl TransactionRegistry {
    pub fn new(ttl: Duration, max_entries: usize) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
            max_entries: max_entries.max(1),
        }
    }

    pub fn from_config(config: &RegistryConfig) -> Self {
        Self::new(Duration::from_secs(config.ttl_secs), config.max_entries)
    }

    pub fn register(&self, entry: TransactionRegistryEntry) -> String {
        let key = message_key(&entry.message);
        if self.entries.len() >= self.max_entries && !self.entries.contains_key(&key) {
            let expired = self.sweep_expired();
            if expired == 0 {
                self.evict_oldest();
            }
        }
        self.entries.insert(key.clone(), entry);
        events::registry_size(self.entries.len());
        key
    }

    /// 从 registry 中取出条目。
    pub fn get(&self, key: &str) -> SponsorResult<TransactionRegistryEntry> {
        let (_, entry) = self.entries.remove(key).ok_or(SponsorError::RegistryMiss)?;
        events::registry_size(self.entries.len());
        if entry.created_at.elapsed() > self.ttl {
            events::registry_evicted("ttl", 1);
            return Err(SponsorError::RegistryMiss);
        }
        Ok(entry)
    }

    pub fn delete(&self, key: &str) -> bool {
        let removed = self.entries.remove(key).is_some();
        if removed {
            events::registry_size(self.entries.len());
        }
        removed
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn sweep_expired(&self) -> usize {
        let before = self.entries.len();
        let ttl = self.ttl;
        self.entries.retain(|_, entry| entry.created_at.elapsed() <= ttl);
        let removed = before.saturating_sub(self.entries.len());
        events::registry_evicted("ttl", removed);
        events::registry_size(self.entries.len());
        removed
    }

    fn evict_oldest(&self) {
        let oldest = self
            .entries
            .iter()
            .min_by_key(|item| item.value().created_at)
            .map(|item| item.key().clone());
        if let Some(key) = oldest {
            if self.entries.remove(&key).is_some() {
                events::registry_evicted("capacity", 1);
            }
        }
    }

    pub fn spawn_sweeper(
        self: &Arc<Self>,
        period: Duration,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        let registry = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = interval(period.max(Duration::from_millis(10)));
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        let removed = registry.sweep_expired();
                        if removed > 0 {
                            debug!(
                                target: "engine::registry",
                                removed,
                                remaining = registry.len(),
                                "已清理过期交易"
                            );
                        }
                    }
                }
            }
        })
    }
}
