use std::sync::Arc;

use parking_lot::RwLock;
use tracing::info;

use super::{ConfigError, PolicyConfig};

/// 持有实时 policy。读取方拿到 `Arc` 快照；reload 只替换指针，
/// 已发出的快照不受影响。
#[derive(Debug)]
pub struct ConfigService {
    current: RwLock<Arc<PolicyConfig>>,
}

impl ConfigService {
    pub fn new(policy: PolicyConfig) -> Self {
        Self {
            current: RwLock::new(Arc::new(policy)),
        }
    }

    pub fn snapshot(&self) -> Arc<PolicyConfig> {
        Arc::clone(&self.current.read())
    }

    pub fn reload(&self, policy: PolicyConfig) -> Result<(), ConfigError> {
        policy.validate()?;
        info!(
            target: "config::service",
            max_build_attempts = policy.max_build_attempts,
            auto_slippage = policy.auto_slippage,
            buy_fee_bps = policy.fee_bps.buy,
            sell_fee_bps = policy.fee_bps.sell,
            "policy 已重新加载"
        );
        *self.current.write() = Arc::new(policy);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_is_unaffected_by_reload() {
        let service = ConfigService::new(PolicyConfig::default());
        let before = service.snapshot();

        let mut updated = PolicyConfig::default();
        updated.max_build_attempts = 7;
        service.reload(updated).expect("reload policy");

        assert_eq!(before.max_build_attempts, 3);
        assert_eq!(service.snapshot().max_build_attempts, 7);
    }

    #[test]
    fn reload_rejects_invalid_policy() {
        let service = ConfigService::new(PolicyConfig::default());
        let mut invalid = PolicyConfig::default();
        invalid.max_build_attempts = 0;
        assert!(service.reload(invalid).is_err());
        assert_eq!(service.snapshot().max_build_attempts, 3);
    }
}
