use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Tunables for lock acquisition and upkeep.
///
/// Recommended ordering is `retry_delay <= update_interval < expiry <= timeout`;
/// this is not enforced at construction, since a caller may have good reason to
/// deviate (e.g. tests), but [`LockCoordinator`](crate::coordinator::LockCoordinator)
/// assumes `update_interval < expiry` and will heartbeat too slowly to keep a lock
/// alive if that's violated.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct LockConfig {
    /// Age beyond which a lock with no heartbeat is eligible for force-expiry.
    pub expiry: Duration,
    /// Wall-clock budget for a single [`acquire`](crate::coordinator::LockCoordinator::acquire) call.
    pub timeout: Duration,
    /// Delay between acquisition attempts while the lock is held by a live holder.
    pub retry_delay: Duration,
    /// Interval at which `run_with_lock` refreshes the lock while `work` runs.
    pub update_interval: Duration,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            expiry: Duration::from_secs(60),
            timeout: Duration::from_secs(30),
            retry_delay: Duration::from_secs(2),
            update_interval: Duration::from_secs(15),
        }
    }
}

/// Mirrors the `lock_*` configuration keys an orchestrator TOML file carries.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct LockSettings {
    pub lock_expiration: u64,
    pub lock_acquire_timeout: u64,
    pub lock_acquire_delay: u64,
    pub lock_update_interval: u64,
}

impl Default for LockSettings {
    fn default() -> Self {
        let d = LockConfig::default();
        Self {
            lock_expiration: d.expiry.as_secs(),
            lock_acquire_timeout: d.timeout.as_secs(),
            lock_acquire_delay: d.retry_delay.as_secs(),
            lock_update_interval: d.update_interval.as_secs(),
        }
    }
}

impl From<LockSettings> for LockConfig {
    fn from(s: LockSettings) -> Self {
        Self {
            expiry: Duration::from_secs(s.lock_expiration),
            timeout: Duration::from_secs(s.lock_acquire_timeout),
            retry_delay: Duration::from_secs(s.lock_acquire_delay),
            update_interval: Duration::from_secs(s.lock_update_interval),
        }
    }
}
