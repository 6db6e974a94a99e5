//! Conformance test helpers for [`ClusterApi`] implementations, and the
//! `LockCoordinator` scenario suite run against them.
//!
//! Call [`run_lock_conformance_tests`] from a backend's own test module with a
//! fresh, empty [`ClusterApi`] instance.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::cluster::ClusterApi;
use crate::config::LockConfig;
use crate::coordinator::LockCoordinator;
use crate::error::LockError;

fn fast_config() -> LockConfig {
    LockConfig {
        expiry: Duration::from_secs(60),
        timeout: Duration::from_secs(5),
        retry_delay: Duration::from_millis(100),
        update_interval: Duration::from_secs(2),
    }
}

/// Runs the full lock acquisition/release/contention suite against `cluster`.
///
/// # Errors
///
/// Returns an error (really, panics via an assertion) if any conformance check fails.
pub async fn run_lock_conformance_tests<C: ClusterApi>(cluster: Arc<C>) {
    test_fresh_acquire_and_release(Arc::clone(&cluster)).await;
    test_contended_acquire_times_out(Arc::clone(&cluster)).await;
    test_idempotent_release(cluster).await;
}

async fn test_fresh_acquire_and_release<C: ClusterApi>(cluster: Arc<C>) {
    let coordinator = LockCoordinator::new(cluster, fast_config());
    let handle = coordinator
        .acquire("conformance-fresh", HashMap::new())
        .await
        .expect("uncontested lock should be acquired");
    handle.release().await.expect("release should succeed");
}

async fn test_contended_acquire_times_out<C: ClusterApi>(cluster: Arc<C>) {
    let coordinator = LockCoordinator::new(Arc::clone(&cluster), fast_config());
    let holder = coordinator
        .acquire("conformance-contended", HashMap::new())
        .await
        .expect("first acquire should succeed");

    let result = coordinator.acquire("conformance-contended", HashMap::new()).await;
    assert!(
        matches!(result, Err(LockError::Timeout { .. })),
        "second acquire while held should time out, got {result:?}"
    );

    holder.release().await.expect("release should succeed");
}

async fn test_idempotent_release<C: ClusterApi>(cluster: Arc<C>) {
    let coordinator = LockCoordinator::new(cluster, fast_config());
    let handle = coordinator
        .acquire("conformance-idempotent", HashMap::new())
        .await
        .expect("acquire should succeed");
    handle.release().await.expect("first release should succeed");
    handle.release().await.expect("second release of an absent lock should still succeed");
}
