use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, NaiveDateTime, Utc};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::cluster::{ClusterApi, ClusterObject, GROUP, KIND, NAMESPACE, PLURAL, SINGULAR, VERSION, object_name};
use crate::config::LockConfig;
use crate::error::{ClusterApiError, LockError};

const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";
const LAST_UPDATED_KEY: &str = "lastUpdated";
const REQUEST_ID_KEY: &str = "requestId";

fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

/// Age of `lastUpdated` relative to now. Missing or unparseable timestamps are
/// treated as infinitely old, per the spec's force-expiry rule: a lock object that
/// cannot prove it is fresh is eligible for expiry.
///
/// The format's trailing `Z` is a literal, not a `%z`/`%:z` offset field, so this
/// is a naive (offset-free, implicitly UTC) parse, not a `DateTime<FixedOffset>`
/// one — the latter requires an actual offset in the input and would reject every
/// timestamp `format_timestamp` itself writes.
fn lock_age(object: &ClusterObject) -> Duration {
    match object.data.get(LAST_UPDATED_KEY) {
        Some(raw) => match NaiveDateTime::parse_from_str(raw, TIMESTAMP_FORMAT) {
            Ok(parsed) => (Utc::now() - parsed.and_utc())
                .to_std()
                .unwrap_or(Duration::ZERO),
            Err(_) => Duration::MAX,
        },
        None => Duration::MAX,
    }
}

/// Acquires and refreshes a single named lock against a [`ClusterApi`].
///
/// Generic over the collaborator rather than holding a process-wide client, per
/// the divergence from source noted for global cluster-client state.
pub struct LockCoordinator<C: ClusterApi> {
    cluster: Arc<C>,
    config: LockConfig,
}

impl<C: ClusterApi> LockCoordinator<C> {
    pub fn new(cluster: Arc<C>, config: LockConfig) -> Self {
        Self { cluster, config }
    }

    /// Acquires exclusive ownership of the named lock, retrying until `config.timeout`
    /// elapses. `user_data` is merged into the lock object's `data` map.
    #[instrument(skip(self, user_data), fields(%name))]
    pub async fn acquire(
        &self,
        name: &str,
        user_data: HashMap<String, String>,
    ) -> Result<LockHandle<C>, LockError> {
        let start = Instant::now();
        let persisted_name = object_name(name);
        let request_id = Uuid::new_v4().to_string();

        loop {
            let mut data = user_data.clone();
            data.insert(LAST_UPDATED_KEY.to_string(), format_timestamp(Utc::now()));
            data.insert(REQUEST_ID_KEY.to_string(), request_id.clone());
            let body = ClusterObject {
                name: persisted_name.clone(),
                data,
                ..Default::default()
            };

            match self
                .cluster
                .create_custom_resource(GROUP, VERSION, NAMESPACE, PLURAL, body)
                .await
            {
                Ok(created) => {
                    info!("lock acquired");
                    return Ok(LockHandle {
                        cluster: Arc::clone(&self.cluster),
                        name: name.to_string(),
                        persisted_name,
                        uid: created.uid,
                        resource_version: created.resource_version,
                        data: created.data,
                        config: self.config,
                    });
                }
                Err(ClusterApiError::NotFound) => {
                    self.ensure_crd_installed().await?;
                    continue;
                }
                Err(ClusterApiError::Conflict) => {
                    let existing = self
                        .cluster
                        .read_custom_resource(GROUP, VERSION, NAMESPACE, PLURAL, &persisted_name)
                        .await;
                    match existing {
                        Ok(existing) if existing.data.get(REQUEST_ID_KEY) == Some(&request_id) => {
                            // A prior attempt's create actually landed; this is an
                            // idempotent re-acquire of our own lock.
                            info!("lock acquired (idempotent re-acquire)");
                            return Ok(LockHandle {
                                cluster: Arc::clone(&self.cluster),
                                name: name.to_string(),
                                persisted_name,
                                uid: existing.uid,
                                resource_version: existing.resource_version,
                                data: existing.data,
                                config: self.config,
                            });
                        }
                        Ok(existing) if lock_age(&existing) > self.config.expiry => {
                            warn!(age = ?lock_age(&existing), "force-expiring stale lock");
                            match self
                                .cluster
                                .delete_custom_resource(GROUP, VERSION, NAMESPACE, PLURAL, &persisted_name)
                                .await
                            {
                                Ok(()) => continue,
                                Err(ClusterApiError::NotFound) => continue,
                                Err(e) => return Err(e.into()),
                            }
                        }
                        Ok(_) => {
                            // Live holder; fall through to the timeout/sleep check below.
                        }
                        Err(ClusterApiError::NotFound) => {
                            // Lock vanished between the conflict and our read; retry immediately.
                            continue;
                        }
                        Err(e) => return Err(e.into()),
                    }
                }
                Err(e) => return Err(LockError::Fatal(e.to_string())),
            }

            let elapsed = start.elapsed();
            if elapsed >= self.config.timeout {
                return Err(LockError::Timeout { name: name.to_string(), elapsed });
            }
            tokio::time::sleep(self.config.retry_delay).await;
        }
    }

    /// Acquires the lock, runs `work` to completion on a parallel task while
    /// heartbeating from the caller task, then releases. Usurpation during the
    /// heartbeat cancels `work` and fails with `LockError::Usurped` rather than
    /// returning its (possibly-unsafe) result.
    #[instrument(skip(self, user_data, work), fields(%name))]
    pub async fn run_with_lock<F, Fut, T>(
        &self,
        name: &str,
        user_data: HashMap<String, String>,
        work: F,
    ) -> Result<T, LockError>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: std::future::Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let mut handle = self.acquire(name, user_data).await?;

        let mut join_handle = tokio::spawn(work());
        let mut ticker = tokio::time::interval(Duration::from_secs(1));
        let mut last_heartbeat = Instant::now();

        let join_result = loop {
            tokio::select! {
                result = &mut join_handle => {
                    break result;
                }
                _ = ticker.tick() => {
                    if last_heartbeat.elapsed() >= handle.config.update_interval {
                        if let Err(err) = handle.heartbeat().await {
                            warn!(error = %err, "heartbeat failed, cancelling work");
                            join_handle.abort();
                            // Do not release: a usurping contender now owns this
                            // persisted object and deleting it would break that
                            // contender's exclusion, not just ours.
                            return Err(err);
                        }
                        last_heartbeat = Instant::now();
                    }
                }
            }
        };

        // Release on every exit path here, including `work` failing: only the
        // usurpation path above deliberately skips it, since by then the
        // persisted object belongs to another contender.
        match join_result {
            Ok(value) => {
                handle.release().await?;
                Ok(value)
            }
            Err(err) => {
                handle.release().await?;
                Err(LockError::Fatal(format!("work task failed: {err}")))
            }
        }
    }

    #[instrument(skip(self))]
    async fn ensure_crd_installed(&self) -> Result<(), LockError> {
        match self
            .cluster
            .create_custom_resource_definition(GROUP, VERSION, PLURAL, SINGULAR, KIND)
            .await
        {
            Ok(()) | Err(ClusterApiError::Conflict) | Err(ClusterApiError::ValidationQuirk) => Ok(()),
            Err(e) => Err(LockError::Fatal(e.to_string())),
        }
    }
}

/// A live handle on an acquired lock.
pub struct LockHandle<C: ClusterApi> {
    cluster: Arc<C>,
    name: String,
    persisted_name: String,
    uid: String,
    resource_version: String,
    data: HashMap<String, String>,
    config: LockConfig,
}

impl<C: ClusterApi> LockHandle<C> {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn uid(&self) -> &str {
        &self.uid
    }

    /// Refreshes `lastUpdated`, supplying the current `resourceVersion` for
    /// optimistic concurrency. A `Conflict` or `NotFound` response means another
    /// contender has force-expired and replaced this lock: fatal, not transient.
    #[instrument(skip(self), fields(name = %self.name))]
    pub async fn heartbeat(&mut self) -> Result<(), LockError> {
        let mut data = self.data.clone();
        data.insert(LAST_UPDATED_KEY.to_string(), format_timestamp(Utc::now()));
        let body = ClusterObject {
            name: self.persisted_name.clone(),
            uid: self.uid.clone(),
            resource_version: self.resource_version.clone(),
            data: data.clone(),
        };

        match self
            .cluster
            .replace_custom_resource(GROUP, VERSION, NAMESPACE, PLURAL, &self.persisted_name, body)
            .await
        {
            Ok(updated) => {
                self.resource_version = updated.resource_version;
                self.data = data;
                Ok(())
            }
            Err(ClusterApiError::Conflict) | Err(ClusterApiError::NotFound) => {
                Err(LockError::Usurped { name: self.name.clone() })
            }
            Err(e) => Err(LockError::Fatal(e.to_string())),
        }
    }

    /// Best-effort, idempotent: a lock already gone (deleted or expired and
    /// reclaimed) is treated as successfully released.
    #[instrument(skip(self), fields(name = %self.name))]
    pub async fn release(&self) -> Result<(), LockError> {
        match self
            .cluster
            .delete_custom_resource(GROUP, VERSION, NAMESPACE, PLURAL, &self.persisted_name)
            .await
        {
            Ok(()) | Err(ClusterApiError::NotFound) => Ok(()),
            Err(e) => Err(LockError::Fatal(e.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::mock::MockClusterApi;

    fn config(timeout: Duration, expiry: Duration, retry_delay: Duration) -> LockConfig {
        LockConfig {
            expiry,
            timeout,
            retry_delay,
            update_interval: Duration::from_millis(500),
        }
    }

    fn config_with_update_interval(
        timeout: Duration,
        expiry: Duration,
        retry_delay: Duration,
        update_interval: Duration,
    ) -> LockConfig {
        LockConfig { expiry, timeout, retry_delay, update_interval }
    }

    fn stale_object(persisted_name: &str, age: Duration) -> ClusterObject {
        let mut data = HashMap::new();
        let stamp = Utc::now() - chrono::Duration::from_std(age).unwrap();
        data.insert(LAST_UPDATED_KEY.to_string(), format_timestamp(stamp));
        ClusterObject {
            name: persisted_name.to_string(),
            uid: "pre-existing".to_string(),
            resource_version: "1".to_string(),
            data,
        }
    }

    // S1 — fresh acquire on an empty cluster succeeds immediately and release leaves
    // no trace.
    #[tokio::test]
    async fn s1_fresh_acquire_then_release() {
        let cluster = Arc::new(MockClusterApi::new());
        cluster.crd_installed_for_test();
        let coordinator = LockCoordinator::new(Arc::clone(&cluster), config(
            Duration::from_secs(30),
            Duration::from_secs(60),
            Duration::from_millis(50),
        ));

        let handle = coordinator.acquire("build", HashMap::new()).await.unwrap();
        assert!(cluster.contains(&object_name("build")));

        handle.release().await.unwrap();
        assert!(!cluster.contains(&object_name("build")));
    }

    // S2 — contended, holder alive: acquisition must fail with Timeout, and the
    // pre-existing lock is left untouched.
    #[tokio::test]
    async fn s2_contended_holder_alive_times_out() {
        let cluster = Arc::new(MockClusterApi::new());
        cluster.crd_installed_for_test();
        let persisted = object_name("build");
        cluster.seed(stale_object(&persisted, Duration::from_secs(10)));

        let coordinator = LockCoordinator::new(Arc::clone(&cluster), config(
            Duration::from_secs(1),
            Duration::from_secs(60),
            Duration::from_millis(100),
        ));

        let result = coordinator.acquire("build", HashMap::new()).await;
        assert!(matches!(result, Err(LockError::Timeout { .. })));
        assert!(cluster.contains(&persisted));
    }

    // S3 — expired takeover: a lock older than `expiry` is force-deleted and
    // reacquired with a fresh uid.
    #[tokio::test]
    async fn s3_expired_lock_is_force_taken_over() {
        let cluster = Arc::new(MockClusterApi::new());
        cluster.crd_installed_for_test();
        let persisted = object_name("build");
        cluster.seed(stale_object(&persisted, Duration::from_secs(120)));

        let coordinator = LockCoordinator::new(Arc::clone(&cluster), config(
            Duration::from_secs(5),
            Duration::from_secs(60),
            Duration::from_millis(50),
        ));

        let handle = coordinator.acquire("build", HashMap::new()).await.unwrap();
        assert_ne!(handle.uid(), "pre-existing");
    }

    // S6 — run_with_lock heartbeats while work runs, and the lock is gone afterwards.
    #[tokio::test]
    async fn s6_run_with_lock_heartbeats_and_releases() {
        let cluster = Arc::new(MockClusterApi::new());
        cluster.crd_installed_for_test();
        let coordinator = LockCoordinator::new(Arc::clone(&cluster), config_with_update_interval(
            Duration::from_secs(5),
            Duration::from_secs(30),
            Duration::from_millis(50),
            Duration::from_millis(20),
        ));

        let persisted = object_name("build");
        let result = coordinator
            .run_with_lock("build", HashMap::new(), move || async move {
                tokio::time::sleep(Duration::from_millis(200)).await;
                42
            })
            .await
            .unwrap();

        assert_eq!(result, 42);
        assert!(!cluster.contains(&persisted));
    }

    // The heartbeat write path actually advances `lastUpdated`, not just "no error
    // was returned" — a regression that stopped writing updates but kept returning
    // Ok would slip past a weaker assertion. This is what S6's heartbeat-liveness
    // property (spec §8.1) rests on.
    #[tokio::test]
    async fn heartbeat_advances_last_updated_timestamp() {
        let cluster = Arc::new(MockClusterApi::new());
        cluster.crd_installed_for_test();
        let coordinator = LockCoordinator::new(Arc::clone(&cluster), config_with_update_interval(
            Duration::from_secs(5),
            Duration::from_secs(30),
            Duration::from_millis(50),
            Duration::from_millis(20),
        ));

        let mut handle = coordinator.acquire("build", HashMap::new()).await.unwrap();
        let first = handle.data.get(LAST_UPDATED_KEY).cloned();

        tokio::time::sleep(Duration::from_millis(30)).await;
        handle.heartbeat().await.unwrap();
        let second = handle.data.get(LAST_UPDATED_KEY).cloned();

        assert!(first.is_some());
        assert_ne!(first, second);

        handle.release().await.unwrap();
    }

    #[tokio::test]
    async fn heartbeat_failure_after_usurpation_is_fatal() {
        let cluster = Arc::new(MockClusterApi::new());
        cluster.crd_installed_for_test();
        let coordinator = LockCoordinator::new(Arc::clone(&cluster), config(
            Duration::from_secs(5),
            Duration::from_secs(60),
            Duration::from_millis(50),
        ));

        let mut handle = coordinator.acquire("build", HashMap::new()).await.unwrap();
        // Simulate a usurping contender: delete then re-create under a new uid.
        let persisted = object_name("build");
        cluster.force_remove_for_test(&persisted);
        cluster.seed(stale_object(&persisted, Duration::from_secs(0)));

        let result = handle.heartbeat().await;
        assert!(matches!(result, Err(LockError::Usurped { .. })));
    }
}
