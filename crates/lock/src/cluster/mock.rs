//! An in-memory `ClusterApi` for unit tests of the acquisition and heartbeat
//! state machine, without standing up a real cluster.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use uuid::Uuid;

use super::{ClusterApi, ClusterObject};
use crate::error::ClusterApiError;

#[derive(Debug, Default)]
struct Inner {
    crd_installed: bool,
    objects: HashMap<String, ClusterObject>,
    resource_version_counter: u64,
}

/// An in-memory stand-in cluster, keyed by `(group, version, namespace, plural, name)`
/// collapsed to `name` since this crate only ever targets a single fixed CRD kind.
#[derive(Debug, Default)]
pub struct MockClusterApi {
    inner: Mutex<Inner>,
}

impl MockClusterApi {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-seed a lock object, bypassing `create`, to set up contention scenarios.
    pub fn seed(&self, object: ClusterObject) {
        let mut inner = self.inner.lock().expect("mock cluster mutex poisoned");
        inner.crd_installed = true;
        inner.objects.insert(object.name.clone(), object);
    }

    pub fn contains(&self, name: &str) -> bool {
        let inner = self.inner.lock().expect("mock cluster mutex poisoned");
        inner.objects.contains_key(name)
    }

    /// Marks the CRD as already installed, so acquisition tests don't need to
    /// exercise the auto-install path unless that's specifically what's under test.
    pub fn crd_installed_for_test(&self) {
        let mut inner = self.inner.lock().expect("mock cluster mutex poisoned");
        inner.crd_installed = true;
    }

    /// Removes an object without going through `delete_custom_resource`, to set up
    /// usurpation scenarios (another contender force-expired and replaced it).
    pub fn force_remove_for_test(&self, name: &str) {
        let mut inner = self.inner.lock().expect("mock cluster mutex poisoned");
        inner.objects.remove(name);
    }

    fn next_resource_version(inner: &mut Inner) -> String {
        inner.resource_version_counter += 1;
        inner.resource_version_counter.to_string()
    }
}

#[async_trait]
impl ClusterApi for MockClusterApi {
    async fn create_custom_resource(
        &self,
        _group: &str,
        _version: &str,
        _namespace: &str,
        _plural: &str,
        mut body: ClusterObject,
    ) -> Result<ClusterObject, ClusterApiError> {
        let mut inner = self.inner.lock().expect("mock cluster mutex poisoned");
        if !inner.crd_installed {
            return Err(ClusterApiError::NotFound);
        }
        if inner.objects.contains_key(&body.name) {
            return Err(ClusterApiError::Conflict);
        }
        body.uid = Uuid::new_v4().to_string();
        body.resource_version = Self::next_resource_version(&mut inner);
        inner.objects.insert(body.name.clone(), body.clone());
        Ok(body)
    }

    async fn read_custom_resource(
        &self,
        _group: &str,
        _version: &str,
        _namespace: &str,
        _plural: &str,
        name: &str,
    ) -> Result<ClusterObject, ClusterApiError> {
        let inner = self.inner.lock().expect("mock cluster mutex poisoned");
        inner.objects.get(name).cloned().ok_or(ClusterApiError::NotFound)
    }

    async fn replace_custom_resource(
        &self,
        _group: &str,
        _version: &str,
        _namespace: &str,
        _plural: &str,
        name: &str,
        mut body: ClusterObject,
    ) -> Result<ClusterObject, ClusterApiError> {
        let mut inner = self.inner.lock().expect("mock cluster mutex poisoned");
        let Some(existing) = inner.objects.get(name) else {
            return Err(ClusterApiError::NotFound);
        };
        if existing.resource_version != body.resource_version {
            return Err(ClusterApiError::Conflict);
        }
        body.uid = existing.uid.clone();
        body.resource_version = Self::next_resource_version(&mut inner);
        inner.objects.insert(name.to_string(), body.clone());
        Ok(body)
    }

    async fn delete_custom_resource(
        &self,
        _group: &str,
        _version: &str,
        _namespace: &str,
        _plural: &str,
        name: &str,
    ) -> Result<(), ClusterApiError> {
        let mut inner = self.inner.lock().expect("mock cluster mutex poisoned");
        match inner.objects.remove(name) {
            Some(_) => Ok(()),
            None => Err(ClusterApiError::NotFound),
        }
    }

    async fn create_custom_resource_definition(
        &self,
        _group: &str,
        _version: &str,
        _plural: &str,
        _singular: &str,
        _kind: &str,
    ) -> Result<(), ClusterApiError> {
        let mut inner = self.inner.lock().expect("mock cluster mutex poisoned");
        if inner.crd_installed {
            return Err(ClusterApiError::Conflict);
        }
        inner.crd_installed = true;
        Ok(())
    }
}
