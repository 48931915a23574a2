//! In-memory [`ScaledObjectStore`] for tests and local runs
//!
//! Behaves like the API server for the parts reconciliation depends on:
//! resource versions bump on every write, conditional writes conflict on a
//! stale version, and `replace` never touches the status. Hooks allow tests to
//! inject conflicts, latency and outages.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use kube::ResourceExt;

use crate::crd::{ScaledObject, ScaledObjectStatus};
use crate::store::{ScaledObjectStore, StoreError};

#[derive(Default)]
pub struct InMemoryStore {
    objects: Mutex<BTreeMap<String, ScaledObject>>,
    version: AtomicU64,
    pending_conflicts: AtomicU32,
    latency_ms: AtomicU64,
    unavailable: AtomicBool,
    writes: AtomicU64,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `n` replace or delete calls with a conflict, as if another writer got there first
    pub fn inject_conflicts(&self, n: u32) {
        self.pending_conflicts.store(n, Ordering::SeqCst);
    }

    /// Delay every call by `latency`
    pub fn set_latency(&self, latency: Duration) {
        self.latency_ms.store(latency.as_millis() as u64, Ordering::SeqCst);
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Write the status the way the scaler controller would, bumping the resource version
    pub fn set_status(&self, name: &str, status: ScaledObjectStatus) -> bool {
        let mut objects = self.lock();
        let Some(object) = objects.get_mut(name) else {
            return false;
        };
        object.status = Some(status);
        object.metadata.resource_version = Some(self.next_version());
        true
    }

    /// Mark an object as being deleted by the cluster (finalizers pending)
    pub fn mark_deleting(&self, name: &str) -> bool {
        let mut objects = self.lock();
        let Some(object) = objects.get_mut(name) else {
            return false;
        };
        object.metadata.deletion_timestamp = Some(Time(Utc::now()));
        object.metadata.resource_version = Some(self.next_version());
        true
    }

    /// Current stored copy, bypassing hooks
    pub fn snapshot(&self, name: &str) -> Option<ScaledObject> {
        self.lock().get(name).cloned()
    }

    /// Number of successful create/replace/delete calls
    pub fn write_count(&self) -> u64 {
        self.writes.load(Ordering::SeqCst)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, ScaledObject>> {
        // a panicking test thread must not hide the data from the others
        self.objects.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn next_version(&self) -> String {
        (self.version.fetch_add(1, Ordering::SeqCst) + 1).to_string()
    }

    async fn enter(&self) -> Result<(), StoreError> {
        let latency = self.latency_ms.load(Ordering::SeqCst);
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency)).await;
        } else {
            // let concurrent callers interleave between read and write
            tokio::task::yield_now().await;
        }
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("store is unavailable".to_string()));
        }
        Ok(())
    }

    fn take_conflict(&self) -> bool {
        self.pending_conflicts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl ScaledObjectStore for InMemoryStore {
    async fn get(&self, name: &str) -> Result<Option<ScaledObject>, StoreError> {
        self.enter().await?;
        Ok(self.lock().get(name).cloned())
    }

    async fn create(&self, object: &ScaledObject) -> Result<ScaledObject, StoreError> {
        self.enter().await?;
        let name = object.name_any();
        let mut objects = self.lock();
        if objects.contains_key(&name) {
            return Err(StoreError::AlreadyExists(name));
        }

        let mut stored = object.clone();
        stored.metadata.resource_version = Some(self.next_version());
        stored.metadata.generation = Some(1);
        stored.metadata.creation_timestamp = Some(Time(Utc::now()));
        stored.status = None;
        objects.insert(name, stored.clone());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(stored)
    }

    async fn replace(&self, object: &ScaledObject) -> Result<ScaledObject, StoreError> {
        self.enter().await?;
        let name = object.name_any();
        if self.take_conflict() {
            return Err(StoreError::Conflict(name));
        }

        let mut objects = self.lock();
        let Some(current) = objects.get(&name) else {
            return Err(StoreError::NotFound(name));
        };
        if let Some(expected) = &object.metadata.resource_version {
            if current.metadata.resource_version.as_ref() != Some(expected) {
                return Err(StoreError::Conflict(name));
            }
        }

        let mut stored = object.clone();
        stored.status = current.status.clone();
        stored.metadata.creation_timestamp = current.metadata.creation_timestamp.clone();
        stored.metadata.deletion_timestamp = current.metadata.deletion_timestamp.clone();
        stored.metadata.generation = Some(current.metadata.generation.unwrap_or(0) + 1);
        stored.metadata.resource_version = Some(self.next_version());
        objects.insert(name, stored.clone());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(stored)
    }

    async fn delete(&self, name: &str, resource_version: Option<String>) -> Result<(), StoreError> {
        self.enter().await?;
        if self.take_conflict() {
            return Err(StoreError::Conflict(name.to_string()));
        }
        let mut objects = self.lock();
        let Some(current) = objects.get(name) else {
            return Err(StoreError::NotFound(name.to_string()));
        };
        if let Some(expected) = resource_version {
            if current.metadata.resource_version.as_deref() != Some(expected.as_str()) {
                return Err(StoreError::Conflict(name.to_string()));
            }
        }
        objects.remove(name);
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::{ScaleTargetRef, ScaledObjectSpec};

    fn object(name: &str) -> ScaledObject {
        ScaledObject::new(
            name,
            ScaledObjectSpec {
                scale_target_ref: ScaleTargetRef {
                    name: "app".to_string(),
                    ..ScaleTargetRef::default()
                },
                min_replica_count: None,
                max_replica_count: None,
                triggers: vec![],
                extra: BTreeMap::new(),
            },
        )
    }

    #[tokio::test]
    async fn test_stale_replace_conflicts() {
        let store = InMemoryStore::new();
        let created = store.create(&object("a")).await.unwrap();

        let mut first = created.clone();
        first.spec.max_replica_count = Some(3);
        store.replace(&first).await.unwrap();

        let mut stale = created;
        stale.spec.max_replica_count = Some(5);
        assert_eq!(
            store.replace(&stale).await,
            Err(StoreError::Conflict("a".to_string()))
        );
    }

    #[tokio::test]
    async fn test_status_writes_bump_version_but_survive_replace() {
        let store = InMemoryStore::new();
        let created = store.create(&object("a")).await.unwrap();
        assert!(store.set_status("a", ScaledObjectStatus::default()));

        assert!(matches!(
            store.replace(&created).await,
            Err(StoreError::Conflict(_))
        ));

        let fresh = store.get("a").await.unwrap().unwrap();
        let replaced = store.replace(&fresh).await.unwrap();
        assert!(replaced.status.is_some());
    }

    #[tokio::test]
    async fn test_conditional_delete() {
        let store = InMemoryStore::new();
        store.create(&object("a")).await.unwrap();

        assert!(matches!(
            store.delete("a", Some("999".to_string())).await,
            Err(StoreError::Conflict(_))
        ));
        store.delete("a", None).await.unwrap();
        assert!(matches!(
            store.delete("a", None).await,
            Err(StoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_injected_conflicts_are_consumed() {
        let store = InMemoryStore::new();
        let created = store.create(&object("a")).await.unwrap();
        store.inject_conflicts(1);

        assert!(store.replace(&created).await.is_err());
        assert!(store.replace(&created).await.is_ok());
    }
}
