//! Reconciliation operations
//!
//! Every operation re-reads the instance's ScaledObject, applies its change to
//! the fetched copy and writes it back conditionally on the fetched resource
//! version. Conflicts, timeouts and outages restart the whole cycle, up to
//! `max_write_attempts` times.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use autoscale_models::{Instance, InstanceStatusReport, Trigger, TriggerSet};
use kube::ResourceExt;

use crate::crd::ScaledObject;
use crate::error::ReconcileError;
use crate::mapper::{self, UpsertOutcome};
use crate::names;
use crate::store::{ScaledObjectStore, StoreError};
use crate::types::{
    CreateInstanceArgs, DeleteTriggerArgs, GetTriggerArgs, ListTriggersArgs, UpdateInstanceArgs,
    UpsertTriggerArgs,
};

#[derive(Debug, Clone)]
pub struct ReconcilerConfig {
    /// Deadline applied to each remote call
    pub operation_timeout: Duration,
    /// Attempts per operation, first try included
    pub max_write_attempts: u32,
    /// Base delay between attempts, multiplied by the attempt number
    pub retry_backoff: Duration,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            operation_timeout: Duration::from_secs(30),
            max_write_attempts: 3,
            retry_backoff: Duration::from_millis(100),
        }
    }
}

/// Result of an `apply` step in a read-modify-write cycle
enum Change<T> {
    Write(T),
    Skip(T),
}

#[derive(Clone)]
pub struct Reconciler {
    store: Arc<dyn ScaledObjectStore>,
    config: ReconcilerConfig,
}

impl Reconciler {
    pub fn new(store: Arc<dyn ScaledObjectStore>, config: ReconcilerConfig) -> Self {
        Self { store, config }
    }

    pub fn config(&self) -> &ReconcilerConfig {
        &self.config
    }

    /// Same reconciler with a different per-call deadline
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        let mut config = self.config.clone();
        config.operation_timeout = timeout;
        Self {
            store: self.store.clone(),
            config,
        }
    }

    // ========================================================================
    // Instances
    // ========================================================================

    pub async fn create_instance(&self, args: CreateInstanceArgs) -> Result<Instance, ReconcileError> {
        validate_instance(&args.name)?;
        validate_replicas(args.min_replicas, args.max_replicas)?;
        let app_name = match args.app_name.as_deref().map(str::trim) {
            Some("") => {
                return Err(ReconcileError::InvalidArgument(
                    "app name must not be empty".to_string(),
                ))
            }
            Some(app) => app.to_string(),
            None => args.name.clone(),
        };

        let object =
            mapper::new_scaled_object(&args.name, &app_name, args.min_replicas, args.max_replicas);
        // not retried: a create that timed out may have been applied
        let created = self
            .call("create", &args.name, self.store.create(&object))
            .await?;

        tracing::info!(
            instance = %args.name,
            object = %created.name_any(),
            app = %app_name,
            "Instance created"
        );
        Ok(mapper::decode_instance(&created))
    }

    pub async fn delete_instance(&self, name: &str) -> Result<(), ReconcileError> {
        validate_instance(name)?;
        let object_name = names::scaled_object_name(name);
        let object_name = object_name.as_str();
        let sent = AtomicBool::new(false);
        let sent = &sent;

        self.retrying("delete instance", name, move || async move {
            let result = async {
                let current = self.fetch(name).await?;
                sent.store(true, Ordering::SeqCst);
                self.call(
                    "delete",
                    name,
                    self.store.delete(object_name, current.resource_version()),
                )
                .await
            }
            .await;
            match result {
                // an earlier attempt's delete landed but its reply was lost
                Err(ReconcileError::InstanceNotFound(_)) if sent.load(Ordering::SeqCst) => {
                    tracing::debug!(instance = %name, "Instance already gone after retry");
                    Ok(())
                }
                other => other,
            }
        })
        .await?;

        tracing::info!(instance = %name, "Instance deleted");
        Ok(())
    }

    pub async fn get_instance(&self, name: &str) -> Result<Instance, ReconcileError> {
        validate_instance(name)?;
        let object = self.read(name).await?;
        Ok(mapper::decode_instance(&object))
    }

    pub async fn get_instance_status(&self, name: &str) -> Result<InstanceStatusReport, ReconcileError> {
        validate_instance(name)?;
        let object = self.read(name).await?;
        let (status, message) = mapper::derive_status(&object);
        tracing::debug!(instance = %name, %status, "Instance status derived");
        Ok(InstanceStatusReport {
            instance: name.to_string(),
            status,
            message,
        })
    }

    pub async fn update_instance(&self, args: UpdateInstanceArgs) -> Result<Instance, ReconcileError> {
        validate_instance(&args.name)?;
        if matches!(args.app_name.as_deref().map(str::trim), Some("")) {
            return Err(ReconcileError::InvalidArgument(
                "app name must not be empty".to_string(),
            ));
        }

        let apply = |object: &mut ScaledObject| -> Result<Change<Instance>, ReconcileError> {
            let min = args.min_replicas.or(object.spec.min_replica_count);
            let max = args.max_replicas.or(object.spec.max_replica_count);
            validate_replicas(min, max)?;

            let before = object.spec.clone();
            if let Some(app) = &args.app_name {
                object.spec.scale_target_ref.name = app.trim().to_string();
            }
            object.spec.min_replica_count = min;
            object.spec.max_replica_count = max;

            let instance = mapper::decode_instance(object);
            Ok(if object.spec == before {
                Change::Skip(instance)
            } else {
                Change::Write(instance)
            })
        };

        let instance = self.modify("update instance", &args.name, &apply).await?;
        tracing::info!(instance = %args.name, "Instance updated");
        Ok(instance)
    }

    // ========================================================================
    // Triggers
    // ========================================================================

    pub async fn list_triggers(&self, args: ListTriggersArgs) -> Result<TriggerSet, ReconcileError> {
        validate_instance(&args.instance)?;
        let object = self.read(&args.instance).await?;
        let triggers = mapper::decode_triggers(&object.spec.triggers);
        tracing::debug!(instance = %args.instance, count = triggers.len(), "Listed triggers");
        Ok(triggers)
    }

    pub async fn get_trigger(&self, args: GetTriggerArgs) -> Result<Trigger, ReconcileError> {
        validate_instance(&args.instance)?;
        let object = self.read(&args.instance).await?;
        mapper::find_trigger(&object.spec, &args.name).ok_or_else(|| {
            ReconcileError::TriggerNotFound {
                instance: args.instance.clone(),
                trigger: args.name.clone(),
            }
        })
    }

    /// Create or replace a trigger by name
    pub async fn upsert_trigger(&self, args: UpsertTriggerArgs) -> Result<UpsertOutcome, ReconcileError> {
        validate_instance(&args.instance)?;
        let trigger = validate_trigger(args.trigger())?;

        let apply = |object: &mut ScaledObject| -> Result<Change<UpsertOutcome>, ReconcileError> {
            Ok(match mapper::upsert_trigger(&mut object.spec, &trigger) {
                UpsertOutcome::Unchanged => Change::Skip(UpsertOutcome::Unchanged),
                outcome => Change::Write(outcome),
            })
        };

        let outcome = self.modify("upsert trigger", &args.instance, &apply).await?;
        tracing::info!(
            instance = %args.instance,
            trigger = %trigger.name,
            kind = %trigger.kind,
            ?outcome,
            "Trigger upserted"
        );
        Ok(outcome)
    }

    /// Remove a trigger; a missing trigger is an error
    pub async fn delete_trigger(&self, args: DeleteTriggerArgs) -> Result<Trigger, ReconcileError> {
        validate_instance(&args.instance)?;

        // trigger removed by an earlier attempt whose write may have landed
        let removed: Mutex<Option<Trigger>> = Mutex::new(None);
        let apply = |object: &mut ScaledObject| -> Result<Change<Trigger>, ReconcileError> {
            let mut removed = removed.lock().unwrap_or_else(|e| e.into_inner());
            match mapper::remove_trigger(&mut object.spec, &args.name) {
                Some(trigger) => {
                    *removed = Some(trigger.clone());
                    Ok(Change::Write(trigger))
                }
                None => removed.clone().map(Change::Skip).ok_or_else(|| {
                    ReconcileError::TriggerNotFound {
                        instance: args.instance.clone(),
                        trigger: args.name.clone(),
                    }
                }),
            }
        };

        let removed = self.modify("delete trigger", &args.instance, &apply).await?;
        tracing::info!(instance = %args.instance, trigger = %args.name, "Trigger deleted");
        Ok(removed)
    }

    // ========================================================================
    // Remote calls
    // ========================================================================

    /// Run one store call under the operation deadline
    async fn call<T>(
        &self,
        operation: &'static str,
        instance: &str,
        fut: impl Future<Output = Result<T, StoreError>>,
    ) -> Result<T, ReconcileError> {
        match tokio::time::timeout(self.config.operation_timeout, fut).await {
            Ok(result) => result.map_err(|e| ReconcileError::from_store(instance, e)),
            Err(_) => Err(ReconcileError::Timeout {
                operation,
                after: self.config.operation_timeout,
            }),
        }
    }

    async fn fetch(&self, instance: &str) -> Result<ScaledObject, ReconcileError> {
        let object_name = names::scaled_object_name(instance);
        self.call("get", instance, self.store.get(&object_name))
            .await?
            .ok_or_else(|| ReconcileError::InstanceNotFound(instance.to_string()))
    }

    /// Fetch with transient failures retried
    async fn read(&self, instance: &str) -> Result<ScaledObject, ReconcileError> {
        self.retrying("read instance", instance, move || self.fetch(instance))
            .await
    }

    async fn modify<T, F>(
        &self,
        operation: &'static str,
        instance: &str,
        apply: &F,
    ) -> Result<T, ReconcileError>
    where
        F: Fn(&mut ScaledObject) -> Result<Change<T>, ReconcileError>,
    {
        self.retrying(operation, instance, move || async move {
            let mut object = self.fetch(instance).await?;
            match apply(&mut object)? {
                Change::Skip(value) => {
                    tracing::debug!(instance = %instance, operation, "No change, skipping write");
                    Ok(value)
                }
                Change::Write(value) => {
                    self.call(operation, instance, self.store.replace(&object))
                        .await?;
                    Ok(value)
                }
            }
        })
        .await
    }

    async fn retrying<T, F, Fut>(
        &self,
        operation: &'static str,
        instance: &str,
        mut attempt_fn: F,
    ) -> Result<T, ReconcileError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ReconcileError>>,
    {
        let max_attempts = self.config.max_write_attempts.max(1);
        let mut attempt = 0;
        loop {
            attempt += 1;
            match attempt_fn().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() && attempt < max_attempts => {
                    tracing::warn!(
                        instance = %instance,
                        operation,
                        attempt,
                        error = %e,
                        "Transient failure, retrying"
                    );
                    tokio::time::sleep(self.config.retry_backoff * attempt).await;
                }
                Err(ReconcileError::Conflict { .. }) => {
                    return Err(ReconcileError::Conflict {
                        instance: instance.to_string(),
                        attempts: attempt,
                    })
                }
                Err(e) => return Err(e),
            }
        }
    }
}

fn validate_instance(name: &str) -> Result<(), ReconcileError> {
    names::validate_instance_name(name).map_err(ReconcileError::InvalidArgument)
}

fn validate_trigger(trigger: Trigger) -> Result<Trigger, ReconcileError> {
    if trigger.name.trim().is_empty() {
        return Err(ReconcileError::InvalidArgument(
            "trigger name is required".to_string(),
        ));
    }
    if trigger.kind.trim().is_empty() {
        return Err(ReconcileError::InvalidArgument(format!(
            "trigger {:?} needs a type",
            trigger.name
        )));
    }
    Ok(trigger)
}

fn validate_replicas(min: Option<i32>, max: Option<i32>) -> Result<(), ReconcileError> {
    if min.is_some_and(|m| m < 0) || max.is_some_and(|m| m < 0) {
        return Err(ReconcileError::InvalidArgument(
            "replica counts must not be negative".to_string(),
        ));
    }
    if let (Some(min), Some(max)) = (min, max) {
        if min > max {
            return Err(ReconcileError::InvalidArgument(format!(
                "min replicas ({}) is greater than max replicas ({})",
                min, max
            )));
        }
    }
    Ok(())
}
