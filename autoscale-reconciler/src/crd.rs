//! ScaledObject custom resource, as served by the scaler controller
//!
//! Only the fields this service reads or writes are modeled. Everything else
//! lands in the flattened `extra` maps so a read-modify-write cycle sends back
//! exactly what it fetched.

use kube::CustomResource;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

pub const CONDITION_READY: &str = "Ready";
pub const CONDITION_FALLBACK: &str = "Fallback";

#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, PartialEq)]
#[kube(
    group = "keda.sh",
    version = "v1alpha1",
    kind = "ScaledObject",
    plural = "scaledobjects",
    namespaced,
    status = "ScaledObjectStatus",
    derive = "PartialEq",
    schema = "disabled"
)]
#[serde(rename_all = "camelCase")]
pub struct ScaledObjectSpec {
    pub scale_target_ref: ScaleTargetRef,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_replica_count: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_replica_count: Option<i32>,
    #[serde(default)]
    pub triggers: Vec<ScaleTriggerSpec>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct ScaleTargetRef {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_version: Option<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

/// One entry of `spec.triggers`
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Default)]
pub struct ScaleTriggerSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(rename = "type")]
    pub type_: String,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
    /// authenticationRef, metricType, useCachedMetrics, ...
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Default)]
pub struct ScaledObjectStatus {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<ScaledObjectCondition>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ScaledObjectCondition {
    #[serde(rename = "type")]
    pub type_: String,
    /// "True", "False" or "Unknown"
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ScaledObjectStatus {
    pub fn condition(&self, type_: &str) -> Option<&ScaledObjectCondition> {
        self.conditions.iter().find(|c| c.type_ == type_)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> Value {
        json!({
            "apiVersion": "keda.sh/v1alpha1",
            "kind": "ScaledObject",
            "metadata": {"name": "web1-scaledobject-config", "namespace": "apps", "resourceVersion": "42"},
            "spec": {
                "scaleTargetRef": {"name": "web1", "envSourceContainerName": "app"},
                "pollingInterval": 30,
                "advanced": {"restoreToOriginalReplicaCount": true},
                "maxReplicaCount": 10,
                "triggers": [{
                    "name": "prom",
                    "type": "prometheus",
                    "metadata": {"threshold": "100.50"},
                    "authenticationRef": {"name": "prom-auth"}
                }]
            },
            "status": {
                "conditions": [{"type": "Ready", "status": "True", "reason": "ScaledObjectReady"}],
                "originalReplicaCount": 2
            }
        })
    }

    #[test]
    fn test_unmodeled_fields_survive_round_trip() {
        let so: ScaledObject = serde_json::from_value(sample()).unwrap();

        assert_eq!(so.spec.max_replica_count, Some(10));
        assert_eq!(so.spec.extra["pollingInterval"], json!(30));
        assert_eq!(so.spec.scale_target_ref.extra["envSourceContainerName"], json!("app"));
        assert_eq!(so.spec.triggers[0].extra["authenticationRef"], json!({"name": "prom-auth"}));

        let back = serde_json::to_value(&so).unwrap();
        assert_eq!(back["spec"], sample()["spec"]);
        assert_eq!(back["status"], sample()["status"]);
    }

    #[test]
    fn test_condition_lookup() {
        let so: ScaledObject = serde_json::from_value(sample()).unwrap();
        let status = so.status.unwrap();
        assert_eq!(status.condition(CONDITION_READY).unwrap().status, "True");
        assert!(status.condition(CONDITION_FALLBACK).is_none());
    }
}
