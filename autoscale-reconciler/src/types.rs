//! Input types for reconciliation operations

use autoscale_models::{
    CreateInstanceRequest, Trigger, TriggerMetadata, UpdateInstanceRequest, UpsertTriggerRequest,
};
use serde::{Deserialize, Serialize};

// ============================================================================
// Instances
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CreateInstanceArgs {
    /// Instance name
    pub name: String,
    /// Workload to scale (default: the instance name)
    pub app_name: Option<String>,
    pub min_replicas: Option<i32>,
    pub max_replicas: Option<i32>,
}

impl CreateInstanceArgs {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            app_name: None,
            min_replicas: None,
            max_replicas: None,
        }
    }
}

impl From<CreateInstanceRequest> for CreateInstanceArgs {
    fn from(req: CreateInstanceRequest) -> Self {
        Self {
            name: req.name,
            app_name: req.app_name,
            min_replicas: req.min_replicas,
            max_replicas: req.max_replicas,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UpdateInstanceArgs {
    /// Instance name
    pub name: String,
    pub app_name: Option<String>,
    pub min_replicas: Option<i32>,
    pub max_replicas: Option<i32>,
}

impl UpdateInstanceArgs {
    pub fn new(name: impl Into<String>, req: UpdateInstanceRequest) -> Self {
        Self {
            name: name.into(),
            app_name: req.app_name,
            min_replicas: req.min_replicas,
            max_replicas: req.max_replicas,
        }
    }
}

// ============================================================================
// Triggers
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ListTriggersArgs {
    pub instance: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UpsertTriggerArgs {
    pub instance: String,
    pub name: String,
    /// Scaler kind
    pub kind: String,
    pub metadata: TriggerMetadata,
}

impl UpsertTriggerArgs {
    pub fn new(instance: impl Into<String>, name: impl Into<String>, req: UpsertTriggerRequest) -> Self {
        Self {
            instance: instance.into(),
            name: name.into(),
            kind: req.kind,
            metadata: req.metadata,
        }
    }

    pub fn from_trigger(instance: impl Into<String>, trigger: Trigger) -> Self {
        Self {
            instance: instance.into(),
            name: trigger.name,
            kind: trigger.kind,
            metadata: trigger.metadata,
        }
    }

    pub fn trigger(&self) -> Trigger {
        Trigger::new(self.name.clone(), self.kind.clone(), self.metadata.clone())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeleteTriggerArgs {
    pub instance: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GetTriggerArgs {
    pub instance: String,
    pub name: String,
}
