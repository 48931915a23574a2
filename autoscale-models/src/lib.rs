use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// A single scaler metadata value.
///
/// Scaler metadata schemas differ per trigger type, so values are accepted as
/// any JSON scalar and stringified when written to the ScaledObject.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataValue {
    String(String),
    Integer(i64),
    /// Integers above `i64::MAX`
    UInt(u64),
    Float(f64),
    Bool(bool),
}

impl MetadataValue {
    /// Render the value the way scaler configs expect it (always a string)
    pub fn to_scaler_string(&self) -> String {
        match self {
            MetadataValue::String(s) => s.clone(),
            MetadataValue::Integer(i) => i.to_string(),
            MetadataValue::UInt(u) => u.to_string(),
            MetadataValue::Float(f) => f.to_string(),
            MetadataValue::Bool(b) => b.to_string(),
        }
    }
}

impl fmt::Display for MetadataValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_scaler_string())
    }
}

impl From<&str> for MetadataValue {
    fn from(value: &str) -> Self {
        MetadataValue::String(value.to_string())
    }
}

impl From<String> for MetadataValue {
    fn from(value: String) -> Self {
        MetadataValue::String(value)
    }
}

impl From<i64> for MetadataValue {
    fn from(value: i64) -> Self {
        MetadataValue::Integer(value)
    }
}

impl From<u64> for MetadataValue {
    fn from(value: u64) -> Self {
        match i64::try_from(value) {
            Ok(i) => MetadataValue::Integer(i),
            Err(_) => MetadataValue::UInt(value),
        }
    }
}

impl From<f64> for MetadataValue {
    fn from(value: f64) -> Self {
        MetadataValue::Float(value)
    }
}

impl From<bool> for MetadataValue {
    fn from(value: bool) -> Self {
        MetadataValue::Bool(value)
    }
}

/// Scaler-specific configuration of a trigger
pub type TriggerMetadata = BTreeMap<String, MetadataValue>;

/// One named autoscaling rule attached to an instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trigger {
    pub name: String,
    /// Scaler kind, e.g. "cron" or "prometheus"
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub metadata: TriggerMetadata,
}

impl Trigger {
    pub fn new(name: impl Into<String>, kind: impl Into<String>, metadata: TriggerMetadata) -> Self {
        Self {
            name: name.into(),
            kind: kind.into(),
            metadata,
        }
    }
}

/// Triggers of one instance, unique by name, in insertion order
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "Vec<Trigger>", into = "Vec<Trigger>")]
pub struct TriggerSet(Vec<Trigger>);

impl TriggerSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Trigger> {
        self.0.iter()
    }

    pub fn get(&self, name: &str) -> Option<&Trigger> {
        self.0.iter().find(|t| t.name == name)
    }

    /// Insert or replace by name. Returns the previous trigger when one was replaced;
    /// a replaced trigger keeps its position.
    pub fn upsert(&mut self, trigger: Trigger) -> Option<Trigger> {
        match self.0.iter_mut().find(|t| t.name == trigger.name) {
            Some(slot) => Some(std::mem::replace(slot, trigger)),
            None => {
                self.0.push(trigger);
                None
            }
        }
    }

    pub fn remove(&mut self, name: &str) -> Option<Trigger> {
        let idx = self.0.iter().position(|t| t.name == name)?;
        Some(self.0.remove(idx))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|t| t.name.as_str())
    }

    pub fn into_vec(self) -> Vec<Trigger> {
        self.0
    }
}

impl FromIterator<Trigger> for TriggerSet {
    fn from_iter<I: IntoIterator<Item = Trigger>>(iter: I) -> Self {
        let mut set = TriggerSet::new();
        for trigger in iter {
            set.upsert(trigger);
        }
        set
    }
}

impl From<Vec<Trigger>> for TriggerSet {
    fn from(triggers: Vec<Trigger>) -> Self {
        triggers.into_iter().collect()
    }
}

impl From<TriggerSet> for Vec<Trigger> {
    fn from(set: TriggerSet) -> Self {
        set.0
    }
}

impl IntoIterator for TriggerSet {
    type Item = Trigger;
    type IntoIter = std::vec::IntoIter<Trigger>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a TriggerSet {
    type Item = &'a Trigger;
    type IntoIter = std::slice::Iter<'a, Trigger>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// Observed state of an instance, derived from its ScaledObject
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum InstanceStatus {
    Provisioning,
    Ready,
    Updating,
    Deleting,
    Error,
}

impl fmt::Display for InstanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            InstanceStatus::Provisioning => "provisioning",
            InstanceStatus::Ready => "ready",
            InstanceStatus::Updating => "updating",
            InstanceStatus::Deleting => "deleting",
            InstanceStatus::Error => "error",
        };
        f.write_str(s)
    }
}

/// A provisioned autoscaling add-on for one application
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instance {
    pub name: String,
    /// Workload the scaler targets
    pub app_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_replicas: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_replicas: Option<i32>,
    pub triggers: TriggerSet,
    pub status: InstanceStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

/// Response for instance status queries
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstanceStatusReport {
    pub instance: String,
    pub status: InstanceStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Request to provision a new instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateInstanceRequest {
    pub name: String,
    /// Workload to scale (defaults to the instance name)
    #[serde(default)]
    pub app_name: Option<String>,
    #[serde(default)]
    pub min_replicas: Option<i32>,
    #[serde(default)]
    pub max_replicas: Option<i32>,
}

/// Partial update of an instance; absent fields are left as they are
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UpdateInstanceRequest {
    #[serde(default)]
    pub app_name: Option<String>,
    #[serde(default)]
    pub min_replicas: Option<i32>,
    #[serde(default)]
    pub max_replicas: Option<i32>,
}

/// Body of a trigger create/update call; the name travels in the path
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpsertTriggerRequest {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub metadata: TriggerMetadata,
}
