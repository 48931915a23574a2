//! Translation between the trigger model and ScaledObjects
//!
//! Writes only ever touch the fields this service owns. A trigger entry that is
//! replaced keeps its position and any fields the model does not know about
//! (authenticationRef, metricType, ...).

use std::collections::BTreeMap;

use autoscale_models::{Instance, InstanceStatus, MetadataValue, Trigger, TriggerSet};
use kube::ResourceExt;

use crate::crd::{
    ScaleTargetRef, ScaleTriggerSpec, ScaledObject, ScaledObjectSpec, CONDITION_FALLBACK,
    CONDITION_READY,
};
use crate::names;

/// What an upsert did to the trigger array
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Created,
    Updated,
    Unchanged,
}

pub fn encode_metadata(metadata: &BTreeMap<String, MetadataValue>) -> BTreeMap<String, String> {
    metadata
        .iter()
        .map(|(k, v)| (k.clone(), v.to_scaler_string()))
        .collect()
}

pub fn encode_trigger(trigger: &Trigger) -> ScaleTriggerSpec {
    ScaleTriggerSpec {
        name: Some(trigger.name.clone()),
        type_: trigger.kind.clone(),
        metadata: encode_metadata(&trigger.metadata),
        extra: BTreeMap::new(),
    }
}

pub fn encode_triggers(triggers: &TriggerSet) -> Vec<ScaleTriggerSpec> {
    triggers.iter().map(encode_trigger).collect()
}

/// Decode one entry; unnamed entries are not addressable and yield `None`
pub fn decode_trigger(entry: &ScaleTriggerSpec) -> Option<Trigger> {
    let name = entry.name.as_deref().filter(|n| !n.is_empty())?;
    let metadata = entry
        .metadata
        .iter()
        .map(|(k, v)| (k.clone(), MetadataValue::String(v.clone())))
        .collect();
    Some(Trigger::new(name, entry.type_.clone(), metadata))
}

/// The trigger as it reads back once stored: metadata values become strings
pub fn stored_trigger(trigger: &Trigger) -> Trigger {
    let metadata = trigger
        .metadata
        .iter()
        .map(|(k, v)| (k.clone(), MetadataValue::String(v.to_scaler_string())))
        .collect();
    Trigger::new(trigger.name.clone(), trigger.kind.clone(), metadata)
}

/// Decode the trigger array. On duplicate names the first entry wins, matching lookups.
pub fn decode_triggers(entries: &[ScaleTriggerSpec]) -> TriggerSet {
    let mut set = TriggerSet::new();
    for trigger in entries.iter().filter_map(decode_trigger) {
        if set.get(&trigger.name).is_none() {
            set.upsert(trigger);
        }
    }
    set
}

fn position(entries: &[ScaleTriggerSpec], name: &str) -> Option<usize> {
    entries.iter().position(|e| e.name.as_deref() == Some(name))
}

pub fn find_trigger(spec: &ScaledObjectSpec, name: &str) -> Option<Trigger> {
    position(&spec.triggers, name).and_then(|idx| decode_trigger(&spec.triggers[idx]))
}

/// Merge one trigger into the spec: replace in place when the name exists, append otherwise
pub fn upsert_trigger(spec: &mut ScaledObjectSpec, trigger: &Trigger) -> UpsertOutcome {
    let Some(idx) = position(&spec.triggers, &trigger.name) else {
        spec.triggers.push(encode_trigger(trigger));
        return UpsertOutcome::Created;
    };

    let mut entry = encode_trigger(trigger);
    entry.extra = spec.triggers[idx].extra.clone();
    let changed = spec.triggers[idx] != entry;
    spec.triggers[idx] = entry;

    // collapse duplicates left behind by other writers
    let before = spec.triggers.len();
    let mut seen = 0usize;
    spec.triggers.retain(|e| {
        if e.name.as_deref() == Some(trigger.name.as_str()) {
            seen += 1;
            seen == 1
        } else {
            true
        }
    });

    if changed || spec.triggers.len() != before {
        UpsertOutcome::Updated
    } else {
        UpsertOutcome::Unchanged
    }
}

/// Remove every entry named `name`, returning the first one decoded
pub fn remove_trigger(spec: &mut ScaledObjectSpec, name: &str) -> Option<Trigger> {
    let removed = find_trigger(spec, name)?;
    spec.triggers.retain(|e| e.name.as_deref() != Some(name));
    Some(removed)
}

/// Fresh ScaledObject for a new instance, with no triggers
pub fn new_scaled_object(
    instance: &str,
    app_name: &str,
    min_replicas: Option<i32>,
    max_replicas: Option<i32>,
) -> ScaledObject {
    let mut object = ScaledObject::new(
        &names::scaled_object_name(instance),
        ScaledObjectSpec {
            scale_target_ref: ScaleTargetRef {
                name: app_name.to_string(),
                ..ScaleTargetRef::default()
            },
            min_replica_count: min_replicas,
            max_replica_count: max_replicas,
            triggers: Vec::new(),
            extra: BTreeMap::new(),
        },
    );
    let labels = object.labels_mut();
    labels.insert(names::LABEL_INSTANCE.to_string(), instance.to_string());
    labels.insert(names::LABEL_MANAGED_BY.to_string(), names::MANAGED_BY.to_string());
    object
}

/// Instance name recorded on the object, falling back to its object name
pub fn instance_of(object: &ScaledObject) -> String {
    if let Some(name) = object.labels().get(names::LABEL_INSTANCE) {
        return name.clone();
    }
    let object_name = object.name_any();
    names::instance_name(&object_name)
        .map(str::to_string)
        .unwrap_or(object_name)
}

/// Derive the instance status from the object's observed state
pub fn derive_status(object: &ScaledObject) -> (InstanceStatus, Option<String>) {
    if object.metadata.deletion_timestamp.is_some() {
        return (InstanceStatus::Deleting, None);
    }

    let Some(status) = &object.status else {
        return (InstanceStatus::Provisioning, None);
    };
    let Some(ready) = status.condition(CONDITION_READY) else {
        return (InstanceStatus::Provisioning, None);
    };

    if ready.status == "False" {
        return (InstanceStatus::Error, ready.message.clone());
    }
    if let Some(fallback) = status.condition(CONDITION_FALLBACK) {
        if fallback.status == "True" {
            let message = fallback
                .message
                .clone()
                .or_else(|| Some("scaler is failing, fallback replicas in effect".to_string()));
            return (InstanceStatus::Error, message);
        }
    }

    match ready.status.as_str() {
        "True" => (InstanceStatus::Ready, ready.message.clone()),
        _ => (InstanceStatus::Updating, ready.message.clone()),
    }
}

pub fn decode_instance(object: &ScaledObject) -> Instance {
    let (status, message) = derive_status(object);
    Instance {
        name: instance_of(object),
        app_name: object.spec.scale_target_ref.name.clone(),
        min_replicas: object.spec.min_replica_count,
        max_replicas: object.spec.max_replica_count,
        triggers: decode_triggers(&object.spec.triggers),
        status,
        message,
        created_at: object.metadata.creation_timestamp.as_ref().map(|t| t.0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::{ScaledObjectCondition, ScaledObjectStatus};
    use autoscale_models::TriggerMetadata;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
    use serde_json::json;

    fn cron(name: &str, start: &str) -> Trigger {
        let mut metadata = TriggerMetadata::new();
        metadata.insert("start".to_string(), start.into());
        metadata.insert("desiredReplicas".to_string(), 10i64.into());
        Trigger::new(name, "cron", metadata)
    }

    fn condition(type_: &str, status: &str, message: Option<&str>) -> ScaledObjectCondition {
        ScaledObjectCondition {
            type_: type_.to_string(),
            status: status.to_string(),
            reason: None,
            message: message.map(str::to_string),
        }
    }

    fn with_conditions(conditions: Vec<ScaledObjectCondition>) -> ScaledObject {
        let mut object = new_scaled_object("web1", "web1", None, None);
        object.status = Some(ScaledObjectStatus {
            conditions,
            extra: BTreeMap::new(),
        });
        object
    }

    #[test]
    fn test_encode_stringifies_metadata() {
        let mut metadata = TriggerMetadata::new();
        metadata.insert("threshold".to_string(), 100.5.into());
        metadata.insert("desiredReplicas".to_string(), 10i64.into());
        metadata.insert("ignoreNullValues".to_string(), false.into());
        let entry = encode_trigger(&Trigger::new("prom", "prometheus", metadata));

        assert_eq!(entry.name.as_deref(), Some("prom"));
        assert_eq!(entry.type_, "prometheus");
        assert_eq!(entry.metadata["threshold"], "100.5");
        assert_eq!(entry.metadata["desiredReplicas"], "10");
        assert_eq!(entry.metadata["ignoreNullValues"], "false");
    }

    #[test]
    fn test_encode_decode_is_lossless_for_owned_fields() {
        let mut spec = new_scaled_object("web1", "web1", None, None).spec;
        upsert_trigger(&mut spec, &cron("a", "30 * * * *"));
        upsert_trigger(&mut spec, &cron("b", "0 * * * *"));

        let decoded = decode_triggers(&spec.triggers);
        assert_eq!(encode_triggers(&decoded), spec.triggers);
    }

    #[test]
    fn test_upsert_appends_then_replaces_in_place() {
        let mut spec = new_scaled_object("web1", "web1", None, None).spec;
        assert_eq!(upsert_trigger(&mut spec, &cron("a", "1")), UpsertOutcome::Created);
        assert_eq!(upsert_trigger(&mut spec, &cron("b", "2")), UpsertOutcome::Created);
        assert_eq!(upsert_trigger(&mut spec, &cron("a", "3")), UpsertOutcome::Updated);
        assert_eq!(upsert_trigger(&mut spec, &cron("a", "3")), UpsertOutcome::Unchanged);

        let names: Vec<_> = spec.triggers.iter().map(|e| e.name.clone().unwrap()).collect();
        assert_eq!(names, vec!["a", "b"]);
        assert_eq!(spec.triggers[0].metadata["start"], "3");
    }

    #[test]
    fn test_upsert_keeps_unmodeled_trigger_fields() {
        let mut spec = new_scaled_object("web1", "web1", None, None).spec;
        upsert_trigger(&mut spec, &cron("a", "1"));
        spec.triggers[0]
            .extra
            .insert("authenticationRef".to_string(), json!({"name": "auth"}));

        upsert_trigger(&mut spec, &cron("a", "2"));
        assert_eq!(spec.triggers[0].extra["authenticationRef"], json!({"name": "auth"}));
    }

    #[test]
    fn test_upsert_collapses_duplicate_names() {
        let mut spec = new_scaled_object("web1", "web1", None, None).spec;
        spec.triggers.push(encode_trigger(&cron("a", "1")));
        spec.triggers.push(encode_trigger(&cron("b", "2")));
        spec.triggers.push(encode_trigger(&cron("a", "1")));

        assert_eq!(upsert_trigger(&mut spec, &cron("a", "1")), UpsertOutcome::Updated);
        assert_eq!(decode_triggers(&spec.triggers).len(), 2);
        assert_eq!(spec.triggers.len(), 2);
    }

    #[test]
    fn test_names_are_case_sensitive() {
        let mut spec = new_scaled_object("web1", "web1", None, None).spec;
        upsert_trigger(&mut spec, &cron("Cron", "1"));
        assert_eq!(upsert_trigger(&mut spec, &cron("cron", "1")), UpsertOutcome::Created);
        assert!(find_trigger(&spec, "CRON").is_none());
    }

    #[test]
    fn test_remove_trigger() {
        let mut spec = new_scaled_object("web1", "web1", None, None).spec;
        upsert_trigger(&mut spec, &cron("a", "1"));
        upsert_trigger(&mut spec, &cron("b", "2"));

        let removed = remove_trigger(&mut spec, "a").unwrap();
        assert_eq!(removed.name, "a");
        assert!(remove_trigger(&mut spec, "a").is_none());
        assert_eq!(decode_triggers(&spec.triggers).names().collect::<Vec<_>>(), vec!["b"]);
    }

    #[test]
    fn test_unnamed_entries_are_skipped_but_kept() {
        let mut spec = new_scaled_object("web1", "web1", None, None).spec;
        spec.triggers.push(ScaleTriggerSpec {
            type_: "cpu".to_string(),
            ..ScaleTriggerSpec::default()
        });
        upsert_trigger(&mut spec, &cron("a", "1"));

        assert_eq!(decode_triggers(&spec.triggers).len(), 1);
        assert_eq!(spec.triggers.len(), 2);
    }

    #[test]
    fn test_new_scaled_object_is_labeled() {
        let object = new_scaled_object("web1", "web-app", Some(1), Some(5));
        assert_eq!(object.name_any(), "web1-scaledobject-config");
        assert_eq!(object.labels()[names::LABEL_INSTANCE], "web1");
        assert_eq!(object.spec.scale_target_ref.name, "web-app");
        assert!(object.spec.triggers.is_empty());
        assert_eq!(instance_of(&object), "web1");
    }

    #[test]
    fn test_instance_of_falls_back_to_object_name() {
        let mut object = new_scaled_object("web1", "web1", None, None);
        object.labels_mut().clear();
        assert_eq!(instance_of(&object), "web1");
    }

    #[test]
    fn test_status_derivation() {
        let fresh = new_scaled_object("web1", "web1", None, None);
        assert_eq!(derive_status(&fresh).0, InstanceStatus::Provisioning);

        let ready = with_conditions(vec![condition("Ready", "True", None)]);
        assert_eq!(derive_status(&ready).0, InstanceStatus::Ready);

        let updating = with_conditions(vec![condition("Ready", "Unknown", None)]);
        assert_eq!(derive_status(&updating).0, InstanceStatus::Updating);

        let failed = with_conditions(vec![condition("Ready", "False", Some("bad query"))]);
        assert_eq!(
            derive_status(&failed),
            (InstanceStatus::Error, Some("bad query".to_string()))
        );

        let degraded = with_conditions(vec![
            condition("Ready", "True", None),
            condition("Fallback", "True", None),
        ]);
        assert_eq!(derive_status(&degraded).0, InstanceStatus::Error);

        let no_ready = with_conditions(vec![condition("Active", "True", None)]);
        assert_eq!(derive_status(&no_ready).0, InstanceStatus::Provisioning);

        let mut deleting = ready.clone();
        deleting.metadata.deletion_timestamp = Some(Time(chrono::Utc::now()));
        assert_eq!(derive_status(&deleting).0, InstanceStatus::Deleting);
    }

    #[test]
    fn test_decode_instance() {
        let mut object = new_scaled_object("web1", "web-app", None, Some(4));
        upsert_trigger(&mut object.spec, &cron("a", "30 * * * *"));

        let instance = decode_instance(&object);
        assert_eq!(instance.name, "web1");
        assert_eq!(instance.app_name, "web-app");
        assert_eq!(instance.max_replicas, Some(4));
        assert_eq!(instance.status, InstanceStatus::Provisioning);
        assert_eq!(
            instance.triggers.get("a").unwrap().metadata["start"],
            MetadataValue::String("30 * * * *".to_string())
        );
    }

    #[test]
    fn test_stored_trigger_matches_what_is_read_back() {
        let mut metadata = TriggerMetadata::new();
        metadata.insert("desiredReplicas".to_string(), MetadataValue::Integer(3));
        metadata.insert("threshold".to_string(), MetadataValue::Float(5.5));
        metadata.insert("activate".to_string(), MetadataValue::Bool(true));
        let trigger = Trigger::new("prom", "prometheus", metadata);

        let stored = stored_trigger(&trigger);
        assert_eq!(Some(stored.clone()), decode_trigger(&encode_trigger(&trigger)));
        assert_eq!(stored.metadata["desiredReplicas"], MetadataValue::from("3"));
        assert_eq!(stored.metadata["threshold"], MetadataValue::from("5.5"));
    }
}
