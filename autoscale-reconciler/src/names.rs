//! Deterministic naming of backing resources

/// Suffix appended to an instance name to form its ScaledObject name
pub const SCALED_OBJECT_SUFFIX: &str = "-scaledobject-config";

/// Label carrying the owning instance name
pub const LABEL_INSTANCE: &str = "autoscale.addon/instance";

pub const LABEL_MANAGED_BY: &str = "app.kubernetes.io/managed-by";
pub const MANAGED_BY: &str = "autoscale-addon";

/// Longest instance name that still yields a valid object name
pub const MAX_INSTANCE_NAME_LEN: usize = 40;

/// ScaledObject name for an instance
pub fn scaled_object_name(instance: &str) -> String {
    format!("{}{}", instance, SCALED_OBJECT_SUFFIX)
}

/// Reverse of [`scaled_object_name`]
pub fn instance_name(object_name: &str) -> Option<&str> {
    object_name
        .strip_suffix(SCALED_OBJECT_SUFFIX)
        .filter(|name| !name.is_empty())
}

/// Check an instance name against DNS label rules.
///
/// Returns a human readable reason on failure.
pub fn validate_instance_name(name: &str) -> Result<(), String> {
    if name.is_empty() {
        return Err("instance name is required".to_string());
    }
    if name.len() > MAX_INSTANCE_NAME_LEN {
        return Err(format!(
            "instance name {:?} is longer than {} characters",
            name, MAX_INSTANCE_NAME_LEN
        ));
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
    {
        return Err(format!(
            "instance name {:?} may only contain lowercase letters, digits and '-'",
            name
        ));
    }
    if name.starts_with('-') || name.ends_with('-') {
        return Err(format!(
            "instance name {:?} must start and end with a letter or digit",
            name
        ));
    }
    Ok(())
}
