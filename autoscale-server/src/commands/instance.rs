use anyhow::Result;
use std::io::Write;

use autoscale_models::{CreateInstanceRequest, Instance, InstanceStatusReport};

use crate::commands::client::ApiClient;

pub async fn run_create(
    client: &ApiClient,
    name: String,
    app_name: Option<String>,
    min_replicas: Option<i32>,
    max_replicas: Option<i32>,
) -> Result<()> {
    let request = CreateInstanceRequest {
        name,
        app_name,
        min_replicas,
        max_replicas,
    };
    let instance: Instance = client.post(&["resources"], &request).await?;

    let mut out = std::io::stdout();
    writeln!(out, "✓ Instance created")?;
    writeln!(out)?;
    render_instance(&mut out, &instance)?;
    writeln!(out)?;
    writeln!(out, "Check status with:")?;
    writeln!(out, "  autoscale status {}", instance.name)?;
    Ok(())
}

pub async fn run_delete(client: &ApiClient, name: String) -> Result<()> {
    let _: serde_json::Value = client.delete(&["resources", name.as_str()]).await?;
    println!("✓ Instance {} deleted", name);
    Ok(())
}

pub async fn run_status(client: &ApiClient, name: String) -> Result<()> {
    let report: InstanceStatusReport = client
        .get(&["resources", name.as_str(), "status"])
        .await?;
    render_status(&mut std::io::stdout(), &report)
}

pub fn render_instance(out: &mut impl Write, instance: &Instance) -> Result<()> {
    let replicas = |r: Option<i32>| r.map_or_else(|| "-".to_string(), |r| r.to_string());

    writeln!(out, "  Name:      {}", instance.name)?;
    writeln!(out, "  App:       {}", instance.app_name)?;
    writeln!(out, "  Replicas:  {} - {}", replicas(instance.min_replicas), replicas(instance.max_replicas))?;
    writeln!(out, "  Triggers:  {}", instance.triggers.len())?;
    writeln!(out, "  Status:    {}", instance.status)?;
    if let Some(created_at) = instance.created_at {
        writeln!(out, "  Created:   {}", created_at.format("%Y-%m-%d %H:%M:%S UTC"))?;
    }
    Ok(())
}

pub fn render_status(out: &mut impl Write, report: &InstanceStatusReport) -> Result<()> {
    writeln!(out, "Instance: {}", report.instance)?;
    writeln!(out, "Status:   {}", report.status)?;
    if let Some(message) = &report.message {
        writeln!(out, "Message:  {}", message)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use autoscale_models::{InstanceStatus, TriggerSet};
    use chrono::{TimeZone, Utc};

    #[test]
    fn test_render_status() {
        let report = InstanceStatusReport {
            instance: "web1".to_string(),
            status: InstanceStatus::Error,
            message: Some("scaler failed".to_string()),
        };
        let mut buf = Vec::new();
        render_status(&mut buf, &report).unwrap();
        assert_eq!(
            String::from_utf8(buf).unwrap(),
            "Instance: web1\nStatus:   error\nMessage:  scaler failed\n"
        );
    }

    #[test]
    fn test_render_instance() {
        let instance = Instance {
            name: "web1".to_string(),
            app_name: "web".to_string(),
            min_replicas: Some(1),
            max_replicas: None,
            triggers: TriggerSet::new(),
            status: InstanceStatus::Provisioning,
            message: None,
            created_at: Some(Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()),
        };
        let mut buf = Vec::new();
        render_instance(&mut buf, &instance).unwrap();
        let output = String::from_utf8(buf).unwrap();
        assert!(output.contains("App:       web\n"));
        assert!(output.contains("Replicas:  1 - -\n"));
        assert!(output.contains("Status:    provisioning\n"));
        assert!(output.contains("Created:   2024-05-01 12:00:00 UTC\n"));
    }
}
