use anyhow::{Context, Result};
use std::io::Write;

use autoscale_models::{Trigger, TriggerMetadata, TriggerSet, UpsertTriggerRequest};

use crate::cli::TriggerCommand;
use crate::commands::client::ApiClient;

pub async fn handle_command(client: &ApiClient, command: TriggerCommand) -> Result<()> {
    let mut out = std::io::stdout();

    match command {
        TriggerCommand::List { instance, raw_output } => {
            let triggers: TriggerSet = client
                .get(&["resources", instance.as_str(), "triggers"])
                .await?;
            if raw_output {
                render_json(&mut out, &triggers)?;
            } else {
                render_table(&mut out, &triggers)?;
            }
        }
        TriggerCommand::Add { instance, name, kind, config } => {
            // reject bad metadata before calling the API
            let metadata = parse_config(&config)?;
            let request = UpsertTriggerRequest { kind, metadata };
            let trigger: Trigger = client
                .put(&["resources", instance.as_str(), "triggers", name.as_str()], &request)
                .await?;
            writeln!(out, "✓ Trigger {} ({}) saved on {}", trigger.name, trigger.kind, instance)?;
        }
        TriggerCommand::Delete { instance, name } => {
            let trigger: Trigger = client
                .delete(&["resources", instance.as_str(), "triggers", name.as_str()])
                .await?;
            writeln!(out, "✓ Trigger {} deleted from {}", trigger.name, instance)?;
        }
        TriggerCommand::Get { instance, name } => {
            let trigger: Trigger = client
                .get(&["resources", instance.as_str(), "triggers", name.as_str()])
                .await?;
            render_trigger(&mut out, &instance, &trigger)?;
        }
    }

    Ok(())
}

/// Parse the `--config` flag into typed metadata
pub fn parse_config(config: &str) -> Result<TriggerMetadata> {
    serde_json::from_str(config)
        .map_err(|e| anyhow::anyhow!("Config could not be parsed. Not a valid JSON: {}", e))
}

pub fn render_json(out: &mut impl Write, triggers: &TriggerSet) -> Result<()> {
    writeln!(out, "{}", serde_json::to_string_pretty(triggers)?)?;
    Ok(())
}

/// Two-column Name / Type table
pub fn render_table(out: &mut impl Write, triggers: &TriggerSet) -> Result<()> {
    let width = triggers
        .names()
        .map(str::len)
        .chain(std::iter::once("Name".len()))
        .max()
        .unwrap_or(0);

    writeln!(out, "{:<width$}  {}", "Name", "Type", width = width)?;
    for trigger in triggers {
        writeln!(out, "{:<width$}  {}", trigger.name, trigger.kind, width = width)?;
    }
    Ok(())
}

pub fn render_trigger(out: &mut impl Write, instance: &str, trigger: &Trigger) -> Result<()> {
    writeln!(out, "Instance: {}", instance)?;
    writeln!(out, "Trigger Name: {}", trigger.name)?;
    writeln!(out, "Trigger Type: {}", trigger.kind)?;
    writeln!(out)?;

    let block = serde_json::json!({ "Configuration": trigger.metadata });
    let yaml = serde_yaml::to_string(&block).context("Failed to render trigger configuration")?;
    write!(out, "{}", yaml)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use autoscale_models::MetadataValue;

    fn render<F>(f: F) -> String
    where
        F: FnOnce(&mut Vec<u8>) -> Result<()>,
    {
        let mut buf = Vec::new();
        f(&mut buf).unwrap();
        String::from_utf8(buf).unwrap()
    }

    fn sample() -> TriggerSet {
        let mut metadata = TriggerMetadata::new();
        metadata.insert("start".to_string(), MetadataValue::from("30 * * * *"));
        [
            Trigger::new("cron1", "cron", metadata),
            Trigger::new("queue-depth", "rabbitmq", TriggerMetadata::new()),
        ]
        .into_iter()
        .collect()
    }

    #[test]
    fn test_table_aligns_columns() {
        let output = render(|out| render_table(out, &sample()));
        assert_eq!(
            output,
            "Name         Type\n\
             cron1        cron\n\
             queue-depth  rabbitmq\n"
        );
    }

    #[test]
    fn test_empty_table_has_header_only() {
        let output = render(|out| render_table(out, &TriggerSet::new()));
        assert_eq!(output, "Name  Type\n");
    }

    #[test]
    fn test_raw_output_is_indented_json() {
        let output = render(|out| render_json(out, &sample()));
        assert!(output.starts_with("[\n  {"));
        let parsed: serde_json::Value = serde_json::from_str(&output).unwrap();
        assert_eq!(parsed[0]["type"], "cron");
        assert_eq!(parsed[0]["metadata"]["start"], "30 * * * *");
    }

    #[test]
    fn test_get_block() {
        let trigger = sample().get("cron1").cloned().unwrap();
        let output = render(|out| render_trigger(out, "web1", &trigger));

        let (header, yaml) = output.split_once("\n\n").unwrap();
        assert_eq!(header, "Instance: web1\nTrigger Name: cron1\nTrigger Type: cron");
        let parsed: serde_yaml::Value = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(parsed["Configuration"]["start"].as_str(), Some("30 * * * *"));
    }

    #[test]
    fn test_parse_config() {
        let metadata = parse_config(r#"{"threshold": 5.5, "enabled": true, "query": "up"}"#).unwrap();
        assert_eq!(metadata["threshold"], MetadataValue::Float(5.5));
        assert_eq!(metadata["enabled"], MetadataValue::Bool(true));

        let err = parse_config("{not json").unwrap_err();
        assert!(err
            .to_string()
            .starts_with("Config could not be parsed. Not a valid JSON:"));
        assert!(parse_config(r#"{"nested": {"a": 1}}"#).is_err());
    }
}
