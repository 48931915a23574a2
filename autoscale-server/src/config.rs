use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use autoscale_reconciler::k8s_client::ClusterSettings;
use autoscale_reconciler::ReconcilerConfig;

#[derive(Debug, Clone)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub namespace: String,
    pub kubeconfig: Option<PathBuf>,
    pub operation_timeout: Duration,
    pub max_write_attempts: u32,
    pub log_dir: Option<PathBuf>,
}

impl Config {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        Ok(Self {
            bind_address: var("AUTOSCALE_BIND_ADDRESS")
                .unwrap_or_else(|| "0.0.0.0:8081".to_string())
                .parse()
                .context("AUTOSCALE_BIND_ADDRESS must be a valid socket address")?,
            namespace: var("AUTOSCALE_NAMESPACE").unwrap_or_else(|| "default".to_string()),
            kubeconfig: var("KUBECONFIG").map(PathBuf::from),
            operation_timeout: Duration::from_secs(
                var("AUTOSCALE_OPERATION_TIMEOUT_SECS")
                    .unwrap_or_else(|| "30".to_string())
                    .parse()
                    .context("AUTOSCALE_OPERATION_TIMEOUT_SECS must be a number of seconds")?,
            ),
            max_write_attempts: var("AUTOSCALE_MAX_WRITE_ATTEMPTS")
                .unwrap_or_else(|| "3".to_string())
                .parse()
                .context("AUTOSCALE_MAX_WRITE_ATTEMPTS must be a positive integer")?,
            log_dir: var("AUTOSCALE_LOG_DIR").map(PathBuf::from),
        })
    }

    pub fn cluster_settings(&self) -> ClusterSettings {
        ClusterSettings::new(self.namespace.clone()).with_kubeconfig(self.kubeconfig.clone())
    }

    pub fn reconciler_config(&self) -> ReconcilerConfig {
        ReconcilerConfig {
            operation_timeout: self.operation_timeout,
            max_write_attempts: self.max_write_attempts,
            ..ReconcilerConfig::default()
        }
    }
}
