use anyhow::Result;
use std::net::SocketAddr;
use std::sync::Arc;

use autoscale_reconciler::k8s_client::ClusterClients;
use autoscale_reconciler::store::KubeStore;
use autoscale_reconciler::Reconciler;

use crate::api::{self, AppState};
use crate::config::Config;

/// Run the HTTP API against the configured cluster
pub async fn run_api(config: Config, bind: Option<SocketAddr>) -> Result<()> {
    let addr = bind.unwrap_or(config.bind_address);

    tracing::info!("Starting autoscale add-on API");
    tracing::info!(
        namespace = %config.namespace,
        kubeconfig = ?config.kubeconfig,
        timeout = ?config.operation_timeout,
        max_write_attempts = config.max_write_attempts,
        log_dir = ?config.log_dir,
        "Cluster settings"
    );

    // cluster client is built on the first request
    let clients = Arc::new(ClusterClients::new(config.cluster_settings()));
    let store = Arc::new(KubeStore::new(clients.clone()));
    let state = AppState {
        reconciler: Reconciler::new(store, config.reconciler_config()),
        clients,
    };

    tracing::info!("  Press Ctrl+C to stop");
    api::start_server(addr, state).await
}
