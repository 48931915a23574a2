//! Shared Kubernetes client handle
//!
//! Clients are built on first use and cached for the lifetime of the handle.
//! A failed build leaves nothing cached, so the next caller tries again.

use std::future::Future;
use std::path::PathBuf;
use std::time::Duration;

use k8s_openapi::apimachinery::pkg::version::Info;
use kube::config::{InferConfigError, KubeConfigOptions, Kubeconfig, KubeconfigError};
use kube::{api::Api, Client, Config};
use thiserror::Error;
use tokio::sync::RwLock;

use crate::crd::ScaledObject;

const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("failed to load kubeconfig: {0}")]
    Kubeconfig(#[from] KubeconfigError),

    #[error("failed to infer cluster configuration: {0}")]
    Infer(#[from] InferConfigError),

    #[error("failed to create Kubernetes client: {0}")]
    Build(#[from] kube::Error),
}

/// Value built at most once, on demand.
///
/// Readers share a read lock on the fast path; the first writer builds the value
/// while holding the write lock so concurrent callers never build twice.
pub struct LazyHandle<T> {
    slot: RwLock<Option<T>>,
}

impl<T> Default for LazyHandle<T> {
    fn default() -> Self {
        Self {
            slot: RwLock::new(None),
        }
    }
}

impl<T: Clone> LazyHandle<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get_or_try_init<F, Fut, E>(&self, init: F) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if let Some(value) = self.slot.read().await.as_ref() {
            return Ok(value.clone());
        }

        let mut slot = self.slot.write().await;
        if let Some(value) = slot.as_ref() {
            return Ok(value.clone());
        }

        let value = init().await?;
        *slot = Some(value.clone());
        Ok(value)
    }

    pub async fn is_initialized(&self) -> bool {
        self.slot.read().await.is_some()
    }
}

/// Where and how to reach the cluster
#[derive(Debug, Clone)]
pub struct ClusterSettings {
    /// Explicit kubeconfig; falls back to in-cluster / default inference when unset
    pub kubeconfig: Option<PathBuf>,
    /// Namespace holding the ScaledObjects
    pub namespace: String,
    pub connect_timeout: Duration,
    pub read_timeout: Duration,
}

impl ClusterSettings {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            kubeconfig: None,
            namespace: namespace.into(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            read_timeout: DEFAULT_READ_TIMEOUT,
        }
    }

    pub fn with_kubeconfig(mut self, path: Option<PathBuf>) -> Self {
        self.kubeconfig = path;
        self
    }
}

/// Lazily constructed cluster client and ScaledObject client
pub struct ClusterClients {
    settings: ClusterSettings,
    cluster: LazyHandle<Client>,
    scaled_objects: LazyHandle<Api<ScaledObject>>,
}

impl ClusterClients {
    pub fn new(settings: ClusterSettings) -> Self {
        Self {
            settings,
            cluster: LazyHandle::new(),
            scaled_objects: LazyHandle::new(),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.settings.namespace
    }

    /// Generic cluster client
    pub async fn cluster_client(&self) -> Result<Client, ClientError> {
        self.cluster
            .get_or_try_init(|| build_client(&self.settings))
            .await
    }

    /// Namespaced ScaledObject client
    pub async fn scaled_object_client(&self) -> Result<Api<ScaledObject>, ClientError> {
        self.scaled_objects
            .get_or_try_init(|| async {
                let client = self.cluster_client().await?;
                Ok(Api::namespaced(client, &self.settings.namespace))
            })
            .await
    }

    /// Ask the API server for its version; used as a readiness probe
    pub async fn server_version(&self) -> Result<Info, ClientError> {
        let client = self.cluster_client().await?;
        Ok(client.apiserver_version().await?)
    }
}

async fn build_client(settings: &ClusterSettings) -> Result<Client, ClientError> {
    let mut config = match &settings.kubeconfig {
        Some(path) => {
            tracing::debug!(path = %path.display(), "Loading kubeconfig");
            let kubeconfig = Kubeconfig::read_from(path)?;
            Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default()).await?
        }
        None => Config::infer().await?,
    };
    config.connect_timeout = Some(settings.connect_timeout);
    config.read_timeout = Some(settings.read_timeout);

    let client = Client::try_from(config)?;
    tracing::info!(namespace = %settings.namespace, "Kubernetes client created");
    Ok(client)
}
