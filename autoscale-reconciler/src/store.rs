//! Remote object store seam
//!
//! Reconciliation talks to a [`ScaledObjectStore`]; [`KubeStore`] is the real
//! cluster, [`crate::memory::InMemoryStore`] is the test double.

use std::sync::Arc;

use async_trait::async_trait;
use kube::api::{DeleteParams, PostParams, Preconditions};
use kube::ResourceExt;
use thiserror::Error;

use crate::crd::ScaledObject;
use crate::k8s_client::ClusterClients;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum StoreError {
    #[error("object {0:?} not found")]
    NotFound(String),

    #[error("object {0:?} already exists")]
    AlreadyExists(String),

    #[error("object {0:?} changed since it was read")]
    Conflict(String),

    #[error("{0}")]
    Unavailable(String),

    #[error("{0}")]
    Internal(String),
}

/// get / create / update / delete of ScaledObjects by name.
///
/// `replace` and `delete` are conditional on the resource version carried by
/// the caller; a mismatch yields [`StoreError::Conflict`].
#[async_trait]
pub trait ScaledObjectStore: Send + Sync {
    async fn get(&self, name: &str) -> Result<Option<ScaledObject>, StoreError>;

    async fn create(&self, object: &ScaledObject) -> Result<ScaledObject, StoreError>;

    async fn replace(&self, object: &ScaledObject) -> Result<ScaledObject, StoreError>;

    async fn delete(&self, name: &str, resource_version: Option<String>) -> Result<(), StoreError>;
}

/// Store backed by the Kubernetes API server
pub struct KubeStore {
    clients: Arc<ClusterClients>,
}

impl KubeStore {
    pub fn new(clients: Arc<ClusterClients>) -> Self {
        Self { clients }
    }

    async fn api(&self) -> Result<kube::Api<ScaledObject>, StoreError> {
        self.clients
            .scaled_object_client()
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))
    }
}

#[async_trait]
impl ScaledObjectStore for KubeStore {
    async fn get(&self, name: &str) -> Result<Option<ScaledObject>, StoreError> {
        let api = self.api().await?;
        api.get_opt(name).await.map_err(|e| classify(name, e))
    }

    async fn create(&self, object: &ScaledObject) -> Result<ScaledObject, StoreError> {
        let api = self.api().await?;
        let name = object.name_any();
        api.create(&PostParams::default(), object)
            .await
            .map_err(|e| classify(&name, e))
    }

    async fn replace(&self, object: &ScaledObject) -> Result<ScaledObject, StoreError> {
        let api = self.api().await?;
        let name = object.name_any();
        api.replace(&name, &PostParams::default(), object)
            .await
            .map_err(|e| classify(&name, e))
    }

    async fn delete(&self, name: &str, resource_version: Option<String>) -> Result<(), StoreError> {
        let api = self.api().await?;
        let params = DeleteParams {
            preconditions: resource_version.map(|rv| Preconditions {
                resource_version: Some(rv),
                uid: None,
            }),
            ..DeleteParams::default()
        };
        api.delete(name, &params)
            .await
            .map(|_| ())
            .map_err(|e| classify(name, e))
    }
}

/// Map a kube error onto the store taxonomy
pub(crate) fn classify(name: &str, err: kube::Error) -> StoreError {
    match err {
        kube::Error::Api(response) => match (response.code, response.reason.as_str()) {
            (404, _) => StoreError::NotFound(name.to_string()),
            (409, "AlreadyExists") => StoreError::AlreadyExists(name.to_string()),
            (409, _) => StoreError::Conflict(name.to_string()),
            (429, _) | (500..=599, _) => StoreError::Unavailable(format!(
                "API server error for {}: {}",
                name, response.message
            )),
            (code, _) => StoreError::Internal(format!(
                "API error {} for {}: {}",
                code, name, response.message
            )),
        },
        kube::Error::HyperError(e) => StoreError::Unavailable(format!("transport error: {}", e)),
        kube::Error::Service(e) => StoreError::Unavailable(format!("transport error: {}", e)),
        other => StoreError::Internal(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kube::error::ErrorResponse;

    fn api_error(code: u16, reason: &str) -> kube::Error {
        kube::Error::Api(ErrorResponse {
            status: "Failure".to_string(),
            message: format!("{} happened", reason),
            reason: reason.to_string(),
            code,
        })
    }

    #[test]
    fn test_classify_api_errors() {
        assert_eq!(
            classify("so", api_error(404, "NotFound")),
            StoreError::NotFound("so".into())
        );
        assert_eq!(
            classify("so", api_error(409, "AlreadyExists")),
            StoreError::AlreadyExists("so".into())
        );
        assert_eq!(
            classify("so", api_error(409, "Conflict")),
            StoreError::Conflict("so".into())
        );
        assert!(matches!(
            classify("so", api_error(503, "ServiceUnavailable")),
            StoreError::Unavailable(_)
        ));
        assert!(matches!(
            classify("so", api_error(422, "Invalid")),
            StoreError::Internal(_)
        ));
    }
}
