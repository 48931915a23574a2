use anyhow::Result;
use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json},
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_http::trace::TraceLayer;

use autoscale_models::{
    CreateInstanceRequest, Instance, InstanceStatusReport, Trigger, TriggerSet,
    UpdateInstanceRequest, UpsertTriggerRequest,
};
use autoscale_reconciler::k8s_client::ClusterClients;
use autoscale_reconciler::mapper;
use autoscale_reconciler::{
    CreateInstanceArgs, DeleteTriggerArgs, ErrorKind, GetTriggerArgs, ListTriggersArgs,
    ReconcileError, Reconciler, UpdateInstanceArgs, UpsertOutcome, UpsertTriggerArgs,
};

/// Per-request override of the operation deadline, in seconds
pub const REQUEST_TIMEOUT_HEADER: &str = "x-request-timeout";

/// Shared API state
#[derive(Clone)]
pub struct AppState {
    pub reconciler: Reconciler,
    pub clients: Arc<ClusterClients>,
}

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/health/cluster", get(cluster_health))
        .route("/resources", post(create_instance))
        .route(
            "/resources/:name",
            get(get_instance).put(update_instance).delete(delete_instance),
        )
        .route("/resources/:name/status", get(instance_status))
        .route("/resources/:name/triggers", get(list_triggers))
        .route(
            "/resources/:name/triggers/:trigger",
            get(get_trigger).put(upsert_trigger).delete(delete_trigger),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the API server
pub async fn start_server(addr: SocketAddr, state: AppState) -> Result<()> {
    let app = create_router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    tracing::info!("✓ API server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
            tracing::info!("Shutting down...");
        })
        .await
        .map_err(|e| anyhow::anyhow!("Server error: {}", e))?;

    Ok(())
}

/// Reconciler honoring the caller's deadline, when one is given
fn reconciler_for(state: &AppState, headers: &HeaderMap) -> Result<Reconciler, AppError> {
    let Some(value) = headers.get(REQUEST_TIMEOUT_HEADER) else {
        return Ok(state.reconciler.clone());
    };

    let seconds = value
        .to_str()
        .ok()
        .and_then(|v| v.trim().parse::<f64>().ok())
        .filter(|s| s.is_finite() && *s > 0.0)
        .ok_or_else(|| {
            AppError::BadRequest(format!(
                "{} must be a positive number of seconds",
                REQUEST_TIMEOUT_HEADER
            ))
        })?;
    Ok(state.reconciler.with_timeout(Duration::from_secs_f64(seconds)))
}

// ============================================================================
// Health Check
// ============================================================================

async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "autoscale-addon",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

async fn cluster_health(State(state): State<AppState>) -> Result<Json<serde_json::Value>, AppError> {
    let info = state.clients.server_version().await.map_err(|e| {
        tracing::warn!(error = %e, "Cluster is not reachable");
        AppError::Unavailable(format!("cluster is not reachable: {}", e))
    })?;

    Ok(Json(serde_json::json!({
        "status": "healthy",
        "namespace": state.clients.namespace(),
        "kubernetes_version": info.git_version,
    })))
}

// ============================================================================
// Instances
// ============================================================================

async fn create_instance(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<CreateInstanceRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Instance>), AppError> {
    let Json(req) = payload?;
    let instance = reconciler_for(&state, &headers)?
        .create_instance(CreateInstanceArgs::from(req))
        .await?;
    Ok((StatusCode::CREATED, Json(instance)))
}

async fn get_instance(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(name): Path<String>,
) -> Result<Json<Instance>, AppError> {
    let instance = reconciler_for(&state, &headers)?.get_instance(&name).await?;
    Ok(Json(instance))
}

async fn update_instance(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(name): Path<String>,
    payload: Result<Json<UpdateInstanceRequest>, JsonRejection>,
) -> Result<Json<Instance>, AppError> {
    let Json(req) = payload?;
    let instance = reconciler_for(&state, &headers)?
        .update_instance(UpdateInstanceArgs::new(name, req))
        .await?;
    Ok(Json(instance))
}

async fn delete_instance(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(name): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    reconciler_for(&state, &headers)?.delete_instance(&name).await?;
    Ok(Json(serde_json::json!({
        "instance": name,
        "deleted": true
    })))
}

async fn instance_status(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(name): Path<String>,
) -> Result<Json<InstanceStatusReport>, AppError> {
    let report = reconciler_for(&state, &headers)?
        .get_instance_status(&name)
        .await?;
    Ok(Json(report))
}

// ============================================================================
// Triggers
// ============================================================================

async fn list_triggers(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(name): Path<String>,
) -> Result<Json<TriggerSet>, AppError> {
    let triggers = reconciler_for(&state, &headers)?
        .list_triggers(ListTriggersArgs { instance: name })
        .await?;
    Ok(Json(triggers))
}

async fn get_trigger(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((name, trigger)): Path<(String, String)>,
) -> Result<Json<Trigger>, AppError> {
    let trigger = reconciler_for(&state, &headers)?
        .get_trigger(GetTriggerArgs {
            instance: name,
            name: trigger,
        })
        .await?;
    Ok(Json(trigger))
}

async fn upsert_trigger(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((name, trigger)): Path<(String, String)>,
    payload: Result<Json<UpsertTriggerRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Trigger>), AppError> {
    let Json(req) = payload?;
    let args = UpsertTriggerArgs::new(name, trigger, req);
    let outcome = reconciler_for(&state, &headers)?
        .upsert_trigger(args.clone())
        .await?;

    let status = match outcome {
        UpsertOutcome::Created => StatusCode::CREATED,
        UpsertOutcome::Updated | UpsertOutcome::Unchanged => StatusCode::OK,
    };
    Ok((status, Json(mapper::stored_trigger(&args.trigger()))))
}

async fn delete_trigger(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((name, trigger)): Path<(String, String)>,
) -> Result<Json<Trigger>, AppError> {
    let removed = reconciler_for(&state, &headers)?
        .delete_trigger(DeleteTriggerArgs {
            instance: name,
            name: trigger,
        })
        .await?;
    Ok(Json(removed))
}

// ============================================================================
// Error Handling
// ============================================================================

#[derive(Debug)]
enum AppError {
    Reconcile(ReconcileError),
    BadRequest(String),
    Unavailable(String),
}

impl From<ReconcileError> for AppError {
    fn from(err: ReconcileError) -> Self {
        AppError::Reconcile(err)
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::BadRequest(rejection.body_text())
    }
}

fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::AlreadyExists | ErrorKind::Conflict => StatusCode::CONFLICT,
        ErrorKind::Timeout => StatusCode::GATEWAY_TIMEOUT,
        ErrorKind::InvalidArgument => StatusCode::BAD_REQUEST,
        ErrorKind::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
        ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let (status, message) = match self {
            AppError::Reconcile(err) => {
                let status = status_for(err.kind());
                if status.is_server_error() {
                    tracing::error!(kind = %err.kind(), error = %err, "Request failed");
                }
                (status, err.to_string())
            }
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::Unavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg),
        };

        let body = Json(serde_json::json!({
            "error": message
        }));

        (status, body).into_response()
    }
}
