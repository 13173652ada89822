#![forbid(unsafe_code)]

use std::{
    env,
    net::SocketAddr,
    sync::{Arc, Mutex},
};

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use crm_adapter::{
    AdapterError, AdapterErrorResponse, AdapterRuntime, CollectionPageQuery, GateVerifyRequest,
};
use crm_contracts::UnixTimeMs;

type SharedRuntime = Arc<Mutex<AdapterRuntime>>;

const RUNTIME_LOCK_POISONED: &str = "adapter runtime lock poisoned";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let bind = env::var("CRM_HTTP_BIND").unwrap_or_else(|_| "127.0.0.1:8080".to_string());
    let addr: SocketAddr = bind.parse()?;
    let runtime: SharedRuntime = Arc::new(Mutex::new(AdapterRuntime::default_from_env()?));

    let app = Router::new()
        .route("/healthz", get(healthz))
        .route("/v1/gate/status", get(gate_status))
        .route("/v1/gate/verify", post(gate_verify))
        .route("/v1/gate/reset", post(gate_reset))
        .route(
            "/v1/collections/:collection_id/documents",
            get(list_collection_documents),
        )
        .with_state(runtime);

    tracing::info!(%addr, "crm_adapter_http listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    tracing::info!("crm_adapter_http stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %err, "failed to listen for ctrl-c");
    }
}

fn lock_poisoned() -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(AdapterErrorResponse {
            status: "error".to_string(),
            outcome: "INTERNAL".to_string(),
            reason: RUNTIME_LOCK_POISONED.to_string(),
        }),
    )
        .into_response()
}

fn adapter_error(err: &AdapterError) -> Response {
    let code = StatusCode::from_u16(err.http_status_code())
        .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    if code.is_server_error() {
        tracing::warn!(error = %err, "collection request failed");
    }
    (code, Json(AdapterErrorResponse::from(err))).into_response()
}

async fn healthz(State(runtime): State<SharedRuntime>) -> Response {
    let Ok(runtime) = runtime.lock() else {
        return lock_poisoned();
    };
    (StatusCode::OK, Json(runtime.health_report())).into_response()
}

async fn gate_status(State(runtime): State<SharedRuntime>) -> Response {
    let Ok(mut runtime) = runtime.lock() else {
        return lock_poisoned();
    };
    let status = runtime.gate_status(UnixTimeMs::now());
    (StatusCode::OK, Json(status)).into_response()
}

async fn gate_verify(
    State(runtime): State<SharedRuntime>,
    Json(request): Json<GateVerifyRequest>,
) -> Response {
    let Ok(mut runtime) = runtime.lock() else {
        return lock_poisoned();
    };
    let status = runtime.verify_access_code(&request, UnixTimeMs::now());
    let code = if status.authorized {
        StatusCode::OK
    } else {
        StatusCode::UNAUTHORIZED
    };
    (code, Json(status)).into_response()
}

async fn gate_reset(State(runtime): State<SharedRuntime>) -> Response {
    let Ok(mut runtime) = runtime.lock() else {
        return lock_poisoned();
    };
    (StatusCode::OK, Json(runtime.reset_gate())).into_response()
}

async fn list_collection_documents(
    State(runtime): State<SharedRuntime>,
    Path(collection_id): Path<String>,
    Query(query): Query<CollectionPageQuery>,
) -> Response {
    let Ok(mut runtime) = runtime.lock() else {
        return lock_poisoned();
    };
    match runtime.list_collection_page(&collection_id, &query, UnixTimeMs::now()) {
        Ok(page) => (StatusCode::OK, Json(page)).into_response(),
        Err(err) => adapter_error(&err),
    }
}
