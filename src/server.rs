//! HTTP surface for the pairing subsystem.
//!
//! A single axum server hosts the `/krill/*` routes. Route handlers are thin
//! wrappers over the [`PairingManager`]; the server owns binding and
//! graceful shutdown, nothing else.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;

use crate::error::{PairingError, ServerError};
use crate::pairing::PairingManager;
use crate::protocol::PairRequest;

/// Shared state for the pairing routes.
#[derive(Clone)]
struct AppState {
    pairing: Arc<PairingManager>,
}

/// Build the `/krill/*` router with its state applied.
pub fn pairing_routes(pairing: Arc<PairingManager>) -> Router {
    Router::new()
        .route("/krill/pair", post(request_pairing))
        .route("/krill/pairings", get(list_pairings))
        .route("/krill/validate", post(validate_token))
        .route("/krill/pair/{id}", delete(revoke_pairing))
        .route("/krill/pair/{id}/senses", post(update_senses))
        .layer(TraceLayer::new_for_http())
        .with_state(AppState { pairing })
}

/// The pairing HTTP server.
pub struct PairingServer {
    addr: SocketAddr,
    router: Router,
    shutdown_tx: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl PairingServer {
    pub fn new(addr: SocketAddr, pairing: Arc<PairingManager>) -> Self {
        Self {
            addr,
            router: pairing_routes(pairing),
            shutdown_tx: None,
            handle: None,
        }
    }

    /// Bind the listener and spawn the server task.
    pub async fn start(&mut self) -> Result<SocketAddr, ServerError> {
        let listener = tokio::net::TcpListener::bind(self.addr)
            .await
            .map_err(|e| ServerError::BindFailed {
                addr: self.addr.to_string(),
                reason: e.to_string(),
            })?;
        let local_addr = listener.local_addr().map_err(|e| ServerError::BindFailed {
            addr: self.addr.to_string(),
            reason: e.to_string(),
        })?;

        tracing::info!("Pairing server listening on {}", local_addr);

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        self.shutdown_tx = Some(shutdown_tx);

        let app = self.router.clone();
        let handle = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                    tracing::info!("Pairing server shutting down");
                })
                .await
            {
                tracing::error!("Pairing server error: {}", e);
            }
        });

        self.handle = Some(handle);
        Ok(local_addr)
    }

    /// Signal graceful shutdown and wait for the server task to finish.
    pub async fn shutdown(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

async fn request_pairing(
    State(state): State<AppState>,
    Json(request): Json<PairRequest>,
) -> (StatusCode, Json<Value>) {
    match state
        .pairing
        .request_pairing(
            &request.user_id,
            &request.device_id,
            &request.device_name,
            request.device_type.as_deref(),
        )
        .await
    {
        Ok(receipt) => (StatusCode::OK, Json(json!(receipt))),
        Err(e) => pairing_error(e),
    }
}

#[derive(Deserialize)]
struct ListQuery {
    agent: Option<String>,
}

async fn list_pairings(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> (StatusCode, Json<Value>) {
    match state.pairing.list_pairings(query.agent.as_deref()).await {
        Ok(pairings) => (StatusCode::OK, Json(json!({ "pairings": pairings }))),
        Err(e) => pairing_error(e),
    }
}

#[derive(Deserialize)]
struct ValidateBody {
    token: String,
}

async fn validate_token(
    State(state): State<AppState>,
    Json(body): Json<ValidateBody>,
) -> (StatusCode, Json<Value>) {
    match state.pairing.validate_token(&body.token).await {
        Ok(Some(pairing)) => (
            StatusCode::OK,
            Json(json!({ "valid": true, "pairing": pairing })),
        ),
        Ok(None) => (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "valid": false, "error": "unknown or revoked token" })),
        ),
        Err(e) => pairing_error(e),
    }
}

async fn revoke_pairing(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> (StatusCode, Json<Value>) {
    match state.pairing.revoke_pairing(&id).await {
        Ok(removed) => {
            let status = if removed {
                StatusCode::OK
            } else {
                StatusCode::NOT_FOUND
            };
            (status, Json(json!({ "removed": removed })))
        }
        Err(e) => pairing_error(e),
    }
}

async fn update_senses(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(patch): Json<HashMap<String, bool>>,
) -> (StatusCode, Json<Value>) {
    match state.pairing.update_senses(&id, patch).await {
        Ok(senses) => (StatusCode::OK, Json(json!({ "senses": senses }))),
        Err(e) => pairing_error(e),
    }
}

fn pairing_error(e: PairingError) -> (StatusCode, Json<Value>) {
    let status = match &e {
        PairingError::NotFound { .. } => StatusCode::NOT_FOUND,
        PairingError::NoAgentConfigured => StatusCode::CONFLICT,
        PairingError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(json!({ "error": e.to_string() })))
}
