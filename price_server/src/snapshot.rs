//! Pull-based snapshot endpoint.
//!
//! An axum router served on its own single-threaded tokio runtime, so the rest of
//! the server keeps its thread-per-connection model. `SnapshotServer::new` binds
//! synchronously, which lets `PriceServer::start` report the bound address before
//! the runtime thread is spawned.
//!
//! Routes:
//! - `GET /` — service banner
//! - `GET /health`, `GET /api/health` — `{"status":"ok"}`
//! - `GET /prices/{symbol}`, `GET /api/prices/{symbol}` — `PriceSnapshot`
//!
//! Errors are JSON `{"detail": ...}` bodies: 400 for an invalid symbol, 404 for
//! unknown paths.

use std::net::{SocketAddr, TcpListener};
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use log::{debug, info};
use price_common::{PriceError, PriceSnapshot, Result, Symbol};
use serde_json::{Value, json};
use tower_http::cors::CorsLayer;

use crate::model::price_store::PriceStore;

/// JSON error response.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    detail: String,
}

impl ApiError {
    fn not_found() -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            detail: "Not Found".to_string(),
        }
    }
}

impl From<PriceError> for ApiError {
    fn from(err: PriceError) -> Self {
        let status = match err {
            PriceError::InvalidSymbol(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self {
            status,
            detail: err.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "detail": self.detail }))).into_response()
    }
}

/// Router with every snapshot route, backed by `store`.
pub fn router(store: Arc<PriceStore>) -> Router {
    Router::new()
        .route("/", get(banner))
        .route("/health", get(health))
        .route("/api/health", get(health))
        .route("/prices/{symbol}", get(price))
        .route("/api/prices/{symbol}", get(price))
        .fallback(not_found)
        .layer(CorsLayer::permissive())
        .with_state(store)
}

async fn banner() -> Json<Value> {
    Json(json!({
        "message": "Price fan-out server",
        "status": "running"
    }))
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

async fn price(
    State(store): State<Arc<PriceStore>>,
    Path(raw): Path<String>,
) -> std::result::Result<Json<PriceSnapshot>, ApiError> {
    let symbol = Symbol::new(&raw)?;
    let snapshot = store.snapshot(&symbol)?;
    debug!("Snapshot {} -> {:.2}", snapshot.symbol, snapshot.price);
    Ok(Json(snapshot))
}

async fn not_found() -> ApiError {
    ApiError::not_found()
}

/// HTTP listener serving price snapshots.
pub struct SnapshotServer {
    listener: TcpListener,
}

impl SnapshotServer {
    /// Bind to `bind_addr`.
    pub fn new(bind_addr: &str) -> Result<Self> {
        let listener = TcpListener::bind(bind_addr)?;
        listener.set_nonblocking(true)?;
        Ok(Self { listener })
    }

    /// Address the listener is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Run the router on a current-thread runtime. Blocks the calling thread.
    pub fn serve(self, store: Arc<PriceStore>) -> Result<()> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        runtime.block_on(serve_router(self.listener, store))
    }
}

async fn serve_router(listener: TcpListener, store: Arc<PriceStore>) -> Result<()> {
    let listener = tokio::net::TcpListener::from_std(listener)?;
    info!("Snapshot HTTP server is started on {}", listener.local_addr()?);
    axum::serve(listener, router(store)).await?;
    Ok(())
}
