//! HTTP server answering activity predictions.
//!
//! This module provides an HTTP server that:
//! - Loads a trained model (and optional range file) once at startup
//! - Classifies ready-made feature vectors via POST /classify
//! - Classifies raw sample windows via POST /classify/window
//!
//! # Architecture
//!
//! ```text
//! client ──→ POST /classify/window ──→ FeatureExtractor ──→ [scaler] ──→ SVM
//!        ──→ POST /classify ─────────────────────────────→ [scaler] ──→ SVM
//! ```

use crate::classifier::{InferenceService, LinfaSvm, Prediction};
use crate::core::windowing::Window;
use crate::error::PipelineError;
use crate::source::SensorSample;
use crate::stats::StatsSnapshot;
use axum::{
    extract::State,
    http::{HeaderValue, StatusCode},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Port to bind to (0 for random)
    pub port: u16,
    /// Trained model file
    pub model_path: PathBuf,
    /// Range file of the scaler used at training time
    pub scaler_path: Option<PathBuf>,
}

impl ServerConfig {
    /// Create a new server configuration
    pub fn new(port: u16, model_path: PathBuf) -> Self {
        Self {
            port,
            model_path,
            scaler_path: None,
        }
    }

    pub fn with_scaler(mut self, scaler_path: PathBuf) -> Self {
        self.scaler_path = Some(scaler_path);
        self
    }
}

/// Shared server state
pub struct ServerState {
    service: InferenceService<LinfaSvm>,
}

impl ServerState {
    pub fn new(service: InferenceService<LinfaSvm>) -> Self {
        Self { service }
    }

    /// Load the model named by the configuration.
    pub fn load(config: &ServerConfig) -> crate::error::Result<Self> {
        let service = InferenceService::load(
            LinfaSvm::new(),
            &config.model_path,
            config.scaler_path.as_deref(),
        )?;
        Ok(Self::new(service))
    }
}

/// Feature vector to classify
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifyRequest {
    pub features: Vec<f64>,
}

/// Raw samples forming one window
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WindowRequest {
    pub samples: Vec<SensorSample>,
}

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub classes: Vec<i32>,
    pub scaled: bool,
}

/// Error response
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn api_error(err: PipelineError) -> ApiError {
    let (status, code) = match &err {
        PipelineError::DimensionMismatch { .. } => (StatusCode::BAD_REQUEST, "DIMENSION_MISMATCH"),
        PipelineError::InsufficientData(_) => (StatusCode::BAD_REQUEST, "EMPTY_WINDOW"),
        _ => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
    };
    tracing::debug!(error = %err, code, "request rejected");
    (
        status,
        Json(ErrorResponse {
            error: err.to_string(),
            code: code.to_string(),
        }),
    )
}

/// GET /health
async fn health(State(state): State<Arc<ServerState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        classes: state.service.model().classes.clone(),
        scaled: state.service.is_scaled(),
    })
}

/// GET /stats
async fn stats(State(state): State<Arc<ServerState>>) -> Json<StatsSnapshot> {
    Json(state.service.stats().snapshot())
}

/// POST /classify
///
/// Accepts an unscaled feature vector in schema order.
async fn classify(
    State(state): State<Arc<ServerState>>,
    Json(request): Json<ClassifyRequest>,
) -> Result<Json<Prediction>, ApiError> {
    state
        .service
        .classify_features(&request.features)
        .map(Json)
        .map_err(api_error)
}

/// POST /classify/window
///
/// The whole sample list is treated as a single window.
async fn classify_window(
    State(state): State<Arc<ServerState>>,
    Json(request): Json<WindowRequest>,
) -> Result<Json<Prediction>, ApiError> {
    let window = Window::new(0, &request.samples);
    state
        .service
        .classify_window(&window)
        .map(Json)
        .map_err(api_error)
}

/// Build the router around a ready state.
pub fn router(state: Arc<ServerState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/stats", get(stats))
        .route("/classify", post(classify))
        .route("/classify/window", post(classify_window))
        .layer(
            CorsLayer::new()
                .allow_origin([
                    HeaderValue::from_static("http://localhost"),
                    HeaderValue::from_static("http://127.0.0.1"),
                ])
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

/// Run the HTTP server
pub async fn run(
    config: ServerConfig,
) -> anyhow::Result<(SocketAddr, tokio::sync::oneshot::Sender<()>)> {
    let state = Arc::new(ServerState::load(&config)?);
    let app = router(state);

    let addr = SocketAddr::from(([127, 0, 0, 1], config.port));
    let listener = TcpListener::bind(addr).await?;
    let actual_addr = listener.local_addr()?;

    tracing::info!("Activity classifier listening on http://{}", actual_addr);

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
                tracing::info!("Server shutdown signal received");
            })
            .await
        {
            tracing::error!("Server error: {}", e);
        }
    });

    Ok((actual_addr, shutdown_tx))
}
