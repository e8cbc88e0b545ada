use axum::{
    extract::{Query, State},
    http::{header, Method, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use hyper::Server;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::io::ErrorKind;
use std::net::SocketAddr;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info, warn};

use crate::config::Config;
use crate::constants;
use crate::error::MergeError;
use crate::observability::metrics;
use crate::pipeline::ingestion::read_table;
use crate::pipeline::Pipeline;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
}

/// JSON error body `{"error": ...}` with the status matching the error class
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.into(),
        }
    }
}

impl From<MergeError> for ApiError {
    fn from(e: MergeError) -> Self {
        match &e {
            MergeError::Io(io) if io.kind() == ErrorKind::NotFound => Self::not_found("File not found"),
            MergeError::Config(_) => Self::bad_request(e.to_string()),
            _ => Self::internal(e.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            error!("{}", self.message);
        }
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

#[derive(Debug, Deserialize)]
pub struct DatasetQuery {
    dataset: Option<String>,
}

/// Health check endpoint
async fn health() -> impl IntoResponse {
    Json(json!({
        "status": "healthy",
        "service": "listing-merge",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// A source or merged table as an array of row objects
async fn dataset(
    State(state): State<AppState>,
    Query(query): Query<DatasetQuery>,
) -> Result<Json<Vec<Value>>, ApiError> {
    let name = query
        .dataset
        .unwrap_or_else(|| constants::GOOGLE_SOURCE.to_string());
    let (path, delimiter, escape) = state
        .config
        .dataset_location(&name)
        .ok_or_else(|| {
            ApiError::bad_request(format!(
                "Invalid dataset type, expected one of {:?}",
                constants::get_supported_datasets()
            ))
        })?;
    info!("Loading dataset from: {}", path.display());

    let table = tokio::task::spawn_blocking(move || read_table(&path, delimiter, escape))
        .await
        .map_err(|e| ApiError::internal(e.to_string()))??;

    let rows = table
        .rows
        .into_iter()
        .map(|row| {
            let object: Map<String, Value> = table
                .headers
                .iter()
                .cloned()
                .zip(row.into_iter().map(Value::String))
                .collect();
            Value::Object(object)
        })
        .collect();
    Ok(Json(rows))
}

/// Run the merge end to end
async fn merge(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let report = Pipeline::run(state.config.clone())
        .await
        .map_err(|e| ApiError::internal(e.to_string()))?;
    Ok(Json(json!({
        "message": format!(
            "Merged dataset saved as: {} ({} records)",
            report.output.display(),
            report.stats.output_records
        ),
        "run_id": report.run_id,
    })))
}

/// The configured JSON document, unchanged
async fn static_json(State(state): State<AppState>) -> Result<Response, ApiError> {
    let path = state.config.static_json_file.clone();
    let body = match tokio::fs::read_to_string(&path).await {
        Ok(body) => body,
        Err(e) if e.kind() == ErrorKind::NotFound => return Err(ApiError::not_found("File not found")),
        Err(e) => return Err(ApiError::internal(e.to_string())),
    };
    if let Err(e) = serde_json::from_str::<Value>(&body) {
        warn!("{} is not valid JSON: {}", path.display(), e);
        return Err(ApiError::internal(e.to_string()));
    }
    Ok(([(header::CONTENT_TYPE, "application/json")], body).into_response())
}

async fn metrics_text() -> Response {
    match metrics::render() {
        Some(body) => ([(header::CONTENT_TYPE, "text/plain; version=0.0.4")], body).into_response(),
        None => (StatusCode::SERVICE_UNAVAILABLE, "metrics recorder not installed").into_response(),
    }
}

/// Create the HTTP server with all routes
pub fn create_server(config: Arc<Config>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .route("/dataset", get(dataset))
        .route("/merge", post(merge))
        .route("/static-json", get(static_json))
        .route("/metrics", get(metrics_text))
        .with_state(AppState { config })
        .layer(ServiceBuilder::new().layer(cors))
}

/// Start the HTTP server on the configured port
pub async fn start_server(config: Arc<Config>) -> anyhow::Result<()> {
    let port = config.server.port;
    let app = create_server(config);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));

    info!("🚀 HTTP server running on http://localhost:{port}");
    info!("💚 Health check: http://localhost:{port}/health");

    Server::bind(&addr).serve(app.into_make_service()).await?;

    Ok(())
}
