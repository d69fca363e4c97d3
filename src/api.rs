//! REST API server for the banking gateway
//!
//! Same tool catalog as the MCP surface, over HTTP. A call to a known tool
//! always answers 200 with the response envelope; the envelope says whether
//! the operation succeeded.

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::envelope::ResponseEnvelope;
use crate::gateway::BankingGateway;
use crate::tools::ToolRegistry;

/// =============================
/// Response Wrapper
/// =============================

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse {
    pub success: bool,
    pub data: Option<Value>,
    pub error: Option<String>,
    pub timestamp: String,
}

impl ApiResponse {
    pub fn success<T: Serialize>(data: T) -> Self {
        Self {
            success: true,
            data: serde_json::to_value(data).ok(),
            error: None,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// =============================
/// API State
/// =============================

#[derive(Clone)]
pub struct ApiState {
    pub gateway: Arc<BankingGateway>,
    pub registry: Arc<ToolRegistry>,
}

/// =============================
/// Health Endpoint
/// =============================

async fn health(State(state): State<ApiState>) -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "session": state.gateway.session_status().await,
        "credentialMode": state.gateway.credential_mode().to_string(),
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

/// =============================
/// Tool Endpoints
/// =============================

async fn list_tools(State(state): State<ApiState>) -> Json<ApiResponse> {
    Json(ApiResponse::success(state.registry.definitions()))
}

async fn call_tool(
    State(state): State<ApiState>,
    Path(name): Path<String>,
    body: Bytes,
) -> Result<Json<ResponseEnvelope>, (StatusCode, Json<ApiResponse>)> {
    let tool = state.registry.get(&name).ok_or_else(|| {
        warn!(tool = %name, "Unknown tool requested");
        (
            StatusCode::NOT_FOUND,
            Json(ApiResponse::error(format!("Unknown tool: {}", name))),
        )
    })?;

    let arguments = if body.iter().all(u8::is_ascii_whitespace) {
        json!({})
    } else {
        serde_json::from_slice::<Value>(&body).map_err(|e| {
            (
                StatusCode::BAD_REQUEST,
                Json(ApiResponse::error(format!("Invalid JSON body: {}", e))),
            )
        })?
    };

    Ok(Json(tool.execute(arguments).await))
}

/// =============================
/// Router
/// =============================

pub fn create_router(gateway: Arc<BankingGateway>, registry: Arc<ToolRegistry>) -> Router {
    let state = ApiState { gateway, registry };

    Router::new()
        .route("/health", get(health))
        .route("/api/tools", get(list_tools))
        .route("/api/tools/:name", post(call_tool))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// =============================
/// Server Startup
/// =============================

pub async fn start_server(
    gateway: Arc<BankingGateway>,
    registry: Arc<ToolRegistry>,
    port: u16,
) -> std::result::Result<(), Box<dyn std::error::Error>> {
    let router = create_router(gateway, registry);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?;

    info!("API Server listening on http://0.0.0.0:{}", port);
    info!("Local: http://127.0.0.1:{}", port);

    axum::serve(listener, router).await?;

    Ok(())
}
