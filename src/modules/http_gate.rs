use crate::gate::condition::ConditionSpec;
use crate::gate::content::{Denial, GateDecision, PageRef, ProtectedContentGate};
use crate::gate::engine::CheckResponse;
use crate::gate::error::{GateError, PayloadError};
use crate::gate::store::FsPageStore;
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Server state shared with gate endpoints
pub struct GateApiState {
    pub gate: Arc<ProtectedContentGate>,
    pub pages: Arc<FsPageStore>,
}

/// Body of POST /gate/check
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckRequest {
    pub account: Option<String>,
    pub conditions: serde_json::Value,
}

/// Body of POST /gate/content and POST /gate/retry
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentRequest {
    pub account: Option<String>,
    pub site: String,
    pub page: String,
    pub slug: Option<String>,
}

impl ContentRequest {
    fn page_ref(&self) -> PageRef {
        PageRef {
            site: self.site.clone(),
            page: self.page.clone(),
            slug: self.slug.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum ContentResponse {
    Granted { payload: serde_json::Value },
    NeedsWallet,
    Denied { denial: Denial },
    PartiallyUnknown { denial: Denial, retryable: bool },
}

impl From<GateDecision> for ContentResponse {
    fn from(decision: GateDecision) -> Self {
        match decision {
            GateDecision::Granted { payload, .. } => ContentResponse::Granted {
                payload: payload.body,
            },
            GateDecision::NeedsWallet => ContentResponse::NeedsWallet,
            GateDecision::Denied(denial) => ContentResponse::Denied { denial },
            GateDecision::PartiallyUnknown(denial) => ContentResponse::PartiallyUnknown {
                denial,
                retryable: true,
            },
        }
    }
}

impl ContentResponse {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ContentResponse::Granted { .. } => StatusCode::OK,
            ContentResponse::NeedsWallet => StatusCode::UNAUTHORIZED,
            ContentResponse::Denied { .. } => StatusCode::FORBIDDEN,
            ContentResponse::PartiallyUnknown { .. } => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

impl IntoResponse for ContentResponse {
    fn into_response(self) -> Response {
        (self.status_code(), Json(self)).into_response()
    }
}

/// Error response for gate failures
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

impl ErrorResponse {
    pub fn status_code(&self) -> StatusCode {
        match self.error.as_str() {
            "invalid_request" | "invalid_condition_spec" => StatusCode::BAD_REQUEST,
            "not_found" => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ErrorResponse {
    fn into_response(self) -> Response {
        (self.status_code(), Json(self)).into_response()
    }
}

impl From<GateError> for ErrorResponse {
    fn from(e: GateError) -> Self {
        match e {
            GateError::InvalidAccount(_) => ErrorResponse {
                error: "invalid_request".to_string(),
                message: e.to_string(),
            },
            GateError::InvalidConditionSpec(_) => ErrorResponse {
                error: "invalid_condition_spec".to_string(),
                message: e.to_string(),
            },
            GateError::Payload(inner) => inner.into(),
        }
    }
}

impl From<PayloadError> for ErrorResponse {
    fn from(e: PayloadError) -> Self {
        match e {
            PayloadError::NotFound(_) => ErrorResponse {
                error: "not_found".to_string(),
                message: e.to_string(),
            },
            PayloadError::InvalidPath(_) => ErrorResponse {
                error: "invalid_request".to_string(),
                message: e.to_string(),
            },
            PayloadError::Spec(_) => {
                error!("page has invalid conditions: {}", e);
                ErrorResponse {
                    error: "invalid_condition_spec".to_string(),
                    message: e.to_string(),
                }
            }
            PayloadError::Io(_) | PayloadError::Parse(_) => {
                error!("page store failure: {}", e);
                ErrorResponse {
                    error: "internal_error".to_string(),
                    message: "Failed to load page".to_string(),
                }
            }
        }
    }
}

/// Conditions check endpoint handler
/// POST /gate/check
pub async fn check_handler(
    State(state): State<Arc<GateApiState>>,
    Json(payload): Json<CheckRequest>,
) -> Result<Json<CheckResponse>, ErrorResponse> {
    let spec = ConditionSpec::from_value(&payload.conditions).map_err(|e| {
        warn!("rejected condition spec: {}", e);
        ErrorResponse::from(GateError::from(e))
    })?;

    let response = state
        .gate
        .engine()
        .check_conditions(payload.account.as_deref(), Arc::new(spec))
        .await?;
    Ok(Json(response))
}

/// Gated content endpoint handler
/// POST /gate/content
pub async fn content_handler(
    State(state): State<Arc<GateApiState>>,
    Json(payload): Json<ContentRequest>,
) -> Result<ContentResponse, ErrorResponse> {
    let page = payload.page_ref();
    info!("content request for {}", page);

    let spec = state.pages.load_conditions(&page).await?;
    let decision = state
        .gate
        .open(payload.account.as_deref(), spec, &page)
        .await?;
    Ok(decision.into())
}

/// Retry endpoint handler; discards the cached verdict first
/// POST /gate/retry
pub async fn retry_handler(
    State(state): State<Arc<GateApiState>>,
    Json(payload): Json<ContentRequest>,
) -> Result<ContentResponse, ErrorResponse> {
    let page = payload.page_ref();
    info!("retry request for {}", page);

    let spec = state.pages.load_conditions(&page).await?;
    let decision = state
        .gate
        .retry(payload.account.as_deref(), spec, &page)
        .await?;
    Ok(decision.into())
}

pub async fn health_handler() -> &'static str {
    "ok"
}

pub fn router(state: Arc<GateApiState>) -> Router {
    Router::new()
        .route("/healthz", get(health_handler))
        .route("/gate/check", post(check_handler))
        .route("/gate/content", post(content_handler))
        .route("/gate/retry", post(retry_handler))
        .with_state(state)
}
