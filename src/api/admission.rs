use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::post,
    Json, Router,
};
use secrecy::ExposeSecret;
use serde::Deserialize;
use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::api::AppState;
use crate::models::access_log::AccessAction;
use crate::services::admission::{self, AdmissionDecision, AdmissionError, ScanRequest};
use crate::services::qr;

#[derive(Debug)]
pub enum ScanApiError {
    AuditLog(AdmissionError),
}

impl IntoResponse for ScanApiError {
    fn into_response(self) -> axum::response::Response {
        match self {
            // The decision aborted because its log row could not be
            // persisted. Fail closed, tell the gate to retry.
            ScanApiError::AuditLog(e) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Admission aborted: {}", e),
            )
                .into_response(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ScanBody {
    /// Raw scanner output: either the bare credential token or the
    /// signed JSON payload from the QR image.
    pub payload: String,
    pub access_point: String,
    pub zone: Option<String>,
    pub action: AccessAction,
    pub device_id: Option<String>,
    pub metadata: Option<JsonValue>,
}

pub fn router() -> Router<AppState> {
    Router::new().route("/api/events/:event_id/scan", post(scan))
}

/// One scan, one decision, one log row. DENIED outcomes are successful
/// HTTP responses: the gate operator needs the reason verbatim, not an
/// error page. Only ERROR outcomes signal a retry.
async fn scan(
    State(state): State<AppState>,
    Path(event_id): Path<Uuid>,
    Json(body): Json<ScanBody>,
) -> Result<impl IntoResponse, ScanApiError> {
    let key = state.config.qr_signing_key.expose_secret().as_bytes();

    // A signed payload with a bad signature yields no token; the raw
    // payload then resolves to nothing and the engine denies INVALID_QR,
    // which also writes the mandatory log row.
    let token = qr::extract_token(&body.payload, key)
        .unwrap_or_else(|| body.payload.trim().to_string());

    let request = ScanRequest {
        token,
        event_id,
        access_point: body.access_point,
        zone: body.zone,
        action: body.action,
        device_id: body.device_id,
        metadata: body.metadata,
    };

    let decision = admission::decide(&state.pool, &request)
        .await
        .map_err(ScanApiError::AuditLog)?;

    let status = match &decision {
        AdmissionDecision::Granted { .. } | AdmissionDecision::Denied { .. } => StatusCode::OK,
        AdmissionDecision::Faulted { .. } => StatusCode::SERVICE_UNAVAILABLE,
    };

    Ok((status, Json(decision)))
}
