use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
};
use secrecy::ExposeSecret;

use crate::api::AppState;

pub const GATE_TOKEN_HEADER: &str = "x-gate-token";

#[derive(Debug)]
pub enum GateAuthError {
    MissingToken,
    InvalidToken,
}

impl IntoResponse for GateAuthError {
    fn into_response(self) -> Response {
        match self {
            GateAuthError::MissingToken => (
                StatusCode::UNAUTHORIZED,
                "Gate token required. Send the X-Gate-Token header.",
            )
                .into_response(),
            GateAuthError::InvalidToken => {
                (StatusCode::UNAUTHORIZED, "Invalid gate token.").into_response()
            }
        }
    }
}

/// Middleware that requires scanner devices to present the shared gate
/// token. When no token is configured (local development), the check is
/// a no-op.
pub async fn require_gate_token(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, GateAuthError> {
    let Some(expected) = &state.config.gate_api_token else {
        return Ok(next.run(request).await);
    };

    let presented = request
        .headers()
        .get(GATE_TOKEN_HEADER)
        .and_then(|value| value.to_str().ok())
        .ok_or(GateAuthError::MissingToken)?;

    if presented != expected.expose_secret() {
        return Err(GateAuthError::InvalidToken);
    }

    Ok(next.run(request).await)
}
