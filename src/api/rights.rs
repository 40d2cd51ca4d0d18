use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use secrecy::ExposeSecret;
use serde::Deserialize;
use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::api::AppState;
use crate::models::access_right::{AccessRight, CreateAccessRightData, SourceType};
use crate::models::access_transaction::AccessTransaction;
use crate::models::event::Event;
use crate::services::ledger::{self, LedgerError};
use crate::services::qr::{self, QrError};

#[derive(Debug)]
pub enum RightsApiError {
    Database(sqlx::Error),
    RightNotFound,
    EventNotFound,
    StatusConflict(String),
    Qr(QrError),
}

impl From<LedgerError> for RightsApiError {
    fn from(e: LedgerError) -> Self {
        match e {
            LedgerError::Database(e) => RightsApiError::Database(e),
            LedgerError::RightNotFound(_) => RightsApiError::RightNotFound,
            LedgerError::StatusConflict(..) => RightsApiError::StatusConflict(e.to_string()),
        }
    }
}

impl IntoResponse for RightsApiError {
    fn into_response(self) -> axum::response::Response {
        let (status, message) = match self {
            RightsApiError::Database(e) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Database error: {}", e),
            ),
            RightsApiError::RightNotFound => {
                (StatusCode::NOT_FOUND, "Access right not found".to_string())
            }
            RightsApiError::EventNotFound => {
                (StatusCode::NOT_FOUND, "Event not found".to_string())
            }
            RightsApiError::StatusConflict(msg) => (StatusCode::CONFLICT, msg),
            RightsApiError::Qr(e) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("QR generation failed: {}", e),
            ),
        };
        (status, message).into_response()
    }
}

#[derive(Debug, Deserialize)]
pub struct IssueRightRequest {
    /// Explicit token from the issuing collaborator; generated when
    /// absent.
    pub token: Option<String>,
    pub source_type: SourceType,
    pub source_id: Uuid,
    pub user_id: Uuid,
    pub event_id: Uuid,
    pub ticket_id: Option<Uuid>,
    pub subscription_id: Option<Uuid>,
    pub valid_from: Option<DateTime<Utc>>,
    pub valid_until: Option<DateTime<Utc>>,
    pub metadata: Option<JsonValue>,
}

#[derive(Debug, Deserialize)]
pub struct TransferRequest {
    pub to_user_id: Uuid,
    pub amount_cents: Option<i64>,
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RefundRequest {
    pub amount_cents: Option<i64>,
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct NotesRequest {
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TierChangeRequest {
    pub upgrade: bool,
    pub amount_cents: Option<i64>,
    pub notes: Option<String>,
    pub metadata: Option<JsonValue>,
}

#[derive(Debug, Deserialize)]
pub struct ListRightsParams {
    pub event_id: Uuid,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/rights", post(issue_right))
        .route("/api/users/:user_id/rights", get(list_user_rights))
        .route("/api/rights/:id", get(get_right))
        .route("/api/rights/:id/history", get(get_history))
        .route("/api/rights/:id/qr", get(get_qr))
        .route("/api/rights/:id/transfer", post(transfer_right))
        .route("/api/rights/:id/resale", post(resell_right))
        .route("/api/rights/:id/refund", post(refund_right))
        .route("/api/rights/:id/cancel", post(cancel_right))
        .route("/api/rights/:id/suspend", post(suspend_right))
        .route("/api/rights/:id/disable", post(disable_right))
        .route("/api/rights/:id/tier", post(change_tier))
}

fn fresh_token() -> String {
    format!("GK-{}", Uuid::new_v4().simple())
}

/// Inbound issuance fact from ticket/subscription/invitation workflows:
/// creates the right ENABLED plus its CREATION ledger row atomically.
async fn issue_right(
    State(state): State<AppState>,
    Json(body): Json<IssueRightRequest>,
) -> Result<impl IntoResponse, RightsApiError> {
    Event::find_by_id(&state.pool, body.event_id)
        .await
        .map_err(RightsApiError::Database)?
        .ok_or(RightsApiError::EventNotFound)?;

    let (right, _creation) = ledger::issue(
        &state.pool,
        CreateAccessRightData {
            token: body.token.unwrap_or_else(fresh_token),
            source_type: body.source_type,
            source_id: body.source_id,
            user_id: body.user_id,
            event_id: body.event_id,
            ticket_id: body.ticket_id,
            subscription_id: body.subscription_id,
            valid_from: body.valid_from,
            valid_until: body.valid_until,
            metadata: body.metadata,
        },
    )
    .await?;

    Ok((StatusCode::CREATED, Json(right)))
}

/// Every right a user holds for one event, newest first. Backs the
/// "my passes" view of the member-facing client.
async fn list_user_rights(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    Query(params): Query<ListRightsParams>,
) -> Result<Json<Vec<AccessRight>>, RightsApiError> {
    let rights = AccessRight::list_by_user_and_event(&state.pool, user_id, params.event_id)
        .await
        .map_err(RightsApiError::Database)?;

    Ok(Json(rights))
}

async fn get_right(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<AccessRight>, RightsApiError> {
    let right = AccessRight::find_by_id(&state.pool, id)
        .await
        .map_err(RightsApiError::Database)?
        .ok_or(RightsApiError::RightNotFound)?;

    Ok(Json(right))
}

/// Full ordered ledger history for one right, for audit reconstruction
/// and dispute resolution.
async fn get_history(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<AccessTransaction>>, RightsApiError> {
    AccessRight::find_by_id(&state.pool, id)
        .await
        .map_err(RightsApiError::Database)?
        .ok_or(RightsApiError::RightNotFound)?;

    let history = AccessTransaction::history_for(&state.pool, id)
        .await
        .map_err(RightsApiError::Database)?;

    Ok(Json(history))
}

/// SVG QR image of the right's signed credential payload.
async fn get_qr(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, RightsApiError> {
    let right = AccessRight::find_by_id(&state.pool, id)
        .await
        .map_err(RightsApiError::Database)?
        .ok_or(RightsApiError::RightNotFound)?;

    let key = state.config.qr_signing_key.expose_secret().as_bytes();
    let payload = qr::signed_payload(&right.token, key).map_err(RightsApiError::Qr)?;
    let image = qr::render_svg(&payload).map_err(RightsApiError::Qr)?;

    Ok(([(header::CONTENT_TYPE, "image/svg+xml")], image))
}

async fn transfer_right(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(body): Json<TransferRequest>,
) -> Result<Json<AccessRight>, RightsApiError> {
    let successor = ledger::transfer(
        &state.pool,
        id,
        body.to_user_id,
        fresh_token(),
        body.amount_cents,
        body.notes,
    )
    .await?;

    Ok(Json(successor))
}

async fn resell_right(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(body): Json<TransferRequest>,
) -> Result<Json<AccessRight>, RightsApiError> {
    let successor = ledger::resale(
        &state.pool,
        id,
        body.to_user_id,
        fresh_token(),
        body.amount_cents,
        body.notes,
    )
    .await?;

    Ok(Json(successor))
}

async fn refund_right(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(body): Json<RefundRequest>,
) -> Result<Json<AccessRight>, RightsApiError> {
    let right = ledger::refund(&state.pool, id, body.amount_cents, body.notes).await?;
    Ok(Json(right))
}

async fn cancel_right(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(body): Json<NotesRequest>,
) -> Result<Json<AccessRight>, RightsApiError> {
    let right = ledger::cancel(&state.pool, id, body.notes).await?;
    Ok(Json(right))
}

async fn suspend_right(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(body): Json<NotesRequest>,
) -> Result<Json<AccessRight>, RightsApiError> {
    let right = ledger::suspend(&state.pool, id, body.notes).await?;
    Ok(Json(right))
}

async fn disable_right(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<AccessRight>, RightsApiError> {
    let right = ledger::disable(&state.pool, id).await?;
    Ok(Json(right))
}

async fn change_tier(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(body): Json<TierChangeRequest>,
) -> Result<Json<AccessTransaction>, RightsApiError> {
    let txn = ledger::record_tier_change(
        &state.pool,
        id,
        body.upgrade,
        body.amount_cents,
        body.notes,
        body.metadata,
    )
    .await?;

    Ok(Json(txn))
}
