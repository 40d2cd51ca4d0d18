use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::AppState;
use crate::models::access_log::{AccessControlLogEntry, ScanStatus};
use crate::models::access_transaction::AccessTransaction;

#[derive(Debug)]
pub enum LogsApiError {
    Database(sqlx::Error),
}

impl IntoResponse for LogsApiError {
    fn into_response(self) -> axum::response::Response {
        match self {
            LogsApiError::Database(e) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Database error: {}", e),
            )
                .into_response(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct PaginationParams {
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}

impl PaginationParams {
    fn limits(&self) -> (i64, i64) {
        let per_page = self.per_page.unwrap_or(50).clamp(1, 500);
        let page = self.page.unwrap_or(1).max(1);
        (per_page, (page - 1) * per_page)
    }
}

#[derive(Debug, Deserialize)]
pub struct WindowParams {
    pub from: DateTime<Utc>,
    pub until: DateTime<Utc>,
}

/// Occupancy summary for the analytics collaborator.
#[derive(Debug, Serialize)]
pub struct OccupancySummary {
    pub event_id: Uuid,
    pub total_decisions: i64,
    pub successful: i64,
    pub denied: i64,
    pub admitted_rights: i64,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/events/:event_id/access-log", get(list_by_event))
        .route("/api/events/:event_id/access-log/window", get(list_by_window))
        .route("/api/events/:event_id/occupancy", get(occupancy))
        .route("/api/users/:user_id/access-log", get(list_by_user))
        .route("/api/transactions", get(list_transactions))
}

async fn list_by_event(
    State(state): State<AppState>,
    Path(event_id): Path<Uuid>,
    Query(params): Query<PaginationParams>,
) -> Result<Json<Vec<AccessControlLogEntry>>, LogsApiError> {
    let (limit, offset) = params.limits();
    let entries = AccessControlLogEntry::query_by_event(&state.pool, event_id, limit, offset)
        .await
        .map_err(LogsApiError::Database)?;

    Ok(Json(entries))
}

async fn list_by_user(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    Query(params): Query<PaginationParams>,
) -> Result<Json<Vec<AccessControlLogEntry>>, LogsApiError> {
    let (limit, offset) = params.limits();
    let entries = AccessControlLogEntry::query_by_user(&state.pool, user_id, limit, offset)
        .await
        .map_err(LogsApiError::Database)?;

    Ok(Json(entries))
}

async fn list_by_window(
    State(state): State<AppState>,
    Path(event_id): Path<Uuid>,
    Query(params): Query<WindowParams>,
) -> Result<Json<Vec<AccessControlLogEntry>>, LogsApiError> {
    let entries =
        AccessControlLogEntry::query_by_window(&state.pool, event_id, params.from, params.until)
            .await
            .map_err(LogsApiError::Database)?;

    Ok(Json(entries))
}

async fn occupancy(
    State(state): State<AppState>,
    Path(event_id): Path<Uuid>,
) -> Result<Json<OccupancySummary>, LogsApiError> {
    let total = AccessControlLogEntry::count_by_event(&state.pool, event_id, None)
        .await
        .map_err(LogsApiError::Database)?;
    let successful =
        AccessControlLogEntry::count_by_event(&state.pool, event_id, Some(ScanStatus::Success))
            .await
            .map_err(LogsApiError::Database)?;
    let denied =
        AccessControlLogEntry::count_by_event(&state.pool, event_id, Some(ScanStatus::Denied))
            .await
            .map_err(LogsApiError::Database)?;
    let admitted = AccessControlLogEntry::count_admitted(&state.pool, event_id)
        .await
        .map_err(LogsApiError::Database)?;

    Ok(Json(OccupancySummary {
        event_id,
        total_decisions: total,
        successful,
        denied,
        admitted_rights: admitted,
    }))
}

/// Outbound ledger stream for payments/refund workflows.
async fn list_transactions(
    State(state): State<AppState>,
    Query(params): Query<PaginationParams>,
) -> Result<Json<Vec<AccessTransaction>>, LogsApiError> {
    let (limit, offset) = params.limits();
    let txns = AccessTransaction::list_recent(&state.pool, limit, offset)
        .await
        .map_err(LogsApiError::Database)?;

    Ok(Json(txns))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pagination_defaults() {
        let params = PaginationParams {
            page: None,
            per_page: None,
        };
        assert_eq!(params.limits(), (50, 0));
    }

    #[test]
    fn pagination_clamps() {
        let params = PaginationParams {
            page: Some(0),
            per_page: Some(10_000),
        };
        assert_eq!(params.limits(), (500, 0));

        let params = PaginationParams {
            page: Some(3),
            per_page: Some(20),
        };
        assert_eq!(params.limits(), (20, 40));
    }
}
