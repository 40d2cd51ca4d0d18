use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use uuid::Uuid;

use crate::api::AppState;
use crate::error::AppError;
use crate::models::event::{CreateEventData, Event};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/events", post(create_event).get(list_events))
        .route("/api/events/:event_id", get(get_event))
}

/// Inbound event definition fact from the event/venue CRUD collaborator:
/// scope ids, admission policy flags and the zone capacity map.
async fn create_event(
    State(state): State<AppState>,
    Json(body): Json<CreateEventData>,
) -> Result<impl IntoResponse, AppError> {
    if body.name.trim().is_empty() {
        return Err(AppError::Validation("Event name is required".to_string()));
    }

    let event = Event::create(&state.pool, body).await?;

    Ok((StatusCode::CREATED, Json(event)))
}

async fn get_event(
    State(state): State<AppState>,
    Path(event_id): Path<Uuid>,
) -> Result<Json<Event>, AppError> {
    let event = Event::find_by_id(&state.pool, event_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Event {}", event_id)))?;

    Ok(Json(event))
}

async fn list_events(State(state): State<AppState>) -> Result<Json<Vec<Event>>, AppError> {
    let events = Event::list_active(&state.pool).await?;

    Ok(Json(events))
}
