use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(type_name = "blacklist_type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BlacklistType {
    User,
    Email,
    Phone,
    Ip,
    Device,
    Card,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(type_name = "blacklist_scope", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BlacklistScope {
    Event,
    Venue,
    Club,
    Global,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(type_name = "blacklist_severity", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(type_name = "appeal_status", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AppealStatus {
    None,
    Pending,
    Approved,
    Rejected,
}

/// Veto record authored by the administrative surface; this core only
/// reads them.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct BlacklistEntry {
    pub id: Uuid,
    pub blacklist_type: BlacklistType,
    pub identifier: String,
    pub scope: BlacklistScope,
    pub scope_id: Option<Uuid>,
    pub starts_at: Option<DateTime<Utc>>,
    pub ends_at: Option<DateTime<Utc>>,
    pub is_active: bool,
    pub severity: Severity,
    pub appeal_status: AppealStatus,
    pub created_at: DateTime<Utc>,
}

impl BlacklistEntry {
    /// Finds one active entry matching an identifier within the given
    /// scope at `now`. GLOBAL entries always match; EVENT/VENUE/CLUB
    /// entries match only when `scope_id` equals the relevant id. Bounded
    /// active windows must contain `now`.
    pub async fn find_active_matching(
        pool: &PgPool,
        blacklist_type: BlacklistType,
        identifier: &str,
        event_id: Uuid,
        venue_id: Option<Uuid>,
        club_id: Option<Uuid>,
        now: DateTime<Utc>,
    ) -> Result<Option<Self>, sqlx::Error> {
        let entry = sqlx::query_as::<_, Self>(
            r#"
            SELECT * FROM blacklist_entries
            WHERE blacklist_type = $1
              AND identifier = $2
              AND is_active
              AND (starts_at IS NULL OR starts_at <= $3)
              AND (ends_at IS NULL OR ends_at >= $3)
              AND (
                    scope = $4
                 OR (scope = $5 AND scope_id = $6)
                 OR (scope = $7 AND scope_id = $8)
                 OR (scope = $9 AND scope_id = $10)
              )
            LIMIT 1
            "#,
        )
        .bind(blacklist_type)
        .bind(identifier)
        .bind(now)
        .bind(BlacklistScope::Global)
        .bind(BlacklistScope::Event)
        .bind(event_id)
        .bind(BlacklistScope::Venue)
        .bind(venue_id)
        .bind(BlacklistScope::Club)
        .bind(club_id)
        .fetch_optional(pool)
        .await?;

        Ok(entry)
    }
}
