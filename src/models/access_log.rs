use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use sqlx::{FromRow, PgConnection, PgPool};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(type_name = "access_action", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AccessAction {
    Entry,
    Exit,
    ReEntry,
    ZoneChange,
    Validation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(type_name = "scan_status", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ScanStatus {
    Success,
    Denied,
    Warning,
    Error,
}

/// Closed set of denial reasons. A DENIED log row carries exactly one of
/// these; SUCCESS/ERROR rows carry none.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(type_name = "denial_reason", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DenialReason {
    InvalidQr,
    AlreadyUsed,
    Expired,
    WrongEvent,
    WrongZone,
    WrongTime,
    Blacklisted,
    TechnicalError,
    InsufficientRights,
    CapacityFull,
}

impl DenialReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DenialReason::InvalidQr => "INVALID_QR",
            DenialReason::AlreadyUsed => "ALREADY_USED",
            DenialReason::Expired => "EXPIRED",
            DenialReason::WrongEvent => "WRONG_EVENT",
            DenialReason::WrongZone => "WRONG_ZONE",
            DenialReason::WrongTime => "WRONG_TIME",
            DenialReason::Blacklisted => "BLACKLISTED",
            DenialReason::TechnicalError => "TECHNICAL_ERROR",
            DenialReason::InsufficientRights => "INSUFFICIENT_RIGHTS",
            DenialReason::CapacityFull => "CAPACITY_FULL",
        }
    }
}

/// One admission decision, immutable once written. Every scan produces
/// exactly one row regardless of outcome; the log is the complete record
/// of what was decided.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct AccessControlLogEntry {
    pub id: Uuid,
    pub event_id: Uuid,
    pub user_id: Option<Uuid>, // unknown until the right resolves
    pub access_right_id: Option<Uuid>,
    pub ticket_id: Option<Uuid>,
    pub access_point: String,
    pub zone: Option<String>,
    pub action: AccessAction,
    pub status: ScanStatus,
    pub denial_reason: Option<DenialReason>,
    pub metadata: Option<JsonValue>,
    pub scanned_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordLogEntryData {
    pub event_id: Uuid,
    pub user_id: Option<Uuid>,
    pub access_right_id: Option<Uuid>,
    pub ticket_id: Option<Uuid>,
    pub access_point: String,
    pub zone: Option<String>,
    pub action: AccessAction,
    pub status: ScanStatus,
    pub denial_reason: Option<DenialReason>,
    pub metadata: Option<JsonValue>,
}

impl AccessControlLogEntry {
    /// Appends one decision row. Callers treat a failure here as fatal to
    /// the whole admission decision: entry never proceeds unlogged.
    pub async fn record(
        conn: &mut PgConnection,
        data: RecordLogEntryData,
    ) -> Result<Self, sqlx::Error> {
        debug_assert_eq!(
            data.status == ScanStatus::Denied,
            data.denial_reason.is_some(),
            "denial_reason present iff status is DENIED"
        );

        let entry = sqlx::query_as::<_, Self>(
            r#"
            INSERT INTO access_control_log
                (event_id, user_id, access_right_id, ticket_id, access_point,
                 zone, action, status, denial_reason, metadata)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING *
            "#,
        )
        .bind(data.event_id)
        .bind(data.user_id)
        .bind(data.access_right_id)
        .bind(data.ticket_id)
        .bind(&data.access_point)
        .bind(&data.zone)
        .bind(data.action)
        .bind(data.status)
        .bind(data.denial_reason)
        .bind(data.metadata)
        .fetch_one(conn)
        .await?;

        Ok(entry)
    }

    pub async fn query_by_event(
        pool: &PgPool,
        event_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Self>, sqlx::Error> {
        let entries = sqlx::query_as::<_, Self>(
            r#"
            SELECT * FROM access_control_log
            WHERE event_id = $1
            ORDER BY scanned_at DESC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(event_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(pool)
        .await?;

        Ok(entries)
    }

    pub async fn query_by_user(
        pool: &PgPool,
        user_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Self>, sqlx::Error> {
        let entries = sqlx::query_as::<_, Self>(
            r#"
            SELECT * FROM access_control_log
            WHERE user_id = $1
            ORDER BY scanned_at DESC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(user_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(pool)
        .await?;

        Ok(entries)
    }

    pub async fn query_by_window(
        pool: &PgPool,
        event_id: Uuid,
        from: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<Vec<Self>, sqlx::Error> {
        let entries = sqlx::query_as::<_, Self>(
            r#"
            SELECT * FROM access_control_log
            WHERE event_id = $1 AND scanned_at >= $2 AND scanned_at < $3
            ORDER BY scanned_at ASC
            "#,
        )
        .bind(event_id)
        .bind(from)
        .bind(until)
        .fetch_all(pool)
        .await?;

        Ok(entries)
    }

    /// Count of decisions for an event, optionally filtered by status.
    pub async fn count_by_event(
        pool: &PgPool,
        event_id: Uuid,
        status: Option<ScanStatus>,
    ) -> Result<i64, sqlx::Error> {
        let count = if let Some(status) = status {
            sqlx::query_scalar::<_, i64>(
                r#"
                SELECT COUNT(*) FROM access_control_log
                WHERE event_id = $1 AND status = $2
                "#,
            )
            .bind(event_id)
            .bind(status)
            .fetch_one(pool)
            .await?
        } else {
            sqlx::query_scalar::<_, i64>(
                r#"
                SELECT COUNT(*) FROM access_control_log
                WHERE event_id = $1
                "#,
            )
            .bind(event_id)
            .fetch_one(pool)
            .await?
        };

        Ok(count)
    }

    /// Current admitted count for one zone of an event. Entries,
    /// re-entries and zone changes into the zone count up; exits count
    /// down, as do zone changes away from it (their origin zone is kept
    /// in the row's `from_zone` metadata). A zone change within the same
    /// zone is net zero. Feeds the capacity check.
    pub async fn zone_occupancy(
        conn: &mut PgConnection,
        event_id: Uuid,
        zone: &str,
    ) -> Result<i64, sqlx::Error> {
        let count = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COALESCE(SUM(
                CASE
                    WHEN action = $3 THEN -1
                    WHEN action = $4 AND metadata->>'from_zone' = $2
                         AND zone IS DISTINCT FROM $2 THEN -1
                    WHEN action = $4 AND metadata->>'from_zone' = $2 THEN 0
                    ELSE 1
                END
            ), 0)
            FROM access_control_log
            WHERE event_id = $1 AND status = $5
              AND (
                  (zone = $2 AND action IN ($6, $7, $4, $3))
                  OR (action = $4 AND metadata->>'from_zone' = $2)
              )
            "#,
        )
        .bind(event_id)
        .bind(zone)
        .bind(AccessAction::Exit)
        .bind(AccessAction::ZoneChange)
        .bind(ScanStatus::Success)
        .bind(AccessAction::Entry)
        .bind(AccessAction::ReEntry)
        .fetch_one(conn)
        .await?;

        Ok(count)
    }

    /// Zone the right was last successfully admitted into, read from the
    /// newest SUCCESS row that carries a zone. `None` when the patron was
    /// never placed in a zone.
    pub async fn last_zone_for_right(
        conn: &mut PgConnection,
        event_id: Uuid,
        access_right_id: Uuid,
    ) -> Result<Option<String>, sqlx::Error> {
        let zone = sqlx::query_scalar::<_, String>(
            r#"
            SELECT zone FROM access_control_log
            WHERE event_id = $1 AND access_right_id = $2 AND status = $3
              AND action IN ($4, $5, $6) AND zone IS NOT NULL
            ORDER BY scanned_at DESC
            LIMIT 1
            "#,
        )
        .bind(event_id)
        .bind(access_right_id)
        .bind(ScanStatus::Success)
        .bind(AccessAction::Entry)
        .bind(AccessAction::ReEntry)
        .bind(AccessAction::ZoneChange)
        .fetch_optional(conn)
        .await?;

        Ok(zone)
    }

    /// Distinct rights successfully admitted to an event, for the
    /// occupancy summary consumed by analytics.
    pub async fn count_admitted(pool: &PgPool, event_id: Uuid) -> Result<i64, sqlx::Error> {
        let count = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(DISTINCT access_right_id)
            FROM access_control_log
            WHERE event_id = $1 AND status = $2 AND action IN ($3, $4)
              AND access_right_id IS NOT NULL
            "#,
        )
        .bind(event_id)
        .bind(ScanStatus::Success)
        .bind(AccessAction::Entry)
        .bind(AccessAction::ReEntry)
        .fetch_one(pool)
        .await?;

        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn denial_reason_spelling_matches_wire_format() {
        let json = serde_json::to_string(&DenialReason::InvalidQr).unwrap();
        assert_eq!(json, r#""INVALID_QR""#);
        let json = serde_json::to_string(&DenialReason::AlreadyUsed).unwrap();
        assert_eq!(json, r#""ALREADY_USED""#);
        let json = serde_json::to_string(&DenialReason::CapacityFull).unwrap();
        assert_eq!(json, r#""CAPACITY_FULL""#);
    }

    #[test]
    fn action_spelling_matches_wire_format() {
        let json = serde_json::to_string(&AccessAction::ReEntry).unwrap();
        assert_eq!(json, r#""RE_ENTRY""#);
        let json = serde_json::to_string(&AccessAction::ZoneChange).unwrap();
        assert_eq!(json, r#""ZONE_CHANGE""#);
    }

    #[test]
    fn as_str_agrees_with_serde() {
        for reason in [
            DenialReason::InvalidQr,
            DenialReason::AlreadyUsed,
            DenialReason::Expired,
            DenialReason::WrongEvent,
            DenialReason::WrongZone,
            DenialReason::WrongTime,
            DenialReason::Blacklisted,
            DenialReason::TechnicalError,
            DenialReason::InsufficientRights,
            DenialReason::CapacityFull,
        ] {
            let json = serde_json::to_string(&reason).unwrap();
            assert_eq!(json, format!(r#""{}""#, reason.as_str()));
        }
    }
}
