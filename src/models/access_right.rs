use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use sqlx::{FromRow, PgConnection, PgPool};
use uuid::Uuid;

/// Lifecycle status of an access right.
///
/// ENABLED is the only state from which a first ENTRY may succeed; all
/// other states are terminal for admission except USED, from which
/// RE_ENTRY/EXIT/ZONE_CHANGE flows may still be allowed by event policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(type_name = "access_right_status", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AccessRightStatus {
    Enabled,
    Used,
    Transferred,
    Cancelled,
    Suspended,
    Expired,
    Disabled,
}

impl AccessRightStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccessRightStatus::Enabled => "ENABLED",
            AccessRightStatus::Used => "USED",
            AccessRightStatus::Transferred => "TRANSFERRED",
            AccessRightStatus::Cancelled => "CANCELLED",
            AccessRightStatus::Suspended => "SUSPENDED",
            AccessRightStatus::Expired => "EXPIRED",
            AccessRightStatus::Disabled => "DISABLED",
        }
    }
}

/// What originally granted the right.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(type_name = "access_source_type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SourceType {
    Subscription,
    Ticket,
    Invitation,
    Staff,
    Press,
    Vip,
    Transfer,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct AccessRight {
    pub id: Uuid,
    /// Globally unique credential token carried by the QR code.
    /// Immutable once issued.
    pub token: String,
    pub status: AccessRightStatus,
    pub source_type: SourceType,
    /// Originating ticket/subscription/invitation/right id. Never changes
    /// over the row's lifetime, even when ownership does.
    pub source_id: Uuid,
    pub user_id: Uuid,
    pub event_id: Uuid,
    pub ticket_id: Option<Uuid>,
    pub subscription_id: Option<Uuid>,
    pub valid_from: Option<DateTime<Utc>>,
    pub valid_until: Option<DateTime<Utc>>,
    pub metadata: Option<JsonValue>, // JSONB, open schema
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateAccessRightData {
    pub token: String,
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

impl AccessRight {
    /// Inserts a new right in ENABLED state. Callers that issue rights must
    /// pair this with a CREATION ledger row in the same transaction
    /// (see `services::ledger::issue`).
    pub async fn create(
        conn: &mut PgConnection,
        data: CreateAccessRightData,
    ) -> Result<Self, sqlx::Error> {
        let right = sqlx::query_as::<_, Self>(
            r#"
            INSERT INTO access_rights
                (token, status, source_type, source_id, user_id, event_id,
                 ticket_id, subscription_id, valid_from, valid_until, metadata)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            RETURNING *
            "#,
        )
        .bind(&data.token)
        .bind(AccessRightStatus::Enabled)
        .bind(data.source_type)
        .bind(data.source_id)
        .bind(data.user_id)
        .bind(data.event_id)
        .bind(data.ticket_id)
        .bind(data.subscription_id)
        .bind(data.valid_from)
        .bind(data.valid_until)
        .bind(data.metadata)
        .fetch_one(conn)
        .await?;

        Ok(right)
    }

    /// Exact-match credential lookup. A miss is an ordinary `None`; the
    /// decision engine maps it to DENIED/INVALID_QR (fail closed).
    pub async fn resolve_by_token(pool: &PgPool, token: &str) -> Result<Option<Self>, sqlx::Error> {
        let right = sqlx::query_as::<_, Self>(
            r#"
            SELECT * FROM access_rights WHERE token = $1
            "#,
        )
        .bind(token)
        .fetch_optional(pool)
        .await?;

        Ok(right)
    }

    pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        let right = sqlx::query_as::<_, Self>(
            r#"
            SELECT * FROM access_rights WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(pool)
        .await?;

        Ok(right)
    }

    /// Lists a user's rights for an event, newest first.
    pub async fn list_by_user_and_event(
        pool: &PgPool,
        user_id: Uuid,
        event_id: Uuid,
    ) -> Result<Vec<Self>, sqlx::Error> {
        let rights = sqlx::query_as::<_, Self>(
            r#"
            SELECT * FROM access_rights
            WHERE user_id = $1 AND event_id = $2
            ORDER BY created_at DESC
            "#,
        )
        .bind(user_id)
        .bind(event_id)
        .fetch_all(pool)
        .await?;

        Ok(rights)
    }

    /// Compare-and-swap on the status column. Returns the updated row, or
    /// `None` when the stored status no longer matches `expected` (a
    /// concurrent transition won); callers re-evaluate rather than
    /// overwrite.
    pub async fn update_status_cas(
        conn: &mut PgConnection,
        id: Uuid,
        new_status: AccessRightStatus,
        expected: AccessRightStatus,
    ) -> Result<Option<Self>, sqlx::Error> {
        let right = sqlx::query_as::<_, Self>(
            r#"
            UPDATE access_rights
            SET status = $2, updated_at = NOW()
            WHERE id = $1 AND status = $3
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(new_status)
        .bind(expected)
        .fetch_optional(conn)
        .await?;

        Ok(right)
    }

    /// Batch of ENABLED rights whose validity window has closed, for the
    /// expiry sweep job.
    pub async fn find_expirable(pool: &PgPool, limit: i64) -> Result<Vec<Self>, sqlx::Error> {
        let rights = sqlx::query_as::<_, Self>(
            r#"
            SELECT * FROM access_rights
            WHERE status = $1 AND valid_until IS NOT NULL AND valid_until < NOW()
            ORDER BY valid_until ASC
            LIMIT $2
            "#,
        )
        .bind(AccessRightStatus::Enabled)
        .bind(limit)
        .fetch_all(pool)
        .await?;

        Ok(rights)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_serializes_screaming_snake() {
        let json = serde_json::to_string(&AccessRightStatus::Enabled).unwrap();
        assert_eq!(json, r#""ENABLED""#);
        let json = serde_json::to_string(&AccessRightStatus::Cancelled).unwrap();
        assert_eq!(json, r#""CANCELLED""#);
    }

    #[test]
    fn source_type_round_trips() {
        let parsed: SourceType = serde_json::from_str(r#""INVITATION""#).unwrap();
        assert_eq!(parsed, SourceType::Invitation);
    }
}
