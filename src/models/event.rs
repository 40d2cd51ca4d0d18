use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

/// Event definition facts supplied by the event/venue CRUD collaborator.
/// The admission core reads the scope ids, the admission policy flags and
/// the zone capacity map; everything else about an event lives outside
/// this service.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Event {
    pub id: Uuid,
    pub venue_id: Option<Uuid>,
    pub club_id: Option<Uuid>,
    pub name: String,
    /// Whether RE_ENTRY is permitted from USED.
    pub allow_re_entry: bool,
    /// Whether a successful first ENTRY consumes the right (ENABLED→USED).
    pub single_use: bool,
    /// Zone name → capacity limit. Absent means no zone enforcement.
    pub capacity_by_zone: Option<JsonValue>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateEventData {
    pub venue_id: Option<Uuid>,
    pub club_id: Option<Uuid>,
    pub name: String,
    pub allow_re_entry: bool,
    pub single_use: bool,
    pub capacity_by_zone: Option<JsonValue>,
}

impl Event {
    pub async fn create(pool: &PgPool, data: CreateEventData) -> Result<Self, sqlx::Error> {
        let event = sqlx::query_as::<_, Event>(
            r#"
            INSERT INTO events (venue_id, club_id, name, allow_re_entry, single_use, capacity_by_zone)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *
            "#,
        )
        .bind(data.venue_id)
        .bind(data.club_id)
        .bind(&data.name)
        .bind(data.allow_re_entry)
        .bind(data.single_use)
        .bind(data.capacity_by_zone)
        .fetch_one(pool)
        .await?;

        Ok(event)
    }

    pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        let event = sqlx::query_as::<_, Event>(
            r#"
            SELECT * FROM events WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(pool)
        .await?;

        Ok(event)
    }

    pub async fn list_active(pool: &PgPool) -> Result<Vec<Self>, sqlx::Error> {
        let events = sqlx::query_as::<_, Event>(
            r#"
            SELECT * FROM events WHERE is_active ORDER BY created_at DESC
            "#,
        )
        .fetch_all(pool)
        .await?;

        Ok(events)
    }

    /// Capacity limit configured for a zone, if the event enforces zones.
    pub fn zone_capacity(&self, zone: &str) -> Option<i64> {
        self.capacity_by_zone
            .as_ref()
            .and_then(|map| map.get(zone))
            .and_then(JsonValue::as_i64)
    }

    /// True when the event defines a zone map but the named zone is not
    /// in it.
    pub fn zone_unknown(&self, zone: &str) -> bool {
        match &self.capacity_by_zone {
            Some(JsonValue::Object(map)) => !map.contains_key(zone),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn event_with_zones(zones: Option<JsonValue>) -> Event {
        Event {
            id: Uuid::new_v4(),
            venue_id: None,
            club_id: None,
            name: "test".to_string(),
            allow_re_entry: false,
            single_use: true,
            capacity_by_zone: zones,
            is_active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn zone_capacity_reads_the_map() {
        let event = event_with_zones(Some(json!({"main": 500, "vip": 40})));
        assert_eq!(event.zone_capacity("vip"), Some(40));
        assert_eq!(event.zone_capacity("main"), Some(500));
        assert_eq!(event.zone_capacity("backstage"), None);
    }

    #[test]
    fn unknown_zone_only_when_map_present() {
        let event = event_with_zones(Some(json!({"main": 500})));
        assert!(event.zone_unknown("backstage"));
        assert!(!event.zone_unknown("main"));

        let event = event_with_zones(None);
        assert!(!event.zone_unknown("anything"));
    }
}
