use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::blacklist::{BlacklistEntry, BlacklistType};

/// Who is asking for admission. Partially known identities are normal:
/// an unauthenticated credential may carry only a user id, or nothing
/// beyond a device fingerprint.
#[derive(Debug, Clone, Default)]
pub struct Identity {
    pub user_id: Option<Uuid>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub device_id: Option<String>,
}

/// Where admission is being requested.
#[derive(Debug, Clone, Copy)]
pub struct ScopeRef {
    pub event_id: Uuid,
    pub venue_id: Option<Uuid>,
    pub club_id: Option<Uuid>,
}

/// Identifier checks in fixed priority order: user id first, then email,
/// phone, device. Unavailable identifiers are skipped, never an error.
/// The fixed order keeps results deterministic when several entries could
/// apply and bounds lookup latency.
fn identifier_checks(identity: &Identity) -> Vec<(BlacklistType, String)> {
    let mut checks = Vec::with_capacity(4);
    if let Some(user_id) = identity.user_id {
        checks.push((BlacklistType::User, user_id.to_string()));
    }
    if let Some(email) = &identity.email {
        checks.push((BlacklistType::Email, email.clone()));
    }
    if let Some(phone) = &identity.phone {
        checks.push((BlacklistType::Phone, phone.clone()));
    }
    if let Some(device_id) = &identity.device_id {
        checks.push((BlacklistType::Device, device_id.clone()));
    }
    checks
}

/// Pure read: does any active blacklist entry veto this identity within
/// this scope at `now`? First hit short-circuits. A hit pre-empts every
/// other admission check.
#[tracing::instrument(skip(pool, identity))]
pub async fn is_blacklisted(
    pool: &PgPool,
    identity: &Identity,
    scope: &ScopeRef,
    now: DateTime<Utc>,
) -> Result<bool, sqlx::Error> {
    for (blacklist_type, identifier) in identifier_checks(identity) {
        let hit = BlacklistEntry::find_active_matching(
            pool,
            blacklist_type,
            &identifier,
            scope.event_id,
            scope.venue_id,
            scope.club_id,
            now,
        )
        .await?;

        if let Some(entry) = hit {
            tracing::info!(
                entry_id = %entry.id,
                blacklist_type = ?blacklist_type,
                scope = ?entry.scope,
                "Blacklist veto"
            );
            return Ok(true);
        }
    }

    Ok(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checks_follow_fixed_priority() {
        let identity = Identity {
            user_id: Some(Uuid::new_v4()),
            email: Some("a@example.com".to_string()),
            phone: Some("+4915200000000".to_string()),
            device_id: Some("dev-1".to_string()),
        };
        let checks = identifier_checks(&identity);
        let types: Vec<BlacklistType> = checks.iter().map(|(t, _)| *t).collect();
        assert_eq!(
            types,
            vec![
                BlacklistType::User,
                BlacklistType::Email,
                BlacklistType::Phone,
                BlacklistType::Device,
            ]
        );
    }

    #[test]
    fn missing_identifiers_are_skipped() {
        let identity = Identity {
            user_id: None,
            email: None,
            phone: Some("+4915200000000".to_string()),
            device_id: None,
        };
        let checks = identifier_checks(&identity);
        assert_eq!(checks.len(), 1);
        assert_eq!(checks[0].0, BlacklistType::Phone);
    }

    #[test]
    fn empty_identity_yields_no_checks() {
        let checks = identifier_checks(&Identity::default());
        assert!(checks.is_empty());
    }
}
