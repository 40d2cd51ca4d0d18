use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::access_log::{
    AccessAction, AccessControlLogEntry, DenialReason, RecordLogEntryData, ScanStatus,
};
use crate::models::access_right::{AccessRight, AccessRightStatus};
use crate::models::event::Event;
use crate::services::blacklist::{self, Identity, ScopeRef};

/// Bounded CAS retries keep worst-case turnstile latency flat under
/// contention on a single credential.
const MAX_CAS_ATTEMPTS: u32 = 3;

#[derive(thiserror::Error, Debug)]
pub enum AdmissionError {
    /// The decision log row itself could not be written. The whole
    /// decision aborts: entry never proceeds unlogged.
    #[error("Failed to persist access log entry: {0}")]
    AuditLog(#[source] sqlx::Error),
}

/// One scan presented at an access point.
#[derive(Debug, Clone, Deserialize)]
pub struct ScanRequest {
    pub token: String,
    pub event_id: Uuid,
    pub access_point: String,
    pub zone: Option<String>,
    pub action: AccessAction,
    pub device_id: Option<String>,
    pub metadata: Option<JsonValue>,
}

/// Closed outcome set. Every caller matches all three branches.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status")]
pub enum AdmissionDecision {
    #[serde(rename = "SUCCESS")]
    Granted {
        right_id: Uuid,
        user_id: Uuid,
        action: AccessAction,
        new_status: AccessRightStatus,
    },
    #[serde(rename = "DENIED")]
    Denied {
        reason: DenialReason,
        right_id: Option<Uuid>,
    },
    /// A store fault was logged with status ERROR; the identical request
    /// is safe to retry (committed state makes replays harmless).
    #[serde(rename = "ERROR")]
    Faulted {
        message: String,
    },
}

impl AdmissionDecision {
    pub fn scan_status(&self) -> ScanStatus {
        match self {
            AdmissionDecision::Granted { .. } => ScanStatus::Success,
            AdmissionDecision::Denied { .. } => ScanStatus::Denied,
            AdmissionDecision::Faulted { .. } => ScanStatus::Error,
        }
    }
}

/// Verdict of the pure check chain for one observed state of the right.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Evaluation {
    /// All checks passed; commit requires CAS-transitioning the right
    /// from its observed status to `transition`, when set.
    Pass {
        transition: Option<AccessRightStatus>,
    },
    Deny(DenialReason),
}

/// Status policy per action. ENTRY and VALIDATION require ENABLED;
/// RE_ENTRY is allowed from USED only when the event permits re-entry;
/// ZONE_CHANGE and EXIT are allowed while admitted (ENABLED or USED).
fn status_check(
    status: AccessRightStatus,
    action: AccessAction,
    allow_re_entry: bool,
) -> Option<DenialReason> {
    let permitted = match action {
        AccessAction::Entry | AccessAction::Validation => status == AccessRightStatus::Enabled,
        AccessAction::ReEntry => {
            status == AccessRightStatus::Enabled
                || (status == AccessRightStatus::Used && allow_re_entry)
        }
        AccessAction::ZoneChange | AccessAction::Exit => {
            status == AccessRightStatus::Enabled || status == AccessRightStatus::Used
        }
    };

    if permitted {
        return None;
    }

    // Most specific applicable reason for the disallowed status.
    Some(match status {
        AccessRightStatus::Used => DenialReason::AlreadyUsed,
        AccessRightStatus::Expired => DenialReason::Expired,
        _ => DenialReason::InsufficientRights,
    })
}

/// Which status transition a successful action commits. Only a first
/// ENTRY on a single-use event consumes the right; everything else leaves
/// the status alone.
fn transition_for(
    status: AccessRightStatus,
    action: AccessAction,
    single_use: bool,
) -> Option<AccessRightStatus> {
    match action {
        AccessAction::Entry if single_use && status == AccessRightStatus::Enabled => {
            Some(AccessRightStatus::Used)
        }
        _ => None,
    }
}

/// The fixed-order check chain (scope, blacklist, status, validity
/// window) for one observed state. Deterministic: identical inputs always
/// produce the identical verdict. Zone and capacity checks follow
/// separately because they need an occupancy read.
fn evaluate(
    right: &AccessRight,
    event: &Event,
    requested_event_id: Uuid,
    action: AccessAction,
    now: DateTime<Utc>,
    blacklisted: bool,
) -> Evaluation {
    if right.event_id != requested_event_id {
        return Evaluation::Deny(DenialReason::WrongEvent);
    }

    // Blacklist runs before the status check: a blacklisted user is
    // rejected even when the right itself would be valid.
    if blacklisted {
        return Evaluation::Deny(DenialReason::Blacklisted);
    }

    if let Some(reason) = status_check(right.status, action, event.allow_re_entry) {
        return Evaluation::Deny(reason);
    }

    // EXPIRED takes precedence over WRONG_TIME when the upper bound has
    // passed; WRONG_TIME covers a not-yet-open lower bound.
    if let Some(valid_until) = right.valid_until {
        if valid_until < now {
            return Evaluation::Deny(DenialReason::Expired);
        }
    }
    if let Some(valid_from) = right.valid_from {
        if now < valid_from {
            return Evaluation::Deny(DenialReason::WrongTime);
        }
    }

    Evaluation::Pass {
        transition: transition_for(right.status, action, event.single_use),
    }
}

/// Admission decision engine. Given a scanned credential plus context,
/// produces exactly one decision and exactly one access log row, whatever
/// the outcome.
#[tracing::instrument(skip(pool, request), fields(event_id = %request.event_id, access_point = %request.access_point, action = ?request.action))]
pub async fn decide(
    pool: &PgPool,
    request: &ScanRequest,
) -> Result<AdmissionDecision, AdmissionError> {
    let now = Utc::now();

    match decide_inner(pool, request, now).await {
        Ok(decision) => Ok(decision),
        Err(e) => {
            // Unexpected store fault: log status ERROR with no reason and
            // surface a retryable failure. Never a silent grant.
            tracing::error!(error = %e, "Admission decision faulted");
            let log = RecordLogEntryData {
                event_id: request.event_id,
                user_id: None,
                access_right_id: None,
                ticket_id: None,
                access_point: request.access_point.clone(),
                zone: request.zone.clone(),
                action: request.action,
                status: ScanStatus::Error,
                denial_reason: None,
                metadata: request.metadata.clone(),
            };
            write_log(pool, log).await?;
            Ok(AdmissionDecision::Faulted {
                message: "Store unavailable, retry the scan".to_string(),
            })
        }
    }
}

async fn decide_inner(
    pool: &PgPool,
    request: &ScanRequest,
    now: DateTime<Utc>,
) -> Result<AdmissionDecision, sqlx::Error> {
    // 1. Resolve credential. A miss fails closed as INVALID_QR.
    let Some(mut right) = AccessRight::resolve_by_token(pool, &request.token).await? else {
        tracing::info!("Unknown credential token");
        return deny(pool, request, None, DenialReason::InvalidQr).await;
    };

    // The event definition carries the admission policy and scope ids.
    // A right pointing at an unknown event cannot be admitted.
    let Some(event) = Event::find_by_id(pool, request.event_id).await? else {
        tracing::warn!("Scan against unknown event");
        return deny(pool, request, Some(&right), DenialReason::WrongEvent).await;
    };

    // 3. Blacklist veto, evaluated once: the identity does not change
    // across CAS retries.
    let identity = Identity {
        user_id: Some(right.user_id),
        email: None,
        phone: None,
        device_id: request.device_id.clone(),
    };
    let scope = ScopeRef {
        event_id: event.id,
        venue_id: event.venue_id,
        club_id: event.club_id,
    };
    let blacklisted = blacklist::is_blacklisted(pool, &identity, &scope, now).await?;

    for attempt in 1..=MAX_CAS_ATTEMPTS {
        // 2-5. Scope, blacklist, status and window checks on the
        // currently observed state.
        let verdict = evaluate(&right, &event, request.event_id, request.action, now, blacklisted);

        let transition = match verdict {
            Evaluation::Deny(reason) => {
                return deny(pool, request, Some(&right), reason).await;
            }
            Evaluation::Pass { transition } => transition,
        };

        // 6. Zone and capacity, only for actions that place the patron in
        // a zone. A zone change carries its origin zone so occupancy can
        // move with the patron.
        let mut from_zone: Option<String> = None;
        if let Some(zone) = &request.zone {
            if event.zone_unknown(zone) {
                return deny(pool, request, Some(&right), DenialReason::WrongZone).await;
            }
            if matches!(
                request.action,
                AccessAction::Entry | AccessAction::ReEntry | AccessAction::ZoneChange
            ) {
                let mut conn = pool.acquire().await?;
                if request.action == AccessAction::ZoneChange {
                    from_zone =
                        AccessControlLogEntry::last_zone_for_right(&mut *conn, event.id, right.id)
                            .await?;
                }
                // Staying in the same zone never changes occupancy.
                let same_zone = from_zone.as_deref() == Some(zone.as_str());
                if !same_zone {
                    if let Some(capacity) = event.zone_capacity(zone) {
                        // The occupancy read is not serialized with the
                        // commit below; two concurrent scans can each see
                        // the last free slot and overshoot by one.
                        let admitted =
                            AccessControlLogEntry::zone_occupancy(&mut *conn, event.id, zone)
                                .await?;
                        if admitted >= capacity {
                            tracing::info!(zone = %zone, admitted, capacity, "Zone at capacity");
                            return deny(pool, request, Some(&right), DenialReason::CapacityFull)
                                .await;
                        }
                    }
                }
            }
        }

        // 7. Commit: status CAS (when the action consumes the right) and
        // the SUCCESS log row in one SQL transaction, so a crash cannot
        // admit without a log row or log without the transition.
        let mut tx = pool.begin().await?;

        if let Some(new_status) = transition {
            let updated =
                AccessRight::update_status_cas(&mut *tx, right.id, new_status, right.status)
                    .await?;

            let Some(updated) = updated else {
                // 8. Lost the race: another scan moved the status. Drop
                // the transaction, re-read, re-evaluate.
                drop(tx);
                tracing::debug!(right_id = %right.id, attempt, "CAS conflict, re-evaluating");
                match AccessRight::find_by_id(pool, right.id).await? {
                    Some(fresh) => {
                        right = fresh;
                        continue;
                    }
                    None => {
                        return deny(pool, request, Some(&right), DenialReason::TechnicalError)
                            .await;
                    }
                }
            };

            right = updated;
        }

        let mut metadata = request.metadata.clone();
        if let Some(from) = &from_zone {
            // The origin zone rides on the row; occupancy sums read it
            // back to move the patron out of that zone.
            let mut map = match metadata.take() {
                Some(JsonValue::Object(map)) => map,
                _ => serde_json::Map::new(),
            };
            map.insert("from_zone".to_string(), JsonValue::String(from.clone()));
            metadata = Some(JsonValue::Object(map));
        }

        let entry = AccessControlLogEntry::record(
            &mut *tx,
            RecordLogEntryData {
                event_id: request.event_id,
                user_id: Some(right.user_id),
                access_right_id: Some(right.id),
                ticket_id: right.ticket_id,
                access_point: request.access_point.clone(),
                zone: request.zone.clone(),
                action: request.action,
                status: ScanStatus::Success,
                denial_reason: None,
                metadata,
            },
        )
        .await?;
        tx.commit().await?;

        tracing::info!(
            right_id = %right.id,
            log_id = %entry.id,
            new_status = right.status.as_str(),
            "Admission granted"
        );

        return Ok(AdmissionDecision::Granted {
            right_id: right.id,
            user_id: right.user_id,
            action: request.action,
            new_status: right.status,
        });
    }

    // Retries exhausted under pathological contention.
    tracing::warn!("CAS retries exhausted");
    deny(pool, request, Some(&right), DenialReason::TechnicalError).await
}

/// Terminal denial: writes the single DENIED log row, then returns.
async fn deny(
    pool: &PgPool,
    request: &ScanRequest,
    right: Option<&AccessRight>,
    reason: DenialReason,
) -> Result<AdmissionDecision, sqlx::Error> {
    let mut metadata = request.metadata.clone();
    if right.is_none() {
        // Keep the raw token for debugging unresolvable scans, the way
        // failed scans keep their payload.
        let mut map = match metadata.take() {
            Some(JsonValue::Object(map)) => map,
            _ => serde_json::Map::new(),
        };
        map.insert(
            "raw_token".to_string(),
            JsonValue::String(request.token.clone()),
        );
        metadata = Some(JsonValue::Object(map));
    }

    let log = RecordLogEntryData {
        event_id: request.event_id,
        user_id: right.map(|r| r.user_id),
        access_right_id: right.map(|r| r.id),
        ticket_id: right.and_then(|r| r.ticket_id),
        access_point: request.access_point.clone(),
        zone: request.zone.clone(),
        action: request.action,
        status: ScanStatus::Denied,
        denial_reason: Some(reason),
        metadata,
    };

    let mut conn = pool.acquire().await?;
    let entry = AccessControlLogEntry::record(&mut *conn, log).await?;

    tracing::info!(
        log_id = %entry.id,
        reason = reason.as_str(),
        "Admission denied"
    );

    Ok(AdmissionDecision::Denied {
        reason,
        right_id: right.map(|r| r.id),
    })
}

/// Log write outside the happy path. A failure here aborts the whole
/// decision (fail closed).
async fn write_log(pool: &PgPool, data: RecordLogEntryData) -> Result<(), AdmissionError> {
    let mut conn = pool.acquire().await.map_err(AdmissionError::AuditLog)?;
    AccessControlLogEntry::record(&mut *conn, data)
        .await
        .map_err(AdmissionError::AuditLog)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::access_right::{CreateAccessRightData, SourceType};
    use crate::models::event::CreateEventData;
    use crate::services::ledger;
    use chrono::Duration;
    use serde_json::json;

    fn test_event(allow_re_entry: bool, single_use: bool) -> Event {
        Event {
            id: Uuid::new_v4(),
            venue_id: Some(Uuid::new_v4()),
            club_id: None,
            name: "test event".to_string(),
            allow_re_entry,
            single_use,
            capacity_by_zone: None,
            is_active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn test_right(event_id: Uuid, status: AccessRightStatus) -> AccessRight {
        AccessRight {
            id: Uuid::new_v4(),
            token: "QR-TEST".to_string(),
            status,
            source_type: SourceType::Ticket,
            source_id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            event_id,
            ticket_id: None,
            subscription_id: None,
            valid_from: None,
            valid_until: None,
            metadata: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn enabled_entry_passes_and_consumes_single_use() {
        let event = test_event(false, true);
        let right = test_right(event.id, AccessRightStatus::Enabled);
        let verdict = evaluate(&right, &event, event.id, AccessAction::Entry, Utc::now(), false);
        assert_eq!(
            verdict,
            Evaluation::Pass {
                transition: Some(AccessRightStatus::Used)
            }
        );
    }

    #[test]
    fn multi_entry_event_does_not_consume() {
        let event = test_event(true, false);
        let right = test_right(event.id, AccessRightStatus::Enabled);
        let verdict = evaluate(&right, &event, event.id, AccessAction::Entry, Utc::now(), false);
        assert_eq!(verdict, Evaluation::Pass { transition: None });
    }

    #[test]
    fn wrong_event_denied_first() {
        let event = test_event(false, true);
        // Right bound to a different event, and blacklisted: WRONG_EVENT
        // still wins because scope is checked before the veto.
        let right = test_right(Uuid::new_v4(), AccessRightStatus::Enabled);
        let verdict = evaluate(&right, &event, event.id, AccessAction::Entry, Utc::now(), true);
        assert_eq!(verdict, Evaluation::Deny(DenialReason::WrongEvent));
    }

    #[test]
    fn blacklist_preempts_valid_right() {
        let event = test_event(false, true);
        let right = test_right(event.id, AccessRightStatus::Enabled);
        let verdict = evaluate(&right, &event, event.id, AccessAction::Entry, Utc::now(), true);
        assert_eq!(verdict, Evaluation::Deny(DenialReason::Blacklisted));
    }

    #[test]
    fn blacklist_preempts_already_used() {
        let event = test_event(false, true);
        let right = test_right(event.id, AccessRightStatus::Used);
        let verdict = evaluate(&right, &event, event.id, AccessAction::Entry, Utc::now(), true);
        assert_eq!(verdict, Evaluation::Deny(DenialReason::Blacklisted));
    }

    #[test]
    fn used_entry_is_already_used() {
        let event = test_event(false, true);
        let right = test_right(event.id, AccessRightStatus::Used);
        let verdict = evaluate(&right, &event, event.id, AccessAction::Entry, Utc::now(), false);
        assert_eq!(verdict, Evaluation::Deny(DenialReason::AlreadyUsed));
    }

    #[test]
    fn re_entry_from_used_depends_on_event_policy() {
        let allows = test_event(true, true);
        let right = test_right(allows.id, AccessRightStatus::Used);
        let verdict = evaluate(&right, &allows, allows.id, AccessAction::ReEntry, Utc::now(), false);
        assert_eq!(verdict, Evaluation::Pass { transition: None });

        let forbids = test_event(false, true);
        let right = test_right(forbids.id, AccessRightStatus::Used);
        let verdict =
            evaluate(&right, &forbids, forbids.id, AccessAction::ReEntry, Utc::now(), false);
        assert_eq!(verdict, Evaluation::Deny(DenialReason::AlreadyUsed));
    }

    #[test]
    fn cancelled_right_is_insufficient() {
        let event = test_event(false, true);
        for status in [
            AccessRightStatus::Cancelled,
            AccessRightStatus::Suspended,
            AccessRightStatus::Disabled,
            AccessRightStatus::Transferred,
        ] {
            let right = test_right(event.id, status);
            let verdict =
                evaluate(&right, &event, event.id, AccessAction::Entry, Utc::now(), false);
            assert_eq!(verdict, Evaluation::Deny(DenialReason::InsufficientRights));
        }
    }

    #[test]
    fn expired_status_denied_as_expired() {
        let event = test_event(false, true);
        let right = test_right(event.id, AccessRightStatus::Expired);
        let verdict = evaluate(&right, &event, event.id, AccessAction::Entry, Utc::now(), false);
        assert_eq!(verdict, Evaluation::Deny(DenialReason::Expired));
    }

    #[test]
    fn past_valid_until_is_expired_even_when_status_enabled() {
        let event = test_event(false, true);
        let mut right = test_right(event.id, AccessRightStatus::Enabled);
        right.valid_until = Some(Utc::now() - Duration::days(1));
        let verdict = evaluate(&right, &event, event.id, AccessAction::Entry, Utc::now(), false);
        assert_eq!(verdict, Evaluation::Deny(DenialReason::Expired));
    }

    #[test]
    fn expired_takes_precedence_over_wrong_time() {
        // Window entirely in the past: both bounds violated, EXPIRED wins.
        let event = test_event(false, true);
        let mut right = test_right(event.id, AccessRightStatus::Enabled);
        right.valid_from = Some(Utc::now() + Duration::days(2));
        right.valid_until = Some(Utc::now() - Duration::days(1));
        let verdict = evaluate(&right, &event, event.id, AccessAction::Entry, Utc::now(), false);
        assert_eq!(verdict, Evaluation::Deny(DenialReason::Expired));
    }

    #[test]
    fn not_yet_open_window_is_wrong_time() {
        let event = test_event(false, true);
        let mut right = test_right(event.id, AccessRightStatus::Enabled);
        right.valid_from = Some(Utc::now() + Duration::hours(3));
        let verdict = evaluate(&right, &event, event.id, AccessAction::Entry, Utc::now(), false);
        assert_eq!(verdict, Evaluation::Deny(DenialReason::WrongTime));
    }

    #[test]
    fn open_ended_window_is_unbounded() {
        let event = test_event(false, true);
        let right = test_right(event.id, AccessRightStatus::Enabled);
        let verdict = evaluate(&right, &event, event.id, AccessAction::Entry, Utc::now(), false);
        assert!(matches!(verdict, Evaluation::Pass { .. }));
    }

    #[test]
    fn validation_never_mutates() {
        let event = test_event(false, true);
        let right = test_right(event.id, AccessRightStatus::Enabled);
        let verdict =
            evaluate(&right, &event, event.id, AccessAction::Validation, Utc::now(), false);
        assert_eq!(verdict, Evaluation::Pass { transition: None });
    }

    #[test]
    fn exit_allowed_while_admitted() {
        let event = test_event(false, true);
        for status in [AccessRightStatus::Enabled, AccessRightStatus::Used] {
            let right = test_right(event.id, status);
            let verdict =
                evaluate(&right, &event, event.id, AccessAction::Exit, Utc::now(), false);
            assert_eq!(verdict, Evaluation::Pass { transition: None });
        }
    }

    #[test]
    fn zone_change_allowed_from_used() {
        let event = test_event(false, true);
        let right = test_right(event.id, AccessRightStatus::Used);
        let verdict =
            evaluate(&right, &event, event.id, AccessAction::ZoneChange, Utc::now(), false);
        assert_eq!(verdict, Evaluation::Pass { transition: None });
    }

    #[test]
    fn verdict_is_deterministic() {
        let event = test_event(false, true);
        let right = test_right(event.id, AccessRightStatus::Enabled);
        let now = Utc::now();
        let first = evaluate(&right, &event, event.id, AccessAction::Entry, now, false);
        let second = evaluate(&right, &event, event.id, AccessAction::Entry, now, false);
        assert_eq!(first, second);
    }

    #[test]
    fn decision_serializes_with_tagged_status() {
        let decision = AdmissionDecision::Denied {
            reason: DenialReason::InvalidQr,
            right_id: None,
        };
        let value = serde_json::to_value(&decision).unwrap();
        assert_eq!(value["status"], json!("DENIED"));
        assert_eq!(value["reason"], json!("INVALID_QR"));
        assert_eq!(decision.scan_status(), ScanStatus::Denied);
    }

    async fn seed_event(
        pool: &PgPool,
        allow_re_entry: bool,
        single_use: bool,
        capacity_by_zone: Option<JsonValue>,
    ) -> Event {
        Event::create(
            pool,
            CreateEventData {
                venue_id: None,
                club_id: None,
                name: "club night".to_string(),
                allow_re_entry,
                single_use,
                capacity_by_zone,
            },
        )
        .await
        .unwrap()
    }

    async fn seed_right(pool: &PgPool, event_id: Uuid, token: &str) -> AccessRight {
        let (right, _) = ledger::issue(
            pool,
            CreateAccessRightData {
                token: token.to_string(),
                source_type: SourceType::Ticket,
                source_id: Uuid::new_v4(),
                user_id: Uuid::new_v4(),
                event_id,
                ticket_id: None,
                subscription_id: None,
                valid_from: None,
                valid_until: None,
                metadata: None,
            },
        )
        .await
        .unwrap();
        right
    }

    fn scan(event_id: Uuid, token: &str, action: AccessAction, zone: Option<&str>) -> ScanRequest {
        ScanRequest {
            token: token.to_string(),
            event_id,
            access_point: "gate-1".to_string(),
            zone: zone.map(str::to_string),
            action,
            device_id: None,
            metadata: None,
        }
    }

    fn granted(decision: &AdmissionDecision) -> bool {
        matches!(decision, AdmissionDecision::Granted { .. })
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn concurrent_double_scan_admits_exactly_once(pool: PgPool) {
        let event = seed_event(&pool, false, true, None).await;
        seed_right(&pool, event.id, "QR-RACE").await;

        let request = scan(event.id, "QR-RACE", AccessAction::Entry, None);
        let first = tokio::spawn({
            let pool = pool.clone();
            let request = request.clone();
            async move { decide(&pool, &request).await.unwrap() }
        });
        let second = tokio::spawn({
            let pool = pool.clone();
            let request = request.clone();
            async move { decide(&pool, &request).await.unwrap() }
        });
        let outcomes = [first.await.unwrap(), second.await.unwrap()];

        assert_eq!(outcomes.iter().filter(|d| granted(d)).count(), 1);
        assert!(outcomes.iter().any(|d| matches!(
            d,
            AdmissionDecision::Denied {
                reason: DenialReason::AlreadyUsed,
                ..
            }
        )));

        let successes =
            AccessControlLogEntry::count_by_event(&pool, event.id, Some(ScanStatus::Success))
                .await
                .unwrap();
        let denials =
            AccessControlLogEntry::count_by_event(&pool, event.id, Some(ScanStatus::Denied))
                .await
                .unwrap();
        assert_eq!(successes, 1);
        assert_eq!(denials, 1);
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn zone_change_moves_occupancy_and_respects_capacity(pool: PgPool) {
        let event =
            seed_event(&pool, true, false, Some(json!({"main": 5, "vip": 1}))).await;
        seed_right(&pool, event.id, "QR-A").await;
        seed_right(&pool, event.id, "QR-B").await;

        let a_in = decide(&pool, &scan(event.id, "QR-A", AccessAction::Entry, Some("vip")))
            .await
            .unwrap();
        assert!(granted(&a_in));
        let b_in = decide(&pool, &scan(event.id, "QR-B", AccessAction::Entry, Some("main")))
            .await
            .unwrap();
        assert!(granted(&b_in));

        // vip is at capacity while A is inside.
        let b_move =
            decide(&pool, &scan(event.id, "QR-B", AccessAction::ZoneChange, Some("vip")))
                .await
                .unwrap();
        assert!(matches!(
            b_move,
            AdmissionDecision::Denied {
                reason: DenialReason::CapacityFull,
                ..
            }
        ));

        // A moving to main frees the vip slot.
        let a_move =
            decide(&pool, &scan(event.id, "QR-A", AccessAction::ZoneChange, Some("main")))
                .await
                .unwrap();
        assert!(granted(&a_move));

        let mut conn = pool.acquire().await.unwrap();
        let vip = AccessControlLogEntry::zone_occupancy(&mut *conn, event.id, "vip")
            .await
            .unwrap();
        let main = AccessControlLogEntry::zone_occupancy(&mut *conn, event.id, "main")
            .await
            .unwrap();
        assert_eq!(vip, 0);
        assert_eq!(main, 2);

        let b_retry =
            decide(&pool, &scan(event.id, "QR-B", AccessAction::ZoneChange, Some("vip")))
                .await
                .unwrap();
        assert!(granted(&b_retry));
    }
}
