use sqlx::PgPool;

use crate::models::access_right::{AccessRight, AccessRightStatus};

const DEFAULT_BATCH_SIZE: i64 = 500;

#[derive(Debug, Default)]
pub struct SweepStats {
    pub scanned: usize,
    pub expired: usize,
    pub lost_races: usize,
    pub errors: usize,
}

/// Background job that eagerly expires ENABLED rights whose validity
/// window has closed. The gate evaluates `valid_until` lazily anyway
/// (DENIED/EXPIRED), so this sweep only keeps the stored status honest
/// for listings and audit.
///
/// Each transition is a CAS keyed on ENABLED, so a concurrent lifecycle
/// change (cancellation, transfer) wins and the sweep just moves on.
pub async fn sweep_expired(pool: &PgPool, batch_size: Option<i64>) -> Result<SweepStats, sqlx::Error> {
    let mut stats = SweepStats::default();

    let rights =
        AccessRight::find_expirable(pool, batch_size.unwrap_or(DEFAULT_BATCH_SIZE)).await?;
    stats.scanned = rights.len();

    tracing::info!(total = stats.scanned, "Starting expiry sweep");

    for right in rights {
        let mut conn = match pool.acquire().await {
            Ok(conn) => conn,
            Err(e) => {
                tracing::error!(right_id = %right.id, error = %e, "Sweep lost its connection");
                stats.errors += 1;
                continue;
            }
        };

        match AccessRight::update_status_cas(
            &mut *conn,
            right.id,
            AccessRightStatus::Expired,
            AccessRightStatus::Enabled,
        )
        .await
        {
            Ok(Some(_)) => {
                tracing::debug!(right_id = %right.id, "Right expired");
                stats.expired += 1;
            }
            Ok(None) => {
                // Someone else transitioned it between snapshot and CAS.
                stats.lost_races += 1;
            }
            Err(e) => {
                tracing::error!(right_id = %right.id, error = %e, "Failed to expire right");
                stats.errors += 1;
            }
        }
    }

    tracing::info!(?stats, "Expiry sweep completed");
    Ok(stats)
}
