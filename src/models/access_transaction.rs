use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use sqlx::{FromRow, PgConnection, PgPool};
use uuid::Uuid;

use crate::models::access_right::AccessRightStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(type_name = "access_transaction_type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionType {
    Creation,
    Transfer,
    Resale,
    Refund,
    Upgrade,
    Downgrade,
    Cancellation,
    Suspension,
}

/// One append-only ledger row. Rows are never updated or deleted; the
/// ledger is the source of truth for audit of ownership and lifecycle
/// changes, while `access_rights.status` is the denormalized fast path.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct AccessTransaction {
    pub id: Uuid,
    pub access_right_id: Uuid,
    pub transaction_type: TransactionType,
    pub amount_cents: Option<i64>,
    pub from_user_id: Option<Uuid>,
    pub to_user_id: Option<Uuid>,
    pub notes: Option<String>,
    pub metadata: Option<JsonValue>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppendTransactionData {
    pub access_right_id: Uuid,
    pub transaction_type: TransactionType,
    pub amount_cents: Option<i64>,
    pub from_user_id: Option<Uuid>,
    pub to_user_id: Option<Uuid>,
    pub notes: Option<String>,
    pub metadata: Option<JsonValue>,
}

impl AccessTransaction {
    /// Pure insert. Each call produces a new row; there is no natural key
    /// beyond the generated id, so this never fails on "already exists".
    pub async fn append(
        conn: &mut PgConnection,
        data: AppendTransactionData,
    ) -> Result<Self, sqlx::Error> {
        let txn = sqlx::query_as::<_, Self>(
            r#"
            INSERT INTO access_transactions_log
                (access_right_id, transaction_type, amount_cents,
                 from_user_id, to_user_id, notes, metadata)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING *
            "#,
        )
        .bind(data.access_right_id)
        .bind(data.transaction_type)
        .bind(data.amount_cents)
        .bind(data.from_user_id)
        .bind(data.to_user_id)
        .bind(data.notes)
        .bind(data.metadata)
        .fetch_one(conn)
        .await?;

        Ok(txn)
    }

    /// Full history for one right, ascending by creation time. A plain
    /// MVCC read: concurrent appends are simply not included.
    pub async fn history_for(pool: &PgPool, right_id: Uuid) -> Result<Vec<Self>, sqlx::Error> {
        let txns = sqlx::query_as::<_, Self>(
            r#"
            SELECT * FROM access_transactions_log
            WHERE access_right_id = $1
            ORDER BY created_at ASC, id ASC
            "#,
        )
        .bind(right_id)
        .fetch_all(pool)
        .await?;

        Ok(txns)
    }

    /// Recent ledger rows across all rights, for the outbound stream
    /// consumed by payments/refund workflows.
    pub async fn list_recent(
        pool: &PgPool,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Self>, sqlx::Error> {
        let txns = sqlx::query_as::<_, Self>(
            r#"
            SELECT * FROM access_transactions_log
            ORDER BY created_at DESC
            LIMIT $1 OFFSET $2
            "#,
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(pool)
        .await?;

        Ok(txns)
    }
}

/// Folds an ordered transaction history into the lifecycle status it
/// implies. Gate-driven transitions (ENTRY consuming a single-use right,
/// the expiry sweep) do not produce ledger rows, so the fold yields the
/// ledger-driven state: USED/EXPIRED are derived from the access log and
/// the validity window instead.
pub fn fold_status(history: &[AccessTransaction]) -> Option<AccessRightStatus> {
    let mut status = None;
    for txn in history {
        status = Some(match txn.transaction_type {
            TransactionType::Creation => AccessRightStatus::Enabled,
            // Transfers retire this row; the buyer's right is a new row.
            TransactionType::Transfer | TransactionType::Resale => AccessRightStatus::Transferred,
            TransactionType::Refund => AccessRightStatus::Cancelled,
            TransactionType::Cancellation => {
                if txn.notes.as_deref() == Some("administrative_disable") {
                    AccessRightStatus::Disabled
                } else {
                    AccessRightStatus::Cancelled
                }
            }
            TransactionType::Suspension => AccessRightStatus::Suspended,
            // Tier changes do not move the lifecycle.
            TransactionType::Upgrade | TransactionType::Downgrade => {
                status.unwrap_or(AccessRightStatus::Enabled)
            }
        });
    }
    status
}

#[cfg(test)]
mod tests {
    use super::*;

    fn txn(transaction_type: TransactionType, notes: Option<&str>) -> AccessTransaction {
        AccessTransaction {
            id: Uuid::new_v4(),
            access_right_id: Uuid::new_v4(),
            transaction_type,
            amount_cents: None,
            from_user_id: None,
            to_user_id: None,
            notes: notes.map(str::to_string),
            metadata: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn empty_history_has_no_status() {
        assert_eq!(fold_status(&[]), None);
    }

    #[test]
    fn creation_yields_enabled() {
        let history = vec![txn(TransactionType::Creation, None)];
        assert_eq!(fold_status(&history), Some(AccessRightStatus::Enabled));
    }

    #[test]
    fn cancellation_is_terminal() {
        let history = vec![
            txn(TransactionType::Creation, None),
            txn(TransactionType::Cancellation, None),
        ];
        assert_eq!(fold_status(&history), Some(AccessRightStatus::Cancelled));
    }

    #[test]
    fn refund_cancels() {
        let history = vec![
            txn(TransactionType::Creation, None),
            txn(TransactionType::Refund, None),
        ];
        assert_eq!(fold_status(&history), Some(AccessRightStatus::Cancelled));
    }

    #[test]
    fn transfer_retires_the_row() {
        let history = vec![
            txn(TransactionType::Creation, None),
            txn(TransactionType::Transfer, None),
        ];
        assert_eq!(fold_status(&history), Some(AccessRightStatus::Transferred));
    }

    #[test]
    fn tier_changes_keep_lifecycle() {
        let history = vec![
            txn(TransactionType::Creation, None),
            txn(TransactionType::Upgrade, None),
            txn(TransactionType::Downgrade, None),
        ];
        assert_eq!(fold_status(&history), Some(AccessRightStatus::Enabled));
    }

    #[test]
    fn administrative_disable_folds_to_disabled() {
        let history = vec![
            txn(TransactionType::Creation, None),
            txn(TransactionType::Cancellation, Some("administrative_disable")),
        ];
        assert_eq!(fold_status(&history), Some(AccessRightStatus::Disabled));
    }

    #[test]
    fn suspension_after_upgrade() {
        let history = vec![
            txn(TransactionType::Creation, None),
            txn(TransactionType::Upgrade, None),
            txn(TransactionType::Suspension, None),
        ];
        assert_eq!(fold_status(&history), Some(AccessRightStatus::Suspended));
    }
}
