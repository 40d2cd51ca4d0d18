use serde_json::Value as JsonValue;
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::access_right::{
    AccessRight, AccessRightStatus, CreateAccessRightData, SourceType,
};
use crate::models::access_transaction::{
    AccessTransaction, AppendTransactionData, TransactionType,
};

#[derive(thiserror::Error, Debug)]
pub enum LedgerError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Access right not found: {0}")]
    RightNotFound(Uuid),

    #[error("Right {0} is {1}, expected {2}")]
    StatusConflict(Uuid, &'static str, &'static str),
}

/// Issues a new access right and its CREATION ledger row in one
/// transaction. A right never exists without its creation entry.
#[tracing::instrument(skip(pool, data), fields(event_id = %data.event_id, user_id = %data.user_id))]
pub async fn issue(
    pool: &PgPool,
    data: CreateAccessRightData,
) -> Result<(AccessRight, AccessTransaction), LedgerError> {
    let mut tx = pool.begin().await?;

    let user_id = data.user_id;
    let right = AccessRight::create(&mut *tx, data).await?;
    let creation = AccessTransaction::append(
        &mut *tx,
        AppendTransactionData {
            access_right_id: right.id,
            transaction_type: TransactionType::Creation,
            amount_cents: None,
            from_user_id: None,
            to_user_id: Some(user_id),
            notes: None,
            metadata: None,
        },
    )
    .await?;

    tx.commit().await?;

    tracing::info!(right_id = %right.id, token = %right.token, "Access right issued");
    Ok((right, creation))
}

/// Moves a right to a new owner. The seller's row is CAS-retired to
/// TRANSFERRED and a fresh right (new token, source TRANSFER pointing at
/// the superseded row) is issued to the buyer, all in one transaction.
/// The old QR stops working the moment the transfer commits.
#[tracing::instrument(skip(pool))]
pub async fn transfer(
    pool: &PgPool,
    right_id: Uuid,
    to_user_id: Uuid,
    new_token: String,
    amount_cents: Option<i64>,
    notes: Option<String>,
) -> Result<AccessRight, LedgerError> {
    transfer_inner(
        pool,
        right_id,
        to_user_id,
        new_token,
        TransactionType::Transfer,
        amount_cents,
        notes,
    )
    .await
}

/// Same mechanics as a transfer, recorded as RESALE for the payments
/// collaborator.
#[tracing::instrument(skip(pool))]
pub async fn resale(
    pool: &PgPool,
    right_id: Uuid,
    to_user_id: Uuid,
    new_token: String,
    amount_cents: Option<i64>,
    notes: Option<String>,
) -> Result<AccessRight, LedgerError> {
    transfer_inner(
        pool,
        right_id,
        to_user_id,
        new_token,
        TransactionType::Resale,
        amount_cents,
        notes,
    )
    .await
}

async fn transfer_inner(
    pool: &PgPool,
    right_id: Uuid,
    to_user_id: Uuid,
    new_token: String,
    transaction_type: TransactionType,
    amount_cents: Option<i64>,
    notes: Option<String>,
) -> Result<AccessRight, LedgerError> {
    let old = AccessRight::find_by_id(pool, right_id)
        .await?
        .ok_or(LedgerError::RightNotFound(right_id))?;

    let mut tx = pool.begin().await?;

    let retired = AccessRight::update_status_cas(
        &mut *tx,
        right_id,
        AccessRightStatus::Transferred,
        AccessRightStatus::Enabled,
    )
    .await?
    .ok_or(LedgerError::StatusConflict(
        right_id,
        old.status.as_str(),
        AccessRightStatus::Enabled.as_str(),
    ))?;

    AccessTransaction::append(
        &mut *tx,
        AppendTransactionData {
            access_right_id: retired.id,
            transaction_type,
            amount_cents,
            from_user_id: Some(retired.user_id),
            to_user_id: Some(to_user_id),
            notes,
            metadata: None,
        },
    )
    .await?;

    let successor = AccessRight::create(
        &mut *tx,
        CreateAccessRightData {
            token: new_token,
            source_type: SourceType::Transfer,
            source_id: retired.id,
            user_id: to_user_id,
            event_id: retired.event_id,
            ticket_id: retired.ticket_id,
            subscription_id: retired.subscription_id,
            valid_from: retired.valid_from,
            valid_until: retired.valid_until,
            metadata: retired.metadata.clone(),
        },
    )
    .await?;

    AccessTransaction::append(
        &mut *tx,
        AppendTransactionData {
            access_right_id: successor.id,
            transaction_type: TransactionType::Creation,
            amount_cents: None,
            from_user_id: Some(retired.user_id),
            to_user_id: Some(to_user_id),
            notes: None,
            metadata: None,
        },
    )
    .await?;

    tx.commit().await?;

    tracing::info!(
        retired_right = %retired.id,
        successor_right = %successor.id,
        "Ownership moved"
    );
    Ok(successor)
}

/// Cancels a right (ENABLED→CANCELLED) with its CANCELLATION ledger row.
#[tracing::instrument(skip(pool))]
pub async fn cancel(
    pool: &PgPool,
    right_id: Uuid,
    notes: Option<String>,
) -> Result<AccessRight, LedgerError> {
    lifecycle_mutation(
        pool,
        right_id,
        AccessRightStatus::Cancelled,
        Some(AccessRightStatus::Enabled),
        TransactionType::Cancellation,
        None,
        notes,
    )
    .await
}

/// Records a refund decided by the external payments collaborator and
/// invalidates the right (ENABLED→CANCELLED, REFUND ledger row).
#[tracing::instrument(skip(pool))]
pub async fn refund(
    pool: &PgPool,
    right_id: Uuid,
    amount_cents: Option<i64>,
    notes: Option<String>,
) -> Result<AccessRight, LedgerError> {
    lifecycle_mutation(
        pool,
        right_id,
        AccessRightStatus::Cancelled,
        Some(AccessRightStatus::Enabled),
        TransactionType::Refund,
        amount_cents,
        notes,
    )
    .await
}

/// Suspends a right (ENABLED→SUSPENDED).
#[tracing::instrument(skip(pool))]
pub async fn suspend(
    pool: &PgPool,
    right_id: Uuid,
    notes: Option<String>,
) -> Result<AccessRight, LedgerError> {
    lifecycle_mutation(
        pool,
        right_id,
        AccessRightStatus::Suspended,
        Some(AccessRightStatus::Enabled),
        TransactionType::Suspension,
        None,
        notes,
    )
    .await
}

/// Administrative disable: reaches DISABLED from any state. The ledger
/// has no DISABLE transaction type, so the row is recorded as a
/// CANCELLATION tagged `administrative_disable`.
#[tracing::instrument(skip(pool))]
pub async fn disable(pool: &PgPool, right_id: Uuid) -> Result<AccessRight, LedgerError> {
    lifecycle_mutation(
        pool,
        right_id,
        AccessRightStatus::Disabled,
        None,
        TransactionType::Cancellation,
        None,
        Some("administrative_disable".to_string()),
    )
    .await
}

/// Records a tier upgrade/downgrade. Pure ledger fact: the lifecycle
/// status does not move.
#[tracing::instrument(skip(pool, metadata))]
pub async fn record_tier_change(
    pool: &PgPool,
    right_id: Uuid,
    upgrade: bool,
    amount_cents: Option<i64>,
    notes: Option<String>,
    metadata: Option<JsonValue>,
) -> Result<AccessTransaction, LedgerError> {
    let right = AccessRight::find_by_id(pool, right_id)
        .await?
        .ok_or(LedgerError::RightNotFound(right_id))?;

    let mut conn = pool.acquire().await?;
    let txn = AccessTransaction::append(
        &mut *conn,
        AppendTransactionData {
            access_right_id: right.id,
            transaction_type: if upgrade {
                TransactionType::Upgrade
            } else {
                TransactionType::Downgrade
            },
            amount_cents,
            from_user_id: None,
            to_user_id: Some(right.user_id),
            notes,
            metadata,
        },
    )
    .await?;

    Ok(txn)
}

/// Shared CAS-plus-append unit: the status change and its ledger row
/// commit together or not at all. `expected = None` transitions from any
/// current state (administrative paths).
async fn lifecycle_mutation(
    pool: &PgPool,
    right_id: Uuid,
    new_status: AccessRightStatus,
    expected: Option<AccessRightStatus>,
    transaction_type: TransactionType,
    amount_cents: Option<i64>,
    notes: Option<String>,
) -> Result<AccessRight, LedgerError> {
    let current = AccessRight::find_by_id(pool, right_id)
        .await?
        .ok_or(LedgerError::RightNotFound(right_id))?;

    let expected = match expected {
        Some(expected) => {
            if current.status != expected {
                return Err(LedgerError::StatusConflict(
                    right_id,
                    current.status.as_str(),
                    expected.as_str(),
                ));
            }
            expected
        }
        // Administrative transitions still CAS on the observed status so
        // a concurrent change surfaces as a conflict, never a lost write.
        None => current.status,
    };

    let mut tx = pool.begin().await?;

    let updated = AccessRight::update_status_cas(&mut *tx, right_id, new_status, expected)
        .await?
        .ok_or(LedgerError::StatusConflict(
            right_id,
            "changed concurrently",
            expected.as_str(),
        ))?;

    AccessTransaction::append(
        &mut *tx,
        AppendTransactionData {
            access_right_id: updated.id,
            transaction_type,
            amount_cents,
            from_user_id: Some(updated.user_id),
            to_user_id: None,
            notes,
            metadata: None,
        },
    )
    .await?;

    tx.commit().await?;

    tracing::info!(
        right_id = %updated.id,
        new_status = updated.status.as_str(),
        transaction_type = ?transaction_type,
        "Lifecycle mutation committed"
    );
    Ok(updated)
}
