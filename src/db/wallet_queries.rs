use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, Row, Transaction};
use uuid::Uuid;

use crate::models::wallet::{CreditTransaction, CreditWallet, TransactionType};

use super::parse_enum;

#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("wallet not found for advertiser")]
    WalletNotFound,

    #[error("amount must be positive")]
    NonPositiveAmount,

    #[error("insufficient balance: has {balance}, needs {required}")]
    InsufficientBalance { balance: i64, required: i64 },

    #[error("balance arithmetic overflow")]
    Overflow,

    #[error(transparent)]
    Db(#[from] sqlx::Error),
}

fn wallet_from_row(row: &PgRow) -> Result<CreditWallet, sqlx::Error> {
    Ok(CreditWallet {
        id: row.try_get("id")?,
        advertiser_id: row.try_get("advertiser_id")?,
        balance: row.try_get("balance")?,
        total_topup: row.try_get("total_topup")?,
        total_consumed: row.try_get("total_consumed")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn transaction_from_row(row: &PgRow) -> Result<CreditTransaction, sqlx::Error> {
    let tx_type: String = row.try_get("tx_type")?;

    Ok(CreditTransaction {
        id: row.try_get("id")?,
        wallet_id: row.try_get("wallet_id")?,
        tx_type: parse_enum(&tx_type, "tx_type")?,
        amount: row.try_get("amount")?,
        balance_after: row.try_get("balance_after")?,
        ref_type: row.try_get("ref_type")?,
        ref_id: row.try_get("ref_id")?,
        description: row.try_get("description")?,
        created_at: row.try_get("created_at")?,
    })
}

/// Ensure an advertiser has a wallet row, creating an empty one if needed.
pub async fn get_or_create_wallet(
    pool: &PgPool,
    advertiser_id: Uuid,
) -> Result<CreditWallet, sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO credit_wallets (advertiser_id)
        VALUES ($1)
        ON CONFLICT (advertiser_id) DO NOTHING
        "#,
    )
    .bind(advertiser_id)
    .execute(pool)
    .await?;

    let row = sqlx::query(
        r#"
        SELECT id, advertiser_id, balance, total_topup, total_consumed, created_at, updated_at
        FROM credit_wallets
        WHERE advertiser_id = $1
        "#,
    )
    .bind(advertiser_id)
    .fetch_one(pool)
    .await?;

    wallet_from_row(&row)
}

/// The single write path for money. Locks the wallet row, validates the new
/// balance, writes it, and appends exactly one ledger row whose balance_after
/// snapshots the post-write balance. Runs inside the caller's transaction so
/// couplings (approval) stay atomic.
pub async fn apply_operation(
    tx: &mut Transaction<'_, Postgres>,
    advertiser_id: Uuid,
    tx_type: TransactionType,
    amount: i64,
    ref_type: Option<&str>,
    ref_id: Option<Uuid>,
    description: Option<&str>,
) -> Result<(CreditWallet, CreditTransaction), LedgerError> {
    let row = sqlx::query(
        r#"
        SELECT id, advertiser_id, balance, total_topup, total_consumed, created_at, updated_at
        FROM credit_wallets
        WHERE advertiser_id = $1
        FOR UPDATE
        "#,
    )
    .bind(advertiser_id)
    .fetch_optional(&mut **tx)
    .await?
    .ok_or(LedgerError::WalletNotFound)?;

    let wallet = wallet_from_row(&row)?;

    let new_balance = wallet
        .balance
        .checked_add(amount)
        .ok_or(LedgerError::Overflow)?;
    if new_balance < 0 {
        return Err(LedgerError::InsufficientBalance {
            balance: wallet.balance,
            required: -amount,
        });
    }

    let topup_delta = if tx_type == TransactionType::Topup { amount } else { 0 };
    let consumed_delta = if tx_type == TransactionType::Consume { -amount } else { 0 };

    let row = sqlx::query(
        r#"
        UPDATE credit_wallets
        SET balance = $2, total_topup = total_topup + $3,
            total_consumed = total_consumed + $4, updated_at = NOW()
        WHERE id = $1
        RETURNING id, advertiser_id, balance, total_topup, total_consumed, created_at, updated_at
        "#,
    )
    .bind(wallet.id)
    .bind(new_balance)
    .bind(topup_delta)
    .bind(consumed_delta)
    .fetch_one(&mut **tx)
    .await?;

    let updated = wallet_from_row(&row)?;

    let row = sqlx::query(
        r#"
        INSERT INTO credit_transactions (wallet_id, tx_type, amount, balance_after, ref_type, ref_id, description)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        RETURNING id, wallet_id, tx_type, amount, balance_after, ref_type, ref_id, description, created_at
        "#,
    )
    .bind(wallet.id)
    .bind(tx_type.to_string())
    .bind(amount)
    .bind(new_balance)
    .bind(ref_type)
    .bind(ref_id)
    .bind(description)
    .fetch_one(&mut **tx)
    .await?;

    let ledger_row = transaction_from_row(&row)?;

    tracing::info!(
        wallet_id = %wallet.id,
        tx_type = %tx_type,
        amount,
        balance_before = wallet.balance,
        balance_after = new_balance,
        "ledger operation applied"
    );

    Ok((updated, ledger_row))
}

/// Credit a confirmed advertiser payment.
pub async fn topup(
    pool: &PgPool,
    advertiser_id: Uuid,
    amount: i64,
    payment_reference: &str,
) -> Result<(CreditWallet, CreditTransaction), LedgerError> {
    if amount <= 0 {
        return Err(LedgerError::NonPositiveAmount);
    }

    let mut tx = pool.begin().await?;
    let result = apply_operation(
        &mut tx,
        advertiser_id,
        TransactionType::Topup,
        amount,
        Some("payment"),
        None,
        Some(payment_reference),
    )
    .await?;
    tx.commit().await?;

    Ok(result)
}

/// Administrative credit back to a wallet.
pub async fn refund(
    pool: &PgPool,
    advertiser_id: Uuid,
    amount: i64,
    ref_id: Option<Uuid>,
    description: Option<&str>,
) -> Result<(CreditWallet, CreditTransaction), LedgerError> {
    if amount <= 0 {
        return Err(LedgerError::NonPositiveAmount);
    }

    let mut tx = pool.begin().await?;
    let result = apply_operation(
        &mut tx,
        advertiser_id,
        TransactionType::Refund,
        amount,
        Some("refund"),
        ref_id,
        description,
    )
    .await?;
    tx.commit().await?;

    Ok(result)
}

/// Promotional credit.
pub async fn bonus(
    pool: &PgPool,
    advertiser_id: Uuid,
    amount: i64,
    description: Option<&str>,
) -> Result<(CreditWallet, CreditTransaction), LedgerError> {
    if amount <= 0 {
        return Err(LedgerError::NonPositiveAmount);
    }

    let mut tx = pool.begin().await?;
    let result = apply_operation(
        &mut tx,
        advertiser_id,
        TransactionType::Bonus,
        amount,
        Some("bonus"),
        None,
        description,
    )
    .await?;
    tx.commit().await?;

    Ok(result)
}

/// Signed administrative correction. May not drive the balance negative.
pub async fn adjust(
    pool: &PgPool,
    advertiser_id: Uuid,
    amount: i64,
    description: Option<&str>,
) -> Result<(CreditWallet, CreditTransaction), LedgerError> {
    if amount == 0 {
        return Err(LedgerError::NonPositiveAmount);
    }

    let mut tx = pool.begin().await?;
    let result = apply_operation(
        &mut tx,
        advertiser_id,
        TransactionType::Adjust,
        amount,
        Some("adjust"),
        None,
        description,
    )
    .await?;
    tx.commit().await?;

    Ok(result)
}
