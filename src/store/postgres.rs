//! PostgreSQL store
//!
//! All hot-field updates are single guarded statements (CAS):
//! - `UPDATE gifts_tb SET sold = sold + 1 WHERE ... AND sold < total_available`
//! - `INSERT ... ON CONFLICT (payment_id) DO UPDATE ... WHERE status = 'PENDING'`
//! - `UPDATE transactions_tb SET receiver_id = $2 WHERE ... AND receiver_id IS NULL`
//!
//! Schema: `migrations/0001_init.sql`.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::Row;

use super::{
    GiftCatalog, Revert, StoreError, StoreResult, TransactionStore, UpsertOutcome, UserDirectory,
    UserSet,
};
use crate::core_types::{GiftId, PaymentId, TransactionId, UserId};
use crate::models::{
    CompletedTransaction, Currency, GiftDefinition, Receiver, Transaction, TransactionStatus,
    User, UserProfile,
};
use crate::validation::validate_gift;

const SCHEMA: &str = include_str!("../../migrations/0001_init.sql");

const TRANSACTION_COLUMNS: &str = r#"
    transaction_id, gift_id, sender_id, receiver_id, status, payment_id,
    price, currency, which, created_at, updated_at
"#;

pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create a connection pool
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, sqlx::Error> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(5))
            .connect(database_url)
            .await?;

        tracing::info!("PostgreSQL connection pool established");
        Ok(Self { pool })
    }

    /// Apply the schema (idempotent)
    pub async fn migrate(&self) -> Result<(), sqlx::Error> {
        sqlx::raw_sql(SCHEMA).execute(&self.pool).await?;
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn health_check(&self) -> Result<(), sqlx::Error> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn fetch_transaction_where(
        &self,
        predicate: &str,
        bind: TransactionKey,
    ) -> StoreResult<Option<Transaction>> {
        let sql = format!(
            "SELECT {} FROM transactions_tb WHERE {}",
            TRANSACTION_COLUMNS, predicate
        );
        let query = sqlx::query(&sql);
        let query = match bind {
            TransactionKey::Id(id) => query.bind(id.to_hex()),
            TransactionKey::Payment(payment_id) => query.bind(payment_id),
        };

        query
            .fetch_optional(&self.pool)
            .await?
            .map(|row| row_to_transaction(&row))
            .transpose()
    }
}

enum TransactionKey {
    Id(TransactionId),
    Payment(PaymentId),
}

// ============================================================================
// Row mapping
// ============================================================================

fn parse_id<T: std::str::FromStr>(row: &PgRow, column: &str) -> StoreResult<T> {
    let raw: String = row.try_get(column)?;
    raw.parse()
        .map_err(|_| StoreError::Corrupt(format!("invalid {}: {}", column, raw)))
}

fn parse_currency(row: &PgRow) -> StoreResult<Currency> {
    let raw: String = row.try_get("currency")?;
    raw.parse().map_err(StoreError::Corrupt)
}

fn non_negative(row: &PgRow, column: &str) -> StoreResult<u32> {
    let value: i32 = row.try_get(column)?;
    u32::try_from(value).map_err(|_| StoreError::Corrupt(format!("negative {}: {}", column, value)))
}

fn row_to_gift(row: &PgRow) -> StoreResult<GiftDefinition> {
    Ok(GiftDefinition {
        id: parse_id(row, "gift_id")?,
        name: row.try_get("name")?,
        slug: row.try_get("slug")?,
        price: row.try_get::<Decimal, _>("price")?.normalize(),
        currency: parse_currency(row)?,
        total_available: non_negative(row, "total_available")?,
        sold: non_negative(row, "sold")?,
        color: row.try_get("color")?,
        pattern_id: row.try_get("pattern_id")?,
        lottie_id: row.try_get("lottie_id")?,
    })
}

fn row_to_transaction(row: &PgRow) -> StoreResult<Transaction> {
    let status_raw: String = row.try_get("status")?;
    let status = TransactionStatus::from_str_opt(&status_raw)
        .ok_or_else(|| StoreError::Corrupt(format!("invalid status: {}", status_raw)))?;

    let which: Option<i32> = row.try_get("which")?;

    Ok(Transaction {
        id: parse_id(row, "transaction_id")?,
        gift_id: parse_id(row, "gift_id")?,
        sender_id: row.try_get("sender_id")?,
        receiver: Receiver::from_column(row.try_get("receiver_id")?),
        status,
        payment_id: row.try_get("payment_id")?,
        price: row.try_get::<Decimal, _>("price")?.normalize(),
        currency: parse_currency(row)?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
        which: which.map(|w| w as u32),
    })
}

/// Classify a row returned by the guarded upsert.
///
/// A promotion without a matching snapshot means an invoice record appeared
/// between the snapshot read and the upsert. Its PENDING values were
/// overwritten with this payment's, which came from the same gift, so the
/// snapshot is rebuilt from them.
fn upsert_outcome(
    inserted: bool,
    snapshot: Option<Transaction>,
    transaction: Transaction,
) -> UpsertOutcome {
    if inserted {
        return UpsertOutcome::Inserted(transaction);
    }
    let previous = match snapshot {
        Some(previous) if previous.id == transaction.id => previous,
        _ => Transaction {
            status: TransactionStatus::Pending,
            which: None,
            ..transaction.clone()
        },
    };
    UpsertOutcome::Promoted {
        transaction,
        previous,
    }
}

// ============================================================================
// Gift catalog
// ============================================================================

#[async_trait]
impl GiftCatalog for PgStore {
    async fn insert_gift(&self, gift: &GiftDefinition) -> StoreResult<()> {
        validate_gift(gift)?;

        sqlx::query(
            r#"
            INSERT INTO gifts_tb
                (gift_id, name, slug, price, currency, total_available, sold, color, pattern_id, lottie_id)
            VALUES
                ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(gift.id.to_hex())
        .bind(&gift.name)
        .bind(&gift.slug)
        .bind(gift.price)
        .bind(gift.currency.as_str())
        .bind(gift.total_available as i32)
        .bind(gift.sold as i32)
        .bind(&gift.color)
        .bind(&gift.pattern_id)
        .bind(&gift.lottie_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_gift(&self, id: GiftId) -> StoreResult<Option<GiftDefinition>> {
        sqlx::query("SELECT * FROM gifts_tb WHERE gift_id = $1")
            .bind(id.to_hex())
            .fetch_optional(&self.pool)
            .await?
            .map(|row| row_to_gift(&row))
            .transpose()
    }

    async fn get_gift_by_slug(&self, slug: &str) -> StoreResult<Option<GiftDefinition>> {
        sqlx::query("SELECT * FROM gifts_tb WHERE slug = $1")
            .bind(slug)
            .fetch_optional(&self.pool)
            .await?
            .map(|row| row_to_gift(&row))
            .transpose()
    }

    async fn increment_sold_if_available(&self, id: GiftId) -> StoreResult<Option<u32>> {
        let sold: Option<i32> = sqlx::query_scalar(
            r#"
            UPDATE gifts_tb
            SET sold = sold + 1
            WHERE gift_id = $1 AND sold < total_available
            RETURNING sold
            "#,
        )
        .bind(id.to_hex())
        .fetch_optional(&self.pool)
        .await?;

        Ok(sold.map(|s| s as u32))
    }
}

// ============================================================================
// Transactions
// ============================================================================

#[async_trait]
impl TransactionStore for PgStore {
    async fn insert_pending(&self, tx: &Transaction) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO transactions_tb
                (transaction_id, gift_id, sender_id, receiver_id, status, payment_id,
                 price, currency, which, created_at, updated_at)
            VALUES
                ($1, $2, $3, NULL, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(tx.id.to_hex())
        .bind(tx.gift_id.to_hex())
        .bind(tx.sender_id)
        .bind(tx.status.as_str())
        .bind(tx.payment_id)
        .bind(tx.price)
        .bind(tx.currency.as_str())
        .bind(tx.which.map(|w| w as i32))
        .bind(tx.created_at)
        .bind(tx.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_transaction(&self, id: TransactionId) -> StoreResult<Option<Transaction>> {
        self.fetch_transaction_where("transaction_id = $1", TransactionKey::Id(id))
            .await
    }

    async fn find_by_payment(&self, payment_id: PaymentId) -> StoreResult<Option<Transaction>> {
        self.fetch_transaction_where("payment_id = $1", TransactionKey::Payment(payment_id))
            .await
    }

    async fn upsert_completed(&self, values: &CompletedTransaction) -> StoreResult<UpsertOutcome> {
        // Snapshot of a PENDING invoice record, kept for compensation. PENDING
        // rows are only ever rewritten by this statement, so the snapshot is
        // exact whenever our guarded write below wins, unless the invoice row
        // was created in between (see `upsert_outcome`).
        let previous = self
            .find_by_payment(values.payment_id)
            .await?
            .filter(|tx| tx.status == TransactionStatus::Pending);

        let sql = format!(
            r#"
            INSERT INTO transactions_tb
                (transaction_id, gift_id, sender_id, receiver_id, status, payment_id,
                 price, currency, which, created_at, updated_at)
            VALUES
                ($1, $2, $3, NULL, 'COMPLETED', $4, $5, $6, $7, $8, $9)
            ON CONFLICT (payment_id) DO UPDATE SET
                gift_id = EXCLUDED.gift_id,
                sender_id = EXCLUDED.sender_id,
                receiver_id = NULL,
                status = 'COMPLETED',
                price = EXCLUDED.price,
                currency = EXCLUDED.currency,
                which = EXCLUDED.which,
                created_at = EXCLUDED.created_at,
                updated_at = EXCLUDED.updated_at
            WHERE transactions_tb.status = 'PENDING'
            RETURNING {}, (xmax = 0) AS inserted
            "#,
            TRANSACTION_COLUMNS
        );

        let row = sqlx::query(&sql)
            .bind(TransactionId::new().to_hex())
            .bind(values.gift_id.to_hex())
            .bind(values.sender_id)
            .bind(values.payment_id)
            .bind(values.price)
            .bind(values.currency.as_str())
            .bind(values.which.map(|w| w as i32))
            .bind(values.paid_at)
            .bind(values.recorded_at)
            .fetch_optional(&self.pool)
            .await?;

        let Some(row) = row else {
            // Guard failed: the record is already COMPLETED
            let existing = self
                .find_by_payment(values.payment_id)
                .await?
                .ok_or_else(|| {
                    StoreError::Unavailable(format!(
                        "payment {} conflicted with a record that is gone, retry",
                        values.payment_id
                    ))
                })?;
            return Ok(UpsertOutcome::AlreadyCompleted(existing));
        };

        let inserted: bool = row.try_get("inserted")?;
        let transaction = row_to_transaction(&row)?;

        Ok(upsert_outcome(inserted, previous, transaction))
    }

    async fn set_ordinal(&self, id: TransactionId, which: u32) -> StoreResult<()> {
        sqlx::query("UPDATE transactions_tb SET which = $2 WHERE transaction_id = $1")
            .bind(id.to_hex())
            .bind(which as i32)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn revert(&self, revert: &Revert) -> StoreResult<()> {
        match revert {
            Revert::Delete { id, payment_id } => {
                sqlx::query(
                    r#"
                    DELETE FROM transactions_tb
                    WHERE transaction_id = $1 AND payment_id = $2
                      AND status = 'COMPLETED' AND which IS NULL AND receiver_id IS NULL
                    "#,
                )
                .bind(id.to_hex())
                .bind(payment_id)
                .execute(&self.pool)
                .await?;
            }
            Revert::RestorePending(previous) => {
                sqlx::query(
                    r#"
                    UPDATE transactions_tb
                    SET gift_id = $2, sender_id = $3, receiver_id = NULL, status = 'PENDING',
                        price = $4, currency = $5, which = $6, created_at = $7, updated_at = $8
                    WHERE transaction_id = $1 AND status = 'COMPLETED' AND which IS NULL
                      AND receiver_id IS NULL
                    "#,
                )
                .bind(previous.id.to_hex())
                .bind(previous.gift_id.to_hex())
                .bind(previous.sender_id)
                .bind(previous.price)
                .bind(previous.currency.as_str())
                .bind(previous.which.map(|w| w as i32))
                .bind(previous.created_at)
                .bind(previous.updated_at)
                .execute(&self.pool)
                .await?;
            }
        }
        Ok(())
    }

    async fn take_over_unreserved(
        &self,
        id: TransactionId,
        seen: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> StoreResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE transactions_tb
            SET updated_at = $3
            WHERE transaction_id = $1 AND status = 'COMPLETED' AND which IS NULL
              AND updated_at = $2
            "#,
        )
        .bind(id.to_hex())
        .bind(seen)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn bind_receiver_if_unclaimed(
        &self,
        id: TransactionId,
        receiver: UserId,
        now: DateTime<Utc>,
    ) -> StoreResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE transactions_tb
            SET receiver_id = $2, updated_at = $3
            WHERE transaction_id = $1 AND status = 'COMPLETED' AND which IS NOT NULL
              AND receiver_id IS NULL
            "#,
        )
        .bind(id.to_hex())
        .bind(receiver)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}

// ============================================================================
// User directory
// ============================================================================

#[async_trait]
impl UserDirectory for PgStore {
    async fn upsert_profile(
        &self,
        id: UserId,
        profile: &UserProfile,
        now: DateTime<Utc>,
    ) -> StoreResult<User> {
        sqlx::query(
            r#"
            INSERT INTO users_tb
                (telegram_id, first_name, last_name, username, is_premium, total_gifts_count, created_at, updated_at)
            VALUES
                ($1, $2, $3, $4, $5, 0, $6, $6)
            ON CONFLICT (telegram_id) DO UPDATE SET
                first_name = EXCLUDED.first_name,
                last_name = EXCLUDED.last_name,
                username = EXCLUDED.username,
                is_premium = EXCLUDED.is_premium,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(id)
        .bind(&profile.first_name)
        .bind(&profile.last_name)
        .bind(&profile.username)
        .bind(profile.is_premium)
        .bind(now)
        .execute(&self.pool)
        .await?;

        self.get_user(id)
            .await?
            .ok_or_else(|| StoreError::Corrupt(format!("user {} vanished after upsert", id)))
    }

    async fn get_user(&self, id: UserId) -> StoreResult<Option<User>> {
        let Some(row) = sqlx::query("SELECT * FROM users_tb WHERE telegram_id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
        else {
            return Ok(None);
        };

        let mut user = User::new(
            id,
            UserProfile {
                first_name: row.try_get("first_name")?,
                last_name: row.try_get("last_name")?,
                username: row.try_get("username")?,
                is_premium: row.try_get("is_premium")?,
            },
            row.try_get("created_at")?,
        );
        user.total_gifts_count = non_negative(&row, "total_gifts_count")?;
        user.updated_at = row.try_get("updated_at")?;

        let refs = sqlx::query(
            "SELECT transaction_id, set_kind FROM user_transaction_refs_tb WHERE telegram_id = $1",
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?;

        for r in refs {
            let tx: TransactionId = parse_id(&r, "transaction_id")?;
            let kind: i16 = r.try_get("set_kind")?;
            match UserSet::from_id(kind) {
                Some(UserSet::Gifts) => user.gifts.insert(tx),
                Some(UserSet::PendingGifts) => user.pending_gifts.insert(tx),
                Some(UserSet::Transactions) => user.transactions.insert(tx),
                None => {
                    return Err(StoreError::Corrupt(format!("invalid set_kind: {}", kind)));
                }
            };
        }

        Ok(Some(user))
    }

    async fn add_to_sets(
        &self,
        id: UserId,
        sets: &[UserSet],
        tx: TransactionId,
        on_insert: &UserProfile,
        now: DateTime<Utc>,
    ) -> StoreResult<()> {
        let mut db_tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO users_tb
                (telegram_id, first_name, last_name, username, is_premium, total_gifts_count, created_at, updated_at)
            VALUES
                ($1, $2, $3, $4, $5, 0, $6, $6)
            ON CONFLICT (telegram_id) DO UPDATE SET updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(id)
        .bind(&on_insert.first_name)
        .bind(&on_insert.last_name)
        .bind(&on_insert.username)
        .bind(on_insert.is_premium)
        .bind(now)
        .execute(&mut *db_tx)
        .await?;

        for set in sets {
            sqlx::query(
                r#"
                INSERT INTO user_transaction_refs_tb (telegram_id, transaction_id, set_kind)
                VALUES ($1, $2, $3)
                ON CONFLICT DO NOTHING
                "#,
            )
            .bind(id)
            .bind(tx.to_hex())
            .bind(set.id())
            .execute(&mut *db_tx)
            .await?;
        }

        db_tx.commit().await?;
        Ok(())
    }

    async fn remove_from_set(
        &self,
        id: UserId,
        set: UserSet,
        tx: TransactionId,
    ) -> StoreResult<()> {
        sqlx::query(
            r#"
            DELETE FROM user_transaction_refs_tb
            WHERE telegram_id = $1 AND transaction_id = $2 AND set_kind = $3
            "#,
        )
        .bind(id)
        .bind(tx.to_hex())
        .bind(set.id())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn recompute_gift_count(&self, id: UserId) -> StoreResult<u32> {
        let count: Option<i32> = sqlx::query_scalar(
            r#"
            UPDATE users_tb
            SET total_gifts_count = (
                    SELECT COUNT(*)::INTEGER FROM user_transaction_refs_tb
                    WHERE telegram_id = $1 AND set_kind = $2
                ),
                updated_at = NOW()
            WHERE telegram_id = $1
            RETURNING total_gifts_count
            "#,
        )
        .bind(id)
        .bind(UserSet::Gifts.id())
        .fetch_optional(&self.pool)
        .await?;

        Ok(count.unwrap_or(0) as u32)
    }
}
