//! Postgres-backed movement store.
//!
//! Each batch is written inside one transaction, so a transfer pair or a split
//! is either fully committed or not at all. Reads are single `SELECT`s and
//! therefore see one consistent snapshot.
//!
//! ## Error Mapping
//!
//! | SQLx Error | PostgreSQL Error Code | StoreError | Scenario |
//! |------------|----------------------|------------|----------|
//! | Database (unique violation) | `23505` | `WriteAborted` | Duplicate movement id |
//! | Database (check constraint violation) | `23514` | `InvalidBatch` | Row violates a table invariant |
//! | Database (other) | Any other | `WriteAborted` | Transaction rolled back |
//! | PoolClosed | N/A | `Backend` | Connection pool was closed |
//! | Other | N/A | `Backend` | Network errors, decoding failures, etc. |

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{PgPool, Row};
use tokio::runtime::RuntimeFlavor;
use tracing::{Span, info, instrument};
use uuid::Uuid;

use splitledger_core::{BatchId, CategoryId, CurrencyCode, MovementId, ParticipantId, WalletId};
use splitledger_ledger::{CurrencyAudit, Movement, MovementDraft, MovementKind};

use super::r#trait::{MovementStore, StoreError, batch_wallet};
use crate::config::{DATABASE_URL_ENV, EngineConfig};

/// Schema for the `movements` table.
pub const MIGRATION: &str = include_str!("../../migrations/0001_create_movements.sql");

const SELECT_COLUMNS: &str = r#"
    SELECT
        id, batch_id, wallet_id, participant_id, kind, amount_base,
        category_id, notes, tags, occurred_at, recorded_at, archived,
        original_amount, original_currency, exchange_rate
    FROM movements
"#;

/// Postgres-backed movement store.
///
/// `Send + Sync`; shares the SQLx pool across threads.
#[derive(Debug, Clone)]
pub struct PostgresMovementStore {
    pool: Arc<PgPool>,
}

impl PostgresMovementStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    /// Connect to `database_url` and return a store (does not run migrations).
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let pool = PgPool::connect(database_url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        Ok(Self::new(pool))
    }

    /// Connect using `config.database_url` and apply the schema.
    pub async fn from_config(config: &EngineConfig) -> Result<Self, StoreError> {
        let url = config.database_url.as_deref().ok_or_else(|| {
            StoreError::Backend(format!("{DATABASE_URL_ENV} is not set"))
        })?;
        let store = Self::connect(url).await?;
        store.migrate().await?;
        info!("postgres movement store ready");
        Ok(store)
    }

    /// Create the `movements` table and its indexes if missing.
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::raw_sql(MIGRATION)
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("migrate", e))?;
        Ok(())
    }

    /// Insert every draft inside one transaction.
    #[instrument(
        skip(self, drafts),
        fields(
            draft_count = drafts.len(),
            wallet_id = tracing::field::Empty,
            committed = tracing::field::Empty
        ),
        err
    )]
    pub async fn append_batch_async(
        &self,
        drafts: Vec<MovementDraft>,
    ) -> Result<Vec<Movement>, StoreError> {
        let Some(wallet_id) = batch_wallet(&drafts)? else {
            return Ok(vec![]);
        };

        let span = Span::current();
        span.record("wallet_id", tracing::field::display(wallet_id));

        let batch_id = BatchId::new();
        let recorded_at = Utc::now();

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        let mut stored = Vec::with_capacity(drafts.len());
        for draft in drafts {
            let movement = Movement::from_draft(draft, MovementId::new(), batch_id, recorded_at);
            let audit = movement.currency.as_ref();

            // Dropping `tx` on error rolls the whole batch back.
            sqlx::query(
                r#"
                INSERT INTO movements (
                    id, batch_id, wallet_id, participant_id, kind, amount_base,
                    category_id, notes, tags, occurred_at, recorded_at, archived,
                    original_amount, original_currency, exchange_rate
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, FALSE, $12, $13, $14)
                "#,
            )
            .bind(movement.id.as_uuid())
            .bind(movement.batch_id.as_uuid())
            .bind(movement.wallet_id.as_uuid())
            .bind(movement.participant_id.as_uuid())
            .bind(movement.kind.as_str())
            .bind(movement.amount_base)
            .bind(movement.category_id.map(Uuid::from))
            .bind(movement.notes.as_deref())
            .bind(&movement.tags)
            .bind(movement.occurred_at)
            .bind(movement.recorded_at)
            .bind(audit.map(|a| a.original_amount))
            .bind(audit.map(|a| a.original_currency.as_str()))
            .bind(audit.map(|a| a.exchange_rate))
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("insert_movement", e))?;

            stored.push(movement);
        }

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;

        span.record("committed", stored.len());
        Ok(stored)
    }

    /// Archive a movement together with its batch siblings.
    #[instrument(skip_all, fields(movement_id = %movement_id), err)]
    pub async fn archive_async(&self, movement_id: MovementId) -> Result<Vec<MovementId>, StoreError> {
        let rows = sqlx::query(
            r#"
            UPDATE movements
            SET archived = TRUE
            WHERE batch_id = (SELECT batch_id FROM movements WHERE id = $1)
            RETURNING id
            "#,
        )
        .bind(movement_id.as_uuid())
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("archive", e))?;

        if rows.is_empty() {
            return Err(StoreError::NotFound(movement_id));
        }

        rows.iter()
            .map(|row| {
                row.try_get::<Uuid, _>("id")
                    .map(MovementId::from_uuid)
                    .map_err(|e| StoreError::Backend(format!("failed to read id: {e}")))
            })
            .collect()
    }

    pub async fn get_async(&self, movement_id: MovementId) -> Result<Option<Movement>, StoreError> {
        let sql = format!("{SELECT_COLUMNS} WHERE id = $1");
        let row = sqlx::query(&sql)
            .bind(movement_id.as_uuid())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("get", e))?;

        row.as_ref().map(movement_from_row).transpose()
    }

    #[instrument(skip_all, fields(wallet_id = %wallet_id), err)]
    pub async fn list_async(
        &self,
        wallet_id: WalletId,
        include_archived: bool,
    ) -> Result<Vec<Movement>, StoreError> {
        let sql = format!(
            "{SELECT_COLUMNS} WHERE wallet_id = $1 AND ($2 OR NOT archived) ORDER BY occurred_at, id"
        );
        let rows = sqlx::query(&sql)
            .bind(wallet_id.as_uuid())
            .bind(include_archived)
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("list", e))?;

        rows.iter().map(movement_from_row).collect()
    }
}

fn movement_from_row(row: &sqlx::postgres::PgRow) -> Result<Movement, StoreError> {
    let decode = |e: sqlx::Error| StoreError::Backend(format!("failed to decode movement row: {e}"));

    let kind: String = row.try_get("kind").map_err(decode)?;
    let kind = kind
        .parse::<MovementKind>()
        .map_err(|e| StoreError::Backend(e.to_string()))?;

    let original_amount: Option<Decimal> = row.try_get("original_amount").map_err(decode)?;
    let original_currency: Option<String> = row.try_get("original_currency").map_err(decode)?;
    let exchange_rate: Option<Decimal> = row.try_get("exchange_rate").map_err(decode)?;

    let currency = match (original_amount, original_currency, exchange_rate) {
        (Some(original_amount), Some(code), Some(exchange_rate)) => Some(CurrencyAudit {
            original_amount,
            original_currency: CurrencyCode::new(&code)
                .map_err(|e| StoreError::Backend(e.to_string()))?,
            exchange_rate,
        }),
        (None, None, None) => None,
        _ => {
            return Err(StoreError::Backend(
                "currency audit columns must be all set or all null".to_string(),
            ));
        }
    };

    Ok(Movement {
        id: MovementId::from_uuid(row.try_get("id").map_err(decode)?),
        batch_id: BatchId::from_uuid(row.try_get("batch_id").map_err(decode)?),
        wallet_id: WalletId::from_uuid(row.try_get("wallet_id").map_err(decode)?),
        participant_id: ParticipantId::from_uuid(row.try_get("participant_id").map_err(decode)?),
        kind,
        amount_base: row.try_get("amount_base").map_err(decode)?,
        category_id: row
            .try_get::<Option<Uuid>, _>("category_id")
            .map_err(decode)?
            .map(CategoryId::from_uuid),
        notes: row.try_get("notes").map_err(decode)?,
        tags: row.try_get("tags").map_err(decode)?,
        occurred_at: row.try_get::<DateTime<Utc>, _>("occurred_at").map_err(decode)?,
        recorded_at: row.try_get::<DateTime<Utc>, _>("recorded_at").map_err(decode)?,
        archived: row.try_get("archived").map_err(decode)?,
        currency,
    })
}

/// Map SQLx errors to StoreError.
fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());
            match db_err.code().as_deref() {
                Some("23514") => StoreError::InvalidBatch(msg),
                _ => StoreError::WriteAborted(msg),
            }
        }
        sqlx::Error::PoolClosed => {
            StoreError::Backend(format!("connection pool closed in {operation}"))
        }
        _ => StoreError::Backend(format!("sqlx error in {operation}: {err}")),
    }
}

/// Run a future to completion from synchronous trait code.
///
/// Requires a multi-threaded tokio runtime (`block_in_place`); any other
/// context is reported as a backend error.
fn block_on<F, T>(fut: F) -> Result<T, StoreError>
where
    F: std::future::Future<Output = Result<T, StoreError>>,
{
    let handle = tokio::runtime::Handle::try_current().map_err(|_| {
        StoreError::Backend(
            "PostgresMovementStore requires a tokio runtime; call it from within one".to_string(),
        )
    })?;
    if !matches!(handle.runtime_flavor(), RuntimeFlavor::MultiThread) {
        return Err(StoreError::Backend(
            "PostgresMovementStore requires a multi-threaded tokio runtime".to_string(),
        ));
    }
    tokio::task::block_in_place(|| handle.block_on(fut))
}

impl MovementStore for PostgresMovementStore {
    fn append_batch(&self, drafts: Vec<MovementDraft>) -> Result<Vec<Movement>, StoreError> {
        block_on(self.append_batch_async(drafts))
    }

    fn archive(&self, movement_id: MovementId) -> Result<Vec<MovementId>, StoreError> {
        block_on(self.archive_async(movement_id))
    }

    fn get(&self, movement_id: MovementId) -> Result<Option<Movement>, StoreError> {
        block_on(self.get_async(movement_id))
    }

    fn list_active(&self, wallet_id: WalletId) -> Result<Vec<Movement>, StoreError> {
        block_on(self.list_async(wallet_id, false))
    }

    fn list_all(&self, wallet_id: WalletId) -> Result<Vec<Movement>, StoreError> {
        block_on(self.list_async(wallet_id, true))
    }
}
