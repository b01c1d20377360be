//! Postgres-backed store.
//!
//! Schema lives in `migrations/0001_init.sql`. Every `apply` batch runs in a single
//! transaction; dropping the future mid-batch drops the transaction, which rolls back.
//!
//! ## Error Mapping
//!
//! | SQLx Error | PostgreSQL Error Code | PersistenceError |
//! |------------|----------------------|------------------|
//! | Database (unique violation) | `23505` | `UniqueViolation` |
//! | Database (other) | Any other | `Database` |
//! | PoolClosed / network / other | N/A | `Database` |
//! | Row decode failure | N/A | `Corrupt` |

use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Postgres, Row, Transaction};
use tracing::{debug, instrument, Span};
use uuid::Uuid;

use super::{
    Change, LinkedAccountRecord, PersistenceError, Store, UserKey, UserRecord, VehicleKey,
    VehicleRecord,
};
use crate::config::DatabaseConfig;

const USER_COLUMNS: &str = r#"
    u.id, u.external_id, u.email, u.display_name, u.created_at, u.last_login_at,
    la.tesla_account_id, la.linked_at, la.is_active AS account_is_active,
    la.access_token_enc, la.refresh_token_enc, la.token_expires_at,
    la.last_synced_at AS account_last_synced_at
"#;

const VEHICLE_COLUMNS: &str = r#"
    id, tesla_account_id, vehicle_identifier, display_name, linked_at, last_synced_at, is_active
"#;

/// Postgres store. `Send + Sync`; clones share the pool.
#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Open a pool sized from configuration.
    #[instrument(skip(config), fields(max_connections = config.max_connections), err)]
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, PersistenceError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .connect(&config.url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait::async_trait]
impl Store for PostgresStore {
    #[instrument(skip(self), err)]
    async fn find_user(&self, key: UserKey<'_>) -> Result<Option<UserRecord>, PersistenceError> {
        let base = format!(
            "SELECT {USER_COLUMNS} FROM users u LEFT JOIN linked_accounts la ON la.user_id = u.id"
        );
        let row = match key {
            UserKey::Id(id) => {
                sqlx::query(&format!("{base} WHERE u.id = $1"))
                    .bind(id)
                    .fetch_optional(&self.pool)
                    .await
            }
            UserKey::ExternalId(external_id) => {
                sqlx::query(&format!("{base} WHERE u.external_id = $1"))
                    .bind(external_id)
                    .fetch_optional(&self.pool)
                    .await
            }
            UserKey::Email(email) => {
                sqlx::query(&format!("{base} WHERE u.email = $1"))
                    .bind(email)
                    .fetch_optional(&self.pool)
                    .await
            }
        }
        .map_err(|e| map_sqlx_error("find_user", e))?;

        row.as_ref().map(user_from_row).transpose()
    }

    #[instrument(skip(self), err)]
    async fn find_vehicle(
        &self,
        key: VehicleKey<'_>,
    ) -> Result<Option<VehicleRecord>, PersistenceError> {
        let row = match key {
            VehicleKey::Id(id) => {
                sqlx::query(&format!("SELECT {VEHICLE_COLUMNS} FROM vehicles WHERE id = $1"))
                    .bind(id)
                    .fetch_optional(&self.pool)
                    .await
            }
            VehicleKey::Identifier {
                tesla_account_id,
                vehicle_identifier,
            } => {
                sqlx::query(&format!(
                    r#"
                    SELECT {VEHICLE_COLUMNS}
                    FROM vehicles
                    WHERE tesla_account_id = $1 AND vehicle_identifier = $2
                    ORDER BY is_active DESC, linked_at DESC
                    LIMIT 1
                    "#
                ))
                .bind(tesla_account_id)
                .bind(vehicle_identifier)
                .fetch_optional(&self.pool)
                .await
            }
        }
        .map_err(|e| map_sqlx_error("find_vehicle", e))?;

        row.as_ref().map(vehicle_from_row).transpose()
    }

    #[instrument(skip(self), fields(vehicle_count = tracing::field::Empty), err)]
    async fn list_vehicles(
        &self,
        tesla_account_id: &str,
    ) -> Result<Vec<VehicleRecord>, PersistenceError> {
        let span = Span::current();

        let rows = sqlx::query(&format!(
            r#"
            SELECT {VEHICLE_COLUMNS}
            FROM vehicles
            WHERE tesla_account_id = $1
            ORDER BY linked_at ASC, id ASC
            "#
        ))
        .bind(tesla_account_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_vehicles", e))?;

        span.record("vehicle_count", rows.len());
        rows.iter().map(vehicle_from_row).collect()
    }

    #[instrument(skip(self, changes), fields(change_count = changes.len()), err)]
    async fn apply(&self, changes: Vec<Change>) -> Result<usize, PersistenceError> {
        if changes.is_empty() {
            return Ok(0);
        }

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        let count = changes.len();
        for change in &changes {
            debug!(change = change.kind(), "applying change");
            apply_change(&mut tx, change).await?;
        }

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;
        Ok(count)
    }
}

async fn apply_change(
    tx: &mut Transaction<'_, Postgres>,
    change: &Change,
) -> Result<(), PersistenceError> {
    match change {
        Change::InsertUser(user) => {
            sqlx::query(
                r#"
                INSERT INTO users (id, external_id, email, display_name, created_at, last_login_at)
                VALUES ($1, $2, $3, $4, $5, $6)
                "#,
            )
            .bind(user.id)
            .bind(&user.external_id)
            .bind(&user.email)
            .bind(&user.display_name)
            .bind(user.created_at)
            .bind(user.last_login_at)
            .execute(&mut **tx)
            .await
            .map_err(|e| map_sqlx_error("insert_user", e))?;

            upsert_linked_account(tx, user).await
        }
        Change::UpdateUser(user) => {
            // external_id and created_at are immutable and never rewritten.
            let result = sqlx::query(
                r#"
                UPDATE users
                SET email = $2, display_name = $3, last_login_at = $4
                WHERE id = $1
                "#,
            )
            .bind(user.id)
            .bind(&user.email)
            .bind(&user.display_name)
            .bind(user.last_login_at)
            .execute(&mut **tx)
            .await
            .map_err(|e| map_sqlx_error("update_user", e))?;

            if result.rows_affected() == 0 {
                return Err(PersistenceError::RowMissing {
                    table: "users",
                    id: user.id,
                });
            }
            upsert_linked_account(tx, user).await
        }
        Change::InsertVehicle(vehicle) => {
            sqlx::query(
                r#"
                INSERT INTO vehicles (
                    id, tesla_account_id, vehicle_identifier, display_name,
                    linked_at, last_synced_at, is_active
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                "#,
            )
            .bind(vehicle.id)
            .bind(&vehicle.tesla_account_id)
            .bind(&vehicle.vehicle_identifier)
            .bind(&vehicle.display_name)
            .bind(vehicle.linked_at)
            .bind(vehicle.last_synced_at)
            .bind(vehicle.is_active)
            .execute(&mut **tx)
            .await
            .map_err(|e| map_sqlx_error("insert_vehicle", e))?;
            Ok(())
        }
        Change::UpdateVehicle(vehicle) => {
            let result = sqlx::query(
                r#"
                UPDATE vehicles
                SET display_name = $2, last_synced_at = $3, is_active = $4
                WHERE id = $1
                "#,
            )
            .bind(vehicle.id)
            .bind(&vehicle.display_name)
            .bind(vehicle.last_synced_at)
            .bind(vehicle.is_active)
            .execute(&mut **tx)
            .await
            .map_err(|e| map_sqlx_error("update_vehicle", e))?;

            if result.rows_affected() == 0 {
                return Err(PersistenceError::RowMissing {
                    table: "vehicles",
                    id: vehicle.id,
                });
            }
            Ok(())
        }
    }
}

/// One linked-account row per user; a relink overwrites it in place.
async fn upsert_linked_account(
    tx: &mut Transaction<'_, Postgres>,
    user: &UserRecord,
) -> Result<(), PersistenceError> {
    let Some(acc) = user.linked_account.as_ref() else {
        return Ok(());
    };

    sqlx::query(
        r#"
        INSERT INTO linked_accounts (
            user_id, tesla_account_id, linked_at, is_active,
            access_token_enc, refresh_token_enc, token_expires_at, last_synced_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        ON CONFLICT (user_id) DO UPDATE SET
            tesla_account_id = EXCLUDED.tesla_account_id,
            linked_at = EXCLUDED.linked_at,
            is_active = EXCLUDED.is_active,
            access_token_enc = EXCLUDED.access_token_enc,
            refresh_token_enc = EXCLUDED.refresh_token_enc,
            token_expires_at = EXCLUDED.token_expires_at,
            last_synced_at = EXCLUDED.last_synced_at
        "#,
    )
    .bind(user.id)
    .bind(&acc.tesla_account_id)
    .bind(acc.linked_at)
    .bind(acc.is_active)
    .bind(&acc.access_token_enc)
    .bind(&acc.refresh_token_enc)
    .bind(acc.token_expires_at)
    .bind(acc.last_synced_at)
    .execute(&mut **tx)
    .await
    .map_err(|e| map_sqlx_error("upsert_linked_account", e))?;
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// Row mapping
// ─────────────────────────────────────────────────────────────────────────────

fn column<'r, T>(row: &'r PgRow, name: &str) -> Result<T, PersistenceError>
where
    T: sqlx::Decode<'r, Postgres> + sqlx::Type<Postgres>,
{
    row.try_get(name)
        .map_err(|e| PersistenceError::Corrupt(format!("failed to read {name}: {e}")))
}

fn user_from_row(row: &PgRow) -> Result<UserRecord, PersistenceError> {
    let tesla_account_id: Option<String> = column(row, "tesla_account_id")?;
    let linked_account = match tesla_account_id {
        None => None,
        Some(tesla_account_id) => {
            let linked_at: DateTime<Utc> = column(row, "linked_at")?;
            Some(LinkedAccountRecord {
                tesla_account_id,
                linked_at,
                is_active: column(row, "account_is_active")?,
                access_token_enc: column(row, "access_token_enc")?,
                refresh_token_enc: column(row, "refresh_token_enc")?,
                token_expires_at: column(row, "token_expires_at")?,
                last_synced_at: column(row, "account_last_synced_at")?,
            })
        }
    };

    Ok(UserRecord {
        id: column::<Uuid>(row, "id")?,
        external_id: column(row, "external_id")?,
        email: column(row, "email")?,
        display_name: column(row, "display_name")?,
        created_at: column(row, "created_at")?,
        last_login_at: column(row, "last_login_at")?,
        linked_account,
    })
}

fn vehicle_from_row(row: &PgRow) -> Result<VehicleRecord, PersistenceError> {
    Ok(VehicleRecord {
        id: column(row, "id")?,
        tesla_account_id: column(row, "tesla_account_id")?,
        vehicle_identifier: column(row, "vehicle_identifier")?,
        display_name: column(row, "display_name")?,
        linked_at: column(row, "linked_at")?,
        last_synced_at: column(row, "last_synced_at")?,
        is_active: column(row, "is_active")?,
    })
}

/// Map SQLx errors to PersistenceError.
fn map_sqlx_error(operation: &str, err: sqlx::Error) -> PersistenceError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("{} in {}", db_err.message(), operation);
            match db_err.code().as_deref() {
                Some("23505") => PersistenceError::UniqueViolation(
                    db_err.constraint().map(str::to_string).unwrap_or(msg),
                ),
                _ => PersistenceError::Database(msg),
            }
        }
        sqlx::Error::PoolClosed => {
            PersistenceError::Database(format!("connection pool closed in {operation}"))
        }
        sqlx::Error::ColumnDecode { index, source } => {
            PersistenceError::Corrupt(format!("column {index} in {operation}: {source}"))
        }
        _ => PersistenceError::Database(format!("sqlx error in {operation}: {err}")),
    }
}
