use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::Row;
use tracing::{debug, info, instrument};
use uuid::Uuid;

use crate::domain::{Balance, Order, OrderStatus, User, Withdrawal};
use crate::error::{Result, TallyError};
use crate::storage::{RegisterOutcome, Store};

const UNIQUE_VIOLATION: &str = "23505";

/// PostgreSQL storage adapter
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Create a new PostgreSQL store
    pub async fn new(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;

        info!("Connected to PostgreSQL");
        Ok(Self { pool })
    }

    /// Create a PostgreSQL store from an existing connection pool
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Run migrations
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        info!("Database migrations completed");
        Ok(())
    }

    /// Get the connection pool
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    fn order_from_row(row: &PgRow) -> Result<Order> {
        let status: String = row.get("status");
        Ok(Order {
            number: row.get("number"),
            uid: row.get("uid"),
            amount: row.get("amount"),
            status: OrderStatus::try_from(status.as_str()).map_err(TallyError::Internal)?,
            uploaded_at: row.get("uploaded_at"),
            processed_at: row.get("processed_at"),
        })
    }

    fn is_unique_violation(err: &sqlx::Error) -> bool {
        matches!(
            err,
            sqlx::Error::Database(db) if db.code().as_deref() == Some(UNIQUE_VIOLATION)
        )
    }
}

#[async_trait]
impl Store for PostgresStore {
    async fn create_user(&self, login: &str, password_hash: &str) -> Result<User> {
        let uid = Uuid::new_v4();
        let result = sqlx::query(
            r#"
            INSERT INTO users (uid, login, password_hash)
            VALUES ($1, $2, $3)
            "#,
        )
        .bind(uid)
        .bind(login)
        .bind(password_hash)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(User {
                uid,
                login: login.to_string(),
                password_hash: password_hash.to_string(),
            }),
            Err(e) if Self::is_unique_violation(&e) => {
                Err(TallyError::LoginTaken(login.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn user_by_login(&self, login: &str) -> Result<Option<User>> {
        let row = sqlx::query(
            r#"
            SELECT uid, login, password_hash FROM users WHERE login = $1
            "#,
        )
        .bind(login)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| User {
            uid: r.get("uid"),
            login: r.get("login"),
            password_hash: r.get("password_hash"),
        }))
    }

    #[instrument(skip(self))]
    async fn register_order(&self, uid: Uuid, number: &str) -> Result<RegisterOutcome> {
        // First claim wins on the primary key; racing inserts serialize in
        // the database, not in application state.
        let inserted = sqlx::query(
            r#"
            INSERT INTO orders (number, uid, status)
            VALUES ($1, $2, 'NEW')
            ON CONFLICT (number) DO NOTHING
            "#,
        )
        .bind(number)
        .bind(uid)
        .execute(&self.pool)
        .await?
        .rows_affected();

        let row = sqlx::query(
            r#"
            SELECT number, uid, amount, status, uploaded_at, processed_at
            FROM orders WHERE number = $1
            "#,
        )
        .bind(number)
        .fetch_one(&self.pool)
        .await?;

        let order = Self::order_from_row(&row)?;

        if inserted > 0 {
            debug!("Order {} registered", number);
            return Ok(RegisterOutcome::Created(order));
        }
        if order.uid == uid {
            return Ok(RegisterOutcome::AlreadyOwned(order));
        }
        Err(TallyError::OrderConflict {
            number: number.to_string(),
        })
    }

    async fn order(&self, number: &str) -> Result<Option<Order>> {
        let row = sqlx::query(
            r#"
            SELECT number, uid, amount, status, uploaded_at, processed_at
            FROM orders WHERE number = $1
            "#,
        )
        .bind(number)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| Self::order_from_row(&r)).transpose()
    }

    async fn orders_by_status(&self, status: OrderStatus) -> Result<Vec<Order>> {
        let rows = sqlx::query(
            r#"
            SELECT number, uid, amount, status, uploaded_at, processed_at
            FROM orders WHERE status = $1
            ORDER BY uploaded_at ASC
            "#,
        )
        .bind(status.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::order_from_row).collect()
    }

    async fn orders_for_user(&self, uid: Uuid) -> Result<Vec<Order>> {
        let rows = sqlx::query(
            r#"
            SELECT number, uid, amount, status, uploaded_at, processed_at
            FROM orders WHERE uid = $1
            ORDER BY uploaded_at ASC
            "#,
        )
        .bind(uid)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::order_from_row).collect()
    }

    async fn mark_processing(&self, number: &str) -> Result<bool> {
        let updated = sqlx::query(
            r#"
            UPDATE orders SET status = 'PROCESSING'
            WHERE number = $1 AND status = 'NEW'
            "#,
        )
        .bind(number)
        .execute(&self.pool)
        .await?
        .rows_affected();

        Ok(updated > 0)
    }

    async fn mark_invalid(&self, number: &str) -> Result<bool> {
        let updated = sqlx::query(
            r#"
            UPDATE orders SET status = 'INVALID', processed_at = NOW()
            WHERE number = $1 AND status IN ('NEW', 'PROCESSING')
            "#,
        )
        .bind(number)
        .execute(&self.pool)
        .await?
        .rows_affected();

        Ok(updated > 0)
    }

    #[instrument(skip(self))]
    async fn credit(&self, number: &str, amount: i64) -> Result<bool> {
        let mut tx = self.pool.begin().await?;

        // Guarded terminal write: applies at most once, however many times
        // the pipeline redelivers the result.
        let row = sqlx::query(
            r#"
            UPDATE orders SET status = 'PROCESSED', amount = $2, processed_at = NOW()
            WHERE number = $1 AND status <> 'PROCESSED'
            RETURNING uid
            "#,
        )
        .bind(number)
        .bind(amount)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(row) = row else {
            tx.rollback().await?;
            if self.order(number).await?.is_none() {
                return Err(TallyError::NotFound(format!("order {}", number)));
            }
            debug!("Order {} already credited, skipping", number);
            return Ok(false);
        };

        let uid: Uuid = row.get("uid");
        sqlx::query(
            r#"
            INSERT INTO balances (uid, current, withdrawn)
            VALUES ($1, $2, 0)
            ON CONFLICT (uid) DO UPDATE SET current = balances.current + EXCLUDED.current
            "#,
        )
        .bind(uid)
        .bind(amount)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        info!("Credited {} minor units for order {}", amount, number);
        Ok(true)
    }

    #[instrument(skip(self))]
    async fn debit(&self, uid: Uuid, number: &str, amount: i64) -> Result<Withdrawal> {
        let mut tx = self.pool.begin().await?;

        // Single guarded update, no read-modify-write split; the row lock
        // serializes concurrent debits on the same balance.
        let updated = sqlx::query(
            r#"
            UPDATE balances SET current = current - $2, withdrawn = withdrawn + $2
            WHERE uid = $1 AND current >= $2
            "#,
        )
        .bind(uid)
        .bind(amount)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if updated == 0 {
            tx.rollback().await?;
            let available = self.balance(uid).await?.current;
            return Err(TallyError::InsufficientFunds {
                requested: amount,
                available,
            });
        }

        let inserted = sqlx::query(
            r#"
            INSERT INTO withdrawals (number, uid, amount)
            VALUES ($1, $2, $3)
            RETURNING processed_at
            "#,
        )
        .bind(number)
        .bind(uid)
        .bind(amount)
        .fetch_one(&mut *tx)
        .await;

        let processed_at = match inserted {
            Ok(row) => row.get("processed_at"),
            Err(e) if Self::is_unique_violation(&e) => {
                tx.rollback().await?;
                return Err(TallyError::DuplicateWithdrawal {
                    number: number.to_string(),
                });
            }
            Err(e) => {
                tx.rollback().await?;
                return Err(e.into());
            }
        };

        tx.commit().await?;
        info!("Withdrew {} minor units as {}", amount, number);
        Ok(Withdrawal {
            number: number.to_string(),
            uid,
            amount,
            processed_at,
        })
    }

    async fn balance(&self, uid: Uuid) -> Result<Balance> {
        let row = sqlx::query(
            r#"
            SELECT current, withdrawn FROM balances WHERE uid = $1
            "#,
        )
        .bind(uid)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row
            .map(|r| Balance {
                current: r.get("current"),
                withdrawn: r.get("withdrawn"),
            })
            .unwrap_or_default())
    }

    async fn withdrawals_for_user(&self, uid: Uuid) -> Result<Vec<Withdrawal>> {
        let rows = sqlx::query(
            r#"
            SELECT number, uid, amount, processed_at
            FROM withdrawals WHERE uid = $1
            ORDER BY processed_at ASC
            "#,
        )
        .bind(uid)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|r| Withdrawal {
                number: r.get("number"),
                uid: r.get("uid"),
                amount: r.get("amount"),
                processed_at: r.get("processed_at"),
            })
            .collect())
    }
}
