//! # Async Database Management Module (sqlx + SQLite)
//!
//! Persistent state for the assignment engine: the agent capacity store, the
//! queue store, ticket rows and the append-only assignment audit trail.
//!
//! ## Layout
//!
//! Reads that stand alone are methods on [`DatabaseManager`]. Writes that must be
//! part of a larger atomic unit are free functions taking a `&mut SqliteConnection`
//! so the engine can compose them inside one transaction:
//!
//! ```rust,no_run
//! use deskroute_assignment_engine::database::DatabaseManager;
//!
//! # async fn example() -> deskroute_assignment_engine::Result<()> {
//! let db = DatabaseManager::new_in_memory().await?;
//!
//! let mut tx = db.begin().await?;
//! // ... several statements against &mut *tx ...
//! tx.commit().await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Concurrency
//!
//! Every multi-row transition is guarded by conditional `UPDATE`s (for example
//! `current_load < max_load`) whose affected-row count decides the outcome, so two
//! processes sharing one database file cannot both win the same ticket or lose a
//! load increment. SQLite busy/locked errors are retried by [`retry::retry_transient`].

pub mod agents;
pub mod assignments;
pub mod queue;
pub mod retry;
pub mod tenants;
pub mod tickets;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Sqlite, SqlitePool, Transaction};
use std::str::FromStr;
use tracing::{debug, error, info};

use crate::config::DatabaseConfig;
use crate::error::Result;

pub use retry::retry_transient;

/// Main database manager using sqlx for async operations
#[derive(Clone)]
pub struct DatabaseManager {
    pool: SqlitePool,
}

impl DatabaseManager {
    /// Open (or create) the database described by `config` and run migrations
    pub async fn new(config: &DatabaseConfig) -> Result<Self> {
        info!("🗄️ Initializing sqlx database manager: {}", config.url);

        let mut options = SqliteConnectOptions::from_str(&config.url)?
            .busy_timeout(config.busy_timeout())
            .foreign_keys(true)
            .create_if_missing(true);

        // A private in-memory database exists once per connection, so the pool
        // must hold exactly one connection for the lifetime of the manager.
        let pool = if config.is_in_memory() {
            SqlitePoolOptions::new()
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
                .connect_with(options)
                .await?
        } else {
            options = options
                .journal_mode(SqliteJournalMode::Wal)
                .synchronous(SqliteSynchronous::Normal);
            SqlitePoolOptions::new()
                .max_connections(config.max_connections)
                .connect_with(options)
                .await?
        };

        sqlx::migrate!("./migrations").run(&pool).await?;

        info!("✅ Database manager initialized successfully");
        Ok(Self { pool })
    }

    /// Create an in-memory database for testing
    pub async fn new_in_memory() -> Result<Self> {
        Self::new(&DatabaseConfig {
            url: "sqlite::memory:".to_string(),
            ..DatabaseConfig::default()
        })
        .await
    }

    /// Get a reference to the connection pool
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Start a new database transaction
    ///
    /// Never touch [`pool`](Self::pool) while a transaction is open: an in-memory
    /// database has a single connection and the call would wait forever.
    pub async fn begin(&self) -> Result<Transaction<'static, Sqlite>> {
        Ok(self.pool.begin().await?)
    }

    /// Execute a health check query
    pub async fn health_check(&self) -> bool {
        match sqlx::query("SELECT 1").execute(&self.pool).await {
            Ok(_) => {
                debug!("💚 Database health check passed");
                true
            }
            Err(e) => {
                error!("❌ Database health check failed: {}", e);
                false
            }
        }
    }

    /// Close every pooled connection
    pub async fn close(&self) {
        self.pool.close().await;
    }
}
