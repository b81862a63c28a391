use std::str::FromStr;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Sqlite, SqliteConnection, SqlitePool, Transaction};

use crate::config::DatabaseConfig;
use crate::error::{AppError, Result};
use crate::models::{FileRecord, NewFileRecord};

// Age in whole seconds by the database clock; 'now' is fixed for the duration of one statement
const SELECT_OLDER_THAN: &str = "SELECT * FROM files \
     WHERE strftime('%s', 'now') - strftime('%s', timestamp) >= ? ORDER BY id ASC";
const DELETE_OLDER_THAN: &str = "DELETE FROM files \
     WHERE strftime('%s', 'now') - strftime('%s', timestamp) >= ? RETURNING *";

/// Persistent index of [`FileRecord`]s
#[derive(Clone)]
pub struct MetadataStore {
    pool: SqlitePool,
}

impl MetadataStore {
    /// Capture connection settings. No connection is made until [`open`](Self::open).
    pub fn new(config: &DatabaseConfig) -> Result<Self> {
        let pool = if config.is_in_memory() {
            // Every pooled connection to `:memory:` is its own database, so keep exactly one alive
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None::<Duration>)
                .max_lifetime(None::<Duration>)
                .connect_lazy_with(SqliteConnectOptions::from_str("sqlite::memory:")?)
        } else {
            let options = SqliteConnectOptions::new()
                .filename(&config.path)
                .create_if_missing(true);
            SqlitePoolOptions::new()
                .max_connections(config.max_connections.max(1))
                .connect_lazy_with(options)
        };

        Ok(Self { pool })
    }

    /// Initialise the schema and hand back the ready store
    pub async fn open(self) -> Result<Self> {
        self.init_schema().await?;
        Ok(self)
    }

    /// Get the connection pool
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Create the files table and its indexes if absent
    pub async fn init_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS files (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                filename TEXT NOT NULL,
                directory TEXT NOT NULL,
                owner TEXT NOT NULL,
                filesize INTEGER NOT NULL,
                filetype TEXT NOT NULL DEFAULT '',
                timestamp TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
                hashedname TEXT NOT NULL,
                UNIQUE (filename, owner)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_files_hashedname_owner ON files(hashedname, owner)",
        )
        .execute(&self.pool)
        .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_files_owner ON files(owner)")
            .execute(&self.pool)
            .await?;

        tracing::info!("Database schema ready");
        Ok(())
    }

    /// Start a transaction. Deletes hold it until their blobs are gone, so the
    /// row stays visible to writers of the same pair in the meantime.
    pub async fn begin(&self) -> Result<Transaction<'static, Sqlite>> {
        Ok(self.pool.begin().await?)
    }

    pub async fn find_by_filename_and_owner(
        &self,
        filename: &str,
        owner: &str,
    ) -> Result<Option<FileRecord>> {
        let record = sqlx::query_as("SELECT * FROM files WHERE filename = ? AND owner = ?")
            .bind(filename)
            .bind(owner)
            .fetch_optional(&self.pool)
            .await?;

        Ok(record)
    }

    /// Insert a record, failing with `Duplicate` if the owner already has that filename
    pub async fn insert(&self, record: &NewFileRecord) -> Result<FileRecord> {
        let created = sqlx::query_as(
            r#"
            INSERT INTO files (filename, directory, owner, filesize, filetype, hashedname)
            VALUES (?, ?, ?, ?, ?, ?)
            RETURNING *
            "#,
        )
        .bind(&record.filename)
        .bind(&record.directory)
        .bind(&record.owner)
        .bind(record.filesize)
        .bind(&record.filetype)
        .bind(&record.hashedname)
        .fetch_one(&self.pool)
        .await
        .map_err(unique_violation_to_duplicate)?;

        Ok(created)
    }

    pub async fn find_by_hashed_name_and_owner(
        &self,
        hashedname: &str,
        owner: &str,
    ) -> Result<FileRecord> {
        sqlx::query_as("SELECT * FROM files WHERE hashedname = ? AND owner = ?")
            .bind(hashedname)
            .bind(owner)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound("File does not exist".to_string()))
    }

    pub async fn find_by_id(&self, id: i64) -> Result<FileRecord> {
        sqlx::query_as("SELECT * FROM files WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound("File does not exist".to_string()))
    }

    /// All of `owner`'s records in insertion order
    pub async fn list_by_owner(&self, owner: &str) -> Result<Vec<FileRecord>> {
        let records = sqlx::query_as("SELECT * FROM files WHERE owner = ? ORDER BY id ASC")
            .bind(owner)
            .fetch_all(&self.pool)
            .await?;

        Ok(records)
    }

    /// Delete a record, returning the removed row
    pub async fn delete_by_id(&self, id: i64) -> Result<FileRecord> {
        let mut conn = self.pool.acquire().await?;
        Self::delete_by_id_on(&mut conn, id).await
    }

    /// [`delete_by_id`](Self::delete_by_id) on a caller-held connection or transaction
    pub async fn delete_by_id_on(conn: &mut SqliteConnection, id: i64) -> Result<FileRecord> {
        let deleted = sqlx::query_as("DELETE FROM files WHERE id = ? RETURNING *")
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?
            .ok_or_else(|| AppError::NotFound("File does not exist".to_string()))?;

        tracing::debug!("Deleted file record {}", id);
        Ok(deleted)
    }

    /// Records at least `age_secs` old.
    ///
    /// Read-only preview of [`delete_older_than`](Self::delete_older_than); the
    /// sweep does not call it, since its result could be stale by the time of
    /// the delete.
    pub async fn find_older_than(&self, age_secs: i64) -> Result<Vec<FileRecord>> {
        let records = sqlx::query_as(SELECT_OLDER_THAN)
            .bind(age_secs)
            .fetch_all(&self.pool)
            .await?;

        Ok(records)
    }

    /// Delete every record at least `age_secs` old in one statement, returning the removed rows
    pub async fn delete_older_than(&self, age_secs: i64) -> Result<Vec<FileRecord>> {
        let mut conn = self.pool.acquire().await?;
        Self::delete_older_than_on(&mut conn, age_secs).await
    }

    /// [`delete_older_than`](Self::delete_older_than) on a caller-held connection or transaction
    pub async fn delete_older_than_on(
        conn: &mut SqliteConnection,
        age_secs: i64,
    ) -> Result<Vec<FileRecord>> {
        let mut deleted: Vec<FileRecord> = sqlx::query_as(DELETE_OLDER_THAN)
            .bind(age_secs)
            .fetch_all(&mut *conn)
            .await?;
        deleted.sort_by_key(|record| record.id);

        tracing::debug!("Deleted {} file records older than {}s", deleted.len(), age_secs);
        Ok(deleted)
    }
}

fn unique_violation_to_duplicate(err: sqlx::Error) -> AppError {
    if let sqlx::Error::Database(db_err) = &err {
        if db_err.is_unique_violation() {
            return AppError::Duplicate("File already exists".to_string());
        }
    }
    AppError::Database(err)
}
