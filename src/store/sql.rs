use std::str::FromStr;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use tokio::runtime::Runtime;

use crate::error::StoreError;

use super::Persistence;

/// SQLite-backed key-value table. Queries run on a private current-thread runtime so callers
/// stay synchronous.
pub struct SqlStore {
    runtime: Runtime,
    pool: SqlitePool,
}

impl SqlStore {
    pub fn connect(database_url: &str) -> Result<Self, StoreError> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
        let pool = runtime.block_on(
            SqlitePoolOptions::new()
                .max_connections(1)
                .connect_with(options),
        )?;

        Ok(Self { runtime, pool })
    }

    /// Connects and brings the schema up to date.
    pub fn open(database_url: &str) -> Result<Self, StoreError> {
        let store = Self::connect(database_url)?;
        store.init_db()?;
        Ok(store)
    }

    pub fn init_db(&self) -> Result<(), StoreError> {
        self.runtime
            .block_on(sqlx::migrate!("./migrations").run(&self.pool))?;
        Ok(())
    }
}

impl Persistence for SqlStore {
    fn read(&self, key: &str) -> Result<Option<String>, StoreError> {
        let row = self
            .runtime
            .block_on(
                sqlx::query("SELECT value FROM kv_store WHERE key = ?1")
                    .bind(key)
                    .fetch_optional(&self.pool),
            )
            .map_err(|err| StoreError::Read {
                key: key.to_string(),
                message: err.to_string(),
            })?;

        Ok(row.map(|row| row.get("value")))
    }

    fn write(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.runtime.block_on(
            sqlx::query(
                r#"
                INSERT INTO kv_store (key, value, updated_at)
                VALUES (?1, ?2, strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
                ON CONFLICT (key) DO UPDATE
                SET value = excluded.value, updated_at = excluded.updated_at
                "#,
            )
            .bind(key)
            .bind(value)
            .execute(&self.pool),
        )
        .map_err(|err| StoreError::Write {
            key: key.to_string(),
            message: err.to_string(),
        })?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_url(dir: &tempfile::TempDir) -> String {
        format!("sqlite://{}", dir.path().join("portfolio.db").display())
    }

    #[test]
    fn missing_key_reads_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqlStore::open(&temp_url(&dir)).unwrap();
        assert_eq!(store.read("progress_records").unwrap(), None);
    }

    #[test]
    fn closed_pool_reports_keyed_errors() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqlStore::open(&temp_url(&dir)).unwrap();
        store.runtime.block_on(store.pool.close());

        assert!(matches!(
            store.read("progress_records"),
            Err(StoreError::Read { key, .. }) if key == "progress_records"
        ));
        assert!(matches!(
            store.write("progress_records", "[]"),
            Err(StoreError::Write { key, .. }) if key == "progress_records"
        ));
    }

    #[test]
    fn values_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let url = temp_url(&dir);
        {
            let store = SqlStore::open(&url).unwrap();
            store.write("progress_records", "[]").unwrap();
            store.write("progress_records", "[1]").unwrap();
        }

        let store = SqlStore::open(&url).unwrap();
        assert_eq!(
            store.read("progress_records").unwrap().as_deref(),
            Some("[1]")
        );
    }
}
