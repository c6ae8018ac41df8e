use anyhow::Context;
use chrono::Utc;
use serde::{de::DeserializeOwned, Serialize};
use sqlx::{
    migrate::MigrateDatabase,
    sqlite::SqlitePoolOptions,
    Row, Sqlite, SqlitePool,
};
use std::path::Path;

/// Keys of the JSON blobs kept in local storage.
pub mod keys {
    pub const ENDPOINTS: &str = "flowise-endpoints";
    pub const CHATS: &str = "flowise-chats";
    pub const HISTORY_CONFIG: &str = "flowise-history-config";
    pub const WHISPER_CONFIG: &str = "whisper-config";
    pub const OPENAI_API_KEY: &str = "openai-api-key";
}

// Local storage is a flat key-value table; every value is a whole JSON blob
const MIGRATIONS_SQL: &str = "
CREATE TABLE IF NOT EXISTS local_storage (
    key TEXT PRIMARY KEY NOT NULL,
    value TEXT NOT NULL,
    updated_at INTEGER NOT NULL -- Unix Timestamp (milliseconds)
);
";

#[derive(Debug)]
pub struct StorageManager {
    pool: SqlitePool,
}

impl StorageManager {
    /// Opens (creating if needed) the database at `db_path` and runs migrations.
    pub async fn new(db_path: &Path) -> Result<Self, anyhow::Error> {
        // Ensure the parent directory exists
        if let Some(parent) = db_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .context("Failed to create database directory")?;
        }

        let db_url = format!("sqlite://{}?mode=rwc", db_path.to_string_lossy());
        log::info!("Connecting to database: {}", db_url);

        if !Sqlite::database_exists(&db_url).await.unwrap_or(false) {
            log::info!("Database file not found, creating...");
            Sqlite::create_database(&db_url)
                .await
                .context("Failed to create database")?;
        }

        let pool = SqlitePoolOptions::new()
            .connect(&db_url)
            .await
            .context("Failed to connect to SQLite database")?;

        Self::run_migrations(&pool).await?;
        Ok(Self { pool })
    }

    /// In-memory database. A single connection that never expires, since every
    /// new connection would see an empty database.
    pub async fn in_memory() -> Result<Self, anyhow::Error> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await
            .context("Failed to open in-memory SQLite database")?;

        Self::run_migrations(&pool).await?;
        Ok(Self { pool })
    }

    async fn run_migrations(pool: &SqlitePool) -> Result<(), anyhow::Error> {
        log::debug!("Running database migrations...");
        sqlx::query(MIGRATIONS_SQL)
            .execute(pool)
            .await
            .context("Failed to run database migrations")?;
        Ok(())
    }

    /// Raw value stored under `key`, if any.
    pub async fn get_item(&self, key: &str) -> Result<Option<String>, anyhow::Error> {
        let row = sqlx::query("SELECT value FROM local_storage WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .with_context(|| format!("Failed to read '{}' from local storage", key))?;

        Ok(row.map(|r| r.get::<String, _>("value")))
    }

    /// Overwrites whatever is stored under `key`.
    pub async fn set_item(&self, key: &str, value: &str) -> Result<(), anyhow::Error> {
        let now = Utc::now().timestamp_millis();
        sqlx::query(
            r#"
            INSERT INTO local_storage (key, value, updated_at)
            VALUES (?, ?, ?)
            ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at
            "#,
        )
        .bind(key)
        .bind(value)
        .bind(now)
        .execute(&self.pool)
        .await
        .with_context(|| format!("Failed to write '{}' to local storage", key))?;

        log::debug!("Stored {} bytes under '{}'", value.len(), key);
        Ok(())
    }

    pub async fn remove_item(&self, key: &str) -> Result<(), anyhow::Error> {
        sqlx::query("DELETE FROM local_storage WHERE key = ?")
            .bind(key)
            .execute(&self.pool)
            .await
            .with_context(|| format!("Failed to remove '{}' from local storage", key))?;
        Ok(())
    }

    /// Decodes the JSON blob under `key`, or `T::default()` when nothing is
    /// stored. A blob that no longer parses is moved aside to `<key>.corrupt`
    /// and the default is returned.
    pub async fn get_json_or_default<T: DeserializeOwned + Default>(
        &self,
        key: &str,
    ) -> Result<T, anyhow::Error> {
        let Some(raw) = self.get_item(key).await? else {
            return Ok(T::default());
        };
        match serde_json::from_str(&raw) {
            Ok(value) => Ok(value),
            Err(e) => {
                let backup = format!("{}.corrupt", key);
                log::error!(
                    "Stored '{}' is not valid JSON ({}); moved it to '{}' and starting empty",
                    key,
                    e,
                    backup
                );
                self.set_item(&backup, &raw).await?;
                self.remove_item(key).await?;
                Ok(T::default())
            }
        }
    }

    pub async fn set_json<T: Serialize + ?Sized>(
        &self,
        key: &str,
        value: &T,
    ) -> Result<(), anyhow::Error> {
        let raw = serde_json::to_string(value)
            .with_context(|| format!("Failed to serialize value for '{}'", key))?;
        self.set_item(key, &raw).await
    }
}
