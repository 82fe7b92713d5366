//! Durable destinations for security events
//!
//! A sink performs exactly one attempt per `write` call. Retries, timeouts and
//! backoff belong to the logger.

use crate::config::SinkConfig;
use crate::error::SinkError;
use crate::event::{SecurityEvent, SecurityLevel};
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use tokio::fs::{self, File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

/// Persistence boundary for security events
///
/// Implementations must tolerate concurrent calls.
#[async_trait]
pub trait SinkWriter: Send + Sync + 'static {
    /// Short name used in logs and metric labels
    fn name(&self) -> &str;

    /// Persist a single event
    async fn write(&self, event: &SecurityEvent) -> Result<(), SinkError>;
}

/// Build the sink described by the configuration
pub async fn build_sink(config: &SinkConfig) -> Result<Arc<dyn SinkWriter>, SinkError> {
    let sink: Arc<dyn SinkWriter> = match config {
        SinkConfig::Tracing => Arc::new(TracingSink),
        SinkConfig::JsonLines { path } => Arc::new(JsonLinesSink::open(path).await?),
        SinkConfig::Sqlite { url } => Arc::new(SqliteSink::connect(url).await?),
    };

    tracing::info!(sink = sink.name(), "Security event sink ready");
    Ok(sink)
}

// ============================================================
// Tracing
// ============================================================

/// Emits each event as a structured record on the `security_audit` target
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

#[async_trait]
impl SinkWriter for TracingSink {
    fn name(&self) -> &str {
        "tracing"
    }

    async fn write(&self, event: &SecurityEvent) -> Result<(), SinkError> {
        let details = serde_json::to_string(&event.details)?;
        let metadata = event.metadata.clone().unwrap_or_default();

        macro_rules! emit {
            ($level:ident) => {
                tracing::$level!(
                    target: "security_audit",
                    event_id = %event.id,
                    category = %event.category,
                    action = %event.action,
                    timestamp = %event.timestamp.to_rfc3339(),
                    ip = metadata.ip.as_deref(),
                    user_id = metadata.user_id.as_deref(),
                    session_id = metadata.session_id.as_deref(),
                    details = %details,
                    "security event"
                )
            };
        }

        match event.level {
            SecurityLevel::Info => emit!(info),
            SecurityLevel::Warn => emit!(warn),
            SecurityLevel::Error | SecurityLevel::Critical => emit!(error),
        }

        Ok(())
    }
}

// ============================================================
// JSON lines file
// ============================================================

/// Appends one JSON document per line to a file
#[derive(Debug)]
pub struct JsonLinesSink {
    path: PathBuf,
    file: Mutex<File>,
}

impl JsonLinesSink {
    /// Open (or create) the file in append mode, creating parent directories
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, SinkError> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await?;
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;

        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl SinkWriter for JsonLinesSink {
    fn name(&self) -> &str {
        "jsonl"
    }

    async fn write(&self, event: &SecurityEvent) -> Result<(), SinkError> {
        let mut line = serde_json::to_vec(event)?;
        line.push(b'\n');

        // One writer at a time so lines never interleave
        let mut file = self.file.lock().await;
        file.write_all(&line).await?;
        file.flush().await?;
        Ok(())
    }
}

// ============================================================
// SQLite
// ============================================================

/// Inserts events into a `security_events` table
#[derive(Debug, Clone)]
pub struct SqliteSink {
    pool: SqlitePool,
}

impl SqliteSink {
    /// Connect to `url` (e.g. `sqlite://audit.db`), creating the database and table if needed
    pub async fn connect(url: &str) -> Result<Self, SinkError> {
        let options = SqliteConnectOptions::from_str(url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await?;

        Self::from_pool(pool).await
    }

    /// Use an existing pool, creating the table if needed
    pub async fn from_pool(pool: SqlitePool) -> Result<Self, SinkError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS security_events (
                id TEXT PRIMARY KEY,
                timestamp TEXT NOT NULL,
                timestamp_ms INTEGER NOT NULL,
                level TEXT NOT NULL,
                category TEXT NOT NULL,
                action TEXT NOT NULL,
                details TEXT NOT NULL,
                ip TEXT,
                user_agent TEXT,
                session_id TEXT,
                user_id TEXT
            )
            "#,
        )
        .execute(&pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_security_events_timestamp ON security_events (timestamp_ms)",
        )
        .execute(&pool)
        .await?;

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl SinkWriter for SqliteSink {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn write(&self, event: &SecurityEvent) -> Result<(), SinkError> {
        let details = serde_json::to_string(&event.details)?;
        let metadata = event.metadata.as_ref();

        // Re-delivery of an already stored event is a no-op
        sqlx::query(
            r#"
            INSERT OR IGNORE INTO security_events (
                id, timestamp, timestamp_ms, level, category, action, details,
                ip, user_agent, session_id, user_id
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            "#,
        )
        .bind(event.id.to_string())
        .bind(event.timestamp.to_rfc3339())
        .bind(event.timestamp.timestamp_millis())
        .bind(event.level.as_str())
        .bind(&event.category)
        .bind(&event.action)
        .bind(details)
        .bind(metadata.and_then(|m| m.ip.clone()))
        .bind(metadata.and_then(|m| m.user_agent.clone()))
        .bind(metadata.and_then(|m| m.session_id.clone()))
        .bind(metadata.and_then(|m| m.user_id.clone()))
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
