//! Turso Embedded / libSQL settings and run-history store.
//!
//! The [`Storage`] struct wraps a local libSQL database holding the six
//! system-governed generation settings and one record per pipeline run.
//! Settings written here always win over request-time overrides; the CLI
//! loads them as a [`SystemSettings`] snapshot before each run.

mod migrations;

use std::path::Path;

use chrono::{DateTime, Utc};
use draftforge_shared::{DraftforgeError, Result, RunId, SystemSettings};
use libsql::{Connection, Database, params};

/// The six system-governed setting keys with their declared value types.
pub const SETTING_KEYS: [(&str, &str); 6] = [
    ("model_name", "string"),
    ("temperature", "float"),
    ("enable_web_search", "bool"),
    ("max_research_sources", "int"),
    ("min_word_count", "int"),
    ("max_word_count", "int"),
];

/// Storage handle wrapping the local settings database.
pub struct Storage {
    #[allow(dead_code)]
    db: Database,
    conn: Connection,
}

impl Storage {
    /// Open or create a database at `path` and bring its schema up to date.
    pub async fn open(path: &Path) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| DraftforgeError::io(parent, e))?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DraftforgeError::Storage(e.to_string()))?;

        let conn = db
            .connect()
            .map_err(|e| DraftforgeError::Storage(e.to_string()))?;

        let storage = Self { db, conn };
        storage.run_migrations().await?;
        Ok(storage)
    }

    /// Run pending schema migrations.
    async fn run_migrations(&self) -> Result<()> {
        let current_version = self.get_schema_version().await;

        for migration in migrations::all_migrations() {
            if migration.version > current_version {
                tracing::info!(
                    version = migration.version,
                    description = migration.description,
                    "applying migration"
                );
                self.conn
                    .execute_batch(migration.sql)
                    .await
                    .map_err(|e| {
                        DraftforgeError::Storage(format!(
                            "migration v{} failed: {e}",
                            migration.version
                        ))
                    })?;
            }
        }
        Ok(())
    }

    /// Get the current schema version, or 0 if no migrations have been applied.
    async fn get_schema_version(&self) -> u32 {
        let result = self
            .conn
            .query("SELECT MAX(version) FROM schema_migrations", params![])
            .await;

        match result {
            Ok(mut rows) => {
                if let Ok(Some(row)) = rows.next().await {
                    row.get::<u32>(0).unwrap_or(0)
                } else {
                    0
                }
            }
            Err(_) => 0, // Table doesn't exist yet
        }
    }

    // -----------------------------------------------------------------------
    // Settings operations
    // -----------------------------------------------------------------------

    /// Persist one system-governed setting. Rejects keys outside
    /// [`SETTING_KEYS`] and values that do not parse as the key's declared
    /// type.
    pub async fn set_setting(&self, key: &str, value: &str) -> Result<()> {
        let value_type = setting_type(key).ok_or_else(|| {
            DraftforgeError::validation(format!(
                "unknown setting key '{key}' (expected one of: {})",
                SETTING_KEYS.map(|(k, _)| k).join(", ")
            ))
        })?;

        if value.trim().is_empty() {
            return Err(DraftforgeError::validation(format!(
                "setting '{key}' requires a non-empty value"
            )));
        }
        if !value_parses_as(value, value_type) {
            return Err(DraftforgeError::validation(format!(
                "setting '{key}' expects a {value_type} value, got '{value}'"
            )));
        }

        let now = Utc::now().to_rfc3339();
        self.conn
            .execute(
                "INSERT INTO settings (key, value, value_type, updated_at)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(key) DO UPDATE SET
                   value = excluded.value,
                   value_type = excluded.value_type,
                   updated_at = excluded.updated_at",
                params![key, value, value_type, now.as_str()],
            )
            .await
            .map_err(|e| DraftforgeError::Storage(e.to_string()))?;
        Ok(())
    }

    /// Load the six system-governed settings as a snapshot, falling back to
    /// compiled defaults for any key that is absent or fails to parse.
    pub async fn load_system_settings(&self) -> Result<SystemSettings> {
        let mut rows = self
            .conn
            .query("SELECT key, value FROM settings", params![])
            .await
            .map_err(|e| DraftforgeError::Storage(e.to_string()))?;

        let mut settings = SystemSettings::default();
        while let Ok(Some(row)) = rows.next().await {
            let key: String = row
                .get(0)
                .map_err(|e| DraftforgeError::Storage(e.to_string()))?;
            let value: String = row
                .get(1)
                .map_err(|e| DraftforgeError::Storage(e.to_string()))?;
            apply_setting(&mut settings, &key, &value);
        }
        Ok(settings)
    }

    // -----------------------------------------------------------------------
    // Run history
    // -----------------------------------------------------------------------

    /// Insert one run record.
    pub async fn record_run(&self, record: &RunRecord) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO runs (run_id, topic, status, word_count, verification_score, output_path, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    record.run_id.to_string(),
                    record.topic.as_str(),
                    record.status.as_str(),
                    record.word_count as i64,
                    record.verification_score,
                    record.output_path.as_str(),
                    record.created_at.to_rfc3339(),
                ],
            )
            .await
            .map_err(|e| DraftforgeError::Storage(e.to_string()))?;
        Ok(())
    }

    /// List recorded runs, newest first.
    pub async fn list_runs(&self, limit: u32) -> Result<Vec<RunRecord>> {
        let mut rows = self
            .conn
            .query(
                "SELECT run_id, topic, status, word_count, verification_score, output_path, created_at
                 FROM runs ORDER BY created_at DESC LIMIT ?1",
                params![limit],
            )
            .await
            .map_err(|e| DraftforgeError::Storage(e.to_string()))?;

        let mut results = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            results.push(row_to_run_record(&row)?);
        }
        Ok(results)
    }
}

/// One recorded pipeline run.
#[derive(Debug, Clone)]
pub struct RunRecord {
    pub run_id: RunId,
    pub topic: String,
    /// Free-form outcome tag, `completed` or `failed`.
    pub status: String,
    pub word_count: usize,
    pub verification_score: f64,
    pub output_path: String,
    pub created_at: DateTime<Utc>,
}

/// Declared value type for a system-governed key, or `None` for keys outside
/// [`SETTING_KEYS`].
fn setting_type(key: &str) -> Option<&'static str> {
    SETTING_KEYS
        .iter()
        .find(|(k, _)| *k == key)
        .map(|(_, t)| *t)
}

/// Check a raw string against a declared value type.
fn value_parses_as(value: &str, value_type: &str) -> bool {
    match value_type {
        "int" => value.parse::<usize>().is_ok(),
        "float" => value.parse::<f64>().is_ok(),
        "bool" => value.parse::<bool>().is_ok(),
        _ => true, // strings accept anything
    }
}

/// Overlay one stored row onto the snapshot. Unknown keys and unparseable
/// values are skipped with a warning.
fn apply_setting(settings: &mut SystemSettings, key: &str, value: &str) {
    let applied = match key {
        "model_name" => {
            settings.model_name = value.to_string();
            true
        }
        "temperature" => value.parse().map(|v| settings.temperature = v).is_ok(),
        "enable_web_search" => value
            .parse()
            .map(|v| settings.enable_web_search = v)
            .is_ok(),
        "max_research_sources" => value
            .parse()
            .map(|v| settings.max_research_sources = v)
            .is_ok(),
        "min_word_count" => value.parse().map(|v| settings.min_word_count = v).is_ok(),
        "max_word_count" => value.parse().map(|v| settings.max_word_count = v).is_ok(),
        _ => false,
    };
    if !applied {
        tracing::warn!(key, value, "ignoring unusable setting row");
    }
}

/// Convert a database row to a [`RunRecord`].
fn row_to_run_record(row: &libsql::Row) -> Result<RunRecord> {
    Ok(RunRecord {
        run_id: {
            let s: String = row
                .get(0)
                .map_err(|e| DraftforgeError::Storage(e.to_string()))?;
            s.parse()
                .map_err(|e| DraftforgeError::Storage(format!("invalid run id: {e}")))?
        },
        topic: row
            .get::<String>(1)
            .map_err(|e| DraftforgeError::Storage(e.to_string()))?,
        status: row
            .get::<String>(2)
            .map_err(|e| DraftforgeError::Storage(e.to_string()))?,
        word_count: row
            .get::<i64>(3)
            .map_err(|e| DraftforgeError::Storage(e.to_string()))? as usize,
        verification_score: row
            .get::<f64>(4)
            .map_err(|e| DraftforgeError::Storage(e.to_string()))?,
        output_path: row
            .get::<String>(5)
            .map_err(|e| DraftforgeError::Storage(e.to_string()))?,
        created_at: {
            let s: String = row
                .get(6)
                .map_err(|e| DraftforgeError::Storage(e.to_string()))?;
            DateTime::parse_from_rfc3339(&s)
                .map(|dt| dt.with_timezone(&Utc))
                .map_err(|e| DraftforgeError::Storage(format!("invalid date: {e}")))?
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use uuid::Uuid;

    /// Create a temp file storage for testing.
    async fn test_storage() -> Storage {
        let tmp = std::env::temp_dir().join(format!("df_test_{}.db", Uuid::now_v7()));
        Storage::open(&tmp).await.expect("open test db")
    }

    fn sample_run(topic: &str, created_at: DateTime<Utc>) -> RunRecord {
        RunRecord {
            run_id: RunId::new(),
            topic: topic.into(),
            status: "completed".into(),
            word_count: 750,
            verification_score: 0.8,
            output_path: format!("/tmp/{topic}.md"),
            created_at,
        }
    }

    #[tokio::test]
    async fn open_and_migrate() {
        let storage = test_storage().await;
        assert_eq!(storage.get_schema_version().await, 1);
    }

    #[tokio::test]
    async fn idempotent_migration() {
        let tmp = std::env::temp_dir().join(format!("df_test_{}.db", Uuid::now_v7()));
        let s1 = Storage::open(&tmp).await.expect("first open");
        drop(s1);
        let s2 = Storage::open(&tmp).await.expect("second open");
        assert_eq!(s2.get_schema_version().await, 1);
    }

    #[tokio::test]
    async fn fresh_database_yields_default_settings() {
        let storage = test_storage().await;
        let settings = storage.load_system_settings().await.expect("load settings");
        assert_eq!(settings, SystemSettings::default());
    }

    #[tokio::test]
    async fn settings_roundtrip_keeps_defaults_for_unset_keys() {
        let storage = test_storage().await;

        storage
            .set_setting("model_name", "gpt-5-mini")
            .await
            .expect("set model");
        storage
            .set_setting("temperature", "0.3")
            .await
            .expect("set temperature");
        storage
            .set_setting("enable_web_search", "false")
            .await
            .expect("set search");
        storage
            .set_setting("max_word_count", "1500")
            .await
            .expect("set max words");

        let settings = storage.load_system_settings().await.expect("load settings");
        assert_eq!(settings.model_name, "gpt-5-mini");
        assert_eq!(settings.temperature, 0.3);
        assert!(!settings.enable_web_search);
        assert_eq!(settings.max_word_count, 1500);
        // Untouched keys keep their compiled defaults
        assert_eq!(settings.min_word_count, 500);
        assert_eq!(settings.max_research_sources, 10);
    }

    #[tokio::test]
    async fn set_setting_overwrites_previous_value() {
        let storage = test_storage().await;
        storage.set_setting("min_word_count", "400").await.unwrap();
        storage.set_setting("min_word_count", "600").await.unwrap();

        let settings = storage.load_system_settings().await.unwrap();
        assert_eq!(settings.min_word_count, 600);
    }

    #[tokio::test]
    async fn unknown_setting_key_is_rejected() {
        let storage = test_storage().await;
        let result = storage.set_setting("max_tokens", "4096").await;
        assert!(result.is_err());
        assert!(
            result
                .unwrap_err()
                .to_string()
                .contains("unknown setting key")
        );
    }

    #[tokio::test]
    async fn mistyped_setting_value_is_rejected() {
        let storage = test_storage().await;

        let result = storage.set_setting("temperature", "warm").await;
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("float"));

        let result = storage.set_setting("enable_web_search", "yes").await;
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("bool"));

        let result = storage.set_setting("max_word_count", "-10").await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn unusable_setting_rows_fall_back_to_defaults() {
        let storage = test_storage().await;
        // Plant a row directly, bypassing set_setting validation
        storage
            .conn
            .execute(
                "INSERT INTO settings (key, value, value_type, updated_at)
                 VALUES ('temperature', 'not-a-number', 'float', '2026-01-01T00:00:00Z')",
                params![],
            )
            .await
            .expect("plant bad row");

        let settings = storage.load_system_settings().await.expect("load settings");
        assert_eq!(settings.temperature, SystemSettings::default().temperature);
    }

    #[tokio::test]
    async fn record_and_list_runs_newest_first() {
        let storage = test_storage().await;
        let base = Utc::now();

        for (topic, offset) in [("first", 2), ("second", 1), ("third", 0)] {
            storage
                .record_run(&sample_run(topic, base - Duration::seconds(offset)))
                .await
                .expect("record run");
        }

        let runs = storage.list_runs(10).await.expect("list runs");
        assert_eq!(runs.len(), 3);
        assert_eq!(runs[0].topic, "third");
        assert_eq!(runs[2].topic, "first");
        assert_eq!(runs[0].status, "completed");
        assert_eq!(runs[0].word_count, 750);

        let limited = storage.list_runs(2).await.expect("list limited");
        assert_eq!(limited.len(), 2);
        assert_eq!(limited[0].topic, "third");
    }
}
