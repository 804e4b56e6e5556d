//! Lifecycle event log storage

use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::types::Type;
use rusqlite::{params, Connection};

use crate::models::{LogEntry, LogEvent};
use crate::Result;

/// Append-only store of lifecycle events, keyed by application id
pub trait LogSink: Send + Sync {
    fn append(&self, entry: &LogEntry) -> Result<()>;

    /// Entries for one application, oldest first
    fn entries(&self, app_id: u32) -> Result<Vec<LogEntry>>;
}

/// SQLite-backed sink
pub struct SqliteLogSink {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteLogSink {
    /// Open or create the database
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::init(Connection::open(path)?)
    }

    /// In-memory database (for testing)
    pub fn in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS logs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                app_id INTEGER NOT NULL,
                event TEXT NOT NULL,
                message TEXT NOT NULL,
                at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_logs_app ON logs(app_id);
            "#,
        )?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }
}

impl LogSink for SqliteLogSink {
    fn append(&self, entry: &LogEntry) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO logs (app_id, event, message, at) VALUES (?1, ?2, ?3, ?4)",
            params![
                entry.app_id,
                entry.event.as_str(),
                entry.message,
                entry.at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    fn entries(&self, app_id: u32) -> Result<Vec<LogEntry>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT app_id, event, message, at FROM logs WHERE app_id = ?1 ORDER BY id",
        )?;
        let entries = stmt
            .query_map(params![app_id], |row| {
                let event: String = row.get(1)?;
                let at: String = row.get(3)?;
                Ok(LogEntry {
                    app_id: row.get(0)?,
                    event: LogEvent::parse(&event).ok_or_else(|| {
                        rusqlite::Error::FromSqlConversionFailure(
                            1,
                            Type::Text,
                            format!("unknown event '{}'", event).into(),
                        )
                    })?,
                    message: row.get(2)?,
                    at: DateTime::parse_from_rfc3339(&at)
                        .map_err(|e| {
                            rusqlite::Error::FromSqlConversionFailure(3, Type::Text, Box::new(e))
                        })?
                        .with_timezone(&Utc),
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(entries)
    }
}

/// Sink that keeps entries in memory
#[derive(Default)]
pub struct MemoryLogSink {
    entries: Mutex<Vec<LogEntry>>,
}

impl MemoryLogSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn all(&self) -> Vec<LogEntry> {
        self.entries.lock().clone()
    }
}

impl LogSink for MemoryLogSink {
    fn append(&self, entry: &LogEntry) -> Result<()> {
        self.entries.lock().push(entry.clone());
        Ok(())
    }

    fn entries(&self, app_id: u32) -> Result<Vec<LogEntry>> {
        Ok(self
            .entries
            .lock()
            .iter()
            .filter(|e| e.app_id == app_id)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_sqlite_append_and_read() {
        let sink = SqliteLogSink::in_memory().unwrap();
        sink.append(&LogEntry::new(1, LogEvent::Started, "hello_8080 on 49152")).unwrap();
        sink.append(&LogEntry::new(2, LogEvent::Started, "other")).unwrap();
        sink.append(&LogEntry::new(1, LogEvent::Stopped, "after 0m3s")).unwrap();

        let entries = sink.entries(1).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].event, LogEvent::Started);
        assert_eq!(entries[0].message, "hello_8080 on 49152");
        assert_eq!(entries[1].event, LogEvent::Stopped);
        assert!(sink.entries(3).unwrap().is_empty());
    }

    #[test]
    fn test_sqlite_persists_across_reopen() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("logs.db");

        {
            let sink = SqliteLogSink::open(&path).unwrap();
            sink.append(&LogEntry::new(4, LogEvent::RolledBack, "listener busy")).unwrap();
        }

        let sink = SqliteLogSink::open(&path).unwrap();
        let entries = sink.entries(4).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].event, LogEvent::RolledBack);
    }

    #[test]
    fn test_memory_sink_filters_by_app() {
        let sink = MemoryLogSink::new();
        sink.append(&LogEntry::new(1, LogEvent::Started, "a")).unwrap();
        sink.append(&LogEntry::new(2, LogEvent::StartFailed, "b")).unwrap();

        assert_eq!(sink.entries(2).unwrap().len(), 1);
        assert_eq!(sink.all().len(), 2);
    }

    #[test]
    fn test_event_names_round_trip() {
        for event in [
            LogEvent::Started,
            LogEvent::Stopped,
            LogEvent::StartFailed,
            LogEvent::StopFailed,
            LogEvent::RolledBack,
        ] {
            assert_eq!(LogEvent::parse(event.as_str()), Some(event));
        }
        assert_eq!(LogEvent::parse("bogus"), None);
    }
}
