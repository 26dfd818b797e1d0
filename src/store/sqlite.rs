use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension};
use serde::Serialize;

use super::{schema, validate_id, LocalStorage, StorageError};

/// Payloads kept as blobs in a SQLite `documents` table.
///
/// Cloning shares the connection, so one store can back both a registry and
/// the HTTP service.
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

/// Listing entry for a stored payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DocumentInfo {
    pub id: String,
    pub size: u64,
    pub updated_at: DateTime<Utc>,
}

impl SqliteStore {
    pub fn open(path: PathBuf) -> Result<Self, StorageError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(&path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn open_default() -> Result<Self, StorageError> {
        Self::open(Self::default_path()?)
    }

    pub fn default_path() -> Result<PathBuf, StorageError> {
        let dirs = directories::ProjectDirs::from("", "", "modeltree").ok_or(StorageError::NoDataDir)?;
        Ok(dirs.data_dir().join("modeltree.db"))
    }

    pub fn open_memory() -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory()?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn migrate(&self) -> Result<(), StorageError> {
        schema::run_migrations(&self.conn())
    }

    /// Stored documents whose id starts with `prefix`, ordered by id.
    pub fn list(&self, prefix: &str) -> Result<Vec<DocumentInfo>, StorageError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT id, size, updated_at FROM documents
             WHERE substr(id, 1, length(?1)) = ?1 ORDER BY id",
        )?;
        let documents = stmt
            .query_map([prefix], |row| {
                Ok(DocumentInfo {
                    id: row.get(0)?,
                    size: row.get::<_, i64>(1)?.max(0) as u64,
                    updated_at: parse_datetime(row.get::<_, String>(2)?),
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(documents)
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().expect("database lock poisoned")
    }
}

impl LocalStorage for SqliteStore {
    fn exists(&self, id: &str) -> Result<bool, StorageError> {
        let count: i64 = self.conn().query_row(
            "SELECT COUNT(*) FROM documents WHERE id = ?",
            [id],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    fn load(&self, id: &str) -> Result<Option<Vec<u8>>, StorageError> {
        let content = self
            .conn()
            .query_row("SELECT content FROM documents WHERE id = ?", [id], |row| {
                row.get(0)
            })
            .optional()?;
        Ok(content)
    }

    fn save(&self, id: &str, payload: &[u8]) -> Result<(), StorageError> {
        validate_id(id)?;
        let now = Utc::now().to_rfc3339();
        self.conn().execute(
            "INSERT INTO documents (id, content, size, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?4)
             ON CONFLICT(id) DO UPDATE SET
                content = excluded.content,
                size = excluded.size,
                updated_at = excluded.updated_at",
            (id, payload, payload.len() as i64, &now),
        )?;
        Ok(())
    }

    fn delete(&self, id: &str) -> Result<bool, StorageError> {
        let rows = self.conn().execute("DELETE FROM documents WHERE id = ?", [id])?;
        Ok(rows > 0)
    }
}

fn parse_datetime(s: String) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(&s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> SqliteStore {
        let store = SqliteStore::open_memory().unwrap();
        store.migrate().unwrap();
        store
    }

    #[test]
    fn save_overwrites_existing_document() {
        let store = store();
        store.save("User.data.json", b"[1]").unwrap();
        store.save("User.data.json", b"[1,2]").unwrap();

        assert_eq!(store.load("User.data.json").unwrap(), Some(b"[1,2]".to_vec()));
        let listed = store.list("User.").unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].size, 5);
    }

    #[test]
    fn list_filters_by_prefix() {
        let store = store();
        store.save("User.data.json", b"[]").unwrap();
        store.save("User.structure.json", b"[]").unwrap();
        store.save("Settings.data.json", b"[]").unwrap();

        let ids: Vec<_> = store.list("User.").unwrap().into_iter().map(|d| d.id).collect();
        assert_eq!(ids, vec!["User.data.json", "User.structure.json"]);
        assert_eq!(store.list("").unwrap().len(), 3);
    }

    #[test]
    fn missing_documents() {
        let store = store();
        assert!(!store.exists("nope.data.xml").unwrap());
        assert_eq!(store.load("nope.data.xml").unwrap(), None);
        assert!(!store.delete("nope.data.xml").unwrap());
    }
}
