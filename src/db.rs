use anyhow::{Context, Result};
use async_trait::async_trait;
use rusqlite::{params, Connection, Row};
use std::{path::Path, sync::Mutex};
use thiserror::Error;
use time::{format_description::well_known::Rfc3339, OffsetDateTime};

/// Column limits of the `registros` table.
pub const UUID_MAX: usize = 100;
pub const NOMBRE_MAX: usize = 200;
pub const CORREO_MAX: usize = 200;
pub const TELEFONO_MAX: usize = 20;

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("database connection lock poisoned")]
    Poisoned,
    #[error("invalid timestamp: {0}")]
    Timestamp(String),
}

/// A contact about to be written. `id` is assigned by the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewContact {
    pub uuid: String,
    pub nombre: String,
    pub correo: String,
    pub telefono: String,
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContactRecord {
    pub id: i64,
    pub uuid: String,
    pub nombre: String,
    pub correo: String,
    pub telefono: String,
    pub created_at: OffsetDateTime,
}

#[async_trait]
pub trait ContactStore: Send + Sync {
    async fn insert(&self, contact: NewContact) -> Result<ContactRecord, PersistenceError>;
}

/// Initialize the SQLite database (create file and tables if needed).
pub fn init_db(db_path: &str) -> Result<Connection> {
    if let Some(parent) = Path::new(db_path).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).ok();
        }
    }
    let conn = Connection::open(db_path)
        .with_context(|| format!("Cannot open/create database: {db_path}"))?;
    conn.execute_batch("PRAGMA journal_mode=WAL;")?;
    create_schema(&conn)?;
    Ok(conn)
}

/// Open a private in-memory database with the schema applied.
pub fn init_memory_db() -> Result<Connection> {
    let conn = Connection::open_in_memory().context("Cannot open in-memory database")?;
    create_schema(&conn)?;
    Ok(conn)
}

fn create_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS registros (
            id              INTEGER PRIMARY KEY AUTOINCREMENT,
            uuid            TEXT NOT NULL CHECK (length(uuid) <= 100),
            nombre          TEXT NOT NULL CHECK (length(nombre) <= 200),
            correo          TEXT NOT NULL CHECK (length(correo) <= 200),
            telefono        TEXT NOT NULL CHECK (length(telefono) <= 20),
            fecha_creacion  TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_registros_uuid ON registros(uuid);
        "#,
    )
}

/// `ContactStore` backed by a single SQLite connection.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn new(conn: Connection) -> Self {
        Self { conn: Mutex::new(conn) }
    }

    pub fn insert_blocking(&self, contact: &NewContact) -> Result<ContactRecord, PersistenceError> {
        let created = contact
            .created_at
            .format(&Rfc3339)
            .map_err(|e| PersistenceError::Timestamp(e.to_string()))?;
        let conn = self.conn.lock().map_err(|_| PersistenceError::Poisoned)?;
        conn.execute(
            "INSERT INTO registros (uuid, nombre, correo, telefono, fecha_creacion)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![contact.uuid, contact.nombre, contact.correo, contact.telefono, created],
        )?;
        Ok(ContactRecord {
            id: conn.last_insert_rowid(),
            uuid: contact.uuid.clone(),
            nombre: contact.nombre.clone(),
            correo: contact.correo.clone(),
            telefono: contact.telefono.clone(),
            created_at: contact.created_at,
        })
    }

    /// All rows carrying `uuid`, oldest first.
    pub fn find_by_uuid(&self, uuid: &str) -> Result<Vec<ContactRecord>, PersistenceError> {
        let conn = self.conn.lock().map_err(|_| PersistenceError::Poisoned)?;
        let mut stmt = conn.prepare(
            "SELECT id, uuid, nombre, correo, telefono, fecha_creacion
             FROM registros WHERE uuid = ?1 ORDER BY id ASC",
        )?;
        let mut rows = stmt.query(params![uuid])?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            out.push(record_from_row(row)?);
        }
        Ok(out)
    }

    pub fn count(&self) -> Result<i64, PersistenceError> {
        let conn = self.conn.lock().map_err(|_| PersistenceError::Poisoned)?;
        let n = conn.query_row("SELECT COUNT(*) FROM registros", [], |r| r.get(0))?;
        Ok(n)
    }
}

fn record_from_row(row: &Row<'_>) -> Result<ContactRecord, PersistenceError> {
    let created: String = row.get(5)?;
    let created_at = OffsetDateTime::parse(&created, &Rfc3339)
        .map_err(|e| PersistenceError::Timestamp(format!("{created}: {e}")))?;
    Ok(ContactRecord {
        id: row.get(0)?,
        uuid: row.get(1)?,
        nombre: row.get(2)?,
        correo: row.get(3)?,
        telefono: row.get(4)?,
        created_at,
    })
}

#[async_trait]
impl ContactStore for SqliteStore {
    async fn insert(&self, contact: NewContact) -> Result<ContactRecord, PersistenceError> {
        // Blocks this worker for one short insert; the lock is released before returning.
        self.insert_blocking(&contact)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn contact(uuid: &str) -> NewContact {
        NewContact {
            uuid: uuid.to_string(),
            nombre: "Ana".to_string(),
            correo: "ana@example.com".to_string(),
            telefono: "+15551234567".to_string(),
            created_at: OffsetDateTime::now_utc().replace_nanosecond(0).unwrap(),
        }
    }

    fn store() -> SqliteStore {
        SqliteStore::new(init_memory_db().unwrap())
    }

    #[test]
    fn insert_assigns_increasing_ids() {
        let store = store();
        let a = store.insert_blocking(&contact("a")).unwrap();
        let b = store.insert_blocking(&contact("b")).unwrap();
        assert!(b.id > a.id);
        assert_eq!(store.count().unwrap(), 2);
    }

    #[test]
    fn stored_row_reads_back_unchanged() {
        let store = store();
        let new = contact("abc-123");
        let inserted = store.insert_blocking(&new).unwrap();
        let found = store.find_by_uuid("abc-123").unwrap();
        assert_eq!(found, vec![inserted]);
        assert_eq!(found[0].created_at, new.created_at);
    }

    #[test]
    fn duplicate_uuid_creates_separate_rows() {
        let store = store();
        store.insert_blocking(&contact("dup")).unwrap();
        store.insert_blocking(&contact("dup")).unwrap();
        let found = store.find_by_uuid("dup").unwrap();
        assert_eq!(found.len(), 2);
        assert_ne!(found[0].id, found[1].id);
    }

    #[test]
    fn oversized_phone_violates_constraint() {
        let store = store();
        let mut c = contact("long");
        c.telefono = "1".repeat(TELEFONO_MAX + 1);
        let err = store.insert_blocking(&c).unwrap_err();
        assert!(matches!(err, PersistenceError::Sqlite(_)));
        assert_eq!(store.count().unwrap(), 0);
    }

    #[test]
    fn file_database_is_created_with_parent_dirs() {
        let dir = std::env::temp_dir().join(format!("contact-relay-{}", std::process::id()));
        let path = dir.join("nested").join("relay.db");
        let conn = init_db(path.to_str().unwrap()).unwrap();
        let store = SqliteStore::new(conn);
        store.insert_blocking(&contact("file")).unwrap();
        assert_eq!(store.count().unwrap(), 1);
        drop(store);
        std::fs::remove_dir_all(&dir).ok();
    }
}
