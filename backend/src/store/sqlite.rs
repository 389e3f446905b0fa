use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::{Map, Value};

use super::{
    DocPath, Document, DocumentStore, Precondition, Query, QuerySnapshot, StoreError, Write,
    WriteBatch,
};

/// SQLite-backed document store.
///
/// Documents are JSON text keyed by (collection path, id). Every commit takes
/// the next value of a store-wide sequence; written documents and the
/// collections they live in are stamped with it.
pub struct SqliteDocumentStore {
    conn: Mutex<Connection>,
}

fn db_err(e: rusqlite::Error) -> StoreError {
    StoreError::Database(e.to_string())
}

impl SqliteDocumentStore {
    pub fn new(database_url: &str) -> Result<Self, StoreError> {
        // Parse sqlite: prefix if present
        let path = database_url.strip_prefix("sqlite:").unwrap_or(database_url);

        if path == ":memory:" {
            return Self::in_memory();
        }

        // Create parent directories if needed
        if let Some(parent) = Path::new(path).parent() {
            std::fs::create_dir_all(parent).map_err(|e| StoreError::Io(e.to_string()))?;
        }

        let conn = Connection::open(path).map_err(db_err)?;
        let store = Self::init(conn)?;
        tracing::info!("Document store initialized with database: {}", path);
        Ok(store)
    }

    pub fn in_memory() -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory().map_err(db_err)?)
    }

    fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS documents (
                collection TEXT NOT NULL,
                id TEXT NOT NULL,
                data TEXT NOT NULL,
                version INTEGER NOT NULL,
                PRIMARY KEY (collection, id)
            )",
            [],
        )
        .map_err(db_err)?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS collections (
                name TEXT PRIMARY KEY,
                version INTEGER NOT NULL
            )",
            [],
        )
        .map_err(db_err)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>, StoreError> {
        self.conn
            .lock()
            .map_err(|e| StoreError::Database(e.to_string()))
    }

    fn get_sync(&self, path: &DocPath) -> Result<Option<Document>, StoreError> {
        let conn = self.lock()?;
        let row: Option<(String, i64)> = conn
            .query_row(
                "SELECT data, version FROM documents WHERE collection = ?1 AND id = ?2",
                params![path.collection, path.id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()
            .map_err(db_err)?;

        row.map(|(data, version)| {
            Ok(Document {
                path: path.clone(),
                data: parse_data(&data)?,
                version: version as u64,
            })
        })
        .transpose()
    }

    fn query_sync(&self, query: &Query) -> Result<QuerySnapshot, StoreError> {
        let conn = self.lock()?;
        let collection_version = collection_version(&conn, &query.collection)?;

        let mut stmt = conn
            .prepare("SELECT id, data, version FROM documents WHERE collection = ?1 ORDER BY id")
            .map_err(db_err)?;
        let rows = stmt
            .query_map(params![query.collection], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, i64>(2)?,
                ))
            })
            .map_err(db_err)?;

        let mut documents = vec![];
        for row in rows {
            let (id, data, version) = row.map_err(db_err)?;
            let data = parse_data(&data)?;
            if !query.matches(&data) {
                continue;
            }
            documents.push(Document {
                path: DocPath::new(query.collection.clone(), id),
                data,
                version: version as u64,
            });
            if query.limit.is_some_and(|limit| documents.len() >= limit) {
                break;
            }
        }

        Ok(QuerySnapshot {
            documents,
            collection_version,
        })
    }

    fn commit_sync(
        &self,
        batch: WriteBatch,
        preconditions: Vec<Precondition>,
    ) -> Result<(), StoreError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction().map_err(db_err)?;

        for precondition in &preconditions {
            let (current, expected) = match precondition {
                Precondition::DocumentVersion { path, version } => {
                    (document_version(&tx, path)?, *version)
                }
                Precondition::CollectionVersion {
                    collection,
                    version,
                } => (collection_version(&tx, collection)?, *version),
            };
            if current != expected {
                return Err(StoreError::Conflict);
            }
        }

        if batch.is_empty() {
            return Ok(());
        }

        let sequence: i64 = tx
            .query_row("SELECT COALESCE(MAX(version), 0) FROM collections", [], |row| {
                row.get(0)
            })
            .map_err(db_err)?;
        let sequence = sequence + 1;
        let mut touched = BTreeSet::new();

        for write in batch.into_writes() {
            touched.insert(write.path().collection.clone());
            match write {
                Write::Set { path, data } => {
                    tx.execute(
                        "INSERT OR REPLACE INTO documents (collection, id, data, version)
                         VALUES (?1, ?2, ?3, ?4)",
                        params![path.collection, path.id, encode_data(&data)?, sequence],
                    )
                    .map_err(db_err)?;
                }
                Write::Update { path, fields } => {
                    let existing: Option<String> = tx
                        .query_row(
                            "SELECT data FROM documents WHERE collection = ?1 AND id = ?2",
                            params![path.collection, path.id],
                            |row| row.get(0),
                        )
                        .optional()
                        .map_err(db_err)?;
                    let Some(existing) = existing else {
                        return Err(StoreError::NotFound(path.to_string()));
                    };
                    let mut data = parse_data(&existing)?;
                    data.extend(fields);
                    tx.execute(
                        "UPDATE documents SET data = ?1, version = ?2
                         WHERE collection = ?3 AND id = ?4",
                        params![encode_data(&data)?, sequence, path.collection, path.id],
                    )
                    .map_err(db_err)?;
                }
                Write::Delete { path } => {
                    tx.execute(
                        "DELETE FROM documents WHERE collection = ?1 AND id = ?2",
                        params![path.collection, path.id],
                    )
                    .map_err(db_err)?;
                }
            }
        }

        for collection in touched {
            tx.execute(
                "INSERT INTO collections (name, version) VALUES (?1, ?2)
                 ON CONFLICT(name) DO UPDATE SET version = excluded.version",
                params![collection, sequence],
            )
            .map_err(db_err)?;
        }

        tx.commit().map_err(db_err)?;
        tracing::debug!("Committed write batch at sequence {}", sequence);
        Ok(())
    }
}

fn parse_data(raw: &str) -> Result<Map<String, Value>, StoreError> {
    match serde_json::from_str(raw) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(StoreError::Database("stored document is not an object".to_string())),
        Err(e) => Err(StoreError::Database(e.to_string())),
    }
}

fn encode_data(data: &Map<String, Value>) -> Result<String, StoreError> {
    serde_json::to_string(data).map_err(|e| StoreError::Database(e.to_string()))
}

fn document_version(conn: &Connection, path: &DocPath) -> Result<u64, StoreError> {
    let version: Option<i64> = conn
        .query_row(
            "SELECT version FROM documents WHERE collection = ?1 AND id = ?2",
            params![path.collection, path.id],
            |row| row.get(0),
        )
        .optional()
        .map_err(db_err)?;
    Ok(version.unwrap_or(0) as u64)
}

fn collection_version(conn: &Connection, collection: &str) -> Result<u64, StoreError> {
    let version: Option<i64> = conn
        .query_row(
            "SELECT version FROM collections WHERE name = ?1",
            params![collection],
            |row| row.get(0),
        )
        .optional()
        .map_err(db_err)?;
    Ok(version.unwrap_or(0) as u64)
}

#[async_trait]
impl DocumentStore for SqliteDocumentStore {
    async fn get(&self, path: &DocPath) -> Result<Option<Document>, StoreError> {
        self.get_sync(path)
    }

    async fn query(&self, query: &Query) -> Result<QuerySnapshot, StoreError> {
        self.query_sync(query)
    }

    async fn commit(
        &self,
        batch: WriteBatch,
        preconditions: Vec<Precondition>,
    ) -> Result<(), StoreError> {
        self.commit_sync(batch, preconditions)
    }
}
