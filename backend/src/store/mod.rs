//! Document store gateway.
//!
//! Key-addressed JSON documents grouped in collections (collections may be
//! nested, e.g. `clients/{id}/services`). Multi-document writes go through
//! [`WriteBatch`] and commit atomically; [`run_transaction`] layers
//! read-check-then-write with conflict retry on top of the same commit.

mod sqlite;
mod transaction;

pub use sqlite::SqliteDocumentStore;
pub use transaction::{run_transaction, Transaction, TransactionBody, DEFAULT_MAX_ATTEMPTS};

use async_trait::async_trait;
use serde_json::{Map, Value};

use backoffice_common::{Record, RecordError};

/// Collection names used by the back office.
pub mod collections {
    pub const USERS: &str = "users";
    pub const CLIENTS: &str = "clients";
    /// Root mirror of every service, for administrative listing.
    pub const SERVICES: &str = "services";
    pub const INVOICES: &str = "invoices";
    pub const TICKETS: &str = "tickets";
    pub const DOMAINS: &str = "domains";

    /// Subcollection under one client, e.g. `clients/u1/services`.
    pub fn client_sub(client_id: &str, name: &str) -> String {
        format!("{}/{}/{}", CLIENTS, client_id, name)
    }

    pub fn client_services(client_id: &str) -> String {
        client_sub(client_id, SERVICES)
    }
}

/// Address of one document.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DocPath {
    pub collection: String,
    pub id: String,
}

impl DocPath {
    pub fn new(collection: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            id: id.into(),
        }
    }
}

impl std::fmt::Display for DocPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.collection, self.id)
    }
}

/// A stored document with its version.
///
/// Versions come from a store-wide sequence; an absent document has version 0.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub path: DocPath,
    pub data: Map<String, Value>,
    pub version: u64,
}

impl Document {
    /// Decode into a typed record.
    pub fn decode<R: Record>(self) -> Result<R, RecordError> {
        R::from_document(self.data)
    }
}

/// Field filter applied to a query.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    Eq(String, Value),
    /// Matches documents where the field exists and differs.
    NotEq(String, Value),
}

impl Filter {
    pub fn matches(&self, data: &Map<String, Value>) -> bool {
        match self {
            Filter::Eq(field, value) => data.get(field) == Some(value),
            Filter::NotEq(field, value) => data.get(field).is_some_and(|v| v != value),
        }
    }
}

/// Query over a single collection.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub collection: String,
    pub filters: Vec<Filter>,
    pub limit: Option<usize>,
}

impl Query {
    pub fn collection(collection: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            filters: vec![],
            limit: None,
        }
    }

    pub fn filter_eq(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.filters.push(Filter::Eq(field.to_string(), value.into()));
        self
    }

    pub fn filter_ne(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.filters.push(Filter::NotEq(field.to_string(), value.into()));
        self
    }

    pub fn limit(mut self, n: usize) -> Self {
        self.limit = Some(n);
        self
    }

    pub fn matches(&self, data: &Map<String, Value>) -> bool {
        self.filters.iter().all(|f| f.matches(data))
    }
}

/// Query result together with the collection version it was read at.
#[derive(Debug, Clone, Default)]
pub struct QuerySnapshot {
    pub documents: Vec<Document>,
    pub collection_version: u64,
}

/// One buffered write.
#[derive(Debug, Clone, PartialEq)]
pub enum Write {
    /// Create or overwrite.
    Set { path: DocPath, data: Map<String, Value> },
    /// Merge top-level fields into an existing document; fails if absent.
    Update { path: DocPath, fields: Map<String, Value> },
    /// Remove; a no-op when absent.
    Delete { path: DocPath },
}

impl Write {
    pub fn path(&self) -> &DocPath {
        match self {
            Write::Set { path, .. } | Write::Update { path, .. } | Write::Delete { path } => path,
        }
    }
}

/// Writes applied all-or-nothing by [`DocumentStore::commit`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WriteBatch {
    writes: Vec<Write>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, path: DocPath, data: Map<String, Value>) -> &mut Self {
        self.writes.push(Write::Set { path, data });
        self
    }

    pub fn update(&mut self, path: DocPath, fields: Map<String, Value>) -> &mut Self {
        self.writes.push(Write::Update { path, fields });
        self
    }

    pub fn delete(&mut self, path: DocPath) -> &mut Self {
        self.writes.push(Write::Delete { path });
        self
    }

    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.writes.len()
    }

    pub fn writes(&self) -> &[Write] {
        &self.writes
    }

    pub fn into_writes(self) -> Vec<Write> {
        self.writes
    }
}

/// Condition checked atomically with a commit.
#[derive(Debug, Clone, PartialEq)]
pub enum Precondition {
    /// The document is still at this version (0 = still absent).
    DocumentVersion { path: DocPath, version: u64 },
    /// No write has touched the collection since this version.
    CollectionVersion { collection: String, version: u64 },
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Document not found: {0}")]
    NotFound(String),
    #[error("Transaction conflict")]
    Conflict,
    #[error("Transaction aborted after {0} conflicting attempts")]
    TooManyConflicts(u32),
    #[error("Database error: {0}")]
    Database(String),
    #[error("IO error: {0}")]
    Io(String),
    #[error("Record error: {0}")]
    Record(#[from] RecordError),
}

/// Key-addressed document collections.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn get(&self, path: &DocPath) -> Result<Option<Document>, StoreError>;

    async fn query(&self, query: &Query) -> Result<QuerySnapshot, StoreError>;

    /// Apply `batch` atomically if every precondition still holds.
    ///
    /// Fails with [`StoreError::Conflict`] when a precondition is violated and
    /// with [`StoreError::NotFound`] when an update targets an absent document;
    /// in both cases nothing is written.
    async fn commit(
        &self,
        batch: WriteBatch,
        preconditions: Vec<Precondition>,
    ) -> Result<(), StoreError>;

    async fn count(&self, query: &Query) -> Result<u64, StoreError> {
        Ok(self.query(query).await?.documents.len() as u64)
    }

    async fn set(&self, path: &DocPath, data: Map<String, Value>) -> Result<(), StoreError> {
        let mut batch = WriteBatch::new();
        batch.set(path.clone(), data);
        self.commit(batch, vec![]).await
    }

    async fn update(&self, path: &DocPath, fields: Map<String, Value>) -> Result<(), StoreError> {
        let mut batch = WriteBatch::new();
        batch.update(path.clone(), fields);
        self.commit(batch, vec![]).await
    }

    async fn delete(&self, path: &DocPath) -> Result<(), StoreError> {
        let mut batch = WriteBatch::new();
        batch.delete(path.clone());
        self.commit(batch, vec![]).await
    }
}
