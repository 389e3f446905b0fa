//! Optimistic read-check-then-write transactions.
//!
//! Reads made through a [`Transaction`] record the version they observed;
//! writes are buffered. On commit the store re-checks every observed version
//! in the same atomic step that applies the writes. A conflict discards the
//! attempt and re-runs the body from scratch.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Map, Value};

use super::{DocPath, Document, DocumentStore, Precondition, Query, StoreError, WriteBatch};

/// Attempts made before a contended transaction gives up.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

const RETRY_BACKOFF_MS: u64 = 10;

/// Handle passed to a transaction body.
pub struct Transaction<'a> {
    store: &'a dyn DocumentStore,
    preconditions: Vec<Precondition>,
    writes: WriteBatch,
}

impl<'a> Transaction<'a> {
    pub fn new(store: &'a dyn DocumentStore) -> Self {
        Self {
            store,
            preconditions: vec![],
            writes: WriteBatch::new(),
        }
    }

    /// Read a document; the commit fails if it changes before then.
    pub async fn get(&mut self, path: &DocPath) -> Result<Option<Document>, StoreError> {
        let doc = self.store.get(path).await?;
        self.preconditions.push(Precondition::DocumentVersion {
            path: path.clone(),
            version: doc.as_ref().map_or(0, |d| d.version),
        });
        Ok(doc)
    }

    /// Run a query; the commit fails if any write lands in the collection
    /// before then, which also covers documents that would newly match.
    pub async fn query(&mut self, query: &Query) -> Result<Vec<Document>, StoreError> {
        let snapshot = self.store.query(query).await?;
        self.preconditions.push(Precondition::CollectionVersion {
            collection: query.collection.clone(),
            version: snapshot.collection_version,
        });
        Ok(snapshot.documents)
    }

    pub fn set(&mut self, path: DocPath, data: Map<String, Value>) {
        self.writes.set(path, data);
    }

    pub fn update(&mut self, path: DocPath, fields: Map<String, Value>) {
        self.writes.update(path, fields);
    }

    pub fn delete(&mut self, path: DocPath) {
        self.writes.delete(path);
    }

    fn into_parts(self) -> (WriteBatch, Vec<Precondition>) {
        (self.writes, self.preconditions)
    }
}

/// Body of a transaction. Must be safe to run more than once.
#[async_trait]
pub trait TransactionBody: Send + Sync {
    type Output: Send;

    async fn run(&self, tx: &mut Transaction<'_>) -> Result<Self::Output, StoreError>;
}

/// Run `body` until it commits without conflict or `max_attempts` is spent.
///
/// Errors returned by the body itself abort immediately without retry.
pub async fn run_transaction<B: TransactionBody>(
    store: &dyn DocumentStore,
    body: &B,
    max_attempts: u32,
) -> Result<B::Output, StoreError> {
    let max_attempts = max_attempts.max(1);
    let mut attempt = 0;

    loop {
        attempt += 1;
        let mut tx = Transaction::new(store);
        let output = body.run(&mut tx).await?;
        let (writes, preconditions) = tx.into_parts();

        match store.commit(writes, preconditions).await {
            Ok(()) => return Ok(output),
            Err(StoreError::Conflict) if attempt < max_attempts => {
                tracing::debug!(
                    "Transaction conflict, retrying (attempt {}/{})",
                    attempt,
                    max_attempts
                );
                tokio::time::sleep(Duration::from_millis(RETRY_BACKOFF_MS * attempt as u64)).await;
            }
            Err(StoreError::Conflict) => return Err(StoreError::TooManyConflicts(max_attempts)),
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::SqliteDocumentStore;
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn obj(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("not an object"),
        }
    }

    struct Increment {
        path: DocPath,
        runs: AtomicU32,
    }

    #[async_trait]
    impl TransactionBody for Increment {
        type Output = i64;

        async fn run(&self, tx: &mut Transaction<'_>) -> Result<i64, StoreError> {
            self.runs.fetch_add(1, Ordering::SeqCst);
            let current = tx
                .get(&self.path)
                .await?
                .and_then(|d| d.data.get("n").and_then(Value::as_i64))
                .unwrap_or(0);
            tx.set(self.path.clone(), obj(json!({"n": current + 1})));
            Ok(current + 1)
        }
    }

    #[tokio::test]
    async fn test_transaction_commits_buffered_writes() {
        let store = SqliteDocumentStore::in_memory().unwrap();
        let body = Increment {
            path: DocPath::new("counters", "c"),
            runs: AtomicU32::new(0),
        };

        assert_eq!(run_transaction(&store, &body, 3).await.unwrap(), 1);
        assert_eq!(run_transaction(&store, &body, 3).await.unwrap(), 2);
        let doc = store.get(&body.path).await.unwrap().unwrap();
        assert_eq!(doc.data.get("n"), Some(&json!(2)));
    }

    #[tokio::test]
    async fn test_stale_read_conflicts() {
        let store = SqliteDocumentStore::in_memory().unwrap();
        let path = DocPath::new("counters", "c");

        let mut first = Transaction::new(&store);
        let mut second = Transaction::new(&store);
        assert!(first.get(&path).await.unwrap().is_none());
        assert!(second.get(&path).await.unwrap().is_none());
        first.set(path.clone(), obj(json!({"n": 1})));
        second.set(path.clone(), obj(json!({"n": 100})));

        let (writes, pre) = first.into_parts();
        store.commit(writes, pre).await.unwrap();
        let (writes, pre) = second.into_parts();
        assert!(matches!(store.commit(writes, pre).await, Err(StoreError::Conflict)));

        let doc = store.get(&path).await.unwrap().unwrap();
        assert_eq!(doc.data.get("n"), Some(&json!(1)));
    }

    #[tokio::test]
    async fn test_query_read_conflicts_on_new_match() {
        let store = SqliteDocumentStore::in_memory().unwrap();
        let admins = Query::collection("users").filter_eq("role", "admin").limit(1);

        let mut tx = Transaction::new(&store);
        assert!(tx.query(&admins).await.unwrap().is_empty());
        tx.set(DocPath::new("users", "b"), obj(json!({"role": "admin"})));

        store
            .set(&DocPath::new("users", "a"), obj(json!({"role": "admin"})))
            .await
            .unwrap();

        let (writes, pre) = tx.into_parts();
        assert!(matches!(store.commit(writes, pre).await, Err(StoreError::Conflict)));
        assert!(store.get(&DocPath::new("users", "b")).await.unwrap().is_none());
    }

    struct Failing;

    #[async_trait]
    impl TransactionBody for Failing {
        type Output = ();

        async fn run(&self, tx: &mut Transaction<'_>) -> Result<(), StoreError> {
            tx.set(DocPath::new("users", "x"), Map::new());
            Err(StoreError::Database("boom".to_string()))
        }
    }

    #[tokio::test]
    async fn test_body_error_writes_nothing() {
        let store = SqliteDocumentStore::in_memory().unwrap();
        assert!(run_transaction(&store, &Failing, 5).await.is_err());
        assert!(store.get(&DocPath::new("users", "x")).await.unwrap().is_none());
    }
}
