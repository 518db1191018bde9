//! # Document Store
//!
//! Persistence for the two collections the application uses: `interviews` and
//! `feedback`. The store is schemaless (JSON documents keyed by id); typed access
//! goes through [`repository`].
//!
//! ## Components:
//! - **DocumentStore**: the trait every backend implements (injected as `Arc<dyn DocumentStore>`)
//! - **Query**: equality / inequality filters, ordering and limits
//! - **MemoryStore**: in-process backend with an optional JSON snapshot file
//! - **models / repository**: typed documents and the queries the HTTP layer needs

pub mod memory;
pub mod models;
pub mod query;
pub mod repository;

pub use memory::MemoryStore;
pub use query::{Direction, Query};

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;

/// Collection holding generated interviews.
pub const INTERVIEWS: &str = "interviews";
/// Collection holding feedback for conducted interviews.
pub const FEEDBACK: &str = "feedback";

/// Errors raised by document store backends.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("storage I/O failed: {0}")]
    Io(String),

    #[error("document serialization failed: {0}")]
    Serialization(String),

    #[error("invalid document '{id}': {message}")]
    InvalidDocument { id: String, message: String },
}

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        StoreError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}

/// One stored document: its id plus the JSON body (the id is not part of the body).
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: String,
    pub data: Value,
}

impl Document {
    /// Deserialize into a typed model, injecting the document id as `id`.
    pub fn into_typed<T: DeserializeOwned>(self) -> Result<T, StoreError> {
        let Document { id, mut data } = self;
        if let Value::Object(map) = &mut data {
            map.insert("id".to_string(), Value::String(id.clone()));
        }
        serde_json::from_value(data).map_err(|e| StoreError::InvalidDocument {
            id,
            message: e.to_string(),
        })
    }
}

/// Minimal document database contract.
///
/// ## Thread Safety:
/// Implementations are shared across HTTP workers and call sessions behind an `Arc`,
/// so they must be `Send + Sync` and do their own locking.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Insert a document under a freshly generated id and return that id.
    async fn add(&self, collection: &str, data: Value) -> Result<String, StoreError>;

    /// Create or overwrite the document with the given id.
    async fn set(&self, collection: &str, id: &str, data: Value) -> Result<(), StoreError>;

    /// Fetch a single document by id.
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>, StoreError>;

    /// Run a query against one collection.
    async fn query(&self, collection: &str, query: &Query) -> Result<Vec<Document>, StoreError>;
}
