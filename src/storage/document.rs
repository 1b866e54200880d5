use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::{Map, Value};

use crate::error::{AppError, AppResult};

/// A record read back from a collection.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: String,
    pub data: Map<String, Value>,
}

impl Document {
    /// Decode into a typed record. The document id is exposed as `id`.
    pub fn decode<T: DeserializeOwned>(self) -> AppResult<T> {
        let mut data = self.data;
        data.insert("id".to_string(), Value::String(self.id));
        Ok(serde_json::from_value(Value::Object(data))?)
    }
}

/// Field payload for `set` and `update`, plus the fields the store stamps
/// with its own clock.
#[derive(Debug, Clone, Default)]
pub struct DocumentWrite {
    pub fields: Map<String, Value>,
    pub server_timestamps: Vec<String>,
    pub merge: bool,
}

impl DocumentWrite {
    pub fn new(fields: Map<String, Value>) -> Self {
        Self {
            fields,
            ..Self::default()
        }
    }

    /// Serialize a record into a field map. Anything but a JSON object is
    /// rejected.
    pub fn from_record<T: Serialize>(record: &T) -> AppResult<Self> {
        match serde_json::to_value(record)? {
            Value::Object(fields) => Ok(Self::new(fields)),
            other => Err(AppError::Validation(format!(
                "document body must be an object, got {}",
                other
            ))),
        }
    }

    pub fn field(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.fields.insert(name.to_string(), value.into());
        self
    }

    pub fn server_timestamp(mut self, name: &str) -> Self {
        self.fields.remove(name);
        self.server_timestamps.push(name.to_string());
        self
    }

    pub fn merge(mut self) -> Self {
        self.merge = true;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Ascending,
    Descending,
}

#[derive(Debug, Clone, Default)]
pub struct Query {
    pub filters: Vec<(String, Value)>,
    pub order_by: Option<(String, Direction)>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn where_eq(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.filters.push((field.to_string(), value.into()));
        self
    }

    pub fn order_by(mut self, field: &str, direction: Direction) -> Self {
        self.order_by = Some((field.to_string(), direction));
        self
    }

    /// Whether a document's fields satisfy every equality filter.
    pub fn matches(&self, data: &Map<String, Value>) -> bool {
        self.filters
            .iter()
            .all(|(field, expected)| data.get(field) == Some(expected))
    }
}

/// Schema-flexible document database addressed by collection name.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn get(&self, collection: &str, id: &str) -> AppResult<Option<Document>>;

    /// Create or replace a document; with `merge` the fields are folded into
    /// an existing document instead.
    async fn set(&self, collection: &str, id: &str, write: DocumentWrite) -> AppResult<()>;

    /// Patch fields of an existing document. Fails with
    /// [`AppError::DocumentNotFound`] when the document is missing.
    async fn update(&self, collection: &str, id: &str, write: DocumentWrite) -> AppResult<()>;

    async fn query(&self, collection: &str, query: &Query) -> AppResult<Vec<Document>>;
}

/// Collection names used by the storefront.
pub mod collections {
    pub const USERS: &str = "users";
    pub const USER_PROFILES: &str = "user_profiles";
    pub const ORDERS: &str = "orders";
    pub const INQUIRIES: &str = "inquiries";
    pub const PRODUCTS: &str = "products";
}
