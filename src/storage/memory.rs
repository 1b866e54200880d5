use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};

use async_trait::async_trait;
use chrono::{DateTime, Duration, SecondsFormat, Utc};
use serde_json::{Map, Value};
use tokio::sync::{Mutex, RwLock};

use crate::error::{AppError, AppResult};

use super::document::{Direction, Document, DocumentStore, DocumentWrite, Query};

type Collection = BTreeMap<String, Map<String, Value>>;

/// Process-local document store. Can be switched offline to simulate an
/// unreachable backend.
#[derive(Debug)]
pub struct MemoryDocumentStore {
    collections: RwLock<HashMap<String, Collection>>,
    last_stamp: Mutex<DateTime<Utc>>,
    available: AtomicBool,
}

impl Default for MemoryDocumentStore {
    fn default() -> Self {
        Self {
            collections: RwLock::new(HashMap::new()),
            last_stamp: Mutex::new(DateTime::<Utc>::MIN_UTC),
            available: AtomicBool::new(true),
        }
    }
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, AtomicOrdering::SeqCst);
    }

    fn ensure_available(&self) -> AppResult<()> {
        if self.available.load(AtomicOrdering::SeqCst) {
            Ok(())
        } else {
            Err(AppError::StoreUnavailable)
        }
    }

    /// Strictly increasing timestamps so creation order survives sorting.
    async fn stamp(&self) -> Value {
        let mut last = self.last_stamp.lock().await;
        let mut now = Utc::now();
        if now <= *last {
            now = *last + Duration::microseconds(1);
        }
        *last = now;
        Value::String(now.to_rfc3339_opts(SecondsFormat::Micros, true))
    }

    /// Called with the collections write guard held, so the whole
    /// read-modify-write of a document is one step.
    async fn apply(&self, target: &mut Map<String, Value>, write: DocumentWrite) {
        target.extend(write.fields);
        if !write.server_timestamps.is_empty() {
            let stamp = self.stamp().await;
            for field in write.server_timestamps {
                target.insert(field, stamp.clone());
            }
        }
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn get(&self, collection: &str, id: &str) -> AppResult<Option<Document>> {
        self.ensure_available()?;
        let collections = self.collections.read().await;
        Ok(collections
            .get(collection)
            .and_then(|docs| docs.get(id))
            .map(|data| Document {
                id: id.to_string(),
                data: data.clone(),
            }))
    }

    async fn set(&self, collection: &str, id: &str, write: DocumentWrite) -> AppResult<()> {
        self.ensure_available()?;
        let mut collections = self.collections.write().await;
        let docs = collections.entry(collection.to_string()).or_default();

        let mut data = if write.merge {
            docs.get(id).cloned().unwrap_or_default()
        } else {
            Map::new()
        };
        self.apply(&mut data, write).await;
        docs.insert(id.to_string(), data);
        Ok(())
    }

    async fn update(&self, collection: &str, id: &str, write: DocumentWrite) -> AppResult<()> {
        self.ensure_available()?;
        let mut collections = self.collections.write().await;
        let data = collections
            .get_mut(collection)
            .and_then(|docs| docs.get_mut(id))
            .ok_or_else(|| AppError::DocumentNotFound(format!("{}/{}", collection, id)))?;

        self.apply(data, write).await;
        Ok(())
    }

    async fn query(&self, collection: &str, query: &Query) -> AppResult<Vec<Document>> {
        self.ensure_available()?;
        let collections = self.collections.read().await;
        let mut docs: Vec<Document> = collections
            .get(collection)
            .map(|docs| {
                docs.iter()
                    .filter(|(_, data)| query.matches(data))
                    .map(|(id, data)| Document {
                        id: id.clone(),
                        data: data.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default();

        if let Some((field, direction)) = &query.order_by {
            docs.sort_by(|a, b| {
                let ordering = compare_fields(a.data.get(field), b.data.get(field));
                match direction {
                    Direction::Ascending => ordering,
                    Direction::Descending => ordering.reverse(),
                }
            });
        }

        Ok(docs)
    }
}

/// Order two field values; documents missing the field sort first.
fn compare_fields(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(Value::Number(x)), Some(Value::Number(y))) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        (Some(Value::Bool(x)), Some(Value::Bool(y))) => x.cmp(y),
        (Some(x), Some(y)) => x.to_string().cmp(&y.to_string()),
    }
}
