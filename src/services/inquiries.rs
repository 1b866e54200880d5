use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::{
    error::AppResult,
    models::{
        Inquiry, InquiryData, InquiryForm, InquiryStatus, StoredInquiry, STORED_INQUIRY_FIELDS,
    },
    services::{decode_documents, timestamped_id},
    storage::{document::collections, Direction, DocumentStore, DocumentWrite, LocalStorage, Query},
};

pub const INQUIRY_STORAGE_KEY: &str = "owner-dashboard-inquiries";

pub struct InquiriesService {
    documents: Arc<dyn DocumentStore>,
}

impl InquiriesService {
    pub fn new(documents: Arc<dyn DocumentStore>) -> Self {
        Self { documents }
    }

    pub async fn save_inquiry(&self, data: InquiryData) -> AppResult<Inquiry> {
        let id = timestamped_id("inquiry");

        let write = DocumentWrite::from_record(&data)?
            .field("status", InquiryStatus::Pending.as_str())
            .server_timestamp("createdAt")
            .server_timestamp("updatedAt");
        self.documents.set(collections::INQUIRIES, &id, write).await?;

        tracing::info!("Saved inquiry {} for user {}", id, data.user_id);
        Ok(Inquiry {
            id,
            data,
            status: InquiryStatus::Pending,
            created_at: None,
            updated_at: None,
        })
    }

    pub async fn get_user_inquiries(&self, user_id: &str) -> AppResult<Vec<Inquiry>> {
        let query = Query::new()
            .where_eq("userId", user_id)
            .order_by("createdAt", Direction::Descending);
        let docs = self.documents.query(collections::INQUIRIES, &query).await?;
        Ok(decode_documents(collections::INQUIRIES, docs))
    }

    pub async fn get_all_inquiries(&self) -> AppResult<Vec<Inquiry>> {
        let query = Query::new().order_by("createdAt", Direction::Descending);
        let docs = self.documents.query(collections::INQUIRIES, &query).await?;
        Ok(decode_documents(collections::INQUIRIES, docs))
    }

    pub async fn update_inquiry_status(&self, inquiry_id: &str, status: InquiryStatus) -> AppResult<()> {
        let write = DocumentWrite::new(Map::new())
            .field("status", status.as_str())
            .server_timestamp("updatedAt");
        self.documents
            .update(collections::INQUIRIES, inquiry_id, write)
            .await?;

        tracing::info!("Inquiry {} moved to {}", inquiry_id, status.as_str());
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum InquirySource {
    Remote,
    Local,
}

#[derive(Debug, Clone, Serialize)]
pub struct StoredInquiries {
    pub source: InquirySource,
    pub inquiries: Vec<StoredInquiry>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SavedInquiry {
    pub inquiry: StoredInquiry,
    /// Whether the backend accepted the write; the local mirror always does.
    pub synced: bool,
}

/// Dashboard inquiries, written to the backend and mirrored on the device.
pub struct InquiryCache {
    documents: Arc<dyn DocumentStore>,
    storage: Arc<dyn LocalStorage>,
}

impl InquiryCache {
    pub fn new(documents: Arc<dyn DocumentStore>, storage: Arc<dyn LocalStorage>) -> Self {
        Self { documents, storage }
    }

    pub async fn add_inquiry(&self, form: InquiryForm) -> AppResult<SavedInquiry> {
        let inquiry = StoredInquiry {
            id: Uuid::new_v4().to_string(),
            created_at: Utc::now(),
            form,
            status: None,
        };

        let synced = match self.write_remote(&inquiry).await {
            Ok(()) => true,
            Err(e) => {
                tracing::error!("Error saving inquiry {} to backend: {}", inquiry.id, e);
                false
            }
        };

        let mut inquiries = self.read_local().await?;
        inquiries.push(inquiry.clone());
        self.write_local(&inquiries).await?;

        Ok(SavedInquiry { inquiry, synced })
    }

    /// Backend inquiries, newest first; the device mirror when the backend
    /// cannot be reached.
    pub async fn get_stored_inquiries(&self) -> AppResult<StoredInquiries> {
        let query = Query::new().order_by("createdAt", Direction::Descending);
        match self.documents.query(collections::INQUIRIES, &query).await {
            Ok(docs) => Ok(StoredInquiries {
                source: InquirySource::Remote,
                inquiries: decode_documents(collections::INQUIRIES, docs),
            }),
            Err(e) => {
                tracing::warn!("Error fetching inquiries from backend, using local copy: {}", e);
                Ok(StoredInquiries {
                    source: InquirySource::Local,
                    inquiries: self.read_local().await?,
                })
            }
        }
    }

    pub async fn remove_inquiry(&self, id: &str) -> AppResult<()> {
        let mut inquiries = self.read_local().await?;
        inquiries.retain(|inquiry| inquiry.id != id);
        self.write_local(&inquiries).await
    }

    pub async fn clear_inquiries(&self) -> AppResult<()> {
        self.write_local(&[]).await
    }

    /// The device mirror. Anything that does not look like a list of stored
    /// inquiries reads as empty.
    pub async fn read_local(&self) -> AppResult<Vec<StoredInquiry>> {
        let raw = self.storage.get_item(INQUIRY_STORAGE_KEY).await?;
        Ok(raw.map(|raw| parse_stored_inquiries(&raw)).unwrap_or_default())
    }

    async fn write_local(&self, inquiries: &[StoredInquiry]) -> AppResult<()> {
        let raw = serde_json::to_string(inquiries)?;
        self.storage.set_item(INQUIRY_STORAGE_KEY, &raw).await
    }

    async fn write_remote(&self, inquiry: &StoredInquiry) -> AppResult<()> {
        let write = DocumentWrite::from_record(&inquiry.form)?
            .field("status", InquiryStatus::Pending.as_str())
            .server_timestamp("createdAt");
        self.documents
            .set(collections::INQUIRIES, &inquiry.id, write)
            .await
    }
}

/// All-or-nothing: one malformed element discards the whole list.
fn parse_stored_inquiries(raw: &str) -> Vec<StoredInquiry> {
    let value: Value = match serde_json::from_str(raw) {
        Ok(value) => value,
        Err(e) => {
            tracing::error!("Failed to read inquiries from storage: {}", e);
            return Vec::new();
        }
    };

    if !has_stored_inquiry_shape(&value) {
        tracing::warn!("Discarding malformed inquiry cache");
        return Vec::new();
    }

    serde_json::from_value(value).unwrap_or_else(|e| {
        tracing::warn!("Discarding malformed inquiry cache: {}", e);
        Vec::new()
    })
}

fn has_stored_inquiry_shape(value: &Value) -> bool {
    let Some(items) = value.as_array() else {
        return false;
    };

    items.iter().all(|item| {
        item.as_object()
            .map(|obj| STORED_INQUIRY_FIELDS.iter().all(|field| obj.contains_key(*field)))
            .unwrap_or(false)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{memory::MemoryDocumentStore, MemoryStorage};
    use serde_json::json;

    fn form(brand: &str) -> InquiryForm {
        InquiryForm {
            user_type: "retailer".to_string(),
            phone: "9876543210".to_string(),
            email: "shop@example.com".to_string(),
            address: "4 Market Lane".to_string(),
            pincode: "560001".to_string(),
            brand: brand.to_string(),
            color: "red".to_string(),
            quantity: "20".to_string(),
            unit: "coils".to_string(),
            name: None,
            notes: None,
        }
    }

    fn cache() -> (InquiryCache, Arc<MemoryDocumentStore>, Arc<MemoryStorage>) {
        let documents = Arc::new(MemoryDocumentStore::new());
        let storage = Arc::new(MemoryStorage::new());
        let cache = InquiryCache::new(documents.clone(), storage.clone());
        (cache, documents, storage)
    }

    #[tokio::test]
    async fn local_mirror_round_trip() {
        let (cache, _, _) = cache();
        let first = cache.add_inquiry(form("Polycab")).await.unwrap();
        let second = cache.add_inquiry(form("Havells")).await.unwrap();
        assert!(first.synced && second.synced);

        let local = cache.read_local().await.unwrap();
        assert_eq!(local, vec![first.inquiry, second.inquiry]);
    }

    #[tokio::test]
    async fn one_bad_record_empties_the_mirror() {
        let (cache, _, storage) = cache();
        cache.add_inquiry(form("Polycab")).await.unwrap();

        let raw = storage.get_item(INQUIRY_STORAGE_KEY).await.unwrap().unwrap();
        let mut items: Vec<Value> = serde_json::from_str(&raw).unwrap();
        for field in STORED_INQUIRY_FIELDS {
            let mut broken = items[0].clone();
            broken.as_object_mut().unwrap().remove(field);
            items.push(broken);
            storage
                .set_item(INQUIRY_STORAGE_KEY, &serde_json::to_string(&items).unwrap())
                .await
                .unwrap();
            assert!(cache.read_local().await.unwrap().is_empty(), "missing {field}");
            items.pop();
        }
    }

    #[tokio::test]
    async fn non_array_or_garbage_reads_as_empty() {
        let (cache, _, storage) = cache();
        for raw in ["{\"id\":\"x\"}", "not json", "null", "[1, 2]"] {
            storage.set_item(INQUIRY_STORAGE_KEY, raw).await.unwrap();
            assert!(cache.read_local().await.unwrap().is_empty(), "{raw}");
        }
    }

    #[tokio::test]
    async fn reads_prefer_backend() {
        let (cache, documents, _) = cache();
        cache.add_inquiry(form("Polycab")).await.unwrap();
        cache.add_inquiry(form("Havells")).await.unwrap();

        // A customer inquiry in the same collection is not a dashboard record
        documents
            .set(
                collections::INQUIRIES,
                "inquiry_1",
                DocumentWrite::new(json!({ "userId": "u1" }).as_object().cloned().unwrap()),
            )
            .await
            .unwrap();

        let stored = cache.get_stored_inquiries().await.unwrap();
        assert_eq!(stored.source, InquirySource::Remote);
        let brands: Vec<_> = stored.inquiries.iter().map(|i| i.form.brand.as_str()).collect();
        assert_eq!(brands, vec!["Havells", "Polycab"]);
        assert!(stored
            .inquiries
            .iter()
            .all(|i| i.status == Some(InquiryStatus::Pending)));
    }

    #[tokio::test]
    async fn offline_writes_still_mirror_and_reads_fall_back() {
        let (cache, documents, _) = cache();
        documents.set_available(false);

        let saved = cache.add_inquiry(form("Finolex")).await.unwrap();
        assert!(!saved.synced);

        let stored = cache.get_stored_inquiries().await.unwrap();
        assert_eq!(stored.source, InquirySource::Local);
        assert_eq!(stored.inquiries, vec![saved.inquiry]);
    }

    #[tokio::test]
    async fn remove_and_clear_edit_the_mirror() {
        let (cache, _, _) = cache();
        let keep = cache.add_inquiry(form("Polycab")).await.unwrap();
        let gone = cache.add_inquiry(form("Havells")).await.unwrap();

        cache.remove_inquiry(&gone.inquiry.id).await.unwrap();
        assert_eq!(cache.read_local().await.unwrap(), vec![keep.inquiry]);

        cache.clear_inquiries().await.unwrap();
        assert!(cache.read_local().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn customer_inquiries_round_trip_through_status_updates() {
        let documents = Arc::new(MemoryDocumentStore::new());
        let service = InquiriesService::new(documents.clone());

        let data = InquiryData {
            user_id: "u1".to_string(),
            user_type: "contractor".to_string(),
            location: "Nagpur".to_string(),
            product_name: Some("FR wire".to_string()),
            product_specification: None,
            quantity: Some("500 m".to_string()),
            contact_name: "Ravi".to_string(),
            contact_email: "ravi@example.com".to_string(),
            contact_phone: "9123456780".to_string(),
            additional_requirements: None,
        };
        let saved = service.save_inquiry(data.clone()).await.unwrap();
        assert!(saved.id.starts_with("inquiry_"));

        service
            .update_inquiry_status(&saved.id, InquiryStatus::Quoted)
            .await
            .unwrap();

        let mine = service.get_user_inquiries("u1").await.unwrap();
        assert_eq!(mine.len(), 1);
        assert_eq!(mine[0].data, data);
        assert_eq!(mine[0].status, InquiryStatus::Quoted);
        assert!(service.get_user_inquiries("u2").await.unwrap().is_empty());
        assert_eq!(service.get_all_inquiries().await.unwrap().len(), 1);
    }
}
