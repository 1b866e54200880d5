pub mod auth;
pub mod identity;
pub mod inquiries;
pub mod orders;
pub mod otp;
pub mod products;
pub mod profiles;

use chrono::Utc;
use serde::de::DeserializeOwned;
use uuid::Uuid;

use crate::storage::Document;

/// Decode every document of a listing, skipping (and logging) the ones that
/// do not fit the record type.
pub(crate) fn decode_documents<T: DeserializeOwned>(collection: &str, docs: Vec<Document>) -> Vec<T> {
    docs.into_iter()
        .filter_map(|doc| {
            let id = doc.id.clone();
            match doc.decode() {
                Ok(record) => Some(record),
                Err(e) => {
                    tracing::warn!("Skipping malformed document {}/{}: {}", collection, id, e);
                    None
                }
            }
        })
        .collect()
}

/// Time-based document id such as `order_1718000000000_3f2b9c1e`. The
/// random suffix keeps ids minted in the same millisecond apart.
pub(crate) fn timestamped_id(prefix: &str) -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("{}_{}_{}", prefix, Utc::now().timestamp_millis(), &suffix[..8])
}
