use std::sync::Arc;

use serde_json::Map;

use crate::{
    error::AppResult,
    models::Product,
    services::{decode_documents, timestamped_id},
    storage::{document::collections, DocumentStore, DocumentWrite, Query},
};

pub struct ProductsService {
    documents: Arc<dyn DocumentStore>,
}

impl ProductsService {
    pub fn new(documents: Arc<dyn DocumentStore>) -> Self {
        Self { documents }
    }

    /// Create or merge-update a product. New products without an id get a
    /// time-based one.
    pub async fn save_product(&self, product: Product) -> AppResult<Product> {
        let mut product = product;
        let id = product
            .id
            .take()
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| timestamped_id("product"));

        let exists = self
            .documents
            .get(collections::PRODUCTS, &id)
            .await?
            .is_some();

        product.created_at = None;
        product.updated_at = None;
        let mut write = DocumentWrite::from_record(&product)?
            .server_timestamp("updatedAt")
            .merge();
        if !exists {
            write = write.server_timestamp("createdAt");
        }
        self.documents.set(collections::PRODUCTS, &id, write).await?;

        tracing::info!("Saved product {}", id);
        product.id = Some(id);
        Ok(product)
    }

    pub async fn get_all_products(&self) -> AppResult<Vec<Product>> {
        let docs = self
            .documents
            .query(collections::PRODUCTS, &Query::new())
            .await?;
        Ok(decode_documents(collections::PRODUCTS, docs))
    }

    /// Soft delete: the product stays in the catalogue but is inactive.
    pub async fn delete_product(&self, product_id: &str) -> AppResult<()> {
        let write = DocumentWrite::new(Map::new())
            .field("isActive", false)
            .server_timestamp("updatedAt");
        self.documents
            .update(collections::PRODUCTS, product_id, write)
            .await?;

        tracing::info!("Deactivated product {}", product_id);
        Ok(())
    }
}
