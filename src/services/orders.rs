use std::sync::Arc;

use serde_json::Map;

use crate::{
    error::AppResult,
    models::{Order, OrderData, OrderStats, OrderStatus, PaymentStatus},
    services::{decode_documents, timestamped_id},
    storage::{document::collections, Direction, DocumentStore, DocumentWrite, Query},
};

pub struct OrdersService {
    documents: Arc<dyn DocumentStore>,
}

impl OrdersService {
    pub fn new(documents: Arc<dyn DocumentStore>) -> Self {
        Self { documents }
    }

    /// Store a new order as `pending`, defaulting payment status and
    /// shipping cost.
    pub async fn save_order(&self, data: OrderData) -> AppResult<Order> {
        let id = timestamped_id("order");

        let mut data = data;
        data.payment_status.get_or_insert(PaymentStatus::Pending);
        data.shipping_cost.get_or_insert(0.0);

        let write = DocumentWrite::from_record(&data)?
            .field("status", OrderStatus::Pending.as_str())
            .server_timestamp("createdAt")
            .server_timestamp("updatedAt");
        self.documents.set(collections::ORDERS, &id, write).await?;

        tracing::info!("Saved order {} for user {}", id, data.user_id);
        Ok(Order {
            id,
            data,
            status: OrderStatus::Pending,
            created_at: None,
            updated_at: None,
        })
    }

    /// Orders of one user, newest first.
    pub async fn get_user_orders(&self, user_id: &str) -> AppResult<Vec<Order>> {
        let query = Query::new()
            .where_eq("userId", user_id)
            .order_by("createdAt", Direction::Descending);
        let docs = self.documents.query(collections::ORDERS, &query).await?;
        Ok(decode_documents(collections::ORDERS, docs))
    }

    pub async fn get_all_orders(&self) -> AppResult<Vec<Order>> {
        let query = Query::new().order_by("createdAt", Direction::Descending);
        let docs = self.documents.query(collections::ORDERS, &query).await?;
        Ok(decode_documents(collections::ORDERS, docs))
    }

    pub async fn update_order_status(
        &self,
        order_id: &str,
        status: OrderStatus,
        payment_status: Option<PaymentStatus>,
    ) -> AppResult<()> {
        let mut write = DocumentWrite::new(Map::new())
            .field("status", status.as_str())
            .server_timestamp("updatedAt");
        if let Some(payment_status) = payment_status {
            write = write.field("paymentStatus", payment_status.as_str());
        }

        self.documents
            .update(collections::ORDERS, order_id, write)
            .await?;

        tracing::info!("Order {} moved to {}", order_id, status.as_str());
        Ok(())
    }

    /// Totals over every order. Records with a missing amount count as zero.
    pub async fn get_order_stats(&self) -> AppResult<OrderStats> {
        let docs = self
            .documents
            .query(collections::ORDERS, &Query::new())
            .await?;

        let mut stats = OrderStats {
            total_orders: docs.len(),
            ..OrderStats::default()
        };
        for doc in &docs {
            stats.total_revenue += doc
                .data
                .get("totalAmount")
                .and_then(|v| v.as_f64())
                .unwrap_or(0.0);

            match doc.data.get("status").and_then(|v| v.as_str()) {
                Some(s) if s == OrderStatus::Pending.as_str() => stats.pending_orders += 1,
                Some(s) if s == OrderStatus::Delivered.as_str() => stats.completed_orders += 1,
                _ => {}
            }
        }

        Ok(stats)
    }
}
