use axum::{
    extract::{Path, State},
    Extension, Json,
};
use serde::Deserialize;

use crate::{
    error::{AppError, AppResult},
    models::{Order, OrderData, OrderStats, OrderStatus, PaymentStatus},
    services::orders::OrdersService,
    AppState,
};

use super::super::middleware::Device;
use super::SuccessResponse;

pub async fn create_order(
    State(state): State<AppState>,
    Json(req): Json<OrderData>,
) -> AppResult<Json<Order>> {
    if req.user_id.trim().is_empty() {
        return Err(AppError::Validation("userId is required".to_string()));
    }

    let service = OrdersService::new(state.documents);
    let order = service.save_order(req).await?;

    Ok(Json(order))
}

pub async fn get_my_orders(
    State(state): State<AppState>,
    Extension(device): Extension<Device>,
) -> AppResult<Json<Vec<Order>>> {
    let user_id = device.user_id().await?;

    let service = OrdersService::new(state.documents);
    let orders = service.get_user_orders(&user_id).await?;

    Ok(Json(orders))
}

pub async fn get_all_orders(State(state): State<AppState>) -> AppResult<Json<Vec<Order>>> {
    let service = OrdersService::new(state.documents);
    let orders = service.get_all_orders().await?;

    Ok(Json(orders))
}

pub async fn get_order_stats(State(state): State<AppState>) -> AppResult<Json<OrderStats>> {
    let service = OrdersService::new(state.documents);
    let stats = service.get_order_stats().await?;

    Ok(Json(stats))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateOrderStatusRequest {
    pub status: OrderStatus,
    pub payment_status: Option<PaymentStatus>,
}

pub async fn update_order_status(
    State(state): State<AppState>,
    Path(order_id): Path<String>,
    Json(req): Json<UpdateOrderStatusRequest>,
) -> AppResult<Json<SuccessResponse>> {
    let service = OrdersService::new(state.documents);
    service
        .update_order_status(&order_id, req.status, req.payment_status)
        .await?;

    Ok(Json(SuccessResponse::ok()))
}
