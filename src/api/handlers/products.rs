use axum::{
    extract::{Path, State},
    Json,
};

use crate::{
    error::{AppError, AppResult},
    models::Product,
    services::products::ProductsService,
    AppState,
};

use super::SuccessResponse;

pub async fn save_product(
    State(state): State<AppState>,
    Json(req): Json<Product>,
) -> AppResult<Json<Product>> {
    if req.name.trim().is_empty() {
        return Err(AppError::Validation("Product name is required".to_string()));
    }

    let service = ProductsService::new(state.documents);
    let product = service.save_product(req).await?;

    Ok(Json(product))
}

pub async fn get_all_products(State(state): State<AppState>) -> AppResult<Json<Vec<Product>>> {
    let service = ProductsService::new(state.documents);
    let products = service.get_all_products().await?;

    Ok(Json(products))
}

pub async fn delete_product(
    State(state): State<AppState>,
    Path(product_id): Path<String>,
) -> AppResult<Json<SuccessResponse>> {
    let service = ProductsService::new(state.documents);
    service.delete_product(&product_id).await?;

    Ok(Json(SuccessResponse::ok()))
}
