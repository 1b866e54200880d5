use axum::{
    extract::{Path, State},
    Extension, Json,
};
use serde::Deserialize;

use crate::{
    error::{AppError, AppResult},
    models::{Inquiry, InquiryData, InquiryForm, InquiryStatus},
    services::inquiries::{InquiriesService, InquiryCache, SavedInquiry, StoredInquiries},
    AppState,
};

use super::super::middleware::Device;
use super::SuccessResponse;

pub async fn create_inquiry(
    State(state): State<AppState>,
    Json(req): Json<InquiryData>,
) -> AppResult<Json<Inquiry>> {
    if req.user_id.trim().is_empty() {
        return Err(AppError::Validation("userId is required".to_string()));
    }

    let service = InquiriesService::new(state.documents);
    let inquiry = service.save_inquiry(req).await?;

    Ok(Json(inquiry))
}

pub async fn get_my_inquiries(
    State(state): State<AppState>,
    Extension(device): Extension<Device>,
) -> AppResult<Json<Vec<Inquiry>>> {
    let user_id = device.user_id().await?;

    let service = InquiriesService::new(state.documents);
    let inquiries = service.get_user_inquiries(&user_id).await?;

    Ok(Json(inquiries))
}

pub async fn get_all_inquiries(State(state): State<AppState>) -> AppResult<Json<Vec<Inquiry>>> {
    let service = InquiriesService::new(state.documents);
    let inquiries = service.get_all_inquiries().await?;

    Ok(Json(inquiries))
}

#[derive(Debug, Deserialize)]
pub struct UpdateInquiryStatusRequest {
    pub status: InquiryStatus,
}

pub async fn update_inquiry_status(
    State(state): State<AppState>,
    Path(inquiry_id): Path<String>,
    Json(req): Json<UpdateInquiryStatusRequest>,
) -> AppResult<Json<SuccessResponse>> {
    let service = InquiriesService::new(state.documents);
    service.update_inquiry_status(&inquiry_id, req.status).await?;

    Ok(Json(SuccessResponse::ok()))
}

// Owner dashboard

pub async fn add_dashboard_inquiry(
    State(state): State<AppState>,
    Extension(device): Extension<Device>,
    Json(req): Json<InquiryForm>,
) -> AppResult<Json<SavedInquiry>> {
    let cache = InquiryCache::new(state.documents, device.storage);
    let saved = cache.add_inquiry(req).await?;

    Ok(Json(saved))
}

pub async fn get_dashboard_inquiries(
    State(state): State<AppState>,
    Extension(device): Extension<Device>,
) -> AppResult<Json<StoredInquiries>> {
    let cache = InquiryCache::new(state.documents, device.storage);
    let stored = cache.get_stored_inquiries().await?;

    Ok(Json(stored))
}

pub async fn remove_dashboard_inquiry(
    State(state): State<AppState>,
    Extension(device): Extension<Device>,
    Path(inquiry_id): Path<String>,
) -> AppResult<Json<SuccessResponse>> {
    let cache = InquiryCache::new(state.documents, device.storage);
    cache.remove_inquiry(&inquiry_id).await?;

    Ok(Json(SuccessResponse::ok()))
}

pub async fn clear_dashboard_inquiries(
    State(state): State<AppState>,
    Extension(device): Extension<Device>,
) -> AppResult<Json<SuccessResponse>> {
    let cache = InquiryCache::new(state.documents, device.storage);
    cache.clear_inquiries().await?;

    Ok(Json(SuccessResponse::ok()))
}
