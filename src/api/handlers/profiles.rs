use axum::{extract::State, Extension, Json};

use crate::{
    error::AppResult,
    models::{StoredUserProfile, UserProfileData},
    services::profiles::ProfilesService,
    AppState,
};

use super::super::middleware::Device;
use super::SuccessResponse;

pub async fn get_profile(
    State(state): State<AppState>,
    Extension(device): Extension<Device>,
) -> AppResult<Json<Option<StoredUserProfile>>> {
    let user_id = device.user_id().await?;

    let service = ProfilesService::new(state.documents);
    let profile = service.get_user_profile(&user_id).await?;

    Ok(Json(profile))
}

pub async fn save_profile(
    State(state): State<AppState>,
    Extension(device): Extension<Device>,
    Json(req): Json<UserProfileData>,
) -> AppResult<Json<SuccessResponse>> {
    let user_id = device.user_id().await?;

    let service = ProfilesService::new(state.documents);
    service.save_user_profile(&user_id, &req).await?;

    Ok(Json(SuccessResponse::ok()))
}
