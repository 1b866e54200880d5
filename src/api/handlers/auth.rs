use axum::{Extension, Json};
use serde::{Deserialize, Serialize};

use crate::{
    error::AppResult,
    models::{ContactKind, UserProfile},
};

use super::super::middleware::Device;
use super::MessageResponse;

#[derive(Debug, Deserialize)]
pub struct RequestOtpRequest {
    pub contact: String,
}

#[derive(Debug, Serialize)]
pub struct OtpSentResponse {
    pub message: String,
    pub channel: ContactKind,
}

pub async fn request_otp(
    Extension(device): Extension<Device>,
    Json(req): Json<RequestOtpRequest>,
) -> AppResult<Json<OtpSentResponse>> {
    let channel = device.session.lock().await.request_otp(&req.contact).await?;
    tracing::debug!("OTP requested from device {}", device.id);

    Ok(Json(OtpSentResponse {
        message: "OTP sent successfully.".to_string(),
        channel,
    }))
}

#[derive(Debug, Deserialize)]
pub struct VerifyOtpRequest {
    pub contact: String,
    pub code: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub message: String,
    pub user: UserProfile,
}

pub async fn verify_otp(
    Extension(device): Extension<Device>,
    Json(req): Json<VerifyOtpRequest>,
) -> AppResult<Json<LoginResponse>> {
    let user = device
        .session
        .lock()
        .await
        .verify_otp(&req.contact, &req.code)
        .await?;

    Ok(Json(LoginResponse {
        message: "Login successful.".to_string(),
        user,
    }))
}

pub async fn logout(Extension(device): Extension<Device>) -> AppResult<Json<MessageResponse>> {
    device.session.lock().await.logout().await?;
    tracing::debug!("Device {} logged out", device.id);

    Ok(Json(MessageResponse {
        message: "You have been logged out.".to_string(),
    }))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionResponse {
    pub is_authenticated: bool,
    pub user: Option<UserProfile>,
}

pub async fn me(Extension(device): Extension<Device>) -> AppResult<Json<SessionResponse>> {
    let session = device.session.lock().await;

    Ok(Json(SessionResponse {
        is_authenticated: session.is_authenticated(),
        user: session.user().cloned(),
    }))
}
