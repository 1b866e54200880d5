use std::sync::Arc;

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use tokio::sync::Mutex;

use crate::{
    error::{AppError, AppResult},
    services::auth::UserSession,
    storage::LocalStorage,
    AppState,
};

pub const DEVICE_HEADER: &str = "x-device-id";

/// The calling device: its session and its slice of device storage.
#[derive(Clone)]
pub struct Device {
    pub id: String,
    pub session: Arc<Mutex<UserSession>>,
    pub storage: Arc<dyn LocalStorage>,
}

impl Device {
    /// Id of the signed-in user, or `Unauthorized`.
    pub async fn user_id(&self) -> AppResult<String> {
        let session = self.session.lock().await;
        Ok(session.require_user()?.id.clone())
    }
}

/// Resolve the `X-Device-Id` header into a [`Device`] extension
pub async fn device_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let device_id = request
        .headers()
        .get(DEVICE_HEADER)
        .and_then(|h| h.to_str().ok())
        .map(str::trim)
        .filter(|id| is_valid_device_id(id))
        .ok_or_else(|| AppError::BadRequest("Missing or invalid X-Device-Id header".to_string()))?
        .to_string();

    let session = state.sessions.session(&device_id).await;
    let storage = state.sessions.device_storage(&device_id);

    request.extensions_mut().insert(Device {
        id: device_id.clone(),
        session,
        storage,
    });

    let response = next.run(request).await;
    state.sessions.release(&device_id).await;

    Ok(response)
}

fn is_valid_device_id(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= 128
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn device_ids_are_restricted() {
        assert!(is_valid_device_id("3f2b9c1e-phone_1"));
        assert!(!is_valid_device_id(""));
        assert!(!is_valid_device_id("a:b"));
        assert!(!is_valid_device_id(&"x".repeat(129)));
    }
}
