use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Signed-in user as cached on the device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: String,
    pub contact: String,
    pub last_login_at: DateTime<Utc>,
}

/// The `users/{uid}` document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserDocument {
    #[serde(default)]
    pub contact: Option<String>,
    #[serde(default)]
    pub last_login_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

/// An outstanding OTP challenge. Never holds the plaintext code.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingVerification {
    pub contact: String,
    pub otp_hash: String,
    pub expires_at: DateTime<Utc>,
    pub attempts: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContactKind {
    Email,
    Phone,
}

/// Backend-issued identity that carries no password credential.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnonymousIdentity {
    pub uid: String,
    pub token: String,
}
