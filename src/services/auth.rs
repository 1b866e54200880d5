use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use serde_json::Map;
use tokio::sync::Mutex;

use crate::{
    error::{AppError, AppResult},
    models::{AnonymousIdentity, ContactKind, PendingVerification, UserDocument, UserProfile},
    services::{
        identity::IdentityProvider,
        otp::{classify_contact, OtpIssuer},
    },
    storage::{
        document::collections, DocumentStore, DocumentWrite, LocalStorage, ScopedStorage,
    },
};

pub const USER_STORAGE_KEY: &str = "wirebazaar-user";
pub const IDENTITY_STORAGE_KEY: &str = "wirebazaar-identity";

/// Sign-in state of one device: the cached user, the anonymous identity
/// backing it, and at most one outstanding OTP challenge.
pub struct UserSession {
    storage: Arc<dyn LocalStorage>,
    documents: Arc<dyn DocumentStore>,
    identity: Arc<dyn IdentityProvider>,
    otp: Arc<OtpIssuer>,
    user: Option<UserProfile>,
    signed_in: Option<AnonymousIdentity>,
    pending: Option<PendingVerification>,
}

impl UserSession {
    pub fn new(
        storage: Arc<dyn LocalStorage>,
        documents: Arc<dyn DocumentStore>,
        identity: Arc<dyn IdentityProvider>,
        otp: Arc<OtpIssuer>,
    ) -> Self {
        Self {
            storage,
            documents,
            identity,
            otp,
            user: None,
            signed_in: None,
            pending: None,
        }
    }

    pub fn user(&self) -> Option<&UserProfile> {
        self.user.as_ref()
    }

    pub fn is_authenticated(&self) -> bool {
        self.user.is_some()
    }

    pub fn pending(&self) -> Option<&PendingVerification> {
        self.pending.as_ref()
    }

    /// The signed-in user, or `Unauthorized`.
    pub fn require_user(&self) -> AppResult<&UserProfile> {
        self.user.as_ref().ok_or(AppError::Unauthorized)
    }

    /// Reload the cached user from device storage and, when the stored
    /// identity is still valid, refresh it from the `users` document.
    /// Unreadable records are logged and ignored.
    pub async fn restore(&mut self) {
        match self.load_profile().await {
            Ok(profile) => self.user = profile,
            Err(e) => tracing::error!("Failed to restore user session: {}", e),
        }

        match self.load_identity().await {
            Ok(Some(identity)) => self.resume_identity(identity).await,
            Ok(None) => {}
            Err(e) => tracing::error!("Failed to restore identity: {}", e),
        }
    }

    pub async fn request_otp(&mut self, contact: &str) -> AppResult<ContactKind> {
        let kind = classify_contact(contact).ok_or(AppError::InvalidContact)?;
        let (pending, code) = self.otp.issue(contact, Utc::now())?;

        self.deliver_code(&pending.contact, kind, &code);
        self.pending = Some(pending);

        tracing::info!("OTP issued for {:?} contact", kind);
        Ok(kind)
    }

    pub async fn verify_otp(&mut self, contact: &str, code: &str) -> AppResult<UserProfile> {
        let now = Utc::now();
        self.otp.verify(&mut self.pending, contact, code, now)?;

        let contact = contact.trim().to_string();
        let identity = self.exchange_identity(&contact).await.map_err(|e| {
            tracing::error!("Identity exchange failed: {}", e);
            AppError::AuthenticationFailed
        })?;

        let profile = UserProfile {
            id: identity.uid.clone(),
            contact,
            last_login_at: now,
        };

        self.user = Some(profile.clone());
        self.signed_in = Some(identity);
        self.pending = None;

        if let Err(e) = self.persist().await {
            tracing::error!("Failed to persist user session: {}", e);
        }

        tracing::info!("User {} logged in", profile.id);
        Ok(profile)
    }

    /// Forget the user in memory and on the device, then sign the identity
    /// out of the backend. Sign-out failures are only logged.
    pub async fn logout(&mut self) -> AppResult<()> {
        self.user = None;
        let identity = self.signed_in.take();

        if let Some(identity) = &identity {
            if let Err(e) = self.identity.sign_out(identity).await {
                tracing::warn!("Backend sign-out failed: {}", e);
            }
        }

        self.storage.remove_item(USER_STORAGE_KEY).await?;
        self.storage.remove_item(IDENTITY_STORAGE_KEY).await?;

        tracing::info!("User logged out");
        Ok(())
    }

    /// Sign in a fresh anonymous identity and record the login against it.
    /// The identity is signed out again if the login cannot be recorded.
    async fn exchange_identity(&self, contact: &str) -> AppResult<AnonymousIdentity> {
        let identity = self.identity.sign_in_anonymously().await?;

        if let Err(e) = self.record_login(&identity.uid, contact).await {
            if let Err(sign_out_err) = self.identity.sign_out(&identity).await {
                tracing::warn!(
                    "Failed to sign out identity {} after login error: {}",
                    identity.uid,
                    sign_out_err
                );
            }
            return Err(e);
        }

        Ok(identity)
    }

    async fn record_login(&self, uid: &str, contact: &str) -> AppResult<()> {
        let existing = self.documents.get(collections::USERS, uid).await?;
        let write = DocumentWrite::new(Map::new())
            .field("contact", contact)
            .server_timestamp("lastLoginAt");
        let write = if existing.is_some() {
            write.merge()
        } else {
            write.server_timestamp("createdAt")
        };

        self.documents.set(collections::USERS, uid, write).await
    }

    async fn resume_identity(&mut self, identity: AnonymousIdentity) {
        match self.identity.validate(&identity.token).await {
            Ok(claims) if claims.sub == identity.uid => {}
            Ok(_) | Err(_) => {
                tracing::debug!("Discarding stale identity {}", identity.uid);
                if let Err(e) = self.storage.remove_item(IDENTITY_STORAGE_KEY).await {
                    tracing::warn!("Failed to discard stale identity: {}", e);
                }
                return;
            }
        }

        let matches_user = self
            .user
            .as_ref()
            .map(|user| user.id == identity.uid)
            .unwrap_or(false);
        self.signed_in = Some(identity);

        if matches_user {
            if let Err(e) = self.sync_from_backend().await {
                tracing::error!("Error syncing auth state: {}", e);
            }
        }
    }

    async fn sync_from_backend(&mut self) -> AppResult<()> {
        let Some(current) = self.user.clone() else {
            return Ok(());
        };

        let Some(doc) = self.documents.get(collections::USERS, &current.id).await? else {
            return Ok(());
        };
        let record: UserDocument = serde_json::from_value(serde_json::Value::Object(doc.data))?;

        let updated = UserProfile {
            id: current.id,
            contact: record
                .contact
                .filter(|c| !c.is_empty())
                .unwrap_or(current.contact),
            last_login_at: record.last_login_at.unwrap_or(current.last_login_at),
        };

        self.user = Some(updated);
        self.persist().await
    }

    async fn load_profile(&self) -> AppResult<Option<UserProfile>> {
        let Some(raw) = self.storage.get_item(USER_STORAGE_KEY).await? else {
            return Ok(None);
        };
        let profile: UserProfile = serde_json::from_str(&raw)?;
        Ok(Some(profile).filter(|p| !p.contact.trim().is_empty()))
    }

    async fn load_identity(&self) -> AppResult<Option<AnonymousIdentity>> {
        let Some(raw) = self.storage.get_item(IDENTITY_STORAGE_KEY).await? else {
            return Ok(None);
        };
        Ok(Some(serde_json::from_str(&raw)?))
    }

    async fn persist(&self) -> AppResult<()> {
        if let Some(user) = &self.user {
            let raw = serde_json::to_string(user)?;
            self.storage.set_item(USER_STORAGE_KEY, &raw).await?;
        }
        if let Some(identity) = &self.signed_in {
            let raw = serde_json::to_string(identity)?;
            self.storage.set_item(IDENTITY_STORAGE_KEY, &raw).await?;
        }
        Ok(())
    }

    fn deliver_code(&self, contact: &str, kind: ContactKind, code: &str) {
        // Only development builds ever see the plaintext
        if self.otp.config().log_codes {
            tracing::info!("[OTP DEBUG] Code for {}: {}", contact, code);
            return;
        }

        tracing::warn!("No {:?} delivery channel configured; code not sent", kind);
    }
}

/// Hands out one [`UserSession`] per device, restoring it from device
/// storage the first time the device is seen. Sessions with nothing worth
/// keeping in memory are dropped again; everything else they hold can be
/// restored from device storage.
pub struct SessionRegistry {
    storage: Arc<dyn LocalStorage>,
    documents: Arc<dyn DocumentStore>,
    identity: Arc<dyn IdentityProvider>,
    otp: Arc<OtpIssuer>,
    sessions: Mutex<HashMap<String, SessionEntry>>,
}

struct SessionEntry {
    session: Arc<Mutex<UserSession>>,
    last_seen: Instant,
}

impl SessionEntry {
    /// No request holds the session besides the registry itself.
    fn is_unused(&self) -> bool {
        Arc::strong_count(&self.session) == 1
    }
}

impl SessionRegistry {
    pub fn new(
        storage: Arc<dyn LocalStorage>,
        documents: Arc<dyn DocumentStore>,
        identity: Arc<dyn IdentityProvider>,
        otp: OtpIssuer,
    ) -> Self {
        Self {
            storage,
            documents,
            identity,
            otp: Arc::new(otp),
            sessions: Mutex::new(HashMap::new()),
        }
    }

    pub fn device_storage(&self, device_id: &str) -> Arc<dyn LocalStorage> {
        Arc::new(ScopedStorage::for_device(self.storage.clone(), device_id))
    }

    pub async fn session(&self, device_id: &str) -> Arc<Mutex<UserSession>> {
        let mut sessions = self.sessions.lock().await;
        if let Some(entry) = sessions.get_mut(device_id) {
            entry.last_seen = Instant::now();
            return entry.session.clone();
        }

        let session = Arc::new(Mutex::new(UserSession::new(
            self.device_storage(device_id),
            self.documents.clone(),
            self.identity.clone(),
            self.otp.clone(),
        )));
        sessions.insert(
            device_id.to_string(),
            SessionEntry {
                session: session.clone(),
                last_seen: Instant::now(),
            },
        );

        // Hold the session while restoring so the device's other requests
        // wait for it instead of seeing an empty session.
        let mut guard = session.clone().lock_owned().await;
        drop(sessions);
        guard.restore().await;

        tracing::debug!("Created session for device {}", device_id);
        session
    }

    /// Drop the device's session once no request uses it and it is signed
    /// out with no OTP outstanding.
    pub async fn release(&self, device_id: &str) {
        let mut sessions = self.sessions.lock().await;
        let Some(entry) = sessions.get(device_id) else {
            return;
        };
        if !entry.is_unused() {
            return;
        }

        let empty = match entry.session.try_lock() {
            Ok(session) => !session.is_authenticated() && session.pending().is_none(),
            Err(_) => false,
        };
        if empty {
            sessions.remove(device_id);
            tracing::debug!("Released session for device {}", device_id);
        }
    }

    /// Drop sessions no request has touched for `max_idle`. Returns how many
    /// were dropped.
    pub async fn prune_idle(&self, max_idle: Duration) -> usize {
        let mut sessions = self.sessions.lock().await;
        let before = sessions.len();
        sessions.retain(|_, entry| !entry.is_unused() || entry.last_seen.elapsed() < max_idle);

        let pruned = before - sessions.len();
        if pruned > 0 {
            tracing::debug!("Pruned {} idle sessions", pruned);
        }
        pruned
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::{IdentityConfig, OtpConfig},
        services::identity::JwtIdentityProvider,
        storage::{memory::MemoryDocumentStore, MemoryStorage},
    };

    struct Harness {
        storage: Arc<MemoryStorage>,
        documents: Arc<MemoryDocumentStore>,
        identity: Arc<JwtIdentityProvider>,
    }

    impl Harness {
        fn new() -> Self {
            Self {
                storage: Arc::new(MemoryStorage::new()),
                documents: Arc::new(MemoryDocumentStore::new()),
                identity: Arc::new(JwtIdentityProvider::new(IdentityConfig {
                    secret: "test-secret".to_string(),
                    token_ttl: Duration::from_secs(3600),
                    issuer: "wirebazaar-test".to_string(),
                })),
            }
        }

        fn session(&self) -> UserSession {
            UserSession::new(
                self.storage.clone(),
                self.documents.clone(),
                self.identity.clone(),
                Arc::new(OtpIssuer::new(OtpConfig::default())),
            )
        }
    }

    #[tokio::test]
    async fn request_otp_validates_contact() {
        let harness = Harness::new();
        let mut session = harness.session();

        assert_eq!(
            session.request_otp("buyer@example.com").await.unwrap(),
            ContactKind::Email
        );
        assert_eq!(
            session.request_otp("9876543210").await.unwrap(),
            ContactKind::Phone
        );
        assert!(matches!(
            session.request_otp("12345").await,
            Err(AppError::InvalidContact)
        ));
    }

    #[tokio::test]
    async fn verify_signs_in_and_persists_profile() {
        let harness = Harness::new();
        let mut session = harness.session();

        session.request_otp("buyer@example.com").await.unwrap();
        let profile = session
            .verify_otp(" buyer@example.com ", "123456")
            .await
            .unwrap();

        assert!(session.is_authenticated());
        assert!(session.pending().is_none());
        assert_eq!(profile.contact, "buyer@example.com");

        let raw = harness
            .storage
            .get_item(USER_STORAGE_KEY)
            .await
            .unwrap()
            .unwrap();
        let stored: UserProfile = serde_json::from_str(&raw).unwrap();
        assert_eq!(stored, profile);

        let doc = harness
            .documents
            .get(collections::USERS, &profile.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(doc.data["contact"], "buyer@example.com");
        assert!(doc.data.contains_key("lastLoginAt"));
        assert!(doc.data.contains_key("createdAt"));
    }

    #[tokio::test]
    async fn verification_succeeds_exactly_once() {
        let harness = Harness::new();
        let mut session = harness.session();

        session.request_otp("9876543210").await.unwrap();
        session.verify_otp("9876543210", "123456").await.unwrap();

        let again = session.verify_otp("9876543210", "123456").await;
        assert!(matches!(again, Err(AppError::NoPendingOtp)));
    }

    #[tokio::test]
    async fn fifth_attempt_fails_with_correct_code() {
        let harness = Harness::new();
        let mut session = harness.session();
        session.request_otp("9876543210").await.unwrap();

        for _ in 0..4 {
            let result = session.verify_otp("9876543210", "654321").await;
            assert!(matches!(result, Err(AppError::InvalidOtp)));
        }

        let result = session.verify_otp("9876543210", "123456").await;
        assert!(matches!(result, Err(AppError::TooManyAttempts)));
        assert!(session.pending().is_none());
        assert!(!session.is_authenticated());
    }

    #[tokio::test]
    async fn backend_failure_keeps_challenge_and_reports_generic_error() {
        let harness = Harness::new();
        let mut session = harness.session();
        session.request_otp("buyer@example.com").await.unwrap();

        harness.documents.set_available(false);
        let result = session.verify_otp("buyer@example.com", "123456").await;
        assert!(matches!(result, Err(AppError::AuthenticationFailed)));
        assert!(session.pending().is_some());
        assert!(!session.is_authenticated());

        harness.documents.set_available(true);
        assert!(session
            .verify_otp("buyer@example.com", "123456")
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn logout_clears_memory_and_storage() {
        let harness = Harness::new();
        let mut session = harness.session();
        session.request_otp("buyer@example.com").await.unwrap();
        session
            .verify_otp("buyer@example.com", "123456")
            .await
            .unwrap();

        session.logout().await.unwrap();

        assert!(!session.is_authenticated());
        assert!(session.user().is_none());
        assert_eq!(harness.storage.get_item(USER_STORAGE_KEY).await.unwrap(), None);
        assert_eq!(
            harness.storage.get_item(IDENTITY_STORAGE_KEY).await.unwrap(),
            None
        );
    }

    #[tokio::test]
    async fn restore_picks_up_persisted_user_and_backend_changes() {
        let harness = Harness::new();
        let mut first = harness.session();
        first.request_otp("buyer@example.com").await.unwrap();
        let profile = first
            .verify_otp("buyer@example.com", "123456")
            .await
            .unwrap();

        harness
            .documents
            .set(
                collections::USERS,
                &profile.id,
                DocumentWrite::new(Map::new())
                    .field("contact", "9876543210")
                    .merge(),
            )
            .await
            .unwrap();

        let mut second = harness.session();
        second.restore().await;
        let restored = second.user().unwrap();
        assert_eq!(restored.id, profile.id);
        assert_eq!(restored.contact, "9876543210");
    }

    #[tokio::test]
    async fn restore_ignores_garbage() {
        let harness = Harness::new();
        harness
            .storage
            .set_item(USER_STORAGE_KEY, "{not json")
            .await
            .unwrap();
        harness
            .storage
            .set_item(IDENTITY_STORAGE_KEY, r#"{"uid":"x","token":"bogus"}"#)
            .await
            .unwrap();

        let mut session = harness.session();
        session.restore().await;
        assert!(!session.is_authenticated());
        assert_eq!(
            harness.storage.get_item(IDENTITY_STORAGE_KEY).await.unwrap(),
            None
        );
    }

    #[tokio::test]
    async fn registry_reuses_sessions_per_device() {
        let harness = Harness::new();
        let registry = registry(&harness);

        let phone = registry.session("phone").await;
        phone.lock().await.request_otp("buyer@example.com").await.unwrap();

        let same = registry.session("phone").await;
        assert!(same.lock().await.pending().is_some());

        let laptop = registry.session("laptop").await;
        assert!(laptop.lock().await.pending().is_none());
    }

    fn registry(harness: &Harness) -> SessionRegistry {
        SessionRegistry::new(
            harness.storage.clone(),
            harness.documents.clone(),
            harness.identity.clone(),
            OtpIssuer::new(OtpConfig::default()),
        )
    }

    #[tokio::test]
    async fn registry_releases_sessions_with_nothing_to_keep() {
        let harness = Harness::new();
        let registry = registry(&harness);

        for n in 0..50 {
            let device = format!("drive-by-{}", n);
            drop(registry.session(&device).await);
            registry.release(&device).await;
        }
        assert_eq!(registry.session_count().await, 0);

        // An outstanding OTP keeps the session
        let phone = registry.session("phone").await;
        phone.lock().await.request_otp("buyer@example.com").await.unwrap();
        drop(phone);
        registry.release("phone").await;
        assert_eq!(registry.session_count().await, 1);

        // Logging out lets it go
        let phone = registry.session("phone").await;
        phone
            .lock()
            .await
            .verify_otp("buyer@example.com", "123456")
            .await
            .unwrap();
        phone.lock().await.logout().await.unwrap();
        drop(phone);
        registry.release("phone").await;
        assert_eq!(registry.session_count().await, 0);
    }

    #[tokio::test]
    async fn registry_keeps_sessions_in_use() {
        let harness = Harness::new();
        let registry = registry(&harness);

        let held = registry.session("tablet").await;
        registry.release("tablet").await;
        assert_eq!(registry.prune_idle(Duration::ZERO).await, 0);
        assert_eq!(registry.session_count().await, 1);

        drop(held);
        assert_eq!(registry.prune_idle(Duration::ZERO).await, 1);
        assert_eq!(registry.session_count().await, 0);
    }

    #[tokio::test]
    async fn pruned_signed_in_session_is_restored() {
        let harness = Harness::new();
        let registry = registry(&harness);

        let phone = registry.session("phone").await;
        let user = {
            let mut session = phone.lock().await;
            session.request_otp("9876543210").await.unwrap();
            session.verify_otp("9876543210", "123456").await.unwrap()
        };
        drop(phone);

        registry.release("phone").await;
        assert_eq!(registry.session_count().await, 1);
        registry.prune_idle(Duration::ZERO).await;
        assert_eq!(registry.session_count().await, 0);

        let phone = registry.session("phone").await;
        let restored = phone.lock().await.user().cloned().unwrap();
        assert_eq!(restored.id, user.id);
    }

    struct RecordingIdentity {
        inner: JwtIdentityProvider,
        signed_out: std::sync::Mutex<Vec<String>>,
    }

    #[async_trait::async_trait]
    impl IdentityProvider for RecordingIdentity {
        async fn sign_in_anonymously(&self) -> AppResult<AnonymousIdentity> {
            self.inner.sign_in_anonymously().await
        }

        async fn sign_out(&self, identity: &AnonymousIdentity) -> AppResult<()> {
            self.signed_out.lock().unwrap().push(identity.uid.clone());
            self.inner.sign_out(identity).await
        }

        async fn validate(&self, token: &str) -> AppResult<crate::services::identity::Claims> {
            self.inner.validate(token).await
        }
    }

    #[tokio::test]
    async fn failed_login_record_signs_the_identity_out() {
        let harness = Harness::new();
        let identity = Arc::new(RecordingIdentity {
            inner: JwtIdentityProvider::new(IdentityConfig {
                secret: "test-secret".to_string(),
                token_ttl: Duration::from_secs(3600),
                issuer: "wirebazaar-test".to_string(),
            }),
            signed_out: std::sync::Mutex::new(Vec::new()),
        });
        let mut session = UserSession::new(
            harness.storage.clone(),
            harness.documents.clone(),
            identity.clone(),
            Arc::new(OtpIssuer::new(OtpConfig::default())),
        );

        session.request_otp("buyer@example.com").await.unwrap();
        harness.documents.set_available(false);
        let result = session.verify_otp("buyer@example.com", "123456").await;

        assert!(matches!(result, Err(AppError::AuthenticationFailed)));
        assert_eq!(identity.signed_out.lock().unwrap().len(), 1);
    }
}
