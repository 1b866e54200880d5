use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::{
    config::IdentityConfig,
    error::{AppError, AppResult},
    models::AnonymousIdentity,
};

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    pub sub: String, // anonymous uid
    pub jti: String, // token id, used for revocation
    pub iss: String, // issuer
    pub exp: i64,    // expiry
    pub iat: i64,    // issued at
}

/// Issues identities that are not tied to a password credential.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn sign_in_anonymously(&self) -> AppResult<AnonymousIdentity>;
    async fn sign_out(&self, identity: &AnonymousIdentity) -> AppResult<()>;
    async fn validate(&self, token: &str) -> AppResult<Claims>;
}

/// Clock skew tolerated when checking `exp`.
const LEEWAY_SECS: u64 = 60;

pub struct JwtIdentityProvider {
    config: IdentityConfig,
    /// Revoked token ids and their expiry.
    revoked: RwLock<HashMap<String, i64>>,
}

impl JwtIdentityProvider {
    pub fn new(config: IdentityConfig) -> Self {
        Self {
            config,
            revoked: RwLock::new(HashMap::new()),
        }
    }

    fn issue_token(&self, uid: &str) -> AppResult<String> {
        let now = Utc::now();
        let exp = now + Duration::seconds(self.config.token_ttl.as_secs() as i64);

        let claims = Claims {
            sub: uid.to_string(),
            jti: Uuid::new_v4().to_string(),
            iss: self.config.issuer.clone(),
            exp: exp.timestamp(),
            iat: now.timestamp(),
        };

        let key = EncodingKey::from_secret(self.config.secret.as_bytes());
        Ok(encode(&Header::default(), &claims, &key)?)
    }

    fn decode_claims(&self, token: &str) -> AppResult<Claims> {
        let key = DecodingKey::from_secret(self.config.secret.as_bytes());
        let mut validation = Validation::default();
        validation.leeway = LEEWAY_SECS;
        validation.set_issuer(&[self.config.issuer.as_str()]);

        let token_data = decode::<Claims>(token, &key, &validation)?;
        Ok(token_data.claims)
    }
}

#[async_trait]
impl IdentityProvider for JwtIdentityProvider {
    async fn sign_in_anonymously(&self) -> AppResult<AnonymousIdentity> {
        let uid = Uuid::new_v4().to_string();
        let token = self.issue_token(&uid)?;
        tracing::debug!("Issued anonymous identity {}", uid);
        Ok(AnonymousIdentity { uid, token })
    }

    async fn sign_out(&self, identity: &AnonymousIdentity) -> AppResult<()> {
        let claims = self.decode_claims(&identity.token)?;
        let now = Utc::now().timestamp();

        let mut revoked = self.revoked.write().await;
        // Expired tokens fail validation on their own
        revoked.retain(|_, exp| *exp + LEEWAY_SECS as i64 >= now);
        revoked.insert(claims.jti, claims.exp);
        drop(revoked);

        tracing::debug!("Signed out anonymous identity {}", identity.uid);
        Ok(())
    }

    async fn validate(&self, token: &str) -> AppResult<Claims> {
        let claims = self.decode_claims(token)?;
        if self.revoked.read().await.contains_key(&claims.jti) {
            return Err(AppError::InvalidToken);
        }
        Ok(claims)
    }
}
