//! One-time code challenges for phone and email sign-in.

use std::sync::LazyLock;

use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use regex::Regex;
use sha2::{Digest, Sha256};

use crate::{
    config::OtpConfig,
    error::{AppError, AppResult},
    models::{ContactKind, PendingVerification},
};

static EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:[a-zA-Z0-9_!#$%&'*+/=?`{|}~^.-]+)@(?:[a-zA-Z0-9-]+\.)+[a-zA-Z]{2,}$")
        .expect("Invalid email regex")
});

/// Indian mobile numbers: ten digits, leading 6-9.
static PHONE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[6-9][0-9]{9}$").expect("Invalid phone regex"));

pub fn classify_contact(contact: &str) -> Option<ContactKind> {
    let trimmed = contact.trim();
    if EMAIL_RE.is_match(trimmed) {
        return Some(ContactKind::Email);
    }

    let digits: String = trimmed
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '-')
        .collect();
    if PHONE_RE.is_match(&digits) {
        return Some(ContactKind::Phone);
    }

    None
}

/// SHA-256 over the normalized contact and the code, hex encoded. The
/// contact acts as the salt so equal codes for different contacts differ.
pub fn hash_otp(code: &str, contact: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(contact.trim().to_lowercase().as_bytes());
    hasher.update(b"::");
    hasher.update(code.as_bytes());
    hex::encode(hasher.finalize())
}

pub struct OtpIssuer {
    config: OtpConfig,
}

impl OtpIssuer {
    pub fn new(config: OtpConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &OtpConfig {
        &self.config
    }

    /// Start a challenge for `contact`. Returns the challenge and the
    /// plaintext code for delivery.
    pub fn issue(
        &self,
        contact: &str,
        now: DateTime<Utc>,
    ) -> AppResult<(PendingVerification, String)> {
        let trimmed = contact.trim();
        if classify_contact(trimmed).is_none() {
            return Err(AppError::InvalidContact);
        }

        let code = self.generate_code();
        let ttl = Duration::from_std(self.config.ttl)
            .map_err(|e| anyhow::anyhow!("Invalid OTP ttl: {}", e))?;

        let pending = PendingVerification {
            contact: trimmed.to_string(),
            otp_hash: hash_otp(&code, trimmed),
            expires_at: now + ttl,
            attempts: 0,
        };

        Ok((pending, code))
    }

    /// Check `code` against the pending challenge and advance its state.
    ///
    /// Expired and exhausted challenges are cleared. A wrong code counts as
    /// an attempt; a badly shaped code does not. A matching code leaves the
    /// challenge in place until the caller has finished signing the user in.
    pub fn verify(
        &self,
        pending: &mut Option<PendingVerification>,
        contact: &str,
        code: &str,
        now: DateTime<Utc>,
    ) -> AppResult<()> {
        let trimmed = contact.trim();
        let challenge = match pending.as_mut() {
            Some(challenge) if challenge.contact == trimmed => challenge,
            _ => return Err(AppError::NoPendingOtp),
        };

        if now > challenge.expires_at {
            *pending = None;
            return Err(AppError::OtpExpired);
        }

        if challenge.attempts >= self.config.max_attempts {
            *pending = None;
            return Err(AppError::TooManyAttempts);
        }

        let code = code.trim();
        if !self.is_well_formed(code) {
            return Err(AppError::MalformedOtp(self.config.length));
        }

        if hash_otp(code, trimmed) != challenge.otp_hash {
            challenge.attempts += 1;
            return Err(AppError::InvalidOtp);
        }

        Ok(())
    }

    fn is_well_formed(&self, code: &str) -> bool {
        code.len() == self.config.length && code.chars().all(|c| c.is_ascii_digit())
    }

    fn generate_code(&self) -> String {
        if let Some(code) = &self.config.fixed_code {
            return code.clone();
        }

        let mut rng = rand::thread_rng();
        (0..self.config.length)
            .map(|_| char::from(b'0' + rng.gen_range(0..10u8)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn issuer() -> OtpIssuer {
        OtpIssuer::new(OtpConfig::default())
    }

    #[test]
    fn accepts_emails_and_indian_mobiles() {
        assert_eq!(classify_contact("buyer@example.com"), Some(ContactKind::Email));
        assert_eq!(classify_contact("  a.b+c@mail.co.in "), Some(ContactKind::Email));
        assert_eq!(classify_contact("9876543210"), Some(ContactKind::Phone));
        assert_eq!(classify_contact("98765 43210"), Some(ContactKind::Phone));
        assert_eq!(classify_contact("987-654-3210"), Some(ContactKind::Phone));
    }

    #[test]
    fn rejects_everything_else() {
        for contact in [
            "",
            "hello",
            "buyer@example",
            "buyer@example.c",
            "@example.com",
            "5876543210",
            "987654321",
            "98765432101",
            "+919876543210",
            "9४४४४४४४४४",
        ] {
            assert_eq!(classify_contact(contact), None, "{contact:?}");
        }
    }

    #[test]
    fn hash_normalizes_contact() {
        let a = hash_otp("123456", " Buyer@Example.com ");
        let b = hash_otp("123456", "buyer@example.com");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert_ne!(a, hash_otp("123457", "buyer@example.com"));
        assert_ne!(a, hash_otp("123456", "other@example.com"));
    }

    #[test]
    fn issue_rejects_invalid_contact() {
        let result = issuer().issue("not a contact", Utc::now());
        assert!(matches!(result, Err(AppError::InvalidContact)));
    }

    #[test]
    fn issue_stores_hash_not_code() {
        let now = Utc::now();
        let (pending, code) = issuer().issue(" 9876543210 ", now).unwrap();
        assert_eq!(code, "123456");
        assert_eq!(pending.contact, "9876543210");
        assert_eq!(pending.attempts, 0);
        assert_eq!(pending.expires_at, now + Duration::minutes(5));
        assert_ne!(pending.otp_hash, code);
        assert_eq!(pending.otp_hash, hash_otp(&code, "9876543210"));
    }

    #[test]
    fn random_codes_have_configured_length() {
        let issuer = OtpIssuer::new(OtpConfig {
            fixed_code: None,
            ..OtpConfig::default()
        });
        let (_, code) = issuer.issue("buyer@example.com", Utc::now()).unwrap();
        assert_eq!(code.len(), 6);
        assert!(code.chars().all(|c| c.is_ascii_digit()));
    }

    #[test]
    fn correct_code_is_accepted() {
        let issuer = issuer();
        let now = Utc::now();
        let (pending, code) = issuer.issue("buyer@example.com", now).unwrap();
        let mut pending = Some(pending);

        assert!(issuer
            .verify(&mut pending, "buyer@example.com", &code, now)
            .is_ok());
        assert!(pending.is_some());
    }

    #[test]
    fn unknown_contact_leaves_challenge_alone() {
        let issuer = issuer();
        let now = Utc::now();
        let (pending, code) = issuer.issue("buyer@example.com", now).unwrap();
        let mut pending = Some(pending);

        let result = issuer.verify(&mut pending, "other@example.com", &code, now);
        assert!(matches!(result, Err(AppError::NoPendingOtp)));
        assert_eq!(pending.as_ref().map(|p| p.attempts), Some(0));

        let mut none = None;
        let result = issuer.verify(&mut none, "buyer@example.com", &code, now);
        assert!(matches!(result, Err(AppError::NoPendingOtp)));
    }

    #[test]
    fn malformed_code_does_not_count_as_attempt() {
        let issuer = issuer();
        let now = Utc::now();
        let (pending, _) = issuer.issue("buyer@example.com", now).unwrap();
        let mut pending = Some(pending);

        for bad in ["12345", "1234567", "12a456", ""] {
            let result = issuer.verify(&mut pending, "buyer@example.com", bad, now);
            assert!(matches!(result, Err(AppError::MalformedOtp(6))));
        }
        assert_eq!(pending.as_ref().map(|p| p.attempts), Some(0));
    }

    #[test]
    fn expired_challenge_fails_even_with_correct_code() {
        let issuer = issuer();
        let now = Utc::now();
        let (pending, code) = issuer.issue("buyer@example.com", now).unwrap();
        let mut pending = Some(pending);

        let later = now + Duration::minutes(5) + Duration::seconds(1);
        let result = issuer.verify(&mut pending, "buyer@example.com", &code, later);
        assert!(matches!(result, Err(AppError::OtpExpired)));
        assert!(pending.is_none());
    }

    #[test]
    fn challenge_is_valid_up_to_expiry() {
        let issuer = issuer();
        let now = Utc::now();
        let (pending, code) = issuer.issue("buyer@example.com", now).unwrap();
        let mut pending = Some(pending);

        let at_expiry = now + Duration::minutes(5);
        assert!(issuer
            .verify(&mut pending, "buyer@example.com", &code, at_expiry)
            .is_ok());
    }

    #[test]
    fn fifth_attempt_fails_after_four_wrong_codes() {
        let issuer = issuer();
        let now = Utc::now();
        let (pending, code) = issuer.issue("9876543210", now).unwrap();
        let mut pending = Some(pending);

        for attempt in 1..=4 {
            let result = issuer.verify(&mut pending, "9876543210", "000000", now);
            assert!(matches!(result, Err(AppError::InvalidOtp)));
            assert_eq!(pending.as_ref().map(|p| p.attempts), Some(attempt));
        }

        let result = issuer.verify(&mut pending, "9876543210", &code, now);
        assert!(matches!(result, Err(AppError::TooManyAttempts)));
        assert!(pending.is_none());
    }

    #[test]
    fn correct_code_after_three_misses_still_works() {
        let issuer = issuer();
        let now = Utc::now();
        let (pending, code) = issuer.issue("9876543210", now).unwrap();
        let mut pending = Some(pending);

        for _ in 0..3 {
            assert!(matches!(
                issuer.verify(&mut pending, "9876543210", "000000", now),
                Err(AppError::InvalidOtp)
            ));
        }
        assert!(issuer.verify(&mut pending, "9876543210", &code, now).is_ok());
    }
}
