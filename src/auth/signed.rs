//! Stateless HS256 tokens.
//!
//! A token carries the username and expiry and is sealed with the secret
//! from the [`KeyRetriever`]. The only server-side state is the revocation
//! set, which is a `DashSet` because request tasks and the cleanup task
//! both touch it.

use std::sync::Arc;

use chrono::{Duration, Utc};
use dashmap::DashSet;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use super::keys::KeyRetriever;
use super::{AuthError, IssuedToken, Principal};

pub const DEFAULT_LIFETIME_SECS: i64 = 5 * 60;

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub username: String,
    /// Expiry, Unix seconds.
    pub exp: i64,
}

pub struct SignedTokenAuthorizer {
    keys: Arc<dyn KeyRetriever>,
    revoked: DashSet<String>,
    lifetime: Duration,
}

impl SignedTokenAuthorizer {
    pub fn new(keys: Arc<dyn KeyRetriever>) -> Self {
        Self {
            keys,
            revoked: DashSet::new(),
            lifetime: Duration::seconds(DEFAULT_LIFETIME_SECS),
        }
    }

    pub fn with_lifetime(mut self, lifetime: Duration) -> Self {
        self.lifetime = lifetime;
        self
    }

    pub fn generate(&self, principal: &str) -> Result<IssuedToken, AuthError> {
        let expires_at = Utc::now() + self.lifetime;
        let claims = Claims {
            username: principal.to_string(),
            exp: expires_at.timestamp(),
        };
        let key = self.keys.get_one().map_err(AuthError::Key)?;
        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(&key),
        )?;
        Ok(IssuedToken { token, expires_at })
    }

    pub fn validate(&self, token: &str) -> Result<Option<Principal>, AuthError> {
        if self.revoked.contains(token) {
            return Ok(None);
        }
        let key = self.keys.get_one().map_err(AuthError::Key)?;
        verify(&key, token)
    }

    /// Only tokens that would still validate are recorded; expired and
    /// foreign ones are already dead.
    pub fn invalidate(&self, token: &str) -> Result<(), AuthError> {
        let key = self.keys.get_one().map_err(AuthError::Key)?;
        if verify(&key, token)?.is_some() {
            self.revoked.insert(token.to_string());
        }
        Ok(())
    }

    pub fn revoked_len(&self) -> usize {
        self.revoked.len()
    }

    /// Drop revoked tokens that could no longer validate anyway.
    pub fn purge_revoked(&self) -> Result<usize, AuthError> {
        let key = self.keys.get_one().map_err(AuthError::Key)?;
        let before = self.revoked.len();
        self.revoked
            .retain(|token| matches!(verify(&key, token), Ok(Some(_))));
        Ok(before.saturating_sub(self.revoked.len()))
    }
}

fn verify(key: &[u8], token: &str) -> Result<Option<Principal>, AuthError> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.leeway = 0;

    match decode::<Claims>(token, &DecodingKey::from_secret(key), &validation) {
        Ok(data) => Ok(Some(Principal::new(data.claims.username))),
        Err(e) => match e.kind() {
            ErrorKind::ExpiredSignature
            | ErrorKind::ImmatureSignature
            | ErrorKind::InvalidSignature
            | ErrorKind::InvalidAlgorithm => Ok(None),
            _ => Err(AuthError::Malformed(e.to_string())),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::keys::StaticKey;

    const KEY: &[u8] = b"unit-test-signing-key";

    fn authorizer() -> SignedTokenAuthorizer {
        SignedTokenAuthorizer::new(Arc::new(StaticKey::new(KEY.to_vec())))
    }

    fn token_expiring_at(exp: i64) -> String {
        let claims = Claims { username: "alice".into(), exp };
        encode(&Header::new(Algorithm::HS256), &claims, &EncodingKey::from_secret(KEY)).unwrap()
    }

    struct BrokenKeys;

    impl KeyRetriever for BrokenKeys {
        fn get_one(&self) -> anyhow::Result<Vec<u8>> {
            anyhow::bail!("key store offline")
        }
    }

    #[test]
    fn test_default_lifetime_is_five_minutes() {
        let issued = authorizer().generate("alice").unwrap();
        let remaining = issued.expires_at - Utc::now();
        assert!(remaining <= Duration::minutes(5));
        assert!(remaining > Duration::minutes(4));
    }

    #[test]
    fn test_expired_token_is_invalid_not_error() {
        let token = token_expiring_at(Utc::now().timestamp() - 30);
        assert_eq!(authorizer().validate(&token).unwrap(), None);
    }

    #[test]
    fn test_foreign_signature_is_invalid_not_error() {
        let other = SignedTokenAuthorizer::new(Arc::new(StaticKey::new(b"other".to_vec())));
        let issued = other.generate("mallory").unwrap();
        assert_eq!(authorizer().validate(&issued.token).unwrap(), None);
    }

    #[test]
    fn test_garbage_token_is_malformed() {
        let err = authorizer().validate("definitely-not-a-jwt").unwrap_err();
        assert!(matches!(err, AuthError::Malformed(_)));
    }

    #[test]
    fn test_key_failure_surfaces_as_error() {
        let broken = SignedTokenAuthorizer::new(Arc::new(BrokenKeys));
        assert!(matches!(broken.generate("alice"), Err(AuthError::Key(_))));
        assert!(matches!(broken.validate("a.b.c"), Err(AuthError::Key(_))));
    }

    /// Secret that can be swapped mid-test.
    struct RotatingKey(std::sync::Mutex<Vec<u8>>);

    impl KeyRetriever for RotatingKey {
        fn get_one(&self) -> anyhow::Result<Vec<u8>> {
            Ok(self.0.lock().unwrap().clone())
        }
    }

    #[test]
    fn test_revocation_is_checked_before_signature() {
        let a = authorizer();
        let issued = a.generate("alice").unwrap();
        a.invalidate(&issued.token).unwrap();
        a.invalidate(&issued.token).unwrap();
        assert_eq!(a.revoked_len(), 1);
        assert_eq!(a.validate(&issued.token).unwrap(), None);
    }

    #[test]
    fn test_dead_tokens_are_not_recorded() {
        let a = authorizer();
        let expired = token_expiring_at(Utc::now().timestamp() - 5);
        let foreign = SignedTokenAuthorizer::new(Arc::new(StaticKey::new(b"other".to_vec())))
            .generate("mallory")
            .unwrap();

        a.invalidate(&expired).unwrap();
        a.invalidate(&foreign.token).unwrap();
        assert_eq!(a.revoked_len(), 0);
    }

    #[test]
    fn test_garbage_invalidation_is_malformed_and_not_recorded() {
        let a = authorizer();
        for i in 0..100 {
            let err = a.invalidate(&format!("junk{}", i)).unwrap_err();
            assert!(matches!(err, AuthError::Malformed(_)));
        }
        assert_eq!(a.revoked_len(), 0);
    }

    #[test]
    fn test_purge_drops_only_tokens_that_can_no_longer_validate() {
        let keys = Arc::new(RotatingKey(std::sync::Mutex::new(b"first".to_vec())));
        let a = SignedTokenAuthorizer::new(keys.clone());
        let old = a.generate("alice").unwrap();
        a.invalidate(&old.token).unwrap();

        *keys.0.lock().unwrap() = b"second".to_vec();
        let live = a.generate("bob").unwrap();
        a.invalidate(&live.token).unwrap();
        assert_eq!(a.revoked_len(), 2);

        let dropped = a.purge_revoked().unwrap();
        assert_eq!(dropped, 1);
        assert_eq!(a.revoked_len(), 1);
        // still revoked after the purge
        assert_eq!(a.validate(&live.token).unwrap(), None);
    }

    #[test]
    fn test_concurrent_invalidation_and_purge() {
        let a = Arc::new(authorizer());
        let handles: Vec<_> = (0..4)
            .map(|i| {
                let a = a.clone();
                std::thread::spawn(move || {
                    for n in 0..50 {
                        let issued = a.generate(&format!("user-{}-{}", i, n)).unwrap();
                        a.invalidate(&issued.token).unwrap();
                        if n % 10 == 0 {
                            a.purge_revoked().unwrap();
                        }
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        // every revoked token is still live, so none were purged
        assert_eq!(a.revoked_len(), 200);
    }
}
