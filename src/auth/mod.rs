//! Token-based access control.
//!
//! Two schemes share one contract:
//! - [`signed::SignedTokenAuthorizer`]: stateless HS256 tokens plus an
//!   in-memory revocation set
//! - [`session::SessionAuthorizer`]: random handles resolved through a
//!   session table
//!
//! The scheme is picked once at startup; everything else talks to
//! [`Authorizer`].

pub mod keys;
pub mod password;
pub mod session;
pub mod signed;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::jobs::cleanup::{self, CleanupHandle};

pub use session::SessionAuthorizer;
pub use signed::SignedTokenAuthorizer;

/// Authenticated username attached to a request.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Principal(String);

impl Principal {
    pub fn new(username: impl Into<String>) -> Self {
        Self(username.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A freshly minted token and the moment it stops validating.
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("malformed token: {0}")]
    Malformed(String),

    #[error("signing key unavailable: {0}")]
    Key(#[source] anyhow::Error),

    #[error("token signing failed: {0}")]
    Signing(#[from] jsonwebtoken::errors::Error),

    #[error("session store error: {0}")]
    Store(#[source] anyhow::Error),

    #[error("session store timed out")]
    Timeout,
}

/// Configured token scheme.
pub enum Authorizer {
    Signed(SignedTokenAuthorizer),
    Session(SessionAuthorizer),
}

impl Authorizer {
    pub fn scheme(&self) -> &'static str {
        match self {
            Authorizer::Signed(_) => "jwt",
            Authorizer::Session(_) => "session",
        }
    }

    pub async fn generate(&self, principal: &str) -> Result<IssuedToken, AuthError> {
        match self {
            Authorizer::Signed(a) => a.generate(principal),
            Authorizer::Session(a) => a.generate(principal).await,
        }
    }

    /// `Ok(None)` for expired, revoked or unknown tokens. Errors are kept
    /// for malformed input and infrastructure failures.
    pub async fn validate(&self, token: &str) -> Result<Option<Principal>, AuthError> {
        match self {
            Authorizer::Signed(a) => a.validate(token),
            Authorizer::Session(a) => a.validate(token).await,
        }
    }

    /// Idempotent. A structurally malformed token is `Err(Malformed)` and
    /// leaves no state behind.
    pub async fn invalidate(&self, token: &str) -> Result<(), AuthError> {
        match self {
            Authorizer::Signed(a) => a.invalidate(token),
            Authorizer::Session(a) => a.invalidate(token).await,
        }
    }

    /// One cleanup pass. Returns the number of entries dropped.
    pub async fn purge_expired(&self) -> Result<usize, AuthError> {
        match self {
            Authorizer::Signed(a) => a.purge_revoked(),
            Authorizer::Session(a) => a.purge_expired().await,
        }
    }

    /// Spawn the background purge. Does not block; keep the handle to stop
    /// it on shutdown.
    pub fn start_periodic_cleanup(self: &Arc<Self>, every: Duration) -> CleanupHandle {
        cleanup::spawn(self.clone(), every)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::keys::StaticKey;
    use crate::store::memory::MemorySessionStore;

    fn both() -> Vec<Authorizer> {
        vec![
            Authorizer::Signed(SignedTokenAuthorizer::new(Arc::new(StaticKey::new(
                b"contract-test-key".to_vec(),
            )))),
            Authorizer::Session(SessionAuthorizer::new(Arc::new(MemorySessionStore::new()))),
        ]
    }

    #[tokio::test]
    async fn test_round_trip_for_both_schemes() {
        for authorizer in both() {
            let issued = authorizer.generate("alice").await.unwrap();
            assert!(!issued.token.is_empty(), "{}: empty token", authorizer.scheme());
            assert!(issued.expires_at > Utc::now());

            let principal = authorizer.validate(&issued.token).await.unwrap();
            assert_eq!(principal, Some(Principal::new("alice")), "{}", authorizer.scheme());
        }
    }

    #[tokio::test]
    async fn test_invalidation_for_both_schemes() {
        for authorizer in both() {
            let issued = authorizer.generate("bob").await.unwrap();
            authorizer.invalidate(&issued.token).await.unwrap();
            assert_eq!(authorizer.validate(&issued.token).await.unwrap(), None);

            // second invalidation is not an error
            authorizer.invalidate(&issued.token).await.unwrap();
            assert_eq!(authorizer.validate(&issued.token).await.unwrap(), None);
        }
    }

    #[tokio::test]
    async fn test_tokens_are_not_shared_between_principals() {
        for authorizer in both() {
            let a = authorizer.generate("alice").await.unwrap();
            let b = authorizer.generate("bob").await.unwrap();
            assert_ne!(a.token, b.token);

            authorizer.invalidate(&a.token).await.unwrap();
            assert_eq!(
                authorizer.validate(&b.token).await.unwrap(),
                Some(Principal::new("bob"))
            );
        }
    }

    #[test]
    fn test_principal_serializes_as_plain_string() {
        let json = serde_json::to_string(&Principal::new("carol")).unwrap();
        assert_eq!(json, "\"carol\"");
    }
}
