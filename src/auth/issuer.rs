//! Access-token issuance and verification.
//!
//! Access tokens are compact HS256 JWTs carrying `sub`, `roles`, `iat` and
//! `exp` (seconds since the epoch). Verification checks the signature first
//! and only then compares `exp` against the injected clock, so a forged token
//! is reported as a signature failure even when it is also stale.
//!
//! # Example
//!
//! ```rust,ignore
//! let issuer = TokenIssuer::new(secret.as_bytes(), Duration::from_secs(900), clock);
//! let token = issuer.issue("alice", &["ROLE_USER".to_string()])?;
//! let claims = issuer.verify(&token)?;
//! assert_eq!(claims.sub, "alice");
//! ```

use crate::clock::SharedClock;
use crate::error::{AuthError, Result};
use chrono::{DateTime, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::time::Duration;

/// Claims carried by an access token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessClaims {
    /// Username
    pub sub: String,
    /// Role set, serialized as a JSON array
    pub roles: BTreeSet<String>,
    /// Issued at (unix timestamp)
    pub iat: u64,
    /// Expiration time (unix timestamp)
    pub exp: u64,
}

impl AccessClaims {
    pub fn expires_at(&self) -> DateTime<Utc> {
        timestamp_to_datetime(self.exp)
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.roles.contains(role)
    }
}

/// Signs and verifies access tokens with a symmetric key.
#[derive(Clone)]
pub struct TokenIssuer {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    access_ttl: Duration,
    clock: SharedClock,
}

impl TokenIssuer {
    pub fn new(secret: &[u8], access_ttl: Duration, clock: SharedClock) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        // Expiry is checked against our own clock after the signature passes.
        validation.validate_exp = false;
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "sub"]);

        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            validation,
            access_ttl,
            clock,
        }
    }

    pub fn access_ttl(&self) -> Duration {
        self.access_ttl
    }

    /// Issue a signed access token for `username` with the given roles.
    pub fn issue(&self, username: &str, roles: &[String]) -> Result<String> {
        let iat = self.clock.now().timestamp().max(0) as u64;
        let claims = AccessClaims {
            sub: username.to_string(),
            roles: roles.iter().cloned().collect(),
            iat,
            exp: iat.saturating_add(self.access_ttl.as_secs()),
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| AuthError::Internal(format!("failed to sign access token: {}", e)))
    }

    /// Verify a token's signature and expiry, returning its claims.
    pub fn verify(&self, token: &str) -> Result<AccessClaims> {
        let claims = self.decode_signed(token)?;
        // An `exp` beyond i64 is far in the future, not in the past.
        match i64::try_from(claims.exp) {
            Ok(exp) if exp <= self.clock.now().timestamp() => Err(AuthError::TokenExpired),
            _ => Ok(claims),
        }
    }

    /// Read the expiry of a correctly signed token, whether or not it has
    /// already passed.
    pub fn expiry_of(&self, token: &str) -> Result<DateTime<Utc>> {
        self.decode_signed(token).map(|claims| claims.expires_at())
    }

    fn decode_signed(&self, token: &str) -> Result<AccessClaims> {
        decode::<AccessClaims>(token, &self.decoding_key, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                ErrorKind::InvalidSignature | ErrorKind::InvalidAlgorithm => {
                    AuthError::TokenSignatureInvalid
                }
                _ => AuthError::TokenMalformed,
            })
    }
}

fn timestamp_to_datetime(secs: u64) -> DateTime<Utc> {
    DateTime::from_timestamp(secs.min(i64::MAX as u64) as i64, 0).unwrap_or(DateTime::<Utc>::MAX_UTC)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{Clock, ManualClock};
    use std::sync::Arc;

    const SECRET: &[u8] = b"test-secret-key-32-bytes-long!!!";

    fn issuer_with_clock() -> (TokenIssuer, ManualClock) {
        let clock = ManualClock::starting_now();
        let issuer = TokenIssuer::new(SECRET, Duration::from_secs(15 * 60), Arc::new(clock.clone()));
        (issuer, clock)
    }

    fn roles(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_issue_then_verify_round_trips_claims() {
        let (issuer, clock) = issuer_with_clock();
        let token = issuer.issue("alice", &roles(&["ROLE_USER", "ROLE_ADMIN"])).unwrap();

        assert_eq!(token.split('.').count(), 3);
        let claims = issuer.verify(&token).unwrap();
        assert_eq!(claims.sub, "alice");
        assert!(claims.has_role("ROLE_USER"));
        assert!(claims.has_role("ROLE_ADMIN"));
        assert_eq!(claims.roles.len(), 2);
        assert_eq!(claims.iat as i64, clock.now().timestamp());
        assert_eq!(claims.exp, claims.iat + 15 * 60);
    }

    #[test]
    fn test_duplicate_roles_collapse_to_a_set() {
        let (issuer, _clock) = issuer_with_clock();
        let token = issuer.issue("bob", &roles(&["ROLE_USER", "ROLE_USER"])).unwrap();
        let claims = issuer.verify(&token).unwrap();
        assert_eq!(claims.roles.len(), 1);
    }

    #[test]
    fn test_expired_token_is_rejected() {
        let (issuer, clock) = issuer_with_clock();
        let token = issuer.issue("alice", &roles(&["ROLE_USER"])).unwrap();

        clock.advance(chrono::Duration::minutes(15) + chrono::Duration::seconds(1));
        assert_eq!(issuer.verify(&token), Err(AuthError::TokenExpired));
    }

    #[test]
    fn test_token_valid_until_just_before_expiry() {
        let (issuer, clock) = issuer_with_clock();
        let token = issuer.issue("alice", &[]).unwrap();

        clock.advance(chrono::Duration::minutes(15) - chrono::Duration::seconds(1));
        assert!(issuer.verify(&token).is_ok());
        clock.advance(chrono::Duration::seconds(1));
        assert_eq!(issuer.verify(&token), Err(AuthError::TokenExpired));
    }

    #[test]
    fn test_huge_ttl_does_not_wrap_into_the_past() {
        let clock = ManualClock::starting_now();
        let issuer = TokenIssuer::new(SECRET, Duration::from_secs(u64::MAX), Arc::new(clock));
        let token = issuer.issue("alice", &[]).unwrap();

        let claims = issuer.verify(&token).unwrap();
        assert_eq!(claims.exp, u64::MAX);
        assert_eq!(claims.expires_at(), DateTime::<Utc>::MAX_UTC);
    }

    #[test]
    fn test_wrong_secret_is_signature_invalid() {
        let (issuer, clock) = issuer_with_clock();
        let other = TokenIssuer::new(
            b"another-secret-key-32-bytes-long",
            Duration::from_secs(900),
            Arc::new(clock.clone()),
        );
        let token = other.issue("mallory", &roles(&["ROLE_ADMIN"])).unwrap();
        assert_eq!(issuer.verify(&token), Err(AuthError::TokenSignatureInvalid));
    }

    #[test]
    fn test_tampered_payload_is_signature_invalid() {
        let (issuer, _clock) = issuer_with_clock();
        let token = issuer.issue("alice", &roles(&["ROLE_USER"])).unwrap();
        let other = issuer.issue("bob", &roles(&["ROLE_ADMIN"])).unwrap();

        // Splice bob's payload onto alice's signature.
        let parts: Vec<&str> = token.split('.').collect();
        let other_parts: Vec<&str> = other.split('.').collect();
        let forged = format!("{}.{}.{}", parts[0], other_parts[1], parts[2]);
        assert_eq!(issuer.verify(&forged), Err(AuthError::TokenSignatureInvalid));
    }

    #[test]
    fn test_bad_signature_wins_over_expiry() {
        let (issuer, clock) = issuer_with_clock();
        let other = TokenIssuer::new(
            b"another-secret-key-32-bytes-long",
            Duration::from_secs(900),
            Arc::new(clock.clone()),
        );
        let token = other.issue("mallory", &[]).unwrap();
        clock.advance(chrono::Duration::days(1));
        assert_eq!(issuer.verify(&token), Err(AuthError::TokenSignatureInvalid));
    }

    #[test]
    fn test_garbage_is_malformed() {
        let (issuer, _clock) = issuer_with_clock();
        assert_eq!(issuer.verify("invalidtoken"), Err(AuthError::TokenMalformed));
        assert_eq!(issuer.verify(""), Err(AuthError::TokenMalformed));
        assert_eq!(issuer.verify("a.b.c"), Err(AuthError::TokenMalformed));
    }

    #[test]
    fn test_expiry_of_reads_expired_tokens() {
        let (issuer, clock) = issuer_with_clock();
        let token = issuer.issue("alice", &[]).unwrap();
        let expected = clock.now() + chrono::Duration::minutes(15);

        clock.advance(chrono::Duration::hours(1));
        assert_eq!(issuer.expiry_of(&token).unwrap(), expected);
        assert!(issuer.expiry_of("nope").is_err());
    }
}
