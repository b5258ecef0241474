//! Auth Resolver — validates the bearer token query parameter at connect and
//! resolves it to `(user_id, username)`. Failure of any kind (missing token,
//! bad signature, expired, malformed claims) degrades silently to an
//! anonymous identity; it is never a hard connect failure (§6).

use base64::engine::general_purpose::URL_SAFE_NO_PAD as BASE64;
use base64::Engine;
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use subtle::ConstantTimeEq;
use thiserror::Error;

use crate::protocol::UserId;

pub const ANONYMOUS_USERNAME: &str = "Anonymous";

/// Resolved connection identity. Anonymous connections carry `user_id: None`
/// and may observe but not take any action that requires authenticated
/// identity (join a game, take a Gobang seat, become the drawer, ...).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub username: String,
    pub user_id: Option<UserId>,
}

impl Identity {
    pub fn anonymous() -> Self {
        Self {
            username: ANONYMOUS_USERNAME.to_string(),
            user_id: None,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.user_id.is_some()
    }
}

/// Looks up a display name for a resolved user id. The lookup itself (a
/// persistent user database) is out of scope for this crate (§1); only the
/// interface is specified here. The default implementation always misses,
/// which degrades every token to an anonymous display name while still
/// carrying the authenticated `user_id` — authorization checks that key off
/// `user_id` (seat-holding, drawer grants, team joins) still work without a
/// real directory wired in.
pub trait UserDirectory: Send + Sync {
    fn username_for(&self, user_id: UserId) -> Option<String>;
}

/// A directory that never resolves a username; every token falls back to
/// the anonymous display name but keeps its authenticated `user_id`.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullUserDirectory;

impl UserDirectory for NullUserDirectory {
    fn username_for(&self, _user_id: UserId) -> Option<String> {
        None
    }
}

#[derive(Debug, Error)]
enum TokenError {
    #[error("malformed token")]
    Malformed,
    #[error("unsupported algorithm")]
    UnsupportedAlgorithm,
    #[error("bad signature")]
    BadSignature,
    #[error("expired")]
    Expired,
    #[error("missing or non-numeric sub claim")]
    MissingSubject,
}

#[derive(Debug, Deserialize)]
struct Header {
    alg: String,
}

#[derive(Debug, Deserialize)]
struct Claims {
    /// The donor system's JWT library serializes `sub` as the decimal-string
    /// user id; accept both string and number forms.
    #[serde(deserialize_with = "deserialize_sub")]
    sub: i64,
    exp: Option<i64>,
}

fn deserialize_sub<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum SubClaim {
        Number(i64),
        String(String),
    }

    match SubClaim::deserialize(deserializer)? {
        SubClaim::Number(n) => Ok(n),
        SubClaim::String(s) => s.parse().map_err(serde::de::Error::custom),
    }
}

type HmacSha256 = Hmac<Sha256>;

/// Resolves a bearer token into an [`Identity`] using a shared-secret
/// HS256-verified JWT, as the donor system's login issuer produces
/// (`original_source/backend/app/auth.py`).
pub struct AuthResolver<D: UserDirectory = NullUserDirectory> {
    secret: Vec<u8>,
    directory: D,
}

impl AuthResolver<NullUserDirectory> {
    pub fn new(secret: impl Into<Vec<u8>>) -> Self {
        Self {
            secret: secret.into(),
            directory: NullUserDirectory,
        }
    }
}

impl<D: UserDirectory> AuthResolver<D> {
    pub fn with_directory(secret: impl Into<Vec<u8>>, directory: D) -> Self {
        Self {
            secret: secret.into(),
            directory,
        }
    }

    /// Resolve a possibly-absent bearer token. Never fails: any error
    /// degrades to [`Identity::anonymous`].
    pub fn resolve(&self, token: Option<&str>, now_unix: i64) -> Identity {
        let Some(token) = token else {
            return Identity::anonymous();
        };

        match self.verify(token, now_unix) {
            Ok(user_id) => {
                let username = self
                    .directory
                    .username_for(user_id)
                    .unwrap_or_else(|| ANONYMOUS_USERNAME.to_string());
                Identity {
                    username,
                    user_id: Some(user_id),
                }
            }
            Err(_) => Identity::anonymous(),
        }
    }

    fn verify(&self, token: &str, now_unix: i64) -> Result<UserId, TokenError> {
        let mut parts = token.split('.');
        let header_b64 = parts.next().ok_or(TokenError::Malformed)?;
        let claims_b64 = parts.next().ok_or(TokenError::Malformed)?;
        let signature_b64 = parts.next().ok_or(TokenError::Malformed)?;
        if parts.next().is_some() {
            return Err(TokenError::Malformed);
        }

        let header_bytes = BASE64
            .decode(header_b64)
            .map_err(|_| TokenError::Malformed)?;
        let header: Header =
            serde_json::from_slice(&header_bytes).map_err(|_| TokenError::Malformed)?;
        if header.alg != "HS256" {
            return Err(TokenError::UnsupportedAlgorithm);
        }

        let signature = BASE64
            .decode(signature_b64)
            .map_err(|_| TokenError::Malformed)?;

        let signing_input = format!("{header_b64}.{claims_b64}");
        let mut mac = HmacSha256::new_from_slice(&self.secret).map_err(|_| TokenError::Malformed)?;
        mac.update(signing_input.as_bytes());
        let expected = mac.finalize().into_bytes();

        if expected.len() != signature.len() || expected.ct_eq(&signature).unwrap_u8() != 1 {
            return Err(TokenError::BadSignature);
        }

        let claims_bytes = BASE64
            .decode(claims_b64)
            .map_err(|_| TokenError::Malformed)?;
        let claims: Claims =
            serde_json::from_slice(&claims_bytes).map_err(|_| TokenError::MissingSubject)?;

        if let Some(exp) = claims.exp {
            if exp < now_unix {
                return Err(TokenError::Expired);
            }
        }

        Ok(claims.sub)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sign(secret: &[u8], header: &str, claims: &str) -> String {
        let header_b64 = BASE64.encode(header);
        let claims_b64 = BASE64.encode(claims);
        let signing_input = format!("{header_b64}.{claims_b64}");
        let mut mac = HmacSha256::new_from_slice(secret).unwrap();
        mac.update(signing_input.as_bytes());
        let sig = mac.finalize().into_bytes();
        format!("{signing_input}.{}", BASE64.encode(sig))
    }

    #[test]
    fn valid_token_resolves_authenticated_identity() {
        let secret = b"test-secret";
        let token = sign(
            secret,
            r#"{"alg":"HS256","typ":"JWT"}"#,
            r#"{"sub":"42","exp":9999999999}"#,
        );
        let resolver = AuthResolver::new(secret.to_vec());
        let identity = resolver.resolve(Some(&token), 1_700_000_000);
        assert_eq!(identity.user_id, Some(42));
        assert_eq!(identity.username, ANONYMOUS_USERNAME);
    }

    #[test]
    fn missing_token_is_anonymous() {
        let resolver = AuthResolver::new(b"secret".to_vec());
        assert_eq!(resolver.resolve(None, 0), Identity::anonymous());
    }

    #[test]
    fn expired_token_degrades_to_anonymous() {
        let secret = b"test-secret";
        let token = sign(
            secret,
            r#"{"alg":"HS256","typ":"JWT"}"#,
            r#"{"sub":1,"exp":1}"#,
        );
        let resolver = AuthResolver::new(secret.to_vec());
        assert_eq!(
            resolver.resolve(Some(&token), 1_700_000_000),
            Identity::anonymous()
        );
    }

    #[test]
    fn bad_signature_degrades_to_anonymous() {
        let token = sign(
            b"right-secret",
            r#"{"alg":"HS256","typ":"JWT"}"#,
            r#"{"sub":1,"exp":9999999999}"#,
        );
        let resolver = AuthResolver::new(b"wrong-secret".to_vec());
        assert_eq!(
            resolver.resolve(Some(&token), 1_700_000_000),
            Identity::anonymous()
        );
    }

    #[test]
    fn malformed_token_degrades_to_anonymous() {
        let resolver = AuthResolver::new(b"secret".to_vec());
        assert_eq!(
            resolver.resolve(Some("not-a-jwt"), 0),
            Identity::anonymous()
        );
    }

    #[test]
    fn directory_hit_resolves_username() {
        struct FixedDirectory;
        impl UserDirectory for FixedDirectory {
            fn username_for(&self, user_id: UserId) -> Option<String> {
                (user_id == 42).then(|| "alice".to_string())
            }
        }

        let secret = b"test-secret";
        let token = sign(
            secret,
            r#"{"alg":"HS256","typ":"JWT"}"#,
            r#"{"sub":42,"exp":9999999999}"#,
        );
        let resolver = AuthResolver::with_directory(secret.to_vec(), FixedDirectory);
        let identity = resolver.resolve(Some(&token), 1_700_000_000);
        assert_eq!(identity.username, "alice");
        assert_eq!(identity.user_id, Some(42));
    }
}
