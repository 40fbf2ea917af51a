//! Session gate.
//!
//! Requests to object and listing routes must carry a session cookie of
//! the form `{user}.{expires}.{signature}`, where `signature` is the hex
//! HMAC-SHA256 of `{user}.{expires}` under the configured secret and
//! `expires` is a Unix timestamp in seconds.
//!
//! How sessions are issued (login pages, password checks) lives outside
//! this crate; the `blobgate-session` binary mints cookies for operators.

use axum::http::{header, HeaderMap};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

/// An authenticated caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    /// User name carried in the cookie.
    pub user: String,
    /// Expiry as a Unix timestamp (seconds).
    pub expires: u64,
}

/// Reasons a request is refused by the gate.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("no session cookie")]
    Missing,
    #[error("malformed session cookie")]
    Malformed,
    #[error("session signature mismatch")]
    BadSignature,
    #[error("session expired")]
    Expired,
}

/// Pass/fail predicate run before any store access.
pub trait AccessGate: Send + Sync + 'static {
    /// Return the caller's session, or why there is none.
    fn check(&self, headers: &HeaderMap) -> Result<Session, SessionError>;
}

/// Verifies HMAC-signed session cookies.
pub struct SignedCookieGate {
    secret: Vec<u8>,
    cookie_name: String,
}

impl SignedCookieGate {
    /// Create a gate for cookies named `cookie_name` signed with `secret`.
    pub fn new(secret: &str, cookie_name: &str) -> Self {
        Self {
            secret: secret.as_bytes().to_vec(),
            cookie_name: cookie_name.to_string(),
        }
    }

    /// Name of the cookie this gate reads.
    pub fn cookie_name(&self) -> &str {
        &self.cookie_name
    }

    /// Build a cookie value for `user` valid until `expires`.
    pub fn mint(&self, user: &str, expires: u64) -> String {
        let payload = format!("{user}.{expires}");
        let signature = self.sign(&payload);
        format!("{payload}.{signature}")
    }

    /// Verify a cookie value at time `now` (Unix seconds).
    pub fn verify(&self, value: &str, now: u64) -> Result<Session, SessionError> {
        // The user name may itself contain dots, so split from the right.
        let mut parts = value.rsplitn(3, '.');
        let signature = parts.next().ok_or(SessionError::Malformed)?;
        let expires_s = parts.next().ok_or(SessionError::Malformed)?;
        let user = parts.next().ok_or(SessionError::Malformed)?;
        if user.is_empty() || signature.is_empty() {
            return Err(SessionError::Malformed);
        }
        let expires: u64 = expires_s.parse().map_err(|_| SessionError::Malformed)?;

        let expected = self.sign(&format!("{user}.{expires_s}"));
        if !constant_time_eq(&expected, signature) {
            return Err(SessionError::BadSignature);
        }
        if expires <= now {
            return Err(SessionError::Expired);
        }

        Ok(Session {
            user: user.to_string(),
            expires,
        })
    }

    fn sign(&self, payload: &str) -> String {
        let mut mac = HmacSha256::new_from_slice(&self.secret).expect("HMAC can take key of any size");
        mac.update(payload.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }
}

impl AccessGate for SignedCookieGate {
    fn check(&self, headers: &HeaderMap) -> Result<Session, SessionError> {
        let value = cookie_value(headers, &self.cookie_name).ok_or(SessionError::Missing)?;
        self.verify(value, unix_now())
    }
}

/// Find cookie `name` across all `Cookie` headers.
pub fn cookie_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(k, _)| *k == name)
        .map(|(_, v)| v.trim_matches('"'))
}

/// Compare two signature strings in constant time.
pub fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.as_bytes().ct_eq(b.as_bytes()).into()
}

/// Current time as Unix seconds.
pub fn unix_now() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    const NOW: u64 = 1_700_000_000;

    fn gate() -> SignedCookieGate {
        SignedCookieGate::new("test-secret", "blobgate_session")
    }

    #[test]
    fn test_mint_then_verify() {
        let gate = gate();
        let cookie = gate.mint("alice", NOW + 60);
        let session = gate.verify(&cookie, NOW).unwrap();
        assert_eq!(session.user, "alice");
        assert_eq!(session.expires, NOW + 60);
    }

    #[test]
    fn test_user_with_dots() {
        let gate = gate();
        let cookie = gate.mint("a.l.ice", NOW + 60);
        assert_eq!(gate.verify(&cookie, NOW).unwrap().user, "a.l.ice");
    }

    #[test]
    fn test_expired() {
        let gate = gate();
        let cookie = gate.mint("alice", NOW);
        assert_eq!(gate.verify(&cookie, NOW), Err(SessionError::Expired));
    }

    #[test]
    fn test_tampered_payload() {
        let gate = gate();
        let cookie = gate.mint("alice", NOW + 60);
        let forged = cookie.replacen("alice", "mallory", 1);
        assert_eq!(gate.verify(&forged, NOW), Err(SessionError::BadSignature));

        let extended = cookie.replacen(&(NOW + 60).to_string(), &(NOW + 6000).to_string(), 1);
        assert_eq!(gate.verify(&extended, NOW), Err(SessionError::BadSignature));
    }

    #[test]
    fn test_other_secret_rejected() {
        let cookie = SignedCookieGate::new("other", "blobgate_session").mint("alice", NOW + 60);
        assert_eq!(gate().verify(&cookie, NOW), Err(SessionError::BadSignature));
    }

    #[test]
    fn test_malformed() {
        let gate = gate();
        for value in ["", "alice", "alice.123", ".123.abcd", "alice.soon.abcd", "alice.123."] {
            assert_eq!(gate.verify(value, NOW), Err(SessionError::Malformed), "{value:?}");
        }
    }

    #[test]
    fn test_cookie_value_lookup() {
        let mut headers = HeaderMap::new();
        headers.append(header::COOKIE, HeaderValue::from_static("theme=dark; lang=en"));
        headers.append(
            header::COOKIE,
            HeaderValue::from_static("blobgate_session=bob.1.ff"),
        );
        assert_eq!(cookie_value(&headers, "blobgate_session"), Some("bob.1.ff"));
        assert_eq!(cookie_value(&headers, "lang"), Some("en"));
        assert_eq!(cookie_value(&headers, "missing"), None);
    }

    #[test]
    fn test_check_reads_cookie_header() {
        let gate = gate();
        let mut headers = HeaderMap::new();
        assert_eq!(gate.check(&headers), Err(SessionError::Missing));

        let cookie = gate.mint("carol", unix_now() + 3600);
        headers.insert(
            header::COOKIE,
            HeaderValue::from_str(&format!("blobgate_session={cookie}")).unwrap(),
        );
        assert_eq!(gate.check(&headers).unwrap().user, "carol");
    }

    #[test]
    fn test_constant_time_eq() {
        assert!(constant_time_eq("abc", "abc"));
        assert!(!constant_time_eq("abc", "abd"));
        assert!(!constant_time_eq("abc", "ab"));
    }
}
