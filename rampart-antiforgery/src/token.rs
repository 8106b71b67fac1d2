use rand::RngCore;
use std::fmt;
use subtle::ConstantTimeEq;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Length in bytes of a token's security value (128 bits).
pub const SECURITY_VALUE_LEN: usize = 16;

/// The random secret shared by a cookie token and every form token derived from it.
///
/// Equality is constant-time and `Debug` never prints the bytes.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SecurityValue([u8; SECURITY_VALUE_LEN]);

impl SecurityValue {
    /// Fresh value from the thread-local CSPRNG.
    pub fn generate() -> Self {
        let mut bytes = [0u8; SECURITY_VALUE_LEN];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self(bytes)
    }

    pub fn from_bytes(bytes: [u8; SECURITY_VALUE_LEN]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; SECURITY_VALUE_LEN] {
        &self.0
    }
}

impl PartialEq for SecurityValue {
    fn eq(&self, other: &Self) -> bool {
        self.0.ct_eq(&other.0).into()
    }
}

impl Eq for SecurityValue {}

impl fmt::Debug for SecurityValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecurityValue(..)")
    }
}

/// An antiforgery token.
///
/// Cookie tokens (`is_session_token == true`) carry only the security value.
/// Form tokens copy the security value of the cookie token they were derived
/// from and bind it to the principal and any additional data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    security_value: SecurityValue,
    is_session_token: bool,
    username: Option<String>,
    claim_fingerprint: Option<Vec<u8>>,
    additional_data: Option<String>,
}

impl Token {
    /// A cookie token around the given security value.
    pub fn cookie(security_value: SecurityValue) -> Self {
        Self {
            security_value,
            is_session_token: true,
            username: None,
            claim_fingerprint: None,
            additional_data: None,
        }
    }

    /// A form token bound to the given identity and additional data.
    pub fn form(
        security_value: SecurityValue,
        username: Option<String>,
        claim_fingerprint: Option<Vec<u8>>,
        additional_data: Option<String>,
    ) -> Self {
        Self {
            security_value,
            is_session_token: false,
            username,
            claim_fingerprint,
            additional_data,
        }
    }

    pub(crate) fn from_parts(
        security_value: SecurityValue,
        is_session_token: bool,
        username: Option<String>,
        claim_fingerprint: Option<Vec<u8>>,
        additional_data: Option<String>,
    ) -> Self {
        Self {
            security_value,
            is_session_token,
            username,
            claim_fingerprint,
            additional_data,
        }
    }

    pub fn security_value(&self) -> &SecurityValue {
        &self.security_value
    }

    pub fn is_session_token(&self) -> bool {
        self.is_session_token
    }

    pub fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }

    pub fn claim_fingerprint(&self) -> Option<&[u8]> {
        self.claim_fingerprint.as_deref()
    }

    pub fn additional_data(&self) -> Option<&str> {
        self.additional_data.as_deref()
    }
}

/// What the caller must do with the cookie token after issuance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CookieToken {
    /// The request's existing cookie is still valid; leave it alone.
    Reuse,
    /// A new cookie token was minted and must be persisted.
    Persist(Token),
}

impl CookieToken {
    pub fn must_persist(&self) -> bool {
        matches!(self, CookieToken::Persist(_))
    }

    pub fn as_token(&self) -> Option<&Token> {
        match self {
            CookieToken::Reuse => None,
            CookieToken::Persist(token) => Some(token),
        }
    }
}

/// A cookie-token disposition and the form token generated against it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenSet {
    pub cookie_token: CookieToken,
    pub form_token: Token,
}

/// [`TokenSet`] in wire form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerializedTokenSet {
    /// Present only when a new cookie must be set
    pub cookie_token: Option<String>,
    pub form_token: String,
}
