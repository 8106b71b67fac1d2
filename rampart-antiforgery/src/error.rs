use std::fmt;
use thiserror::Error;

/// Why an antiforgery check rejected a request.
///
/// Carried by [`AntiforgeryError::ValidationFailed`] for logging and diagnostics.
/// It should not be echoed back to the client; use
/// [`AntiforgeryError::public_message`] for anything user-facing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureReason {
    /// A token string was not a valid encoding of a token
    MalformedToken,
    /// The protector rejected a token's integrity check
    CryptographicTamper,
    /// No usable cookie token accompanied the request
    MissingCookieToken,
    /// No form/header token accompanied the request
    MissingFormToken,
    /// The cookie and form tokens are of the wrong kind (e.g. swapped)
    WrongTokenKind,
    /// The cookie and form tokens carry different security values
    TokenMismatch,
    /// The form token was issued to a different principal
    IdentityMismatch,
    /// The additional-data hook rejected the form token
    AdditionalDataRejected,
}

impl FailureReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureReason::MalformedToken => "malformed token",
            FailureReason::CryptographicTamper => "cryptographic tamper",
            FailureReason::MissingCookieToken => "missing cookie token",
            FailureReason::MissingFormToken => "missing form token",
            FailureReason::WrongTokenKind => "wrong token kind",
            FailureReason::TokenMismatch => "token mismatch",
            FailureReason::IdentityMismatch => "identity mismatch",
            FailureReason::AdditionalDataRejected => "additional data rejected",
        }
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors from the injected [`Protector`](crate::Protector).
#[derive(Error, Debug)]
pub enum ProtectorError {
    #[error("Protected payload failed its integrity check")]
    CryptographicTamper,

    #[error("Protector failure: {0}")]
    Failure(String),
}

/// Errors from decoding a serialized token.
#[derive(Error, Debug)]
pub enum TokenError {
    #[error("Malformed antiforgery token: {0}")]
    Malformed(String),

    #[error("Antiforgery token failed its integrity check")]
    Tamper,
}

impl TokenError {
    pub fn reason(&self) -> FailureReason {
        match self {
            TokenError::Malformed(_) => FailureReason::MalformedToken,
            TokenError::Tamper => FailureReason::CryptographicTamper,
        }
    }
}

#[derive(Error, Debug)]
pub enum AntiforgeryError {
    #[error("Antiforgery validation failed: {reason}")]
    ValidationFailed { reason: FailureReason },

    #[error("Antiforgery configuration error: {0}")]
    Configuration(String),

    #[error("Token is not a valid cookie token")]
    InvalidCookieToken,

    #[error("Token serialization failed: {0}")]
    Serialization(String),

    #[error(transparent)]
    Protector(#[from] ProtectorError),
}

impl AntiforgeryError {
    pub fn validation(reason: FailureReason) -> Self {
        AntiforgeryError::ValidationFailed { reason }
    }

    /// The specific rejection reason, if this is a validation failure.
    pub fn reason(&self) -> Option<FailureReason> {
        match self {
            AntiforgeryError::ValidationFailed { reason } => Some(*reason),
            _ => None,
        }
    }

    pub fn is_validation_failure(&self) -> bool {
        matches!(self, AntiforgeryError::ValidationFailed { .. })
    }

    /// Text safe to show an end user. Never reveals which check failed.
    pub fn public_message(&self) -> &'static str {
        match self {
            AntiforgeryError::ValidationFailed { .. } => "The request could not be verified.",
            _ => "Internal server error.",
        }
    }

    /// HTTP status a caller should answer with.
    pub fn status_code(&self) -> u16 {
        match self {
            AntiforgeryError::ValidationFailed { .. } => 400,
            _ => 500,
        }
    }
}

impl From<TokenError> for AntiforgeryError {
    fn from(err: TokenError) -> Self {
        AntiforgeryError::validation(err.reason())
    }
}

pub type Result<T> = std::result::Result<T, AntiforgeryError>;
