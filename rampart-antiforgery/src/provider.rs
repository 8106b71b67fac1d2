//! Token generation and the cookie/form pair validation predicate.

use crate::config::AntiforgeryConfig;
use crate::context::RequestContext;
use crate::error::{AntiforgeryError, FailureReason, Result};
use crate::identity::{AdditionalDataProvider, ClaimFingerprintExtractor};
use crate::token::{SecurityValue, Token};
use std::sync::Arc;
use subtle::ConstantTimeEq;

/// Identity captured from the current principal.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct IdentityBinding {
    username: Option<String>,
    claim_fingerprint: Option<Vec<u8>>,
}

/// Generates cookie and form tokens and validates submitted pairs.
#[derive(Clone)]
pub struct TokenProvider {
    config: Arc<AntiforgeryConfig>,
    fingerprint: Arc<dyn ClaimFingerprintExtractor>,
    additional_data: Option<Arc<dyn AdditionalDataProvider>>,
}

impl TokenProvider {
    pub fn new(
        config: Arc<AntiforgeryConfig>,
        fingerprint: Arc<dyn ClaimFingerprintExtractor>,
        additional_data: Option<Arc<dyn AdditionalDataProvider>>,
    ) -> Self {
        Self {
            config,
            fingerprint,
            additional_data,
        }
    }

    /// A fresh cookie token. Identity is bound later, per form token, since the
    /// cookie outlives logins and logouts within a browser session.
    pub fn generate_cookie_token(&self) -> Token {
        Token::cookie(SecurityValue::generate())
    }

    /// A form token sharing `cookie_token`'s security value, bound to the
    /// current principal and the additional-data hook's output.
    pub async fn generate_form_token(
        &self,
        request: &RequestContext,
        cookie_token: &Token,
    ) -> Result<Token> {
        if !self.is_cookie_token_valid(Some(cookie_token)) {
            return Err(AntiforgeryError::InvalidCookieToken);
        }

        let identity = self.identity_binding(request)?;
        let additional_data = match self.additional_data {
            Some(ref provider) => provider.produce(request).await,
            None => None,
        };

        Ok(Token::form(
            cookie_token.security_value().clone(),
            identity.username,
            identity.claim_fingerprint,
            additional_data,
        ))
    }

    pub fn is_cookie_token_valid(&self, token: Option<&Token>) -> bool {
        // Security values are fixed-length arrays, so never empty.
        token.is_some_and(Token::is_session_token)
    }

    /// Check that `form_token` was derived from `cookie_token` for the
    /// principal making this request. The first failing check decides.
    ///
    /// Rejections are [`AntiforgeryError::ValidationFailed`]. A principal that
    /// cannot be bound at all is a [`AntiforgeryError::Configuration`] error,
    /// the same as when generating the form token.
    pub async fn validate_token_pair(
        &self,
        request: &RequestContext,
        cookie_token: Option<&Token>,
        form_token: Option<&Token>,
    ) -> Result<()> {
        let cookie_token = cookie_token.ok_or(reject(FailureReason::MissingCookieToken))?;
        let form_token = form_token.ok_or(reject(FailureReason::MissingFormToken))?;

        if !cookie_token.is_session_token() || form_token.is_session_token() {
            return Err(reject(FailureReason::WrongTokenKind));
        }

        if cookie_token.security_value() != form_token.security_value() {
            return Err(reject(FailureReason::TokenMismatch));
        }

        let current = self.identity_binding(request)?;
        if !identity_matches(&current, form_token) {
            return Err(reject(FailureReason::IdentityMismatch));
        }

        if let Some(ref provider) = self.additional_data {
            if !provider.validate(request, form_token.additional_data()).await {
                return Err(reject(FailureReason::AdditionalDataRejected));
            }
        }

        Ok(())
    }

    fn identity_binding(&self, request: &RequestContext) -> Result<IdentityBinding> {
        let Some(principal) = request
            .principal
            .as_ref()
            .filter(|principal| principal.is_authenticated())
        else {
            return Ok(IdentityBinding::default());
        };

        if let Some(fingerprint) = self.fingerprint.extract(principal) {
            return Ok(IdentityBinding {
                username: None,
                claim_fingerprint: Some(fingerprint),
            });
        }

        match principal.name().filter(|name| !name.is_empty()) {
            Some(name) => Ok(IdentityBinding {
                username: Some(name.to_string()),
                claim_fingerprint: None,
            }),
            None if self.config.suppress_identity_heuristic_checks => {
                Ok(IdentityBinding::default())
            }
            None => Err(AntiforgeryError::Configuration(
                "authenticated principal has neither a name nor a claim fingerprint".to_string(),
            )),
        }
    }
}

fn reject(reason: FailureReason) -> AntiforgeryError {
    AntiforgeryError::validation(reason)
}

fn identity_matches(current: &IdentityBinding, form_token: &Token) -> bool {
    let fingerprint_matches = match (
        current.claim_fingerprint.as_deref(),
        form_token.claim_fingerprint(),
    ) {
        (Some(expected), Some(actual)) => bool::from(expected.ct_eq(actual)),
        (None, None) => true,
        _ => false,
    };

    // Evaluate both before branching.
    let username_matches = current.username.as_deref() == form_token.username();

    fingerprint_matches & username_matches
}
