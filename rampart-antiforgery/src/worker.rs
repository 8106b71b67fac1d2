//! The antiforgery engine: token issuance, storage and request validation.

use crate::config::AntiforgeryConfig;
use crate::context::{RequestContext, ResponseContext};
use crate::error::{AntiforgeryError, FailureReason, Result};
use crate::html;
use crate::identity::{AdditionalDataProvider, ClaimFingerprintExtractor, Sha256ClaimFingerprint};
use crate::protector::Protector;
use crate::provider::TokenProvider;
use crate::serializer::TokenSerializer;
use crate::store::{CookieTokenStore, TokenStore};
use crate::token::{CookieToken, SerializedTokenSet, Token, TokenSet};
use std::sync::Arc;
use tracing::{debug, trace, warn};

/// A serialized form token and where the client should send it back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestTokens {
    pub form_token: String,
    pub form_field_name: String,
    pub header_name: Option<String>,
}

/// Antiforgery engine.
///
/// Composes the store, provider and serializer into the request-facing
/// operations. Holds no per-request state, so one instance is shared by all
/// request handlers.
#[derive(Clone)]
pub struct Antiforgery {
    config: Arc<AntiforgeryConfig>,
    serializer: TokenSerializer,
    store: Arc<dyn TokenStore>,
    provider: TokenProvider,
}

impl Antiforgery {
    /// Start building an engine around the given protector
    pub fn builder(protector: Arc<dyn Protector>) -> AntiforgeryBuilder {
        AntiforgeryBuilder::new(protector)
    }

    pub fn config(&self) -> &AntiforgeryConfig {
        &self.config
    }

    pub fn serializer(&self) -> &TokenSerializer {
        &self.serializer
    }

    /// Check if request needs antiforgery protection
    pub fn needs_protection(&self, request: &RequestContext) -> bool {
        self.config.needs_protection(&request.method, &request.path)
    }

    /// Resolve the cookie token for this request and derive a form token from it.
    ///
    /// `old_cookie_token` is the serialized cookie the request carried. When it
    /// still decodes to a valid cookie token it is reused and the result says
    /// [`CookieToken::Reuse`]; otherwise a new cookie token is minted and
    /// returned as [`CookieToken::Persist`]. Nothing is written anywhere.
    pub async fn issue_token_set(
        &self,
        request: &RequestContext,
        old_cookie_token: Option<&str>,
    ) -> Result<TokenSet> {
        let existing = old_cookie_token.and_then(|value| match self.serializer.deserialize(value) {
            Ok(token) => Some(token),
            Err(error) => {
                debug!(reason = %error.reason(), "discarding unusable cookie token");
                None
            }
        });

        self.token_set_for(request, existing).await
    }

    async fn token_set_for(
        &self,
        request: &RequestContext,
        existing: Option<Token>,
    ) -> Result<TokenSet> {
        let (cookie, disposition) = match existing {
            Some(token) if self.provider.is_cookie_token_valid(Some(&token)) => {
                (token, CookieToken::Reuse)
            }
            _ => {
                let token = self.provider.generate_cookie_token();
                debug!("minted new antiforgery cookie token");
                (token.clone(), CookieToken::Persist(token))
            }
        };

        let form_token = self.provider.generate_form_token(request, &cookie).await?;

        Ok(TokenSet {
            cookie_token: disposition,
            form_token,
        })
    }

    /// Wire form of a token set, for callers persisting it themselves.
    pub fn serialize_token_set(&self, token_set: &TokenSet) -> Result<SerializedTokenSet> {
        let cookie_token = match token_set.cookie_token {
            CookieToken::Reuse => None,
            CookieToken::Persist(ref token) => Some(self.serializer.serialize(token)?),
        };

        Ok(SerializedTokenSet {
            cookie_token,
            form_token: self.serializer.serialize(&token_set.form_token)?,
        })
    }

    /// Issue a form token for this request, persisting a new cookie on the
    /// response when one had to be minted.
    ///
    /// A cookie already written to `response` earlier in the same request is
    /// reused, so several forms on one page share a cookie.
    pub async fn get_and_store_tokens(
        &self,
        request: &RequestContext,
        response: &mut ResponseContext,
    ) -> Result<RequestTokens> {
        let existing = match self.store.read_issued_cookie_token(response).await {
            Some(token) => Some(token),
            None => self.store.read_cookie_token(request).await,
        };

        let token_set = self.token_set_for(request, existing).await?;
        let form_token = self.serializer.serialize(&token_set.form_token)?;

        // Everything fallible is done; only now touch the response.
        if let CookieToken::Persist(ref cookie) = token_set.cookie_token {
            self.store.write_cookie_token(request, response, cookie).await?;
        }
        self.apply_response_headers(response);

        Ok(RequestTokens {
            form_token,
            form_field_name: self.config.form_field_name.clone(),
            header_name: self.config.header_name.clone(),
        })
    }

    /// Hidden input markup for a protected form. May set the antiforgery
    /// cookie on `response`.
    pub async fn render_protected_input(
        &self,
        request: &RequestContext,
        response: &mut ResponseContext,
    ) -> Result<String> {
        let tokens = self.get_and_store_tokens(request, response).await?;
        Ok(html::hidden_input(&tokens.form_field_name, &tokens.form_token))
    }

    /// Validate a serialized cookie/form token pair for this request.
    pub async fn validate(
        &self,
        request: &RequestContext,
        cookie_token: &str,
        form_token: &str,
    ) -> Result<()> {
        self.validate_serialized(request, cookie_token, form_token)
            .await
            .inspect_err(log_rejection)
    }

    /// Validate the token pair carried by the request itself.
    pub async fn validate_request(&self, request: &RequestContext) -> Result<()> {
        self.validate_stored(request).await.inspect_err(log_rejection)
    }

    /// `Ok(true)` for requests that need no protection or carry a valid pair,
    /// `Ok(false)` for rejected requests.
    pub async fn is_request_valid(&self, request: &RequestContext) -> Result<bool> {
        if !self.needs_protection(request) {
            trace!(method = %request.method, path = %request.path, "request exempt from antiforgery check");
            return Ok(true);
        }

        match self.validate_request(request).await {
            Ok(()) => Ok(true),
            Err(AntiforgeryError::ValidationFailed { .. }) => Ok(false),
            Err(error) => Err(error),
        }
    }

    async fn validate_serialized(
        &self,
        request: &RequestContext,
        cookie_token: &str,
        form_token: &str,
    ) -> Result<()> {
        let cookie = self.serializer.deserialize(cookie_token)?;
        let form = self.serializer.deserialize(form_token)?;
        self.validate_tokens(request, Some(&cookie), Some(&form)).await
    }

    async fn validate_stored(&self, request: &RequestContext) -> Result<()> {
        let cookie = self
            .store
            .read_cookie_token(request)
            .await
            .ok_or(AntiforgeryError::validation(FailureReason::MissingCookieToken))?;
        let form_token = self
            .store
            .read_form_token(request)
            .await
            .ok_or(AntiforgeryError::validation(FailureReason::MissingFormToken))?;
        let form = self.serializer.deserialize(&form_token)?;
        self.validate_tokens(request, Some(&cookie), Some(&form)).await
    }

    async fn validate_tokens(
        &self,
        request: &RequestContext,
        cookie: Option<&Token>,
        form: Option<&Token>,
    ) -> Result<()> {
        self.provider.validate_token_pair(request, cookie, form).await
    }

    fn apply_response_headers(&self, response: &mut ResponseContext) {
        response.set_header("Cache-Control", "no-cache, no-store");
        response.set_header("Pragma", "no-cache");

        if !self.config.suppress_x_frame_options_header && response.header("X-Frame-Options").is_none()
        {
            response.set_header("X-Frame-Options", "SAMEORIGIN");
        }
    }
}

fn log_rejection(error: &AntiforgeryError) {
    if let Some(reason) = error.reason() {
        warn!(reason = %reason, "antiforgery validation failed");
    }
}

/// Builder for [`Antiforgery`]
pub struct AntiforgeryBuilder {
    protector: Arc<dyn Protector>,
    config: AntiforgeryConfig,
    store: Option<Arc<dyn TokenStore>>,
    fingerprint: Arc<dyn ClaimFingerprintExtractor>,
    additional_data: Option<Arc<dyn AdditionalDataProvider>>,
}

impl AntiforgeryBuilder {
    pub fn new(protector: Arc<dyn Protector>) -> Self {
        Self {
            protector,
            config: AntiforgeryConfig::default(),
            store: None,
            fingerprint: Arc::new(Sha256ClaimFingerprint),
            additional_data: None,
        }
    }

    pub fn config(mut self, config: AntiforgeryConfig) -> Self {
        self.config = config;
        self
    }

    /// Replace the default cookie-backed store
    pub fn token_store(mut self, store: Arc<dyn TokenStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn claim_fingerprint(mut self, extractor: Arc<dyn ClaimFingerprintExtractor>) -> Self {
        self.fingerprint = extractor;
        self
    }

    pub fn additional_data(mut self, provider: Arc<dyn AdditionalDataProvider>) -> Self {
        self.additional_data = Some(provider);
        self
    }

    pub fn build(self) -> Result<Antiforgery> {
        self.config.validate()?;

        let config = Arc::new(self.config);
        let serializer = TokenSerializer::new(self.protector);
        let store = self.store.unwrap_or_else(|| {
            Arc::new(CookieTokenStore::new(config.clone(), serializer.clone()))
        });
        let provider = TokenProvider::new(config.clone(), self.fingerprint, self.additional_data);

        Ok(Antiforgery {
            config,
            serializer,
            store,
            provider,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protector::HmacProtector;

    fn antiforgery() -> Antiforgery {
        let protector = HmacProtector::new(HmacProtector::generate_key()).unwrap();
        Antiforgery::builder(Arc::new(protector)).build().unwrap()
    }

    #[test]
    fn test_safe_methods() {
        let antiforgery = antiforgery();
        assert!(!antiforgery.needs_protection(&RequestContext::new("GET", "/test")));
        assert!(antiforgery.needs_protection(&RequestContext::new("POST", "/test")));
    }

    #[test]
    fn test_invalid_config_fails_build() {
        let protector = HmacProtector::new(HmacProtector::generate_key()).unwrap();
        let result = Antiforgery::builder(Arc::new(protector))
            .config(AntiforgeryConfig::default().with_cookie_name(""))
            .build();
        assert!(matches!(result, Err(AntiforgeryError::Configuration(_))));
    }

    #[tokio::test]
    async fn test_fresh_issuance() {
        let antiforgery = antiforgery();
        let request = RequestContext::new("GET", "/");

        let set = antiforgery.issue_token_set(&request, None).await.unwrap();
        let cookie = set.cookie_token.as_token().unwrap();
        assert!(cookie.is_session_token());
        assert_eq!(cookie.security_value(), set.form_token.security_value());
    }

    #[tokio::test]
    async fn test_reuse_of_valid_cookie() {
        let antiforgery = antiforgery();
        let request = RequestContext::new("GET", "/");
        let first = antiforgery.issue_token_set(&request, None).await.unwrap();
        let serialized = antiforgery.serialize_token_set(&first).unwrap();
        let cookie = serialized.cookie_token.unwrap();

        let second = antiforgery
            .issue_token_set(&request, Some(&cookie))
            .await
            .unwrap();
        assert_eq!(second.cookie_token, CookieToken::Reuse);
        assert_eq!(
            second.form_token.security_value(),
            first.cookie_token.as_token().unwrap().security_value()
        );
        assert!(antiforgery.serialize_token_set(&second).unwrap().cookie_token.is_none());
    }

    #[tokio::test]
    async fn test_garbage_cookie_is_replaced() {
        let antiforgery = antiforgery();
        let request = RequestContext::new("GET", "/");
        let set = antiforgery
            .issue_token_set(&request, Some("garbage"))
            .await
            .unwrap();
        assert!(set.cookie_token.must_persist());
    }

    #[tokio::test]
    async fn test_form_token_string_as_cookie_is_replaced() {
        let antiforgery = antiforgery();
        let request = RequestContext::new("GET", "/");
        let set = antiforgery.issue_token_set(&request, None).await.unwrap();
        let form = antiforgery.serializer().serialize(&set.form_token).unwrap();

        let next = antiforgery.issue_token_set(&request, Some(&form)).await.unwrap();
        assert!(next.cookie_token.must_persist());
    }

    #[tokio::test]
    async fn test_second_render_reuses_issued_cookie() {
        let antiforgery = antiforgery();
        let request = RequestContext::new("GET", "/");
        let mut response = ResponseContext::new();

        let first = antiforgery.get_and_store_tokens(&request, &mut response).await.unwrap();
        let cookie_after_first = response.set_cookie_headers();
        let second = antiforgery.get_and_store_tokens(&request, &mut response).await.unwrap();

        assert_eq!(response.cookies().len(), 1);
        assert_eq!(response.set_cookie_headers(), cookie_after_first);

        let cookie = response.cookie(&antiforgery.config().cookie_name).unwrap().value().to_string();
        let submit = RequestContext::new("POST", "/");
        assert!(antiforgery.validate(&submit, &cookie, &first.form_token).await.is_ok());
        assert!(antiforgery.validate(&submit, &cookie, &second.form_token).await.is_ok());
    }

    #[tokio::test]
    async fn test_response_headers() {
        let antiforgery = antiforgery();
        let mut response = ResponseContext::new();
        antiforgery
            .get_and_store_tokens(&RequestContext::new("GET", "/"), &mut response)
            .await
            .unwrap();

        assert_eq!(response.header("cache-control"), Some("no-cache, no-store"));
        assert_eq!(response.header("pragma"), Some("no-cache"));
        assert_eq!(response.header("x-frame-options"), Some("SAMEORIGIN"));
    }

    #[tokio::test]
    async fn test_existing_frame_options_kept() {
        let antiforgery = antiforgery();
        let mut response = ResponseContext::new();
        response.set_header("X-Frame-Options", "DENY");

        antiforgery
            .get_and_store_tokens(&RequestContext::new("GET", "/"), &mut response)
            .await
            .unwrap();
        assert_eq!(response.header("x-frame-options"), Some("DENY"));
    }

    #[tokio::test]
    async fn test_frame_options_suppressed() {
        let protector = HmacProtector::new(HmacProtector::generate_key()).unwrap();
        let antiforgery = Antiforgery::builder(Arc::new(protector))
            .config(AntiforgeryConfig::default().with_suppress_x_frame_options_header(true))
            .build()
            .unwrap();
        let mut response = ResponseContext::new();

        antiforgery
            .get_and_store_tokens(&RequestContext::new("GET", "/"), &mut response)
            .await
            .unwrap();
        assert!(response.header("x-frame-options").is_none());
    }

    #[tokio::test]
    async fn test_unbindable_principal_fails_validation_as_configuration() {
        let antiforgery = antiforgery();
        let set = antiforgery
            .issue_token_set(&RequestContext::new("GET", "/"), None)
            .await
            .unwrap();
        let serialized = antiforgery.serialize_token_set(&set).unwrap();
        let cookie = serialized.cookie_token.unwrap();

        let submit = RequestContext::new("POST", "/")
            .with_principal(crate::context::Principal::authenticated_unnamed());
        let error = antiforgery
            .validate(&submit, &cookie, &serialized.form_token)
            .await
            .unwrap_err();
        assert!(matches!(error, AntiforgeryError::Configuration(_)));
        assert_eq!(error.status_code(), 500);

        let submit = submit
            .with_cookie(&antiforgery.config().cookie_name, &cookie)
            .with_form(&[("__RequestVerificationToken", serialized.form_token.as_str())]);
        assert!(matches!(
            antiforgery.is_request_valid(&submit).await,
            Err(AntiforgeryError::Configuration(_))
        ));
    }

    #[tokio::test]
    async fn test_failed_issuance_leaves_response_untouched() {
        let antiforgery = antiforgery();
        let request = RequestContext::new("GET", "/")
            .with_principal(crate::context::Principal::authenticated_unnamed());
        let mut response = ResponseContext::new();

        assert!(antiforgery.get_and_store_tokens(&request, &mut response).await.is_err());
        assert!(response.cookies().is_empty());
        assert!(response.headers.is_empty());
    }
}
