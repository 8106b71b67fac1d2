//! Reading and writing tokens on requests and responses.

use crate::config::AntiforgeryConfig;
use crate::context::{RequestContext, ResponseContext};
use crate::error::Result;
use crate::serializer::TokenSerializer;
use crate::token::Token;
use async_trait::async_trait;
use cookie::Cookie;
use std::sync::Arc;
use tracing::debug;

/// Where cookie tokens live between requests and where form tokens arrive.
#[async_trait]
pub trait TokenStore: Send + Sync {
    /// The request's cookie token. A missing, malformed or tampered cookie
    /// reads as `None`.
    async fn read_cookie_token(&self, request: &RequestContext) -> Option<Token>;

    /// A cookie token already written to this response, if any.
    async fn read_issued_cookie_token(&self, response: &ResponseContext) -> Option<Token>;

    /// The raw form token submitted with the request.
    async fn read_form_token(&self, request: &RequestContext) -> Option<String>;

    /// Persist a cookie token on the response.
    async fn write_cookie_token(
        &self,
        request: &RequestContext,
        response: &mut ResponseContext,
        token: &Token,
    ) -> Result<()>;
}

/// Cookie-backed [`TokenStore`].
#[derive(Clone)]
pub struct CookieTokenStore {
    config: Arc<AntiforgeryConfig>,
    serializer: TokenSerializer,
}

impl CookieTokenStore {
    pub fn new(config: Arc<AntiforgeryConfig>, serializer: TokenSerializer) -> Self {
        Self { config, serializer }
    }

    fn decode_cookie(&self, value: &str) -> Option<Token> {
        match self.serializer.deserialize(value) {
            Ok(token) => Some(token),
            Err(error) => {
                debug!(
                    cookie = %self.config.cookie_name,
                    reason = %error.reason(),
                    "ignoring unusable antiforgery cookie"
                );
                None
            }
        }
    }

    fn build_cookie(&self, request: &RequestContext, value: String) -> Cookie<'static> {
        let path = self
            .config
            .cookie_path
            .clone()
            .unwrap_or_else(|| cookie_path_for(&request.path_base));

        let mut builder = Cookie::build((self.config.cookie_name.clone(), value))
            .path(path)
            .http_only(true)
            .secure(self.config.cookie_secure.is_secure(request.is_secure))
            .same_site(cookie::SameSite::from(self.config.cookie_same_site));

        if let Some(ref domain) = self.config.cookie_domain {
            builder = builder.domain(domain.clone());
        }
        if let Some(seconds) = self.config.cookie_max_age {
            let seconds = i64::try_from(seconds).unwrap_or(i64::MAX);
            builder = builder.max_age(cookie::time::Duration::seconds(seconds));
        }

        builder.build()
    }

    fn form_token_from_body(&self, request: &RequestContext) -> Option<String> {
        let field = self.config.form_field_name.as_str();

        match request.content_type().as_deref() {
            Some("application/x-www-form-urlencoded") => {
                serde_urlencoded::from_bytes::<Vec<(String, String)>>(&request.body)
                    .ok()?
                    .into_iter()
                    .find(|(key, _)| key == field)
                    .map(|(_, value)| value)
            }
            Some("application/json") => {
                let json = serde_json::from_slice::<serde_json::Value>(&request.body).ok()?;
                json.get(field)?.as_str().map(str::to_string)
            }
            _ => None,
        }
    }
}

fn cookie_path_for(path_base: &str) -> String {
    if path_base.is_empty() {
        "/".to_string()
    } else {
        path_base.to_string()
    }
}

#[async_trait]
impl TokenStore for CookieTokenStore {
    async fn read_cookie_token(&self, request: &RequestContext) -> Option<Token> {
        let value = request.cookie(&self.config.cookie_name)?;
        self.decode_cookie(&value)
    }

    async fn read_issued_cookie_token(&self, response: &ResponseContext) -> Option<Token> {
        let cookie = response.cookie(&self.config.cookie_name)?;
        self.decode_cookie(cookie.value())
    }

    async fn read_form_token(&self, request: &RequestContext) -> Option<String> {
        let from_header = self
            .config
            .header_name
            .as_deref()
            .and_then(|name| request.header(name))
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(str::to_string);

        from_header
            .or_else(|| self.form_token_from_body(request))
            .filter(|value| !value.is_empty())
    }

    async fn write_cookie_token(
        &self,
        request: &RequestContext,
        response: &mut ResponseContext,
        token: &Token,
    ) -> Result<()> {
        let value = self.serializer.serialize(token)?;
        response.set_cookie(self.build_cookie(request, value));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CookieSecurePolicy, SameSite};
    use crate::protector::HmacProtector;
    use crate::token::SecurityValue;

    fn store(config: AntiforgeryConfig) -> CookieTokenStore {
        let protector = HmacProtector::new(HmacProtector::generate_key()).unwrap();
        CookieTokenStore::new(
            Arc::new(config),
            TokenSerializer::new(Arc::new(protector)),
        )
    }

    #[tokio::test]
    async fn test_missing_cookie_reads_absent() {
        let store = store(AntiforgeryConfig::default());
        let request = RequestContext::new("POST", "/");
        assert!(store.read_cookie_token(&request).await.is_none());
    }

    #[tokio::test]
    async fn test_garbage_cookie_reads_absent() {
        let config = AntiforgeryConfig::default();
        let request = RequestContext::new("POST", "/").with_cookie(&config.cookie_name, "garbage");
        assert!(store(config).read_cookie_token(&request).await.is_none());
    }

    #[tokio::test]
    async fn test_write_then_read_cookie() {
        let store = store(AntiforgeryConfig::default());
        let request = RequestContext::new("GET", "/form");
        let mut response = ResponseContext::new();
        let token = Token::cookie(SecurityValue::generate());

        store.write_cookie_token(&request, &mut response, &token).await.unwrap();
        assert_eq!(store.read_issued_cookie_token(&response).await, Some(token.clone()));

        let cookie = response.cookie(&store.config.cookie_name).unwrap();
        let next = RequestContext::new("POST", "/form").with_cookie(cookie.name(), cookie.value());
        assert_eq!(store.read_cookie_token(&next).await, Some(token));
    }

    #[tokio::test]
    async fn test_cookie_attributes() {
        let store = store(AntiforgeryConfig::default());
        let request = RequestContext::new("GET", "/").with_path_base("/app").secure(true);
        let mut response = ResponseContext::new();
        let token = Token::cookie(SecurityValue::generate());

        store.write_cookie_token(&request, &mut response, &token).await.unwrap();

        let cookie = response.cookie(&store.config.cookie_name).unwrap();
        assert_eq!(cookie.path(), Some("/app"));
        assert_eq!(cookie.http_only(), Some(true));
        assert_eq!(cookie.secure(), Some(true));
        assert_eq!(cookie.same_site(), Some(cookie::SameSite::Strict));
        assert!(cookie.max_age().is_none());
    }

    #[tokio::test]
    async fn test_cookie_not_secure_over_plain_http() {
        let store = store(AntiforgeryConfig::default());
        let request = RequestContext::new("GET", "/");
        let mut response = ResponseContext::new();

        store
            .write_cookie_token(&request, &mut response, &Token::cookie(SecurityValue::generate()))
            .await
            .unwrap();

        let cookie = response.cookie(&store.config.cookie_name).unwrap();
        assert_ne!(cookie.secure(), Some(true));
        assert_eq!(cookie.path(), Some("/"));
    }

    #[tokio::test]
    async fn test_configured_cookie_attributes() {
        let config = AntiforgeryConfig::default()
            .with_cookie_path("/admin")
            .with_cookie_domain("example.com")
            .with_cookie_secure(CookieSecurePolicy::Always)
            .with_cookie_same_site(SameSite::Lax)
            .with_cookie_max_age(3600);
        let store = store(config);
        let mut response = ResponseContext::new();

        store
            .write_cookie_token(
                &RequestContext::new("GET", "/"),
                &mut response,
                &Token::cookie(SecurityValue::generate()),
            )
            .await
            .unwrap();

        let cookie = response.cookie(&store.config.cookie_name).unwrap();
        assert_eq!(cookie.path(), Some("/admin"));
        assert_eq!(cookie.domain(), Some("example.com"));
        assert_eq!(cookie.secure(), Some(true));
        assert_eq!(cookie.same_site(), Some(cookie::SameSite::Lax));
        assert_eq!(cookie.max_age(), Some(cookie::time::Duration::seconds(3600)));
    }

    #[tokio::test]
    async fn test_write_is_idempotent() {
        let store = store(AntiforgeryConfig::default());
        let request = RequestContext::new("GET", "/");
        let mut response = ResponseContext::new();
        let token = Token::cookie(SecurityValue::generate());

        store.write_cookie_token(&request, &mut response, &token).await.unwrap();
        store.write_cookie_token(&request, &mut response, &token).await.unwrap();

        assert_eq!(response.cookies().len(), 1);
    }

    #[tokio::test]
    async fn test_form_token_from_header_first() {
        let store = store(AntiforgeryConfig::default());
        let request = RequestContext::new("POST", "/")
            .with_header("requestverificationtoken", "from-header")
            .with_form(&[("__RequestVerificationToken", "from-form")]);

        assert_eq!(
            store.read_form_token(&request).await.as_deref(),
            Some("from-header")
        );
    }

    #[tokio::test]
    async fn test_form_token_from_form_body() {
        let store = store(AntiforgeryConfig::default());
        let request = RequestContext::new("POST", "/")
            .with_form(&[("name", "x"), ("__RequestVerificationToken", "from-form")]);

        assert_eq!(store.read_form_token(&request).await.as_deref(), Some("from-form"));
    }

    #[tokio::test]
    async fn test_form_token_from_json_body() {
        let store = store(AntiforgeryConfig::default());
        let request = RequestContext::new("POST", "/")
            .with_header("Content-Type", "application/json; charset=utf-8")
            .with_body(r#"{"__RequestVerificationToken":"from-json"}"#);

        assert_eq!(store.read_form_token(&request).await.as_deref(), Some("from-json"));
    }

    #[tokio::test]
    async fn test_form_token_ignored_for_other_content_types() {
        let store = store(AntiforgeryConfig::default());
        let request = RequestContext::new("POST", "/")
            .with_header("Content-Type", "text/plain")
            .with_body("__RequestVerificationToken=abc");

        assert!(store.read_form_token(&request).await.is_none());
    }

    #[tokio::test]
    async fn test_header_disabled() {
        let store = store(AntiforgeryConfig::default().with_header_name(None));
        let request =
            RequestContext::new("POST", "/").with_header("RequestVerificationToken", "abc");

        assert!(store.read_form_token(&request).await.is_none());
    }
}
