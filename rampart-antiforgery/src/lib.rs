//! # Rampart Antiforgery
//!
//! Cross-Site Request Forgery (CSRF) protection using the double-submit
//! cookie pattern.
//!
//! ## Features
//!
//! - ✅ **Paired Tokens** - A cookie token and form tokens sharing a 128-bit secret
//! - ✅ **Tamper-Evident** - Tokens are authenticated with HMAC-SHA256 before leaving the server
//! - ✅ **Identity Binding** - Form tokens are tied to the authenticated user
//! - ✅ **Constant-Time Checks** - Secret and fingerprint comparisons never short-circuit
//! - ✅ **Extensible** - Pluggable token store, claim fingerprint and additional data hooks
//! - ✅ **Configurable** - Cookie attributes, field and header names, env and TOML loading
//!
//! ## Quick Start
//!
//! ```rust
//! use rampart_antiforgery::{Antiforgery, HmacProtector};
//! use std::sync::Arc;
//!
//! let protector = HmacProtector::new(HmacProtector::generate_key()).unwrap();
//! let antiforgery = Antiforgery::builder(Arc::new(protector)).build().unwrap();
//!
//! assert_eq!(antiforgery.config().form_field_name, "__RequestVerificationToken");
//! ```
//!
//! ## Rendering a Form
//!
//! ```rust
//! use rampart_antiforgery::{Antiforgery, HmacProtector, RequestContext, ResponseContext};
//! use std::sync::Arc;
//!
//! # tokio_test::block_on(async {
//! let protector = HmacProtector::new(HmacProtector::generate_key()).unwrap();
//! let antiforgery = Antiforgery::builder(Arc::new(protector)).build().unwrap();
//!
//! let request = RequestContext::new("GET", "/transfer");
//! let mut response = ResponseContext::new();
//!
//! // Sets the antiforgery cookie on the response when the request had none
//! let input = antiforgery
//!     .render_protected_input(&request, &mut response)
//!     .await
//!     .unwrap();
//!
//! assert!(input.starts_with(r#"<input name="__RequestVerificationToken""#));
//! assert_eq!(response.cookies().len(), 1);
//! # });
//! ```
//!
//! ## Validating a Submission
//!
//! ```rust
//! use rampart_antiforgery::{Antiforgery, FailureReason, HmacProtector, RequestContext, ResponseContext};
//! use std::sync::Arc;
//!
//! # tokio_test::block_on(async {
//! let protector = HmacProtector::new(HmacProtector::generate_key()).unwrap();
//! let antiforgery = Antiforgery::builder(Arc::new(protector)).build().unwrap();
//!
//! let mut response = ResponseContext::new();
//! let tokens = antiforgery
//!     .get_and_store_tokens(&RequestContext::new("GET", "/"), &mut response)
//!     .await
//!     .unwrap();
//! let cookie = response.cookie(&antiforgery.config().cookie_name).unwrap();
//!
//! let submit = RequestContext::new("POST", "/")
//!     .with_cookie(cookie.name(), cookie.value())
//!     .with_form(&[(tokens.form_field_name.as_str(), tokens.form_token.as_str())]);
//! assert!(antiforgery.validate_request(&submit).await.is_ok());
//!
//! // A cross-site submission carries the cookie but cannot know the form token
//! let forged = RequestContext::new("POST", "/").with_cookie(cookie.name(), cookie.value());
//! let error = antiforgery.validate_request(&forged).await.unwrap_err();
//! assert_eq!(error.reason(), Some(FailureReason::MissingFormToken));
//! assert_eq!(error.status_code(), 400);
//! # });
//! ```

pub mod config;
pub mod context;
pub mod error;
pub mod html;
pub mod identity;
pub mod protector;
pub mod provider;
pub mod serializer;
pub mod store;
pub mod token;
pub mod worker;

pub use config::{AntiforgeryConfig, CookieSecurePolicy, SameSite};
pub use context::{Claim, Principal, RequestContext, ResponseContext};
pub use error::{AntiforgeryError, FailureReason, ProtectorError, Result, TokenError};
pub use identity::{AdditionalDataProvider, ClaimFingerprintExtractor, Sha256ClaimFingerprint};
pub use protector::{HmacProtector, Protector};
pub use provider::TokenProvider;
pub use serializer::TokenSerializer;
pub use store::{CookieTokenStore, TokenStore};
pub use token::{CookieToken, SecurityValue, SerializedTokenSet, Token, TokenSet};
pub use worker::{Antiforgery, AntiforgeryBuilder, RequestTokens};
