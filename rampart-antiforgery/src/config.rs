use crate::error::{AntiforgeryError, Result};
use serde::Deserialize;
use std::env;
use std::str::FromStr;

/// Prefix for environment overrides read by [`AntiforgeryConfig::from_env`].
pub const ENV_PREFIX: &str = "RAMPART_ANTIFORGERY";

/// Antiforgery configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AntiforgeryConfig {
    /// Name of the cookie carrying the session token
    pub cookie_name: String,

    /// Form field carrying the form token
    pub form_field_name: String,

    /// Header carrying the form token for non-form submissions
    pub header_name: Option<String>,

    /// Cookie path. Defaults to the request's path base.
    pub cookie_path: Option<String>,

    /// Cookie domain
    pub cookie_domain: Option<String>,

    /// When to mark the cookie `Secure`
    pub cookie_secure: CookieSecurePolicy,

    /// Cookie SameSite policy
    pub cookie_same_site: SameSite,

    /// Cookie lifetime in seconds. `None` issues a session cookie.
    pub cookie_max_age: Option<u64>,

    /// Skip the `X-Frame-Options: SAMEORIGIN` header when tokens are stored
    pub suppress_x_frame_options_header: bool,

    /// Treat authenticated principals without a name or fingerprint as anonymous
    pub suppress_identity_heuristic_checks: bool,

    /// Methods that never need a token
    pub safe_methods: Vec<String>,

    /// Path prefixes excluded from protection
    pub exclude_paths: Vec<String>,
}

/// Cookie SameSite attribute
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SameSite {
    Strict,
    Lax,
    None,
}

impl FromStr for SameSite {
    type Err = AntiforgeryError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "strict" => Ok(SameSite::Strict),
            "lax" => Ok(SameSite::Lax),
            "none" => Ok(SameSite::None),
            _ => Err(AntiforgeryError::Configuration(format!(
                "unknown SameSite policy '{s}'"
            ))),
        }
    }
}

impl From<SameSite> for cookie::SameSite {
    fn from(same_site: SameSite) -> Self {
        match same_site {
            SameSite::Strict => cookie::SameSite::Strict,
            SameSite::Lax => cookie::SameSite::Lax,
            SameSite::None => cookie::SameSite::None,
        }
    }
}

/// When the antiforgery cookie gets the `Secure` attribute
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CookieSecurePolicy {
    /// Secure only when the request arrived over an encrypted channel
    SameAsRequest,
    Always,
    Never,
}

impl CookieSecurePolicy {
    pub fn is_secure(&self, request_is_secure: bool) -> bool {
        match self {
            CookieSecurePolicy::SameAsRequest => request_is_secure,
            CookieSecurePolicy::Always => true,
            CookieSecurePolicy::Never => false,
        }
    }
}

impl FromStr for CookieSecurePolicy {
    type Err = AntiforgeryError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "sameasrequest" | "same_as_request" => Ok(CookieSecurePolicy::SameAsRequest),
            "always" => Ok(CookieSecurePolicy::Always),
            "never" | "none" => Ok(CookieSecurePolicy::Never),
            _ => Err(AntiforgeryError::Configuration(format!(
                "unknown cookie secure policy '{s}'"
            ))),
        }
    }
}

impl AntiforgeryConfig {
    /// Create a configuration with the default names and the most restrictive cookie policy
    pub fn new() -> Self {
        Self {
            cookie_name: ".rampart.antiforgery".to_string(),
            form_field_name: "__RequestVerificationToken".to_string(),
            header_name: Some("RequestVerificationToken".to_string()),
            cookie_path: None,
            cookie_domain: None,
            cookie_secure: CookieSecurePolicy::SameAsRequest,
            cookie_same_site: SameSite::Strict,
            cookie_max_age: None,
            suppress_x_frame_options_header: false,
            suppress_identity_heuristic_checks: false,
            safe_methods: vec![
                "GET".to_string(),
                "HEAD".to_string(),
                "OPTIONS".to_string(),
                "TRACE".to_string(),
            ],
            exclude_paths: Vec::new(),
        }
    }

    /// Load from a TOML document. Missing keys keep their defaults.
    pub fn from_toml_str(source: &str) -> Result<Self> {
        let config: Self = toml::from_str(source)
            .map_err(|e| AntiforgeryError::Configuration(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults overlaid with `RAMPART_ANTIFORGERY_*` environment variables.
    pub fn from_env() -> Result<Self> {
        let config = Self::new().overlay_env(|key| env::var(format!("{ENV_PREFIX}_{key}")).ok())?;
        config.validate()?;
        Ok(config)
    }

    fn overlay_env<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(name) = lookup("COOKIE_NAME") {
            self.cookie_name = name;
        }
        if let Some(name) = lookup("FORM_FIELD_NAME") {
            self.form_field_name = name;
        }
        if let Some(name) = lookup("HEADER_NAME") {
            self.header_name = if name.is_empty() { None } else { Some(name) };
        }
        if let Some(path) = lookup("COOKIE_PATH") {
            self.cookie_path = Some(path);
        }
        if let Some(domain) = lookup("COOKIE_DOMAIN") {
            self.cookie_domain = Some(domain);
        }
        if let Some(policy) = lookup("COOKIE_SECURE") {
            self.cookie_secure = policy.parse()?;
        }
        if let Some(same_site) = lookup("COOKIE_SAME_SITE") {
            self.cookie_same_site = same_site.parse()?;
        }
        if let Some(max_age) = lookup("COOKIE_MAX_AGE") {
            let seconds = max_age.parse::<u64>().map_err(|e| {
                AntiforgeryError::Configuration(format!("invalid cookie max age: {e}"))
            })?;
            self.cookie_max_age = Some(seconds);
        }
        if let Some(flag) = lookup("SUPPRESS_X_FRAME_OPTIONS") {
            self.suppress_x_frame_options_header = flag == "1" || flag.eq_ignore_ascii_case("true");
        }
        Ok(self)
    }

    /// Reject configurations that cannot produce a working cookie/field pair.
    pub fn validate(&self) -> Result<()> {
        if self.cookie_name.trim().is_empty() {
            return Err(AntiforgeryError::Configuration(
                "cookie name must not be empty".to_string(),
            ));
        }
        if self.form_field_name.trim().is_empty() {
            return Err(AntiforgeryError::Configuration(
                "form field name must not be empty".to_string(),
            ));
        }
        if matches!(&self.header_name, Some(name) if name.trim().is_empty()) {
            return Err(AntiforgeryError::Configuration(
                "header name must not be empty when set".to_string(),
            ));
        }
        if self.cookie_same_site == SameSite::None
            && self.cookie_secure != CookieSecurePolicy::Always
        {
            return Err(AntiforgeryError::Configuration(
                "SameSite=None requires an always-secure cookie".to_string(),
            ));
        }
        Ok(())
    }

    /// Set cookie name
    pub fn with_cookie_name(mut self, name: impl Into<String>) -> Self {
        self.cookie_name = name.into();
        self
    }

    /// Set form field name
    pub fn with_form_field_name(mut self, name: impl Into<String>) -> Self {
        self.form_field_name = name.into();
        self
    }

    /// Set header name, or `None` to only accept form fields
    pub fn with_header_name(mut self, name: Option<String>) -> Self {
        self.header_name = name;
        self
    }

    /// Set cookie path
    pub fn with_cookie_path(mut self, path: impl Into<String>) -> Self {
        self.cookie_path = Some(path.into());
        self
    }

    /// Set cookie domain
    pub fn with_cookie_domain(mut self, domain: impl Into<String>) -> Self {
        self.cookie_domain = Some(domain.into());
        self
    }

    /// Set cookie secure policy
    pub fn with_cookie_secure(mut self, policy: CookieSecurePolicy) -> Self {
        self.cookie_secure = policy;
        self
    }

    /// Set cookie SameSite policy
    pub fn with_cookie_same_site(mut self, same_site: SameSite) -> Self {
        self.cookie_same_site = same_site;
        self
    }

    /// Set cookie max age in seconds
    pub fn with_cookie_max_age(mut self, seconds: u64) -> Self {
        self.cookie_max_age = Some(seconds);
        self
    }

    pub fn with_suppress_x_frame_options_header(mut self, suppress: bool) -> Self {
        self.suppress_x_frame_options_header = suppress;
        self
    }

    pub fn with_suppress_identity_heuristic_checks(mut self, suppress: bool) -> Self {
        self.suppress_identity_heuristic_checks = suppress;
        self
    }

    /// Replace safe methods
    pub fn with_safe_methods(mut self, methods: Vec<String>) -> Self {
        self.safe_methods = methods;
        self
    }

    /// Add excluded paths
    pub fn with_exclude_paths(mut self, paths: Vec<String>) -> Self {
        self.exclude_paths = paths;
        self
    }

    /// Whether a request with this method and path must carry a valid token pair.
    pub fn needs_protection(&self, method: &str, path: &str) -> bool {
        if self
            .safe_methods
            .iter()
            .any(|safe| safe.eq_ignore_ascii_case(method))
        {
            return false;
        }

        !self
            .exclude_paths
            .iter()
            .any(|excluded| path.starts_with(excluded.as_str()))
    }
}

impl Default for AntiforgeryConfig {
    fn default() -> Self {
        Self::new()
    }
}
