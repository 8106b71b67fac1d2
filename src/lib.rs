// Rampart - Request forgery defenses for Rust web applications
//
// This library re-exports the Rampart security crates behind feature flags.

#[cfg(feature = "antiforgery")]
pub use rampart_antiforgery as antiforgery;

// Prelude for common imports
#[cfg(feature = "antiforgery")]
pub mod prelude {
    pub use rampart_antiforgery::{
        AdditionalDataProvider,
        Antiforgery,
        AntiforgeryBuilder,
        AntiforgeryConfig,
        AntiforgeryError,
        Claim,
        CookieSecurePolicy,
        CookieToken,
        FailureReason,
        HmacProtector,
        Principal,
        Protector,
        RequestContext,
        RequestTokens,
        ResponseContext,
        SameSite,
        TokenSet,
    };
}
