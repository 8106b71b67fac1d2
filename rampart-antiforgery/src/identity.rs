//! Identity and extension collaborators.

use crate::context::{Claim, Principal, RequestContext};
use async_trait::async_trait;
use sha2::{Digest, Sha256};

/// Claim types that uniquely identify a principal, in priority order.
pub const UNIQUE_IDENTIFIER_CLAIMS: [&str; 3] = ["sub", "nameid", "upn"];

/// Maps a principal to a stable byte fingerprint.
pub trait ClaimFingerprintExtractor: Send + Sync {
    fn extract(&self, principal: &Principal) -> Option<Vec<u8>>;
}

/// SHA-256 fingerprint over the principal's identifying claims.
///
/// Uses the first of [`UNIQUE_IDENTIFIER_CLAIMS`] that is present. Without one,
/// every claim is hashed in sorted order.
#[derive(Debug, Clone, Copy, Default)]
pub struct Sha256ClaimFingerprint;

impl ClaimFingerprintExtractor for Sha256ClaimFingerprint {
    fn extract(&self, principal: &Principal) -> Option<Vec<u8>> {
        if !principal.is_authenticated() || principal.claims().is_empty() {
            return None;
        }

        let unique = UNIQUE_IDENTIFIER_CLAIMS.iter().find_map(|claim_type| {
            principal
                .claims()
                .iter()
                .find(|claim| claim.claim_type == *claim_type)
        });

        let mut hasher = Sha256::new();
        match unique {
            Some(claim) => hash_claim(&mut hasher, claim),
            None => {
                let mut claims: Vec<&Claim> = principal.claims().iter().collect();
                claims.sort_by(|a, b| {
                    (&a.claim_type, &a.value, &a.issuer).cmp(&(&b.claim_type, &b.value, &b.issuer))
                });
                for claim in claims {
                    hash_claim(&mut hasher, claim);
                }
            }
        }

        Some(hasher.finalize().to_vec())
    }
}

fn hash_claim(hasher: &mut Sha256, claim: &Claim) {
    for part in [
        claim.claim_type.as_str(),
        claim.value.as_str(),
        claim.issuer.as_deref().unwrap_or(""),
    ] {
        hasher.update((part.len() as u64).to_be_bytes());
        hasher.update(part.as_bytes());
    }
}

/// Extension hook binding extra request-specific data into form tokens.
#[async_trait]
pub trait AdditionalDataProvider: Send + Sync {
    /// Data to embed in a new form token.
    async fn produce(&self, request: &RequestContext) -> Option<String>;

    /// Whether a submitted form token's data is acceptable for this request.
    async fn validate(&self, request: &RequestContext, additional_data: Option<&str>) -> bool;
}
