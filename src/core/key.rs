//! Authentication Key Generation
//!
//! Deterministic fingerprints used to find a previously issued token for an
//! equal authentication.

use sha2::{Digest, Sha256};

use crate::types::{AuthenticationContext, AuthenticationKey};

/// Authentication key generator interface (for dependency injection).
pub trait AuthenticationKeyGenerator: Send + Sync {
    /// Derive the key of an authentication.
    fn extract_key(&self, context: &AuthenticationContext) -> AuthenticationKey;
}

/// Default key generator.
///
/// SHA-256 over client id, principal name and each of the sorted requested
/// scopes, every field length-prefixed.
/// Authorities and extra request parameters are not part of the key.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultAuthenticationKeyGenerator;

impl DefaultAuthenticationKeyGenerator {
    pub fn new() -> Self {
        Self
    }
}

impl AuthenticationKeyGenerator for DefaultAuthenticationKeyGenerator {
    fn extract_key(&self, context: &AuthenticationContext) -> AuthenticationKey {
        let mut hasher = Sha256::new();

        update_field(&mut hasher, b"client_id", context.client_id());
        if let Some(name) = context.principal_name() {
            update_field(&mut hasher, b"username", name);
        }

        // BTreeSet iterates in sorted order
        for scope in context.scope() {
            update_field(&mut hasher, b"scope", scope);
        }

        AuthenticationKey::new(format!("{:x}", hasher.finalize()))
    }
}

/// Length-prefixed so that no two field sequences hash the same input.
fn update_field(hasher: &mut Sha256, label: &[u8], value: &str) {
    hasher.update(label);
    hasher.update((value.len() as u64).to_be_bytes());
    hasher.update(value.as_bytes());
}
