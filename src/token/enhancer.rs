//! Token Enhancers
//!
//! Hooks that decorate a freshly minted access token before it is stored.

use std::sync::Arc;

use crate::types::{AccessToken, AuthenticationContext};

/// Token enhancer interface.
pub trait TokenEnhancer: Send + Sync {
    /// Return the token to store and hand out in place of `token`.
    fn enhance(&self, token: AccessToken, context: &AuthenticationContext) -> AccessToken;
}

impl<F> TokenEnhancer for F
where
    F: Fn(AccessToken, &AuthenticationContext) -> AccessToken + Send + Sync,
{
    fn enhance(&self, token: AccessToken, context: &AuthenticationContext) -> AccessToken {
        self(token, context)
    }
}

/// Applies enhancers in order, each seeing the previous one's output.
#[derive(Default, Clone)]
pub struct TokenEnhancerChain {
    enhancers: Vec<Arc<dyn TokenEnhancer>>,
}

impl TokenEnhancerChain {
    /// Create an empty chain.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an enhancer.
    pub fn with(mut self, enhancer: Arc<dyn TokenEnhancer>) -> Self {
        self.enhancers.push(enhancer);
        self
    }

    pub fn len(&self) -> usize {
        self.enhancers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.enhancers.is_empty()
    }
}

impl TokenEnhancer for TokenEnhancerChain {
    fn enhance(&self, token: AccessToken, context: &AuthenticationContext) -> AccessToken {
        self.enhancers
            .iter()
            .fold(token, |token, enhancer| enhancer.enhance(token, context))
    }
}
