//! Token Lifecycle
//!
//! Issuing, validating, refreshing and revoking tokens.
//!
//! This module provides:
//!
//! - **Token Store**: Storage contract and the in-memory implementation
//! - **Timeout Store**: Per-call deadline around any store
//! - **Token Services**: Create, load and refresh operations
//! - **Token Revocation**: Revocation and lookup by client or user
//! - **Token Enhancers**: Hooks that decorate minted access tokens

pub mod enhancer;
pub mod revocation;
pub mod services;
pub mod store;
pub mod timeout;

// Token Store
pub use store::{
    create_in_memory_token_store, create_mock_token_store, InMemoryTokenStore, MockTokenStore,
    TokenStore, DEFAULT_FLUSH_INTERVAL,
};
pub use timeout::{TimeoutTokenStore, DEFAULT_STORE_TIMEOUT};

// Token Services
pub use enhancer::{TokenEnhancer, TokenEnhancerChain};
pub use revocation::TokenRevocation;
pub use services::{DefaultTokenServices, TokenServices};
