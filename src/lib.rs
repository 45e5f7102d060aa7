//! OAuth2 Token Services
//!
//! Server-side lifecycle engine for OAuth2 access and refresh tokens.
//!
//! # Features
//!
//! - Access token issuance with reuse of live tokens per authentication
//! - Refresh token exchange with scope narrowing (RFC 6749 Section 6)
//! - Optional refresh token rotation
//! - Validation of bearer token values back to their authentication
//! - Revocation and lookup by client or user
//! - Lazy eviction of expired tokens on read
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use oauth2_token_services::{
//!     token_services_config, AuthenticationContext, AuthorizationRequest, ClientPolicy,
//!     DefaultTokenServices, GrantType, InMemoryClientPolicySource, InMemoryTokenStore,
//!     Principal, TokenServices,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = token_services_config()
//!         .access_token_validity_seconds(3600)
//!         .build()?;
//!
//!     let policies = InMemoryClientPolicySource::with_policies([ClientPolicy::new(
//!         "my-client",
//!         vec![GrantType::AuthorizationCode, GrantType::RefreshToken],
//!     )]);
//!
//!     let services = DefaultTokenServices::new(
//!         config,
//!         Arc::new(InMemoryTokenStore::new()),
//!         Arc::new(policies),
//!     );
//!
//!     let context = AuthenticationContext::new(
//!         Principal::new("marissa"),
//!         AuthorizationRequest::new("my-client", ["read"]),
//!     );
//!     let token = services.create_access_token(&context).await?;
//!
//!     let loaded = services.load_authentication(token.value()).await?;
//!     assert_eq!(loaded.principal_name(), Some("marissa"));
//!
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! - `types`: Tokens, authentication contexts, client policies and configuration
//! - `error`: Error hierarchy with OAuth2 error codes
//! - `core`: Clock, token value generation and authentication keys
//! - `policy`: Client policy sources
//! - `token`: Token store, services, revocation and enhancers
//! - `builders`: Fluent builders for configuration
//! - `telemetry`: Metrics

pub mod builders;
pub mod core;
pub mod error;
pub mod policy;
pub mod telemetry;
pub mod token;
pub mod types;

// Re-export builders
pub use builders::{token_services_config, TokenServicesConfigBuilder};

// Re-export errors
pub use error::{
    ClientError, ConfigurationError, GrantError, ScopeError, StorageError, TokenError,
    TokenResult, TokenServiceError,
};

// Re-export types
pub use types::{
    // Token
    AccessToken, RefreshToken, BEARER_TOKEN_TYPE,
    // Auth
    AuthenticationContext, AuthenticationKey, AuthorizationRequest, Principal, RefreshRequest,
    // Client
    ClientPolicy, GrantType,
    // Config
    TokenServicesConfig,
};

// Re-export core components
pub use core::{
    AuthenticationKeyGenerator, Clock, DefaultAuthenticationKeyGenerator, MockClock,
    MockTokenGenerator, RandomTokenGenerator, SystemClock, TokenValueGenerator,
};

// Re-export policy sources
pub use policy::{ClientPolicySource, InMemoryClientPolicySource};

// Re-export token lifecycle
pub use token::{
    create_in_memory_token_store, create_mock_token_store, DefaultTokenServices,
    InMemoryTokenStore, MockTokenStore, TimeoutTokenStore, TokenEnhancer, TokenEnhancerChain,
    TokenRevocation, TokenServices, TokenStore,
};

// Re-export telemetry
pub use telemetry::{InMemoryMetrics, NoOpMetrics, TokenMetrics};
