//! Client Policy Source
//!
//! Resolves a client's token validity and authorized grant types.

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::error::{ClientError, TokenResult};
use crate::types::ClientPolicy;

/// Client policy source interface.
///
/// Unknown clients must fail with [`ClientError::UnknownClient`] rather than
/// resolve to a default policy.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ClientPolicySource: Send + Sync {
    /// Resolve the policy of a client.
    async fn resolve_policy(&self, client_id: &str) -> TokenResult<ClientPolicy>;
}

/// In-memory client policy registry.
#[derive(Default)]
pub struct InMemoryClientPolicySource {
    policies: RwLock<HashMap<String, ClientPolicy>>,
}

impl InMemoryClientPolicySource {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry pre-populated with policies.
    pub fn with_policies(policies: impl IntoIterator<Item = ClientPolicy>) -> Self {
        let policies = policies
            .into_iter()
            .map(|policy| (policy.client_id.clone(), policy))
            .collect();
        Self {
            policies: RwLock::new(policies),
        }
    }

    /// Register or replace a client policy.
    pub async fn register(&self, policy: ClientPolicy) {
        self.policies
            .write()
            .await
            .insert(policy.client_id.clone(), policy);
    }

    /// Remove a client. Returns whether it was registered.
    pub async fn remove(&self, client_id: &str) -> bool {
        self.policies.write().await.remove(client_id).is_some()
    }
}

#[async_trait]
impl ClientPolicySource for InMemoryClientPolicySource {
    async fn resolve_policy(&self, client_id: &str) -> TokenResult<ClientPolicy> {
        self.policies
            .read()
            .await
            .get(client_id)
            .cloned()
            .ok_or_else(|| {
                ClientError::UnknownClient {
                    client_id: client_id.to_string(),
                }
                .into()
            })
    }
}
