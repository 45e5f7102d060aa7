//! Token Store
//!
//! Storage contract for issued tokens, with an in-memory reference
//! implementation.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::RwLock;

use crate::core::{Clock, SystemClock};
use crate::error::{StorageError, TokenResult, TokenServiceError};
use crate::types::{AccessToken, AuthenticationContext, AuthenticationKey, RefreshToken};

/// Default number of writes between passive expiry sweeps.
pub const DEFAULT_FLUSH_INTERVAL: u32 = 1000;

/// Token store interface.
///
/// Writes for the same authentication key or token value are serialized by
/// the store. A store may drop expired records on its own, but callers still
/// re-check expiry on everything they read.
#[async_trait]
pub trait TokenStore: Send + Sync {
    /// Store an access token under its value and authentication key.
    ///
    /// Conditional write: when a different token already occupies `key`, nothing
    /// is written and the occupying token is returned. Re-storing a token under
    /// its own value replaces it.
    async fn put_access_token(
        &self,
        key: AuthenticationKey,
        token: AccessToken,
        context: AuthenticationContext,
    ) -> TokenResult<Option<AccessToken>>;

    /// Read an access token by value.
    async fn get_access_token(&self, value: &str) -> TokenResult<Option<AccessToken>>;

    /// Read the access token stored for an authentication key.
    async fn get_access_token_for_key(
        &self,
        key: &AuthenticationKey,
    ) -> TokenResult<Option<AccessToken>>;

    /// Read the authentication an access token was issued for.
    async fn read_authentication(&self, value: &str)
        -> TokenResult<Option<AuthenticationContext>>;

    /// Remove an access token. Returns whether it was present.
    async fn remove_access_token(&self, value: &str) -> TokenResult<bool>;

    /// Remove the access token currently backed by a refresh token.
    async fn remove_access_token_using_refresh_token(&self, refresh_value: &str)
        -> TokenResult<bool>;

    /// Store a refresh token.
    async fn put_refresh_token(
        &self,
        token: RefreshToken,
        context: AuthenticationContext,
    ) -> TokenResult<()>;

    /// Read a refresh token by value.
    async fn get_refresh_token(&self, value: &str) -> TokenResult<Option<RefreshToken>>;

    /// Read the authentication a refresh token was issued for.
    async fn read_authentication_for_refresh_token(
        &self,
        value: &str,
    ) -> TokenResult<Option<AuthenticationContext>>;

    /// Remove a refresh token. Returns whether it was present.
    async fn remove_refresh_token(&self, value: &str) -> TokenResult<bool>;

    /// All access tokens issued to a client.
    async fn find_tokens_by_client_id(&self, client_id: &str) -> TokenResult<Vec<AccessToken>>;

    /// All access tokens issued to a principal through a client.
    async fn find_tokens_by_principal(
        &self,
        client_id: &str,
        principal_name: &str,
    ) -> TokenResult<Vec<AccessToken>>;

    /// Number of stored access tokens.
    async fn access_token_count(&self) -> TokenResult<usize>;

    /// Number of stored refresh tokens.
    async fn refresh_token_count(&self) -> TokenResult<usize>;

    /// Drop every token expired at `now`. Returns the number removed.
    async fn clear_expired(&self, now: DateTime<Utc>) -> TokenResult<u32>;
}

struct AccessEntry {
    key: AuthenticationKey,
    token: AccessToken,
    context: AuthenticationContext,
}

struct RefreshEntry {
    token: RefreshToken,
    context: AuthenticationContext,
}

#[derive(Default)]
struct StoreState {
    access: HashMap<String, AccessEntry>,
    access_by_key: HashMap<AuthenticationKey, String>,
    refresh: HashMap<String, RefreshEntry>,
    access_by_refresh: HashMap<String, String>,
    writes_since_flush: u32,
}

impl StoreState {
    fn put_access(
        &mut self,
        key: AuthenticationKey,
        token: AccessToken,
        context: AuthenticationContext,
    ) -> Option<AccessToken> {
        let value = token.value().to_string();

        if let Some(occupant) = self
            .access_by_key
            .get(&key)
            .filter(|existing| **existing != value)
            .and_then(|existing| self.access.get(existing))
        {
            return Some(occupant.token.clone());
        }

        self.remove_access(&value);

        if let Some(refresh_value) = token.refresh_token_value() {
            self.access_by_refresh
                .insert(refresh_value.to_string(), value.clone());
        }
        self.access_by_key.insert(key.clone(), value.clone());
        self.access.insert(
            value,
            AccessEntry {
                key,
                token,
                context,
            },
        );
        None
    }

    fn remove_access(&mut self, value: &str) -> bool {
        let Some(entry) = self.access.remove(value) else {
            return false;
        };

        if self.access_by_key.get(&entry.key).map(String::as_str) == Some(value) {
            self.access_by_key.remove(&entry.key);
        }
        if let Some(refresh_value) = entry.token.refresh_token_value() {
            if self.access_by_refresh.get(refresh_value).map(String::as_str) == Some(value) {
                self.access_by_refresh.remove(refresh_value);
            }
        }
        true
    }

    fn remove_refresh(&mut self, value: &str) -> bool {
        self.access_by_refresh.remove(value);
        self.refresh.remove(value).is_some()
    }

    fn clear_expired(&mut self, now: DateTime<Utc>) -> u32 {
        let expired_access: Vec<String> = self
            .access
            .iter()
            .filter(|(_, entry)| entry.token.is_expired_at(now))
            .map(|(value, _)| value.clone())
            .collect();
        let expired_refresh: Vec<String> = self
            .refresh
            .iter()
            .filter(|(_, entry)| entry.token.is_expired_at(now))
            .map(|(value, _)| value.clone())
            .collect();

        let mut removed = 0;
        for value in &expired_access {
            if self.remove_access(value) {
                removed += 1;
            }
        }
        for value in &expired_refresh {
            if self.remove_refresh(value) {
                removed += 1;
            }
        }
        removed
    }

    fn find_access<F>(&self, predicate: F) -> Vec<AccessToken>
    where
        F: Fn(&AuthenticationContext) -> bool,
    {
        self.access
            .values()
            .filter(|entry| predicate(&entry.context))
            .map(|entry| entry.token.clone())
            .collect()
    }
}

/// In-memory token store.
///
/// A single lock covers all keys. Every `flush_interval` writes the store
/// sweeps out expired tokens using its clock.
pub struct InMemoryTokenStore {
    state: RwLock<StoreState>,
    clock: Arc<dyn Clock>,
    flush_interval: u32,
}

impl InMemoryTokenStore {
    /// Create new in-memory token store.
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Create store whose passive sweep uses `clock`.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            state: RwLock::new(StoreState::default()),
            clock,
            flush_interval: DEFAULT_FLUSH_INTERVAL,
        }
    }

    /// Set writes between sweeps. Zero disables the sweep.
    pub fn with_flush_interval(mut self, flush_interval: u32) -> Self {
        self.flush_interval = flush_interval;
        self
    }

    /// Remove everything.
    pub async fn clear(&self) {
        *self.state.write().await = StoreState::default();
    }

    fn flush_if_due(&self, state: &mut StoreState) {
        if self.flush_interval == 0 {
            return;
        }
        state.writes_since_flush += 1;
        if state.writes_since_flush >= self.flush_interval {
            state.writes_since_flush = 0;
            let removed = state.clear_expired(self.clock.now());
            if removed > 0 {
                tracing::debug!(removed, "Flushed expired tokens from in-memory store");
            }
        }
    }
}

impl Default for InMemoryTokenStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TokenStore for InMemoryTokenStore {
    async fn put_access_token(
        &self,
        key: AuthenticationKey,
        token: AccessToken,
        context: AuthenticationContext,
    ) -> TokenResult<Option<AccessToken>> {
        let mut state = self.state.write().await;
        self.flush_if_due(&mut state);
        Ok(state.put_access(key, token, context))
    }

    async fn get_access_token(&self, value: &str) -> TokenResult<Option<AccessToken>> {
        let state = self.state.read().await;
        Ok(state.access.get(value).map(|entry| entry.token.clone()))
    }

    async fn get_access_token_for_key(
        &self,
        key: &AuthenticationKey,
    ) -> TokenResult<Option<AccessToken>> {
        let state = self.state.read().await;
        Ok(state
            .access_by_key
            .get(key)
            .and_then(|value| state.access.get(value))
            .map(|entry| entry.token.clone()))
    }

    async fn read_authentication(
        &self,
        value: &str,
    ) -> TokenResult<Option<AuthenticationContext>> {
        let state = self.state.read().await;
        Ok(state.access.get(value).map(|entry| entry.context.clone()))
    }

    async fn remove_access_token(&self, value: &str) -> TokenResult<bool> {
        Ok(self.state.write().await.remove_access(value))
    }

    async fn remove_access_token_using_refresh_token(
        &self,
        refresh_value: &str,
    ) -> TokenResult<bool> {
        let mut state = self.state.write().await;
        match state.access_by_refresh.get(refresh_value).cloned() {
            Some(access_value) => Ok(state.remove_access(&access_value)),
            None => Ok(false),
        }
    }

    async fn put_refresh_token(
        &self,
        token: RefreshToken,
        context: AuthenticationContext,
    ) -> TokenResult<()> {
        let mut state = self.state.write().await;
        self.flush_if_due(&mut state);
        state
            .refresh
            .insert(token.value().to_string(), RefreshEntry { token, context });
        Ok(())
    }

    async fn get_refresh_token(&self, value: &str) -> TokenResult<Option<RefreshToken>> {
        let state = self.state.read().await;
        Ok(state.refresh.get(value).map(|entry| entry.token.clone()))
    }

    async fn read_authentication_for_refresh_token(
        &self,
        value: &str,
    ) -> TokenResult<Option<AuthenticationContext>> {
        let state = self.state.read().await;
        Ok(state.refresh.get(value).map(|entry| entry.context.clone()))
    }

    async fn remove_refresh_token(&self, value: &str) -> TokenResult<bool> {
        Ok(self.state.write().await.remove_refresh(value))
    }

    async fn find_tokens_by_client_id(&self, client_id: &str) -> TokenResult<Vec<AccessToken>> {
        let state = self.state.read().await;
        Ok(state.find_access(|context| context.client_id() == client_id))
    }

    async fn find_tokens_by_principal(
        &self,
        client_id: &str,
        principal_name: &str,
    ) -> TokenResult<Vec<AccessToken>> {
        let state = self.state.read().await;
        Ok(state.find_access(|context| {
            context.client_id() == client_id && context.principal_name() == Some(principal_name)
        }))
    }

    async fn access_token_count(&self) -> TokenResult<usize> {
        Ok(self.state.read().await.access.len())
    }

    async fn refresh_token_count(&self) -> TokenResult<usize> {
        Ok(self.state.read().await.refresh.len())
    }

    async fn clear_expired(&self, now: DateTime<Utc>) -> TokenResult<u32> {
        Ok(self.state.write().await.clear_expired(now))
    }
}

/// Mock token store for testing.
///
/// Behaves like [`InMemoryTokenStore`] and records every call. Failures and
/// latency can be injected.
#[derive(Default)]
pub struct MockTokenStore {
    inner: InMemoryTokenStore,
    call_history: Mutex<Vec<&'static str>>,
    next_error: Mutex<Option<TokenServiceError>>,
    should_fail: Mutex<bool>,
    delay: Mutex<Option<Duration>>,
}

impl MockTokenStore {
    /// Create new mock token store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set next error to return.
    pub fn set_next_error(&self, error: TokenServiceError) -> &Self {
        *self.next_error.lock().unwrap_or_else(PoisonError::into_inner) = Some(error);
        self
    }

    /// Set store to fail all operations.
    pub fn set_should_fail(&self, should_fail: bool) -> &Self {
        *self.should_fail.lock().unwrap_or_else(PoisonError::into_inner) = should_fail;
        self
    }

    /// Delay every operation.
    pub fn set_delay(&self, delay: Option<Duration>) -> &Self {
        *self.delay.lock().unwrap_or_else(PoisonError::into_inner) = delay;
        self
    }

    /// Names of the operations called so far.
    pub fn get_call_history(&self) -> Vec<&'static str> {
        self.call_history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of calls to one operation.
    pub fn call_count(&self, operation: &str) -> usize {
        self.call_history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|called| **called == operation)
            .count()
    }

    async fn check(&self, operation: &'static str) -> TokenResult<()> {
        self.call_history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(operation);

        let delay = *self.delay.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if *self.should_fail.lock().unwrap_or_else(PoisonError::into_inner) {
            return Err(StorageError::Unavailable {
                message: "Mock store failure".to_string(),
            }
            .into());
        }

        let next_error = self
            .next_error
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        match next_error {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl TokenStore for MockTokenStore {
    async fn put_access_token(
        &self,
        key: AuthenticationKey,
        token: AccessToken,
        context: AuthenticationContext,
    ) -> TokenResult<Option<AccessToken>> {
        self.check("put_access_token").await?;
        self.inner.put_access_token(key, token, context).await
    }

    async fn get_access_token(&self, value: &str) -> TokenResult<Option<AccessToken>> {
        self.check("get_access_token").await?;
        self.inner.get_access_token(value).await
    }

    async fn get_access_token_for_key(
        &self,
        key: &AuthenticationKey,
    ) -> TokenResult<Option<AccessToken>> {
        self.check("get_access_token_for_key").await?;
        self.inner.get_access_token_for_key(key).await
    }

    async fn read_authentication(
        &self,
        value: &str,
    ) -> TokenResult<Option<AuthenticationContext>> {
        self.check("read_authentication").await?;
        self.inner.read_authentication(value).await
    }

    async fn remove_access_token(&self, value: &str) -> TokenResult<bool> {
        self.check("remove_access_token").await?;
        self.inner.remove_access_token(value).await
    }

    async fn remove_access_token_using_refresh_token(
        &self,
        refresh_value: &str,
    ) -> TokenResult<bool> {
        self.check("remove_access_token_using_refresh_token").await?;
        self.inner
            .remove_access_token_using_refresh_token(refresh_value)
            .await
    }

    async fn put_refresh_token(
        &self,
        token: RefreshToken,
        context: AuthenticationContext,
    ) -> TokenResult<()> {
        self.check("put_refresh_token").await?;
        self.inner.put_refresh_token(token, context).await
    }

    async fn get_refresh_token(&self, value: &str) -> TokenResult<Option<RefreshToken>> {
        self.check("get_refresh_token").await?;
        self.inner.get_refresh_token(value).await
    }

    async fn read_authentication_for_refresh_token(
        &self,
        value: &str,
    ) -> TokenResult<Option<AuthenticationContext>> {
        self.check("read_authentication_for_refresh_token").await?;
        self.inner.read_authentication_for_refresh_token(value).await
    }

    async fn remove_refresh_token(&self, value: &str) -> TokenResult<bool> {
        self.check("remove_refresh_token").await?;
        self.inner.remove_refresh_token(value).await
    }

    async fn find_tokens_by_client_id(&self, client_id: &str) -> TokenResult<Vec<AccessToken>> {
        self.check("find_tokens_by_client_id").await?;
        self.inner.find_tokens_by_client_id(client_id).await
    }

    async fn find_tokens_by_principal(
        &self,
        client_id: &str,
        principal_name: &str,
    ) -> TokenResult<Vec<AccessToken>> {
        self.check("find_tokens_by_principal").await?;
        self.inner
            .find_tokens_by_principal(client_id, principal_name)
            .await
    }

    async fn access_token_count(&self) -> TokenResult<usize> {
        self.check("access_token_count").await?;
        self.inner.access_token_count().await
    }

    async fn refresh_token_count(&self) -> TokenResult<usize> {
        self.check("refresh_token_count").await?;
        self.inner.refresh_token_count().await
    }

    async fn clear_expired(&self, now: DateTime<Utc>) -> TokenResult<u32> {
        self.check("clear_expired").await?;
        self.inner.clear_expired(now).await
    }
}

/// Create in-memory token store.
pub fn create_in_memory_token_store() -> InMemoryTokenStore {
    InMemoryTokenStore::new()
}

/// Create mock token store for testing.
pub fn create_mock_token_store() -> MockTokenStore {
    MockTokenStore::new()
}
