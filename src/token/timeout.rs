//! Timeout Token Store
//!
//! Store wrapper that bounds the latency of every call.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::future::Future;
use std::time::Duration;

use crate::error::{StorageError, TokenResult};
use crate::token::TokenStore;
use crate::types::{AccessToken, AuthenticationContext, AuthenticationKey, RefreshToken};

/// Default per-call store timeout.
pub const DEFAULT_STORE_TIMEOUT: Duration = Duration::from_secs(5);

/// Token store wrapper with a per-call deadline.
///
/// A call that outlives the deadline fails with [`StorageError::Timeout`],
/// which callers can tell apart from "not found" and may retry.
pub struct TimeoutTokenStore<S: TokenStore> {
    inner: S,
    timeout: Duration,
}

impl<S: TokenStore> TimeoutTokenStore<S> {
    /// Wrap a store with the default timeout.
    pub fn new(inner: S) -> Self {
        Self::with_timeout(inner, DEFAULT_STORE_TIMEOUT)
    }

    /// Wrap a store with a custom timeout.
    pub fn with_timeout(inner: S, timeout: Duration) -> Self {
        Self { inner, timeout }
    }

    /// Wrapped store.
    pub fn inner(&self) -> &S {
        &self.inner
    }

    async fn bounded<T, F>(&self, operation: &'static str, call: F) -> TokenResult<T>
    where
        T: Send,
        F: Future<Output = TokenResult<T>> + Send,
    {
        match tokio::time::timeout(self.timeout, call).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(operation, timeout = ?self.timeout, "Token store call timed out");
                Err(StorageError::Timeout {
                    operation,
                    timeout: self.timeout,
                }
                .into())
            }
        }
    }
}

#[async_trait]
impl<S: TokenStore> TokenStore for TimeoutTokenStore<S> {
    async fn put_access_token(
        &self,
        key: AuthenticationKey,
        token: AccessToken,
        context: AuthenticationContext,
    ) -> TokenResult<Option<AccessToken>> {
        self.bounded(
            "put_access_token",
            self.inner.put_access_token(key, token, context),
        )
        .await
    }

    async fn get_access_token(&self, value: &str) -> TokenResult<Option<AccessToken>> {
        self.bounded("get_access_token", self.inner.get_access_token(value))
            .await
    }

    async fn get_access_token_for_key(
        &self,
        key: &AuthenticationKey,
    ) -> TokenResult<Option<AccessToken>> {
        self.bounded(
            "get_access_token_for_key",
            self.inner.get_access_token_for_key(key),
        )
        .await
    }

    async fn read_authentication(
        &self,
        value: &str,
    ) -> TokenResult<Option<AuthenticationContext>> {
        self.bounded("read_authentication", self.inner.read_authentication(value))
            .await
    }

    async fn remove_access_token(&self, value: &str) -> TokenResult<bool> {
        self.bounded("remove_access_token", self.inner.remove_access_token(value))
            .await
    }

    async fn remove_access_token_using_refresh_token(
        &self,
        refresh_value: &str,
    ) -> TokenResult<bool> {
        self.bounded(
            "remove_access_token_using_refresh_token",
            self.inner
                .remove_access_token_using_refresh_token(refresh_value),
        )
        .await
    }

    async fn put_refresh_token(
        &self,
        token: RefreshToken,
        context: AuthenticationContext,
    ) -> TokenResult<()> {
        self.bounded(
            "put_refresh_token",
            self.inner.put_refresh_token(token, context),
        )
        .await
    }

    async fn get_refresh_token(&self, value: &str) -> TokenResult<Option<RefreshToken>> {
        self.bounded("get_refresh_token", self.inner.get_refresh_token(value))
            .await
    }

    async fn read_authentication_for_refresh_token(
        &self,
        value: &str,
    ) -> TokenResult<Option<AuthenticationContext>> {
        self.bounded(
            "read_authentication_for_refresh_token",
            self.inner.read_authentication_for_refresh_token(value),
        )
        .await
    }

    async fn remove_refresh_token(&self, value: &str) -> TokenResult<bool> {
        self.bounded(
            "remove_refresh_token",
            self.inner.remove_refresh_token(value),
        )
        .await
    }

    async fn find_tokens_by_client_id(&self, client_id: &str) -> TokenResult<Vec<AccessToken>> {
        self.bounded(
            "find_tokens_by_client_id",
            self.inner.find_tokens_by_client_id(client_id),
        )
        .await
    }

    async fn find_tokens_by_principal(
        &self,
        client_id: &str,
        principal_name: &str,
    ) -> TokenResult<Vec<AccessToken>> {
        self.bounded(
            "find_tokens_by_principal",
            self.inner.find_tokens_by_principal(client_id, principal_name),
        )
        .await
    }

    async fn access_token_count(&self) -> TokenResult<usize> {
        self.bounded("access_token_count", self.inner.access_token_count())
            .await
    }

    async fn refresh_token_count(&self) -> TokenResult<usize> {
        self.bounded("refresh_token_count", self.inner.refresh_token_count())
            .await
    }

    async fn clear_expired(&self, now: DateTime<Utc>) -> TokenResult<u32> {
        self.bounded("clear_expired", self.inner.clear_expired(now))
            .await
    }
}
