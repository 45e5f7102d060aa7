//! Token Value Generator
//!
//! Opaque token value generation.

use base64::Engine;
use rand::RngCore;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};

/// Token value generator interface (for dependency injection).
pub trait TokenValueGenerator: Send + Sync {
    /// Generate a new unique token value.
    fn generate(&self) -> String;
}

/// Random token generator backed by the thread-local CSPRNG.
pub struct RandomTokenGenerator {
    byte_length: usize,
}

impl RandomTokenGenerator {
    /// Create generator producing 256-bit values.
    pub fn new() -> Self {
        Self::with_byte_length(32)
    }

    /// Create generator with a custom entropy size.
    ///
    /// # Panics
    /// Panics if fewer than 16 bytes (128 bits) are requested.
    pub fn with_byte_length(byte_length: usize) -> Self {
        assert!(
            byte_length >= 16,
            "token values need at least 128 bits of entropy"
        );
        Self { byte_length }
    }
}

impl Default for RandomTokenGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl TokenValueGenerator for RandomTokenGenerator {
    fn generate(&self) -> String {
        let mut bytes = vec![0u8; self.byte_length];
        rand::thread_rng().fill_bytes(&mut bytes);
        base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes)
    }
}

/// Mock token generator for testing.
///
/// Hands out queued values first, then `mock-token-N`.
#[derive(Default)]
pub struct MockTokenGenerator {
    queued: Mutex<VecDeque<String>>,
    counter: AtomicU64,
    generate_history: Mutex<Vec<String>>,
}

impl MockTokenGenerator {
    /// Create new mock token generator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the next value to generate.
    pub fn push_value(&self, value: impl Into<String>) -> &Self {
        self.queued
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(value.into());
        self
    }

    /// Get generate history.
    pub fn get_generate_history(&self) -> Vec<String> {
        self.generate_history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl TokenValueGenerator for MockTokenGenerator {
    fn generate(&self) -> String {
        let value = self
            .queued
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
            .unwrap_or_else(|| {
                format!("mock-token-{}", self.counter.fetch_add(1, Ordering::SeqCst) + 1)
            });

        self.generate_history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(value.clone());
        value
    }
}
