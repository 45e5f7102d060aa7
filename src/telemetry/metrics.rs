//! Metrics
//!
//! Token service metrics collection interfaces and implementations.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

/// Metric labels.
pub type MetricLabels = HashMap<String, String>;

/// Token service metrics interface.
pub trait TokenMetrics: Send + Sync {
    /// Record a newly minted access token.
    fn record_token_issued(&self, client_id: &str, with_refresh_token: bool);

    /// Record a live access token handed out again instead of minting one.
    fn record_token_reused(&self, client_id: &str);

    /// Record a refresh attempt.
    fn record_token_refresh(&self, client_id: &str, success: bool);

    /// Record a revocation.
    fn record_token_revocation(&self, success: bool);

    /// Record an access token validation.
    fn record_validation(&self, success: bool);

    /// Record an expired token dropped on discovery.
    fn record_lazy_eviction(&self, token_kind: &str);

    /// Record error.
    fn record_error(&self, error_code: &str, operation: &str);
}

/// No-op metrics implementation.
pub struct NoOpMetrics;

impl TokenMetrics for NoOpMetrics {
    fn record_token_issued(&self, _client_id: &str, _with_refresh_token: bool) {}
    fn record_token_reused(&self, _client_id: &str) {}
    fn record_token_refresh(&self, _client_id: &str, _success: bool) {}
    fn record_token_revocation(&self, _success: bool) {}
    fn record_validation(&self, _success: bool) {}
    fn record_lazy_eviction(&self, _token_kind: &str) {}
    fn record_error(&self, _error_code: &str, _operation: &str) {}
}

/// No-op metrics singleton.
pub fn no_op_metrics() -> NoOpMetrics {
    NoOpMetrics
}

/// Metric entry for in-memory storage.
#[derive(Debug, Clone)]
pub struct MetricEntry {
    pub name: String,
    pub value: f64,
    pub labels: MetricLabels,
    pub timestamp: u64,
}

/// In-memory metrics for testing.
pub struct InMemoryMetrics {
    entries: Mutex<Vec<MetricEntry>>,
}

impl InMemoryMetrics {
    /// Create new in-memory metrics.
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
        }
    }

    /// Get all recorded entries.
    pub fn get_entries(&self) -> Vec<MetricEntry> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Get entries by name.
    pub fn get_entries_by_name(&self, name: &str) -> Vec<MetricEntry> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|e| e.name == name)
            .cloned()
            .collect()
    }

    /// Sum of values recorded under a name.
    pub fn total(&self, name: &str) -> f64 {
        self.get_entries_by_name(name).iter().map(|e| e.value).sum()
    }

    /// Clear all entries.
    pub fn clear(&self) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    fn record(&self, name: &str, value: f64, labels: MetricLabels) {
        let now = chrono::Utc::now().timestamp_millis().max(0) as u64;

        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(MetricEntry {
                name: name.to_string(),
                value,
                labels,
                timestamp: now,
            });
    }
}

impl Default for InMemoryMetrics {
    fn default() -> Self {
        Self::new()
    }
}

fn labels<const N: usize>(pairs: [(&str, String); N]) -> MetricLabels {
    pairs
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect()
}

impl TokenMetrics for InMemoryMetrics {
    fn record_token_issued(&self, client_id: &str, with_refresh_token: bool) {
        self.record(
            "oauth2_tokens_issued_total",
            1.0,
            labels([
                ("client_id", client_id.to_string()),
                ("refresh_token", with_refresh_token.to_string()),
            ]),
        );
    }

    fn record_token_reused(&self, client_id: &str) {
        self.record(
            "oauth2_tokens_reused_total",
            1.0,
            labels([("client_id", client_id.to_string())]),
        );
    }

    fn record_token_refresh(&self, client_id: &str, success: bool) {
        self.record(
            "oauth2_token_refreshes_total",
            1.0,
            labels([
                ("client_id", client_id.to_string()),
                ("success", success.to_string()),
            ]),
        );
    }

    fn record_token_revocation(&self, success: bool) {
        self.record(
            "oauth2_token_revocations_total",
            1.0,
            labels([("success", success.to_string())]),
        );
    }

    fn record_validation(&self, success: bool) {
        self.record(
            "oauth2_token_validations_total",
            1.0,
            labels([("success", success.to_string())]),
        );
    }

    fn record_lazy_eviction(&self, token_kind: &str) {
        self.record(
            "oauth2_tokens_evicted_total",
            1.0,
            labels([("kind", token_kind.to_string())]),
        );
    }

    fn record_error(&self, error_code: &str, operation: &str) {
        self.record(
            "oauth2_errors_total",
            1.0,
            labels([
                ("error_code", error_code.to_string()),
                ("operation", operation.to_string()),
            ]),
        );
    }
}

/// Create in-memory metrics for testing.
pub fn create_in_memory_metrics() -> InMemoryMetrics {
    InMemoryMetrics::new()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_op_metrics() {
        let metrics = no_op_metrics();
        // Should not panic
        metrics.record_token_issued("app", true);
        metrics.record_token_refresh("app", false);
        metrics.record_error("invalid_token", "load_authentication");
    }

    #[test]
    fn test_in_memory_metrics() {
        let metrics = InMemoryMetrics::new();

        metrics.record_token_issued("app", true);
        metrics.record_token_reused("app");
        metrics.record_token_reused("app");

        assert_eq!(metrics.get_entries().len(), 3);
        assert_eq!(metrics.total("oauth2_tokens_reused_total"), 2.0);

        let issued = metrics.get_entries_by_name("oauth2_tokens_issued_total");
        assert_eq!(issued.len(), 1);
        assert_eq!(
            issued[0].labels.get("refresh_token"),
            Some(&"true".to_string())
        );
    }

    #[test]
    fn test_clear_entries() {
        let metrics = InMemoryMetrics::new();
        metrics.record_validation(true);

        assert!(!metrics.get_entries().is_empty());
        metrics.clear();
        assert!(metrics.get_entries().is_empty());
    }
}
