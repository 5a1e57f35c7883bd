//! # Prometheus Metrics
//!
//! Operational metrics for the node, scraped at `/metrics` on the
//! configured metrics port.
//!
//! All metrics live in a dedicated [`prometheus::Registry`] so they do not
//! collide with any default global registry consumers. Counters track
//! committed operations only — an aborted operation increments nothing,
//! mirroring the engine's all-or-nothing semantics.

use axum::http::StatusCode;
use axum::response::IntoResponse;
use prometheus::{Encoder, Histogram, HistogramOpts, IntCounter, IntGauge, Registry, TextEncoder};
use std::sync::Arc;

/// Holds all Prometheus metric handles for the node.
///
/// Clone-friendly (wraps `Arc` internally via prometheus handles) so it can
/// be shared across request handlers.
#[derive(Clone)]
pub struct NodeMetrics {
    /// Prometheus registry that owns all metrics below.
    registry: Registry,
    /// Total vaults created on this node.
    pub vaults_created_total: IntCounter,
    /// Committed deposits.
    pub deposits_total: IntCounter,
    /// Committed withdrawals.
    pub withdrawals_total: IntCounter,
    /// Committed fundings (originating contributions, not cascade hops).
    pub fundings_total: IntCounter,
    /// Committed payouts.
    pub payouts_total: IntCounter,
    /// Current number of vaults in the registry.
    pub vault_count: IntGauge,
    /// Histogram of engine operation latency in seconds, cascade included.
    pub operation_latency_seconds: Histogram,
}

impl NodeMetrics {
    /// Creates and registers all metrics. Call once at startup.
    pub fn new() -> Self {
        let registry = Registry::new_custom(Some("cascade".into()), None)
            .expect("failed to create prometheus registry");

        let vaults_created_total =
            IntCounter::new("vaults_created_total", "Total vaults created on this node")
                .expect("metric creation");
        registry
            .register(Box::new(vaults_created_total.clone()))
            .expect("metric registration");

        let deposits_total = IntCounter::new("deposits_total", "Total committed deposits")
            .expect("metric creation");
        registry
            .register(Box::new(deposits_total.clone()))
            .expect("metric registration");

        let withdrawals_total =
            IntCounter::new("withdrawals_total", "Total committed withdrawals")
                .expect("metric creation");
        registry
            .register(Box::new(withdrawals_total.clone()))
            .expect("metric registration");

        let fundings_total = IntCounter::new(
            "fundings_total",
            "Total committed originating fundings (cascade hops excluded)",
        )
        .expect("metric creation");
        registry
            .register(Box::new(fundings_total.clone()))
            .expect("metric registration");

        let payouts_total = IntCounter::new("payouts_total", "Total committed payouts")
            .expect("metric creation");
        registry
            .register(Box::new(payouts_total.clone()))
            .expect("metric registration");

        let vault_count = IntGauge::new("vault_count", "Current number of vaults in the registry")
            .expect("metric creation");
        registry
            .register(Box::new(vault_count.clone()))
            .expect("metric registration");

        let operation_latency_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "operation_latency_seconds",
                "Engine operation latency in seconds, including the full upstream cascade",
            )
            .buckets(vec![
                0.000_01, 0.000_05, 0.000_1, 0.000_5, 0.001, 0.005, 0.01, 0.05, 0.1,
            ]),
        )
        .expect("metric creation");
        registry
            .register(Box::new(operation_latency_seconds.clone()))
            .expect("metric registration");

        Self {
            registry,
            vaults_created_total,
            deposits_total,
            withdrawals_total,
            fundings_total,
            payouts_total,
            vault_count,
            operation_latency_seconds,
        }
    }

    /// Encodes all registered metrics into the Prometheus text exposition
    /// format.
    pub fn encode(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8(buffer).expect("prometheus output is valid utf-8"))
    }
}

impl Default for NodeMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Shared metrics state passed to axum handlers via extension.
pub type SharedMetrics = Arc<NodeMetrics>;

/// Axum handler that renders `/metrics` in Prometheus text format.
///
/// Returns HTTP 500 if encoding fails (should never happen in practice).
pub async fn metrics_handler(
    axum::extract::State(metrics): axum::extract::State<SharedMetrics>,
) -> impl IntoResponse {
    match metrics.encode() {
        Ok(body) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            body,
        )
            .into_response(),
        Err(e) => {
            tracing::error!("failed to encode metrics: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "metrics encoding failed").into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_start_at_zero_and_increment() {
        let metrics = NodeMetrics::new();
        assert_eq!(metrics.deposits_total.get(), 0);

        metrics.deposits_total.inc();
        metrics.vault_count.set(3);

        assert_eq!(metrics.deposits_total.get(), 1);
        assert_eq!(metrics.vault_count.get(), 3);
    }

    #[test]
    fn encode_produces_prefixed_exposition() {
        let metrics = NodeMetrics::new();
        metrics.vaults_created_total.inc();

        let body = metrics.encode().expect("encode");
        assert!(body.contains("cascade_vaults_created_total"));
    }
}
