//! Prometheus metrics for the peer network.
//!
//! [`NetworkMetrics`] owns a dedicated [`Registry`] that an embedding node
//! can encode into the Prometheus text exposition format.

use prometheus::{
    register_histogram_with_registry, register_int_counter_vec_with_registry,
    register_int_counter_with_registry, register_int_gauge_with_registry, Histogram, HistogramOpts,
    IntCounter, IntCounterVec, IntGauge, Opts, Registry,
};

pub struct NetworkMetrics {
    /// The Prometheus registry that owns every metric below.
    pub registry: Registry,

    // ── Counters ────────────────────────────────────────────────────────
    /// Inbound messages, labelled by message kind.
    pub messages_received: IntCounterVec,
    /// Blocks appended and gossiped (received or mined locally).
    pub blocks_relayed: IntCounter,
    /// Transactions pooled and gossiped.
    pub transactions_relayed: IntCounter,
    pub invalid_blocks: IntCounter,
    pub invalid_transactions: IntCounter,
    /// Transactions shed because syncing was off, the chain was behind, or
    /// the worker pool was saturated.
    pub transactions_dropped: IntCounter,
    /// Requests from peers answered with `CannotSatisfyRequest`.
    pub requests_declined: IntCounter,
    /// Requests we sent to peers.
    pub requests_sent: IntCounter,

    // ── Gauges ──────────────────────────────────────────────────────────
    pub connected_peers: IntGauge,

    // ── Histograms ──────────────────────────────────────────────────────
    /// Time spent in block verification, in milliseconds.
    pub block_verify_time_ms: Histogram,
}

impl NetworkMetrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let messages_received = register_int_counter_vec_with_registry!(
            Opts::new("relay_messages_received_total", "Inbound peer messages by kind"),
            &["kind"],
            registry
        )
        .expect("failed to register messages_received counter");

        let blocks_relayed = register_int_counter_with_registry!(
            Opts::new("relay_blocks_relayed_total", "Blocks appended and gossiped"),
            registry
        )
        .expect("failed to register blocks_relayed counter");

        let transactions_relayed = register_int_counter_with_registry!(
            Opts::new("relay_transactions_relayed_total", "Transactions pooled and gossiped"),
            registry
        )
        .expect("failed to register transactions_relayed counter");

        let invalid_blocks = register_int_counter_with_registry!(
            Opts::new("relay_invalid_blocks_total", "Blocks that failed verification"),
            registry
        )
        .expect("failed to register invalid_blocks counter");

        let invalid_transactions = register_int_counter_with_registry!(
            Opts::new(
                "relay_invalid_transactions_total",
                "Transactions that failed verification"
            ),
            registry
        )
        .expect("failed to register invalid_transactions counter");

        let transactions_dropped = register_int_counter_with_registry!(
            Opts::new(
                "relay_transactions_dropped_total",
                "Transactions dropped without verification by load shedding"
            ),
            registry
        )
        .expect("failed to register transactions_dropped counter");

        let requests_declined = register_int_counter_with_registry!(
            Opts::new("relay_requests_declined_total", "Peer requests declined"),
            registry
        )
        .expect("failed to register requests_declined counter");

        let requests_sent = register_int_counter_with_registry!(
            Opts::new("relay_requests_sent_total", "Requests sent to peers"),
            registry
        )
        .expect("failed to register requests_sent counter");

        let connected_peers = register_int_gauge_with_registry!(
            Opts::new("relay_connected_peers", "Current number of connected peers"),
            registry
        )
        .expect("failed to register connected_peers gauge");

        // 0.5 ms to ~8 s
        let block_verify_time_ms = register_histogram_with_registry!(
            HistogramOpts::new(
                "relay_block_verify_time_ms",
                "Block verification time in milliseconds"
            )
            .buckets(prometheus::exponential_buckets(0.5, 2.0, 15).unwrap()),
            registry
        )
        .expect("failed to register block_verify_time_ms histogram");

        Self {
            registry,
            messages_received,
            blocks_relayed,
            transactions_relayed,
            invalid_blocks,
            invalid_transactions,
            transactions_dropped,
            requests_declined,
            requests_sent,
            connected_peers,
            block_verify_time_ms,
        }
    }
}

impl Default for NetworkMetrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metrics_are_registered_and_independent() {
        let a = NetworkMetrics::new();
        let b = NetworkMetrics::new();
        a.transactions_dropped.inc();
        a.messages_received.with_label_values(&["identify"]).inc();
        assert_eq!(a.transactions_dropped.get(), 1);
        assert_eq!(b.transactions_dropped.get(), 0);
        assert_eq!(a.messages_received.with_label_values(&["identify"]).get(), 1);

        let names: Vec<String> = a.registry.gather().iter().map(|f| f.get_name().to_string()).collect();
        assert!(names.contains(&"relay_transactions_dropped_total".to_string()));
        assert!(names.contains(&"relay_messages_received_total".to_string()));
    }
}
