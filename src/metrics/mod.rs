//! Prometheus metrics for monitoring
//!
//! Exposes metrics for:
//! - Chain health and finalized block heights
//! - Chain adapter calls and their latency
//! - Swap lifecycle and event reordering

use crate::events::ChainEvent;
use crate::swap::SwapState;

use axum::{routing::get, Router};
use lazy_static::lazy_static;
use prometheus::{
    register_counter_vec, register_gauge, register_gauge_vec, register_histogram_vec,
    CounterVec, Encoder, Gauge, GaugeVec, HistogramVec, TextEncoder,
};
use std::net::SocketAddr;
use tracing::info;

lazy_static! {
    // Chain metrics
    pub static ref CHAIN_HEALTHY: GaugeVec = register_gauge_vec!(
        "portal_chain_healthy",
        "Chain adapter health (1=healthy, 0=unhealthy)",
        &["chain"]
    ).unwrap();

    pub static ref CHAIN_BLOCK_HEIGHT: GaugeVec = register_gauge_vec!(
        "portal_chain_block_height",
        "Latest finalized block height per chain",
        &["chain"]
    ).unwrap();

    pub static ref CHAIN_CALLS: CounterVec = register_counter_vec!(
        "portal_chain_calls_total",
        "Chain adapter calls by operation and outcome",
        &["chain", "operation", "outcome"]
    ).unwrap();

    pub static ref CHAIN_CALL_LATENCY: HistogramVec = register_histogram_vec!(
        "portal_chain_call_latency_seconds",
        "Chain adapter call latency, including time queued behind the chain's lock",
        &["chain", "operation"],
        vec![0.05, 0.1, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0]
    ).unwrap();

    // Event metrics
    pub static ref EVENTS_RECEIVED: CounterVec = register_counter_vec!(
        "portal_events_received_total",
        "Total events received by chain and type",
        &["chain", "event_type"]
    ).unwrap();

    pub static ref EVENTS_QUEUED: CounterVec = register_counter_vec!(
        "portal_events_queued_total",
        "Swap events buffered until their predecessors arrive",
        &["state"]
    ).unwrap();

    pub static ref EVENTS_STALE: CounterVec = register_counter_vec!(
        "portal_events_stale_total",
        "Swap events dropped because the swap had already moved past them",
        &["state"]
    ).unwrap();

    pub static ref QUEUE_DEPTH: Gauge = register_gauge!(
        "portal_event_queue_depth",
        "Swap events currently buffered"
    ).unwrap();

    // Swap metrics
    pub static ref SWAPS_MATCHED: CounterVec = register_counter_vec!(
        "portal_swaps_matched_total",
        "Swaps matched involving the local party",
        &["role"]
    ).unwrap();

    pub static ref SWAP_TRANSITIONS: CounterVec = register_counter_vec!(
        "portal_swap_transitions_total",
        "Swap state transitions applied",
        &["state"]
    ).unwrap();

    pub static ref SWAPS_COMPLETED: CounterVec = register_counter_vec!(
        "portal_swaps_completed_total",
        "Swaps that reached seekerSettled",
        &[]
    ).unwrap();

    pub static ref SWAPS_FAILED: CounterVec = register_counter_vec!(
        "portal_swaps_failed_total",
        "Swaps halted by an error",
        &["kind"]
    ).unwrap();

    // Health metrics
    pub static ref HEALTH_CHECK_SUCCESS: CounterVec = register_counter_vec!(
        "portal_health_check_success_total",
        "Total successful health checks",
        &[]
    ).unwrap();

    pub static ref HEALTH_CHECK_FAILURE: CounterVec = register_counter_vec!(
        "portal_health_check_failure_total",
        "Total failed health checks",
        &[]
    ).unwrap();
}

/// Prometheus metrics server
pub struct MetricsServer {
    port: u16,
}

impl MetricsServer {
    pub fn new(port: u16) -> Self {
        Self { port }
    }

    pub async fn run(&self) -> anyhow::Result<()> {
        let app = Router::new().route("/metrics", get(metrics_handler));

        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        info!("Starting metrics server on {}", addr);

        let listener = tokio::net::TcpListener::bind(&addr).await?;
        axum::serve(listener, app).await?;

        Ok(())
    }
}

async fn metrics_handler() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        return format!("# failed to encode metrics: {}\n", e);
    }
    String::from_utf8_lossy(&buffer).into_owned()
}

// Helper functions to record metrics

pub fn record_chain_health(chain: &str, healthy: bool) {
    CHAIN_HEALTHY
        .with_label_values(&[chain])
        .set(if healthy { 1.0 } else { 0.0 });
}

pub fn record_block_height(chain: &str, height: u64) {
    CHAIN_BLOCK_HEIGHT
        .with_label_values(&[chain])
        .set(height as f64);
}

pub fn record_chain_call(chain: &str, operation: &str, success: bool, latency_secs: f64) {
    let outcome = if success { "ok" } else { "error" };
    CHAIN_CALLS
        .with_label_values(&[chain, operation, outcome])
        .inc();
    CHAIN_CALL_LATENCY
        .with_label_values(&[chain, operation])
        .observe(latency_secs);
}

pub fn record_event(event: &ChainEvent) {
    EVENTS_RECEIVED
        .with_label_values(&[event.chain(), event.name()])
        .inc();
}

pub fn record_event_queued(state: SwapState) {
    EVENTS_QUEUED.with_label_values(&[state.name()]).inc();
}

pub fn record_event_stale(state: SwapState) {
    EVENTS_STALE.with_label_values(&[state.name()]).inc();
}

pub fn record_queue_depth(depth: usize) {
    QUEUE_DEPTH.set(depth as f64);
}

pub fn record_swap_matched(role: &str) {
    SWAPS_MATCHED.with_label_values(&[role]).inc();
}

pub fn record_transition(state: SwapState) {
    SWAP_TRANSITIONS.with_label_values(&[state.name()]).inc();
}

pub fn record_swap_completed() {
    SWAPS_COMPLETED.with_label_values(&[]).inc();
}

pub fn record_swap_failed(kind: &str) {
    SWAPS_FAILED.with_label_values(&[kind]).inc();
}

pub fn record_health_check() {
    HEALTH_CHECK_SUCCESS.with_label_values(&[]).inc();
}

pub fn record_health_check_failure() {
    HEALTH_CHECK_FAILURE.with_label_values(&[]).inc();
}
