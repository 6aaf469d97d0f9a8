//! Metrics and tracing setup for strata.
//!
//! Provides a global [`ReplicatorMetrics`] singleton backed by the
//! `prometheus` crate, plus an optional lightweight HTTP server for
//! Prometheus scraping.

use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts, Registry, TextEncoder,
};
use std::net::SocketAddr;
use std::sync::OnceLock;

// ────────────────────────── Tracing ──────────────────────────

/// Initialize the tracing subscriber, honoring `RUST_LOG` when set.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();
}

// ────────────────────────── Prometheus metrics ──────────────────────────

/// Global metrics instance.
static METRICS: OnceLock<ReplicatorMetrics> = OnceLock::new();

/// Retrieve (or lazily create) the global metrics singleton.
pub fn metrics() -> &'static ReplicatorMetrics {
    METRICS.get_or_init(ReplicatorMetrics::new)
}

/// All Prometheus metrics for the replication subsystem of a strata node.
pub struct ReplicatorMetrics {
    pub registry: Registry,

    // ── Request counters ──
    pub replications: IntCounterVec,
    pub replications_ok: IntCounter,
    pub quorum_failures: IntCounter,
    pub timeouts: IntCounter,

    // ── Per-replica counters ──
    pub replica_acks: IntCounter,
    pub replica_failures: IntCounter,

    // ── Repair ──
    pub repair_enqueued: IntCounter,
    pub repair_handled: IntCounter,
    pub repair_dropped: IntCounter,

    // ── Latency ──
    pub replication_latency_secs: HistogramVec,
}

// prometheus types don't derive Debug, so roll a minimal one
impl std::fmt::Debug for ReplicatorMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReplicatorMetrics").finish_non_exhaustive()
    }
}

/// Default histogram buckets (seconds) for replication latency.
const LATENCY_BUCKETS: &[f64] = &[0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0];

impl ReplicatorMetrics {
    fn new() -> Self {
        let registry = Registry::new();

        let replications = IntCounterVec::new(
            Opts::new(
                "strata_replications_total",
                "Replication requests received, by method",
            ),
            &["method"],
        )
        .expect("replications counter vec");
        let replications_ok = IntCounter::with_opts(Opts::new(
            "strata_replication_success_total",
            "Replication requests that met their write quorum",
        ))
        .expect("replications_ok counter");
        let quorum_failures = IntCounter::with_opts(Opts::new(
            "strata_replication_quorum_failures_total",
            "Replication requests whose write quorum became unreachable",
        ))
        .expect("quorum_failures counter");
        let timeouts = IntCounter::with_opts(Opts::new(
            "strata_replication_timeouts_total",
            "Replication requests that hit the request deadline",
        ))
        .expect("timeouts counter");

        let replica_acks = IntCounter::with_opts(Opts::new(
            "strata_replica_acks_total",
            "Per-replica write acknowledgements",
        ))
        .expect("replica_acks counter");
        let replica_failures = IntCounter::with_opts(Opts::new(
            "strata_replica_failures_total",
            "Per-replica write failures (including unreachable targets)",
        ))
        .expect("replica_failures counter");

        let repair_enqueued = IntCounter::with_opts(Opts::new(
            "strata_repair_enqueued_total",
            "Repair events published for failed replicas",
        ))
        .expect("repair_enqueued counter");
        let repair_handled = IntCounter::with_opts(Opts::new(
            "strata_repair_handled_total",
            "Repair events reconciled by the repair worker",
        ))
        .expect("repair_handled counter");
        let repair_dropped = IntCounter::with_opts(Opts::new(
            "strata_repair_dropped_total",
            "Repair events dropped because this node lost charge of the key",
        ))
        .expect("repair_dropped counter");

        let replication_latency_secs = HistogramVec::new(
            HistogramOpts::new(
                "strata_replication_latency_seconds",
                "Replication request latency in seconds",
            )
            .buckets(LATENCY_BUCKETS.to_vec()),
            &["method"],
        )
        .expect("replication_latency_secs histogram");

        // Register all metrics
        registry
            .register(Box::new(replications.clone()))
            .expect("register replications");
        registry
            .register(Box::new(replications_ok.clone()))
            .expect("register replications_ok");
        registry
            .register(Box::new(quorum_failures.clone()))
            .expect("register quorum_failures");
        registry
            .register(Box::new(timeouts.clone()))
            .expect("register timeouts");
        registry
            .register(Box::new(replica_acks.clone()))
            .expect("register replica_acks");
        registry
            .register(Box::new(replica_failures.clone()))
            .expect("register replica_failures");
        registry
            .register(Box::new(repair_enqueued.clone()))
            .expect("register repair_enqueued");
        registry
            .register(Box::new(repair_handled.clone()))
            .expect("register repair_handled");
        registry
            .register(Box::new(repair_dropped.clone()))
            .expect("register repair_dropped");
        registry
            .register(Box::new(replication_latency_secs.clone()))
            .expect("register replication_latency_secs");

        Self {
            registry,
            replications,
            replications_ok,
            quorum_failures,
            timeouts,
            replica_acks,
            replica_failures,
            repair_enqueued,
            repair_handled,
            repair_dropped,
            replication_latency_secs,
        }
    }
}

/// Encode all registered metrics in Prometheus text exposition format.
pub fn encode_metrics() -> String {
    let m = metrics();
    let encoder = TextEncoder::new();
    let mut buf = Vec::new();
    encoder
        .encode(&m.registry.gather(), &mut buf)
        .expect("prometheus text encoding");
    String::from_utf8(buf).expect("prometheus output is valid UTF-8")
}

/// Helper: start a replication latency timer. Returns a guard that records
/// elapsed time on drop.
pub fn start_replication_timer(method: &str) -> prometheus::HistogramTimer {
    metrics()
        .replication_latency_secs
        .with_label_values(&[method])
        .start_timer()
}

// ────────────────────────── Metrics HTTP server ──────────────────────────

use bytes::Bytes;
use http_body_util::Full;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;

async fn metrics_handler(
    _req: Request<hyper::body::Incoming>,
) -> Result<Response<Full<Bytes>>, std::convert::Infallible> {
    let body = encode_metrics();
    Ok(Response::builder()
        .status(StatusCode::OK)
        .header("content-type", "text/plain; version=0.0.4; charset=utf-8")
        .body(Full::new(Bytes::from(body)))
        .expect("valid HTTP response"))
}

/// Serve the metrics in text exposition format on `GET /metrics`.
///
/// A bare HTTP/1.1 server is plenty for a scrape endpoint. Call from a
/// `tokio::spawn`.
pub async fn serve_metrics(
    addr: SocketAddr,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let listener = TcpListener::bind(addr).await?;
    tracing::info!("metrics server listening on http://{}/metrics", addr);

    loop {
        let (stream, _) = listener.accept().await?;
        let io = TokioIo::new(stream);
        tokio::spawn(async move {
            if let Err(e) = http1::Builder::new()
                .serve_connection(io, service_fn(metrics_handler))
                .await
            {
                tracing::debug!("metrics connection error: {}", e);
            }
        });
    }
}

// ────────────────────────── Tests ──────────────────────────
