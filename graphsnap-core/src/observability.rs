/*!
Observability infrastructure for graphsnap.

- Structured logging setup on top of `tracing-subscriber`
- Prometheus metrics for serialize and deserialize runs (`metrics` feature)
*/

#[cfg(feature = "metrics")]
use prometheus::{Counter, Encoder, Histogram, HistogramOpts, Registry, TextEncoder};
#[cfg(feature = "metrics")]
use std::sync::OnceLock;
#[cfg(feature = "metrics")]
use std::time::{Duration, Instant};
use tracing::subscriber::set_global_default;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{EnvFilter, Registry as TracingRegistry};

use crate::{GraphSnapError, Result};

/// Filter directive used when `RUST_LOG` is not set
pub const DEFAULT_LOG_DIRECTIVE: &str = "graphsnap=info";

/// Global metrics instance; `None` when construction failed
#[cfg(feature = "metrics")]
static METRICS: OnceLock<Option<GraphSnapMetrics>> = OnceLock::new();

/// Metrics collection for graph serialization
#[cfg(feature = "metrics")]
#[derive(Debug)]
pub struct GraphSnapMetrics {
    pub serialize_total: Counter,
    pub serialize_errors_total: Counter,
    pub deserialize_total: Counter,
    pub deserialize_errors_total: Counter,

    /// Nodes written by serialize runs plus nodes rebuilt by deserialize runs
    pub nodes_total: Counter,
    pub encoded_size_bytes: Histogram,
    pub duration_seconds: Histogram,

    registry: Registry,
}

#[cfg(feature = "metrics")]
fn metric_error(name: &str, e: prometheus::Error) -> GraphSnapError {
    GraphSnapError::validation(format!("Failed to set up metric {name}: {e}"))
}

#[cfg(feature = "metrics")]
impl GraphSnapMetrics {
    fn new() -> Result<Self> {
        let registry = Registry::new();

        let counter = |name: &str, help: &str| -> Result<Counter> {
            let counter = Counter::new(name, help).map_err(|e| metric_error(name, e))?;
            registry
                .register(Box::new(counter.clone()))
                .map_err(|e| metric_error(name, e))?;
            Ok(counter)
        };

        let serialize_total = counter("graphsnap_serialize_total", "Serialize runs started")?;
        let serialize_errors_total =
            counter("graphsnap_serialize_errors_total", "Serialize runs that failed")?;
        let deserialize_total =
            counter("graphsnap_deserialize_total", "Deserialize runs started")?;
        let deserialize_errors_total = counter(
            "graphsnap_deserialize_errors_total",
            "Deserialize runs that failed",
        )?;
        let nodes_total = counter(
            "graphsnap_nodes_total",
            "Nodes written or rebuilt across all runs",
        )?;

        let encoded_size_bytes = Histogram::with_opts(
            HistogramOpts::new(
                "graphsnap_encoded_size_bytes",
                "Size of encoded graph text in bytes",
            )
            .buckets(prometheus::exponential_buckets(64.0, 4.0, 10).map_err(|e| {
                metric_error("graphsnap_encoded_size_bytes", e)
            })?),
        )
        .map_err(|e| metric_error("graphsnap_encoded_size_bytes", e))?;
        registry
            .register(Box::new(encoded_size_bytes.clone()))
            .map_err(|e| metric_error("graphsnap_encoded_size_bytes", e))?;

        let duration_seconds = Histogram::with_opts(HistogramOpts::new(
            "graphsnap_duration_seconds",
            "Duration of serialize and deserialize runs in seconds",
        ))
        .map_err(|e| metric_error("graphsnap_duration_seconds", e))?;
        registry
            .register(Box::new(duration_seconds.clone()))
            .map_err(|e| metric_error("graphsnap_duration_seconds", e))?;

        Ok(Self {
            serialize_total,
            serialize_errors_total,
            deserialize_total,
            deserialize_errors_total,
            nodes_total,
            encoded_size_bytes,
            duration_seconds,
            registry,
        })
    }

    /// Get or initialize the global metrics instance
    pub fn global() -> Option<&'static GraphSnapMetrics> {
        METRICS
            .get_or_init(|| match Self::new() {
                Ok(metrics) => Some(metrics),
                Err(e) => {
                    tracing::warn!("Metrics disabled: {}", e);
                    None
                }
            })
            .as_ref()
    }

    pub fn record_serialize(&self, duration: Duration, nodes: usize, bytes: usize) {
        self.serialize_total.inc();
        self.nodes_total.inc_by(nodes as f64);
        self.encoded_size_bytes.observe(bytes as f64);
        self.duration_seconds.observe(duration.as_secs_f64());
    }

    pub fn record_deserialize(&self, duration: Duration, nodes: usize, bytes: usize) {
        self.deserialize_total.inc();
        self.nodes_total.inc_by(nodes as f64);
        self.encoded_size_bytes.observe(bytes as f64);
        self.duration_seconds.observe(duration.as_secs_f64());
    }

    pub fn record_failure(&self, operation: Operation) {
        match operation {
            Operation::Serialize => self.serialize_errors_total.inc(),
            Operation::Deserialize => self.deserialize_errors_total.inc(),
        }
    }

    /// Gather metrics in Prometheus text format
    pub fn gather_metrics(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();

        encoder
            .encode(&metric_families, &mut buffer)
            .map_err(|e| GraphSnapError::validation(format!("Failed to encode metrics: {e}")))?;

        String::from_utf8(buffer).map_err(|e| {
            GraphSnapError::validation(format!("Failed to convert metrics to string: {e}"))
        })
    }
}

/// Gather the global metrics in Prometheus text format
#[cfg(feature = "metrics")]
pub fn gather_metrics() -> Result<String> {
    GraphSnapMetrics::global()
        .ok_or_else(|| GraphSnapError::validation("Metrics are not available"))?
        .gather_metrics()
}

/// Which half of the engine a run belongs to
#[cfg(feature = "metrics")]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Serialize,
    Deserialize,
}

/// Timer for one serialize or deserialize run
#[cfg(feature = "metrics")]
pub struct MetricsTimer {
    start: Instant,
    operation: Operation,
}

#[cfg(feature = "metrics")]
impl MetricsTimer {
    pub fn start(operation: Operation) -> Self {
        Self {
            start: Instant::now(),
            operation,
        }
    }

    /// Record a successful run
    pub fn finish(self, nodes: usize, bytes: usize) {
        let Some(metrics) = GraphSnapMetrics::global() else {
            return;
        };
        let elapsed = self.start.elapsed();
        match self.operation {
            Operation::Serialize => metrics.record_serialize(elapsed, nodes, bytes),
            Operation::Deserialize => metrics.record_deserialize(elapsed, nodes, bytes),
        }
    }

    /// Record a failed run
    pub fn finish_with_error(self) {
        if let Some(metrics) = GraphSnapMetrics::global() {
            metrics.duration_seconds.observe(self.start.elapsed().as_secs_f64());
            metrics.record_failure(self.operation);
        }
    }
}

/// Initialize the global tracing subscriber.
///
/// Honors `RUST_LOG` and falls back to [`DEFAULT_LOG_DIRECTIVE`]. With `json`
/// set, events are written as JSON lines; otherwise the compact human format
/// is used.
pub fn init_observability(json: bool) -> Result<()> {
    #[cfg(feature = "metrics")]
    GraphSnapMetrics::global();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_DIRECTIVE));

    let result = if json {
        let fmt_layer = tracing_subscriber::fmt::layer()
            .json()
            .with_target(false)
            .with_current_span(false);
        set_global_default(TracingRegistry::default().with(filter).with(fmt_layer))
    } else {
        let fmt_layer = tracing_subscriber::fmt::layer().compact().with_target(false);
        set_global_default(TracingRegistry::default().with(filter).with(fmt_layer))
    };

    result.map_err(|e| {
        GraphSnapError::validation(format!("Failed to set global tracing subscriber: {e}"))
    })?;

    tracing::debug!("graphsnap observability initialized");
    Ok(())
}

#[cfg(all(test, feature = "metrics"))]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_initialization() {
        let metrics = GraphSnapMetrics::global().unwrap();
        metrics.record_serialize(Duration::from_millis(2), 12, 640);
        metrics.record_deserialize(Duration::from_millis(3), 12, 640);
        metrics.record_failure(Operation::Serialize);
    }

    #[test]
    fn test_metrics_timer() {
        let timer = MetricsTimer::start(Operation::Serialize);
        timer.finish(3, 128);

        let timer = MetricsTimer::start(Operation::Deserialize);
        timer.finish_with_error();
    }

    #[test]
    fn test_metrics_gathering() {
        GraphSnapMetrics::global().unwrap().serialize_total.inc();

        let text = gather_metrics().unwrap();
        assert!(text.contains("graphsnap_serialize_total"));
        assert!(text.contains("graphsnap_encoded_size_bytes"));
    }
}
