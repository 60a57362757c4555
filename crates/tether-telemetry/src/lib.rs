mod metrics;

pub use metrics::{HistogramSummary, MetricsRecorder};

use std::sync::Arc;

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Configuration for the telemetry subsystem.
#[derive(Clone, Debug)]
pub struct TelemetryConfig {
    /// Default log level. Overridden by RUST_LOG env var.
    pub log_level: Level,
    /// Per-module level overrides (e.g. "tether_mux" => DEBUG).
    pub module_levels: Vec<(String, Level)>,
    /// Emit JSON log lines instead of human-readable output.
    pub json_output: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: Level::INFO,
            module_levels: Vec::new(),
            json_output: false,
        }
    }
}

/// Handle to the initialized telemetry subsystem.
pub struct TelemetryGuard {
    metrics_recorder: Arc<MetricsRecorder>,
}

impl TelemetryGuard {
    /// Access the metrics recorder for recording and querying.
    pub fn metrics(&self) -> Arc<MetricsRecorder> {
        self.metrics_recorder.clone()
    }
}

/// Initialize the telemetry subsystem. Call once at startup.
pub fn init_telemetry(config: TelemetryConfig) -> TelemetryGuard {
    let mut filter_str = config.log_level.to_string().to_lowercase();
    for (module, level) in &config.module_levels {
        filter_str.push_str(&format!(",{}={}", module, level.to_string().to_lowercase()));
    }
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&filter_str));

    let fmt_layer = if config.json_output {
        tracing_subscriber::fmt::layer()
            .json()
            .with_target(true)
            .with_span_list(true)
            .with_filter(env_filter)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_filter(env_filter)
            .boxed()
    };

    tracing_subscriber::registry().with(fmt_layer).init();

    TelemetryGuard {
        metrics_recorder: Arc::new(MetricsRecorder::new()),
    }
}
