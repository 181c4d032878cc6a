//! Observability: runtime telemetry (metrics) and sink abstractions.
//!
//! Engine code never touches the counter state directly; every event goes
//! through `sink::record`.

pub(crate) mod metrics;
pub(crate) mod sink;

// re-exports
pub use metrics::{EntityCounters, EventOps, EventReport};
pub use sink::{
    ExecKind, MetricsEvent, MetricsSink, metrics_report, metrics_reset_all, with_metrics_sink,
};
