//! Metrics sink boundary.
//!
//! Core DB logic MUST NOT depend on obs::metrics directly.
//! All instrumentation flows through MetricsEvent and MetricsSink.
//!
//! This module is the only allowed bridge between execution logic
//! and the per-thread metrics state.
use crate::obs::metrics;
use std::{cell::RefCell, sync::Arc};

thread_local! {
    static SINK_OVERRIDE: RefCell<Option<Arc<dyn MetricsSink>>> = const { RefCell::new(None) };
}

///
/// ExecKind
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ExecKind {
    Load,
    Count,
    Mutation,
}

///
/// MetricsEvent
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum MetricsEvent<'a> {
    ExecStart {
        kind: ExecKind,
        entity: &'a str,
    },
    ExecFinish {
        kind: ExecKind,
        entity: &'a str,
        rows_touched: u64,
    },
    PlanCompiled {
        entity: &'a str,
        declared: bool,
    },
    PlanCacheHit {
        entity: &'a str,
    },
    CountQuery {
        entity: &'a str,
    },
    CacheInvalidated {
        entity: &'a str,
    },
}

///
/// MetricsSink
///

pub trait MetricsSink: Send + Sync {
    fn record(&self, event: MetricsEvent<'_>);
}

/// GlobalMetricsSink
/// Default sink that writes into this thread's metrics state.
/// Acts as the concrete sink when no scoped override is installed.

pub(crate) struct GlobalMetricsSink;

impl MetricsSink for GlobalMetricsSink {
    fn record(&self, event: MetricsEvent<'_>) {
        match event {
            MetricsEvent::ExecStart { kind, entity } => {
                metrics::with_state_mut(|m| {
                    let entry = m.entities.entry(entity.to_string()).or_default();
                    match kind {
                        ExecKind::Load => {
                            m.ops.load_calls = m.ops.load_calls.saturating_add(1);
                            entry.load_calls = entry.load_calls.saturating_add(1);
                        }
                        ExecKind::Count => {
                            m.ops.count_calls = m.ops.count_calls.saturating_add(1);
                            entry.count_calls = entry.count_calls.saturating_add(1);
                        }
                        ExecKind::Mutation => {
                            m.ops.mutation_calls = m.ops.mutation_calls.saturating_add(1);
                            entry.mutation_calls = entry.mutation_calls.saturating_add(1);
                        }
                    }
                });
            }

            MetricsEvent::ExecFinish {
                kind,
                entity,
                rows_touched,
            } => {
                metrics::with_state_mut(|m| {
                    let entry = m.entities.entry(entity.to_string()).or_default();
                    match kind {
                        ExecKind::Load => {
                            m.ops.rows_loaded = m.ops.rows_loaded.saturating_add(rows_touched);
                            entry.rows_loaded = entry.rows_loaded.saturating_add(rows_touched);
                        }
                        ExecKind::Mutation => {
                            m.ops.rows_mutated = m.ops.rows_mutated.saturating_add(rows_touched);
                            entry.rows_mutated = entry.rows_mutated.saturating_add(rows_touched);
                        }
                        ExecKind::Count => {}
                    }
                });
            }

            MetricsEvent::PlanCompiled { declared, .. } => {
                metrics::with_state_mut(|m| {
                    m.ops.plans_compiled = m.ops.plans_compiled.saturating_add(1);
                    if declared {
                        m.ops.plans_declared = m.ops.plans_declared.saturating_add(1);
                    }
                });
            }

            MetricsEvent::PlanCacheHit { .. } => {
                metrics::with_state_mut(|m| {
                    m.ops.plan_cache_hits = m.ops.plan_cache_hits.saturating_add(1);
                });
            }

            MetricsEvent::CountQuery { .. } => {
                metrics::with_state_mut(|m| {
                    m.ops.count_queries = m.ops.count_queries.saturating_add(1);
                });
            }

            MetricsEvent::CacheInvalidated { .. } => {
                metrics::with_state_mut(|m| {
                    m.ops.cache_invalidations = m.ops.cache_invalidations.saturating_add(1);
                });
            }
        }
    }
}

pub(crate) const GLOBAL_METRICS_SINK: GlobalMetricsSink = GlobalMetricsSink;

pub(crate) fn record(event: MetricsEvent<'_>) {
    let sink = SINK_OVERRIDE.with(|cell| cell.borrow().clone());
    match sink {
        Some(sink) => sink.record(event),
        None => GLOBAL_METRICS_SINK.record(event),
    }
}

/// Snapshot this thread's metrics state for endpoint/test plumbing.
#[must_use]
pub fn metrics_report() -> metrics::EventReport {
    metrics::report()
}

/// Reset this thread's metrics state.
pub fn metrics_reset_all() {
    metrics::reset_all();
}

/// Run a closure with a temporary metrics sink override on this thread.
pub fn with_metrics_sink<T>(sink: Arc<dyn MetricsSink>, f: impl FnOnce() -> T) -> T {
    struct Guard(Option<Arc<dyn MetricsSink>>);

    impl Drop for Guard {
        fn drop(&mut self) {
            let prev = self.0.take();
            SINK_OVERRIDE.with(|cell| {
                *cell.borrow_mut() = prev;
            });
        }
    }

    let prev = SINK_OVERRIDE.with(|cell| cell.borrow_mut().replace(sink));
    let _guard = Guard(prev);

    f()
}

/// Span
/// RAII guard that emits start/finish metrics events for one executor call.
/// Ensures finish accounting happens even on unwind.

pub(crate) struct Span<'a> {
    kind: ExecKind,
    entity: &'a str,
    rows: u64,
}

impl<'a> Span<'a> {
    /// Start a metrics span for a specific entity and executor kind.
    #[must_use]
    pub(crate) fn new(kind: ExecKind, entity: &'a str) -> Self {
        record(MetricsEvent::ExecStart { kind, entity });

        Self {
            kind,
            entity,
            rows: 0,
        }
    }

    pub(crate) const fn set_rows(&mut self, rows: u64) {
        self.rows = rows;
    }
}

impl Drop for Span<'_> {
    fn drop(&mut self) {
        record(MetricsEvent::ExecFinish {
            kind: self.kind,
            entity: self.entity,
            rows_touched: self.rows,
        });
    }
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct CaptureSink {
        events: Mutex<Vec<String>>,
    }

    impl MetricsSink for CaptureSink {
        fn record(&self, event: MetricsEvent<'_>) {
            self.events
                .lock()
                .expect("capture lock")
                .push(format!("{event:?}"));
        }
    }

    #[test]
    fn span_records_start_and_finish_with_rows() {
        metrics_reset_all();
        {
            let mut span = Span::new(ExecKind::Load, "Member");
            span.set_rows(3);
        }

        let report = metrics_report();
        assert_eq!(report.ops.load_calls, 1);
        assert_eq!(report.ops.rows_loaded, 3);
        assert_eq!(report.entity("Member").map(|e| e.rows_loaded), Some(3));
    }

    #[test]
    fn override_sink_captures_and_restores() {
        metrics_reset_all();
        let capture = Arc::new(CaptureSink::default());

        with_metrics_sink(capture.clone(), || {
            record(MetricsEvent::PlanCacheHit { entity: "Member" });
        });
        record(MetricsEvent::PlanCacheHit { entity: "Member" });

        assert_eq!(capture.events.lock().expect("capture lock").len(), 1);
        assert_eq!(metrics_report().ops.plan_cache_hits, 1);
    }
}
