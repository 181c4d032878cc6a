use serde::{Deserialize, Serialize};
use std::{cell::RefCell, collections::BTreeMap};

///
/// EventState
/// Ephemeral, in-memory counters for engine operations on this thread.
///

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub(crate) struct EventState {
    pub ops: EventOps,
    pub entities: BTreeMap<String, EntityCounters>,
}

///
/// EventOps
///

#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct EventOps {
    // Executor entrypoints
    pub load_calls: u64,
    pub count_calls: u64,
    pub mutation_calls: u64,

    // Planning
    pub plans_compiled: u64,
    pub plans_declared: u64,
    pub plan_cache_hits: u64,

    // Rows touched
    pub rows_loaded: u64,
    pub rows_mutated: u64,

    // Paging and consistency
    pub count_queries: u64,
    pub cache_invalidations: u64,
}

///
/// EntityCounters
///

#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct EntityCounters {
    pub load_calls: u64,
    pub count_calls: u64,
    pub mutation_calls: u64,
    pub rows_loaded: u64,
    pub rows_mutated: u64,
}

///
/// EventReport
/// Point-in-time snapshot of this thread's counters.
///

#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct EventReport {
    pub ops: EventOps,
    pub entities: BTreeMap<String, EntityCounters>,
}

impl EventReport {
    #[must_use]
    pub fn entity(&self, name: &str) -> Option<&EntityCounters> {
        self.entities.get(name)
    }
}

thread_local! {
    static EVENT_STATE: RefCell<EventState> = RefCell::new(EventState::default());
}

/// Borrow metrics mutably.
pub(crate) fn with_state_mut<R>(f: impl FnOnce(&mut EventState) -> R) -> R {
    EVENT_STATE.with(|m| f(&mut m.borrow_mut()))
}

/// Snapshot the current state.
pub(crate) fn report() -> EventReport {
    EVENT_STATE.with(|m| {
        let state = m.borrow();
        EventReport {
            ops: state.ops.clone(),
            entities: state.entities.clone(),
        }
    })
}

/// Reset all counters (useful in tests).
pub(crate) fn reset_all() {
    with_state_mut(|m| *m = EventState::default());
}
