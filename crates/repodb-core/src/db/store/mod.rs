//! Module: store
//! Responsibility: the storage collaborator boundary and its request payloads.
//! Does not own: argument validation, result shaping, or cache policy.
//! Boundary: executors call `Storage`; everything behind it is external.

mod memory;


use crate::{
    db::query::{
        Arguments,
        order::SortKey,
        plan::QueryPlan,
        predicate::Filter,
        template::Template,
    },
    error::ErrorClass,
    model::Row,
};
use thiserror::Error as ThisError;

// re-exports
pub use memory::{CountHandler, MemoryStore, MutationHandler, QueryHandler, RequestRecord};

///
/// StorageError
///
/// Failures reported by the collaborator. The engine never retries; these
/// pass through to the caller unchanged.
///

#[derive(Clone, Debug, Eq, PartialEq, ThisError)]
pub enum StorageError {
    #[error("storage operation was cancelled")]
    Cancelled,

    #[error("storage operation timed out")]
    TimedOut,

    #[error("constraint violation: {message}")]
    ConstraintViolation { message: String },

    #[error("unsupported by storage: {message}")]
    Unsupported { message: String },

    #[error("storage failure: {message}")]
    Backend { message: String },
}

impl StorageError {
    pub fn constraint(message: impl Into<String>) -> Self {
        Self::ConstraintViolation {
            message: message.into(),
        }
    }

    pub fn unsupported(message: impl Into<String>) -> Self {
        Self::Unsupported {
            message: message.into(),
        }
    }

    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend {
            message: message.into(),
        }
    }

    #[must_use]
    pub const fn class(&self) -> ErrorClass {
        match self {
            Self::Cancelled | Self::TimedOut => ErrorClass::Unavailable,
            Self::ConstraintViolation { .. } => ErrorClass::Conflict,
            Self::Unsupported { .. } => ErrorClass::Unsupported,
            Self::Backend { .. } => ErrorClass::Internal,
        }
    }
}

///
/// Window
///
/// Rows to skip and the maximum number to return after skipping.
///

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct Window {
    pub offset: u64,
    pub limit: Option<u64>,
}

impl Window {
    #[must_use]
    pub const fn unbounded() -> Self {
        Self {
            offset: 0,
            limit: None,
        }
    }

    #[must_use]
    pub const fn limit(limit: u64) -> Self {
        Self {
            offset: 0,
            limit: Some(limit),
        }
    }
}

///
/// QueryRequest
///
/// One fetch: the plan, bound arguments, the row window, and the effective
/// sort (caller sort, or the plan's order clause, completed by a tie-breaker).
///

#[derive(Clone, Copy, Debug)]
pub struct QueryRequest<'a> {
    pub plan: &'a QueryPlan,
    pub args: &'a Arguments,
    pub window: Window,
    pub sort: &'a [SortKey],
}

///
/// CountRequest
///
/// Count the rows matching `plan`. `template` is the plan's declared count
/// query when one exists; otherwise the store counts the base predicate.
///

#[derive(Clone, Copy, Debug)]
pub struct CountRequest<'a> {
    pub plan: &'a QueryPlan,
    pub args: &'a Arguments,
    pub template: Option<&'a Template>,
}

///
/// MutationStatement
///

#[derive(Clone, Copy, Debug)]
pub enum MutationStatement<'a> {
    /// Declared bulk statement (`update ... set ...`).
    Declared(&'a Template),

    /// Derived `deleteBy...` over a compiled filter.
    DeleteWhere(&'a Filter),
}

///
/// MutationRequest
///

#[derive(Clone, Copy, Debug)]
pub struct MutationRequest<'a> {
    pub entity: &'a str,
    pub statement: MutationStatement<'a>,
    pub args: &'a Arguments,
}

///
/// Storage
///
/// External collaborator that actually resolves plans.
/// `run_mutation` bypasses any object cache the collaborator keeps;
/// `invalidate_cache` drops that cache.
///

pub trait Storage: Send + Sync {
    fn run_query(&self, request: &QueryRequest<'_>) -> Result<Vec<Row>, StorageError>;

    fn run_count(&self, request: &CountRequest<'_>) -> Result<u64, StorageError>;

    /// Execute a set-based statement and return the affected row count.
    fn run_mutation(&self, request: &MutationRequest<'_>) -> Result<u64, StorageError>;

    fn invalidate_cache(&self) {}

    /// Push pending session changes ahead of a bulk statement.
    fn flush(&self) -> Result<(), StorageError> {
        Ok(())
    }
}
