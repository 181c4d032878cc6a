//! Module: executor
//! Responsibility: run compiled plans against a storage collaborator.
//! Does not own: plan compilation or the storage implementation.
//! Boundary: `QueryExecutor` for reads, `PagingEngine` for page/slice windows,
//! `BulkMutationCoordinator` for set-based statements.

mod load;
mod mutation;
mod window;


use crate::db::query::{Arguments, plan::ParamSlot};
use derive_more::Display;
use thiserror::Error as ThisError;

// re-exports
pub use load::QueryExecutor;
pub use mutation::{BulkMutation, BulkMutationCoordinator, BulkPlan, MutationError};
pub use window::{PageWindow, PagingEngine, compute_page_window};

///
/// ExecutionError
///
/// Per-call failure; never affects the plan cache.
///

#[derive(Clone, Debug, Eq, PartialEq, ThisError)]
#[error("cannot execute '{signature}': {kind}")]
pub struct ExecutionError {
    pub signature: String,
    pub kind: ExecutionErrorKind,
}

impl ExecutionError {
    pub(crate) fn new(signature: &str, kind: ExecutionErrorKind) -> Self {
        Self {
            signature: signature.to_string(),
            kind,
        }
    }
}

///
/// ExecutionErrorKind
///

#[derive(Clone, Debug, Display, Eq, PartialEq)]
pub enum ExecutionErrorKind {
    #[display("argument '{name}' {problem}")]
    ArgumentMismatch {
        name: String,
        problem: ArgumentProblem,
    },

    #[display("expected at most one row, found {rows}")]
    NonUniqueResult { rows: usize },

    #[display("page and slice results require a page request")]
    MissingPageRequest,

    #[display("this result shape does not accept a page request")]
    UnexpectedPageRequest,
}

///
/// ArgumentProblem
///

#[derive(Clone, Copy, Debug, Display, Eq, PartialEq)]
pub enum ArgumentProblem {
    #[display("is missing")]
    Missing,
    #[display("is not a declared parameter")]
    Unexpected,
    #[display("must be a collection")]
    ExpectedCollection,
}

/// Check bound argument names against the plan's parameter slots.
///
/// Every slot must be bound, nothing else may be, and collection slots must
/// receive a list.
pub(crate) fn validate_arguments(
    signature: &str,
    params: &[ParamSlot],
    args: &Arguments,
) -> Result<(), ExecutionError> {
    let mismatch = |name: &str, problem| {
        ExecutionError::new(
            signature,
            ExecutionErrorKind::ArgumentMismatch {
                name: name.to_string(),
                problem,
            },
        )
    };

    for slot in params {
        match args.get(&slot.name) {
            None => return Err(mismatch(&slot.name, ArgumentProblem::Missing)),
            Some(value) if slot.collection && !value.is_list() => {
                return Err(mismatch(&slot.name, ArgumentProblem::ExpectedCollection));
            }
            Some(_) => {}
        }
    }

    if let Some(extra) = args.keys().find(|name| !params.iter().any(|p| &p.name == *name)) {
        return Err(mismatch(extra, ArgumentProblem::Unexpected));
    }

    Ok(())
}
