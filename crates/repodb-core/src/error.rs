use crate::{
    config::ConfigError,
    db::{
        executor::{ExecutionError, ExecutionErrorKind, MutationError},
        query::{name::ParseError, plan::CompileError},
        response::{PagingError, ResponseError},
        store::StorageError,
    },
    model::RowDecodeError,
};
use std::fmt;
use thiserror::Error as ThisError;

///
/// Error
///
/// Top-level error for every public entrypoint.
/// Parse and compile failures surface at registration; everything else is
/// per call and never touches the plan cache.
///

#[derive(Debug, ThisError)]
pub enum Error {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Compile(#[from] CompileError),

    #[error(transparent)]
    Execution(#[from] ExecutionError),

    #[error(transparent)]
    Paging(#[from] PagingError),

    #[error(transparent)]
    Mutation(#[from] MutationError),

    #[error(transparent)]
    Response(#[from] ResponseError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Decode(#[from] RowDecodeError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl Error {
    #[must_use]
    pub const fn class(&self) -> ErrorClass {
        match self {
            Self::Parse(_)
            | Self::Compile(_)
            | Self::Paging(_)
            | Self::Response(_)
            | Self::Config(_) => ErrorClass::InvalidInput,
            Self::Execution(err) => match err.kind {
                ExecutionErrorKind::NonUniqueResult { .. } => ErrorClass::Conflict,
                _ => ErrorClass::InvalidInput,
            },
            Self::Mutation(MutationError::ConstraintViolation { .. }) => ErrorClass::Conflict,
            Self::Mutation(MutationError::Storage(err)) | Self::Storage(err) => err.class(),
            Self::Decode(_) => ErrorClass::Unsupported,
        }
    }

    #[must_use]
    pub const fn origin(&self) -> ErrorOrigin {
        match self {
            Self::Parse(_) => ErrorOrigin::Parser,
            Self::Compile(_) => ErrorOrigin::Planner,
            Self::Execution(_) => ErrorOrigin::Executor,
            Self::Paging(_) | Self::Response(_) | Self::Decode(_) => ErrorOrigin::Response,
            Self::Mutation(_) => ErrorOrigin::Mutation,
            Self::Storage(_) => ErrorOrigin::Store,
            Self::Config(_) => ErrorOrigin::Config,
        }
    }

    #[must_use]
    pub fn display_with_class(&self) -> String {
        format!("{}:{}: {self}", self.origin(), self.class())
    }
}

///
/// ErrorClass
/// Coarse classification for callers deciding whether to retry or report.
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ErrorClass {
    InvalidInput,
    Conflict,
    Unavailable,
    Unsupported,
    Internal,
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::InvalidInput => "invalid_input",
            Self::Conflict => "conflict",
            Self::Unavailable => "unavailable",
            Self::Unsupported => "unsupported",
            Self::Internal => "internal",
        };
        write!(f, "{label}")
    }
}

///
/// ErrorOrigin
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ErrorOrigin {
    Parser,
    Planner,
    Executor,
    Response,
    Mutation,
    Store,
    Config,
}

impl fmt::Display for ErrorOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Parser => "parser",
            Self::Planner => "planner",
            Self::Executor => "executor",
            Self::Response => "response",
            Self::Mutation => "mutation",
            Self::Store => "store",
            Self::Config => "config",
        };
        write!(f, "{label}")
    }
}
