//! Module: response
//! Responsibility: shaped query results and their typed accessors.
//! Does not own: fetching, paging arithmetic, or mutation execution.
//! Boundary: values handed back from `Repository::invoke` and friends.

mod page;

#[cfg(test)]
mod tests;

use crate::{
    error::Error,
    model::{FromRow, Row},
};
use serde::Serialize;
use thiserror::Error as ThisError;

// re-exports
pub use page::{PageRequest, PageResult, PageTotal, PagingError};

///
/// ResponseError
/// Errors related to interpreting a shaped result.
///

#[derive(Clone, Debug, Eq, PartialEq, ThisError)]
pub enum ResponseError {
    #[error("expected a {expected} result, found {found}")]
    ShapeMismatch {
        expected: &'static str,
        found: &'static str,
    },
}

///
/// BulkMutationResult
///

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize)]
pub struct BulkMutationResult {
    pub affected_rows: u64,
    pub cache_invalidated: bool,
}

///
/// QueryResult
///
/// Result of one plan invocation, wrapped by the plan's declared shape.
/// `Single(None)` and `Optional(None)` both mean "no row"; the variant keeps
/// the caller's declared intent.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum QueryResult {
    Single(Option<Row>),
    Optional(Option<Row>),
    List(Vec<Row>),
    Page(PageResult<Row>),
    Slice(PageResult<Row>),
    Count(u64),
    Exists(bool),
    Mutation(BulkMutationResult),
}

impl QueryResult {
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Single(_) => "single",
            Self::Optional(_) => "optional",
            Self::List(_) => "list",
            Self::Page(_) => "page",
            Self::Slice(_) => "slice",
            Self::Count(_) => "count",
            Self::Exists(_) => "exists",
            Self::Mutation(_) => "mutation",
        }
    }

    /// Rows carried by this result, in order.
    #[must_use]
    pub fn rows(&self) -> &[Row] {
        match self {
            Self::Single(row) | Self::Optional(row) => row.as_slice(),
            Self::List(rows) => rows,
            Self::Page(page) | Self::Slice(page) => page.content(),
            Self::Count(_) | Self::Exists(_) | Self::Mutation(_) => &[],
        }
    }

    /// Decode a `Single` or `Optional` result.
    pub fn into_single<T: FromRow>(self) -> Result<Option<T>, Error> {
        match self {
            Self::Single(row) | Self::Optional(row) => Ok(row.map(T::from_row).transpose()?),
            other => Err(other.mismatch("single")),
        }
    }

    /// Decode every row of a list, page, or slice result.
    pub fn into_list<T: FromRow>(self) -> Result<Vec<T>, Error> {
        let rows = match self {
            Self::List(rows) => rows,
            Self::Page(page) | Self::Slice(page) => page.into_content(),
            other => return Err(other.mismatch("list")),
        };

        Ok(rows
            .into_iter()
            .map(T::from_row)
            .collect::<Result<Vec<_>, _>>()?)
    }

    /// Decode a page or slice result, keeping its paging metadata.
    pub fn into_page<T: FromRow>(self) -> Result<PageResult<T>, Error> {
        match self {
            Self::Page(page) | Self::Slice(page) => Ok(page.try_map(T::from_row)?),
            other => Err(other.mismatch("page")),
        }
    }

    pub fn into_count(self) -> Result<u64, Error> {
        match self {
            Self::Count(n) => Ok(n),
            other => Err(other.mismatch("count")),
        }
    }

    pub fn into_exists(self) -> Result<bool, Error> {
        match self {
            Self::Exists(found) => Ok(found),
            other => Err(other.mismatch("exists")),
        }
    }

    pub fn into_mutation(self) -> Result<BulkMutationResult, Error> {
        match self {
            Self::Mutation(result) => Ok(result),
            other => Err(other.mismatch("mutation")),
        }
    }

    fn mismatch(&self, expected: &'static str) -> Error {
        ResponseError::ShapeMismatch {
            expected,
            found: self.label(),
        }
        .into()
    }
}
