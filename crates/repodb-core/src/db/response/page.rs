//! Module: response::page
//! Responsibility: page request validation and paged/sliced result payloads.
//! Does not own: window arithmetic or count resolution (see `executor::window`).
//! Boundary: caller-facing paging DTOs.

use crate::db::query::order::SortKey;
use serde::{Deserialize, Serialize};
use thiserror::Error as ThisError;

///
/// PagingError
///

#[derive(Clone, Copy, Debug, Eq, PartialEq, ThisError)]
pub enum PagingError {
    #[error("page size must be at least 1, got {size}")]
    InvalidPageSize { size: i64 },

    #[error("page index must not be negative, got {index}")]
    InvalidPageIndex { index: i64 },
}

///
/// PageRequest
///
/// Zero-based page index, positive page size, caller sort, and an optional
/// tie-breaker key that completes the sort. Only constructible through
/// validated paths, deserialization included.
///

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(try_from = "RawPageRequest")]
pub struct PageRequest {
    page_index: u32,
    page_size: u32,
    sort: Vec<SortKey>,
    tie_breaker: Option<SortKey>,
}

impl PageRequest {
    /// Build a request for zero-based `index` holding `size` rows.
    pub fn of(index: i64, size: i64) -> Result<Self, PagingError> {
        let page_size = u32::try_from(size)
            .ok()
            .filter(|s| *s > 0)
            .ok_or(PagingError::InvalidPageSize { size })?;
        let page_index =
            u32::try_from(index).map_err(|_| PagingError::InvalidPageIndex { index })?;

        Ok(Self {
            page_index,
            page_size,
            sort: Vec::new(),
            tie_breaker: None,
        })
    }

    /// Build a request from a 1-based page number.
    pub fn of_one_indexed(number: i64, size: i64) -> Result<Self, PagingError> {
        if number < 1 {
            return Err(PagingError::InvalidPageIndex { index: number });
        }

        Self::of(number - 1, size)
    }

    #[must_use]
    pub fn sorted_by(mut self, key: SortKey) -> Self {
        self.sort.push(key);
        self
    }

    #[must_use]
    pub fn with_sort(mut self, sort: Vec<SortKey>) -> Self {
        self.sort = sort;
        self
    }

    /// Secondary key appended to the sort so page boundaries are stable.
    #[must_use]
    pub fn with_tie_breaker(mut self, key: SortKey) -> Self {
        self.tie_breaker = Some(key);
        self
    }

    #[must_use]
    pub const fn page_index(&self) -> u32 {
        self.page_index
    }

    #[must_use]
    pub const fn page_size(&self) -> u32 {
        self.page_size
    }

    #[must_use]
    pub fn sort(&self) -> &[SortKey] {
        &self.sort
    }

    #[must_use]
    pub const fn tie_breaker(&self) -> Option<&SortKey> {
        self.tie_breaker.as_ref()
    }

    /// Rows skipped before this page: `page_index * page_size`.
    #[must_use]
    pub const fn offset(&self) -> u64 {
        self.page_index as u64 * self.page_size as u64
    }

    #[must_use]
    pub fn next(&self) -> Self {
        Self {
            page_index: self.page_index.saturating_add(1),
            ..self.clone()
        }
    }

    #[must_use]
    pub fn previous(&self) -> Option<Self> {
        let page_index = self.page_index.checked_sub(1)?;

        Some(Self {
            page_index,
            ..self.clone()
        })
    }

    #[must_use]
    pub fn first(&self) -> Self {
        Self {
            page_index: 0,
            ..self.clone()
        }
    }

    /// Clamp the page size to `max`.
    #[must_use]
    pub(crate) fn clamped(mut self, max: u32) -> Self {
        self.page_size = self.page_size.min(max.max(1));
        self
    }
}

///
/// RawPageRequest
/// Unvalidated wire form of a page request.
///

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RawPageRequest {
    page_index: i64,
    page_size: i64,
    #[serde(default)]
    sort: Vec<SortKey>,
    #[serde(default)]
    tie_breaker: Option<SortKey>,
}

impl TryFrom<RawPageRequest> for PageRequest {
    type Error = PagingError;

    fn try_from(raw: RawPageRequest) -> Result<Self, Self::Error> {
        let mut request = Self::of(raw.page_index, raw.page_size)?.with_sort(raw.sort);
        request.tie_breaker = raw.tie_breaker;

        Ok(request)
    }
}

///
/// PageTotal
///
/// `Counted` for full pages, `Probed` for slices that only know whether
/// another page exists.
///

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
pub enum PageTotal {
    Counted(u64),
    Probed { has_next: bool },
}

///
/// PageResult
///
/// One window of results plus the request that produced it.
/// `total_pages` is always derived from the total, never stored.
///

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct PageResult<T> {
    content: Vec<T>,
    request: PageRequest,
    total: PageTotal,
}

impl<T> PageResult<T> {
    /// Build a counted page. A total below the rows already observed is
    /// raised to `offset + content.len()`.
    #[must_use]
    pub fn counted(content: Vec<T>, request: PageRequest, total: u64) -> Self {
        let observed = request.offset().saturating_add(content.len() as u64);

        Self {
            content,
            request,
            total: PageTotal::Counted(total.max(observed)),
        }
    }

    #[must_use]
    pub const fn probed(content: Vec<T>, request: PageRequest, has_next: bool) -> Self {
        Self {
            content,
            request,
            total: PageTotal::Probed { has_next },
        }
    }

    #[must_use]
    pub fn content(&self) -> &[T] {
        &self.content
    }

    #[must_use]
    pub fn into_content(self) -> Vec<T> {
        self.content
    }

    #[must_use]
    pub const fn request(&self) -> &PageRequest {
        &self.request
    }

    #[must_use]
    pub const fn total(&self) -> PageTotal {
        self.total
    }

    #[must_use]
    pub const fn page_index(&self) -> u32 {
        self.request.page_index
    }

    #[must_use]
    pub const fn page_size(&self) -> u32 {
        self.request.page_size
    }

    #[must_use]
    pub fn number_of_elements(&self) -> usize {
        self.content.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }

    /// Total matching rows; `None` for slices.
    #[must_use]
    pub const fn total_elements(&self) -> Option<u64> {
        match self.total {
            PageTotal::Counted(total) => Some(total),
            PageTotal::Probed { .. } => None,
        }
    }

    /// `ceil(total / page_size)`; `None` for slices.
    #[must_use]
    pub const fn total_pages(&self) -> Option<u64> {
        match self.total {
            PageTotal::Counted(total) => Some(total.div_ceil(self.request.page_size as u64)),
            PageTotal::Probed { .. } => None,
        }
    }

    #[must_use]
    pub const fn is_first(&self) -> bool {
        self.request.page_index == 0
    }

    #[must_use]
    pub const fn has_previous(&self) -> bool {
        self.request.page_index > 0
    }

    #[must_use]
    pub const fn has_next(&self) -> bool {
        match self.total {
            PageTotal::Counted(total) => {
                (self.request.page_index as u64 + 1) * (self.request.page_size as u64) < total
            }
            PageTotal::Probed { has_next } => has_next,
        }
    }

    #[must_use]
    pub const fn is_last(&self) -> bool {
        !self.has_next()
    }

    /// Request for the following page, if there is one.
    #[must_use]
    pub fn next_request(&self) -> Option<PageRequest> {
        self.has_next().then(|| self.request.next())
    }

    #[must_use]
    pub fn previous_request(&self) -> Option<PageRequest> {
        self.request.previous()
    }

    #[must_use]
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> PageResult<U> {
        PageResult {
            content: self.content.into_iter().map(f).collect(),
            request: self.request,
            total: self.total,
        }
    }

    pub fn try_map<U, E>(self, f: impl FnMut(T) -> Result<U, E>) -> Result<PageResult<U>, E> {
        Ok(PageResult {
            content: self.content.into_iter().map(f).collect::<Result<_, _>>()?,
            request: self.request,
            total: self.total,
        })
    }
}
