//! Paging Engine: page/slice windows, sort completion, and total resolution.

use crate::{
    config::RepositoryConfig,
    db::{
        executor::load::{count_rows, fetch_rows},
        query::{
            Arguments,
            order::SortKey,
            plan::{QueryPlan, ResultShape},
        },
        response::{PageRequest, PageResult},
        store::{Storage, Window},
    },
    error::Error,
    model::Row,
    obs::sink::{self, MetricsEvent},
};

///
/// PageWindow
///
/// Row window for one page. `keep_count` is the page size (capped by any
/// TopN limit), and `fetch_count` adds one probe row when requested.
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct PageWindow {
    pub offset: u64,
    pub fetch_count: u64,
    pub keep_count: u64,
}

impl PageWindow {
    #[must_use]
    pub const fn as_store_window(&self) -> Window {
        Window {
            offset: self.offset,
            limit: Some(self.fetch_count),
        }
    }
}

/// Compute the row window for `limit` rows after `offset`.
///
/// A TopN `cap` hides every row at or beyond position `cap`.
#[must_use]
pub fn compute_page_window(offset: u64, limit: u64, cap: Option<u32>, needs_extra: bool) -> PageWindow {
    let remaining = cap.map_or(u64::MAX, |cap| u64::from(cap).saturating_sub(offset));
    let keep_count = limit.min(remaining);
    let fetch_count = limit.saturating_add(u64::from(needs_extra)).min(remaining);

    PageWindow {
        offset,
        fetch_count,
        keep_count,
    }
}

///
/// PagingEngine
///

pub struct PagingEngine<'a> {
    store: &'a dyn Storage,
    config: &'a RepositoryConfig,
}

impl<'a> PagingEngine<'a> {
    #[must_use]
    pub const fn new(store: &'a dyn Storage, config: &'a RepositoryConfig) -> Self {
        Self { store, config }
    }

    fn debug_log(&self, s: impl AsRef<str>) {
        if self.config.debug {
            println!("[debug] {}", s.as_ref());
        }
    }

    /// Resolve one page (counted) or slice (probed) of `plan`.
    pub fn paginate(
        &self,
        plan: &QueryPlan,
        args: &Arguments,
        request: &PageRequest,
    ) -> Result<PageResult<Row>, Error> {
        let request = self.clamp(request);
        let sort = effective_sort(plan, &request);
        let probe = plan.shape == ResultShape::Slice;
        let window = compute_page_window(
            request.offset(),
            u64::from(request.page_size()),
            plan.limit,
            probe,
        );

        self.debug_log(format!(
            "{} page {} on {} (size={}, offset={}, fetch={}, sort=[{}])",
            if probe { "Slice" } else { "Page" },
            request.page_index(),
            plan.entity,
            request.page_size(),
            window.offset,
            window.fetch_count,
            describe_sort(&sort),
        ));

        let mut rows = fetch_rows(self.store, plan, args, window.as_store_window(), &sort)?;
        let keep = usize::try_from(window.keep_count).unwrap_or(usize::MAX);

        if probe {
            let has_next = rows.len() > keep;
            rows.truncate(keep);
            self.debug_log(format!("slice probe -> has_next={has_next}"));

            return Ok(PageResult::probed(rows, request, has_next));
        }

        let total = self.count(plan, args)?;
        self.debug_log(format!("count resolved -> total={total}"));

        Ok(PageResult::counted(rows, request, total))
    }

    /// Window and sort for a list-shaped plan invoked with a page request.
    /// No count is run.
    pub(crate) fn list_window(
        &self,
        plan: &QueryPlan,
        request: &PageRequest,
    ) -> (Window, Vec<SortKey>) {
        let request = self.clamp(request);
        let window = compute_page_window(
            request.offset(),
            u64::from(request.page_size()),
            plan.limit,
            false,
        );

        (window.as_store_window(), effective_sort(plan, &request))
    }

    // Declared count query when present, otherwise a count over the base
    // predicate (distinct rows for distinct plans); capped by any TopN limit.
    fn count(&self, plan: &QueryPlan, args: &Arguments) -> Result<u64, Error> {
        sink::record(MetricsEvent::CountQuery {
            entity: &plan.entity,
        });

        count_rows(self.store, plan, args)
    }

    fn clamp(&self, request: &PageRequest) -> PageRequest {
        request.clone().clamped(self.config.paging.max_page_size)
    }
}

/// Caller sort (or the plan's order clause), completed by the request's
/// tie-breaker or the primary key unless that field is already sorted on.
#[must_use]
pub(crate) fn effective_sort(plan: &QueryPlan, request: &PageRequest) -> Vec<SortKey> {
    let mut sort = if request.sort().is_empty() {
        plan.order.clone()
    } else {
        request.sort().to_vec()
    };

    let tie_breaker = request
        .tie_breaker()
        .cloned()
        .unwrap_or_else(|| SortKey::asc(plan.primary_key.as_str()));
    if !sort.iter().any(|key| key.field == tie_breaker.field) {
        sort.push(tie_breaker);
    }

    sort
}

pub(crate) fn describe_sort(sort: &[SortKey]) -> String {
    sort.iter()
        .map(|key| format!("{} {}", key.field, key.direction))
        .collect::<Vec<_>>()
        .join(", ")
}
