//! Query Executor: argument validation, fetch, and result shaping.

use crate::{
    config::RepositoryConfig,
    db::{
        executor::{
            BulkMutationCoordinator, ExecutionError, ExecutionErrorKind, PagingEngine,
            validate_arguments, window::describe_sort,
        },
        query::{
            Arguments,
            name::QueryKind,
            order::SortKey,
            plan::{Projection, QueryPlan, ResultShape},
        },
        response::{PageRequest, QueryResult},
        store::{CountRequest, QueryRequest, Storage, Window},
    },
    error::Error,
    model::Row,
    obs::sink::{ExecKind, Span},
};

///
/// QueryExecutor
///
/// Executes one compiled plan per call. Reads have no side effects beyond
/// what the collaborator does with its own session.
///

pub struct QueryExecutor<'a> {
    store: &'a dyn Storage,
    config: &'a RepositoryConfig,
}

impl<'a> QueryExecutor<'a> {
    #[must_use]
    pub const fn new(store: &'a dyn Storage, config: &'a RepositoryConfig) -> Self {
        Self { store, config }
    }

    fn debug_log(&self, s: impl AsRef<str>) {
        if self.config.debug {
            println!("[debug] {}", s.as_ref());
        }
    }

    /// Execute `plan` with `args`, wrapping rows by the plan's declared shape.
    pub fn execute(
        &self,
        plan: &QueryPlan,
        args: &Arguments,
        page: Option<&PageRequest>,
    ) -> Result<QueryResult, Error> {
        validate_arguments(&plan.signature, &plan.parameters, args)?;
        self.debug_log(format!("Execute {}", plan.describe()));

        match plan.kind {
            QueryKind::Select => self.select(plan, args, page),
            QueryKind::Count => {
                reject_page(plan, page)?;

                Ok(QueryResult::Count(count_rows(self.store, plan, args)?))
            }
            QueryKind::Exists => {
                reject_page(plan, page)?;
                let rows = fetch_rows(self.store, plan, args, Window::limit(1), &plan.order)?;

                Ok(QueryResult::Exists(!rows.is_empty()))
            }
            QueryKind::Delete => {
                reject_page(plan, page)?;
                let result =
                    BulkMutationCoordinator::new(self.store, self.config).delete_matching(plan, args)?;

                Ok(QueryResult::Mutation(result))
            }
        }
    }

    fn select(
        &self,
        plan: &QueryPlan,
        args: &Arguments,
        page: Option<&PageRequest>,
    ) -> Result<QueryResult, Error> {
        match plan.shape {
            ResultShape::Single | ResultShape::OptionalSingle => {
                reject_page(plan, page)?;

                // Two rows are enough to prove non-uniqueness; a TopN limit
                // below that selects the first row instead.
                let limit = plan.limit.map_or(2, |n| u64::from(n).min(2));
                let mut rows = fetch_rows(self.store, plan, args, Window::limit(limit), &plan.order)?;
                if rows.len() > 1 {
                    return Err(ExecutionError::new(
                        &plan.signature,
                        ExecutionErrorKind::NonUniqueResult { rows: rows.len() },
                    )
                    .into());
                }

                let row = rows.pop();
                Ok(if plan.shape == ResultShape::Single {
                    QueryResult::Single(row)
                } else {
                    QueryResult::Optional(row)
                })
            }

            ResultShape::List => {
                let (window, sort) = match page {
                    Some(request) => {
                        PagingEngine::new(self.store, self.config).list_window(plan, request)
                    }
                    None => (
                        Window {
                            offset: 0,
                            limit: plan.limit.map(u64::from),
                        },
                        plan.order.clone(),
                    ),
                };
                self.debug_log(format!(
                    "List window offset={} limit={:?} sort=[{}]",
                    window.offset,
                    window.limit,
                    describe_sort(&sort)
                ));

                Ok(QueryResult::List(fetch_rows(
                    self.store, plan, args, window, &sort,
                )?))
            }

            ResultShape::Page | ResultShape::Slice => {
                let request = page.ok_or_else(|| {
                    ExecutionError::new(&plan.signature, ExecutionErrorKind::MissingPageRequest)
                })?;
                let result = PagingEngine::new(self.store, self.config).paginate(plan, args, request)?;

                Ok(if plan.shape == ResultShape::Page {
                    QueryResult::Page(result)
                } else {
                    QueryResult::Slice(result)
                })
            }
        }
    }
}

fn reject_page(plan: &QueryPlan, page: Option<&PageRequest>) -> Result<(), ExecutionError> {
    match page {
        Some(_) => Err(ExecutionError::new(
            &plan.signature,
            ExecutionErrorKind::UnexpectedPageRequest,
        )),
        None => Ok(()),
    }
}

/// Fetch one window of rows and apply derived-plan projection and distinct.
///
/// Distinct derived plans are projected and deduplicated over every matching
/// row before the window is taken, so offsets and limits count distinct rows.
pub(crate) fn fetch_rows(
    store: &dyn Storage,
    plan: &QueryPlan,
    args: &Arguments,
    window: Window,
    sort: &[SortKey],
) -> Result<Vec<Row>, Error> {
    if plan.distinct && !plan.is_declared() {
        let rows = fetch_distinct(store, plan, args, sort)?;

        return Ok(slice_window(rows, window));
    }

    let rows = load(store, plan, args, window, sort)?;

    Ok(project(plan, rows))
}

/// Every distinct projected row matching `plan`, in first-seen `sort` order.
pub(crate) fn fetch_distinct(
    store: &dyn Storage,
    plan: &QueryPlan,
    args: &Arguments,
    sort: &[SortKey],
) -> Result<Vec<Row>, Error> {
    let rows = load(store, plan, args, Window::unbounded(), sort)?;

    let mut unique: Vec<Row> = Vec::with_capacity(rows.len());
    for row in project(plan, rows) {
        if !unique.contains(&row) {
            unique.push(row);
        }
    }

    Ok(unique)
}

/// Count the rows `plan` matches, capped by any TopN limit.
///
/// A declared count query wins; distinct derived plans count distinct
/// projected rows; everything else counts the base predicate.
pub(crate) fn count_rows(
    store: &dyn Storage,
    plan: &QueryPlan,
    args: &Arguments,
) -> Result<u64, Error> {
    let _span = Span::new(ExecKind::Count, &plan.entity);

    let total = if plan.distinct && !plan.is_declared() && plan.count_query.is_none() {
        fetch_distinct(store, plan, args, &[])?.len() as u64
    } else {
        store.run_count(&CountRequest {
            plan,
            args,
            template: plan.count_query.as_ref(),
        })?
    };

    Ok(plan.limit.map_or(total, |cap| total.min(u64::from(cap))))
}

fn load(
    store: &dyn Storage,
    plan: &QueryPlan,
    args: &Arguments,
    window: Window,
    sort: &[SortKey],
) -> Result<Vec<Row>, Error> {
    let mut span = Span::new(ExecKind::Load, &plan.entity);
    let rows = store.run_query(&QueryRequest {
        plan,
        args,
        window,
        sort,
    })?;
    span.set_rows(rows.len() as u64);

    Ok(rows)
}

// Declared plans are projected by the collaborator.
fn project(plan: &QueryPlan, rows: Vec<Row>) -> Vec<Row> {
    if plan.is_declared() {
        return rows;
    }

    match &plan.projection {
        Projection::Entity => rows,
        Projection::Scalar(field) => rows
            .iter()
            .map(|row| row.project(std::slice::from_ref(field)))
            .collect(),
        Projection::Dto(fields) => rows.iter().map(|row| row.project(fields)).collect(),
    }
}

fn slice_window(rows: Vec<Row>, window: Window) -> Vec<Row> {
    let offset = usize::try_from(window.offset).unwrap_or(usize::MAX);
    let limit = window
        .limit
        .map_or(usize::MAX, |n| usize::try_from(n).unwrap_or(usize::MAX));

    rows.into_iter().skip(offset).take(limit).collect()
}
