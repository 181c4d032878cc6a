use crate::{
    config::RepositoryConfig,
    db::{
        executor::{BulkMutation, BulkMutationCoordinator, BulkPlan, QueryExecutor},
        query::{
            Arguments,
            name::QueryKind,
            order::SortKey,
            plan::{
                CompileError, CompileErrorKind, MethodSignature, NamedQueries, PlanCache,
                PredicateCompiler, QueryPlan, ResultShape,
            },
        },
        response::{BulkMutationResult, PageRequest, PageResult, QueryResult},
        store::Storage,
    },
    error::Error,
    model::{EntityModel, Row},
    obs::sink::{MetricsSink, with_metrics_sink},
    value::Value,
};
use std::{collections::BTreeMap, sync::Arc};

///
/// PlanHandle
///
/// Registered query method; invoke it through the repository that issued it.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PlanHandle {
    plan: Arc<QueryPlan>,
}

impl PlanHandle {
    #[must_use]
    pub fn plan(&self) -> &QueryPlan {
        &self.plan
    }

    /// Whether both handles share one cached plan allocation.
    #[must_use]
    pub fn shares_plan(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.plan, &other.plan)
    }
}

///
/// BulkHandle
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct BulkHandle {
    plan: Arc<BulkPlan>,
}

impl BulkHandle {
    #[must_use]
    pub fn plan(&self) -> &BulkPlan {
        &self.plan
    }
}

///
/// Repository
///
/// Entity-scoped registration and invocation surface. Holds policy (config,
/// metrics sink) and routes calls to the executors.
///

pub struct Repository {
    model: EntityModel,
    store: Arc<dyn Storage>,
    cache: Arc<PlanCache>,
    config: RepositoryConfig,
    named: NamedQueries,
    metrics: Option<Arc<dyn MetricsSink>>,
}

impl Repository {
    #[must_use]
    pub fn new(
        model: EntityModel,
        store: Arc<dyn Storage>,
        cache: Arc<PlanCache>,
        config: RepositoryConfig,
    ) -> Self {
        Self {
            model,
            store,
            cache,
            config,
            named: NamedQueries::new(),
            metrics: None,
        }
    }

    #[must_use]
    pub fn with_named_queries(mut self, named: NamedQueries) -> Self {
        self.named = named;
        self
    }

    #[must_use]
    pub fn metrics_sink(mut self, sink: Arc<dyn MetricsSink>) -> Self {
        self.metrics = Some(sink);
        self
    }

    #[must_use]
    pub const fn model(&self) -> &EntityModel {
        &self.model
    }

    #[must_use]
    pub const fn config(&self) -> &RepositoryConfig {
        &self.config
    }

    #[must_use]
    pub fn cache(&self) -> &PlanCache {
        &self.cache
    }

    #[must_use]
    pub fn store(&self) -> &dyn Storage {
        self.store.as_ref()
    }

    fn debug_log(&self, s: impl AsRef<str>) {
        if self.config.debug {
            println!("[debug] {}", s.as_ref());
        }
    }

    fn with_metrics<T>(&self, f: impl FnOnce() -> T) -> T {
        match &self.metrics {
            Some(sink) => with_metrics_sink(Arc::clone(sink), f),
            None => f(),
        }
    }

    fn compiler(&self) -> PredicateCompiler<'_> {
        PredicateCompiler::new(&self.model, &self.cache, &self.named)
    }

    fn executor(&self) -> QueryExecutor<'_> {
        QueryExecutor::new(&*self.store, &self.config)
    }

    // ---------------------------------------------------------------------
    // Registration
    // ---------------------------------------------------------------------

    /// Compile (or fetch from the cache) the plan for `signature`.
    pub fn register(&self, signature: &MethodSignature) -> Result<PlanHandle, Error> {
        let plan = self.with_metrics(|| self.compiler().compile(signature))?;
        self.debug_log(format!("Registered {}", plan.describe()));

        Ok(PlanHandle { plan })
    }

    /// Validate a declared bulk statement against this entity.
    pub fn register_bulk(&self, mutation: &BulkMutation) -> Result<BulkHandle, Error> {
        let plan = BulkPlan::compile(&self.model, mutation)?;
        self.debug_log(format!(
            "Registered bulk '{}' on {}: {}",
            plan.name,
            plan.entity,
            plan.template.text()
        ));

        Ok(BulkHandle {
            plan: Arc::new(plan),
        })
    }

    // ---------------------------------------------------------------------
    // Invocation
    // ---------------------------------------------------------------------

    pub fn invoke(
        &self,
        handle: &PlanHandle,
        args: &Arguments,
        page: Option<&PageRequest>,
    ) -> Result<QueryResult, Error> {
        self.with_metrics(|| self.executor().execute(&handle.plan, args, page))
    }

    pub fn execute_bulk(
        &self,
        handle: &BulkHandle,
        args: &Arguments,
    ) -> Result<BulkMutationResult, Error> {
        self.with_metrics(|| {
            BulkMutationCoordinator::new(&*self.store, &self.config).execute_bulk(&handle.plan, args)
        })
    }

    /// Build a page request from caller input, honoring `paging.one_indexed`.
    pub fn page_request(&self, number: i64, size: i64) -> Result<PageRequest, Error> {
        let request = if self.config.paging.one_indexed {
            PageRequest::of_one_indexed(number, size)?
        } else {
            PageRequest::of(number, size)?
        };

        Ok(request)
    }

    // ---------------------------------------------------------------------
    // Built-in operations
    // ---------------------------------------------------------------------

    pub fn find_by_id(&self, id: impl Into<Value>) -> Result<Option<Row>, Error> {
        let handle = self.register(&MethodSignature::new(
            format!("findBy{}", capitalize(self.model.primary_key())),
            ResultShape::OptionalSingle,
        ))?;
        let args = Arguments::new().bind(self.model.primary_key(), id);

        self.invoke(&handle, &args, None)?.into_single()
    }

    pub fn exists_by_id(&self, id: impl Into<Value>) -> Result<bool, Error> {
        let handle = self.register(&MethodSignature::new(
            format!("existsBy{}", capitalize(self.model.primary_key())),
            ResultShape::Single,
        ))?;
        let args = Arguments::new().bind(self.model.primary_key(), id);

        self.invoke(&handle, &args, None)?.into_exists()
    }

    /// Every row, ordered by `sort` (primary-key order when empty).
    pub fn find_all(&self, sort: &[SortKey]) -> Result<Vec<Row>, Error> {
        let cached = self.with_metrics(|| {
            self.compiler()
                .compile_unfiltered("findAll", QueryKind::Select, ResultShape::List)
        });
        let mut plan = QueryPlan::clone(&cached);
        plan.order = sort.to_vec();

        self.with_metrics(|| self.executor().execute(&plan, &Arguments::new(), None))?
            .into_list()
    }

    pub fn find_all_page(&self, request: &PageRequest) -> Result<PageResult<Row>, Error> {
        let plan = self.with_metrics(|| {
            self.compiler()
                .compile_unfiltered("findAllPage", QueryKind::Select, ResultShape::Page)
        });

        self.with_metrics(|| self.executor().execute(&plan, &Arguments::new(), Some(request)))?
            .into_page()
    }

    pub fn count_all(&self) -> Result<u64, Error> {
        let plan = self.with_metrics(|| {
            self.compiler()
                .compile_unfiltered("countAll", QueryKind::Count, ResultShape::Single)
        });

        self.with_metrics(|| self.executor().execute(&plan, &Arguments::new(), None))?
            .into_count()
    }

    /// Pair each row with its related row through `relation`, loading every
    /// target with one `In` query on `target`.
    pub fn fetch_related(
        &self,
        rows: &[Row],
        relation: &str,
        target: &Self,
    ) -> Result<Vec<(Row, Option<Row>)>, Error> {
        let unknown = || CompileError {
            signature: format!("fetch_related({relation})"),
            kind: CompileErrorKind::UnknownRelation {
                name: relation.to_string(),
            },
        };
        let relation = self.model.relation_named(relation).ok_or_else(unknown)?;
        if relation.target != target.model.name() {
            return Err(unknown().into());
        }

        let mut keys: Vec<Value> = Vec::new();
        for key in rows.iter().filter_map(|row| row.get(&relation.foreign_key)) {
            if !key.is_null() && !keys.contains(key) {
                keys.push(key.clone());
            }
        }

        let mut related: BTreeMap<Value, Row> = BTreeMap::new();
        if !keys.is_empty() {
            let handle = target.register(&MethodSignature::new(
                format!("findBy{}In", capitalize(&relation.target_key)),
                ResultShape::List,
            ))?;
            let args = Arguments::new().bind(relation.target_key.as_str(), Value::List(keys));

            for row in target.invoke(&handle, &args, None)?.into_list::<Row>()? {
                if let Some(key) = row.get(&relation.target_key) {
                    related.insert(key.clone(), row);
                }
            }
        }

        Ok(rows
            .iter()
            .map(|row| {
                let found = row
                    .get(&relation.foreign_key)
                    .and_then(|key| related.get(key).cloned());
                (row.clone(), found)
            })
            .collect())
    }
}

fn capitalize(field: &str) -> String {
    let mut chars = field.chars();
    match chars.next() {
        Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
        None => String::new(),
    }
}
