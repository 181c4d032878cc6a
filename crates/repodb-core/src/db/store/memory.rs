//! In-memory reference collaborator.
//!
//! Committed rows live in per-entity tables. Rows handed out by queries are
//! tracked in a session identity map that shadows the committed copy until
//! `invalidate_cache` runs, so a bulk statement followed by a read without
//! clearing observes the stale session row.

use crate::{
    db::{
        query::{
            Arguments,
            order::{OrderDirection, SortKey},
            plan::{LockMode, PlanSource, Projection, QueryHints, QueryPlan},
        },
        store::{
            CountRequest, MutationRequest, MutationStatement, QueryRequest, Storage,
            StorageError, Window,
        },
    },
    model::{EntityModel, Row},
    value::{Value, canonical_cmp},
};
use std::{
    collections::{BTreeMap, BTreeSet},
    sync::{
        Arc, Mutex, PoisonError, RwLock,
        atomic::{AtomicU64, Ordering},
    },
};

/// Resolves a declared select template over a snapshot of the entity's rows.
pub type QueryHandler =
    Arc<dyn Fn(&[Row], &Arguments) -> Result<Vec<Row>, StorageError> + Send + Sync>;

/// Resolves a declared count template.
pub type CountHandler = Arc<dyn Fn(&[Row], &Arguments) -> Result<u64, StorageError> + Send + Sync>;

/// Applies a declared bulk statement to a working copy of the entity's rows
/// and returns the affected count. The copy is committed only if it still
/// satisfies key and unique constraints.
pub type MutationHandler =
    Arc<dyn Fn(&mut Vec<Row>, &Arguments) -> Result<u64, StorageError> + Send + Sync>;

///
/// RequestRecord
///
/// What the store was asked to fetch, kept so callers can inspect the hints,
/// lock mode, and entity graph that reached the collaborator.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RequestRecord {
    pub signature: String,
    pub entity: String,
    pub window: Window,
    pub sort: Vec<SortKey>,
    pub hints: QueryHints,
    pub lock: LockMode,
    pub entity_graph: Vec<String>,
}

///
/// Table
///

struct Table {
    primary_key: String,
    rows: BTreeMap<Value, Row>,
}

type SessionKey = (String, Value);

///
/// MemoryStore
///

#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<BTreeMap<String, Table>>,
    unique: BTreeMap<String, Vec<String>>,
    session: Mutex<BTreeMap<SessionKey, Row>>,
    query_handlers: BTreeMap<String, QueryHandler>,
    count_handlers: BTreeMap<String, CountHandler>,
    mutation_handlers: BTreeMap<String, MutationHandler>,
    requests: Mutex<Vec<RequestRecord>>,
    pending_failure: Mutex<Option<StorageError>>,
    invalidations: AtomicU64,
    flushes: AtomicU64,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    ///
    /// SETUP
    ///

    #[must_use]
    pub fn with_table(self, model: &EntityModel) -> Self {
        self.create_table(model);
        self
    }

    pub fn create_table(&self, model: &EntityModel) {
        write(&self.tables)
            .entry(model.name().to_string())
            .or_insert_with(|| Table {
                primary_key: model.primary_key().to_string(),
                rows: BTreeMap::new(),
            });
    }

    /// Declare `field` unique within `entity`; nulls never conflict.
    #[must_use]
    pub fn with_unique(mut self, entity: impl Into<String>, field: impl Into<String>) -> Self {
        self.unique
            .entry(entity.into())
            .or_default()
            .push(field.into());
        self
    }

    #[must_use]
    pub fn with_query_handler(
        mut self,
        template: impl Into<String>,
        handler: impl Fn(&[Row], &Arguments) -> Result<Vec<Row>, StorageError> + Send + Sync + 'static,
    ) -> Self {
        self.query_handlers.insert(template.into(), Arc::new(handler));
        self
    }

    #[must_use]
    pub fn with_count_handler(
        mut self,
        template: impl Into<String>,
        handler: impl Fn(&[Row], &Arguments) -> Result<u64, StorageError> + Send + Sync + 'static,
    ) -> Self {
        self.count_handlers.insert(template.into(), Arc::new(handler));
        self
    }

    #[must_use]
    pub fn with_mutation_handler(
        mut self,
        template: impl Into<String>,
        handler: impl Fn(&mut Vec<Row>, &Arguments) -> Result<u64, StorageError>
        + Send
        + Sync
        + 'static,
    ) -> Self {
        self.mutation_handlers
            .insert(template.into(), Arc::new(handler));
        self
    }

    ///
    /// WRITES
    ///

    /// Persist `row` and attach it to the session, replacing any row with the
    /// same primary key.
    pub fn insert(&self, entity: &str, row: Row) -> Result<(), StorageError> {
        let mut tables = write(&self.tables);
        let table = tables
            .get_mut(entity)
            .ok_or_else(|| unknown_entity(entity))?;
        let key = primary_key_of(entity, &table.primary_key, &row)?;

        let mut candidate = table.rows.clone();
        candidate.insert(key.clone(), row.clone());
        self.check_unique(entity, candidate.values())?;
        table.rows = candidate;

        lock(&self.session).insert((entity.to_string(), key), row);

        Ok(())
    }

    /// Make the next storage call fail with `err`.
    pub fn fail_next(&self, err: StorageError) {
        *lock(&self.pending_failure) = Some(err);
    }

    ///
    /// INSPECTION
    ///

    /// Committed row for `key`, bypassing the session.
    #[must_use]
    pub fn committed(&self, entity: &str, key: &Value) -> Option<Row> {
        read(&self.tables)
            .get(entity)
            .and_then(|table| table.rows.get(key).cloned())
    }

    #[must_use]
    pub fn row_count(&self, entity: &str) -> usize {
        read(&self.tables)
            .get(entity)
            .map_or(0, |table| table.rows.len())
    }

    #[must_use]
    pub fn session_len(&self) -> usize {
        lock(&self.session).len()
    }

    #[must_use]
    pub fn invalidations(&self) -> u64 {
        self.invalidations.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn flushes(&self) -> u64 {
        self.flushes.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn recorded_requests(&self) -> Vec<RequestRecord> {
        lock(&self.requests).clone()
    }

    ///
    /// INTERNALS
    ///

    fn take_failure(&self) -> Result<(), StorageError> {
        match lock(&self.pending_failure).take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn record(&self, request: &QueryRequest<'_>) {
        let plan = request.plan;
        lock(&self.requests).push(RequestRecord {
            signature: plan.signature.clone(),
            entity: plan.entity.clone(),
            window: request.window,
            sort: request.sort.to_vec(),
            hints: plan.hints.clone(),
            lock: plan.lock,
            entity_graph: plan.entity_graph.clone(),
        });
    }

    // Rows matching the plan's predicate, in primary-key order.
    fn select(
        &self,
        table: &Table,
        plan: &QueryPlan,
        args: &Arguments,
    ) -> Result<Vec<Row>, StorageError> {
        match &plan.source {
            PlanSource::Derived(filter) => Ok(table
                .rows
                .values()
                .filter(|row| filter.matches(row, args))
                .cloned()
                .collect()),
            PlanSource::Declared(template) => {
                let handler = self.query_handlers.get(template.text()).ok_or_else(|| {
                    StorageError::unsupported(format!(
                        "no handler for declared query '{}'",
                        template.text()
                    ))
                })?;
                let snapshot: Vec<Row> = table.rows.values().cloned().collect();

                handler(&snapshot, args)
            }
        }
    }

    // Swap in the session copy of each entity row, tracking new ones unless
    // the plan asked for read-only results.
    fn attach(&self, plan: &QueryPlan, primary_key: &str, rows: Vec<Row>) -> Vec<Row> {
        if plan.projection != Projection::Entity {
            return rows;
        }

        let mut session = lock(&self.session);
        rows.into_iter()
            .map(|row| {
                let Some(key) = row.get(primary_key).cloned() else {
                    return row;
                };
                let session_key = (plan.entity.clone(), key);

                match session.get(&session_key) {
                    Some(tracked) => tracked.clone(),
                    None => {
                        if !plan.hints.read_only {
                            session.insert(session_key, row.clone());
                        }
                        row
                    }
                }
            })
            .collect()
    }

    fn check_unique<'r>(
        &self,
        entity: &str,
        rows: impl Iterator<Item = &'r Row> + Clone,
    ) -> Result<(), StorageError> {
        let Some(fields) = self.unique.get(entity) else {
            return Ok(());
        };

        for field in fields {
            let mut seen = BTreeSet::new();
            for value in rows.clone().filter_map(|row| row.get(field)) {
                if !value.is_null() && !seen.insert(value) {
                    return Err(StorageError::constraint(format!(
                        "duplicate value {value} for unique field '{entity}.{field}'"
                    )));
                }
            }
        }

        Ok(())
    }
}

impl Storage for MemoryStore {
    fn run_query(&self, request: &QueryRequest<'_>) -> Result<Vec<Row>, StorageError> {
        self.take_failure()?;
        self.record(request);

        let plan = request.plan;
        let tables = read(&self.tables);
        let table = tables
            .get(&plan.entity)
            .ok_or_else(|| unknown_entity(&plan.entity))?;

        let mut rows = self.select(table, plan, request.args)?;
        sort_rows(&mut rows, request.sort);
        let rows = apply_window(rows, request.window);

        Ok(self.attach(plan, &table.primary_key, rows))
    }

    fn run_count(&self, request: &CountRequest<'_>) -> Result<u64, StorageError> {
        self.take_failure()?;

        let plan = request.plan;
        let tables = read(&self.tables);
        let table = tables
            .get(&plan.entity)
            .ok_or_else(|| unknown_entity(&plan.entity))?;

        match request.template {
            Some(template) => {
                let handler = self.count_handlers.get(template.text()).ok_or_else(|| {
                    StorageError::unsupported(format!(
                        "no handler for count query '{}'",
                        template.text()
                    ))
                })?;
                let snapshot: Vec<Row> = table.rows.values().cloned().collect();

                handler(&snapshot, request.args)
            }
            None => Ok(self.select(table, plan, request.args)?.len() as u64),
        }
    }

    fn run_mutation(&self, request: &MutationRequest<'_>) -> Result<u64, StorageError> {
        self.take_failure()?;

        let entity = request.entity;
        let mut tables = write(&self.tables);
        let table = tables
            .get_mut(entity)
            .ok_or_else(|| unknown_entity(entity))?;

        match request.statement {
            MutationStatement::Declared(template) => {
                let handler = self.mutation_handlers.get(template.text()).ok_or_else(|| {
                    StorageError::unsupported(format!(
                        "no handler for bulk statement '{}'",
                        template.text()
                    ))
                })?;

                let mut working: Vec<Row> = table.rows.values().cloned().collect();
                let affected = handler(&mut working, request.args)?;

                let mut rebuilt = BTreeMap::new();
                for row in working {
                    let key = primary_key_of(entity, &table.primary_key, &row)?;
                    if rebuilt.insert(key.clone(), row).is_some() {
                        return Err(StorageError::constraint(format!(
                            "duplicate primary key {key} in '{entity}'"
                        )));
                    }
                }
                self.check_unique(entity, rebuilt.values())?;
                table.rows = rebuilt;

                Ok(affected)
            }
            MutationStatement::DeleteWhere(filter) => {
                let before = table.rows.len();
                table.rows.retain(|_, row| !filter.matches(row, request.args));

                Ok((before - table.rows.len()) as u64)
            }
        }
    }

    fn invalidate_cache(&self) {
        lock(&self.session).clear();
        self.invalidations.fetch_add(1, Ordering::Relaxed);
    }

    fn flush(&self) -> Result<(), StorageError> {
        self.take_failure()?;
        self.flushes.fetch_add(1, Ordering::Relaxed);

        Ok(())
    }
}

///
/// HELPERS
///

fn unknown_entity(entity: &str) -> StorageError {
    StorageError::unsupported(format!("unknown entity '{entity}'"))
}

fn primary_key_of(entity: &str, primary_key: &str, row: &Row) -> Result<Value, StorageError> {
    match row.get(primary_key) {
        Some(value) if !value.is_null() => Ok(value.clone()),
        _ => Err(StorageError::constraint(format!(
            "'{entity}' row has no value for primary key '{primary_key}'"
        ))),
    }
}

fn sort_rows(rows: &mut [Row], sort: &[SortKey]) {
    if sort.is_empty() {
        return;
    }

    rows.sort_by(|a, b| {
        for key in sort {
            let left = a.get(&key.field).unwrap_or(&Value::Null);
            let right = b.get(&key.field).unwrap_or(&Value::Null);
            let ord = match key.direction {
                OrderDirection::Asc => canonical_cmp(left, right),
                OrderDirection::Desc => canonical_cmp(right, left),
            };
            if ord.is_ne() {
                return ord;
            }
        }
        std::cmp::Ordering::Equal
    });
}

fn apply_window(rows: Vec<Row>, window: Window) -> Vec<Row> {
    let offset = usize::try_from(window.offset).unwrap_or(usize::MAX);
    let limit = window
        .limit
        .map_or(usize::MAX, |n| usize::try_from(n).unwrap_or(usize::MAX));

    rows.into_iter().skip(offset).take(limit).collect()
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn read<T>(lock: &RwLock<T>) -> std::sync::RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> std::sync::RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}
