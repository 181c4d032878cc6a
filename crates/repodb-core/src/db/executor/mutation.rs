//! Bulk Mutation Coordinator: set-based statements and collaborator cache
//! invalidation.

use crate::{
    config::RepositoryConfig,
    db::{
        executor::validate_arguments,
        query::{
            Arguments,
            plan::{CompileError, ParamSlot, QueryPlan, check_declared},
            template::{StatementKind, Template},
        },
        response::BulkMutationResult,
        store::{MutationRequest, MutationStatement, Storage, StorageError},
    },
    error::Error,
    model::EntityModel,
    obs::sink::{self, ExecKind, MetricsEvent, Span},
};
use thiserror::Error as ThisError;

///
/// MutationError
///
/// Bulk statements either succeed with a full count or fail; there are no
/// partial counts.
///

#[derive(Clone, Debug, Eq, PartialEq, ThisError)]
pub enum MutationError {
    #[error("bulk statement violated a constraint: {message}")]
    ConstraintViolation { message: String },

    #[error("bulk statement failed: {0}")]
    Storage(StorageError),
}

impl From<StorageError> for MutationError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::ConstraintViolation { message } => Self::ConstraintViolation { message },
            other => Self::Storage(other),
        }
    }
}

///
/// BulkMutation
///
/// Registration input for a declared `update`/`delete`/`insert` statement.
/// `None` for either flag defers to the repository config.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct BulkMutation {
    pub name: String,
    pub template: String,
    pub params: Vec<String>,
    pub clear_automatically: Option<bool>,
    pub flush_automatically: Option<bool>,
}

impl BulkMutation {
    #[must_use]
    pub fn new(name: impl Into<String>, template: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            template: template.into(),
            params: Vec::new(),
            clear_automatically: None,
            flush_automatically: None,
        }
    }

    #[must_use]
    pub fn param(mut self, name: impl Into<String>) -> Self {
        self.params.push(name.into());
        self
    }

    #[must_use]
    pub const fn clear_automatically(mut self, clear: bool) -> Self {
        self.clear_automatically = Some(clear);
        self
    }

    #[must_use]
    pub const fn flush_automatically(mut self, flush: bool) -> Self {
        self.flush_automatically = Some(flush);
        self
    }
}

///
/// BulkPlan
///
/// Validated bulk statement, ready to execute.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct BulkPlan {
    pub name: String,
    pub entity: String,
    pub template: Template,
    pub parameters: Vec<ParamSlot>,
    pub clear_automatically: Option<bool>,
    pub flush_automatically: Option<bool>,
}

impl BulkPlan {
    /// Scan and validate `mutation` for `model`.
    pub fn compile(model: &EntityModel, mutation: &BulkMutation) -> Result<Self, CompileError> {
        let template = Template::scan(mutation.template.as_str());
        let parameters = check_declared(
            &mutation.name,
            &template,
            &mutation.params,
            StatementKind::Update,
        )?;

        Ok(Self {
            name: mutation.name.clone(),
            entity: model.name().to_string(),
            template,
            parameters,
            clear_automatically: mutation.clear_automatically,
            flush_automatically: mutation.flush_automatically,
        })
    }
}

///
/// BulkMutationCoordinator
///

pub struct BulkMutationCoordinator<'a> {
    store: &'a dyn Storage,
    config: &'a RepositoryConfig,
}

impl<'a> BulkMutationCoordinator<'a> {
    #[must_use]
    pub const fn new(store: &'a dyn Storage, config: &'a RepositoryConfig) -> Self {
        Self { store, config }
    }

    fn debug_log(&self, s: impl AsRef<str>) {
        if self.config.debug {
            println!("[debug] {}", s.as_ref());
        }
    }

    /// Run a declared bulk statement.
    ///
    /// With `clear_automatically`, the collaborator cache is invalidated
    /// before this returns; with `flush_automatically`, pending session
    /// changes are flushed before the statement runs.
    pub fn execute_bulk(
        &self,
        plan: &BulkPlan,
        args: &Arguments,
    ) -> Result<BulkMutationResult, Error> {
        validate_arguments(&plan.name, &plan.parameters, args)?;

        let flush = plan
            .flush_automatically
            .unwrap_or(self.config.bulk.flush_automatically);
        let clear = plan
            .clear_automatically
            .unwrap_or(self.config.bulk.clear_automatically);

        self.debug_log(format!(
            "Bulk '{}' on {} (flush={flush}, clear={clear}): {}",
            plan.name,
            plan.entity,
            plan.template.text()
        ));

        self.run(
            &plan.entity,
            MutationStatement::Declared(&plan.template),
            args,
            flush,
            clear,
        )
    }

    /// Run a derived `deleteBy...` plan under the repository defaults.
    pub(crate) fn delete_matching(
        &self,
        plan: &QueryPlan,
        args: &Arguments,
    ) -> Result<BulkMutationResult, Error> {
        let Some(filter) = plan.filter() else {
            return Err(MutationError::Storage(StorageError::unsupported(
                "delete plans must be derived from a method name",
            ))
            .into());
        };

        self.debug_log(format!("Delete on {} where {filter}", plan.entity));

        self.run(
            &plan.entity,
            MutationStatement::DeleteWhere(filter),
            args,
            self.config.bulk.flush_automatically,
            self.config.bulk.clear_automatically,
        )
    }

    fn run(
        &self,
        entity: &str,
        statement: MutationStatement<'_>,
        args: &Arguments,
        flush: bool,
        clear: bool,
    ) -> Result<BulkMutationResult, Error> {
        let mut span = Span::new(ExecKind::Mutation, entity);

        if flush {
            self.store.flush().map_err(MutationError::from)?;
        }

        let affected = self
            .store
            .run_mutation(&MutationRequest {
                entity,
                statement,
                args,
            })
            .map_err(MutationError::from)?;
        span.set_rows(affected);

        if clear {
            self.store.invalidate_cache();
            sink::record(MetricsEvent::CacheInvalidated { entity });
        }

        self.debug_log(format!(
            "bulk statement on {entity} -> {affected} rows (cache cleared={clear})"
        ));

        Ok(BulkMutationResult {
            affected_rows: affected,
            cache_invalidated: clear,
        })
    }
}
