//! Module: query::plan
//! Responsibility: immutable compiled query plans, their fingerprints, and the plan cache.
//! Does not own: argument binding, storage access, or result shaping.
//! Boundary: the compiler produces `Arc<QueryPlan>`; executors and stores only read it.

mod cache;
mod compile;
mod fingerprint;
mod signature;

#[cfg(test)]
mod tests;

use crate::db::query::{
    name::QueryKind, order::SortKey, predicate::Filter, template::Template,
};
use derive_more::Display;
use std::fmt;

// re-exports
pub use cache::{CacheStats, PlanCache};
pub use compile::{CompileError, CompileErrorKind, NamedQueries, PredicateCompiler};
pub(crate) use compile::check_declared;
pub use fingerprint::PlanFingerprint;
pub use signature::MethodSignature;

///
/// ResultShape
///
/// Caller-declared cardinality of a query result.
///

#[derive(Clone, Copy, Debug, Display, Eq, Hash, PartialEq)]
pub enum ResultShape {
    #[display("single")]
    Single,
    #[display("optional")]
    OptionalSingle,
    #[display("list")]
    List,
    #[display("page")]
    Page,
    #[display("slice")]
    Slice,
}

impl ResultShape {
    #[must_use]
    pub const fn is_paged(self) -> bool {
        matches!(self, Self::Page | Self::Slice)
    }

    #[must_use]
    pub const fn is_single(self) -> bool {
        matches!(self, Self::Single | Self::OptionalSingle)
    }

    pub(crate) const fn tag(self) -> u8 {
        self as u8
    }
}

///
/// Projection
///
/// What each result row carries: the whole entity, one column, or a DTO field set.
///

#[derive(Clone, Debug, Default, Eq, Hash, PartialEq)]
pub enum Projection {
    #[default]
    Entity,
    Scalar(String),
    Dto(Vec<String>),
}

impl fmt::Display for Projection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Entity => f.write_str("entity"),
            Self::Scalar(field) => write!(f, "scalar({field})"),
            Self::Dto(fields) => write!(f, "dto({})", fields.join(", ")),
        }
    }
}

///
/// LockMode
///

#[derive(Clone, Copy, Debug, Default, Display, Eq, Hash, PartialEq)]
pub enum LockMode {
    #[default]
    #[display("none")]
    None,
    #[display("optimistic")]
    Optimistic,
    #[display("pessimistic_read")]
    PessimisticRead,
    #[display("pessimistic_write")]
    PessimisticWrite,
}

impl LockMode {
    pub(crate) const fn tag(self) -> u8 {
        self as u8
    }
}

///
/// QueryHints
///
/// Pass-through hints for the storage collaborator.
/// `read_only` asks the store not to track returned rows.
///

#[derive(Clone, Debug, Default, Eq, Hash, PartialEq)]
pub struct QueryHints {
    pub read_only: bool,
    pub timeout_ms: Option<u64>,
    pub comment: Option<String>,
}

///
/// ParamSlot
///

#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct ParamSlot {
    pub name: String,
    pub collection: bool,
}

///
/// PlanSource
///
/// Where the plan's predicate came from.
///

#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub enum PlanSource {
    Derived(Filter),
    Declared(Template),
}

///
/// QueryPlan
///
/// Compiled, immutable representation of one registered method.
/// Shared as `Arc<QueryPlan>`; value-equal for equal registration input.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct QueryPlan {
    pub signature: String,
    pub entity: String,
    pub primary_key: String,
    pub kind: QueryKind,
    pub source: PlanSource,
    pub parameters: Vec<ParamSlot>,
    pub projection: Projection,
    pub shape: ResultShape,
    pub limit: Option<u32>,
    pub distinct: bool,
    pub order: Vec<SortKey>,
    pub count_query: Option<Template>,
    pub hints: QueryHints,
    pub lock: LockMode,
    pub entity_graph: Vec<String>,
    pub fingerprint: PlanFingerprint,
}

impl QueryPlan {
    #[must_use]
    pub const fn is_declared(&self) -> bool {
        matches!(self.source, PlanSource::Declared(_))
    }

    #[must_use]
    pub const fn filter(&self) -> Option<&Filter> {
        match &self.source {
            PlanSource::Derived(filter) => Some(filter),
            PlanSource::Declared(_) => None,
        }
    }

    #[must_use]
    pub const fn template(&self) -> Option<&Template> {
        match &self.source {
            PlanSource::Derived(_) => None,
            PlanSource::Declared(template) => Some(template),
        }
    }

    #[must_use]
    pub fn parameter(&self, name: &str) -> Option<&ParamSlot> {
        self.parameters.iter().find(|p| p.name == name)
    }

    /// One-line human summary used by debug output.
    #[must_use]
    pub fn describe(&self) -> String {
        let source = match &self.source {
            PlanSource::Derived(filter) => format!("derived[{filter}]"),
            PlanSource::Declared(template) => format!("declared[{}]", template.text()),
        };
        let limit = self
            .limit
            .map_or_else(|| "none".to_string(), |n| n.to_string());

        format!(
            "{} on {}: kind={}, shape={}, projection={}, source={source}, limit={limit}, lock={}",
            self.signature, self.entity, self.kind, self.shape, self.projection, self.lock
        )
    }
}
