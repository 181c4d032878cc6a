//! Core runtime for repodb: method-name query derivation, declared templates,
//! shaped execution against a storage collaborator, paging, and bulk
//! mutations, plus the vocabulary exported via the `prelude`.

// public exports are one module level down
pub mod config;
pub mod db;
pub mod error;
pub mod model;
pub mod obs;
pub mod value;

pub use error::Error;

// test
#[cfg(test)]
pub(crate) mod test_fixtures;

///
/// Prelude
///
/// Prelude contains only domain vocabulary.
/// No errors, executors, or stores are re-exported here.
///

pub mod prelude {
    pub use crate::{
        db::{
            PlanHandle, Repository,
            query::{
                Arguments,
                order::{OrderDirection, SortKey},
                plan::{LockMode, MethodSignature, Projection, QueryHints, ResultShape},
            },
            response::{PageRequest, PageResult, QueryResult},
        },
        model::{EntityModel, FromRow, RelationModel, Row},
        value::Value,
    };
}
