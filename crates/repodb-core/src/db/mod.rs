//! Module: db
//! Responsibility: query derivation, execution, paging, and bulk mutation.
//! Does not own: entity metadata (`model`) or the value model (`value`).
//! Boundary: `Repository` is the public entrypoint; `store::Storage` is the
//! external collaborator seam.

pub mod executor;
pub mod query;
pub mod response;
pub mod store;

mod session;

pub use session::{BulkHandle, PlanHandle, Repository};
