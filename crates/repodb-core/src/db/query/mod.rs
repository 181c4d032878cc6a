//! Module: query
//! Responsibility: everything between a method signature and a compiled plan.
//! Does not own: execution or storage.
//! Boundary: the name parser and template scanner feed the predicate compiler.

mod args;

pub mod name;
pub mod order;
pub mod plan;
pub mod predicate;
pub mod template;

pub use args::Arguments;
