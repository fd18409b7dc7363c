//! Database module: dynamic query construction and SQL repositories.
//!
//! This module is split into two submodules:
//! - `query`: builds parameterized predicate and assignment sets from sparse
//!   filter/patch values.
//! - `repo`: SQL-only functions that own the pool and map rows into records.
//!
//! External modules should import from `car_registry::db` — the repository
//! API is re-exported here.

pub mod query;
pub mod repo;

pub use repo::*;
