//! Mutation Module
//!
//! Row-level write instructions and the table names they are addressed to.
//!
//! ## Responsibilities
//! - Describe a single set/delete on one row
//! - Reject malformed mutations before they reach a buffer
//! - Name destination tables cheaply (cloned on every enqueue)

mod row;
mod table;

pub use row::{Column, Mutation, MutationKind};
pub use table::TableName;
