//! Flush batches
//!
//! Snapshot of a buffer's pending mutations, taken under the buffer lock.

use crate::mutation::{Mutation, TableName};

/// Mutations flushed together, in enqueue order
#[derive(Debug, Clone)]
pub struct Batch {
    table: TableName,
    id: u64,
    mutations: Vec<Mutation>,
}

impl Batch {
    pub fn new(table: TableName, id: u64, mutations: Vec<Mutation>) -> Self {
        Self { table, id, mutations }
    }

    pub fn table(&self) -> &TableName {
        &self.table
    }

    /// Per-table sequence number, starting at 1
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn mutations(&self) -> &[Mutation] {
        &self.mutations
    }

    pub fn len(&self) -> usize {
        self.mutations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mutations.is_empty()
    }
}
