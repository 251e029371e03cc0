//! Row mutations
//!
//! A [`Mutation`] is immutable once built. Ownership moves into the buffer
//! on enqueue.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::error::{Result, StrataError};

/// Kind of row-level write
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MutationKind {
    /// Set the given cells
    Put,

    /// Delete the given cells, or the whole row when no columns are named
    Delete,
}

/// One cell addressed by a mutation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    pub family: Bytes,
    pub qualifier: Bytes,
    /// Empty for deletes
    pub value: Bytes,
}

/// A single row write instruction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mutation {
    row: Bytes,
    columns: Vec<Column>,
    timestamp: Option<u64>,
    kind: MutationKind,
}

impl Mutation {
    /// Start a put for `row`
    pub fn put(row: impl Into<Bytes>) -> Self {
        Self {
            row: row.into(),
            columns: Vec::new(),
            timestamp: None,
            kind: MutationKind::Put,
        }
    }

    /// Start a delete for `row`
    ///
    /// With no columns added this deletes the whole row.
    pub fn delete(row: impl Into<Bytes>) -> Self {
        Self {
            row: row.into(),
            columns: Vec::new(),
            timestamp: None,
            kind: MutationKind::Delete,
        }
    }

    /// Add a cell to a put
    pub fn column(
        mut self,
        family: impl Into<Bytes>,
        qualifier: impl Into<Bytes>,
        value: impl Into<Bytes>,
    ) -> Self {
        self.columns.push(Column {
            family: family.into(),
            qualifier: qualifier.into(),
            value: value.into(),
        });
        self
    }

    /// Name a cell to remove in a delete
    pub fn delete_column(mut self, family: impl Into<Bytes>, qualifier: impl Into<Bytes>) -> Self {
        self.columns.push(Column {
            family: family.into(),
            qualifier: qualifier.into(),
            value: Bytes::new(),
        });
        self
    }

    /// Pin an explicit cell timestamp (server assigns one otherwise)
    pub fn timestamp(mut self, ts: u64) -> Self {
        self.timestamp = Some(ts);
        self
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn row(&self) -> &Bytes {
        &self.row
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn ts(&self) -> Option<u64> {
        self.timestamp
    }

    pub fn kind(&self) -> MutationKind {
        self.kind
    }

    /// Approximate payload size in bytes
    pub fn size(&self) -> usize {
        self.row.len()
            + self
                .columns
                .iter()
                .map(|c| c.family.len() + c.qualifier.len() + c.value.len())
                .sum::<usize>()
    }

    /// Check the mutation's shape
    ///
    /// Rules:
    /// 1. Row key is non-empty
    /// 2. A put names at least one column
    /// 3. Every column has a family
    /// 4. Delete columns carry no value
    pub fn validate(&self) -> Result<()> {
        if self.row.is_empty() {
            return Err(StrataError::InvalidMutation("empty row key".to_string()));
        }

        if self.kind == MutationKind::Put && self.columns.is_empty() {
            return Err(StrataError::InvalidMutation(
                "put must set at least one column".to_string(),
            ));
        }

        for (i, column) in self.columns.iter().enumerate() {
            if column.family.is_empty() {
                return Err(StrataError::InvalidMutation(format!(
                    "column {} has an empty family",
                    i
                )));
            }
            if self.kind == MutationKind::Delete && !column.value.is_empty() {
                return Err(StrataError::InvalidMutation(format!(
                    "delete column {} carries a value",
                    i
                )));
            }
        }

        Ok(())
    }
}
