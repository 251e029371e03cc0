//! Mutation Tests
//!
//! Tests verify:
//! - Builder construction of puts and deletes
//! - Shape validation rules
//! - Table name behavior

use std::collections::HashSet;

use strata::{Mutation, MutationKind, StrataError, TableName};

// =============================================================================
// Construction Tests
// =============================================================================

#[test]
fn test_put_builder() {
    let m = Mutation::put("row1")
        .column("cf", "a", "1")
        .column("cf", "b", "2")
        .timestamp(1234);

    assert_eq!(m.kind(), MutationKind::Put);
    assert_eq!(&m.row()[..], b"row1");
    assert_eq!(m.columns().len(), 2);
    assert_eq!(&m.columns()[1].qualifier[..], b"b");
    assert_eq!(m.ts(), Some(1234));
    assert!(m.validate().is_ok());
}

#[test]
fn test_delete_whole_row_is_valid() {
    let m = Mutation::delete("row1");
    assert_eq!(m.kind(), MutationKind::Delete);
    assert!(m.columns().is_empty());
    assert!(m.validate().is_ok());
}

#[test]
fn test_delete_columns_is_valid() {
    let m = Mutation::delete("row1").delete_column("cf", "a");
    assert!(m.columns()[0].value.is_empty());
    assert!(m.validate().is_ok());
}

#[test]
fn test_size_counts_row_and_cells() {
    let m = Mutation::put("row").column("cf", "q", "value");
    assert_eq!(m.size(), 3 + 2 + 1 + 5);
}

// =============================================================================
// Validation Tests
// =============================================================================

#[test]
fn test_empty_row_rejected() {
    let m = Mutation::put("").column("cf", "q", "v");
    assert!(matches!(m.validate(), Err(StrataError::InvalidMutation(_))));
}

#[test]
fn test_put_without_columns_rejected() {
    let m = Mutation::put("row1");
    assert!(matches!(m.validate(), Err(StrataError::InvalidMutation(_))));
}

#[test]
fn test_empty_family_rejected() {
    let m = Mutation::put("row1").column("", "q", "v");
    assert!(matches!(m.validate(), Err(StrataError::InvalidMutation(_))));
}

#[test]
fn test_delete_with_value_rejected() {
    let m = Mutation::delete("row1").column("cf", "q", "v");
    assert!(matches!(m.validate(), Err(StrataError::InvalidMutation(_))));
}

// =============================================================================
// TableName Tests
// =============================================================================

#[test]
fn test_table_name_equality_and_display() {
    let a = TableName::from("metrics");
    let b = TableName::from("metrics".to_string());

    assert_eq!(a, b);
    assert_eq!(a.to_string(), "metrics");
    assert_eq!(a.as_str(), "metrics");

    let set: HashSet<_> = [a, b, TableName::new("other")].into_iter().collect();
    assert_eq!(set.len(), 2);
}
