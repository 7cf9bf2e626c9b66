//! Projection of source rows into target-shaped rows.
//!
//! The picker applies the resolved field mapping of a table group: each projected row is
//! keyed by target field names, values copied from the matching source fields. Converters
//! and an optional row hook run after projection, always on target-shaped rows.

mod convert;
mod hook;

pub use convert::*;
pub use hook::*;

use crate::types::{dedup_fields, Field, FieldMapping, Row};

/// Projects source rows into target rows using a resolved field mapping.
///
/// Only complete pairs participate; a mapping whose source or target side is absent is
/// ignored here. Source fields missing from an input row stay absent in the output, and
/// the batch writer binds null for them.
#[derive(Debug, Clone)]
pub struct Picker {
    pairs: Vec<(String, String)>,
    target_fields: Vec<Field>,
}

impl Picker {
    pub fn new(mappings: &[FieldMapping]) -> Self {
        let pairs = mappings
            .iter()
            .filter_map(|mapping| match (&mapping.source, &mapping.target) {
                (Some(source), Some(target)) => {
                    Some((source.effective_name().to_string(), target.name.clone()))
                }
                _ => None,
            })
            .collect();

        let targets: Vec<Field> = mappings
            .iter()
            .filter_map(|mapping| mapping.target.clone())
            .collect();

        Self {
            pairs,
            target_fields: dedup_fields(&targets),
        }
    }

    /// Projects a single row. A mapping with no complete pairs yields an empty row.
    pub fn pick_row(&self, source: &Row) -> Row {
        self.pairs
            .iter()
            .filter_map(|(source_name, target_name)| {
                source
                    .get(source_name)
                    .map(|value| (target_name.clone(), value.clone()))
            })
            .collect()
    }

    /// Projects a batch of rows, preserving order and cardinality.
    pub fn pick_rows(&self, rows: &[Row]) -> Vec<Row> {
        rows.iter().map(|row| self.pick_row(row)).collect()
    }

    /// Target fields in statement bind order, de-duplicated by name.
    pub fn target_fields(&self) -> &[Field] {
        &self.target_fields
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{row_from, ColumnType, Value};

    fn mapping(source: &str, target: &str) -> FieldMapping {
        FieldMapping::paired(
            Field::new(source, ColumnType::String),
            Field::new(target, ColumnType::String),
        )
    }

    #[test]
    fn test_pick_row_rekeys_by_target_name() {
        let picker = Picker::new(&[mapping("name", "full_name"), mapping("age", "age")]);
        let row = row_from([("name", Value::from("ada")), ("age", Value::I32(36))]);

        let picked = picker.pick_row(&row);
        assert_eq!(picked.get("full_name"), Some(&Value::from("ada")));
        assert_eq!(picked.get("age"), Some(&Value::I32(36)));
        assert!(picked.get("name").is_none());
    }

    #[test]
    fn test_pick_row_round_trips_under_inverse_mapping() {
        let forward = Picker::new(&[mapping("a", "x"), mapping("b", "y")]);
        let inverse = Picker::new(&[mapping("x", "a"), mapping("y", "b")]);
        let row = row_from([("a", Value::I64(1)), ("b", Value::from("two"))]);

        assert_eq!(inverse.pick_row(&forward.pick_row(&row)), row);
    }

    #[test]
    fn test_unmapped_fields_collapse_to_empty_row() {
        let picker = Picker::new(&[FieldMapping::new(
            Some(Field::new("orphan", ColumnType::String)),
            None,
        )]);
        let row = row_from([("orphan", Value::from("x"))]);
        assert!(picker.pick_row(&row).is_empty());
    }

    #[test]
    fn test_missing_source_field_stays_absent() {
        let picker = Picker::new(&[mapping("name", "name"), mapping("email", "email")]);
        let row = row_from([("name", Value::from("ada"))]);

        let picked = picker.pick_row(&row);
        assert_eq!(picked.len(), 1);
        assert!(!picked.contains_key("email"));
    }

    #[test]
    fn test_pick_rows_preserves_cardinality() {
        let picker = Picker::new(&[mapping("id", "id")]);
        let rows = vec![
            row_from([("id", Value::I64(1))]),
            row_from([("id", Value::I64(2))]),
            row_from([("id", Value::I64(3))]),
        ];
        assert_eq!(picker.pick_rows(&rows).len(), 3);
    }

    #[test]
    fn test_target_fields_deduplicate() {
        let picker = Picker::new(&[mapping("a", "x"), mapping("b", "x"), mapping("c", "y")]);
        let names: Vec<&str> = picker
            .target_fields()
            .iter()
            .map(|field| field.name.as_str())
            .collect();
        assert_eq!(names, ["x", "y"]);
    }

    #[test]
    fn test_pick_respects_source_alias() {
        let source = Field {
            alias: Some("created".into()),
            ..Field::new("created_at", ColumnType::Timestamp)
        };
        let picker = Picker::new(&[FieldMapping::paired(
            source,
            Field::new("created", ColumnType::Timestamp),
        )]);

        let row = row_from([("created", Value::from("2021-01-01"))]);
        assert_eq!(picker.pick_row(&row).len(), 1);
    }
}
