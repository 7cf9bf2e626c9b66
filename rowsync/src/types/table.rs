use serde::{Deserialize, Serialize};

use crate::bail;
use crate::error::{ErrorKind, SyncError, SyncResult};

/// Normalized column type codes shared by every connector.
///
/// Connectors map their native column types onto this set during introspection so the
/// command builder and value binding can stay store-neutral. Decimal and numeric columns
/// normalize to [`ColumnType::Double`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColumnType {
    Bool,
    Int,
    BigInt,
    Double,
    String,
    Bytes,
    Date,
    Timestamp,
    Uuid,
    Json,
}

/// A single column of a [`Table`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Field {
    /// Column name as it exists in the store.
    pub name: String,
    /// Optional output alias used when projecting into target rows.
    pub alias: Option<String>,
    /// Normalized type code.
    pub column_type: ColumnType,
    /// Primary key flag.
    pub pk: bool,
    /// Suppresses identifier quoting in generated SQL.
    ///
    /// Set for expression columns whose text must be emitted verbatim.
    pub unmodifiable: bool,
}

impl Field {
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            alias: None,
            column_type,
            pk: false,
            unmodifiable: false,
        }
    }

    pub fn primary_key(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            pk: true,
            ..Self::new(name, column_type)
        }
    }

    /// Name under which the field appears in projected rows.
    pub fn effective_name(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.name)
    }
}

/// Whether a relation is a base table or a view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TableKind {
    Table,
    View,
}

/// Structural description of a relation in a store.
///
/// Produced by connector introspection or assembled from configuration. A table holds at
/// most one primary key field; views may have none.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Table {
    pub name: String,
    pub kind: TableKind,
    pub fields: Vec<Field>,
}

impl Table {
    pub fn new(name: impl Into<String>, kind: TableKind, fields: Vec<Field>) -> Self {
        Self {
            name: name.into(),
            kind,
            fields,
        }
    }

    /// Returns the field flagged as primary key, if any.
    pub fn primary_key(&self) -> Option<&Field> {
        self.fields.iter().find(|field| field.pk)
    }

    /// Looks up a field by name.
    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|field| field.name == name)
    }

    /// Checks the structural constraints of the table.
    ///
    /// A table must carry a non-empty name, at least one field, and at most one primary
    /// key field.
    pub fn validate(&self) -> SyncResult<()> {
        if self.name.is_empty() {
            bail!(ErrorKind::ConfigError, "Table name must not be empty");
        }
        if self.fields.is_empty() {
            bail!(
                ErrorKind::ConfigError,
                "Table has no fields",
                self.name.clone()
            );
        }

        let pk_count = self.fields.iter().filter(|field| field.pk).count();
        if pk_count > 1 {
            bail!(
                ErrorKind::ConfigError,
                "Table has more than one primary key field",
                format!("{} has {pk_count}", self.name)
            );
        }

        Ok(())
    }
}

/// A resolved pairing of a source field with a target field.
///
/// Produced when a table group is resolved against the introspected tables. Either side
/// may be absent: a source-only pairing reads a column that lands nowhere, a target-only
/// pairing is filled by converters. Projection only copies across complete pairs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldMapping {
    pub source: Option<Field>,
    pub target: Option<Field>,
}

impl FieldMapping {
    pub fn new(source: Option<Field>, target: Option<Field>) -> Self {
        Self { source, target }
    }

    pub fn paired(source: Field, target: Field) -> Self {
        Self {
            source: Some(source),
            target: Some(target),
        }
    }
}

/// De-duplicates a field list by name, preserving first occurrence.
///
/// Configuration payloads may mention the same column twice; generated statements and
/// projected rows must name it once.
pub fn dedup_fields(fields: &[Field]) -> Vec<Field> {
    let mut seen = Vec::with_capacity(fields.len());
    let mut out = Vec::with_capacity(fields.len());
    for field in fields {
        if seen.contains(&field.name.as_str()) {
            continue;
        }
        seen.push(field.name.as_str());
        out.push(field.clone());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user_table() -> Table {
        Table::new(
            "USER",
            TableKind::Table,
            vec![
                Field::primary_key("id", ColumnType::BigInt),
                Field::new("name", ColumnType::String),
            ],
        )
    }

    #[test]
    fn test_primary_key_lookup() {
        let table = user_table();
        assert_eq!(table.primary_key().map(|f| f.name.as_str()), Some("id"));
        assert!(table.field("name").is_some());
        assert!(table.field("missing").is_none());
    }

    #[test]
    fn test_validate_accepts_single_pk() {
        assert!(user_table().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_multiple_pks() {
        let table = Table::new(
            "t",
            TableKind::Table,
            vec![
                Field::primary_key("a", ColumnType::Int),
                Field::primary_key("b", ColumnType::Int),
            ],
        );
        let err = table.validate().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConfigError);
    }

    #[test]
    fn test_validate_rejects_empty() {
        let table = Table::new("t", TableKind::Table, vec![]);
        assert!(table.validate().is_err());

        let table = Table::new("", TableKind::Table, vec![Field::new("a", ColumnType::Int)]);
        assert!(table.validate().is_err());
    }

    #[test]
    fn test_dedup_preserves_first_occurrence() {
        let fields = vec![
            Field::primary_key("id", ColumnType::BigInt),
            Field::new("name", ColumnType::String),
            Field::new("id", ColumnType::Int),
            Field::new("name", ColumnType::String),
        ];
        let deduped = dedup_fields(&fields);
        assert_eq!(deduped.len(), 2);
        assert_eq!(deduped[0].name, "id");
        assert!(deduped[0].pk);
        assert_eq!(deduped[1].name, "name");
    }

    #[test]
    fn test_effective_name_prefers_alias() {
        let mut field = Field::new("created_at", ColumnType::Timestamp);
        assert_eq!(field.effective_name(), "created_at");
        field.alias = Some("created".into());
        assert_eq!(field.effective_name(), "created");
    }
}
