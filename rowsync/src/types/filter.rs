use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{ErrorKind, SyncError, SyncResult};
use crate::sync_error;

/// Comparison operators accepted in filter predicates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FilterOperator {
    Eq,
    NotEq,
    Gt,
    Lt,
    GtEq,
    LtEq,
}

impl FilterOperator {
    /// SQL rendering of the operator.
    pub fn as_sql(&self) -> &'static str {
        match self {
            FilterOperator::Eq => "=",
            FilterOperator::NotEq => "!=",
            FilterOperator::Gt => ">",
            FilterOperator::Lt => "<",
            FilterOperator::GtEq => ">=",
            FilterOperator::LtEq => "<=",
        }
    }

    /// Parses the operator from its configuration spelling.
    pub fn parse(raw: &str) -> SyncResult<Self> {
        match raw {
            "=" => Ok(FilterOperator::Eq),
            "!=" => Ok(FilterOperator::NotEq),
            ">" => Ok(FilterOperator::Gt),
            "<" => Ok(FilterOperator::Lt),
            ">=" => Ok(FilterOperator::GtEq),
            "<=" => Ok(FilterOperator::LtEq),
            other => Err(sync_error!(
                ErrorKind::ConfigError,
                "Unknown filter operator",
                other
            )),
        }
    }
}

impl fmt::Display for FilterOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_sql())
    }
}

/// Logical group a filter predicate belongs to.
///
/// Predicates in the AND group are conjoined, predicates in the OR group are disjoined,
/// and the two groups combine as `(AND...) OR (OR...)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FilterGroup {
    And,
    Or,
}

impl FilterGroup {
    pub fn parse(raw: &str) -> SyncResult<Self> {
        match raw.to_ascii_lowercase().as_str() {
            "and" => Ok(FilterGroup::And),
            "or" => Ok(FilterGroup::Or),
            other => Err(sync_error!(
                ErrorKind::ConfigError,
                "Unknown filter group",
                other
            )),
        }
    }
}

/// A single filter predicate over a source table column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Filter {
    /// Column the predicate applies to.
    pub field: String,
    pub operator: FilterOperator,
    /// Comparison value in textual form. Rendered as a numeric literal when it parses
    /// as a number, as a quoted string literal otherwise.
    pub value: String,
    pub group: FilterGroup,
}

impl Filter {
    pub fn and(field: impl Into<String>, operator: FilterOperator, value: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            operator,
            value: value.into(),
            group: FilterGroup::And,
        }
    }

    pub fn or(field: impl Into<String>, operator: FilterOperator, value: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            operator,
            value: value.into(),
            group: FilterGroup::Or,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operator_parse_round_trip() {
        for raw in ["=", "!=", ">", "<", ">=", "<="] {
            let op = FilterOperator::parse(raw).unwrap();
            assert_eq!(op.as_sql(), raw);
        }
    }

    #[test]
    fn test_operator_parse_rejects_unknown() {
        let err = FilterOperator::parse("like").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConfigError);
    }

    #[test]
    fn test_group_parse() {
        assert_eq!(FilterGroup::parse("and").unwrap(), FilterGroup::And);
        assert_eq!(FilterGroup::parse("OR").unwrap(), FilterGroup::Or);
        assert!(FilterGroup::parse("xor").is_err());
    }
}
