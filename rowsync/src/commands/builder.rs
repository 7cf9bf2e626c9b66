use std::collections::HashMap;
use std::fmt;

use crate::commands::dialect::SqlDialect;
use crate::error::{ErrorKind, SyncError, SyncResult};
use crate::types::{Field, Filter, FilterGroup, Table, TableKind};
use crate::{bail, sync_error};

/// Operations a [`CommandSet`] holds a statement for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKind {
    Query,
    QueryCount,
    QueryCountExist,
    Insert,
    Update,
    Delete,
}

impl CommandKind {
    /// Key the operation is published under in the command map.
    pub fn as_key(&self) -> &'static str {
        match self {
            CommandKind::Query => "query",
            CommandKind::QueryCount => "queryCount",
            CommandKind::QueryCountExist => "queryCountExist",
            CommandKind::Insert => "insert",
            CommandKind::Update => "update",
            CommandKind::Delete => "delete",
        }
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_key())
    }
}

/// The generated statement set for one table group.
///
/// Built once when a group is resolved and treated as immutable afterwards; a change to
/// the table, filters, or mapping regenerates the whole set. The source side owns the
/// page read and count statements, the target side the write statements and the
/// existence check used by the update/insert fallback.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandSet {
    pub query: String,
    pub query_count: String,
    pub exists_check: String,
    pub insert: String,
    pub update: String,
    pub delete: String,
}

impl CommandSet {
    /// Returns the statement for an operation.
    pub fn get(&self, kind: CommandKind) -> &str {
        match kind {
            CommandKind::Query => &self.query,
            CommandKind::QueryCount => &self.query_count,
            CommandKind::QueryCountExist => &self.exists_check,
            CommandKind::Insert => &self.insert,
            CommandKind::Update => &self.update,
            CommandKind::Delete => &self.delete,
        }
    }

    /// Publishes the set as a string map keyed by operation name.
    pub fn to_map(&self) -> HashMap<&'static str, String> {
        [
            CommandKind::Query,
            CommandKind::QueryCount,
            CommandKind::QueryCountExist,
            CommandKind::Insert,
            CommandKind::Update,
            CommandKind::Delete,
        ]
        .into_iter()
        .map(|kind| (kind.as_key(), self.get(kind).to_string()))
        .collect()
    }
}

/// Builds the full statement set for a table group.
///
/// `source_table` and `target_table` are the introspected relations; `source_fields` and
/// `target_fields` are the mapped projections, de-duplicated by the caller. Filters apply
/// to the source side only.
pub fn build_commands(
    source_table: &Table,
    source_fields: &[Field],
    target_table: &Table,
    target_fields: &[Field],
    filters: &[Filter],
    source_dialect: &dyn SqlDialect,
    target_dialect: &dyn SqlDialect,
) -> SyncResult<CommandSet> {
    let (query, query_count) =
        build_source_commands(source_table, source_fields, filters, source_dialect)?;
    let (insert, update, delete, exists_check) =
        build_target_commands(target_table, target_fields, target_dialect)?;

    Ok(CommandSet {
        query,
        query_count,
        exists_check,
        insert,
        update,
        delete,
    })
}

/// Builds the source-side page read and count statements.
pub fn build_source_commands(
    table: &Table,
    fields: &[Field],
    filters: &[Filter],
    dialect: &dyn SqlDialect,
) -> SyncResult<(String, String)> {
    table.validate()?;
    if fields.is_empty() {
        bail!(
            ErrorKind::ConfigError,
            "No fields mapped for source table",
            table.name.clone()
        );
    }

    let quoted_table = dialect.quote(&table.name);
    let where_clause = render_filters(filters, dialect);
    let pk = resolve_order_key(fields, table, dialect)?;

    let columns = fields
        .iter()
        .map(|field| quote_field(field, dialect))
        .collect::<Vec<_>>()
        .join(", ");
    let base = format!("SELECT {columns} FROM {quoted_table}{where_clause}");
    let query = dialect.page_query(&base, &pk);

    // Views without a key count plain rows; keyed reads deduplicate by grouping on it.
    let inner = if pk.is_empty() {
        format!("SELECT 1 FROM {quoted_table}{where_clause}")
    } else {
        format!("SELECT {pk} FROM {quoted_table}{where_clause} GROUP BY {pk}")
    };
    let query_count = dialect.count_query(&inner);

    Ok((query, query_count))
}

/// Builds the target-side insert, update, delete, and existence check statements.
///
/// Statement parameters are positional: inserts bind every field in order, updates bind
/// the non-key fields first and the primary key last, deletes and existence checks bind
/// the primary key alone.
pub fn build_target_commands(
    table: &Table,
    fields: &[Field],
    dialect: &dyn SqlDialect,
) -> SyncResult<(String, String, String, String)> {
    table.validate()?;
    if fields.is_empty() {
        bail!(
            ErrorKind::ConfigError,
            "No fields mapped for target table",
            table.name.clone()
        );
    }

    // The key must be a mapped field: update, delete, and the existence check bind its
    // value from the projected row.
    let pk = fields.iter().find(|field| field.pk).or_else(|| {
        table
            .primary_key()
            .and_then(|table_pk| fields.iter().find(|field| field.name == table_pk.name))
    });
    let Some(pk) = pk else {
        bail!(
            ErrorKind::DialectError,
            "Target table has no resolvable primary key among the mapped fields",
            table.name.clone()
        );
    };
    let quoted_pk = quote_field(pk, dialect);
    let quoted_table = dialect.quote(&table.name);

    let columns = fields
        .iter()
        .map(|field| quote_field(field, dialect))
        .collect::<Vec<_>>()
        .join(", ");
    let values = (1..=fields.len())
        .map(|index| dialect.placeholder(index))
        .collect::<Vec<_>>()
        .join(", ");
    let insert = format!("INSERT INTO {quoted_table} ({columns}) VALUES ({values})");

    let set_fields: Vec<&Field> = fields.iter().filter(|field| field.name != pk.name).collect();
    if set_fields.is_empty() {
        bail!(
            ErrorKind::ConfigError,
            "Update requires at least one non-key field",
            table.name.clone()
        );
    }
    let assignments = set_fields
        .iter()
        .enumerate()
        .map(|(index, field)| {
            format!("{} = {}", quote_field(field, dialect), dialect.placeholder(index + 1))
        })
        .collect::<Vec<_>>()
        .join(", ");
    let update = format!(
        "UPDATE {quoted_table} SET {assignments} WHERE {quoted_pk} = {}",
        dialect.placeholder(set_fields.len() + 1)
    );

    let delete = format!(
        "DELETE FROM {quoted_table} WHERE {quoted_pk} = {}",
        dialect.placeholder(1)
    );
    let exists_check = format!(
        "SELECT COUNT(1) FROM {quoted_table} WHERE {quoted_pk} = {}",
        dialect.placeholder(1)
    );

    Ok((insert, update, delete, exists_check))
}

/// Renders a filter list as a WHERE clause.
///
/// Predicates in the AND group conjoin, predicates in the OR group disjoin, and the two
/// groups combine as `(AND...) OR (OR...)`. Returns the empty string for an empty list;
/// otherwise the clause is prefixed with ` WHERE `.
pub fn render_filters(filters: &[Filter], dialect: &dyn SqlDialect) -> String {
    let render = |filter: &Filter| {
        format!(
            "{} {} {}",
            dialect.quote(&filter.field),
            filter.operator.as_sql(),
            render_value(&filter.value)
        )
    };

    let and: Vec<String> = filters
        .iter()
        .filter(|filter| filter.group == FilterGroup::And)
        .map(render)
        .collect();
    let or: Vec<String> = filters
        .iter()
        .filter(|filter| filter.group == FilterGroup::Or)
        .map(render)
        .collect();

    let clause = match (and.is_empty(), or.is_empty()) {
        (true, true) => return String::new(),
        (false, true) => format!("({})", and.join(" AND ")),
        (true, false) => format!("({})", or.join(" OR ")),
        (false, false) => format!("({}) OR ({})", and.join(" AND "), or.join(" OR ")),
    };

    format!(" WHERE {clause}")
}

/// Renders a filter comparison value as a SQL literal.
///
/// Finite numbers are emitted bare; everything else becomes a single-quoted string with
/// embedded quotes doubled.
fn render_value(value: &str) -> String {
    let numeric = value.parse::<i64>().is_ok()
        || value.parse::<f64>().map(|v| v.is_finite()).unwrap_or(false);
    if numeric {
        value.to_string()
    } else {
        format!("'{}'", value.replace('\'', "''"))
    }
}

/// Resolves the quoted ordering and grouping key for source reads.
///
/// Prefers a mapped field carrying the primary key flag, then the introspected table
/// key. Views may resolve to no key; a base table without one cannot be paged reliably.
fn resolve_order_key(
    fields: &[Field],
    table: &Table,
    dialect: &dyn SqlDialect,
) -> SyncResult<String> {
    let pk = fields
        .iter()
        .find(|field| field.pk)
        .or_else(|| table.primary_key());

    match pk {
        Some(field) => Ok(quote_field(field, dialect)),
        None if table.kind == TableKind::View => Ok(String::new()),
        None => Err(sync_error!(
            ErrorKind::DialectError,
            "Table has no resolvable primary key",
            table.name.clone()
        )),
    }
}

fn quote_field(field: &Field, dialect: &dyn SqlDialect) -> String {
    if field.unmodifiable {
        field.name.clone()
    } else {
        dialect.quote(&field.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::dialect::{MySqlDialect, PostgresDialect, SqlServerDialect};
    use crate::types::{dedup_fields, ColumnType, FilterOperator};

    fn user_table(name: &str) -> Table {
        Table::new(
            name,
            TableKind::Table,
            vec![
                Field::primary_key("id", ColumnType::BigInt),
                Field::new("name", ColumnType::String),
            ],
        )
    }

    fn build_user_commands(dialect: &dyn SqlDialect) -> CommandSet {
        let source = user_table("USER");
        let target = user_table("USER2");
        build_commands(
            &source,
            &source.fields,
            &target,
            &target.fields,
            &[],
            dialect,
            dialect,
        )
        .unwrap()
    }

    #[test]
    fn test_mysql_command_set() {
        let commands = build_user_commands(&MySqlDialect);

        assert_eq!(
            commands.query,
            "SELECT `id`, `name` FROM `USER` LIMIT ?, ?"
        );
        assert_eq!(
            commands.query_count,
            "SELECT COUNT(1) FROM (SELECT `id` FROM `USER` GROUP BY `id`) ROWSYNC_T"
        );
        assert_eq!(
            commands.insert,
            "INSERT INTO `USER2` (`id`, `name`) VALUES (?, ?)"
        );
        assert_eq!(
            commands.update,
            "UPDATE `USER2` SET `name` = ? WHERE `id` = ?"
        );
        assert_eq!(commands.delete, "DELETE FROM `USER2` WHERE `id` = ?");
        assert_eq!(
            commands.exists_check,
            "SELECT COUNT(1) FROM `USER2` WHERE `id` = ?"
        );
    }

    #[test]
    fn test_postgres_numbers_parameters() {
        let commands = build_user_commands(&PostgresDialect);

        assert_eq!(
            commands.query,
            "SELECT \"id\", \"name\" FROM \"USER\" ORDER BY \"id\" LIMIT $1 OFFSET $2"
        );
        assert_eq!(
            commands.insert,
            "INSERT INTO \"USER2\" (\"id\", \"name\") VALUES ($1, $2)"
        );
        // The primary key binds last.
        assert_eq!(
            commands.update,
            "UPDATE \"USER2\" SET \"name\" = $1 WHERE \"id\" = $2"
        );
        assert_eq!(commands.delete, "DELETE FROM \"USER2\" WHERE \"id\" = $1");
    }

    #[test]
    fn test_sqlserver_windows_the_page_read() {
        let commands = build_user_commands(&SqlServerDialect);
        assert!(commands.query.starts_with("SELECT * FROM (SELECT ROW_NUMBER()"));
        assert!(commands.query.contains("FROM (SELECT [id], [name] FROM [USER]) S"));
        assert!(commands.query.ends_with("BETWEEN ? AND ?"));
    }

    #[test]
    fn test_build_is_idempotent() {
        let first = build_user_commands(&MySqlDialect);
        let second = build_user_commands(&MySqlDialect);
        assert_eq!(first, second);
    }

    #[test]
    fn test_filters_render_where_iff_non_empty() {
        assert_eq!(render_filters(&[], &MySqlDialect), "");

        let filters = vec![Filter::and("age", FilterOperator::GtEq, "18")];
        let clause = render_filters(&filters, &MySqlDialect);
        assert_eq!(clause, " WHERE (`age` >= 18)");
    }

    #[test]
    fn test_filters_combine_and_or_groups() {
        let filters = vec![
            Filter::and("age", FilterOperator::GtEq, "18"),
            Filter::and("state", FilterOperator::Eq, "active"),
            Filter::or("vip", FilterOperator::Eq, "1"),
        ];
        let clause = render_filters(&filters, &MySqlDialect);
        assert_eq!(
            clause,
            " WHERE (`age` >= 18 AND `state` = 'active') OR (`vip` = 1)"
        );
    }

    #[test]
    fn test_filters_keep_parentheses_balanced() {
        let filters = vec![
            Filter::and("a", FilterOperator::Eq, "1"),
            Filter::or("b", FilterOperator::NotEq, "x"),
            Filter::or("c", FilterOperator::Lt, "3"),
        ];
        let clause = render_filters(&filters, &MySqlDialect);
        let opens = clause.matches('(').count();
        let closes = clause.matches(')').count();
        assert_eq!(opens, closes);
        assert!(clause.starts_with(" WHERE "));
    }

    #[test]
    fn test_filter_values_escape_quotes() {
        let filters = vec![Filter::and("name", FilterOperator::Eq, "o'brien")];
        let clause = render_filters(&filters, &MySqlDialect);
        assert_eq!(clause, " WHERE (`name` = 'o''brien')");
    }

    #[test]
    fn test_filter_clause_lands_in_query_and_count() {
        let source = user_table("USER");
        let filters = vec![Filter::and("id", FilterOperator::Gt, "100")];
        let (query, count) =
            build_source_commands(&source, &source.fields, &filters, &MySqlDialect).unwrap();
        assert!(query.contains(" WHERE (`id` > 100)"));
        assert!(count.contains(" WHERE (`id` > 100)"));
    }

    #[test]
    fn test_duplicate_fields_collapse() {
        let source = user_table("USER");
        let fields = dedup_fields(&[
            Field::primary_key("id", ColumnType::BigInt),
            Field::new("name", ColumnType::String),
            Field::new("id", ColumnType::BigInt),
        ]);
        let (query, _) = build_source_commands(&source, &fields, &[], &MySqlDialect).unwrap();
        assert!(query.starts_with("SELECT `id`, `name` FROM"));
    }

    #[test]
    fn test_pk_falls_back_to_introspected_table() {
        let source = user_table("USER");
        // Mapped fields carry no pk flag; the introspected table key takes over.
        let fields = vec![Field::new("name", ColumnType::String)];
        let (query, count) = build_source_commands(&source, &fields, &[], &PostgresDialect).unwrap();
        assert!(query.contains("ORDER BY \"id\""));
        assert!(count.contains("GROUP BY \"id\""));
        // The fallback key is never injected into the projection.
        assert!(query.starts_with("SELECT \"name\" FROM"));
    }

    #[test]
    fn test_view_without_key_reads_unordered() {
        let view = Table::new(
            "V_USER",
            TableKind::View,
            vec![Field::new("name", ColumnType::String)],
        );
        let (query, count) =
            build_source_commands(&view, &view.fields, &[], &PostgresDialect).unwrap();
        assert!(!query.contains("ORDER BY"));
        assert!(!count.contains("GROUP BY"));
        assert_eq!(
            count,
            "SELECT COUNT(1) FROM (SELECT 1 FROM \"V_USER\") ROWSYNC_T"
        );
    }

    #[test]
    fn test_table_without_key_is_rejected() {
        let table = Table::new(
            "NOKEY",
            TableKind::Table,
            vec![Field::new("name", ColumnType::String)],
        );
        let err = build_source_commands(&table, &table.fields, &[], &MySqlDialect).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DialectError);

        let err = build_target_commands(&table, &table.fields, &MySqlDialect).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DialectError);
    }

    #[test]
    fn test_unmapped_table_key_is_rejected_for_writes() {
        // The table has a key, but the mapped fields never project it, so the write
        // statements could not bind it.
        let table = user_table("USER2");
        let fields = vec![Field::new("name", ColumnType::String)];
        let err = build_target_commands(&table, &fields, &MySqlDialect).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DialectError);
    }

    #[test]
    fn test_unmodifiable_field_skips_quoting() {
        let mut expr = Field::new("UPPER(name)", ColumnType::String);
        expr.unmodifiable = true;
        let source = Table::new(
            "USER",
            TableKind::Table,
            vec![Field::primary_key("id", ColumnType::BigInt), expr.clone()],
        );
        let fields = vec![Field::primary_key("id", ColumnType::BigInt), expr];
        let (query, _) = build_source_commands(&source, &fields, &[], &MySqlDialect).unwrap();
        assert!(query.contains("`id`, UPPER(name)"));
    }

    #[test]
    fn test_command_map_keys() {
        let commands = build_user_commands(&MySqlDialect);
        let map = commands.to_map();
        for key in [
            "query",
            "queryCount",
            "queryCountExist",
            "insert",
            "update",
            "delete",
        ] {
            assert!(map.contains_key(key), "missing key {key}");
        }
    }
}
