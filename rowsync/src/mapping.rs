//! Resolution of declarative table groups into runnable state.
//!
//! A [`config::shared::TableGroupConfig`] names tables, fields, filters, and converters
//! by string. Resolution pairs those names against the introspected tables, generates
//! the statement set, and binds the converter chain, producing the immutable
//! [`TableGroup`] the workers run against. A change to the configuration resolves a
//! fresh group; nothing here is patched in place.

use std::sync::Arc;

use config::shared::{FilterConfig, TableGroupConfig};
use tracing::debug;

use crate::commands::{CommandSet, SqlDialect, build_commands, build_source_commands};
use crate::error::SyncResult;
use crate::picker::{
    FieldConverter, Picker, RowHook, apply_converters, apply_hook, resolve_converters,
};
use crate::types::{
    Field, FieldMapping, Filter, FilterGroup, FilterOperator, Row, Table, dedup_fields,
};

/// One resolved source-table-to-target-table unit of a mapping.
///
/// Owns its field mappings, filters, generated commands, and converter chain. Treated
/// as immutable for the lifetime of a run.
#[derive(Debug, Clone)]
pub struct TableGroup {
    pub source_table: Table,
    pub target_table: Table,
    pub field_mappings: Vec<FieldMapping>,
    /// De-duplicated source projection, in read order.
    pub source_fields: Vec<Field>,
    pub picker: Picker,
    pub filters: Vec<Filter>,
    pub commands: CommandSet,
    pub converters: Vec<FieldConverter>,
    pub hook: Option<Arc<dyn RowHook>>,
    source_dialect: &'static dyn SqlDialect,
}

impl TableGroup {
    /// Regenerates the source page read with extra predicates appended.
    ///
    /// Polling capture narrows each tick's read to rows past the persisted position,
    /// so the statement cannot be generated once up front.
    pub fn source_query_with(&self, extra: &[Filter]) -> SyncResult<String> {
        let mut filters = self.filters.clone();
        filters.extend_from_slice(extra);

        let (query, _) = build_source_commands(
            &self.source_table,
            &self.source_fields,
            &filters,
            self.source_dialect,
        )?;

        Ok(query)
    }

    /// Bind values for the page read's two pagination parameters.
    pub fn page_args(&self, page_index: u64, page_size: u64) -> [u64; 2] {
        self.source_dialect.page_args(page_index, page_size)
    }

    /// Projects source rows into target shape: picker, converter chain, then hook.
    pub fn project_rows(&self, sources: &[Row]) -> Vec<Row> {
        let mut targets = self.picker.pick_rows(sources);
        for target in targets.iter_mut() {
            apply_converters(&self.converters, target);
        }
        apply_hook(self.hook.as_deref(), sources, &mut targets);
        targets
    }
}

/// Resolves a declarative table group against the introspected tables.
///
/// Field mapping entries resolve by name: entries with both sides absent and entries
/// naming fields that do not exist are skipped, and an entry's `pk` flag transfers to
/// the resolved target field. The generated commands and converter chain are validated
/// here so runs start from a known-good group.
pub fn resolve_table_group(
    spec: &TableGroupConfig,
    source_table: Table,
    target_table: Table,
    source_dialect: &'static dyn SqlDialect,
    target_dialect: &'static dyn SqlDialect,
    hook: Option<Arc<dyn RowHook>>,
) -> SyncResult<TableGroup> {
    let field_mappings = resolve_field_mappings(spec, &source_table, &target_table);

    let source_fields = dedup_fields(
        &field_mappings
            .iter()
            .filter_map(|mapping| mapping.source.clone())
            .collect::<Vec<_>>(),
    );
    let picker = Picker::new(&field_mappings);

    let filters = spec
        .filters
        .iter()
        .map(parse_filter)
        .collect::<SyncResult<Vec<_>>>()?;

    let commands = build_commands(
        &source_table,
        &source_fields,
        &target_table,
        picker.target_fields(),
        &filters,
        source_dialect,
        target_dialect,
    )?;

    let converters = resolve_converters(&spec.converters)?;

    Ok(TableGroup {
        source_table,
        target_table,
        field_mappings,
        source_fields,
        picker,
        filters,
        commands,
        converters,
        hook,
        source_dialect,
    })
}

fn resolve_field_mappings(
    spec: &TableGroupConfig,
    source_table: &Table,
    target_table: &Table,
) -> Vec<FieldMapping> {
    let mut mappings = Vec::with_capacity(spec.field_mappings.len());

    for entry in &spec.field_mappings {
        if entry.source.is_none() && entry.target.is_none() {
            debug!(
                "skipping field mapping entry with no source and no target in {} -> {}",
                source_table.name, target_table.name
            );
            continue;
        }

        let source = match &entry.source {
            Some(name) => match source_table.field(name) {
                Some(field) => Some(field.clone()),
                None => {
                    debug!(
                        "skipping field mapping entry, source field {} not found in {}",
                        name, source_table.name
                    );
                    continue;
                }
            },
            None => None,
        };

        let target = match &entry.target {
            Some(name) => match target_table.field(name) {
                Some(field) => Some(field.clone()),
                None => {
                    debug!(
                        "skipping field mapping entry, target field {} not found in {}",
                        name, target_table.name
                    );
                    continue;
                }
            },
            None => None,
        };

        let mut mapping = FieldMapping::new(source, target);
        if entry.pk {
            if let Some(target) = mapping.target.as_mut() {
                target.pk = true;
            }
        }

        mappings.push(mapping);
    }

    mappings
}

fn parse_filter(config: &FilterConfig) -> SyncResult<Filter> {
    Ok(Filter {
        field: config.field.clone(),
        operator: FilterOperator::parse(&config.operator)?,
        value: config.value.clone(),
        group: FilterGroup::parse(&config.group)?,
    })
}
