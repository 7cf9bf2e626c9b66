use serde::{Deserialize, Serialize};

use crate::shared::ValidationError;

/// Replication model of a mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncModel {
    /// One-shot paged copy of the mapped tables.
    Full,
    /// Continuous change capture and replay.
    Increment,
}

/// Timer-driven change capture settings.
///
/// Used by mappings in increment mode whose source exposes no change log: rows whose
/// `event_field` exceeds the persisted position are re-read on every tick.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct PollingConfig {
    /// Milliseconds between capture ticks.
    #[serde(default = "default_polling_interval_ms")]
    pub interval_ms: u64,
    /// Source column that orders changes, usually a modification timestamp.
    pub event_field: String,
}

/// One source-field-to-target-field link inside a table group.
///
/// Either side may be omitted. Entries whose names match nothing in the introspected
/// tables are skipped during resolution.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct FieldMappingConfig {
    pub source: Option<String>,
    pub target: Option<String>,
    /// Marks the resolved target field as the write key.
    #[serde(default)]
    pub pk: bool,
}

/// A filter predicate applied to source reads.
///
/// `operator` and `group` are parsed by the engine when the table group is resolved;
/// unsupported values fail there.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct FilterConfig {
    pub field: String,
    pub operator: String,
    pub value: String,
    /// Either `and` or `or`.
    #[serde(default = "default_filter_group")]
    pub group: String,
}

/// A named value transform attached to a target field.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ConverterConfig {
    pub field: String,
    pub name: String,
    #[serde(default)]
    pub args: Vec<String>,
}

/// One source-table-to-target-table unit of a mapping.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct TableGroupConfig {
    pub source_table: String,
    pub target_table: String,
    pub field_mappings: Vec<FieldMappingConfig>,
    #[serde(default)]
    pub filters: Vec<FilterConfig>,
    #[serde(default)]
    pub converters: Vec<ConverterConfig>,
}

impl TableGroupConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.source_table.is_empty() || self.target_table.is_empty() {
            return Err(ValidationError::InvalidConfig(
                "table group source and target table names must not be empty".to_string(),
            ));
        }
        if self.field_mappings.is_empty() {
            return Err(ValidationError::InvalidConfig(format!(
                "table group [{}] -> [{}] has no field mappings",
                self.source_table, self.target_table
            )));
        }

        Ok(())
    }
}

/// A synchronization job definition.
///
/// Links one source connector to one target connector through a set of table groups.
/// Exactly one run may be live per mapping at a time; the id keys that isolation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct MappingConfig {
    /// The unique identifier for this mapping.
    ///
    /// Determines isolation between concurrent jobs in terms of run records and
    /// checkpoints.
    pub id: u64,
    /// Human-readable job name used in logs.
    pub name: String,
    pub model: SyncModel,
    /// Rows fetched per source page read.
    #[serde(default = "default_page_size")]
    pub page_size: u64,
    /// Rows per target write chunk; pages larger than this fan out across workers.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Maximum number of concurrent target write chunks.
    #[serde(default = "default_max_write_workers")]
    pub max_write_workers: u16,
    /// Capacity of the bounded change-event queue in increment mode.
    ///
    /// Producers block once the queue is full; events are never dropped.
    #[serde(default = "default_event_queue_capacity")]
    pub event_queue_capacity: usize,
    /// Swallows write errors during change replay instead of recording failures.
    #[serde(default)]
    pub force_update: bool,
    /// Change capture settings, required in increment mode.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub polling: Option<PollingConfig>,
    pub groups: Vec<TableGroupConfig>,
}

impl MappingConfig {
    /// Validates the mapping configuration.
    ///
    /// Checks sizes, worker limits, the polling section, and every table group.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.page_size == 0 {
            return Err(ValidationError::ZeroPageSize);
        }
        if self.batch_size == 0 {
            return Err(ValidationError::ZeroBatchSize);
        }
        if self.max_write_workers == 0 {
            return Err(ValidationError::ZeroWriteWorkers);
        }
        if self.event_queue_capacity == 0 {
            return Err(ValidationError::InvalidConfig(
                "mapping `event_queue_capacity` must be greater than zero".to_string(),
            ));
        }
        if self.groups.is_empty() {
            return Err(ValidationError::NoTableGroups);
        }
        if self.model == SyncModel::Increment {
            match &self.polling {
                None => return Err(ValidationError::MissingPollingSettings),
                Some(polling) if polling.event_field.is_empty() => {
                    return Err(ValidationError::InvalidConfig(
                        "polling `event_field` must not be empty".to_string(),
                    ));
                }
                Some(polling) if polling.interval_ms == 0 => {
                    return Err(ValidationError::InvalidConfig(
                        "polling `interval_ms` must be greater than zero".to_string(),
                    ));
                }
                Some(_) => {}
            }
        }

        for group in &self.groups {
            group.validate()?;
        }

        Ok(())
    }
}

fn default_polling_interval_ms() -> u64 {
    30_000
}

fn default_page_size() -> u64 {
    1000
}

fn default_batch_size() -> usize {
    100
}

fn default_max_write_workers() -> u16 {
    4
}

fn default_event_queue_capacity() -> usize {
    100
}

fn default_filter_group() -> String {
    "and".to_string()
}
