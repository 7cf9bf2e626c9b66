use std::time::Duration;

use async_trait::async_trait;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::capture::base::ChangeSource;
use crate::capture::queue::EventTx;
use crate::concurrency::stop::StopRx;
use crate::connector::Connector;
use crate::error::{ErrorKind, SyncResult};
use crate::mapping::TableGroup;
use crate::state::store::MetaStore;
use crate::types::{Filter, FilterOperator, RowChangeEvent, Value};

/// Timer-driven change capture for sources without a change log.
///
/// Every tick re-reads the rows whose event field exceeds the persisted position and
/// emits them as forced updates. Replay is expected: a row captured twice collides
/// with its own earlier write, which the forced update swallows. The position marker
/// is kept per table group in the run's checkpoint map.
pub struct PollingSource<C, S> {
    connector: C,
    meta_store: S,
    mapping_id: u64,
    groups: Vec<TableGroup>,
    /// Source column that orders changes.
    event_field: String,
    interval: Duration,
    page_size: u64,
}

impl<C, S> PollingSource<C, S>
where
    C: Connector + Send + Sync,
    S: MetaStore + Send + Sync,
{
    pub fn new(
        connector: C,
        meta_store: S,
        mapping_id: u64,
        groups: Vec<TableGroup>,
        event_field: impl Into<String>,
        interval: Duration,
        page_size: u64,
    ) -> Self {
        Self {
            connector,
            meta_store,
            mapping_id,
            groups,
            event_field: event_field.into(),
            interval,
            page_size,
        }
    }

    /// Captures one tick across all table groups.
    async fn capture_tick(&self, events: &EventTx) -> SyncResult<()> {
        for group in &self.groups {
            self.capture_group(group, events).await?;
        }

        Ok(())
    }

    async fn capture_group(&self, group: &TableGroup, events: &EventTx) -> SyncResult<()> {
        let table_name = group.source_table.name.as_str();
        let position_key = position_key(table_name);

        let meta = self.meta_store.get_or_create_meta(self.mapping_id).await?;
        // No persisted position yet means the whole table is new to us.
        let past_position = match meta.checkpoint.get(&position_key) {
            Some(position) => vec![Filter::and(
                self.event_field.as_str(),
                FilterOperator::Gt,
                position.as_str(),
            )],
            None => vec![],
        };

        let query = group.source_query_with(&past_position)?;

        let mut position: Option<Value> = None;
        let mut page_index = 1;
        loop {
            let page_args = group.page_args(page_index, self.page_size);
            let rows = self.connector.read(table_name, &query, page_args).await?;
            if rows.is_empty() {
                break;
            }
            let drained = (rows.len() as u64) < self.page_size;

            for row in rows {
                if let Some(value) = row.get(self.event_field.as_str()) {
                    if !value.is_null() && position.as_ref().is_none_or(|p| exceeds(value, p)) {
                        position = Some(value.clone());
                    }
                }

                let mut event = RowChangeEvent::update(table_name, None, row);
                event.force_update = true;
                events.send(event).await?;
            }

            if drained {
                break;
            }
            page_index += 1;
        }

        if let Some(position) = position {
            let position = position.to_text();
            debug!("advancing capture position of {table_name} to {position}");
            self.meta_store
                .mutate_meta(self.mapping_id, |meta| {
                    meta.checkpoint.insert(position_key, position);
                })
                .await?;
        }

        Ok(())
    }
}

#[async_trait]
impl<C, S> ChangeSource for PollingSource<C, S>
where
    C: Connector + Send + Sync,
    S: MetaStore + Send + Sync,
{
    async fn run(self: Box<Self>, events: EventTx, mut stop: StopRx) -> SyncResult<()> {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            "polling capture started for mapping {} on {} every {}ms",
            self.mapping_id,
            self.event_field,
            self.interval.as_millis()
        );

        loop {
            tokio::select! {
                biased;
                _ = stop.changed() => {
                    info!("polling capture for mapping {} stopped", self.mapping_id);
                    return Ok(());
                }
                _ = ticker.tick() => {}
            }

            if let Err(err) = self.capture_tick(&events).await {
                if err.kind() == ErrorKind::EventQueueClosed {
                    info!(
                        "polling capture for mapping {} lost its consumer, exiting",
                        self.mapping_id
                    );
                    return Ok(());
                }
                // The tick retries on the next interval; a flaky source is not fatal.
                warn!("capture tick for mapping {} failed: {err}", self.mapping_id);
            }
        }
    }
}

fn position_key(table_name: &str) -> String {
    format!("position:{table_name}")
}

/// Whether `candidate` comes after `current` in the event field's order.
///
/// Typed comparison where both sides agree on a type, textual comparison otherwise.
/// The store-side filter always compares natively; this only picks the marker to
/// persist.
fn exceeds(candidate: &Value, current: &Value) -> bool {
    match (candidate, current) {
        (Value::I32(a), Value::I32(b)) => a > b,
        (Value::I64(a), Value::I64(b)) => a > b,
        (Value::F64(a), Value::F64(b)) => a > b,
        (Value::Date(a), Value::Date(b)) => a > b,
        (Value::Timestamp(a), Value::Timestamp(b)) => a > b,
        _ => candidate.to_text() > current.to_text(),
    }
}
