use async_trait::async_trait;
use chrono::{DateTime, Utc};
use scylla::client::session::Session;
use scylla::response::query_result::QueryResult;
use scylla::statement::batch::Batch;
use scylla::value::{CqlValue, Row};
use std::marker::PhantomData;
use std::sync::Arc;
use uuid::Uuid;

use crate::event_sourcing::core::{deserialize_event, serialize_event, DomainEvent, EventEnvelope};
use super::event_store::{EventStore, StoreError};

// ============================================================================
// ScyllaDB Event Store
// ============================================================================
//
// One table per aggregate type, partitioned by aggregate id and clustered by
// sequence number. Appends are a conditional batch of `INSERT ... IF NOT
// EXISTS` statements on the same partition: if another writer already took
// one of the sequence numbers the whole batch is rejected, which is the
// optimistic concurrency check.
//
// ============================================================================

type EventRow = (
    Uuid,
    i64,
    Uuid,
    String,
    i32,
    String,
    Option<Uuid>,
    Uuid,
    Option<Uuid>,
    DateTime<Utc>,
);

pub struct ScyllaEventStore<E: DomainEvent> {
    session: Arc<Session>,
    table: &'static str,
    _phantom: PhantomData<E>,
}

impl<E: DomainEvent> ScyllaEventStore<E> {
    /// `table` must be one of the event tables created by the schema module.
    pub fn new(session: Arc<Session>, table: &'static str) -> Self {
        Self {
            session,
            table,
            _phantom: PhantomData,
        }
    }
}

#[async_trait]
impl<E: DomainEvent + 'static> EventStore<E> for ScyllaEventStore<E> {
    async fn append_events(
        &self,
        aggregate_id: Uuid,
        expected_version: i64,
        events: Vec<EventEnvelope<E>>,
    ) -> Result<i64, StoreError> {
        if events.is_empty() {
            return Err(StoreError::EmptyAppend);
        }

        let insert = format!(
            "INSERT INTO {} (
                aggregate_id, sequence_number, event_id, event_type, event_version,
                event_data, causation_id, correlation_id, user_id, timestamp
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?) IF NOT EXISTS",
            self.table
        );

        let mut batch = Batch::default();
        let mut values: Vec<EventRow> = Vec::with_capacity(events.len());
        let mut new_version = expected_version;

        for envelope in &events {
            new_version += 1;
            batch.append_statement(insert.as_str());
            values.push((
                aggregate_id,
                new_version,
                envelope.event_id,
                envelope.event_type.clone(),
                envelope.event_version,
                serialize_event(&envelope.event_data)?,
                envelope.causation_id,
                envelope.correlation_id,
                envelope.user_id,
                envelope.timestamp,
            ));
        }

        let result = self
            .session
            .batch(&batch, values)
            .await
            .map_err(StoreError::backend)?;

        if !lwt_applied(result)? {
            let actual = self.current_version(aggregate_id).await?;
            tracing::warn!(
                aggregate_id = %aggregate_id,
                table = self.table,
                expected_version = expected_version,
                actual_version = actual,
                "Conditional append rejected"
            );
            return Err(StoreError::ConcurrencyConflict {
                aggregate_id,
                expected: expected_version,
                actual,
            });
        }

        tracing::info!(
            aggregate_id = %aggregate_id,
            table = self.table,
            new_version = new_version,
            event_count = events.len(),
            "✅ Appended events to event store"
        );

        Ok(new_version)
    }

    async fn load_events(&self, aggregate_id: Uuid) -> Result<Vec<EventEnvelope<E>>, StoreError> {
        let query = format!(
            "SELECT aggregate_id, sequence_number, event_id, event_type, event_version,
                    event_data, causation_id, correlation_id, user_id, timestamp
             FROM {}
             WHERE aggregate_id = ?",
            self.table
        );

        let result = self
            .session
            .query_unpaged(query, (aggregate_id,))
            .await
            .map_err(StoreError::backend)?;

        let mut events = Vec::new();

        let rows_result = match result.into_rows_result() {
            Ok(rows) => rows,
            Err(_) => return Ok(events),
        };

        for row in rows_result.rows::<EventRow>().map_err(StoreError::backend)? {
            let (agg_id, sequence_number, event_id, event_type, event_version, event_data_json, causation_id, correlation_id, user_id, timestamp) =
                row.map_err(StoreError::backend)?;

            let event_data: E = deserialize_event(&event_data_json)?;

            events.push(EventEnvelope {
                event_id,
                aggregate_id: agg_id,
                sequence_number,
                event_type,
                event_version,
                event_data,
                causation_id,
                correlation_id,
                user_id,
                timestamp,
            });
        }

        tracing::debug!("Loaded {} events for aggregate {}", events.len(), aggregate_id);
        Ok(events)
    }

    async fn current_version(&self, aggregate_id: Uuid) -> Result<i64, StoreError> {
        let query = format!(
            "SELECT sequence_number FROM {} WHERE aggregate_id = ? ORDER BY sequence_number DESC LIMIT 1",
            self.table
        );

        let result = self
            .session
            .query_unpaged(query, (aggregate_id,))
            .await
            .map_err(StoreError::backend)?;

        let rows_result = match result.into_rows_result() {
            Ok(rows) => rows,
            Err(_) => return Ok(0),
        };

        match rows_result.maybe_first_row::<(i64,)>() {
            Ok(Some((version,))) => Ok(version),
            Ok(None) => Ok(0),
            Err(e) => Err(StoreError::backend(e)),
        }
    }

    fn backend_name(&self) -> &'static str {
        "scylla"
    }
}

/// Lightweight transactions answer with an `[applied]` column first.
pub(crate) fn lwt_applied(result: QueryResult) -> Result<bool, StoreError> {
    match result.into_rows_result() {
        Ok(rows) => Ok(rows
            .maybe_first_row::<Row>()
            .map_err(StoreError::backend)?
            .and_then(|row| row.columns.into_iter().next().flatten())
            .map_or(true, |value| matches!(value, CqlValue::Boolean(true)))),
        Err(_) => Ok(true),
    }
}
