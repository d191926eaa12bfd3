//! Postgres-backed event store, one schema per tenant.
//!
//! Every tenant's events live in the tenant's own Postgres schema
//! (`tenant_<uuid>`), created during provisioning. The schema name is
//! derived from the tenant id, so it never contains user input and can be
//! interpolated into DDL/DML safely.
//!
//! Concurrency control is optimistic: the current stream version is read
//! inside a transaction and the unique constraint on
//! `(aggregate_id, sequence_number)` turns a concurrent append into a
//! `23505` unique violation, surfaced as `EventStoreError::Concurrency`.

use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Row, Transaction};
use std::sync::Arc;
use tracing::instrument;

use ventora_core::{AggregateId, ExpectedVersion, TenantId};
use ventora_tenants::schema_name_for;

use super::store::{EventStore, EventStoreError, StoredEvent, UncommittedEvent};

#[derive(Debug, Clone)]
pub struct PostgresEventStore {
    pool: Arc<PgPool>,
}

impl PostgresEventStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    /// Create the tenant's schema and event table if they do not exist.
    ///
    /// Called by the provisioning worker after a company registers.
    #[instrument(skip(self), fields(tenant_id = %tenant_id.as_uuid()), err)]
    pub async fn provision_tenant(&self, tenant_id: TenantId) -> Result<(), EventStoreError> {
        let schema = schema_name_for(tenant_id);

        sqlx::query(&format!(r#"CREATE SCHEMA IF NOT EXISTS "{schema}""#))
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("create_schema", e))?;

        sqlx::query(&format!(
            r#"
            CREATE TABLE IF NOT EXISTS "{schema}".events (
                event_id UUID PRIMARY KEY,
                aggregate_id UUID NOT NULL,
                aggregate_type TEXT NOT NULL,
                sequence_number BIGINT NOT NULL CHECK (sequence_number > 0),
                event_type TEXT NOT NULL,
                event_version INT NOT NULL,
                occurred_at TIMESTAMPTZ NOT NULL,
                payload JSONB NOT NULL,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                UNIQUE (aggregate_id, sequence_number)
            )
            "#
        ))
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("create_events_table", e))?;

        sqlx::query(&format!(
            r#"
            CREATE TABLE IF NOT EXISTS "{schema}".projection_offsets (
                aggregate_id UUID NOT NULL,
                projection_name TEXT NOT NULL,
                last_sequence_number BIGINT NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                PRIMARY KEY (aggregate_id, projection_name)
            )
            "#
        ))
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("create_offsets_table", e))?;

        sqlx::query(&format!(
            r#"
            CREATE TABLE IF NOT EXISTS "{schema}".number_sequences (
                document_kind TEXT NOT NULL,
                year INT NOT NULL,
                next_value BIGINT NOT NULL DEFAULT 1,
                PRIMARY KEY (document_kind, year)
            )
            "#
        ))
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("create_sequences_table", e))?;

        Ok(())
    }

    #[instrument(
        skip(self),
        fields(tenant_id = %tenant_id.as_uuid(), aggregate_id = %aggregate_id.as_uuid()),
        err
    )]
    pub async fn load_stream_async(
        &self,
        tenant_id: TenantId,
        aggregate_id: AggregateId,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        let schema = schema_name_for(tenant_id);

        let rows = sqlx::query(&format!(
            r#"
            SELECT
                event_id,
                aggregate_id,
                aggregate_type,
                sequence_number,
                event_type,
                event_version,
                occurred_at,
                payload
            FROM "{schema}".events
            WHERE aggregate_id = $1
            ORDER BY sequence_number ASC
            "#
        ))
        .bind(aggregate_id.as_uuid())
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("load_stream", e))?;

        let mut stored = Vec::with_capacity(rows.len());
        for row in rows {
            stored.push(row_to_stored(tenant_id, &row)?);
        }
        Ok(stored)
    }

    /// Every event in the tenant's schema, ordered for projection rebuilds.
    #[instrument(skip(self), fields(tenant_id = %tenant_id.as_uuid()), err)]
    pub async fn load_tenant_async(
        &self,
        tenant_id: TenantId,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        let schema = schema_name_for(tenant_id);

        let rows = sqlx::query(&format!(
            r#"
            SELECT
                event_id,
                aggregate_id,
                aggregate_type,
                sequence_number,
                event_type,
                event_version,
                occurred_at,
                payload
            FROM "{schema}".events
            ORDER BY aggregate_id ASC, sequence_number ASC
            "#
        ))
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("load_tenant", e))?;

        let mut stored = Vec::with_capacity(rows.len());
        for row in rows {
            stored.push(row_to_stored(tenant_id, &row)?);
        }
        Ok(stored)
    }

    #[instrument(
        skip(self, events),
        fields(
            tenant_id = %tenant_id.as_uuid(),
            aggregate_id = %aggregate_id.as_uuid(),
            event_count = events.len()
        ),
        err
    )]
    pub async fn append_async(
        &self,
        tenant_id: TenantId,
        aggregate_id: AggregateId,
        events: Vec<UncommittedEvent>,
        expected_version: ExpectedVersion,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        if events.is_empty() {
            return Ok(vec![]);
        }

        for (idx, e) in events.iter().enumerate() {
            if e.tenant_id != tenant_id {
                return Err(EventStoreError::TenantIsolation(format!(
                    "batch contains multiple tenant_ids (index {idx})"
                )));
            }
            if e.aggregate_id != aggregate_id {
                return Err(EventStoreError::InvalidAppend(format!(
                    "batch contains multiple aggregate_ids (index {idx})"
                )));
            }
        }

        let aggregate_type = events[0].aggregate_type.clone();
        let schema = schema_name_for(tenant_id);

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        let (current, existing_type) =
            current_stream_version(&mut tx, &schema, aggregate_id).await?;

        if let Some(existing) = existing_type {
            if existing != aggregate_type {
                return Err(EventStoreError::AggregateTypeMismatch(format!(
                    "stream aggregate_type is '{existing}', attempted append with '{aggregate_type}'"
                )));
            }
        }

        if !expected_version.matches(current) {
            return Err(EventStoreError::Concurrency(format!(
                "expected {expected_version:?}, found {current}"
            )));
        }

        let mut committed = Vec::with_capacity(events.len());
        let mut next = current + 1;

        for event in events {
            sqlx::query(&format!(
                r#"
                INSERT INTO "{schema}".events (
                    event_id,
                    aggregate_id,
                    aggregate_type,
                    sequence_number,
                    event_type,
                    event_version,
                    occurred_at,
                    payload
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                "#
            ))
            .bind(event.event_id)
            .bind(aggregate_id.as_uuid())
            .bind(&aggregate_type)
            .bind(next as i64)
            .bind(&event.event_type)
            .bind(event.event_version as i32)
            .bind(event.occurred_at)
            .bind(&event.payload)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                if is_unique_violation(&e) {
                    EventStoreError::Concurrency(format!(
                        "concurrent append detected: sequence_number {next} already exists"
                    ))
                } else {
                    map_sqlx_error("insert_event", e)
                }
            })?;

            committed.push(StoredEvent {
                event_id: event.event_id,
                tenant_id,
                aggregate_id,
                aggregate_type: aggregate_type.clone(),
                sequence_number: next,
                event_type: event.event_type,
                event_version: event.event_version,
                occurred_at: event.occurred_at,
                payload: event.payload,
            });
            next += 1;
        }

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;

        Ok(committed)
    }
}

async fn current_stream_version(
    tx: &mut Transaction<'_, Postgres>,
    schema: &str,
    aggregate_id: AggregateId,
) -> Result<(u64, Option<String>), EventStoreError> {
    let row = sqlx::query(&format!(
        r#"
        SELECT
            COALESCE(MAX(sequence_number), 0) AS current_version,
            MAX(aggregate_type) AS aggregate_type
        FROM "{schema}".events
        WHERE aggregate_id = $1
        "#
    ))
    .bind(aggregate_id.as_uuid())
    .fetch_one(&mut **tx)
    .await
    .map_err(|e| map_sqlx_error("current_stream_version", e))?;

    let current: Option<i64> = row
        .try_get("current_version")
        .map_err(|e| EventStoreError::InvalidAppend(format!("failed to read current_version: {e}")))?;
    let aggregate_type: Option<String> = row
        .try_get("aggregate_type")
        .map_err(|e| EventStoreError::InvalidAppend(format!("failed to read aggregate_type: {e}")))?;

    Ok((current.unwrap_or(0) as u64, aggregate_type))
}

fn row_to_stored(
    tenant_id: TenantId,
    row: &sqlx::postgres::PgRow,
) -> Result<StoredEvent, EventStoreError> {
    let read = |e: sqlx::Error| EventStoreError::InvalidAppend(format!("failed to read event row: {e}"));

    let aggregate_id: uuid::Uuid = row.try_get("aggregate_id").map_err(read)?;
    let sequence_number: i64 = row.try_get("sequence_number").map_err(read)?;
    let event_version: i32 = row.try_get("event_version").map_err(read)?;
    let occurred_at: DateTime<Utc> = row.try_get("occurred_at").map_err(read)?;

    Ok(StoredEvent {
        event_id: row.try_get("event_id").map_err(read)?,
        tenant_id,
        aggregate_id: AggregateId::from_uuid(aggregate_id),
        aggregate_type: row.try_get("aggregate_type").map_err(read)?,
        sequence_number: sequence_number as u64,
        event_type: row.try_get("event_type").map_err(read)?,
        event_version: event_version as u32,
        occurred_at,
        payload: row.try_get("payload").map_err(read)?,
    })
}

fn map_sqlx_error(operation: &str, err: sqlx::Error) -> EventStoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {operation}: {}", db_err.message());
            match db_err.code().as_deref() {
                Some("23505") => EventStoreError::Concurrency(msg),
                _ => EventStoreError::InvalidAppend(msg),
            }
        }
        sqlx::Error::PoolClosed => {
            EventStoreError::InvalidAppend(format!("connection pool closed in {operation}"))
        }
        _ => EventStoreError::InvalidAppend(format!("sqlx error in {operation}: {err}")),
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    if let sqlx::Error::Database(db_err) = err {
        if let Some(code) = db_err.code() {
            return code.as_ref() == "23505";
        }
    }
    false
}

// The EventStore trait is synchronous; bridge into the async pool via the
// ambient tokio runtime. Callers must be inside a runtime (axum handlers are).

impl EventStore for PostgresEventStore {
    fn append(
        &self,
        events: Vec<UncommittedEvent>,
        expected_version: ExpectedVersion,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        if events.is_empty() {
            return Ok(vec![]);
        }

        let tenant_id = events[0].tenant_id;
        let aggregate_id = events[0].aggregate_id;

        crate::runtime::block_on_ambient(
            self.append_async(tenant_id, aggregate_id, events, expected_version),
        )
        .map_err(|e| EventStoreError::InvalidAppend(e.to_string()))?
    }

    fn load_stream(
        &self,
        tenant_id: TenantId,
        aggregate_id: AggregateId,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        crate::runtime::block_on_ambient(self.load_stream_async(tenant_id, aggregate_id))
            .map_err(|e| EventStoreError::InvalidAppend(e.to_string()))?
    }
}
