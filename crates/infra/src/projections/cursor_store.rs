//! Projection cursor persistence.
//!
//! Cursors checkpoint the last processed sequence number per
//! (tenant, aggregate, projection) so projections stay idempotent under
//! at-least-once delivery and can resume after a restart. Clearing cursors
//! plus clearing the read model gives a deterministic rebuild.

use std::sync::Arc;

use sqlx::Row;

use ventora_core::{AggregateId, TenantId};
use ventora_tenants::schema_name_for;

pub trait ProjectionCursorStore: Send + Sync {
    fn get_cursor(
        &self,
        tenant_id: TenantId,
        aggregate_id: AggregateId,
        projection_name: &str,
    ) -> Option<u64>;

    fn update_cursor(
        &self,
        tenant_id: TenantId,
        aggregate_id: AggregateId,
        projection_name: &str,
        sequence_number: u64,
    );

    fn clear_cursors(&self, tenant_id: TenantId, projection_name: &str);
}

/// Postgres-backed cursor store writing into the tenant's schema.
pub struct PostgresCursorStore {
    pool: Arc<sqlx::PgPool>,
}

impl PostgresCursorStore {
    pub fn new(pool: sqlx::PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }
}

impl ProjectionCursorStore for PostgresCursorStore {
    fn get_cursor(
        &self,
        tenant_id: TenantId,
        aggregate_id: AggregateId,
        projection_name: &str,
    ) -> Option<u64> {
        let pool = self.pool.clone();
        let schema = schema_name_for(tenant_id);
        let aggregate_uuid = *aggregate_id.as_uuid();
        let projection_name = projection_name.to_string();

        crate::runtime::block_on_ambient(async move {
            let row = sqlx::query(&format!(
                r#"
                SELECT last_sequence_number
                FROM "{schema}".projection_offsets
                WHERE aggregate_id = $1 AND projection_name = $2
                "#
            ))
            .bind(aggregate_uuid)
            .bind(&projection_name)
            .fetch_optional(&*pool)
            .await
            .ok()??;

            row.try_get::<i64, _>("last_sequence_number")
                .ok()
                .map(|seq| seq as u64)
        })
        .ok()
        .flatten()
    }

    fn update_cursor(
        &self,
        tenant_id: TenantId,
        aggregate_id: AggregateId,
        projection_name: &str,
        sequence_number: u64,
    ) {
        let pool = self.pool.clone();
        let schema = schema_name_for(tenant_id);
        let aggregate_uuid = *aggregate_id.as_uuid();
        let projection_name = projection_name.to_string();

        let _ = crate::runtime::block_on_ambient(async move {
            sqlx::query(&format!(
                r#"
                INSERT INTO "{schema}".projection_offsets (
                    aggregate_id,
                    projection_name,
                    last_sequence_number
                )
                VALUES ($1, $2, $3)
                ON CONFLICT (aggregate_id, projection_name)
                DO UPDATE SET
                    last_sequence_number = EXCLUDED.last_sequence_number,
                    updated_at = NOW()
                "#
            ))
            .bind(aggregate_uuid)
            .bind(&projection_name)
            .bind(sequence_number as i64)
            .execute(&*pool)
            .await
        });
    }

    fn clear_cursors(&self, tenant_id: TenantId, projection_name: &str) {
        let pool = self.pool.clone();
        let schema = schema_name_for(tenant_id);
        let projection_name = projection_name.to_string();

        let _ = crate::runtime::block_on_ambient(async move {
            sqlx::query(&format!(
                r#"DELETE FROM "{schema}".projection_offsets WHERE projection_name = $1"#
            ))
            .bind(&projection_name)
            .execute(&*pool)
            .await
        });
    }
}
