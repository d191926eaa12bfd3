//! Document number allocation.
//!
//! Business documents carry year-scoped sequential numbers, restarting at 1
//! each year per tenant (`VTE2026000001`, `FAC2026000042`, ...). The
//! allocator hands out the next position for a `(tenant, kind, year)`
//! counter; rendering lives in `ventora_core::DocumentNumber`.
//!
//! Allocation happens before the command is dispatched, so a rejected
//! command can leave a gap in the printed sequence. That is accepted:
//! uniqueness matters, gaplessness does not.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Datelike, Utc};
use thiserror::Error;

use ventora_core::{DocumentKind, DocumentNumber, TenantId};
use ventora_tenants::schema_name_for;

#[derive(Debug, Error)]
pub enum NumberAllocatorError {
    #[error("number allocation failed: {0}")]
    Storage(String),
}

/// Hands out the next sequence value for a tenant's document counter.
pub trait NumberAllocator: Send + Sync {
    fn next(
        &self,
        tenant_id: TenantId,
        kind: DocumentKind,
        year: i32,
    ) -> Result<u64, NumberAllocatorError>;
}

impl<A> NumberAllocator for Arc<A>
where
    A: NumberAllocator + ?Sized,
{
    fn next(
        &self,
        tenant_id: TenantId,
        kind: DocumentKind,
        year: i32,
    ) -> Result<u64, NumberAllocatorError> {
        (**self).next(tenant_id, kind, year)
    }
}

/// Allocate and render the next number for `kind` in the year of `now`.
pub fn allocate_number(
    allocator: &dyn NumberAllocator,
    tenant_id: TenantId,
    kind: DocumentKind,
    now: DateTime<Utc>,
) -> Result<DocumentNumber, NumberAllocatorError> {
    let year = now.year();
    let sequence = allocator.next(tenant_id, kind, year)?;
    DocumentNumber::render(kind, year, sequence)
        .map_err(|e| NumberAllocatorError::Storage(e.to_string()))
}

/// In-memory allocator for tests and development.
#[derive(Debug, Default)]
pub struct InMemoryNumberAllocator {
    counters: RwLock<HashMap<(TenantId, DocumentKind, i32), u64>>,
}

impl InMemoryNumberAllocator {
    pub fn new() -> Self {
        Self::default()
    }
}

impl NumberAllocator for InMemoryNumberAllocator {
    fn next(
        &self,
        tenant_id: TenantId,
        kind: DocumentKind,
        year: i32,
    ) -> Result<u64, NumberAllocatorError> {
        let mut counters = self
            .counters
            .write()
            .map_err(|_| NumberAllocatorError::Storage("lock poisoned".to_string()))?;

        let next = counters.entry((tenant_id, kind, year)).or_insert(0);
        *next += 1;
        Ok(*next)
    }
}

/// Postgres-backed allocator using the tenant schema's counter table.
///
/// `INSERT ... ON CONFLICT DO UPDATE ... RETURNING` makes each allocation a
/// single atomic round trip, so two concurrent allocations never get the
/// same value.
pub struct PostgresNumberAllocator {
    pool: Arc<sqlx::PgPool>,
}

impl PostgresNumberAllocator {
    pub fn new(pool: sqlx::PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }
}

impl NumberAllocator for PostgresNumberAllocator {
    fn next(
        &self,
        tenant_id: TenantId,
        kind: DocumentKind,
        year: i32,
    ) -> Result<u64, NumberAllocatorError> {
        let schema = schema_name_for(tenant_id);
        let kind_key = kind.prefix();
        let pool = self.pool.clone();

        crate::runtime::block_on_ambient(async move {
            use sqlx::Row;

            let row = sqlx::query(&format!(
                r#"
                INSERT INTO "{schema}".number_sequences (document_kind, year, next_value)
                VALUES ($1, $2, 1)
                ON CONFLICT (document_kind, year)
                DO UPDATE SET next_value = "{schema}".number_sequences.next_value + 1
                RETURNING next_value
                "#
            ))
            .bind(kind_key)
            .bind(year)
            .fetch_one(&*pool)
            .await
            .map_err(|e| NumberAllocatorError::Storage(e.to_string()))?;

            let value: i64 = row
                .try_get("next_value")
                .map_err(|e| NumberAllocatorError::Storage(e.to_string()))?;
            Ok(value as u64)
        })
        .map_err(|e| NumberAllocatorError::Storage(e.to_string()))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_are_scoped_per_tenant_kind_and_year() {
        let allocator = InMemoryNumberAllocator::new();
        let tenant_a = TenantId::new();
        let tenant_b = TenantId::new();

        assert_eq!(allocator.next(tenant_a, DocumentKind::Sale, 2026).unwrap(), 1);
        assert_eq!(allocator.next(tenant_a, DocumentKind::Sale, 2026).unwrap(), 2);
        assert_eq!(allocator.next(tenant_a, DocumentKind::Invoice, 2026).unwrap(), 1);
        assert_eq!(allocator.next(tenant_a, DocumentKind::Sale, 2027).unwrap(), 1);
        assert_eq!(allocator.next(tenant_b, DocumentKind::Sale, 2026).unwrap(), 1);
    }

    #[test]
    fn allocate_number_renders_with_the_current_year() {
        let allocator = InMemoryNumberAllocator::new();
        let tenant = TenantId::new();
        let now = "2026-03-15T10:00:00Z".parse::<DateTime<Utc>>().unwrap();

        let number = allocate_number(&allocator, tenant, DocumentKind::Sale, now).unwrap();
        assert_eq!(number.as_str(), "VTE2026000001");

        let number = allocate_number(&allocator, tenant, DocumentKind::Sale, now).unwrap();
        assert_eq!(number.as_str(), "VTE2026000002");
    }
}
