//! Per-tenant document numbering. One counter row per (tenant, kind) holds
//! the last value handed out; allocation is a single atomic upsert-increment
//! so two writers can never receive the same value.

use std::collections::HashMap;

use async_trait::async_trait;
use sqlx::Row;
use tokio::sync::Mutex;

use artibot_core::domain::tenant::TenantId;
use artibot_core::numbering::{DocumentKind, RetryPolicy};

use crate::repositories::RepositoryError;
use crate::DbPool;

#[async_trait]
pub trait NumberAllocator: Send + Sync {
    /// Next sequence value for the tenant's devis/facture counter. Values
    /// start at 1 and never repeat.
    async fn next(
        &self,
        tenant_id: &TenantId,
        kind: DocumentKind,
    ) -> Result<i64, RepositoryError>;
}

pub struct SqlNumberAllocator {
    pool: DbPool,
    retry: RetryPolicy,
}

impl SqlNumberAllocator {
    pub fn new(pool: DbPool) -> Self {
        Self { pool, retry: RetryPolicy::default() }
    }

    pub fn with_retry(pool: DbPool, retry: RetryPolicy) -> Self {
        Self { pool, retry }
    }

    async fn increment(
        &self,
        tenant_id: &TenantId,
        kind: DocumentKind,
    ) -> Result<i64, sqlx::Error> {
        let row = sqlx::query(
            "INSERT INTO document_counter (tenant_id, kind, value)
             VALUES (?, ?, 1)
             ON CONFLICT(tenant_id, kind) DO UPDATE SET value = value + 1
             RETURNING value",
        )
        .bind(&tenant_id.0)
        .bind(kind.as_str())
        .fetch_one(&self.pool)
        .await?;

        row.try_get("value")
    }
}

#[async_trait]
impl NumberAllocator for SqlNumberAllocator {
    async fn next(
        &self,
        tenant_id: &TenantId,
        kind: DocumentKind,
    ) -> Result<i64, RepositoryError> {
        let mut attempt = 0_u32;
        loop {
            match self.increment(tenant_id, kind).await {
                Ok(value) => return Ok(value),
                Err(error) if attempt + 1 < self.retry.max_attempts && is_busy(&error) => {
                    attempt += 1;
                    tokio::time::sleep(self.retry.delay_for(attempt)).await;
                }
                Err(error) => return Err(error.into()),
            }
        }
    }
}

/// SQLite reports write contention as `database is locked`/`database table
/// is locked` (SQLITE_BUSY family); anything else is not worth retrying.
fn is_busy(error: &sqlx::Error) -> bool {
    match error {
        sqlx::Error::Database(db_error) => {
            let message = db_error.message();
            message.contains("locked") || message.contains("busy")
        }
        _ => false,
    }
}

#[derive(Default)]
pub struct InMemoryNumberAllocator {
    counters: Mutex<HashMap<(String, DocumentKind), i64>>,
}

impl InMemoryNumberAllocator {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl NumberAllocator for InMemoryNumberAllocator {
    async fn next(
        &self,
        tenant_id: &TenantId,
        kind: DocumentKind,
    ) -> Result<i64, RepositoryError> {
        let mut counters = self.counters.lock().await;
        let value = counters.entry((tenant_id.0.clone(), kind)).or_insert(0);
        *value += 1;
        Ok(*value)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::Arc;

    use artibot_core::domain::tenant::TenantId;
    use artibot_core::numbering::DocumentKind;

    use super::{NumberAllocator, SqlNumberAllocator};
    use crate::migrations;
    use crate::{connect_with_settings, DbPool};

    #[tokio::test]
    async fn values_start_at_one_and_increase_per_kind() {
        let pool = setup_pool().await;
        let tenant_id = insert_tenant(&pool, "tnt-1").await;

        let allocator = SqlNumberAllocator::new(pool.clone());

        assert_eq!(allocator.next(&tenant_id, DocumentKind::Devis).await.expect("first"), 1);
        assert_eq!(allocator.next(&tenant_id, DocumentKind::Devis).await.expect("second"), 2);
        // the facture counter is independent
        assert_eq!(allocator.next(&tenant_id, DocumentKind::Facture).await.expect("facture"), 1);

        pool.close().await;
    }

    #[tokio::test]
    async fn counters_are_isolated_per_tenant() {
        let pool = setup_pool().await;
        let tenant_a = insert_tenant(&pool, "tnt-a").await;
        let tenant_b = insert_tenant(&pool, "tnt-b").await;

        let allocator = SqlNumberAllocator::new(pool.clone());
        allocator.next(&tenant_a, DocumentKind::Devis).await.expect("a first");
        allocator.next(&tenant_a, DocumentKind::Devis).await.expect("a second");

        assert_eq!(allocator.next(&tenant_b, DocumentKind::Devis).await.expect("b first"), 1);

        pool.close().await;
    }

    #[tokio::test]
    async fn concurrent_allocations_never_repeat_a_value() {
        let pool = setup_pool().await;
        let tenant_id = insert_tenant(&pool, "tnt-1").await;

        let allocator = Arc::new(SqlNumberAllocator::new(pool.clone()));

        let mut handles = Vec::new();
        for _ in 0..16 {
            let allocator = Arc::clone(&allocator);
            let tenant_id = tenant_id.clone();
            handles.push(tokio::spawn(async move {
                allocator.next(&tenant_id, DocumentKind::Facture).await.expect("allocate")
            }));
        }

        let mut seen = HashSet::new();
        for handle in handles {
            let value = handle.await.expect("task");
            assert!(seen.insert(value), "value {value} was handed out twice");
        }

        assert_eq!(seen.len(), 16);
        assert_eq!(seen.iter().max(), Some(&16));

        pool.close().await;
    }

    async fn setup_pool() -> DbPool {
        let pool =
            connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect test pool");
        migrations::run_pending(&pool).await.expect("run migrations");
        pool
    }

    async fn insert_tenant(pool: &DbPool, id: &str) -> TenantId {
        sqlx::query(
            "INSERT INTO tenant (id, nom, created_at)
             VALUES (?, 'Artisan Test', '2025-01-01T00:00:00+00:00')",
        )
        .bind(id)
        .execute(pool)
        .await
        .expect("insert tenant");
        TenantId(id.to_string())
    }
}
