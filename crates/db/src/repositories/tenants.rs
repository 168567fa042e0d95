use sqlx::{sqlite::SqliteRow, Row};

use artibot_core::domain::tenant::{Tenant, TenantId};

use super::rows::parse_timestamp;
use super::{RepositoryError, TenantRepository};
use crate::DbPool;

pub struct SqlTenantRepository {
    pool: DbPool,
}

impl SqlTenantRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl TenantRepository for SqlTenantRepository {
    async fn find_by_id(&self, id: &TenantId) -> Result<Option<Tenant>, RepositoryError> {
        let row =
            sqlx::query("SELECT id, nom, metier, telephone, created_at FROM tenant WHERE id = ?")
                .bind(&id.0)
                .fetch_optional(&self.pool)
                .await?;

        row.map(tenant_from_row).transpose()
    }

    async fn save(&self, tenant: Tenant) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO tenant (id, nom, metier, telephone, created_at)
             VALUES (?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                nom = excluded.nom,
                metier = excluded.metier,
                telephone = excluded.telephone",
        )
        .bind(&tenant.id.0)
        .bind(&tenant.nom)
        .bind(tenant.metier.as_deref())
        .bind(tenant.telephone.as_deref())
        .bind(tenant.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

fn tenant_from_row(row: SqliteRow) -> Result<Tenant, RepositoryError> {
    Ok(Tenant {
        id: TenantId(row.try_get("id")?),
        nom: row.try_get("nom")?,
        metier: row.try_get("metier")?,
        telephone: row.try_get("telephone")?,
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
    })
}
