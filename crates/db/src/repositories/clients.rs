use sqlx::{sqlite::SqliteRow, Row};

use artibot_core::domain::client::{Client, ClientId};
use artibot_core::domain::tenant::TenantId;

use super::rows::parse_timestamp;
use super::{ClientRepository, RepositoryError};
use crate::DbPool;

pub struct SqlClientRepository {
    pool: DbPool,
}

impl SqlClientRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl ClientRepository for SqlClientRepository {
    async fn find_by_id(
        &self,
        tenant_id: &TenantId,
        id: &ClientId,
    ) -> Result<Option<Client>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, tenant_id, nom, telephone, email, adresse, notes, created_at, updated_at
             FROM client
             WHERE tenant_id = ? AND id = ?",
        )
        .bind(&tenant_id.0)
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.map(client_from_row).transpose()
    }

    async fn search(
        &self,
        tenant_id: &TenantId,
        query: &str,
    ) -> Result<Vec<Client>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT id, tenant_id, nom, telephone, email, adresse, notes, created_at, updated_at
             FROM client
             WHERE tenant_id = ? AND nom LIKE '%' || ? || '%'
             ORDER BY nom ASC, created_at ASC",
        )
        .bind(&tenant_id.0)
        .bind(query)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(client_from_row).collect()
    }

    async fn find_by_nom(
        &self,
        tenant_id: &TenantId,
        nom: &str,
    ) -> Result<Option<Client>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, tenant_id, nom, telephone, email, adresse, notes, created_at, updated_at
             FROM client
             WHERE tenant_id = ? AND nom = ? COLLATE NOCASE
             ORDER BY created_at ASC
             LIMIT 1",
        )
        .bind(&tenant_id.0)
        .bind(nom)
        .fetch_optional(&self.pool)
        .await?;

        row.map(client_from_row).transpose()
    }

    async fn save(&self, client: Client) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO client (
                id,
                tenant_id,
                nom,
                telephone,
                email,
                adresse,
                notes,
                created_at,
                updated_at
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                nom = excluded.nom,
                telephone = excluded.telephone,
                email = excluded.email,
                adresse = excluded.adresse,
                notes = excluded.notes,
                updated_at = excluded.updated_at",
        )
        .bind(&client.id.0)
        .bind(&client.tenant_id.0)
        .bind(&client.nom)
        .bind(client.telephone.as_deref())
        .bind(client.email.as_deref())
        .bind(client.adresse.as_deref())
        .bind(client.notes.as_deref())
        .bind(client.created_at.to_rfc3339())
        .bind(client.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

fn client_from_row(row: SqliteRow) -> Result<Client, RepositoryError> {
    Ok(Client {
        id: ClientId(row.try_get("id")?),
        tenant_id: TenantId(row.try_get("tenant_id")?),
        nom: row.try_get("nom")?,
        telephone: row.try_get("telephone")?,
        email: row.try_get("email")?,
        adresse: row.try_get("adresse")?,
        notes: row.try_get("notes")?,
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
        updated_at: parse_timestamp("updated_at", row.try_get("updated_at")?)?,
    })
}
