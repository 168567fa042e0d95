use sqlx::{sqlite::SqliteRow, Row};

use artibot_core::domain::client::ClientId;
use artibot_core::domain::dossier::{Dossier, DossierId, DossierStatut};
use artibot_core::domain::tenant::TenantId;

use super::rows::parse_timestamp;
use super::{DossierRepository, RepositoryError};
use crate::DbPool;

pub struct SqlDossierRepository {
    pool: DbPool,
}

impl SqlDossierRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl DossierRepository for SqlDossierRepository {
    async fn find_by_id(
        &self,
        tenant_id: &TenantId,
        id: &DossierId,
    ) -> Result<Option<Dossier>, RepositoryError> {
        let row = sqlx::query(
            "SELECT
                id,
                tenant_id,
                client_id,
                statut,
                titre,
                description,
                type_travaux,
                adresse_chantier,
                created_at,
                updated_at
             FROM dossier
             WHERE tenant_id = ? AND id = ?",
        )
        .bind(&tenant_id.0)
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.map(dossier_from_row).transpose()
    }

    async fn active_for_client(
        &self,
        tenant_id: &TenantId,
        client_id: &ClientId,
    ) -> Result<Option<Dossier>, RepositoryError> {
        let row = sqlx::query(
            "SELECT
                id,
                tenant_id,
                client_id,
                statut,
                titre,
                description,
                type_travaux,
                adresse_chantier,
                created_at,
                updated_at
             FROM dossier
             WHERE tenant_id = ?
               AND client_id = ?
               AND statut NOT IN ('facture_payee', 'perdu', 'annule')
             ORDER BY created_at DESC
             LIMIT 1",
        )
        .bind(&tenant_id.0)
        .bind(&client_id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.map(dossier_from_row).transpose()
    }

    async fn save(&self, dossier: Dossier) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO dossier (
                id,
                tenant_id,
                client_id,
                statut,
                titre,
                description,
                type_travaux,
                adresse_chantier,
                created_at,
                updated_at
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                client_id = excluded.client_id,
                statut = excluded.statut,
                titre = excluded.titre,
                description = excluded.description,
                type_travaux = excluded.type_travaux,
                adresse_chantier = excluded.adresse_chantier,
                updated_at = excluded.updated_at",
        )
        .bind(&dossier.id.0)
        .bind(&dossier.tenant_id.0)
        .bind(&dossier.client_id.0)
        .bind(dossier.statut.as_str())
        .bind(&dossier.titre)
        .bind(dossier.description.as_deref())
        .bind(dossier.type_travaux.as_deref())
        .bind(dossier.adresse_chantier.as_deref())
        .bind(dossier.created_at.to_rfc3339())
        .bind(dossier.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

fn dossier_from_row(row: SqliteRow) -> Result<Dossier, RepositoryError> {
    let statut_raw = row.try_get::<String, _>("statut")?;
    let statut = DossierStatut::parse(&statut_raw).ok_or_else(|| {
        RepositoryError::Decode(format!("unknown dossier statut `{statut_raw}`"))
    })?;

    Ok(Dossier {
        id: DossierId(row.try_get("id")?),
        tenant_id: TenantId(row.try_get("tenant_id")?),
        client_id: ClientId(row.try_get("client_id")?),
        statut,
        titre: row.try_get("titre")?,
        description: row.try_get("description")?,
        type_travaux: row.try_get("type_travaux")?,
        adresse_chantier: row.try_get("adresse_chantier")?,
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
        updated_at: parse_timestamp("updated_at", row.try_get("updated_at")?)?,
    })
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, Utc};

    use artibot_core::domain::client::ClientId;
    use artibot_core::domain::dossier::{Dossier, DossierId, DossierStatut};
    use artibot_core::domain::tenant::TenantId;

    use super::SqlDossierRepository;
    use crate::migrations;
    use crate::repositories::DossierRepository;
    use crate::{connect_with_settings, DbPool};

    #[tokio::test]
    async fn sql_dossier_repo_round_trip_and_statut_update() {
        let pool = setup_pool().await;
        let tenant_id = TenantId("tnt-1".to_string());
        let client_id = ClientId("cli-1".to_string());
        insert_tenant_and_client(&pool, &tenant_id, &client_id).await;

        let repo = SqlDossierRepository::new(pool.clone());
        let dossier = sample_dossier(&tenant_id, &client_id, "dos-1", DossierStatut::ContactRecu);

        repo.save(dossier.clone()).await.expect("save dossier");
        let found = repo.find_by_id(&tenant_id, &dossier.id).await.expect("find dossier");
        assert_eq!(found, Some(dossier.clone()));

        let mut advanced = dossier.clone();
        advanced.statut = DossierStatut::Qualification;
        advanced.updated_at = parse_ts("2025-01-16T10:00:00Z");
        repo.save(advanced.clone()).await.expect("update dossier");

        let found = repo.find_by_id(&tenant_id, &dossier.id).await.expect("find updated");
        assert_eq!(found, Some(advanced));

        pool.close().await;
    }

    #[tokio::test]
    async fn active_for_client_skips_terminal_and_takes_the_newest() {
        let pool = setup_pool().await;
        let tenant_id = TenantId("tnt-1".to_string());
        let client_id = ClientId("cli-1".to_string());
        insert_tenant_and_client(&pool, &tenant_id, &client_id).await;

        let repo = SqlDossierRepository::new(pool.clone());

        let mut closed =
            sample_dossier(&tenant_id, &client_id, "dos-paye", DossierStatut::FacturePayee);
        closed.created_at = parse_ts("2025-03-01T08:00:00Z");
        repo.save(closed).await.expect("save closed");

        let mut old = sample_dossier(&tenant_id, &client_id, "dos-old", DossierStatut::Signe);
        old.created_at = parse_ts("2025-01-01T08:00:00Z");
        repo.save(old).await.expect("save old");

        let mut recent =
            sample_dossier(&tenant_id, &client_id, "dos-recent", DossierStatut::Qualification);
        recent.created_at = parse_ts("2025-02-01T08:00:00Z");
        repo.save(recent.clone()).await.expect("save recent");

        let active = repo.active_for_client(&tenant_id, &client_id).await.expect("active");
        assert_eq!(active.map(|dossier| dossier.id), Some(recent.id));

        pool.close().await;
    }

    #[tokio::test]
    async fn client_with_only_terminal_dossiers_has_no_active_one() {
        let pool = setup_pool().await;
        let tenant_id = TenantId("tnt-1".to_string());
        let client_id = ClientId("cli-1".to_string());
        insert_tenant_and_client(&pool, &tenant_id, &client_id).await;

        let repo = SqlDossierRepository::new(pool.clone());
        repo.save(sample_dossier(&tenant_id, &client_id, "dos-perdu", DossierStatut::Perdu))
            .await
            .expect("save perdu");

        let active = repo.active_for_client(&tenant_id, &client_id).await.expect("active");
        assert_eq!(active, None);

        pool.close().await;
    }

    async fn setup_pool() -> DbPool {
        let pool =
            connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect test pool");
        migrations::run_pending(&pool).await.expect("run migrations");
        pool
    }

    async fn insert_tenant_and_client(pool: &DbPool, tenant_id: &TenantId, client_id: &ClientId) {
        sqlx::query(
            "INSERT INTO tenant (id, nom, created_at)
             VALUES (?, 'Artisan Test', '2025-01-01T00:00:00+00:00')",
        )
        .bind(&tenant_id.0)
        .execute(pool)
        .await
        .expect("insert tenant");

        sqlx::query(
            "INSERT INTO client (id, tenant_id, nom, created_at, updated_at)
             VALUES (?, ?, 'Dupont', '2025-01-01T00:00:00+00:00', '2025-01-01T00:00:00+00:00')",
        )
        .bind(&client_id.0)
        .bind(&tenant_id.0)
        .execute(pool)
        .await
        .expect("insert client");
    }

    fn sample_dossier(
        tenant_id: &TenantId,
        client_id: &ClientId,
        id: &str,
        statut: DossierStatut,
    ) -> Dossier {
        Dossier {
            id: DossierId(id.to_string()),
            tenant_id: tenant_id.clone(),
            client_id: client_id.clone(),
            statut,
            titre: "Renovation salle de bain".to_string(),
            description: None,
            type_travaux: Some("plomberie".to_string()),
            adresse_chantier: Some("12 rue des Lilas, Lyon".to_string()),
            created_at: parse_ts("2025-01-15T09:00:00Z"),
            updated_at: parse_ts("2025-01-15T09:00:00Z"),
        }
    }

    fn parse_ts(value: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(value).expect("valid rfc3339").with_timezone(&Utc)
    }
}
