use sqlx::{sqlite::SqliteRow, Row};

use artibot_core::domain::client::ClientId;
use artibot_core::domain::dossier::DossierId;
use artibot_core::domain::fiche::{FicheVisite, FicheVisiteId};
use artibot_core::domain::rdv::RdvId;
use artibot_core::domain::tenant::TenantId;

use super::rows::{parse_optional_decimal, parse_timestamp};
use super::{FicheVisiteRepository, RepositoryError};
use crate::DbPool;

pub struct SqlFicheVisiteRepository {
    pool: DbPool,
}

impl SqlFicheVisiteRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl FicheVisiteRepository for SqlFicheVisiteRepository {
    async fn find_by_id(
        &self,
        tenant_id: &TenantId,
        id: &FicheVisiteId,
    ) -> Result<Option<FicheVisite>, RepositoryError> {
        let row = sqlx::query(
            "SELECT
                id,
                tenant_id,
                client_id,
                dossier_id,
                rdv_id,
                observations,
                surface_m2,
                etat_support,
                date_visite,
                created_at,
                updated_at
             FROM fiche_visite
             WHERE tenant_id = ? AND id = ?",
        )
        .bind(&tenant_id.0)
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.map(fiche_from_row).transpose()
    }

    async fn save(&self, fiche: FicheVisite) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO fiche_visite (
                id,
                tenant_id,
                client_id,
                dossier_id,
                rdv_id,
                observations,
                surface_m2,
                etat_support,
                date_visite,
                created_at,
                updated_at
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                client_id = excluded.client_id,
                dossier_id = excluded.dossier_id,
                rdv_id = excluded.rdv_id,
                observations = excluded.observations,
                surface_m2 = excluded.surface_m2,
                etat_support = excluded.etat_support,
                date_visite = excluded.date_visite,
                updated_at = excluded.updated_at",
        )
        .bind(&fiche.id.0)
        .bind(&fiche.tenant_id.0)
        .bind(&fiche.client_id.0)
        .bind(fiche.dossier_id.as_ref().map(|id| id.0.as_str()))
        .bind(fiche.rdv_id.as_ref().map(|id| id.0.as_str()))
        .bind(&fiche.observations)
        .bind(fiche.surface_m2.map(|surface| surface.to_string()))
        .bind(fiche.etat_support.as_deref())
        .bind(fiche.date_visite.to_rfc3339())
        .bind(fiche.created_at.to_rfc3339())
        .bind(fiche.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

fn fiche_from_row(row: SqliteRow) -> Result<FicheVisite, RepositoryError> {
    Ok(FicheVisite {
        id: FicheVisiteId(row.try_get("id")?),
        tenant_id: TenantId(row.try_get("tenant_id")?),
        client_id: ClientId(row.try_get("client_id")?),
        dossier_id: row.try_get::<Option<String>, _>("dossier_id")?.map(DossierId),
        rdv_id: row.try_get::<Option<String>, _>("rdv_id")?.map(RdvId),
        observations: row.try_get("observations")?,
        surface_m2: parse_optional_decimal("surface_m2", row.try_get("surface_m2")?)?,
        etat_support: row.try_get("etat_support")?,
        date_visite: parse_timestamp("date_visite", row.try_get("date_visite")?)?,
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
        updated_at: parse_timestamp("updated_at", row.try_get("updated_at")?)?,
    })
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, Utc};
    use rust_decimal::Decimal;

    use artibot_core::domain::client::ClientId;
    use artibot_core::domain::fiche::{FicheVisite, FicheVisiteId};
    use artibot_core::domain::rdv::RdvId;
    use artibot_core::domain::tenant::TenantId;

    use super::SqlFicheVisiteRepository;
    use crate::migrations;
    use crate::repositories::FicheVisiteRepository;
    use crate::{connect_with_settings, DbPool};

    #[tokio::test]
    async fn sql_fiche_repo_round_trip_with_rdv_link() {
        let pool = setup_pool().await;
        let tenant_id = TenantId("tnt-1".to_string());
        let client_id = ClientId("cli-1".to_string());
        insert_tenant_and_client(&pool, &tenant_id, &client_id).await;
        insert_rdv(&pool, &tenant_id, &client_id, "rdv-1").await;

        let repo = SqlFicheVisiteRepository::new(pool.clone());
        let fiche = FicheVisite {
            id: FicheVisiteId("fv-1".to_string()),
            tenant_id: tenant_id.clone(),
            client_id: client_id.clone(),
            dossier_id: None,
            rdv_id: Some(RdvId("rdv-1".to_string())),
            observations: "Murs humides au sous-sol, prevoir drainage".to_string(),
            surface_m2: None,
            etat_support: None,
            date_visite: parse_ts("2025-04-10T15:30:00Z"),
            created_at: parse_ts("2025-04-10T16:00:00Z"),
            updated_at: parse_ts("2025-04-10T16:00:00Z"),
        };

        repo.save(fiche.clone()).await.expect("save fiche");
        let found = repo.find_by_id(&tenant_id, &fiche.id).await.expect("find fiche");
        assert_eq!(found, Some(fiche.clone()));

        let mut amended = fiche.clone();
        amended.observations = "Murs humides, drainage et VMC a prevoir".to_string();
        amended.surface_m2 = Some(Decimal::new(455, 1));
        amended.etat_support = Some("mur porteur humide".to_string());
        repo.save(amended.clone()).await.expect("update fiche");

        let found = repo.find_by_id(&tenant_id, &fiche.id).await.expect("find amended fiche");
        assert_eq!(found, Some(amended));

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

    async fn insert_rdv(pool: &DbPool, tenant_id: &TenantId, client_id: &ClientId, id: &str) {
        sqlx::query(
            "INSERT INTO rdv (id, tenant_id, client_id, date_heure, statut, created_at, updated_at)
             VALUES (?, ?, ?, '2025-04-10T14:00:00+00:00', 'termine',
                     '2025-03-01T00:00:00+00:00', '2025-03-01T00:00:00+00:00')",
        )
        .bind(id)
        .bind(&tenant_id.0)
        .bind(&client_id.0)
        .execute(pool)
        .await
        .expect("insert rdv");
    }

    fn parse_ts(value: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(value).expect("valid rfc3339").with_timezone(&Utc)
    }
}
