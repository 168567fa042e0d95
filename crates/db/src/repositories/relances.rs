use sqlx::{sqlite::SqliteRow, Row};

use artibot_core::domain::devis::DevisId;
use artibot_core::domain::facture::FactureId;
use artibot_core::domain::relance::{DocumentRef, Relance, RelanceId, RelanceStatut};
use artibot_core::domain::tenant::TenantId;

use super::rows::{parse_optional_timestamp, parse_timestamp, parse_u32};
use super::{RelanceRepository, RepositoryError};
use crate::DbPool;

pub struct SqlRelanceRepository {
    pool: DbPool,
}

impl SqlRelanceRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl RelanceRepository for SqlRelanceRepository {
    async fn find_by_id(
        &self,
        tenant_id: &TenantId,
        id: &RelanceId,
    ) -> Result<Option<Relance>, RepositoryError> {
        let row = sqlx::query(
            "SELECT
                id,
                tenant_id,
                facture_id,
                devis_id,
                niveau,
                statut,
                canal,
                message,
                date_envoi,
                created_at,
                updated_at
             FROM relance
             WHERE tenant_id = ? AND id = ?",
        )
        .bind(&tenant_id.0)
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.map(relance_from_row).transpose()
    }

    async fn count_for_document(
        &self,
        tenant_id: &TenantId,
        document: &DocumentRef,
    ) -> Result<u32, RepositoryError> {
        let row = match document {
            DocumentRef::Facture(facture_id) => {
                sqlx::query(
                    "SELECT COUNT(*) AS count FROM relance WHERE tenant_id = ? AND facture_id = ?",
                )
                .bind(&tenant_id.0)
                .bind(&facture_id.0)
                .fetch_one(&self.pool)
                .await?
            }
            DocumentRef::Devis(devis_id) => {
                sqlx::query(
                    "SELECT COUNT(*) AS count FROM relance WHERE tenant_id = ? AND devis_id = ?",
                )
                .bind(&tenant_id.0)
                .bind(&devis_id.0)
                .fetch_one(&self.pool)
                .await?
            }
        };

        parse_u32("count", row.try_get("count")?)
    }

    async fn save(&self, relance: Relance) -> Result<(), RepositoryError> {
        let (facture_id, devis_id) = match &relance.document {
            DocumentRef::Facture(id) => (Some(id.0.as_str()), None),
            DocumentRef::Devis(id) => (None, Some(id.0.as_str())),
        };

        sqlx::query(
            "INSERT INTO relance (
                id,
                tenant_id,
                facture_id,
                devis_id,
                niveau,
                statut,
                canal,
                message,
                date_envoi,
                created_at,
                updated_at
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                facture_id = excluded.facture_id,
                devis_id = excluded.devis_id,
                niveau = excluded.niveau,
                statut = excluded.statut,
                canal = excluded.canal,
                message = excluded.message,
                date_envoi = excluded.date_envoi,
                updated_at = excluded.updated_at",
        )
        .bind(&relance.id.0)
        .bind(&relance.tenant_id.0)
        .bind(facture_id)
        .bind(devis_id)
        .bind(i64::from(relance.niveau))
        .bind(relance.statut.as_str())
        .bind(relance.canal.as_deref())
        .bind(relance.message.as_deref())
        .bind(relance.date_envoi.map(|value| value.to_rfc3339()))
        .bind(relance.created_at.to_rfc3339())
        .bind(relance.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

fn relance_from_row(row: SqliteRow) -> Result<Relance, RepositoryError> {
    let statut_raw = row.try_get::<String, _>("statut")?;
    let statut = RelanceStatut::parse(&statut_raw).ok_or_else(|| {
        RepositoryError::Decode(format!("unknown relance statut `{statut_raw}`"))
    })?;

    let facture_id = row.try_get::<Option<String>, _>("facture_id")?;
    let devis_id = row.try_get::<Option<String>, _>("devis_id")?;
    let document = match (facture_id, devis_id) {
        (Some(id), None) => DocumentRef::Facture(FactureId(id)),
        (None, Some(id)) => DocumentRef::Devis(DevisId(id)),
        _ => {
            return Err(RepositoryError::Decode(
                "relance must reference exactly one of facture_id/devis_id".to_string(),
            ))
        }
    };

    Ok(Relance {
        id: RelanceId(row.try_get("id")?),
        tenant_id: TenantId(row.try_get("tenant_id")?),
        document,
        niveau: parse_u32("niveau", row.try_get("niveau")?)?,
        statut,
        canal: row.try_get("canal")?,
        message: row.try_get("message")?,
        date_envoi: parse_optional_timestamp("date_envoi", row.try_get("date_envoi")?)?,
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
        updated_at: parse_timestamp("updated_at", row.try_get("updated_at")?)?,
    })
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, Utc};

    use artibot_core::domain::devis::DevisId;
    use artibot_core::domain::facture::FactureId;
    use artibot_core::domain::relance::{DocumentRef, Relance, RelanceId, RelanceStatut};
    use artibot_core::domain::tenant::TenantId;

    use super::SqlRelanceRepository;
    use crate::migrations;
    use crate::repositories::RelanceRepository;
    use crate::{connect_with_settings, DbPool};

    #[tokio::test]
    async fn sql_relance_repo_round_trips_both_document_kinds() {
        let pool = setup_pool().await;
        let tenant_id = TenantId("tnt-1".to_string());
        seed_documents(&pool, &tenant_id).await;

        let repo = SqlRelanceRepository::new(pool.clone());

        let facture_relance = sample_relance(
            &tenant_id,
            "rel-fac",
            DocumentRef::Facture(FactureId("fac-1".to_string())),
        );
        repo.save(facture_relance.clone()).await.expect("save facture relance");

        let devis_relance = sample_relance(
            &tenant_id,
            "rel-dev",
            DocumentRef::Devis(DevisId("dev-1".to_string())),
        );
        repo.save(devis_relance.clone()).await.expect("save devis relance");

        let found = repo.find_by_id(&tenant_id, &facture_relance.id).await.expect("find");
        assert_eq!(found, Some(facture_relance));

        let found = repo.find_by_id(&tenant_id, &devis_relance.id).await.expect("find");
        assert_eq!(found, Some(devis_relance));

        pool.close().await;
    }

    #[tokio::test]
    async fn count_for_document_scopes_by_document_and_tenant() {
        let pool = setup_pool().await;
        let tenant_id = TenantId("tnt-1".to_string());
        seed_documents(&pool, &tenant_id).await;

        let repo = SqlRelanceRepository::new(pool.clone());
        let facture_ref = DocumentRef::Facture(FactureId("fac-1".to_string()));
        let devis_ref = DocumentRef::Devis(DevisId("dev-1".to_string()));

        repo.save(sample_relance(&tenant_id, "rel-1", facture_ref.clone())).await.expect("save");
        repo.save(sample_relance(&tenant_id, "rel-2", facture_ref.clone())).await.expect("save");
        repo.save(sample_relance(&tenant_id, "rel-3", devis_ref.clone())).await.expect("save");

        assert_eq!(repo.count_for_document(&tenant_id, &facture_ref).await.expect("count"), 2);
        assert_eq!(repo.count_for_document(&tenant_id, &devis_ref).await.expect("count"), 1);

        let other_tenant = TenantId("tnt-autre".to_string());
        assert_eq!(repo.count_for_document(&other_tenant, &facture_ref).await.expect("count"), 0);

        pool.close().await;
    }

    #[tokio::test]
    async fn statut_update_is_persisted() {
        let pool = setup_pool().await;
        let tenant_id = TenantId("tnt-1".to_string());
        seed_documents(&pool, &tenant_id).await;

        let repo = SqlRelanceRepository::new(pool.clone());
        let mut relance = sample_relance(
            &tenant_id,
            "rel-1",
            DocumentRef::Facture(FactureId("fac-1".to_string())),
        );
        repo.save(relance.clone()).await.expect("save");

        relance.statut = RelanceStatut::Envoye;
        relance.canal = Some("telephone".to_string());
        relance.date_envoi = Some(parse_ts("2025-03-10T10:00:00Z"));
        repo.save(relance.clone()).await.expect("update");

        let found = repo.find_by_id(&tenant_id, &relance.id).await.expect("find");
        assert_eq!(found, Some(relance));

        pool.close().await;
    }

    async fn setup_pool() -> DbPool {
        let pool =
            connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect test pool");
        migrations::run_pending(&pool).await.expect("run migrations");
        pool
    }

    async fn seed_documents(pool: &DbPool, tenant_id: &TenantId) {
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
             VALUES ('cli-1', ?, 'Dupont', '2025-01-01T00:00:00+00:00',
                     '2025-01-01T00:00:00+00:00')",
        )
        .bind(&tenant_id.0)
        .execute(pool)
        .await
        .expect("insert client");

        sqlx::query(
            "INSERT INTO devis (
                id, tenant_id, client_id, numero, statut, titre,
                montant_ht, montant_tva, montant_ttc, date_emission, date_validite,
                created_at, updated_at
             ) VALUES (
                'dev-1', ?, 'cli-1', 'DEV-2025-0001', 'envoye', 'Devis Dupont',
                '900.00', '180.00', '1080.00', '2025-01-15', '2025-02-14',
                '2025-01-15T09:00:00+00:00', '2025-01-15T09:00:00+00:00'
             )",
        )
        .bind(&tenant_id.0)
        .execute(pool)
        .await
        .expect("insert devis");

        sqlx::query(
            "INSERT INTO facture (
                id, tenant_id, client_id, numero, statut, titre,
                montant_ht, montant_tva, montant_ttc, date_emission, date_echeance,
                created_at, updated_at
             ) VALUES (
                'fac-1', ?, 'cli-1', 'FAC-2025-0001', 'envoyee', 'Facture Dupont',
                '900.00', '180.00', '1080.00', '2025-01-15', '2025-02-14',
                '2025-01-15T09:00:00+00:00', '2025-01-15T09:00:00+00:00'
             )",
        )
        .bind(&tenant_id.0)
        .execute(pool)
        .await
        .expect("insert facture");
    }

    fn sample_relance(tenant_id: &TenantId, id: &str, document: DocumentRef) -> Relance {
        Relance {
            id: RelanceId(id.to_string()),
            tenant_id: tenant_id.clone(),
            document,
            niveau: 1,
            statut: RelanceStatut::Planifie,
            canal: None,
            message: Some("Relance aimable".to_string()),
            date_envoi: None,
            created_at: parse_ts("2025-03-10T09:00:00Z"),
            updated_at: parse_ts("2025-03-10T09:00:00Z"),
        }
    }

    fn parse_ts(value: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(value).expect("valid rfc3339").with_timezone(&Utc)
    }
}
