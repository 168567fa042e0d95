use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqliteRow, Row};

use artibot_core::domain::client::ClientId;
use artibot_core::domain::dossier::DossierId;
use artibot_core::domain::rdv::{Rdv, RdvId, RdvStatut};
use artibot_core::domain::tenant::TenantId;

use super::rows::{parse_bool, parse_timestamp, parse_u32};
use super::{RdvRepository, RepositoryError};
use crate::DbPool;

pub struct SqlRdvRepository {
    pool: DbPool,
}

impl SqlRdvRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl RdvRepository for SqlRdvRepository {
    async fn find_by_id(
        &self,
        tenant_id: &TenantId,
        id: &RdvId,
    ) -> Result<Option<Rdv>, RepositoryError> {
        let row = sqlx::query(
            "SELECT
                id,
                tenant_id,
                client_id,
                dossier_id,
                date_heure,
                duree_minutes,
                adresse,
                notes,
                statut,
                rappel_j1_envoye,
                rappel_jour_j_envoye,
                rappel_2h_envoye,
                created_at,
                updated_at
             FROM rdv
             WHERE tenant_id = ? AND id = ?",
        )
        .bind(&tenant_id.0)
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.map(rdv_from_row).transpose()
    }

    async fn list_with_pending_rappels(
        &self,
        tenant_id: &TenantId,
        after: DateTime<Utc>,
    ) -> Result<Vec<Rdv>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT
                id,
                tenant_id,
                client_id,
                dossier_id,
                date_heure,
                duree_minutes,
                adresse,
                notes,
                statut,
                rappel_j1_envoye,
                rappel_jour_j_envoye,
                rappel_2h_envoye,
                created_at,
                updated_at
             FROM rdv
             WHERE tenant_id = ?
               AND date_heure > ?
               AND statut IN ('planifie', 'confirme')
               AND (rappel_j1_envoye = 0 OR rappel_jour_j_envoye = 0 OR rappel_2h_envoye = 0)
             ORDER BY date_heure ASC",
        )
        .bind(&tenant_id.0)
        .bind(after.to_rfc3339())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(rdv_from_row).collect()
    }

    async fn save(&self, rdv: Rdv) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO rdv (
                id,
                tenant_id,
                client_id,
                dossier_id,
                date_heure,
                duree_minutes,
                adresse,
                notes,
                statut,
                rappel_j1_envoye,
                rappel_jour_j_envoye,
                rappel_2h_envoye,
                created_at,
                updated_at
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                client_id = excluded.client_id,
                dossier_id = excluded.dossier_id,
                date_heure = excluded.date_heure,
                duree_minutes = excluded.duree_minutes,
                adresse = excluded.adresse,
                notes = excluded.notes,
                statut = excluded.statut,
                rappel_j1_envoye = excluded.rappel_j1_envoye,
                rappel_jour_j_envoye = excluded.rappel_jour_j_envoye,
                rappel_2h_envoye = excluded.rappel_2h_envoye,
                updated_at = excluded.updated_at",
        )
        .bind(&rdv.id.0)
        .bind(&rdv.tenant_id.0)
        .bind(&rdv.client_id.0)
        .bind(rdv.dossier_id.as_ref().map(|id| id.0.as_str()))
        .bind(rdv.date_heure.to_rfc3339())
        .bind(i64::from(rdv.duree_minutes))
        .bind(rdv.adresse.as_deref())
        .bind(rdv.notes.as_deref())
        .bind(rdv.statut.as_str())
        .bind(i64::from(rdv.rappel_j1_envoye))
        .bind(i64::from(rdv.rappel_jour_j_envoye))
        .bind(i64::from(rdv.rappel_2h_envoye))
        .bind(rdv.created_at.to_rfc3339())
        .bind(rdv.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

fn rdv_from_row(row: SqliteRow) -> Result<Rdv, RepositoryError> {
    let statut_raw = row.try_get::<String, _>("statut")?;
    let statut = RdvStatut::parse(&statut_raw)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown rdv statut `{statut_raw}`")))?;

    Ok(Rdv {
        id: RdvId(row.try_get("id")?),
        tenant_id: TenantId(row.try_get("tenant_id")?),
        client_id: ClientId(row.try_get("client_id")?),
        dossier_id: row.try_get::<Option<String>, _>("dossier_id")?.map(DossierId),
        date_heure: parse_timestamp("date_heure", row.try_get("date_heure")?)?,
        duree_minutes: parse_u32("duree_minutes", row.try_get("duree_minutes")?)?,
        adresse: row.try_get("adresse")?,
        notes: row.try_get("notes")?,
        statut,
        rappel_j1_envoye: parse_bool("rappel_j1_envoye", row.try_get("rappel_j1_envoye")?)?,
        rappel_jour_j_envoye: parse_bool(
            "rappel_jour_j_envoye",
            row.try_get("rappel_jour_j_envoye")?,
        )?,
        rappel_2h_envoye: parse_bool("rappel_2h_envoye", row.try_get("rappel_2h_envoye")?)?,
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
        updated_at: parse_timestamp("updated_at", row.try_get("updated_at")?)?,
    })
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, Utc};

    use artibot_core::domain::client::ClientId;
    use artibot_core::domain::rdv::{Rdv, RdvId, RdvStatut};
    use artibot_core::domain::tenant::TenantId;

    use super::SqlRdvRepository;
    use crate::migrations;
    use crate::repositories::RdvRepository;
    use crate::{connect_with_settings, DbPool};

    #[tokio::test]
    async fn sql_rdv_repo_round_trip_and_flag_update() {
        let pool = setup_pool().await;
        let tenant_id = TenantId("tnt-1".to_string());
        let client_id = ClientId("cli-1".to_string());
        insert_tenant_and_client(&pool, &tenant_id, &client_id).await;

        let repo = SqlRdvRepository::new(pool.clone());
        let rdv = sample_rdv(&tenant_id, &client_id, "rdv-1", "2025-04-10T14:00:00Z");

        repo.save(rdv.clone()).await.expect("save rdv");
        let found = repo.find_by_id(&tenant_id, &rdv.id).await.expect("find rdv");
        assert_eq!(found, Some(rdv.clone()));

        let mut reminded = rdv.clone();
        reminded.rappel_j1_envoye = true;
        reminded.statut = RdvStatut::Confirme;
        repo.save(reminded.clone()).await.expect("update rdv");

        let found = repo.find_by_id(&tenant_id, &rdv.id).await.expect("find updated rdv");
        assert_eq!(found, Some(reminded));

        pool.close().await;
    }

    #[tokio::test]
    async fn pending_rappels_exclude_cancelled_past_and_fully_reminded() {
        let pool = setup_pool().await;
        let tenant_id = TenantId("tnt-1".to_string());
        let client_id = ClientId("cli-1".to_string());
        insert_tenant_and_client(&pool, &tenant_id, &client_id).await;

        let repo = SqlRdvRepository::new(pool.clone());
        let now = parse_ts("2025-04-01T08:00:00Z");

        let upcoming = sample_rdv(&tenant_id, &client_id, "rdv-ok", "2025-04-10T14:00:00Z");
        repo.save(upcoming.clone()).await.expect("save upcoming");

        let mut cancelled =
            sample_rdv(&tenant_id, &client_id, "rdv-annule", "2025-04-11T14:00:00Z");
        cancelled.statut = RdvStatut::Annule;
        repo.save(cancelled).await.expect("save cancelled");

        let past = sample_rdv(&tenant_id, &client_id, "rdv-passe", "2025-03-20T14:00:00Z");
        repo.save(past).await.expect("save past");

        let mut done = sample_rdv(&tenant_id, &client_id, "rdv-rappele", "2025-04-12T14:00:00Z");
        done.rappel_j1_envoye = true;
        done.rappel_jour_j_envoye = true;
        done.rappel_2h_envoye = true;
        repo.save(done).await.expect("save fully reminded");

        let pending = repo.list_with_pending_rappels(&tenant_id, now).await.expect("pending");
        let ids: Vec<&str> = pending.iter().map(|rdv| rdv.id.as_str()).collect();
        assert_eq!(ids, vec!["rdv-ok"]);

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

    fn sample_rdv(tenant_id: &TenantId, client_id: &ClientId, id: &str, date: &str) -> Rdv {
        Rdv {
            id: RdvId(id.to_string()),
            tenant_id: tenant_id.clone(),
            client_id: client_id.clone(),
            dossier_id: None,
            date_heure: parse_ts(date),
            duree_minutes: 60,
            adresse: Some("12 rue des Lilas, Lyon".to_string()),
            notes: None,
            statut: RdvStatut::Planifie,
            rappel_j1_envoye: false,
            rappel_jour_j_envoye: false,
            rappel_2h_envoye: false,
            created_at: parse_ts("2025-03-01T09:00:00Z"),
            updated_at: parse_ts("2025-03-01T09:00:00Z"),
        }
    }

    fn parse_ts(value: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(value).expect("valid rfc3339").with_timezone(&Utc)
    }
}
