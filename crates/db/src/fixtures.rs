use crate::connection::DbPool;
use crate::repositories::RepositoryError;
use sqlx::Executor;

/// Canonical demo seeds and verification contract for the artisan tenant.
const SEED_DOCUMENTS: &[SeedDocumentContract] = &[
    SeedDocumentContract {
        kind: "devis",
        document_id: "devis-demo-001",
        numero: "DEV-2025-0001",
        statut: "envoye",
        client_id: "client-dupont-001",
        expected_line_count: 2,
        description: "Devis envoye pour la renovation salle de bain",
    },
    SeedDocumentContract {
        kind: "facture",
        document_id: "facture-demo-001",
        numero: "FAC-2025-0001",
        statut: "envoyee",
        client_id: "client-dupont-001",
        expected_line_count: 2,
        description: "Facture envoyee, echeance 2025-03-22",
    },
];

pub const SEED_TENANT_ID: &str = "tenant-demo-001";

const SEED_CLIENT_IDS: &[&str] =
    &["client-dupont-001", "client-lefevre-001", "client-moreau-001"];

const SEED_DOSSIER_IDS: &[&str] = &["dossier-dupont-001"];

const SEED_DEVIS_IDS: &[&str] = &["devis-demo-001"];

const SEED_FACTURE_IDS: &[&str] = &["facture-demo-001"];

const SEED_RDV_IDS: &[&str] = &["rdv-demo-001"];

const SEED_PAYMENT_TERM_IDS: &[&str] = &["pt-demo-petits", "pt-demo-gros", "pt-demo-standard"];

/// Deterministic demo dataset for one artisan tenant.
///
/// Provides fixtures for:
/// 1. A client roster with mixed contact coverage
/// 2. A devis/facture pair mid-funnel with lignes
/// 3. A planned RDV with all rappels still pending
/// 4. Payment-term templates including the tenant default
pub struct SeedDataset;

impl SeedDataset {
    /// SQL fixture content for the demo dataset.
    pub const SQL: &str = include_str!("../../../config/fixtures/seed_data.sql");

    /// Load the demo dataset into the database. Reloading is idempotent.
    pub async fn load(pool: &DbPool) -> Result<SeedResult, RepositoryError> {
        let mut tx = pool.begin().await?;

        tx.execute(sqlx::query(Self::SQL)).await?;
        tx.commit().await?;

        let documents_seeded = SEED_DOCUMENTS
            .iter()
            .map(|document| DocumentSeedInfo {
                kind: document.kind,
                numero: document.numero,
                description: document.description,
            })
            .collect::<Vec<_>>();

        Ok(SeedResult { documents_seeded })
    }

    /// Verify that seed data exists and matches the contract.
    pub async fn verify(pool: &DbPool) -> Result<VerificationResult, RepositoryError> {
        let mut checks = Vec::new();

        let tenant_exists: i64 =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM tenant WHERE id = ?1)")
                .bind(SEED_TENANT_ID)
                .fetch_one(pool)
                .await?;
        checks.push(("tenant", tenant_exists == 1));

        let quoted_clients = sql_array_from_ids(SEED_CLIENT_IDS);
        let client_count: i64 = sqlx::query_scalar(&format!(
            "SELECT COUNT(1) FROM client WHERE tenant_id = ?1 AND id IN {quoted_clients}"
        ))
        .bind(SEED_TENANT_ID)
        .fetch_one(pool)
        .await?;
        checks.push(("clients", client_count == SEED_CLIENT_IDS.len() as i64));

        for document in SEED_DOCUMENTS {
            let document_exists: i64 = sqlx::query_scalar(&format!(
                "SELECT EXISTS(SELECT 1 FROM {} WHERE id = ?1 AND numero = ?2 AND statut = ?3 AND client_id = ?4)",
                document.kind
            ))
            .bind(document.document_id)
            .bind(document.numero)
            .bind(document.statut)
            .bind(document.client_id)
            .fetch_one(pool)
            .await?;
            checks.push((document.numero, document_exists == 1));

            let line_count: i64 = sqlx::query_scalar(&format!(
                "SELECT COUNT(1) FROM ligne_{} WHERE {}_id = ?1",
                document.kind, document.kind
            ))
            .bind(document.document_id)
            .fetch_one(pool)
            .await?;
            checks.push((document.line_count_label(), line_count == document.expected_line_count));

            let counter_present: i64 = sqlx::query_scalar(
                "SELECT EXISTS(SELECT 1 FROM document_counter WHERE tenant_id = ?1 AND kind = ?2 AND value >= 1)",
            )
            .bind(SEED_TENANT_ID)
            .bind(document.kind)
            .fetch_one(pool)
            .await?;
            checks.push((document.counter_label(), counter_present == 1));
        }

        let dossier_active: i64 = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM dossier WHERE id = ?1 AND statut = 'devis_envoye')",
        )
        .bind("dossier-dupont-001")
        .fetch_one(pool)
        .await?;
        checks.push(("dossier-active", dossier_active == 1));

        let rdv_pending: i64 = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM rdv WHERE id = ?1 AND statut = 'planifie' \
             AND rappel_j1_envoye = 0 AND rappel_jour_j_envoye = 0 AND rappel_2h_envoye = 0)",
        )
        .bind("rdv-demo-001")
        .fetch_one(pool)
        .await?;
        checks.push(("rdv-rappels-pending", rdv_pending == 1));

        let default_templates: i64 = sqlx::query_scalar(
            "SELECT COUNT(1) FROM payment_term_template WHERE tenant_id = ?1 AND par_defaut = 1",
        )
        .bind(SEED_TENANT_ID)
        .fetch_one(pool)
        .await?;
        checks.push(("payment-term-default", default_templates == 1));

        let quoted_templates = sql_array_from_ids(SEED_PAYMENT_TERM_IDS);
        let template_count: i64 = sqlx::query_scalar(&format!(
            "SELECT COUNT(1) FROM payment_term_template WHERE id IN {quoted_templates}"
        ))
        .fetch_one(pool)
        .await?;
        checks.push(("payment-term-templates", template_count == SEED_PAYMENT_TERM_IDS.len() as i64));

        let all_present = checks.iter().all(|(_, exists)| *exists);
        Ok(VerificationResult { all_present, checks })
    }

    /// Clean up seeded fixtures from a test database.
    pub async fn clean(pool: &DbPool) -> Result<(), RepositoryError> {
        let mut tx = pool.begin().await?;

        let quoted_factures = sql_array_from_ids(SEED_FACTURE_IDS);
        let quoted_devis = sql_array_from_ids(SEED_DEVIS_IDS);
        let quoted_rdv = sql_array_from_ids(SEED_RDV_IDS);
        let quoted_dossiers = sql_array_from_ids(SEED_DOSSIER_IDS);
        let quoted_templates = sql_array_from_ids(SEED_PAYMENT_TERM_IDS);
        let quoted_clients = sql_array_from_ids(SEED_CLIENT_IDS);

        sqlx::query(&format!("DELETE FROM relance WHERE facture_id IN {quoted_factures}"))
            .execute(&mut *tx)
            .await?;
        sqlx::query(&format!("DELETE FROM relance WHERE devis_id IN {quoted_devis}"))
            .execute(&mut *tx)
            .await?;
        sqlx::query(&format!("DELETE FROM ligne_facture WHERE facture_id IN {quoted_factures}"))
            .execute(&mut *tx)
            .await?;
        sqlx::query(&format!("DELETE FROM facture WHERE id IN {quoted_factures}"))
            .execute(&mut *tx)
            .await?;
        sqlx::query(&format!("DELETE FROM ligne_devis WHERE devis_id IN {quoted_devis}"))
            .execute(&mut *tx)
            .await?;
        sqlx::query(&format!("DELETE FROM devis WHERE id IN {quoted_devis}"))
            .execute(&mut *tx)
            .await?;
        sqlx::query(&format!("DELETE FROM fiche_visite WHERE rdv_id IN {quoted_rdv}"))
            .execute(&mut *tx)
            .await?;
        sqlx::query(&format!("DELETE FROM rdv WHERE id IN {quoted_rdv}"))
            .execute(&mut *tx)
            .await?;
        sqlx::query(&format!("DELETE FROM dossier WHERE id IN {quoted_dossiers}"))
            .execute(&mut *tx)
            .await?;
        sqlx::query(&format!("DELETE FROM payment_term_template WHERE id IN {quoted_templates}"))
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM conversation_state WHERE tenant_id = ?1")
            .bind(SEED_TENANT_ID)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM document_counter WHERE tenant_id = ?1")
            .bind(SEED_TENANT_ID)
            .execute(&mut *tx)
            .await?;
        sqlx::query(&format!("DELETE FROM client WHERE id IN {quoted_clients}"))
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM tenant WHERE id = ?1")
            .bind(SEED_TENANT_ID)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
struct SeedDocumentContract {
    kind: &'static str,
    document_id: &'static str,
    numero: &'static str,
    statut: &'static str,
    client_id: &'static str,
    expected_line_count: i64,
    description: &'static str,
}

impl SeedDocumentContract {
    fn line_count_label(&self) -> &'static str {
        match self.kind {
            "devis" => "devis-line-count",
            _ => "facture-line-count",
        }
    }

    fn counter_label(&self) -> &'static str {
        match self.kind {
            "devis" => "devis-counter",
            _ => "facture-counter",
        }
    }
}

fn sql_array_from_ids(ids: &[&str]) -> String {
    let quoted = ids.iter().map(|id| format!("'{}'", id)).collect::<Vec<_>>().join(",");
    format!("({quoted})")
}

#[derive(Debug)]
pub struct SeedResult {
    pub documents_seeded: Vec<DocumentSeedInfo>,
}

#[derive(Debug)]
pub struct DocumentSeedInfo {
    pub kind: &'static str,
    pub numero: &'static str,
    pub description: &'static str,
}

#[derive(Debug)]
pub struct VerificationResult {
    pub all_present: bool,
    pub checks: Vec<(&'static str, bool)>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{connect_with_settings, migrations};

    #[test]
    fn sql_fixture_is_valid() {
        assert!(!SeedDataset::SQL.is_empty());
    }

    #[tokio::test]
    async fn verify_seed_contract_and_idempotency() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30)
            .await
            .expect("connect to test database");

        migrations::run_pending(&pool).await.expect("run migrations");

        let first = SeedDataset::load(&pool).await.expect("load seed fixtures");
        let first_verification = SeedDataset::verify(&pool).await.expect("verify seed fixtures");
        assert!(first_verification.all_present, "checks: {:?}", first_verification.checks);
        assert_eq!(first.documents_seeded.len(), 2);

        let second = SeedDataset::load(&pool).await.expect("reload seed fixtures");
        let second_verification =
            SeedDataset::verify(&pool).await.expect("re-verify seed fixtures");
        assert!(second_verification.all_present);
        assert_eq!(second.documents_seeded.len(), 2);
        assert_eq!(first_verification.checks, second_verification.checks);

        pool.close().await;
    }

    #[tokio::test]
    async fn clean_removes_every_seeded_row() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30)
            .await
            .expect("connect to test database");

        migrations::run_pending(&pool).await.expect("run migrations");
        SeedDataset::load(&pool).await.expect("load seed fixtures");
        SeedDataset::clean(&pool).await.expect("clean seed fixtures");

        let verification = SeedDataset::verify(&pool).await.expect("verify after clean");
        assert!(!verification.all_present);
        for table in ["tenant", "client", "devis", "ligne_devis", "facture", "ligne_facture"] {
            let remaining: i64 = sqlx::query_scalar(&format!("SELECT COUNT(1) FROM {table}"))
                .fetch_one(&pool)
                .await
                .expect("count rows");
            assert_eq!(remaining, 0, "{table} still has rows after clean");
        }

        pool.close().await;
    }

    #[tokio::test]
    async fn verify_seed_document_properties() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30)
            .await
            .expect("connect to test database");

        migrations::run_pending(&pool).await.expect("run migrations");

        SeedDataset::load(&pool).await.expect("load seed fixtures");

        let devis_statut: String = sqlx::query_scalar("SELECT statut FROM devis WHERE id = ?1")
            .bind("devis-demo-001")
            .fetch_one(&pool)
            .await
            .expect("query devis statut");
        assert_eq!(devis_statut, "envoye");

        let facture_echeance: String =
            sqlx::query_scalar("SELECT date_echeance FROM facture WHERE id = ?1")
                .bind("facture-demo-001")
                .fetch_one(&pool)
                .await
                .expect("query facture echeance");
        assert_eq!(facture_echeance, "2025-03-22");

        let default_template: String = sqlx::query_scalar(
            "SELECT nom FROM payment_term_template WHERE tenant_id = ?1 AND par_defaut = 1",
        )
        .bind(SEED_TENANT_ID)
        .fetch_one(&pool)
        .await
        .expect("query default payment template");
        assert_eq!(default_template, "Standard");

        let next_devis_value: i64 = sqlx::query_scalar(
            "SELECT value FROM document_counter WHERE tenant_id = ?1 AND kind = 'devis'",
        )
        .bind(SEED_TENANT_ID)
        .fetch_one(&pool)
        .await
        .expect("query devis counter");
        assert_eq!(next_devis_value, 1);

        pool.close().await;
    }
}
