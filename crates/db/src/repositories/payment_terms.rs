use sqlx::{sqlite::SqliteRow, Row};

use artibot_core::domain::tenant::TenantId;
use artibot_core::payment_terms::{PaymentTermTemplate, PaymentTermTemplateId};

use super::rows::{parse_bool, parse_decimal, parse_optional_decimal, parse_timestamp, parse_u32};
use super::{PaymentTermRepository, RepositoryError};
use crate::DbPool;

pub struct SqlPaymentTermRepository {
    pool: DbPool,
}

impl SqlPaymentTermRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl PaymentTermRepository for SqlPaymentTermRepository {
    async fn list_for_tenant(
        &self,
        tenant_id: &TenantId,
    ) -> Result<Vec<PaymentTermTemplate>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT
                id,
                tenant_id,
                nom,
                montant_min,
                montant_max,
                acompte_pct,
                intermediaire_pct,
                solde_pct,
                delai_intermediaire_jours,
                delai_solde_jours,
                par_defaut,
                created_at,
                updated_at
             FROM payment_term_template
             WHERE tenant_id = ?
             ORDER BY par_defaut ASC, created_at ASC",
        )
        .bind(&tenant_id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(template_from_row).collect()
    }

    async fn save(&self, template: PaymentTermTemplate) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO payment_term_template (
                id,
                tenant_id,
                nom,
                montant_min,
                montant_max,
                acompte_pct,
                intermediaire_pct,
                solde_pct,
                delai_intermediaire_jours,
                delai_solde_jours,
                par_defaut,
                created_at,
                updated_at
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                nom = excluded.nom,
                montant_min = excluded.montant_min,
                montant_max = excluded.montant_max,
                acompte_pct = excluded.acompte_pct,
                intermediaire_pct = excluded.intermediaire_pct,
                solde_pct = excluded.solde_pct,
                delai_intermediaire_jours = excluded.delai_intermediaire_jours,
                delai_solde_jours = excluded.delai_solde_jours,
                par_defaut = excluded.par_defaut,
                updated_at = excluded.updated_at",
        )
        .bind(&template.id.0)
        .bind(&template.tenant_id.0)
        .bind(&template.nom)
        .bind(template.montant_min.map(|value| value.to_string()))
        .bind(template.montant_max.map(|value| value.to_string()))
        .bind(template.acompte_pct.to_string())
        .bind(template.intermediaire_pct.to_string())
        .bind(template.solde_pct.to_string())
        .bind(i64::from(template.delai_intermediaire_jours))
        .bind(i64::from(template.delai_solde_jours))
        .bind(i64::from(template.par_defaut))
        .bind(template.created_at.to_rfc3339())
        .bind(template.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

fn template_from_row(row: SqliteRow) -> Result<PaymentTermTemplate, RepositoryError> {
    Ok(PaymentTermTemplate {
        id: PaymentTermTemplateId(row.try_get("id")?),
        tenant_id: TenantId(row.try_get("tenant_id")?),
        nom: row.try_get("nom")?,
        montant_min: parse_optional_decimal("montant_min", row.try_get("montant_min")?)?,
        montant_max: parse_optional_decimal("montant_max", row.try_get("montant_max")?)?,
        acompte_pct: parse_decimal("acompte_pct", row.try_get("acompte_pct")?)?,
        intermediaire_pct: parse_decimal("intermediaire_pct", row.try_get("intermediaire_pct")?)?,
        solde_pct: parse_decimal("solde_pct", row.try_get("solde_pct")?)?,
        delai_intermediaire_jours: parse_u32(
            "delai_intermediaire_jours",
            row.try_get("delai_intermediaire_jours")?,
        )?,
        delai_solde_jours: parse_u32("delai_solde_jours", row.try_get("delai_solde_jours")?)?,
        par_defaut: parse_bool("par_defaut", row.try_get("par_defaut")?)?,
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
        updated_at: parse_timestamp("updated_at", row.try_get("updated_at")?)?,
    })
}
