use chrono::NaiveDate;
use sqlx::{sqlite::SqliteRow, Row};

use artibot_core::domain::client::ClientId;
use artibot_core::domain::devis::DevisId;
use artibot_core::domain::dossier::DossierId;
use artibot_core::domain::facture::{
    Facture, FactureId, FactureStatut, LigneFacture, LigneFactureId,
};
use artibot_core::domain::tenant::TenantId;

use super::rows::{
    parse_date, parse_decimal, parse_optional_date, parse_optional_timestamp, parse_timestamp,
    parse_u32,
};
use super::{FactureRepository, RepositoryError};
use crate::DbPool;

pub struct SqlFactureRepository {
    pool: DbPool,
}

impl SqlFactureRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl FactureRepository for SqlFactureRepository {
    async fn find_by_id(
        &self,
        tenant_id: &TenantId,
        id: &FactureId,
    ) -> Result<Option<Facture>, RepositoryError> {
        let row = sqlx::query(
            "SELECT
                id,
                tenant_id,
                client_id,
                dossier_id,
                devis_id,
                numero,
                statut,
                titre,
                description,
                montant_ht,
                montant_tva,
                montant_ttc,
                date_emission,
                date_echeance,
                date_paiement,
                nb_relances,
                derniere_relance,
                created_at,
                updated_at
             FROM facture
             WHERE tenant_id = ? AND id = ?",
        )
        .bind(&tenant_id.0)
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.map(facture_from_row).transpose()
    }

    async fn find_by_numero(
        &self,
        tenant_id: &TenantId,
        numero: &str,
    ) -> Result<Option<Facture>, RepositoryError> {
        let row = sqlx::query(
            "SELECT
                id,
                tenant_id,
                client_id,
                dossier_id,
                devis_id,
                numero,
                statut,
                titre,
                description,
                montant_ht,
                montant_tva,
                montant_ttc,
                date_emission,
                date_echeance,
                date_paiement,
                nb_relances,
                derniere_relance,
                created_at,
                updated_at
             FROM facture
             WHERE tenant_id = ? AND numero = ?",
        )
        .bind(&tenant_id.0)
        .bind(numero)
        .fetch_optional(&self.pool)
        .await?;

        row.map(facture_from_row).transpose()
    }

    async fn lignes(&self, id: &FactureId) -> Result<Vec<LigneFacture>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT
                id,
                facture_id,
                description,
                quantite,
                prix_unitaire_ht,
                tva_pct,
                montant_ht,
                montant_tva,
                montant_ttc,
                position
             FROM ligne_facture
             WHERE facture_id = ?
             ORDER BY position ASC",
        )
        .bind(&id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(ligne_from_row).collect()
    }

    async fn latest_unpaid_for_client(
        &self,
        tenant_id: &TenantId,
        client_id: &ClientId,
    ) -> Result<Option<Facture>, RepositoryError> {
        let row = sqlx::query(
            "SELECT
                id,
                tenant_id,
                client_id,
                dossier_id,
                devis_id,
                numero,
                statut,
                titre,
                description,
                montant_ht,
                montant_tva,
                montant_ttc,
                date_emission,
                date_echeance,
                date_paiement,
                nb_relances,
                derniere_relance,
                created_at,
                updated_at
             FROM facture
             WHERE tenant_id = ? AND client_id = ? AND statut IN ('envoyee', 'en_retard')
             ORDER BY created_at DESC
             LIMIT 1",
        )
        .bind(&tenant_id.0)
        .bind(&client_id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.map(facture_from_row).transpose()
    }

    async fn list_relance_candidates(
        &self,
        tenant_id: &TenantId,
        today: NaiveDate,
    ) -> Result<Vec<Facture>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT
                id,
                tenant_id,
                client_id,
                dossier_id,
                devis_id,
                numero,
                statut,
                titre,
                description,
                montant_ht,
                montant_tva,
                montant_ttc,
                date_emission,
                date_echeance,
                date_paiement,
                nb_relances,
                derniere_relance,
                created_at,
                updated_at
             FROM facture
             WHERE tenant_id = ? AND statut IN ('envoyee', 'en_retard') AND date_echeance < ?
             ORDER BY date_echeance ASC, created_at ASC",
        )
        .bind(&tenant_id.0)
        .bind(today.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(facture_from_row).collect()
    }

    async fn save(&self, facture: Facture) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO facture (
                id,
                tenant_id,
                client_id,
                dossier_id,
                devis_id,
                numero,
                statut,
                titre,
                description,
                montant_ht,
                montant_tva,
                montant_ttc,
                date_emission,
                date_echeance,
                date_paiement,
                nb_relances,
                derniere_relance,
                created_at,
                updated_at
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                client_id = excluded.client_id,
                dossier_id = excluded.dossier_id,
                devis_id = excluded.devis_id,
                numero = excluded.numero,
                statut = excluded.statut,
                titre = excluded.titre,
                description = excluded.description,
                montant_ht = excluded.montant_ht,
                montant_tva = excluded.montant_tva,
                montant_ttc = excluded.montant_ttc,
                date_emission = excluded.date_emission,
                date_echeance = excluded.date_echeance,
                date_paiement = excluded.date_paiement,
                nb_relances = excluded.nb_relances,
                derniere_relance = excluded.derniere_relance,
                updated_at = excluded.updated_at",
        )
        .bind(&facture.id.0)
        .bind(&facture.tenant_id.0)
        .bind(&facture.client_id.0)
        .bind(facture.dossier_id.as_ref().map(|id| id.0.as_str()))
        .bind(facture.devis_id.as_ref().map(|id| id.0.as_str()))
        .bind(&facture.numero)
        .bind(facture.statut.as_str())
        .bind(&facture.titre)
        .bind(facture.description.as_deref())
        .bind(facture.montant_ht.to_string())
        .bind(facture.montant_tva.to_string())
        .bind(facture.montant_ttc.to_string())
        .bind(facture.date_emission.to_string())
        .bind(facture.date_echeance.to_string())
        .bind(facture.date_paiement.map(|value| value.to_string()))
        .bind(i64::from(facture.nb_relances))
        .bind(facture.derniere_relance.map(|value| value.to_rfc3339()))
        .bind(facture.created_at.to_rfc3339())
        .bind(facture.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn replace_lignes(
        &self,
        id: &FactureId,
        lignes: Vec<LigneFacture>,
    ) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM ligne_facture WHERE facture_id = ?")
            .bind(&id.0)
            .execute(&mut *tx)
            .await?;

        for ligne in lignes {
            sqlx::query(
                "INSERT INTO ligne_facture (
                    id,
                    facture_id,
                    description,
                    quantite,
                    prix_unitaire_ht,
                    tva_pct,
                    montant_ht,
                    montant_tva,
                    montant_ttc,
                    position
                 ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(&ligne.id.0)
            .bind(&id.0)
            .bind(&ligne.description)
            .bind(ligne.quantite.to_string())
            .bind(ligne.prix_unitaire_ht.to_string())
            .bind(ligne.tva_pct.to_string())
            .bind(ligne.montant_ht.to_string())
            .bind(ligne.montant_tva.to_string())
            .bind(ligne.montant_ttc.to_string())
            .bind(i64::from(ligne.position))
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }
}

fn facture_from_row(row: SqliteRow) -> Result<Facture, RepositoryError> {
    let statut_raw = row.try_get::<String, _>("statut")?;
    let statut = FactureStatut::parse(&statut_raw).ok_or_else(|| {
        RepositoryError::Decode(format!("unknown facture statut `{statut_raw}`"))
    })?;

    Ok(Facture {
        id: FactureId(row.try_get("id")?),
        tenant_id: TenantId(row.try_get("tenant_id")?),
        client_id: ClientId(row.try_get("client_id")?),
        dossier_id: row.try_get::<Option<String>, _>("dossier_id")?.map(DossierId),
        devis_id: row.try_get::<Option<String>, _>("devis_id")?.map(DevisId),
        numero: row.try_get("numero")?,
        statut,
        titre: row.try_get("titre")?,
        description: row.try_get("description")?,
        montant_ht: parse_decimal("montant_ht", row.try_get("montant_ht")?)?,
        montant_tva: parse_decimal("montant_tva", row.try_get("montant_tva")?)?,
        montant_ttc: parse_decimal("montant_ttc", row.try_get("montant_ttc")?)?,
        date_emission: parse_date("date_emission", row.try_get("date_emission")?)?,
        date_echeance: parse_date("date_echeance", row.try_get("date_echeance")?)?,
        date_paiement: parse_optional_date("date_paiement", row.try_get("date_paiement")?)?,
        nb_relances: parse_u32("nb_relances", row.try_get("nb_relances")?)?,
        derniere_relance: parse_optional_timestamp(
            "derniere_relance",
            row.try_get("derniere_relance")?,
        )?,
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
        updated_at: parse_timestamp("updated_at", row.try_get("updated_at")?)?,
    })
}

fn ligne_from_row(row: SqliteRow) -> Result<LigneFacture, RepositoryError> {
    Ok(LigneFacture {
        id: LigneFactureId(row.try_get("id")?),
        facture_id: FactureId(row.try_get("facture_id")?),
        description: row.try_get("description")?,
        quantite: parse_decimal("quantite", row.try_get("quantite")?)?,
        prix_unitaire_ht: parse_decimal("prix_unitaire_ht", row.try_get("prix_unitaire_ht")?)?,
        tva_pct: parse_decimal("tva_pct", row.try_get("tva_pct")?)?,
        montant_ht: parse_decimal("montant_ht", row.try_get("montant_ht")?)?,
        montant_tva: parse_decimal("montant_tva", row.try_get("montant_tva")?)?,
        montant_ttc: parse_decimal("montant_ttc", row.try_get("montant_ttc")?)?,
        position: parse_u32("position", row.try_get("position")?)?,
    })
}
