use sqlx::{sqlite::SqliteRow, Row};

use artibot_core::domain::client::ClientId;
use artibot_core::domain::devis::{Devis, DevisId, DevisStatut, LigneDevis, LigneDevisId};
use artibot_core::domain::dossier::DossierId;
use artibot_core::domain::tenant::TenantId;

use super::rows::{
    parse_date, parse_decimal, parse_optional_timestamp, parse_timestamp, parse_u32,
};
use super::{DevisRepository, RepositoryError};
use crate::DbPool;

pub struct SqlDevisRepository {
    pool: DbPool,
}

impl SqlDevisRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl DevisRepository for SqlDevisRepository {
    async fn find_by_id(
        &self,
        tenant_id: &TenantId,
        id: &DevisId,
    ) -> Result<Option<Devis>, RepositoryError> {
        let row = sqlx::query(
            "SELECT
                id,
                tenant_id,
                client_id,
                dossier_id,
                numero,
                statut,
                titre,
                description,
                montant_ht,
                montant_tva,
                montant_ttc,
                date_emission,
                date_validite,
                delai_execution,
                adresse_chantier,
                nb_relances,
                derniere_relance_client,
                created_at,
                updated_at
             FROM devis
             WHERE tenant_id = ? AND id = ?",
        )
        .bind(&tenant_id.0)
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.map(devis_from_row).transpose()
    }

    async fn find_by_numero(
        &self,
        tenant_id: &TenantId,
        numero: &str,
    ) -> Result<Option<Devis>, RepositoryError> {
        let row = sqlx::query(
            "SELECT
                id,
                tenant_id,
                client_id,
                dossier_id,
                numero,
                statut,
                titre,
                description,
                montant_ht,
                montant_tva,
                montant_ttc,
                date_emission,
                date_validite,
                delai_execution,
                adresse_chantier,
                nb_relances,
                derniere_relance_client,
                created_at,
                updated_at
             FROM devis
             WHERE tenant_id = ? AND numero = ?",
        )
        .bind(&tenant_id.0)
        .bind(numero)
        .fetch_optional(&self.pool)
        .await?;

        row.map(devis_from_row).transpose()
    }

    async fn lignes(&self, id: &DevisId) -> Result<Vec<LigneDevis>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT
                id,
                devis_id,
                description,
                quantite,
                prix_unitaire_ht,
                tva_pct,
                montant_ht,
                montant_tva,
                montant_ttc,
                position
             FROM ligne_devis
             WHERE devis_id = ?
             ORDER BY position ASC",
        )
        .bind(&id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(ligne_from_row).collect()
    }

    async fn latest_envoye_for_client(
        &self,
        tenant_id: &TenantId,
        client_id: &ClientId,
    ) -> Result<Option<Devis>, RepositoryError> {
        let row = sqlx::query(
            "SELECT
                id,
                tenant_id,
                client_id,
                dossier_id,
                numero,
                statut,
                titre,
                description,
                montant_ht,
                montant_tva,
                montant_ttc,
                date_emission,
                date_validite,
                delai_execution,
                adresse_chantier,
                nb_relances,
                derniere_relance_client,
                created_at,
                updated_at
             FROM devis
             WHERE tenant_id = ? AND client_id = ? AND statut = 'envoye'
             ORDER BY created_at DESC
             LIMIT 1",
        )
        .bind(&tenant_id.0)
        .bind(&client_id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.map(devis_from_row).transpose()
    }

    async fn save(&self, devis: Devis) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO devis (
                id,
                tenant_id,
                client_id,
                dossier_id,
                numero,
                statut,
                titre,
                description,
                montant_ht,
                montant_tva,
                montant_ttc,
                date_emission,
                date_validite,
                delai_execution,
                adresse_chantier,
                nb_relances,
                derniere_relance_client,
                created_at,
                updated_at
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                client_id = excluded.client_id,
                dossier_id = excluded.dossier_id,
                numero = excluded.numero,
                statut = excluded.statut,
                titre = excluded.titre,
                description = excluded.description,
                montant_ht = excluded.montant_ht,
                montant_tva = excluded.montant_tva,
                montant_ttc = excluded.montant_ttc,
                date_emission = excluded.date_emission,
                date_validite = excluded.date_validite,
                delai_execution = excluded.delai_execution,
                adresse_chantier = excluded.adresse_chantier,
                nb_relances = excluded.nb_relances,
                derniere_relance_client = excluded.derniere_relance_client,
                updated_at = excluded.updated_at",
        )
        .bind(&devis.id.0)
        .bind(&devis.tenant_id.0)
        .bind(&devis.client_id.0)
        .bind(devis.dossier_id.as_ref().map(|id| id.0.as_str()))
        .bind(&devis.numero)
        .bind(devis.statut.as_str())
        .bind(&devis.titre)
        .bind(devis.description.as_deref())
        .bind(devis.montant_ht.to_string())
        .bind(devis.montant_tva.to_string())
        .bind(devis.montant_ttc.to_string())
        .bind(devis.date_emission.to_string())
        .bind(devis.date_validite.to_string())
        .bind(devis.delai_execution.as_deref())
        .bind(devis.adresse_chantier.as_deref())
        .bind(i64::from(devis.nb_relances))
        .bind(devis.derniere_relance_client.map(|value| value.to_rfc3339()))
        .bind(devis.created_at.to_rfc3339())
        .bind(devis.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn replace_lignes(
        &self,
        id: &DevisId,
        lignes: Vec<LigneDevis>,
    ) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM ligne_devis WHERE devis_id = ?")
            .bind(&id.0)
            .execute(&mut *tx)
            .await?;

        for ligne in lignes {
            sqlx::query(
                "INSERT INTO ligne_devis (
                    id,
                    devis_id,
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

fn devis_from_row(row: SqliteRow) -> Result<Devis, RepositoryError> {
    let statut_raw = row.try_get::<String, _>("statut")?;
    let statut = DevisStatut::parse(&statut_raw)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown devis statut `{statut_raw}`")))?;

    Ok(Devis {
        id: DevisId(row.try_get("id")?),
        tenant_id: TenantId(row.try_get("tenant_id")?),
        client_id: ClientId(row.try_get("client_id")?),
        dossier_id: row.try_get::<Option<String>, _>("dossier_id")?.map(DossierId),
        numero: row.try_get("numero")?,
        statut,
        titre: row.try_get("titre")?,
        description: row.try_get("description")?,
        montant_ht: parse_decimal("montant_ht", row.try_get("montant_ht")?)?,
        montant_tva: parse_decimal("montant_tva", row.try_get("montant_tva")?)?,
        montant_ttc: parse_decimal("montant_ttc", row.try_get("montant_ttc")?)?,
        date_emission: parse_date("date_emission", row.try_get("date_emission")?)?,
        date_validite: parse_date("date_validite", row.try_get("date_validite")?)?,
        delai_execution: row.try_get("delai_execution")?,
        adresse_chantier: row.try_get("adresse_chantier")?,
        nb_relances: parse_u32("nb_relances", row.try_get("nb_relances")?)?,
        derniere_relance_client: parse_optional_timestamp(
            "derniere_relance_client",
            row.try_get("derniere_relance_client")?,
        )?,
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
        updated_at: parse_timestamp("updated_at", row.try_get("updated_at")?)?,
    })
}

fn ligne_from_row(row: SqliteRow) -> Result<LigneDevis, RepositoryError> {
    Ok(LigneDevis {
        id: LigneDevisId(row.try_get("id")?),
        devis_id: DevisId(row.try_get("devis_id")?),
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
