//! Typed action execution. Every business operation the assistant can
//! perform lands here, whether it arrived through the conversation loop or
//! the REST API. Methods take validated requests, run the whole operation
//! against the repositories and hand back the created records; rendering
//! into French is someone else's job.
//!
//! Writes follow a fixed shape: resolve references, allocate the numero,
//! persist, then read the record back. A creation that cannot be read back
//! is reported as failed rather than assumed to have landed.

use std::sync::Arc;

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use artibot_core::billing::default_tva_pct;
use artibot_core::errors::ActionError;
use artibot_core::lifecycle::{
    resolve_echeance, resolve_titre, resolve_validite, synthesized_dossier_titre,
};
use artibot_core::payment_terms::{installment_plan, select_template, Installment};
use artibot_core::{
    document_totals, format_numero, line_amounts, Client, ClientId, Devis, DevisId, DevisStatut,
    DocumentKind, Dossier, DossierId, DossierStatut, Facture, FactureId, FactureStatut,
    FicheVisite, FicheVisiteId, LigneDevis, LigneDevisId, LigneFacture, LigneFactureId,
    LineAmounts, Rdv, RdvId, RdvStatut, RetryPolicy, TenantId,
};
use artibot_db::repositories::{
    ClientRepository, ConversationStateRepository, DevisRepository, DossierRepository,
    FactureRepository, FicheVisiteRepository, InMemoryClientRepository,
    InMemoryConversationStateRepository, InMemoryDevisRepository, InMemoryDossierRepository,
    InMemoryFactureRepository, InMemoryFicheVisiteRepository, InMemoryPaymentTermRepository,
    InMemoryRdvRepository, InMemoryRelanceRepository, InMemoryTenantRepository,
    PaymentTermRepository, RdvRepository, RelanceRepository, RepositoryError,
    SqlClientRepository, SqlConversationStateRepository, SqlDevisRepository,
    SqlDossierRepository, SqlFactureRepository, SqlFicheVisiteRepository,
    SqlPaymentTermRepository, SqlRdvRepository, SqlRelanceRepository, SqlTenantRepository,
    TenantRepository,
};
use artibot_db::{DbPool, NumberAllocator, SqlNumberAllocator};

/// Every repository the assistant touches, behind trait objects so the
/// whole pipeline runs against SQLite in production and in memory in tests.
#[derive(Clone)]
pub struct Repositories {
    pub tenants: Arc<dyn TenantRepository>,
    pub clients: Arc<dyn ClientRepository>,
    pub dossiers: Arc<dyn DossierRepository>,
    pub devis: Arc<dyn DevisRepository>,
    pub factures: Arc<dyn FactureRepository>,
    pub rdv: Arc<dyn RdvRepository>,
    pub fiches: Arc<dyn FicheVisiteRepository>,
    pub relances: Arc<dyn RelanceRepository>,
    pub conversations: Arc<dyn ConversationStateRepository>,
    pub payment_terms: Arc<dyn PaymentTermRepository>,
}

impl Repositories {
    pub fn sql(pool: DbPool) -> Self {
        Self {
            tenants: Arc::new(SqlTenantRepository::new(pool.clone())),
            clients: Arc::new(SqlClientRepository::new(pool.clone())),
            dossiers: Arc::new(SqlDossierRepository::new(pool.clone())),
            devis: Arc::new(SqlDevisRepository::new(pool.clone())),
            factures: Arc::new(SqlFactureRepository::new(pool.clone())),
            rdv: Arc::new(SqlRdvRepository::new(pool.clone())),
            fiches: Arc::new(SqlFicheVisiteRepository::new(pool.clone())),
            relances: Arc::new(SqlRelanceRepository::new(pool.clone())),
            conversations: Arc::new(SqlConversationStateRepository::new(pool.clone())),
            payment_terms: Arc::new(SqlPaymentTermRepository::new(pool)),
        }
    }

    pub fn in_memory() -> Self {
        Self {
            tenants: Arc::new(InMemoryTenantRepository::default()),
            clients: Arc::new(InMemoryClientRepository::default()),
            dossiers: Arc::new(InMemoryDossierRepository::default()),
            devis: Arc::new(InMemoryDevisRepository::default()),
            factures: Arc::new(InMemoryFactureRepository::default()),
            rdv: Arc::new(InMemoryRdvRepository::default()),
            fiches: Arc::new(InMemoryFicheVisiteRepository::default()),
            relances: Arc::new(InMemoryRelanceRepository::default()),
            conversations: Arc::new(InMemoryConversationStateRepository::default()),
            payment_terms: Arc::new(InMemoryPaymentTermRepository::default()),
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LigneRequest {
    pub description: String,
    #[serde(default)]
    pub quantite: Option<Decimal>,
    #[serde(default)]
    pub prix_unitaire_ht: Option<Decimal>,
    #[serde(default)]
    pub tva_pct: Option<Decimal>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateDevisRequest {
    pub client: String,
    #[serde(default)]
    pub lignes: Vec<LigneRequest>,
    #[serde(default)]
    pub titre: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub delai_execution: Option<String>,
    #[serde(default)]
    pub adresse_chantier: Option<String>,
    #[serde(default)]
    pub date_emission: Option<NaiveDate>,
    #[serde(default)]
    pub date_validite: Option<NaiveDate>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateFactureRequest {
    pub client: String,
    /// Numero or id of the devis to bill. Exclusive with `lignes`.
    #[serde(default)]
    pub devis_ref: Option<String>,
    #[serde(default)]
    pub lignes: Vec<LigneRequest>,
    #[serde(default)]
    pub titre: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub date_emission: Option<NaiveDate>,
    #[serde(default)]
    pub date_echeance: Option<NaiveDate>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AppendDevisLignesRequest {
    pub devis: String,
    pub lignes: Vec<LigneRequest>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AppendFactureLignesRequest {
    pub facture: String,
    pub lignes: Vec<LigneRequest>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ChangeDevisStatutRequest {
    pub devis: String,
    pub statut: String,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ChangeFactureStatutRequest {
    pub facture: String,
    pub statut: String,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ChangeDossierStatutRequest {
    pub dossier: String,
    pub statut: String,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateDossierRequest {
    pub client: String,
    pub info: String,
    #[serde(default)]
    pub type_travaux: Option<String>,
    pub adresse_chantier: String,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PlanifierRdvRequest {
    pub client: String,
    pub date_heure: DateTime<Utc>,
    #[serde(default)]
    pub duree_minutes: Option<u32>,
    #[serde(default)]
    pub adresse: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreerFicheVisiteRequest {
    pub client: String,
    pub observations: String,
    #[serde(default)]
    pub surface_m2: Option<Decimal>,
    #[serde(default)]
    pub etat_support: Option<String>,
    #[serde(default)]
    pub rdv_id: Option<String>,
    #[serde(default)]
    pub date_visite: Option<DateTime<Utc>>,
}

/// Payment schedule suggested next to a fresh devis. Informative only;
/// nothing is persisted for it.
#[derive(Clone, Debug, Serialize)]
pub struct EcheancierPropose {
    pub modele: String,
    pub echeances: Vec<Installment>,
}

#[derive(Clone, Debug, Serialize)]
pub struct DevisCree {
    pub devis: Devis,
    pub lignes: Vec<LigneDevis>,
    pub client_nom: String,
    pub echeancier: Option<EcheancierPropose>,
    pub dossier_statut: Option<String>,
}

#[derive(Clone, Debug, Serialize)]
pub struct FactureCreee {
    pub facture: Facture,
    pub lignes: Vec<LigneFacture>,
    pub client_nom: String,
    /// Set when the source devis moved to accepte as a side effect.
    pub devis_statut: Option<String>,
}

#[derive(Clone, Debug, Serialize)]
pub struct DevisDetail {
    pub devis: Devis,
    pub lignes: Vec<LigneDevis>,
    pub dossier_statut: Option<String>,
}

#[derive(Clone, Debug, Serialize)]
pub struct FactureDetail {
    pub facture: Facture,
    pub lignes: Vec<LigneFacture>,
    pub dossier_statut: Option<String>,
}

#[derive(Clone, Debug, Serialize)]
pub struct DossierCree {
    pub dossier: Dossier,
    pub client_nom: String,
}

#[derive(Clone, Debug, Serialize)]
pub struct RdvCree {
    pub rdv: Rdv,
    pub client_nom: String,
    pub dossier_statut: Option<String>,
}

#[derive(Clone, Debug, Serialize)]
pub struct FicheCree {
    pub fiche: FicheVisite,
    pub client_nom: String,
    pub dossier_statut: Option<String>,
}

pub(crate) fn storage(error: RepositoryError) -> ActionError {
    ActionError::Storage(error.to_string())
}

pub(crate) fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Client lookup ladder: exact id, exact nom, then a unique substring hit.
/// Several hits go back to the artisan as a question, never a guess.
pub(crate) async fn resolve_client(
    repos: &Repositories,
    tenant_id: &TenantId,
    reference: &str,
) -> Result<Client, ActionError> {
    let reference = reference.trim();
    if reference.is_empty() {
        return Err(ActionError::Validation("client reference is empty".to_string()));
    }

    let by_id = repos
        .clients
        .find_by_id(tenant_id, &ClientId(reference.to_string()))
        .await
        .map_err(storage)?;
    if let Some(client) = by_id {
        return Ok(client);
    }

    if let Some(client) = repos.clients.find_by_nom(tenant_id, reference).await.map_err(storage)? {
        return Ok(client);
    }

    let mut hits = repos.clients.search(tenant_id, reference).await.map_err(storage)?;
    match hits.len() {
        0 => Err(ActionError::not_found("client", reference)),
        1 => Ok(hits.remove(0)),
        _ => Err(ActionError::AmbiguousReference {
            entity: "client",
            reference: reference.to_string(),
            candidates: hits.into_iter().map(|client| client.nom).collect(),
        }),
    }
}

/// One validated line with its computed amounts, not yet tied to a devis or
/// facture row.
struct ComputedLigne {
    description: String,
    quantite: Decimal,
    prix_unitaire_ht: Decimal,
    tva_pct: Decimal,
    amounts: LineAmounts,
    position: u32,
}

fn compute_lignes(
    requests: &[LigneRequest],
    start_position: u32,
) -> Result<Vec<ComputedLigne>, ActionError> {
    let mut computed = Vec::with_capacity(requests.len());
    for (offset, request) in requests.iter().enumerate() {
        let description = request.description.trim();
        if description.is_empty() {
            return Err(ActionError::Validation("ligne description is empty".to_string()));
        }
        let quantite = request.quantite.unwrap_or(Decimal::ONE);
        if quantite <= Decimal::ZERO {
            return Err(ActionError::Validation(format!(
                "ligne `{description}` has a non-positive quantite"
            )));
        }
        let prix_unitaire_ht = request.prix_unitaire_ht.unwrap_or(Decimal::ZERO);
        if prix_unitaire_ht < Decimal::ZERO {
            return Err(ActionError::Validation(format!(
                "ligne `{description}` has a negative prix"
            )));
        }
        let tva_pct = request.tva_pct.unwrap_or_else(default_tva_pct);
        if tva_pct < Decimal::ZERO {
            return Err(ActionError::Validation(format!(
                "ligne `{description}` has a negative TVA"
            )));
        }

        computed.push(ComputedLigne {
            description: description.to_string(),
            quantite,
            prix_unitaire_ht,
            tva_pct,
            amounts: line_amounts(quantite, prix_unitaire_ht, tva_pct),
            position: start_position + offset as u32,
        });
    }
    Ok(computed)
}

fn devis_lignes(devis_id: &DevisId, computed: &[ComputedLigne]) -> Vec<LigneDevis> {
    computed
        .iter()
        .map(|ligne| LigneDevis {
            id: LigneDevisId(new_id()),
            devis_id: devis_id.clone(),
            description: ligne.description.clone(),
            quantite: ligne.quantite,
            prix_unitaire_ht: ligne.prix_unitaire_ht,
            tva_pct: ligne.tva_pct,
            montant_ht: ligne.amounts.ht,
            montant_tva: ligne.amounts.tva,
            montant_ttc: ligne.amounts.ttc,
            position: ligne.position,
        })
        .collect()
}

fn facture_lignes(facture_id: &FactureId, computed: &[ComputedLigne]) -> Vec<LigneFacture> {
    computed
        .iter()
        .map(|ligne| LigneFacture {
            id: LigneFactureId(new_id()),
            facture_id: facture_id.clone(),
            description: ligne.description.clone(),
            quantite: ligne.quantite,
            prix_unitaire_ht: ligne.prix_unitaire_ht,
            tva_pct: ligne.tva_pct,
            montant_ht: ligne.amounts.ht,
            montant_tva: ligne.amounts.tva,
            montant_ttc: ligne.amounts.ttc,
            position: ligne.position,
        })
        .collect()
}

fn amounts_of_devis_lignes(lignes: &[LigneDevis]) -> Vec<LineAmounts> {
    lignes
        .iter()
        .map(|ligne| LineAmounts {
            ht: ligne.montant_ht,
            tva: ligne.montant_tva,
            ttc: ligne.montant_ttc,
        })
        .collect()
}

fn amounts_of_facture_lignes(lignes: &[LigneFacture]) -> Vec<LineAmounts> {
    lignes
        .iter()
        .map(|ligne| LineAmounts {
            ht: ligne.montant_ht,
            tva: ligne.montant_tva,
            ttc: ligne.montant_ttc,
        })
        .collect()
}

fn clean_optional(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

pub struct ActionExecutor {
    repos: Repositories,
    allocator: Arc<dyn NumberAllocator>,
    retry: RetryPolicy,
}

impl ActionExecutor {
    pub fn new(repos: Repositories, allocator: Arc<dyn NumberAllocator>) -> Self {
        Self { repos, allocator, retry: RetryPolicy::default() }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Executor wired for SQLite: repositories and numero allocation share
    /// the pool.
    pub fn sql(pool: DbPool) -> Self {
        let allocator = Arc::new(SqlNumberAllocator::new(pool.clone()));
        Self::new(Repositories::sql(pool), allocator)
    }

    pub fn repositories(&self) -> &Repositories {
        &self.repos
    }

    async fn next_numero(
        &self,
        tenant_id: &TenantId,
        kind: DocumentKind,
        year: i32,
    ) -> Result<String, ActionError> {
        let value = self.allocator.next(tenant_id, kind).await.map_err(|error| {
            tracing::warn!(
                tenant_id = %tenant_id.as_str(),
                kind = kind.as_str(),
                error = %error,
                "numero allocation failed"
            );
            ActionError::NumeroGeneration { attempts: self.retry.max_attempts }
        })?;
        Ok(format_numero(kind, year, value))
    }

    async fn find_devis(
        &self,
        tenant_id: &TenantId,
        reference: &str,
    ) -> Result<Devis, ActionError> {
        let reference = reference.trim();
        let by_numero =
            self.repos.devis.find_by_numero(tenant_id, reference).await.map_err(storage)?;
        if let Some(devis) = by_numero {
            return Ok(devis);
        }
        self.repos
            .devis
            .find_by_id(tenant_id, &DevisId(reference.to_string()))
            .await
            .map_err(storage)?
            .ok_or_else(|| ActionError::not_found("devis", reference))
    }

    async fn find_facture(
        &self,
        tenant_id: &TenantId,
        reference: &str,
    ) -> Result<Facture, ActionError> {
        let reference = reference.trim();
        let by_numero =
            self.repos.factures.find_by_numero(tenant_id, reference).await.map_err(storage)?;
        if let Some(facture) = by_numero {
            return Ok(facture);
        }
        self.repos
            .factures
            .find_by_id(tenant_id, &FactureId(reference.to_string()))
            .await
            .map_err(storage)?
            .ok_or_else(|| ActionError::not_found("facture", reference))
    }

    async fn dossier_by_id(
        &self,
        tenant_id: &TenantId,
        id: Option<&DossierId>,
    ) -> Result<Option<Dossier>, ActionError> {
        match id {
            Some(id) => self.repos.dossiers.find_by_id(tenant_id, id).await.map_err(storage),
            None => Ok(None),
        }
    }

    /// Funnel catch-up after a creation side effect. Returns the new statut
    /// when the dossier actually moved.
    async fn advance_dossier(
        &self,
        dossier: Option<Dossier>,
        target: DossierStatut,
        now: DateTime<Utc>,
    ) -> Result<Option<String>, ActionError> {
        let Some(mut dossier) = dossier else {
            return Ok(None);
        };
        if !dossier.advance_to(target) {
            return Ok(None);
        }
        dossier.updated_at = now;
        let statut = dossier.statut;
        self.repos.dossiers.save(dossier).await.map_err(storage)?;
        Ok(Some(statut.as_str().to_string()))
    }

    async fn propose_echeancier(
        &self,
        tenant_id: &TenantId,
        montant_ttc: Decimal,
    ) -> Result<Option<EcheancierPropose>, ActionError> {
        if montant_ttc <= Decimal::ZERO {
            return Ok(None);
        }
        let templates =
            self.repos.payment_terms.list_for_tenant(tenant_id).await.map_err(storage)?;
        let Some(template) = select_template(&templates, montant_ttc) else {
            return Ok(None);
        };
        Ok(Some(EcheancierPropose {
            modele: template.nom.clone(),
            echeances: installment_plan(template, montant_ttc),
        }))
    }

    pub async fn create_devis(
        &self,
        tenant_id: &TenantId,
        request: CreateDevisRequest,
        now: DateTime<Utc>,
    ) -> Result<DevisCree, ActionError> {
        let client = resolve_client(&self.repos, tenant_id, &request.client).await?;
        let dossier =
            self.repos.dossiers.active_for_client(tenant_id, &client.id).await.map_err(storage)?;

        let date_emission = request.date_emission.unwrap_or_else(|| now.date_naive());
        let numero =
            self.next_numero(tenant_id, DocumentKind::Devis, date_emission.year()).await?;
        let titre = resolve_titre(
            request.titre.as_deref(),
            DocumentKind::Devis,
            &client.nom,
            date_emission,
        );

        let devis_id = DevisId(new_id());
        let computed = compute_lignes(&request.lignes, 1)?;
        let lignes = devis_lignes(&devis_id, &computed);
        let totals = document_totals(computed.iter().map(|ligne| &ligne.amounts));

        let devis = Devis {
            id: devis_id.clone(),
            tenant_id: tenant_id.clone(),
            client_id: client.id.clone(),
            dossier_id: dossier.as_ref().map(|dossier| dossier.id.clone()),
            numero: numero.clone(),
            statut: DevisStatut::Brouillon,
            titre,
            description: clean_optional(request.description),
            montant_ht: totals.montant_ht,
            montant_tva: totals.montant_tva,
            montant_ttc: totals.montant_ttc,
            date_emission,
            date_validite: resolve_validite(request.date_validite, date_emission),
            delai_execution: clean_optional(request.delai_execution),
            adresse_chantier: clean_optional(request.adresse_chantier)
                .or_else(|| client.adresse.clone()),
            nb_relances: 0,
            derniere_relance_client: None,
            created_at: now,
            updated_at: now,
        };

        self.repos.devis.save(devis).await.map_err(storage)?;
        self.repos.devis.replace_lignes(&devis_id, lignes).await.map_err(storage)?;

        let devis = self
            .repos
            .devis
            .find_by_id(tenant_id, &devis_id)
            .await
            .map_err(storage)?
            .ok_or_else(|| {
                ActionError::VerificationFailed(format!("devis {numero} vanished after save"))
            })?;
        let lignes = self.repos.devis.lignes(&devis_id).await.map_err(storage)?;
        if lignes.len() != computed.len() {
            return Err(ActionError::VerificationFailed(format!(
                "devis {numero} persisted {} lignes, expected {}",
                lignes.len(),
                computed.len()
            )));
        }

        let dossier_statut =
            self.advance_dossier(dossier, DossierStatut::DevisEnCours, now).await?;
        let echeancier = self.propose_echeancier(tenant_id, devis.montant_ttc).await?;

        tracing::info!(
            tenant_id = %tenant_id.as_str(),
            numero = %devis.numero,
            montant_ttc = %devis.montant_ttc,
            lignes = lignes.len(),
            "devis created"
        );

        Ok(DevisCree { devis, lignes, client_nom: client.nom, echeancier, dossier_statut })
    }

    pub async fn append_devis_lignes(
        &self,
        tenant_id: &TenantId,
        request: AppendDevisLignesRequest,
        now: DateTime<Utc>,
    ) -> Result<DevisDetail, ActionError> {
        if request.lignes.is_empty() {
            return Err(ActionError::Validation("no lignes to add".to_string()));
        }
        let mut devis = self.find_devis(tenant_id, &request.devis).await?;
        if !matches!(devis.statut, DevisStatut::Brouillon | DevisStatut::EnPreparation) {
            return Err(ActionError::BusinessRule(format!(
                "devis {} lignes can only change before it is sent (statut {})",
                devis.numero,
                devis.statut.as_str()
            )));
        }

        let mut lignes = self.repos.devis.lignes(&devis.id).await.map_err(storage)?;
        let computed = compute_lignes(&request.lignes, lignes.len() as u32 + 1)?;
        lignes.extend(devis_lignes(&devis.id, &computed));

        // Header totals always come from the full line set.
        let totals = document_totals(&amounts_of_devis_lignes(&lignes));
        devis.montant_ht = totals.montant_ht;
        devis.montant_tva = totals.montant_tva;
        devis.montant_ttc = totals.montant_ttc;
        devis.updated_at = now;

        let expected = lignes.len();
        self.repos.devis.replace_lignes(&devis.id, lignes).await.map_err(storage)?;
        self.repos.devis.save(devis.clone()).await.map_err(storage)?;

        let lignes = self.repos.devis.lignes(&devis.id).await.map_err(storage)?;
        if lignes.len() != expected {
            return Err(ActionError::VerificationFailed(format!(
                "devis {} persisted {} lignes, expected {expected}",
                devis.numero,
                lignes.len()
            )));
        }

        Ok(DevisDetail { devis, lignes, dossier_statut: None })
    }

    pub async fn change_devis_statut(
        &self,
        tenant_id: &TenantId,
        request: ChangeDevisStatutRequest,
        now: DateTime<Utc>,
    ) -> Result<DevisDetail, ActionError> {
        let Some(target) = DevisStatut::parse(&request.statut) else {
            return Err(ActionError::Validation(format!(
                "unknown devis statut `{}`",
                request.statut
            )));
        };
        let mut devis = self.find_devis(tenant_id, &request.devis).await?;
        devis.transition_to(target)?;
        devis.updated_at = now;
        self.repos.devis.save(devis.clone()).await.map_err(storage)?;

        let dossier_statut = if target == DevisStatut::Envoye {
            let dossier = self.dossier_by_id(tenant_id, devis.dossier_id.as_ref()).await?;
            self.advance_dossier(dossier, DossierStatut::DevisEnvoye, now).await?
        } else {
            None
        };

        let lignes = self.repos.devis.lignes(&devis.id).await.map_err(storage)?;
        Ok(DevisDetail { devis, lignes, dossier_statut })
    }

    pub async fn create_facture(
        &self,
        tenant_id: &TenantId,
        request: CreateFactureRequest,
        now: DateTime<Utc>,
    ) -> Result<FactureCreee, ActionError> {
        let client = resolve_client(&self.repos, tenant_id, &request.client).await?;

        let source_devis = match request.devis_ref.as_deref() {
            Some(reference) => Some(self.find_devis(tenant_id, reference).await?),
            None => None,
        };
        if let Some(devis) = source_devis.as_ref() {
            if devis.client_id != client.id {
                return Err(ActionError::Validation(format!(
                    "devis {} belongs to another client",
                    devis.numero
                )));
            }
            if !request.lignes.is_empty() {
                return Err(ActionError::Validation(
                    "give either a devis to bill or explicit lignes, not both".to_string(),
                ));
            }
        }

        let date_emission = request.date_emission.unwrap_or_else(|| now.date_naive());
        let numero =
            self.next_numero(tenant_id, DocumentKind::Facture, date_emission.year()).await?;
        let facture_id = FactureId(new_id());

        let (lignes, expected) = match source_devis.as_ref() {
            Some(devis) => {
                let source = self.repos.devis.lignes(&devis.id).await.map_err(storage)?;
                let lignes: Vec<LigneFacture> = source
                    .iter()
                    .map(|ligne| LigneFacture {
                        id: LigneFactureId(new_id()),
                        facture_id: facture_id.clone(),
                        description: ligne.description.clone(),
                        quantite: ligne.quantite,
                        prix_unitaire_ht: ligne.prix_unitaire_ht,
                        tva_pct: ligne.tva_pct,
                        montant_ht: ligne.montant_ht,
                        montant_tva: ligne.montant_tva,
                        montant_ttc: ligne.montant_ttc,
                        position: ligne.position,
                    })
                    .collect();
                let count = lignes.len();
                (lignes, count)
            }
            None => {
                let computed = compute_lignes(&request.lignes, 1)?;
                let lignes = facture_lignes(&facture_id, &computed);
                let count = lignes.len();
                (lignes, count)
            }
        };
        let totals = document_totals(&amounts_of_facture_lignes(&lignes));

        let titre = match source_devis.as_ref() {
            Some(devis) => resolve_titre(
                request.titre.as_deref().or(Some(devis.titre.as_str())),
                DocumentKind::Facture,
                &client.nom,
                date_emission,
            ),
            None => resolve_titre(
                request.titre.as_deref(),
                DocumentKind::Facture,
                &client.nom,
                date_emission,
            ),
        };

        let dossier = match source_devis.as_ref().and_then(|devis| devis.dossier_id.clone()) {
            Some(dossier_id) => self.dossier_by_id(tenant_id, Some(&dossier_id)).await?,
            None => self
                .repos
                .dossiers
                .active_for_client(tenant_id, &client.id)
                .await
                .map_err(storage)?,
        };

        let facture = Facture {
            id: facture_id.clone(),
            tenant_id: tenant_id.clone(),
            client_id: client.id.clone(),
            dossier_id: dossier.as_ref().map(|dossier| dossier.id.clone()),
            devis_id: source_devis.as_ref().map(|devis| devis.id.clone()),
            numero: numero.clone(),
            statut: FactureStatut::Brouillon,
            titre,
            description: clean_optional(request.description),
            montant_ht: totals.montant_ht,
            montant_tva: totals.montant_tva,
            montant_ttc: totals.montant_ttc,
            date_emission,
            date_echeance: resolve_echeance(request.date_echeance, date_emission),
            date_paiement: None,
            nb_relances: 0,
            derniere_relance: None,
            created_at: now,
            updated_at: now,
        };

        self.repos.factures.save(facture).await.map_err(storage)?;
        self.repos.factures.replace_lignes(&facture_id, lignes).await.map_err(storage)?;

        let facture = self
            .repos
            .factures
            .find_by_id(tenant_id, &facture_id)
            .await
            .map_err(storage)?
            .ok_or_else(|| {
                ActionError::VerificationFailed(format!("facture {numero} vanished after save"))
            })?;
        let lignes = self.repos.factures.lignes(&facture_id).await.map_err(storage)?;
        if lignes.len() != expected {
            return Err(ActionError::VerificationFailed(format!(
                "facture {numero} persisted {} lignes, expected {expected}",
                lignes.len()
            )));
        }

        // Billing a sent devis implies the client accepted it; a devis in
        // any other statut is left alone.
        let mut devis_statut = None;
        if let Some(mut devis) = source_devis {
            if devis.can_transition_to(DevisStatut::Accepte) {
                devis.transition_to(DevisStatut::Accepte)?;
                devis.updated_at = now;
                let statut = devis.statut.as_str().to_string();
                self.repos.devis.save(devis).await.map_err(storage)?;
                devis_statut = Some(statut);
            } else {
                tracing::debug!(
                    numero = %devis.numero,
                    statut = devis.statut.as_str(),
                    "source devis not marked accepte from its statut"
                );
            }
        }

        tracing::info!(
            tenant_id = %tenant_id.as_str(),
            numero = %facture.numero,
            montant_ttc = %facture.montant_ttc,
            "facture created"
        );

        Ok(FactureCreee { facture, lignes, client_nom: client.nom, devis_statut })
    }

    pub async fn append_facture_lignes(
        &self,
        tenant_id: &TenantId,
        request: AppendFactureLignesRequest,
        now: DateTime<Utc>,
    ) -> Result<FactureDetail, ActionError> {
        if request.lignes.is_empty() {
            return Err(ActionError::Validation("no lignes to add".to_string()));
        }
        let mut facture = self.find_facture(tenant_id, &request.facture).await?;
        if facture.statut != FactureStatut::Brouillon {
            return Err(ActionError::BusinessRule(format!(
                "facture {} lignes can only change while it is a brouillon (statut {})",
                facture.numero,
                facture.statut.as_str()
            )));
        }

        let mut lignes = self.repos.factures.lignes(&facture.id).await.map_err(storage)?;
        let computed = compute_lignes(&request.lignes, lignes.len() as u32 + 1)?;
        lignes.extend(facture_lignes(&facture.id, &computed));

        let totals = document_totals(&amounts_of_facture_lignes(&lignes));
        facture.montant_ht = totals.montant_ht;
        facture.montant_tva = totals.montant_tva;
        facture.montant_ttc = totals.montant_ttc;
        facture.updated_at = now;

        let expected = lignes.len();
        self.repos.factures.replace_lignes(&facture.id, lignes).await.map_err(storage)?;
        self.repos.factures.save(facture.clone()).await.map_err(storage)?;

        let lignes = self.repos.factures.lignes(&facture.id).await.map_err(storage)?;
        if lignes.len() != expected {
            return Err(ActionError::VerificationFailed(format!(
                "facture {} persisted {} lignes, expected {expected}",
                facture.numero,
                lignes.len()
            )));
        }

        Ok(FactureDetail { facture, lignes, dossier_statut: None })
    }

    pub async fn change_facture_statut(
        &self,
        tenant_id: &TenantId,
        request: ChangeFactureStatutRequest,
        now: DateTime<Utc>,
    ) -> Result<FactureDetail, ActionError> {
        let Some(target) = FactureStatut::parse(&request.statut) else {
            return Err(ActionError::Validation(format!(
                "unknown facture statut `{}`",
                request.statut
            )));
        };
        if target == FactureStatut::EnRetard {
            return Err(ActionError::BusinessRule(
                "en_retard is set by the relance pipeline, not by hand".to_string(),
            ));
        }

        let mut facture = self.find_facture(tenant_id, &request.facture).await?;
        if target == FactureStatut::Payee {
            facture.mark_paid(now.date_naive())?;
        } else {
            facture.transition_to(target)?;
        }
        facture.updated_at = now;
        self.repos.factures.save(facture.clone()).await.map_err(storage)?;

        let dossier_target = match target {
            FactureStatut::Envoyee => Some(DossierStatut::FactureEnvoyee),
            FactureStatut::Payee => Some(DossierStatut::FacturePayee),
            _ => None,
        };
        let dossier_statut = match dossier_target {
            Some(dossier_target) => {
                let dossier =
                    self.dossier_by_id(tenant_id, facture.dossier_id.as_ref()).await?;
                self.advance_dossier(dossier, dossier_target, now).await?
            }
            None => None,
        };

        let lignes = self.repos.factures.lignes(&facture.id).await.map_err(storage)?;
        Ok(FactureDetail { facture, lignes, dossier_statut })
    }

    pub async fn search_clients(
        &self,
        tenant_id: &TenantId,
        query: &str,
    ) -> Result<Vec<Client>, ActionError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(ActionError::Validation("search query is empty".to_string()));
        }
        self.repos.clients.search(tenant_id, query).await.map_err(storage)
    }

    pub async fn create_dossier(
        &self,
        tenant_id: &TenantId,
        request: CreateDossierRequest,
        now: DateTime<Utc>,
    ) -> Result<DossierCree, ActionError> {
        let client = resolve_client(&self.repos, tenant_id, &request.client).await?;
        let info = request.info.trim();
        if info.is_empty() {
            return Err(ActionError::Validation("dossier info is empty".to_string()));
        }
        let adresse = request.adresse_chantier.trim();
        if adresse.is_empty() {
            return Err(ActionError::Validation("adresse chantier is empty".to_string()));
        }
        let type_travaux = clean_optional(request.type_travaux);

        let dossier = Dossier {
            id: DossierId(new_id()),
            tenant_id: tenant_id.clone(),
            client_id: client.id.clone(),
            statut: DossierStatut::ContactRecu,
            titre: synthesized_dossier_titre(&client.nom, type_travaux.as_deref()),
            description: Some(info.to_string()),
            type_travaux,
            adresse_chantier: Some(adresse.to_string()),
            created_at: now,
            updated_at: now,
        };
        self.repos.dossiers.save(dossier.clone()).await.map_err(storage)?;

        tracing::info!(
            tenant_id = %tenant_id.as_str(),
            dossier_id = %dossier.id.as_str(),
            "dossier created"
        );

        Ok(DossierCree { dossier, client_nom: client.nom })
    }

    pub async fn change_dossier_statut(
        &self,
        tenant_id: &TenantId,
        request: ChangeDossierStatutRequest,
        now: DateTime<Utc>,
    ) -> Result<Dossier, ActionError> {
        let Some(target) = DossierStatut::parse(&request.statut) else {
            return Err(ActionError::Validation(format!(
                "unknown dossier statut `{}`",
                request.statut
            )));
        };
        let mut dossier = self
            .repos
            .dossiers
            .find_by_id(tenant_id, &DossierId(request.dossier.clone()))
            .await
            .map_err(storage)?
            .ok_or_else(|| ActionError::not_found("dossier", request.dossier.as_str()))?;
        dossier.transition_to(target)?;
        dossier.updated_at = now;
        self.repos.dossiers.save(dossier.clone()).await.map_err(storage)?;
        Ok(dossier)
    }

    pub async fn planifier_rdv(
        &self,
        tenant_id: &TenantId,
        request: PlanifierRdvRequest,
        now: DateTime<Utc>,
    ) -> Result<RdvCree, ActionError> {
        let client = resolve_client(&self.repos, tenant_id, &request.client).await?;
        if request.date_heure <= now {
            return Err(ActionError::BusinessRule(format!(
                "rdv date {} is already past",
                request.date_heure.format("%Y-%m-%d %H:%M")
            )));
        }
        let duree_minutes = request.duree_minutes.unwrap_or(60);
        if duree_minutes == 0 {
            return Err(ActionError::Validation("rdv duree is zero".to_string()));
        }

        let dossier =
            self.repos.dossiers.active_for_client(tenant_id, &client.id).await.map_err(storage)?;
        let rdv = Rdv {
            id: RdvId(new_id()),
            tenant_id: tenant_id.clone(),
            client_id: client.id.clone(),
            dossier_id: dossier.as_ref().map(|dossier| dossier.id.clone()),
            date_heure: request.date_heure,
            duree_minutes,
            adresse: clean_optional(request.adresse).or_else(|| client.adresse.clone()),
            notes: clean_optional(request.notes),
            statut: RdvStatut::Planifie,
            rappel_j1_envoye: false,
            rappel_jour_j_envoye: false,
            rappel_2h_envoye: false,
            created_at: now,
            updated_at: now,
        };
        self.repos.rdv.save(rdv.clone()).await.map_err(storage)?;

        let dossier_statut =
            self.advance_dossier(dossier, DossierStatut::RdvPlanifie, now).await?;

        tracing::info!(
            tenant_id = %tenant_id.as_str(),
            rdv_id = %rdv.id.as_str(),
            date_heure = %rdv.date_heure,
            "rdv planned"
        );

        Ok(RdvCree { rdv, client_nom: client.nom, dossier_statut })
    }

    pub async fn creer_fiche_visite(
        &self,
        tenant_id: &TenantId,
        request: CreerFicheVisiteRequest,
        now: DateTime<Utc>,
    ) -> Result<FicheCree, ActionError> {
        let client = resolve_client(&self.repos, tenant_id, &request.client).await?;
        let observations = request.observations.trim();
        if observations.is_empty() {
            return Err(ActionError::Validation("observations are empty".to_string()));
        }

        let rdv = match request.rdv_id.as_deref() {
            Some(reference) => Some(
                self.repos
                    .rdv
                    .find_by_id(tenant_id, &RdvId(reference.to_string()))
                    .await
                    .map_err(storage)?
                    .ok_or_else(|| ActionError::not_found("rdv", reference))?,
            ),
            None => None,
        };
        let dossier = match rdv.as_ref().and_then(|rdv| rdv.dossier_id.clone()) {
            Some(dossier_id) => self.dossier_by_id(tenant_id, Some(&dossier_id)).await?,
            None => self
                .repos
                .dossiers
                .active_for_client(tenant_id, &client.id)
                .await
                .map_err(storage)?,
        };

        let fiche = FicheVisite {
            id: FicheVisiteId(new_id()),
            tenant_id: tenant_id.clone(),
            client_id: client.id.clone(),
            dossier_id: dossier.as_ref().map(|dossier| dossier.id.clone()),
            rdv_id: rdv.as_ref().map(|rdv| rdv.id.clone()),
            observations: observations.to_string(),
            surface_m2: request.surface_m2,
            etat_support: request.etat_support.clone(),
            date_visite: request.date_visite.unwrap_or(now),
            created_at: now,
            updated_at: now,
        };
        self.repos.fiches.save(fiche.clone()).await.map_err(storage)?;

        // The visit happened; close out its rdv when it is still open.
        if let Some(mut rdv) = rdv {
            if rdv.can_transition_to(RdvStatut::Termine) {
                rdv.transition_to(RdvStatut::Termine)?;
                rdv.updated_at = now;
                self.repos.rdv.save(rdv).await.map_err(storage)?;
            }
        }

        let dossier_statut =
            self.advance_dossier(dossier, DossierStatut::VisiteRealisee, now).await?;

        tracing::info!(
            tenant_id = %tenant_id.as_str(),
            fiche_id = %fiche.id.as_str(),
            "fiche de visite recorded"
        );

        Ok(FicheCree { fiche, client_nom: client.nom, dossier_statut })
    }
}
