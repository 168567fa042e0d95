//! In-memory repositories used by unit tests and dry-run tooling. They
//! mirror the SQL implementations' query semantics, including tenant
//! scoping and the conversation-state compare-and-swap.

use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, Utc};
use tokio::sync::RwLock;

use artibot_core::dialogue::{ConversationId, ConversationState};
use artibot_core::domain::client::{Client, ClientId};
use artibot_core::domain::devis::{Devis, DevisId, DevisStatut, LigneDevis};
use artibot_core::domain::dossier::{Dossier, DossierId};
use artibot_core::domain::facture::{Facture, FactureId, FactureStatut, LigneFacture};
use artibot_core::domain::fiche::{FicheVisite, FicheVisiteId};
use artibot_core::domain::rdv::{Rdv, RdvId, RdvStatut};
use artibot_core::domain::relance::{DocumentRef, Relance, RelanceId};
use artibot_core::domain::tenant::{Tenant, TenantId};
use artibot_core::payment_terms::PaymentTermTemplate;

use super::{
    ClientRepository, ConversationStateRepository, DevisRepository, DossierRepository,
    FactureRepository, FicheVisiteRepository, PaymentTermRepository, RdvRepository,
    RelanceRepository, RepositoryError, TenantRepository,
};

#[derive(Default)]
pub struct InMemoryTenantRepository {
    tenants: RwLock<HashMap<String, Tenant>>,
}

#[async_trait::async_trait]
impl TenantRepository for InMemoryTenantRepository {
    async fn find_by_id(&self, id: &TenantId) -> Result<Option<Tenant>, RepositoryError> {
        let tenants = self.tenants.read().await;
        Ok(tenants.get(&id.0).cloned())
    }

    async fn save(&self, tenant: Tenant) -> Result<(), RepositoryError> {
        let mut tenants = self.tenants.write().await;
        tenants.insert(tenant.id.0.clone(), tenant);
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryClientRepository {
    clients: RwLock<HashMap<String, Client>>,
}

#[async_trait::async_trait]
impl ClientRepository for InMemoryClientRepository {
    async fn find_by_id(
        &self,
        tenant_id: &TenantId,
        id: &ClientId,
    ) -> Result<Option<Client>, RepositoryError> {
        let clients = self.clients.read().await;
        Ok(clients.get(&id.0).filter(|client| client.tenant_id == *tenant_id).cloned())
    }

    async fn search(
        &self,
        tenant_id: &TenantId,
        query: &str,
    ) -> Result<Vec<Client>, RepositoryError> {
        let needle = query.to_lowercase();
        let clients = self.clients.read().await;
        let mut hits: Vec<Client> = clients
            .values()
            .filter(|client| client.tenant_id == *tenant_id)
            .filter(|client| client.nom.to_lowercase().contains(&needle))
            .cloned()
            .collect();
        hits.sort_by(|a, b| a.nom.cmp(&b.nom).then(a.created_at.cmp(&b.created_at)));
        Ok(hits)
    }

    async fn find_by_nom(
        &self,
        tenant_id: &TenantId,
        nom: &str,
    ) -> Result<Option<Client>, RepositoryError> {
        let clients = self.clients.read().await;
        Ok(clients
            .values()
            .filter(|client| client.tenant_id == *tenant_id)
            .filter(|client| client.nom.eq_ignore_ascii_case(nom))
            .min_by_key(|client| client.created_at)
            .cloned())
    }

    async fn save(&self, client: Client) -> Result<(), RepositoryError> {
        let mut clients = self.clients.write().await;
        clients.insert(client.id.0.clone(), client);
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryDossierRepository {
    dossiers: RwLock<HashMap<String, Dossier>>,
}

#[async_trait::async_trait]
impl DossierRepository for InMemoryDossierRepository {
    async fn find_by_id(
        &self,
        tenant_id: &TenantId,
        id: &DossierId,
    ) -> Result<Option<Dossier>, RepositoryError> {
        let dossiers = self.dossiers.read().await;
        Ok(dossiers.get(&id.0).filter(|dossier| dossier.tenant_id == *tenant_id).cloned())
    }

    async fn active_for_client(
        &self,
        tenant_id: &TenantId,
        client_id: &ClientId,
    ) -> Result<Option<Dossier>, RepositoryError> {
        let dossiers = self.dossiers.read().await;
        Ok(dossiers
            .values()
            .filter(|dossier| dossier.tenant_id == *tenant_id)
            .filter(|dossier| dossier.client_id == *client_id)
            .filter(|dossier| !dossier.statut.is_terminal())
            .max_by_key(|dossier| dossier.created_at)
            .cloned())
    }

    async fn save(&self, dossier: Dossier) -> Result<(), RepositoryError> {
        let mut dossiers = self.dossiers.write().await;
        dossiers.insert(dossier.id.0.clone(), dossier);
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryDevisRepository {
    devis: RwLock<HashMap<String, Devis>>,
    lignes: RwLock<HashMap<String, Vec<LigneDevis>>>,
}

#[async_trait::async_trait]
impl DevisRepository for InMemoryDevisRepository {
    async fn find_by_id(
        &self,
        tenant_id: &TenantId,
        id: &DevisId,
    ) -> Result<Option<Devis>, RepositoryError> {
        let devis = self.devis.read().await;
        Ok(devis.get(&id.0).filter(|devis| devis.tenant_id == *tenant_id).cloned())
    }

    async fn find_by_numero(
        &self,
        tenant_id: &TenantId,
        numero: &str,
    ) -> Result<Option<Devis>, RepositoryError> {
        let devis = self.devis.read().await;
        Ok(devis
            .values()
            .find(|devis| devis.tenant_id == *tenant_id && devis.numero == numero)
            .cloned())
    }

    async fn lignes(&self, id: &DevisId) -> Result<Vec<LigneDevis>, RepositoryError> {
        let lignes = self.lignes.read().await;
        let mut set = lignes.get(&id.0).cloned().unwrap_or_default();
        set.sort_by_key(|ligne| ligne.position);
        Ok(set)
    }

    async fn latest_envoye_for_client(
        &self,
        tenant_id: &TenantId,
        client_id: &ClientId,
    ) -> Result<Option<Devis>, RepositoryError> {
        let devis = self.devis.read().await;
        Ok(devis
            .values()
            .filter(|devis| devis.tenant_id == *tenant_id && devis.client_id == *client_id)
            .filter(|devis| devis.statut == DevisStatut::Envoye)
            .max_by_key(|devis| devis.created_at)
            .cloned())
    }

    async fn save(&self, devis: Devis) -> Result<(), RepositoryError> {
        let mut map = self.devis.write().await;
        map.insert(devis.id.0.clone(), devis);
        Ok(())
    }

    async fn replace_lignes(
        &self,
        id: &DevisId,
        lignes: Vec<LigneDevis>,
    ) -> Result<(), RepositoryError> {
        let mut map = self.lignes.write().await;
        map.insert(id.0.clone(), lignes);
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryFactureRepository {
    factures: RwLock<HashMap<String, Facture>>,
    lignes: RwLock<HashMap<String, Vec<LigneFacture>>>,
}

#[async_trait::async_trait]
impl FactureRepository for InMemoryFactureRepository {
    async fn find_by_id(
        &self,
        tenant_id: &TenantId,
        id: &FactureId,
    ) -> Result<Option<Facture>, RepositoryError> {
        let factures = self.factures.read().await;
        Ok(factures.get(&id.0).filter(|facture| facture.tenant_id == *tenant_id).cloned())
    }

    async fn find_by_numero(
        &self,
        tenant_id: &TenantId,
        numero: &str,
    ) -> Result<Option<Facture>, RepositoryError> {
        let factures = self.factures.read().await;
        Ok(factures
            .values()
            .find(|facture| facture.tenant_id == *tenant_id && facture.numero == numero)
            .cloned())
    }

    async fn lignes(&self, id: &FactureId) -> Result<Vec<LigneFacture>, RepositoryError> {
        let lignes = self.lignes.read().await;
        let mut set = lignes.get(&id.0).cloned().unwrap_or_default();
        set.sort_by_key(|ligne| ligne.position);
        Ok(set)
    }

    async fn latest_unpaid_for_client(
        &self,
        tenant_id: &TenantId,
        client_id: &ClientId,
    ) -> Result<Option<Facture>, RepositoryError> {
        let factures = self.factures.read().await;
        Ok(factures
            .values()
            .filter(|facture| facture.tenant_id == *tenant_id)
            .filter(|facture| facture.client_id == *client_id)
            .filter(|facture| is_unpaid(facture.statut))
            .max_by_key(|facture| facture.created_at)
            .cloned())
    }

    async fn list_relance_candidates(
        &self,
        tenant_id: &TenantId,
        today: NaiveDate,
    ) -> Result<Vec<Facture>, RepositoryError> {
        let factures = self.factures.read().await;
        let mut candidates: Vec<Facture> = factures
            .values()
            .filter(|facture| facture.tenant_id == *tenant_id)
            .filter(|facture| is_unpaid(facture.statut))
            .filter(|facture| facture.date_echeance < today)
            .cloned()
            .collect();
        candidates.sort_by(|a, b| {
            a.date_echeance.cmp(&b.date_echeance).then(a.created_at.cmp(&b.created_at))
        });
        Ok(candidates)
    }

    async fn save(&self, facture: Facture) -> Result<(), RepositoryError> {
        let mut map = self.factures.write().await;
        map.insert(facture.id.0.clone(), facture);
        Ok(())
    }

    async fn replace_lignes(
        &self,
        id: &FactureId,
        lignes: Vec<LigneFacture>,
    ) -> Result<(), RepositoryError> {
        let mut map = self.lignes.write().await;
        map.insert(id.0.clone(), lignes);
        Ok(())
    }
}

fn is_unpaid(statut: FactureStatut) -> bool {
    matches!(statut, FactureStatut::Envoyee | FactureStatut::EnRetard)
}

#[derive(Default)]
pub struct InMemoryRdvRepository {
    rdv: RwLock<HashMap<String, Rdv>>,
}

#[async_trait::async_trait]
impl RdvRepository for InMemoryRdvRepository {
    async fn find_by_id(
        &self,
        tenant_id: &TenantId,
        id: &RdvId,
    ) -> Result<Option<Rdv>, RepositoryError> {
        let rdv = self.rdv.read().await;
        Ok(rdv.get(&id.0).filter(|rdv| rdv.tenant_id == *tenant_id).cloned())
    }

    async fn list_with_pending_rappels(
        &self,
        tenant_id: &TenantId,
        after: DateTime<Utc>,
    ) -> Result<Vec<Rdv>, RepositoryError> {
        let rdv = self.rdv.read().await;
        let mut pending: Vec<Rdv> = rdv
            .values()
            .filter(|rdv| rdv.tenant_id == *tenant_id)
            .filter(|rdv| rdv.date_heure > after)
            .filter(|rdv| matches!(rdv.statut, RdvStatut::Planifie | RdvStatut::Confirme))
            .filter(|rdv| {
                !(rdv.rappel_j1_envoye && rdv.rappel_jour_j_envoye && rdv.rappel_2h_envoye)
            })
            .cloned()
            .collect();
        pending.sort_by_key(|rdv| rdv.date_heure);
        Ok(pending)
    }

    async fn save(&self, rdv: Rdv) -> Result<(), RepositoryError> {
        let mut map = self.rdv.write().await;
        map.insert(rdv.id.0.clone(), rdv);
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryFicheVisiteRepository {
    fiches: RwLock<HashMap<String, FicheVisite>>,
}

#[async_trait::async_trait]
impl FicheVisiteRepository for InMemoryFicheVisiteRepository {
    async fn find_by_id(
        &self,
        tenant_id: &TenantId,
        id: &FicheVisiteId,
    ) -> Result<Option<FicheVisite>, RepositoryError> {
        let fiches = self.fiches.read().await;
        Ok(fiches.get(&id.0).filter(|fiche| fiche.tenant_id == *tenant_id).cloned())
    }

    async fn save(&self, fiche: FicheVisite) -> Result<(), RepositoryError> {
        let mut fiches = self.fiches.write().await;
        fiches.insert(fiche.id.0.clone(), fiche);
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryRelanceRepository {
    relances: RwLock<HashMap<String, Relance>>,
}

#[async_trait::async_trait]
impl RelanceRepository for InMemoryRelanceRepository {
    async fn find_by_id(
        &self,
        tenant_id: &TenantId,
        id: &RelanceId,
    ) -> Result<Option<Relance>, RepositoryError> {
        let relances = self.relances.read().await;
        Ok(relances.get(&id.0).filter(|relance| relance.tenant_id == *tenant_id).cloned())
    }

    async fn count_for_document(
        &self,
        tenant_id: &TenantId,
        document: &DocumentRef,
    ) -> Result<u32, RepositoryError> {
        let relances = self.relances.read().await;
        let count = relances
            .values()
            .filter(|relance| relance.tenant_id == *tenant_id)
            .filter(|relance| relance.document == *document)
            .count();
        Ok(count as u32)
    }

    async fn save(&self, relance: Relance) -> Result<(), RepositoryError> {
        let mut relances = self.relances.write().await;
        relances.insert(relance.id.0.clone(), relance);
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryConversationStateRepository {
    states: RwLock<HashMap<String, ConversationState>>,
}

#[async_trait::async_trait]
impl ConversationStateRepository for InMemoryConversationStateRepository {
    async fn find(
        &self,
        tenant_id: &TenantId,
        conversation_id: &ConversationId,
    ) -> Result<Option<ConversationState>, RepositoryError> {
        let states = self.states.read().await;
        Ok(states.get(&conversation_id.0).filter(|state| state.tenant_id == *tenant_id).cloned())
    }

    async fn insert(&self, state: ConversationState) -> Result<bool, RepositoryError> {
        let mut states = self.states.write().await;
        if states.contains_key(&state.conversation_id.0) {
            return Ok(false);
        }
        states.insert(state.conversation_id.0.clone(), state);
        Ok(true)
    }

    async fn update(&self, state: ConversationState) -> Result<bool, RepositoryError> {
        let mut states = self.states.write().await;
        match states.get_mut(&state.conversation_id.0) {
            Some(stored)
                if stored.tenant_id == state.tenant_id
                    && stored.state_version == state.state_version =>
            {
                let mut next = state;
                next.state_version += 1;
                *stored = next;
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[derive(Default)]
pub struct InMemoryPaymentTermRepository {
    templates: RwLock<HashMap<String, PaymentTermTemplate>>,
}

#[async_trait::async_trait]
impl PaymentTermRepository for InMemoryPaymentTermRepository {
    async fn list_for_tenant(
        &self,
        tenant_id: &TenantId,
    ) -> Result<Vec<PaymentTermTemplate>, RepositoryError> {
        let templates = self.templates.read().await;
        let mut set: Vec<PaymentTermTemplate> = templates
            .values()
            .filter(|template| template.tenant_id == *tenant_id)
            .cloned()
            .collect();
        set.sort_by(|a, b| a.par_defaut.cmp(&b.par_defaut).then(a.created_at.cmp(&b.created_at)));
        Ok(set)
    }

    async fn save(&self, template: PaymentTermTemplate) -> Result<(), RepositoryError> {
        let mut templates = self.templates.write().await;
        templates.insert(template.id.0.clone(), template);
        Ok(())
    }
}
