use async_trait::async_trait;
use chrono::NaiveDate;
use thiserror::Error;

use artibot_core::dialogue::{ConversationId, ConversationState};
use artibot_core::domain::client::{Client, ClientId};
use artibot_core::domain::devis::{Devis, DevisId, LigneDevis};
use artibot_core::domain::dossier::{Dossier, DossierId};
use artibot_core::domain::facture::{Facture, FactureId, LigneFacture};
use artibot_core::domain::fiche::{FicheVisite, FicheVisiteId};
use artibot_core::domain::rdv::{Rdv, RdvId};
use artibot_core::domain::relance::{DocumentRef, Relance, RelanceId};
use artibot_core::domain::tenant::{Tenant, TenantId};
use artibot_core::payment_terms::PaymentTermTemplate;

pub mod clients;
pub mod conversations;
pub mod devis;
pub mod dossiers;
pub mod factures;
pub mod fiches;
pub mod memory;
pub mod payment_terms;
pub mod rdv;
pub mod relances;
mod rows;
pub mod tenants;

pub use clients::SqlClientRepository;
pub use conversations::SqlConversationStateRepository;
pub use devis::SqlDevisRepository;
pub use dossiers::SqlDossierRepository;
pub use factures::SqlFactureRepository;
pub use fiches::SqlFicheVisiteRepository;
pub use memory::{
    InMemoryClientRepository, InMemoryConversationStateRepository, InMemoryDevisRepository,
    InMemoryDossierRepository, InMemoryFactureRepository, InMemoryFicheVisiteRepository,
    InMemoryPaymentTermRepository, InMemoryRdvRepository, InMemoryRelanceRepository,
    InMemoryTenantRepository,
};
pub use payment_terms::SqlPaymentTermRepository;
pub use rdv::SqlRdvRepository;
pub use relances::SqlRelanceRepository;
pub use tenants::SqlTenantRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("encode error: {0}")]
    Encode(String),
}

#[async_trait]
pub trait TenantRepository: Send + Sync {
    async fn find_by_id(&self, id: &TenantId) -> Result<Option<Tenant>, RepositoryError>;
    async fn save(&self, tenant: Tenant) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait ClientRepository: Send + Sync {
    async fn find_by_id(
        &self,
        tenant_id: &TenantId,
        id: &ClientId,
    ) -> Result<Option<Client>, RepositoryError>;

    /// All clients whose `nom` contains the query, ordered by `nom`.
    async fn search(
        &self,
        tenant_id: &TenantId,
        query: &str,
    ) -> Result<Vec<Client>, RepositoryError>;

    /// Exact case-insensitive match; the oldest client wins when homonyms
    /// exist.
    async fn find_by_nom(
        &self,
        tenant_id: &TenantId,
        nom: &str,
    ) -> Result<Option<Client>, RepositoryError>;

    async fn save(&self, client: Client) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait DossierRepository: Send + Sync {
    async fn find_by_id(
        &self,
        tenant_id: &TenantId,
        id: &DossierId,
    ) -> Result<Option<Dossier>, RepositoryError>;

    /// Most recent non-terminal dossier for the client, if any.
    async fn active_for_client(
        &self,
        tenant_id: &TenantId,
        client_id: &ClientId,
    ) -> Result<Option<Dossier>, RepositoryError>;

    async fn save(&self, dossier: Dossier) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait DevisRepository: Send + Sync {
    async fn find_by_id(
        &self,
        tenant_id: &TenantId,
        id: &DevisId,
    ) -> Result<Option<Devis>, RepositoryError>;

    async fn find_by_numero(
        &self,
        tenant_id: &TenantId,
        numero: &str,
    ) -> Result<Option<Devis>, RepositoryError>;

    async fn lignes(&self, id: &DevisId) -> Result<Vec<LigneDevis>, RepositoryError>;

    /// Most recently sent devis for the client, used when a relance names
    /// only the client.
    async fn latest_envoye_for_client(
        &self,
        tenant_id: &TenantId,
        client_id: &ClientId,
    ) -> Result<Option<Devis>, RepositoryError>;

    async fn save(&self, devis: Devis) -> Result<(), RepositoryError>;

    /// Replaces the full line set in one transaction; positions are taken
    /// as given.
    async fn replace_lignes(
        &self,
        id: &DevisId,
        lignes: Vec<LigneDevis>,
    ) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait FactureRepository: Send + Sync {
    async fn find_by_id(
        &self,
        tenant_id: &TenantId,
        id: &FactureId,
    ) -> Result<Option<Facture>, RepositoryError>;

    async fn find_by_numero(
        &self,
        tenant_id: &TenantId,
        numero: &str,
    ) -> Result<Option<Facture>, RepositoryError>;

    async fn lignes(&self, id: &FactureId) -> Result<Vec<LigneFacture>, RepositoryError>;

    /// Most recent unpaid (envoyee or en_retard) facture for the client.
    async fn latest_unpaid_for_client(
        &self,
        tenant_id: &TenantId,
        client_id: &ClientId,
    ) -> Result<Option<Facture>, RepositoryError>;

    /// Unpaid factures whose echeance is strictly before `today`.
    async fn list_relance_candidates(
        &self,
        tenant_id: &TenantId,
        today: NaiveDate,
    ) -> Result<Vec<Facture>, RepositoryError>;

    async fn save(&self, facture: Facture) -> Result<(), RepositoryError>;

    async fn replace_lignes(
        &self,
        id: &FactureId,
        lignes: Vec<LigneFacture>,
    ) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait RdvRepository: Send + Sync {
    async fn find_by_id(
        &self,
        tenant_id: &TenantId,
        id: &RdvId,
    ) -> Result<Option<Rdv>, RepositoryError>;

    /// Future rdv still holding at least one unsent reminder flag.
    async fn list_with_pending_rappels(
        &self,
        tenant_id: &TenantId,
        after: chrono::DateTime<chrono::Utc>,
    ) -> Result<Vec<Rdv>, RepositoryError>;

    async fn save(&self, rdv: Rdv) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait FicheVisiteRepository: Send + Sync {
    async fn find_by_id(
        &self,
        tenant_id: &TenantId,
        id: &FicheVisiteId,
    ) -> Result<Option<FicheVisite>, RepositoryError>;

    async fn save(&self, fiche: FicheVisite) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait RelanceRepository: Send + Sync {
    async fn find_by_id(
        &self,
        tenant_id: &TenantId,
        id: &RelanceId,
    ) -> Result<Option<Relance>, RepositoryError>;

    /// How many relances already target the document; the next niveau is
    /// count + 1.
    async fn count_for_document(
        &self,
        tenant_id: &TenantId,
        document: &DocumentRef,
    ) -> Result<u32, RepositoryError>;

    async fn save(&self, relance: Relance) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait ConversationStateRepository: Send + Sync {
    async fn find(
        &self,
        tenant_id: &TenantId,
        conversation_id: &ConversationId,
    ) -> Result<Option<ConversationState>, RepositoryError>;

    /// Inserts a fresh row; returns false when the conversation already
    /// exists (another writer won the race).
    async fn insert(&self, state: ConversationState) -> Result<bool, RepositoryError>;

    /// Compare-and-swap on `state_version`; returns false when the stored
    /// version moved and nothing was written.
    async fn update(&self, state: ConversationState) -> Result<bool, RepositoryError>;
}

#[async_trait]
pub trait PaymentTermRepository: Send + Sync {
    /// Tenant templates with specific ranges first, the default last.
    async fn list_for_tenant(
        &self,
        tenant_id: &TenantId,
    ) -> Result<Vec<PaymentTermTemplate>, RepositoryError>;

    async fn save(&self, template: PaymentTermTemplate) -> Result<(), RepositoryError>;
}
