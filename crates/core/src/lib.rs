pub mod billing;
pub mod config;
pub mod dialogue;
pub mod domain;
pub mod errors;
pub mod lifecycle;
pub mod numbering;
pub mod payment_terms;
pub mod reminders;

pub use billing::{document_totals, line_amounts, DocumentTotals, LineAmounts};
pub use dialogue::{
    advance, schema_for, ActionType, CollectedData, ConversationId, ConversationState,
    EngineOutcome, MessageInput, Prompt, SlotKey, SlotValue, Step,
};
pub use domain::client::{Client, ClientId, ContactChannel};
pub use domain::devis::{Devis, DevisId, DevisStatut, LigneDevis, LigneDevisId};
pub use domain::dossier::{Dossier, DossierId, DossierStatut};
pub use domain::facture::{Facture, FactureId, FactureStatut, LigneFacture, LigneFactureId};
pub use domain::fiche::{FicheVisite, FicheVisiteId};
pub use domain::rdv::{Rdv, RdvId, RdvStatut};
pub use domain::relance::{DocumentRef, Relance, RelanceId, RelanceStatut};
pub use domain::tenant::{Tenant, TenantId};
pub use errors::{ActionError, DomainError, ErrorCode};
pub use numbering::{format_numero, DocumentKind, RetryPolicy};
