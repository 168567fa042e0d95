use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::dialogue::schema::ActionType;
use crate::dialogue::slots::{CollectedData, SlotKey};
use crate::domain::tenant::TenantId;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConversationId(pub String);

impl ConversationId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Step {
    AskClient,
    AskPrestations,
    AskDelay,
    AskAddress,
    AskDossierInfo,
    AskRdvDate,
    AskRdvConfirm,
    AskFicheVisite,
    PostVisite,
    Confirmation,
    ReadyToCreate,
}

impl Step {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AskClient => "ASK_CLIENT",
            Self::AskPrestations => "ASK_PRESTATIONS",
            Self::AskDelay => "ASK_DELAY",
            Self::AskAddress => "ASK_ADDRESS",
            Self::AskDossierInfo => "ASK_DOSSIER_INFO",
            Self::AskRdvDate => "ASK_RDV_DATE",
            Self::AskRdvConfirm => "ASK_RDV_CONFIRM",
            Self::AskFicheVisite => "ASK_FICHE_VISITE",
            Self::PostVisite => "POST_VISITE",
            Self::Confirmation => "CONFIRMATION",
            Self::ReadyToCreate => "READY_TO_CREATE",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "ASK_CLIENT" => Some(Self::AskClient),
            "ASK_PRESTATIONS" => Some(Self::AskPrestations),
            "ASK_DELAY" => Some(Self::AskDelay),
            "ASK_ADDRESS" => Some(Self::AskAddress),
            "ASK_DOSSIER_INFO" => Some(Self::AskDossierInfo),
            "ASK_RDV_DATE" => Some(Self::AskRdvDate),
            "ASK_RDV_CONFIRM" => Some(Self::AskRdvConfirm),
            "ASK_FICHE_VISITE" => Some(Self::AskFicheVisite),
            "POST_VISITE" => Some(Self::PostVisite),
            "CONFIRMATION" => Some(Self::Confirmation),
            "READY_TO_CREATE" => Some(Self::ReadyToCreate),
            _ => None,
        }
    }

    /// Step that collects a given slot.
    pub fn for_slot(key: SlotKey) -> Self {
        match key {
            SlotKey::Client => Self::AskClient,
            SlotKey::Prestations => Self::AskPrestations,
            SlotKey::Delai => Self::AskDelay,
            SlotKey::Adresse => Self::AskAddress,
            SlotKey::DossierInfo => Self::AskDossierInfo,
            SlotKey::RdvDate => Self::AskRdvDate,
            SlotKey::RdvConfirme => Self::AskRdvConfirm,
            SlotKey::FicheObservations => Self::AskFicheVisite,
        }
    }
}

/// Durable per-conversation row the engine reads and writes each turn.
/// `missing_fields` is always the exact complement, for the current action,
/// of the slots present and valid in `collected` (enforced by the engine on
/// every advance).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConversationState {
    pub conversation_id: ConversationId,
    pub tenant_id: TenantId,
    pub current_step: Option<Step>,
    pub action_type: Option<ActionType>,
    pub collected: Option<CollectedData>,
    pub missing_fields: Vec<SlotKey>,
    pub pending_confirmation: bool,
    pub confirmation_type: Option<String>,
    pub state_version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ConversationState {
    pub fn new(conversation_id: ConversationId, tenant_id: TenantId, now: DateTime<Utc>) -> Self {
        Self {
            conversation_id,
            tenant_id,
            current_step: None,
            action_type: None,
            collected: None,
            missing_fields: Vec::new(),
            pending_confirmation: false,
            confirmation_type: None,
            state_version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// No action in flight.
    pub fn is_idle(&self) -> bool {
        self.action_type.is_none()
    }

    /// Reset to the idle shape; the row itself stays.
    pub fn clear(&mut self) {
        self.current_step = None;
        self.action_type = None;
        self.collected = None;
        self.missing_fields.clear();
        self.pending_confirmation = false;
        self.confirmation_type = None;
    }

    /// Stale in-flight conversations are treated as abandoned.
    pub fn is_expired(&self, now: DateTime<Utc>, abandon_after_hours: u64) -> bool {
        if self.is_idle() {
            return false;
        }
        now.signed_duration_since(self.updated_at) > Duration::hours(abandon_after_hours as i64)
    }
}
