use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::client::ClientId;
use crate::domain::dossier::DossierId;
use crate::domain::tenant::TenantId;
use crate::errors::DomainError;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RdvId(pub String);

impl RdvId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RdvStatut {
    Planifie,
    Confirme,
    Annule,
    Termine,
}

impl RdvStatut {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Planifie => "planifie",
            Self::Confirme => "confirme",
            Self::Annule => "annule",
            Self::Termine => "termine",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "planifie" => Some(Self::Planifie),
            "confirme" => Some(Self::Confirme),
            "annule" => Some(Self::Annule),
            "termine" => Some(Self::Termine),
            _ => None,
        }
    }
}

/// Appointment with three one-shot reminder flags. Flags only ever go from
/// false to true; a reminder is never re-sent.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rdv {
    pub id: RdvId,
    pub tenant_id: TenantId,
    pub client_id: ClientId,
    pub dossier_id: Option<DossierId>,
    pub date_heure: DateTime<Utc>,
    pub duree_minutes: u32,
    pub adresse: Option<String>,
    pub notes: Option<String>,
    pub statut: RdvStatut,
    pub rappel_j1_envoye: bool,
    pub rappel_jour_j_envoye: bool,
    pub rappel_2h_envoye: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Rdv {
    pub fn can_transition_to(&self, next: RdvStatut) -> bool {
        use RdvStatut::{Annule, Confirme, Planifie, Termine};

        matches!(
            (self.statut, next),
            (Planifie, Confirme)
                | (Planifie, Annule)
                | (Planifie, Termine)
                | (Confirme, Annule)
                | (Confirme, Termine)
        )
    }

    pub fn transition_to(&mut self, next: RdvStatut) -> Result<(), DomainError> {
        if self.can_transition_to(next) {
            self.statut = next;
            return Ok(());
        }

        Err(DomainError::InvalidRdvTransition { from: self.statut, to: next })
    }

    pub fn reminders_active(&self) -> bool {
        !matches!(self.statut, RdvStatut::Annule)
    }
}
