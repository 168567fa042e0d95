use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::devis::DevisId;
use crate::domain::facture::FactureId;
use crate::domain::tenant::TenantId;
use crate::errors::DomainError;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RelanceId(pub String);

impl RelanceId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// A relance targets exactly one document, never both.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type", content = "id")]
pub enum DocumentRef {
    Facture(FactureId),
    Devis(DevisId),
}

impl DocumentRef {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Facture(_) => "facture",
            Self::Devis(_) => "devis",
        }
    }

    pub fn id_str(&self) -> &str {
        match self {
            Self::Facture(id) => id.as_str(),
            Self::Devis(id) => id.as_str(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelanceStatut {
    Planifie,
    Envoye,
    Reussi,
    Echoue,
}

impl RelanceStatut {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Planifie => "planifie",
            Self::Envoye => "envoye",
            Self::Reussi => "reussi",
            Self::Echoue => "echoue",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "planifie" => Some(Self::Planifie),
            "envoye" => Some(Self::Envoye),
            "reussi" => Some(Self::Reussi),
            "echoue" => Some(Self::Echoue),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relance {
    pub id: RelanceId,
    pub tenant_id: TenantId,
    pub document: DocumentRef,
    pub niveau: u32,
    pub statut: RelanceStatut,
    pub canal: Option<String>,
    pub message: Option<String>,
    pub date_envoi: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Relance {
    pub fn can_transition_to(&self, next: RelanceStatut) -> bool {
        use RelanceStatut::{Echoue, Envoye, Planifie, Reussi};

        // planifie -> echoue covers validation failures before any send.
        matches!(
            (self.statut, next),
            (Planifie, Envoye) | (Planifie, Echoue) | (Envoye, Reussi) | (Envoye, Echoue)
        )
    }

    pub fn transition_to(&mut self, next: RelanceStatut) -> Result<(), DomainError> {
        if self.can_transition_to(next) {
            self.statut = next;
            return Ok(());
        }

        Err(DomainError::InvalidRelanceTransition { from: self.statut, to: next })
    }
}
