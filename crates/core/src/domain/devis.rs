use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::client::ClientId;
use crate::domain::dossier::DossierId;
use crate::domain::tenant::TenantId;
use crate::errors::DomainError;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DevisId(pub String);

impl DevisId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LigneDevisId(pub String);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DevisStatut {
    Brouillon,
    EnPreparation,
    Pret,
    Envoye,
    Accepte,
    Refuse,
    Expire,
}

impl DevisStatut {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Brouillon => "brouillon",
            Self::EnPreparation => "en_preparation",
            Self::Pret => "pret",
            Self::Envoye => "envoye",
            Self::Accepte => "accepte",
            Self::Refuse => "refuse",
            Self::Expire => "expire",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "brouillon" => Some(Self::Brouillon),
            "en_preparation" => Some(Self::EnPreparation),
            "pret" => Some(Self::Pret),
            "envoye" => Some(Self::Envoye),
            "accepte" => Some(Self::Accepte),
            "refuse" => Some(Self::Refuse),
            "expire" => Some(Self::Expire),
            _ => None,
        }
    }

    /// Terminal outcomes: the quote no longer waits on the client.
    pub fn is_satisfied(&self) -> bool {
        matches!(self, Self::Accepte | Self::Refuse | Self::Expire)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LigneDevis {
    pub id: LigneDevisId,
    pub devis_id: DevisId,
    pub description: String,
    pub quantite: Decimal,
    pub prix_unitaire_ht: Decimal,
    pub tva_pct: Decimal,
    pub montant_ht: Decimal,
    pub montant_tva: Decimal,
    pub montant_ttc: Decimal,
    pub position: u32,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Devis {
    pub id: DevisId,
    pub tenant_id: TenantId,
    pub client_id: ClientId,
    pub dossier_id: Option<DossierId>,
    pub numero: String,
    pub statut: DevisStatut,
    pub titre: String,
    pub description: Option<String>,
    pub montant_ht: Decimal,
    pub montant_tva: Decimal,
    pub montant_ttc: Decimal,
    pub date_emission: NaiveDate,
    pub date_validite: NaiveDate,
    pub delai_execution: Option<String>,
    pub adresse_chantier: Option<String>,
    pub nb_relances: u32,
    pub derniere_relance_client: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Devis {
    pub fn can_transition_to(&self, next: DevisStatut) -> bool {
        use DevisStatut::{Accepte, Brouillon, EnPreparation, Envoye, Expire, Pret, Refuse};

        matches!(
            (self.statut, next),
            (Brouillon, EnPreparation)
                | (EnPreparation, Pret)
                | (Pret, Envoye)
                | (Envoye, Accepte)
                | (Envoye, Refuse)
                | (Envoye, Expire)
        )
    }

    /// All-or-nothing: a rejected transition leaves the devis untouched.
    pub fn transition_to(&mut self, next: DevisStatut) -> Result<(), DomainError> {
        if self.can_transition_to(next) {
            self.statut = next;
            return Ok(());
        }

        Err(DomainError::InvalidDevisTransition { from: self.statut, to: next })
    }

    pub fn record_relance(&mut self, at: DateTime<Utc>) {
        self.nb_relances += 1;
        self.derniere_relance_client = Some(at);
    }
}
