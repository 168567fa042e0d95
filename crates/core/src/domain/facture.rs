use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::client::ClientId;
use crate::domain::devis::DevisId;
use crate::domain::dossier::DossierId;
use crate::domain::tenant::TenantId;
use crate::errors::DomainError;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FactureId(pub String);

impl FactureId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LigneFactureId(pub String);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FactureStatut {
    Brouillon,
    Envoyee,
    Payee,
    EnRetard,
}

impl FactureStatut {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Brouillon => "brouillon",
            Self::Envoyee => "envoyee",
            Self::Payee => "payee",
            Self::EnRetard => "en_retard",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "brouillon" => Some(Self::Brouillon),
            "envoyee" => Some(Self::Envoyee),
            "payee" => Some(Self::Payee),
            "en_retard" => Some(Self::EnRetard),
            _ => None,
        }
    }

    pub fn is_satisfied(&self) -> bool {
        matches!(self, Self::Payee)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LigneFacture {
    pub id: LigneFactureId,
    pub facture_id: FactureId,
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
pub struct Facture {
    pub id: FactureId,
    pub tenant_id: TenantId,
    pub client_id: ClientId,
    pub dossier_id: Option<DossierId>,
    pub devis_id: Option<DevisId>,
    pub numero: String,
    pub statut: FactureStatut,
    pub titre: String,
    pub description: Option<String>,
    pub montant_ht: Decimal,
    pub montant_tva: Decimal,
    pub montant_ttc: Decimal,
    pub date_emission: NaiveDate,
    pub date_echeance: NaiveDate,
    pub date_paiement: Option<NaiveDate>,
    pub nb_relances: u32,
    pub derniere_relance: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Facture {
    pub fn can_transition_to(&self, next: FactureStatut) -> bool {
        use FactureStatut::{Brouillon, EnRetard, Envoyee, Payee};

        // en_retard -> payee: a late invoice can still be settled.
        matches!(
            (self.statut, next),
            (Brouillon, Envoyee) | (Envoyee, Payee) | (Envoyee, EnRetard) | (EnRetard, Payee)
        )
    }

    /// All-or-nothing: a rejected transition leaves the facture untouched.
    pub fn transition_to(&mut self, next: FactureStatut) -> Result<(), DomainError> {
        if self.can_transition_to(next) {
            self.statut = next;
            return Ok(());
        }

        Err(DomainError::InvalidFactureTransition { from: self.statut, to: next })
    }

    pub fn is_overdue(&self, today: NaiveDate) -> bool {
        self.date_echeance < today
    }

    pub fn record_relance(&mut self, at: DateTime<Utc>) {
        self.nb_relances += 1;
        self.derniere_relance = Some(at);
    }

    pub fn mark_paid(&mut self, on: NaiveDate) -> Result<(), DomainError> {
        self.transition_to(FactureStatut::Payee)?;
        self.date_paiement = Some(on);
        Ok(())
    }
}
