use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::client::ClientId;
use crate::domain::tenant::TenantId;
use crate::errors::DomainError;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DossierId(pub String);

impl DossierId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Funnel from first contact to paid invoice. `perdu`/`annule` are reachable
/// from any non-terminal statut; everything else advances one step at a time
/// except `facture_envoyee -> facture_payee` (an invoice paid on time skips
/// the late step).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DossierStatut {
    ContactRecu,
    Qualification,
    RdvAPlanifier,
    RdvPlanifie,
    RdvConfirme,
    VisiteRealisee,
    DevisEnCours,
    DevisPret,
    DevisEnvoye,
    EnNegociation,
    Signe,
    ChantierEnCours,
    ChantierTermine,
    FactureACreer,
    FactureEnvoyee,
    FactureEnRetard,
    FacturePayee,
    Perdu,
    Annule,
}

const FUNNEL: [DossierStatut; 17] = [
    DossierStatut::ContactRecu,
    DossierStatut::Qualification,
    DossierStatut::RdvAPlanifier,
    DossierStatut::RdvPlanifie,
    DossierStatut::RdvConfirme,
    DossierStatut::VisiteRealisee,
    DossierStatut::DevisEnCours,
    DossierStatut::DevisPret,
    DossierStatut::DevisEnvoye,
    DossierStatut::EnNegociation,
    DossierStatut::Signe,
    DossierStatut::ChantierEnCours,
    DossierStatut::ChantierTermine,
    DossierStatut::FactureACreer,
    DossierStatut::FactureEnvoyee,
    DossierStatut::FactureEnRetard,
    DossierStatut::FacturePayee,
];

impl DossierStatut {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ContactRecu => "contact_recu",
            Self::Qualification => "qualification",
            Self::RdvAPlanifier => "rdv_a_planifier",
            Self::RdvPlanifie => "rdv_planifie",
            Self::RdvConfirme => "rdv_confirme",
            Self::VisiteRealisee => "visite_realisee",
            Self::DevisEnCours => "devis_en_cours",
            Self::DevisPret => "devis_pret",
            Self::DevisEnvoye => "devis_envoye",
            Self::EnNegociation => "en_negociation",
            Self::Signe => "signe",
            Self::ChantierEnCours => "chantier_en_cours",
            Self::ChantierTermine => "chantier_termine",
            Self::FactureACreer => "facture_a_creer",
            Self::FactureEnvoyee => "facture_envoyee",
            Self::FactureEnRetard => "facture_en_retard",
            Self::FacturePayee => "facture_payee",
            Self::Perdu => "perdu",
            Self::Annule => "annule",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        FUNNEL
            .iter()
            .copied()
            .chain([Self::Perdu, Self::Annule])
            .find(|statut| statut.as_str() == value)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::FacturePayee | Self::Perdu | Self::Annule)
    }

    /// Position in the linear funnel; `perdu`/`annule` sit outside it.
    fn funnel_rank(&self) -> Option<usize> {
        FUNNEL.iter().position(|statut| statut == self)
    }

    pub fn next_in_funnel(&self) -> Option<DossierStatut> {
        let rank = self.funnel_rank()?;
        FUNNEL.get(rank + 1).copied()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dossier {
    pub id: DossierId,
    pub tenant_id: TenantId,
    pub client_id: ClientId,
    pub statut: DossierStatut,
    pub titre: String,
    pub description: Option<String>,
    pub type_travaux: Option<String>,
    pub adresse_chantier: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Dossier {
    pub fn can_transition_to(&self, next: DossierStatut) -> bool {
        if self.statut.is_terminal() {
            return false;
        }
        if matches!(next, DossierStatut::Perdu | DossierStatut::Annule) {
            return true;
        }
        if self.statut.next_in_funnel() == Some(next) {
            return true;
        }
        matches!((self.statut, next), (DossierStatut::FactureEnvoyee, DossierStatut::FacturePayee))
    }

    /// All-or-nothing: a rejected transition leaves the dossier untouched.
    pub fn transition_to(&mut self, next: DossierStatut) -> Result<(), DomainError> {
        if self.can_transition_to(next) {
            self.statut = next;
            return Ok(());
        }

        Err(DomainError::InvalidDossierTransition { from: self.statut, to: next })
    }

    /// Best-effort funnel catch-up used by creation side effects (a devis
    /// created straight after qualification implies the visit happened off
    /// the record). Never moves backwards and never leaves a terminal
    /// statut; returns whether the statut changed.
    pub fn advance_to(&mut self, target: DossierStatut) -> bool {
        if self.statut.is_terminal() {
            return false;
        }
        let (Some(current), Some(wanted)) = (self.statut.funnel_rank(), target.funnel_rank())
        else {
            return false;
        };
        if wanted <= current {
            return false;
        }

        self.statut = target;
        true
    }
}
