use serde::{Deserialize, Serialize};

use crate::dialogue::slots::SlotKey;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    CreateDevis,
    CreateFacture,
    SearchClient,
    CreateDossier,
    PlanifierRdv,
    CreerFicheVisite,
    Relance,
}

impl ActionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CreateDevis => "create_devis",
            Self::CreateFacture => "create_facture",
            Self::SearchClient => "search_client",
            Self::CreateDossier => "create_dossier",
            Self::PlanifierRdv => "planifier_rdv",
            Self::CreerFicheVisite => "creer_fiche_visite",
            Self::Relance => "relance",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "create_devis" => Some(Self::CreateDevis),
            "create_facture" => Some(Self::CreateFacture),
            "search_client" => Some(Self::SearchClient),
            "create_dossier" => Some(Self::CreateDossier),
            "planifier_rdv" => Some(Self::PlanifierRdv),
            "creer_fiche_visite" => Some(Self::CreerFicheVisite),
            "relance" => Some(Self::Relance),
            _ => None,
        }
    }
}

/// Per-action slot requirements. The engine is driven entirely by this
/// table; adding an action means adding a row, not a code path.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ActionSchema {
    pub action: ActionType,
    pub required: &'static [SlotKey],
    /// Whether a recap/confirmation round runs once all slots are filled.
    /// `planifier_rdv` confirms through its own `rdv_confirme` slot and
    /// `search_client` is read-only, so neither uses the generic round.
    pub requires_confirmation: bool,
}

static SCHEMAS: [ActionSchema; 7] = [
    ActionSchema {
        action: ActionType::CreateDevis,
        required: &[SlotKey::Client, SlotKey::Prestations, SlotKey::Delai, SlotKey::Adresse],
        requires_confirmation: true,
    },
    ActionSchema {
        action: ActionType::CreateFacture,
        required: &[SlotKey::Client],
        requires_confirmation: true,
    },
    ActionSchema {
        action: ActionType::SearchClient,
        required: &[SlotKey::Client],
        requires_confirmation: false,
    },
    ActionSchema {
        action: ActionType::CreateDossier,
        required: &[SlotKey::Client, SlotKey::DossierInfo, SlotKey::Adresse],
        requires_confirmation: true,
    },
    ActionSchema {
        action: ActionType::PlanifierRdv,
        required: &[SlotKey::Client, SlotKey::RdvDate, SlotKey::RdvConfirme],
        requires_confirmation: false,
    },
    ActionSchema {
        action: ActionType::CreerFicheVisite,
        required: &[SlotKey::Client, SlotKey::FicheObservations],
        requires_confirmation: true,
    },
    ActionSchema {
        action: ActionType::Relance,
        required: &[SlotKey::Client],
        requires_confirmation: true,
    },
];

pub fn schema_for(action: ActionType) -> &'static ActionSchema {
    let index = match action {
        ActionType::CreateDevis => 0,
        ActionType::CreateFacture => 1,
        ActionType::SearchClient => 2,
        ActionType::CreateDossier => 3,
        ActionType::PlanifierRdv => 4,
        ActionType::CreerFicheVisite => 5,
        ActionType::Relance => 6,
    };
    &SCHEMAS[index]
}
