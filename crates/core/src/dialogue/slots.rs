use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::dialogue::schema::{schema_for, ActionSchema, ActionType};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlotKey {
    Client,
    Prestations,
    Delai,
    Adresse,
    DossierInfo,
    RdvDate,
    RdvConfirme,
    FicheObservations,
}

impl SlotKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Client => "client",
            Self::Prestations => "prestations",
            Self::Delai => "delai",
            Self::Adresse => "adresse",
            Self::DossierInfo => "dossier_info",
            Self::RdvDate => "rdv_date",
            Self::RdvConfirme => "rdv_confirme",
            Self::FicheObservations => "fiche_observations",
        }
    }
}

/// One extracted service line (`"2 fenetres a 450 euros"`). Quantity, price
/// and TVA stay optional here; creation falls back to 1 / 0 / 20%.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PrestationSlot {
    pub description: String,
    pub quantite: Option<Decimal>,
    pub prix_unitaire_ht: Option<Decimal>,
    pub tva_pct: Option<Decimal>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "value")]
pub enum SlotValue {
    Text(String),
    Prestations(Vec<PrestationSlot>),
    Date(DateTime<Utc>),
    Flag(bool),
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DevisSlots {
    pub client: Option<String>,
    pub prestations: Option<Vec<PrestationSlot>>,
    pub delai: Option<String>,
    pub adresse: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct FactureSlots {
    pub client: Option<String>,
    pub devis_ref: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RechercheSlots {
    pub client: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DossierSlots {
    pub client: Option<String>,
    pub info: Option<String>,
    pub adresse: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RdvSlots {
    pub client: Option<String>,
    pub date_heure: Option<DateTime<Utc>>,
    pub confirme: Option<bool>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct FicheSlots {
    pub client: Option<String>,
    pub observations: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RelanceSlots {
    pub client: Option<String>,
    pub document_ref: Option<String>,
}

/// Slot storage as a tagged union: each action carries exactly the fields it
/// can collect, so an unknown slot cannot be smuggled into the wrong action.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "action", content = "slots")]
pub enum CollectedData {
    CreateDevis(DevisSlots),
    CreateFacture(FactureSlots),
    SearchClient(RechercheSlots),
    CreateDossier(DossierSlots),
    PlanifierRdv(RdvSlots),
    CreerFicheVisite(FicheSlots),
    Relance(RelanceSlots),
}

impl CollectedData {
    pub fn empty(action: ActionType) -> Self {
        match action {
            ActionType::CreateDevis => Self::CreateDevis(DevisSlots::default()),
            ActionType::CreateFacture => Self::CreateFacture(FactureSlots::default()),
            ActionType::SearchClient => Self::SearchClient(RechercheSlots::default()),
            ActionType::CreateDossier => Self::CreateDossier(DossierSlots::default()),
            ActionType::PlanifierRdv => Self::PlanifierRdv(RdvSlots::default()),
            ActionType::CreerFicheVisite => Self::CreerFicheVisite(FicheSlots::default()),
            ActionType::Relance => Self::Relance(RelanceSlots::default()),
        }
    }

    pub fn action(&self) -> ActionType {
        match self {
            Self::CreateDevis(_) => ActionType::CreateDevis,
            Self::CreateFacture(_) => ActionType::CreateFacture,
            Self::SearchClient(_) => ActionType::SearchClient,
            Self::CreateDossier(_) => ActionType::CreateDossier,
            Self::PlanifierRdv(_) => ActionType::PlanifierRdv,
            Self::CreerFicheVisite(_) => ActionType::CreerFicheVisite,
            Self::Relance(_) => ActionType::Relance,
        }
    }

    /// Slot present and valid. Blank text and empty prestation lists do not
    /// count; `rdv_confirme` only counts once explicitly affirmative.
    pub fn has(&self, key: SlotKey) -> bool {
        match (self, key) {
            (Self::CreateDevis(s), SlotKey::Client) => filled(&s.client),
            (Self::CreateDevis(s), SlotKey::Prestations) => {
                s.prestations.as_ref().is_some_and(|p| !p.is_empty())
            }
            (Self::CreateDevis(s), SlotKey::Delai) => filled(&s.delai),
            (Self::CreateDevis(s), SlotKey::Adresse) => filled(&s.adresse),
            (Self::CreateFacture(s), SlotKey::Client) => filled(&s.client),
            (Self::SearchClient(s), SlotKey::Client) => filled(&s.client),
            (Self::CreateDossier(s), SlotKey::Client) => filled(&s.client),
            (Self::CreateDossier(s), SlotKey::DossierInfo) => filled(&s.info),
            (Self::CreateDossier(s), SlotKey::Adresse) => filled(&s.adresse),
            (Self::PlanifierRdv(s), SlotKey::Client) => filled(&s.client),
            (Self::PlanifierRdv(s), SlotKey::RdvDate) => s.date_heure.is_some(),
            (Self::PlanifierRdv(s), SlotKey::RdvConfirme) => s.confirme == Some(true),
            (Self::CreerFicheVisite(s), SlotKey::Client) => filled(&s.client),
            (Self::CreerFicheVisite(s), SlotKey::FicheObservations) => filled(&s.observations),
            (Self::Relance(s), SlotKey::Client) => filled(&s.client),
            _ => false,
        }
    }

    /// Merge one extracted slot; values that do not belong to this action or
    /// arrive with the wrong shape are dropped. Returns whether the value
    /// was applied.
    pub fn merge(&mut self, key: SlotKey, value: SlotValue) -> bool {
        match (self, key, value) {
            (Self::CreateDevis(s), SlotKey::Client, SlotValue::Text(v)) => set(&mut s.client, v),
            (Self::CreateDevis(s), SlotKey::Prestations, SlotValue::Prestations(v)) => {
                if v.is_empty() {
                    return false;
                }
                match &mut s.prestations {
                    Some(existing) => existing.extend(v),
                    None => s.prestations = Some(v),
                }
                true
            }
            (Self::CreateDevis(s), SlotKey::Delai, SlotValue::Text(v)) => set(&mut s.delai, v),
            (Self::CreateDevis(s), SlotKey::Adresse, SlotValue::Text(v)) => set(&mut s.adresse, v),
            (Self::CreateFacture(s), SlotKey::Client, SlotValue::Text(v)) => set(&mut s.client, v),
            (Self::SearchClient(s), SlotKey::Client, SlotValue::Text(v)) => set(&mut s.client, v),
            (Self::CreateDossier(s), SlotKey::Client, SlotValue::Text(v)) => set(&mut s.client, v),
            (Self::CreateDossier(s), SlotKey::DossierInfo, SlotValue::Text(v)) => {
                set(&mut s.info, v)
            }
            (Self::CreateDossier(s), SlotKey::Adresse, SlotValue::Text(v)) => {
                set(&mut s.adresse, v)
            }
            (Self::PlanifierRdv(s), SlotKey::Client, SlotValue::Text(v)) => set(&mut s.client, v),
            (Self::PlanifierRdv(s), SlotKey::RdvDate, SlotValue::Date(v)) => {
                s.date_heure = Some(v);
                // a new date always needs a fresh confirmation
                s.confirme = None;
                true
            }
            (Self::PlanifierRdv(s), SlotKey::RdvConfirme, SlotValue::Flag(v)) => {
                s.confirme = Some(v);
                true
            }
            (Self::CreerFicheVisite(s), SlotKey::Client, SlotValue::Text(v)) => {
                set(&mut s.client, v)
            }
            (Self::CreerFicheVisite(s), SlotKey::FicheObservations, SlotValue::Text(v)) => {
                set(&mut s.observations, v)
            }
            (Self::Relance(s), SlotKey::Client, SlotValue::Text(v)) => set(&mut s.client, v),
            _ => false,
        }
    }

    /// Attach a document numero mentioned alongside the action. Invoice
    /// creation reads it as the devis to bill; a relance reads it as the
    /// document to chase. Everything else has no place for it.
    pub fn set_reference(&mut self, reference: &str) -> bool {
        let trimmed = reference.trim();
        if trimmed.is_empty() {
            return false;
        }
        match self {
            Self::CreateFacture(s) => {
                s.devis_ref = Some(trimmed.to_string());
                true
            }
            Self::Relance(s) => {
                s.document_ref = Some(trimmed.to_string());
                true
            }
            _ => false,
        }
    }

    /// Drop a slot so its ASK step runs again. Returns whether anything was
    /// removed.
    pub fn unset(&mut self, key: SlotKey) -> bool {
        match (self, key) {
            (Self::CreateDevis(s), SlotKey::Client) => s.client.take().is_some(),
            (Self::CreateDevis(s), SlotKey::Prestations) => s.prestations.take().is_some(),
            (Self::CreateDevis(s), SlotKey::Delai) => s.delai.take().is_some(),
            (Self::CreateDevis(s), SlotKey::Adresse) => s.adresse.take().is_some(),
            (Self::CreateFacture(s), SlotKey::Client) => s.client.take().is_some(),
            (Self::SearchClient(s), SlotKey::Client) => s.client.take().is_some(),
            (Self::CreateDossier(s), SlotKey::Client) => s.client.take().is_some(),
            (Self::CreateDossier(s), SlotKey::DossierInfo) => s.info.take().is_some(),
            (Self::CreateDossier(s), SlotKey::Adresse) => s.adresse.take().is_some(),
            (Self::PlanifierRdv(s), SlotKey::Client) => s.client.take().is_some(),
            (Self::PlanifierRdv(s), SlotKey::RdvDate) => {
                s.confirme = None;
                s.date_heure.take().is_some()
            }
            (Self::PlanifierRdv(s), SlotKey::RdvConfirme) => s.confirme.take().is_some(),
            (Self::CreerFicheVisite(s), SlotKey::Client) => s.client.take().is_some(),
            (Self::CreerFicheVisite(s), SlotKey::FicheObservations) => {
                s.observations.take().is_some()
            }
            (Self::Relance(s), SlotKey::Client) => s.client.take().is_some(),
            _ => false,
        }
    }

    /// Required slots still absent, in the action's fixed ask order.
    pub fn missing(&self, schema: &ActionSchema) -> Vec<SlotKey> {
        schema.required.iter().copied().filter(|key| !self.has(*key)).collect()
    }

    pub fn missing_for_action(&self) -> Vec<SlotKey> {
        self.missing(schema_for(self.action()))
    }

    /// Client reference every action collects.
    pub fn client(&self) -> Option<&str> {
        let value = match self {
            Self::CreateDevis(s) => &s.client,
            Self::CreateFacture(s) => &s.client,
            Self::SearchClient(s) => &s.client,
            Self::CreateDossier(s) => &s.client,
            Self::PlanifierRdv(s) => &s.client,
            Self::CreerFicheVisite(s) => &s.client,
            Self::Relance(s) => &s.client,
        };
        value.as_deref().map(str::trim).filter(|v| !v.is_empty())
    }
}

fn filled(value: &Option<String>) -> bool {
    value.as_deref().map(str::trim).is_some_and(|v| !v.is_empty())
}

fn set(slot: &mut Option<String>, value: String) -> bool {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return false;
    }
    *slot = Some(trimmed.to_owned());
    true
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use rust_decimal::Decimal;

    use super::{CollectedData, PrestationSlot, SlotKey, SlotValue};
    use crate::dialogue::schema::{schema_for, ActionType};

    fn prestation(description: &str) -> PrestationSlot {
        PrestationSlot {
            description: description.to_string(),
            quantite: Some(Decimal::new(2, 0)),
            prix_unitaire_ht: Some(Decimal::new(100, 0)),
            tva_pct: None,
        }
    }

    #[test]
    fn missing_follows_the_schema_order() {
        let mut data = CollectedData::empty(ActionType::CreateDevis);
        let schema = schema_for(ActionType::CreateDevis);

        assert_eq!(
            data.missing(schema),
            vec![SlotKey::Client, SlotKey::Prestations, SlotKey::Delai, SlotKey::Adresse]
        );

        assert!(data.merge(SlotKey::Delai, SlotValue::Text("2 semaines".to_string())));
        assert_eq!(
            data.missing(schema),
            vec![SlotKey::Client, SlotKey::Prestations, SlotKey::Adresse]
        );
    }

    #[test]
    fn blank_text_never_counts_as_filled() {
        let mut data = CollectedData::empty(ActionType::CreateDevis);
        assert!(!data.merge(SlotKey::Client, SlotValue::Text("   ".to_string())));
        assert!(!data.has(SlotKey::Client));
    }

    #[test]
    fn prestations_accumulate_across_messages() {
        let mut data = CollectedData::empty(ActionType::CreateDevis);
        data.merge(SlotKey::Prestations, SlotValue::Prestations(vec![prestation("fenetres")]));
        data.merge(SlotKey::Prestations, SlotValue::Prestations(vec![prestation("volets")]));

        let CollectedData::CreateDevis(slots) = &data else {
            panic!("unexpected variant");
        };
        assert_eq!(slots.prestations.as_ref().map(Vec::len), Some(2));
    }

    #[test]
    fn foreign_slots_are_dropped() {
        let mut data = CollectedData::empty(ActionType::CreateFacture);
        assert!(!data.merge(SlotKey::RdvDate, SlotValue::Date(Utc::now())));
        assert!(!data.merge(SlotKey::Client, SlotValue::Flag(true)));
        assert!(data.missing_for_action().contains(&SlotKey::Client));
    }

    #[test]
    fn document_reference_only_lands_on_facture_and_relance() {
        let mut facture = CollectedData::empty(ActionType::CreateFacture);
        assert!(facture.set_reference("DEV-2025-0012"));
        assert!(matches!(facture, CollectedData::CreateFacture(ref s)
            if s.devis_ref.as_deref() == Some("DEV-2025-0012")));

        let mut relance = CollectedData::empty(ActionType::Relance);
        assert!(relance.set_reference("FAC-2025-0003"));
        assert!(!relance.set_reference("   "));

        let mut devis = CollectedData::empty(ActionType::CreateDevis);
        assert!(!devis.set_reference("DEV-2025-0012"));
    }

    #[test]
    fn new_rdv_date_resets_the_confirmation() {
        let mut data = CollectedData::empty(ActionType::PlanifierRdv);
        data.merge(SlotKey::Client, SlotValue::Text("Dupont".to_string()));
        data.merge(SlotKey::RdvDate, SlotValue::Date(Utc::now()));
        data.merge(SlotKey::RdvConfirme, SlotValue::Flag(true));
        assert!(data.has(SlotKey::RdvConfirme));

        data.merge(SlotKey::RdvDate, SlotValue::Date(Utc::now()));
        assert!(!data.has(SlotKey::RdvConfirme));
    }

    #[test]
    fn declined_rdv_confirmation_does_not_count() {
        let mut data = CollectedData::empty(ActionType::PlanifierRdv);
        data.merge(SlotKey::RdvConfirme, SlotValue::Flag(false));
        assert!(!data.has(SlotKey::RdvConfirme));
    }

    #[test]
    fn unset_clears_exactly_one_slot() {
        let mut data = CollectedData::empty(ActionType::CreateDossier);
        data.merge(SlotKey::Client, SlotValue::Text("Martin".to_string()));
        data.merge(SlotKey::DossierInfo, SlotValue::Text("isolation combles".to_string()));

        assert!(data.unset(SlotKey::DossierInfo));
        assert!(data.has(SlotKey::Client));
        assert!(!data.has(SlotKey::DossierInfo));
        assert!(!data.unset(SlotKey::DossierInfo));
    }
}
