//! French reply rendering. Everything the artisan reads comes out of this
//! module; the rest of the crate deals in structured data only. Plain ASCII
//! on purpose: accents survive WhatsApp fine but not every downstream SMS
//! bridge, so the copy avoids them entirely ("echeance", "EUR").

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;

use artibot_core::billing::default_tva_pct;
use artibot_core::dialogue::slots::DevisSlots;
use artibot_core::dialogue::Prompt;
use artibot_core::errors::ActionError;
use artibot_core::reminders::RappelKind;
use artibot_core::{
    document_totals, line_amounts, ActionType, CollectedData, ConversationState, SlotKey,
};

use crate::runtime::ActionOutput;

pub fn format_eur(amount: Decimal) -> String {
    format!("{amount:.2} EUR").replace('.', ",")
}

pub fn format_date(date: NaiveDate) -> String {
    date.format("%d/%m/%Y").to_string()
}

pub fn format_date_heure(date_heure: DateTime<Utc>) -> String {
    date_heure.format("%d/%m/%Y a %Hh%M").to_string()
}

/// Question or acknowledgement for an engine prompt. Confirmation recaps
/// read the collected slots out of the state.
pub fn render_prompt(prompt: &Prompt, state: &ConversationState) -> String {
    match prompt {
        Prompt::Welcome => "Bonjour ! Je peux creer un devis, une facture ou un dossier, \
                            planifier un rendez-vous, enregistrer une fiche de visite, relancer \
                            un impaye ou retrouver un client. Que puis-je faire pour vous ?"
            .to_string(),
        Prompt::AskSlot { key } => ask_slot(*key, state),
        Prompt::Confirm { action } => confirm_recap(*action, state),
        Prompt::ConfirmDeclined => {
            "Que faut-il corriger ? (le client, les prestations, le delai, l'adresse...)"
                .to_string()
        }
        Prompt::Aborted => "C'est annule. A votre service.".to_string(),
        Prompt::Acknowledged => "C'est note.".to_string(),
        Prompt::CreationPending => "La creation est deja en cours, un instant.".to_string(),
        Prompt::OfferDevisApresVisite => {
            "Voulez-vous que je prepare le devis maintenant ?".to_string()
        }
    }
}

fn ask_slot(key: SlotKey, state: &ConversationState) -> String {
    match key {
        SlotKey::Client => "C'est pour quel client ?".to_string(),
        SlotKey::Prestations => {
            "Quelles prestations ? (ex: 2 fenetres a 450 euros, pose a 300 euros)".to_string()
        }
        SlotKey::Delai => "Quel est le delai d'execution ?".to_string(),
        SlotKey::Adresse => "Quelle est l'adresse du chantier ?".to_string(),
        SlotKey::DossierInfo => "De quels travaux s'agit-il ?".to_string(),
        SlotKey::RdvDate => {
            "Quand a lieu le rendez-vous ? (ex: mardi 14h, ou 15/04 a 10h)".to_string()
        }
        SlotKey::RdvConfirme => rdv_recap(state),
        SlotKey::FicheObservations => "Qu'avez-vous observe sur place ?".to_string(),
    }
}

fn rdv_recap(state: &ConversationState) -> String {
    if let Some(CollectedData::PlanifierRdv(slots)) = state.collected.as_ref() {
        if let (Some(client), Some(date_heure)) = (slots.client.as_deref(), slots.date_heure) {
            return format!(
                "Rendez-vous avec {client} le {}. Je confirme ?",
                format_date_heure(date_heure)
            );
        }
    }
    "Je confirme le rendez-vous ?".to_string()
}

fn confirm_recap(action: ActionType, state: &ConversationState) -> String {
    match state.collected.as_ref() {
        Some(CollectedData::CreateDevis(slots)) => devis_recap(slots),
        Some(CollectedData::CreateFacture(slots)) => {
            let client = slots.client.as_deref().unwrap_or("ce client");
            match slots.devis_ref.as_deref() {
                Some(devis) => {
                    format!("Facture pour {client} d'apres le devis {devis}. Je la cree ?")
                }
                None => format!("Facture pour {client}. Je la cree ?"),
            }
        }
        Some(CollectedData::CreateDossier(slots)) => {
            let client = slots.client.as_deref().unwrap_or("ce client");
            let info = slots.info.as_deref().unwrap_or("travaux a preciser");
            format!("Dossier pour {client} : {info}. Je le cree ?")
        }
        Some(CollectedData::CreerFicheVisite(slots)) => {
            let client = slots.client.as_deref().unwrap_or("ce client");
            format!("Fiche de visite pour {client}. J'enregistre ?")
        }
        Some(CollectedData::Relance(slots)) => match slots.document_ref.as_deref() {
            Some(document) => format!("Je relance le document {document} ?"),
            None => {
                let client = slots.client.as_deref().unwrap_or("ce client");
                format!("Je relance {client} ?")
            }
        },
        _ => format!("Je lance l'action {} ?", action.as_str()),
    }
}

/// Recap shown before a devis is created. Totals are estimates computed
/// with the same defaults creation will apply (quantite 1, prix 0, TVA 20%).
fn devis_recap(slots: &DevisSlots) -> String {
    let client = slots.client.as_deref().unwrap_or("ce client");
    let mut lines = Vec::new();
    let mut amounts = Vec::new();
    for prestation in slots.prestations.iter().flatten() {
        let quantite = prestation.quantite.unwrap_or(Decimal::ONE);
        let prix = prestation.prix_unitaire_ht.unwrap_or(Decimal::ZERO);
        let tva = prestation.tva_pct.unwrap_or_else(default_tva_pct);
        amounts.push(line_amounts(quantite, prix, tva));
        lines.push(format!(
            "- {quantite} x {} a {} HT",
            prestation.description,
            format_eur(prix)
        ));
    }
    let totals = document_totals(&amounts);

    let mut recap = format!("Devis pour {client} :\n{}", lines.join("\n"));
    recap.push_str(&format!(
        "\nTotal estime : {} TTC ({} HT).",
        format_eur(totals.montant_ttc),
        format_eur(totals.montant_ht)
    ));
    if let Some(delai) = slots.delai.as_deref() {
        recap.push_str(&format!("\nDelai : {delai}."));
    }
    if let Some(adresse) = slots.adresse.as_deref() {
        recap.push_str(&format!("\nChantier : {adresse}."));
    }
    recap.push_str("\nJe le cree ?");
    recap
}

pub fn render_output(output: &ActionOutput) -> String {
    match output {
        ActionOutput::DevisCree(created) => {
            let mut reply = format!(
                "Devis {} cree pour {} : {} TTC ({} HT), valable jusqu'au {}.",
                created.devis.numero,
                created.client_nom,
                format_eur(created.devis.montant_ttc),
                format_eur(created.devis.montant_ht),
                format_date(created.devis.date_validite)
            );
            if let Some(echeancier) = created.echeancier.as_ref() {
                let parts: Vec<String> = echeancier
                    .echeances
                    .iter()
                    .map(|part| format!("{} {}", part.libelle, format_eur(part.montant)))
                    .collect();
                reply.push_str(&format!(
                    "\nEcheancier propose ({}) : {}.",
                    echeancier.modele,
                    parts.join(", ")
                ));
            }
            reply
        }
        ActionOutput::FactureCreee(created) => {
            let mut reply = format!(
                "Facture {} creee pour {} : {} TTC, echeance le {}.",
                created.facture.numero,
                created.client_nom,
                format_eur(created.facture.montant_ttc),
                format_date(created.facture.date_echeance)
            );
            if created.devis_statut.is_some() {
                reply.push_str(" Le devis d'origine est marque accepte.");
            }
            reply
        }
        ActionOutput::ClientsTrouves { query, clients } => {
            if clients.is_empty() {
                return format!("Aucun client trouve pour \"{query}\".");
            }
            let mut reply = format!("{} client(s) pour \"{query}\" :", clients.len());
            for client in clients {
                reply.push('\n');
                reply.push_str(&format!("- {}", client.nom));
                if let Some(telephone) = client.telephone.as_deref() {
                    reply.push_str(&format!(", tel {telephone}"));
                }
                if let Some(adresse) = client.adresse.as_deref() {
                    reply.push_str(&format!(", {adresse}"));
                }
            }
            reply
        }
        ActionOutput::DossierCree(created) => format!(
            "Dossier ouvert pour {} : {}.",
            created.client_nom, created.dossier.titre
        ),
        ActionOutput::RdvPlanifie(created) => {
            let mut reply = format!(
                "Rendez-vous note avec {} le {} ({} min).",
                created.client_nom,
                format_date_heure(created.rdv.date_heure),
                created.rdv.duree_minutes
            );
            if let Some(adresse) = created.rdv.adresse.as_deref() {
                reply.push_str(&format!(" Adresse : {adresse}."));
            }
            reply.push_str(" Je vous rappellerai la veille, le jour J et 2h avant.");
            reply
        }
        ActionOutput::FicheEnregistree(created) => {
            format!("Fiche de visite enregistree pour {}.", created.client_nom)
        }
        ActionOutput::RelanceEnvoyee(outcome) => {
            let article = match outcome.document_kind {
                "facture" => "la facture",
                _ => "le devis",
            };
            let mut reply = format!(
                "Relance niveau {} envoyee a {} pour {article} {} ({} TTC).",
                outcome.relance.niveau,
                outcome.client_nom,
                outcome.document_numero,
                format_eur(outcome.montant_ttc)
            );
            if outcome.facture_statut.is_some() {
                reply.push_str(" La facture est passee en retard.");
            }
            reply
        }
    }
}

/// Failure explained to the artisan. Internal detail stays in logs; what
/// comes back on WhatsApp says what to do next.
pub fn render_error(error: &ActionError) -> String {
    match error {
        ActionError::Validation(message) => format!("Impossible : {message}."),
        ActionError::NotFound { entity: "client", reference } => format!(
            "Je ne trouve pas le client \"{reference}\". Verifiez le nom ou dites-m'en plus."
        ),
        ActionError::NotFound { entity, reference } => {
            format!("Je ne trouve pas de {entity} \"{reference}\".")
        }
        ActionError::AmbiguousReference { reference, candidates, .. } => format!(
            "Plusieurs clients correspondent a \"{reference}\" : {}. Lequel ?",
            candidates.join(", ")
        ),
        ActionError::Conflict(_) => {
            "Un autre message est en cours de traitement sur cette conversation. Reessayez \
             dans un instant."
                .to_string()
        }
        ActionError::BusinessRule(message) => format!("Action refusee : {message}."),
        ActionError::Domain(_) => {
            "Ce changement de statut n'est pas permis dans l'etat actuel du document."
                .to_string()
        }
        ActionError::RelanceNotDue(_) => {
            "Cette facture n'est pas encore arrivee a echeance, pas de relance pour l'instant."
                .to_string()
        }
        ActionError::RelanceSatisfied(_) => {
            "Ce document est deja regle ou accepte, rien a relancer.".to_string()
        }
        ActionError::MissingContact { client, .. } => format!(
            "Le client {client} n'a ni telephone ni email enregistre. Ajoutez un contact puis \
             relancez."
        ),
        ActionError::NumeroGeneration { .. } => {
            "Je n'arrive pas a obtenir un numero de document pour le moment. Reessayez."
                .to_string()
        }
        ActionError::VerificationFailed(_) | ActionError::Storage(_) => {
            "Probleme technique de mon cote. Reessayez dans un instant.".to_string()
        }
    }
}

/// Body of a facture relance. The tone hardens with the niveau: rappel,
/// second rappel, mise en demeure.
pub fn relance_facture_message(
    tenant_nom: &str,
    client_nom: &str,
    numero: &str,
    montant_ttc: Decimal,
    date_echeance: NaiveDate,
    niveau: u32,
) -> String {
    let montant = format_eur(montant_ttc);
    let echeance = format_date(date_echeance);
    match niveau {
        1 => format!(
            "Bonjour {client_nom}, un rappel concernant la facture {numero} de {montant} \
             arrivee a echeance le {echeance}. Merci de proceder au reglement. Cordialement, \
             {tenant_nom}."
        ),
        2 => format!(
            "Bonjour {client_nom}, malgre notre precedent rappel, la facture {numero} de \
             {montant} (echeance le {echeance}) reste impayee. Merci de regulariser \
             rapidement. {tenant_nom}."
        ),
        _ => format!(
            "Bonjour {client_nom}, la facture {numero} de {montant} est impayee depuis le \
             {echeance}. Sans reglement sous 8 jours, nous engagerons une procedure de \
             recouvrement. {tenant_nom}."
        ),
    }
}

pub fn relance_devis_message(
    tenant_nom: &str,
    client_nom: &str,
    numero: &str,
    montant_ttc: Decimal,
    niveau: u32,
) -> String {
    let montant = format_eur(montant_ttc);
    if niveau <= 1 {
        format!(
            "Bonjour {client_nom}, avez-vous pu etudier notre devis {numero} de {montant} ? \
             Nous restons disponibles pour toute question. Cordialement, {tenant_nom}."
        )
    } else {
        format!(
            "Bonjour {client_nom}, sans reponse sur le devis {numero} de {montant}, nous \
             devrons liberer le creneau reserve. Dites-nous si vous souhaitez donner suite. \
             {tenant_nom}."
        )
    }
}

/// Appointment reminder sent to the artisan, not the client.
pub fn rappel_message(
    kind: RappelKind,
    client_nom: &str,
    date_heure: DateTime<Utc>,
    adresse: Option<&str>,
) -> String {
    let quand = format_date_heure(date_heure);
    let mut message = match kind {
        RappelKind::J1 => format!("Rappel : rendez-vous demain avec {client_nom}, le {quand}."),
        RappelKind::JourJ => {
            format!("Rendez-vous aujourd'hui avec {client_nom}, a {}.", date_heure.format("%Hh%M"))
        }
        RappelKind::H2 => format!("Dans 2 heures : rendez-vous avec {client_nom} ({quand})."),
    };
    if let Some(adresse) = adresse {
        message.push_str(&format!(" Adresse : {adresse}."));
    }
    message
}
