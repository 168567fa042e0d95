use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::domain::devis::{Devis, DevisStatut};
use crate::domain::facture::{Facture, FactureStatut};
use crate::domain::rdv::Rdv;
use crate::errors::ActionError;

/// The three fixed appointment reminder offsets.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RappelKind {
    J1,
    JourJ,
    H2,
}

impl RappelKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::J1 => "j1",
            Self::JourJ => "jour_j",
            Self::H2 => "2h",
        }
    }
}

/// Instant a reminder becomes due for an appointment. The day-of reminder
/// fires from the start of the appointment's UTC day.
pub fn rappel_due_at(rdv: &Rdv, kind: RappelKind) -> DateTime<Utc> {
    match kind {
        RappelKind::J1 => rdv.date_heure - Duration::hours(24),
        RappelKind::JourJ => rdv.date_heure.date_naive().and_time(NaiveTime::MIN).and_utc(),
        RappelKind::H2 => rdv.date_heure - Duration::hours(2),
    }
}

/// Reminders to emit now: every unsent flag whose offset has been reached,
/// as long as the appointment is not cancelled and has not started yet.
/// Flags are one-shot; sent ones never come back.
pub fn due_rappels(rdv: &Rdv, now: DateTime<Utc>) -> Vec<RappelKind> {
    if !rdv.reminders_active() || now >= rdv.date_heure {
        return Vec::new();
    }

    let pending = [
        (RappelKind::J1, rdv.rappel_j1_envoye),
        (RappelKind::JourJ, rdv.rappel_jour_j_envoye),
        (RappelKind::H2, rdv.rappel_2h_envoye),
    ];

    pending
        .into_iter()
        .filter(|(kind, sent)| !sent && now >= rappel_due_at(rdv, *kind))
        .map(|(kind, _)| kind)
        .collect()
}

/// Relance gate for an invoice: never on a settled or draft document, and
/// only once the echeance is strictly in the past.
pub fn facture_relance_check(facture: &Facture, today: NaiveDate) -> Result<(), ActionError> {
    match facture.statut {
        FactureStatut::Payee => Err(ActionError::RelanceSatisfied(format!(
            "facture {} is already paid",
            facture.numero
        ))),
        FactureStatut::Brouillon => Err(ActionError::BusinessRule(format!(
            "facture {} was never sent",
            facture.numero
        ))),
        FactureStatut::Envoyee | FactureStatut::EnRetard => {
            if facture.is_overdue(today) {
                Ok(())
            } else {
                Err(ActionError::RelanceNotDue(format!(
                    "facture {} is not due before {}",
                    facture.numero, facture.date_echeance
                )))
            }
        }
    }
}

/// Relance gate for a quote: only a sent, still-unanswered devis qualifies.
pub fn devis_relance_check(devis: &Devis) -> Result<(), ActionError> {
    if devis.statut.is_satisfied() {
        return Err(ActionError::RelanceSatisfied(format!(
            "devis {} is already {}",
            devis.numero,
            devis.statut.as_str()
        )));
    }
    if devis.statut != DevisStatut::Envoye {
        return Err(ActionError::BusinessRule(format!(
            "devis {} was never sent",
            devis.numero
        )));
    }
    Ok(())
}

/// Days the automatic sweep waits between two relances on the same facture.
/// Explicit operator-requested relances are not paced.
pub const RELANCE_COOLDOWN_DAYS: i64 = 7;

/// Sweep pacing: a facture relanced within the cooldown window is skipped
/// until the window has fully elapsed.
pub fn sweep_cooldown_elapsed(
    derniere_relance: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> bool {
    match derniere_relance {
        Some(last) => now - last >= Duration::days(RELANCE_COOLDOWN_DAYS),
        None => true,
    }
}

/// Details attached to a MISSING_CONTACT failure so the caller can see the
/// side effects that did land before the validation failed.
pub fn relance_side_effects(
    document_statut: Option<&str>,
    relance_id: &str,
) -> serde_json::Value {
    match document_statut {
        Some(statut) => json!({ "facture_statut": statut, "relance_id": relance_id }),
        None => json!({ "relance_id": relance_id }),
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, NaiveDate, TimeZone, Utc};
    use rust_decimal::Decimal;

    use super::{devis_relance_check, due_rappels, facture_relance_check, RappelKind};
    use crate::domain::client::ClientId;
    use crate::domain::devis::{Devis, DevisId, DevisStatut};
    use crate::domain::facture::{Facture, FactureId, FactureStatut};
    use crate::domain::rdv::{Rdv, RdvId, RdvStatut};
    use crate::domain::tenant::TenantId;
    use crate::errors::ActionError;

    fn rdv_at(date_heure: chrono::DateTime<Utc>) -> Rdv {
        Rdv {
            id: RdvId("rdv-1".to_string()),
            tenant_id: TenantId("tnt-1".to_string()),
            client_id: ClientId("cli-1".to_string()),
            dossier_id: None,
            date_heure,
            duree_minutes: 60,
            adresse: None,
            notes: None,
            statut: RdvStatut::Planifie,
            rappel_j1_envoye: false,
            rappel_jour_j_envoye: false,
            rappel_2h_envoye: false,
            created_at: date_heure - Duration::days(7),
            updated_at: date_heure - Duration::days(7),
        }
    }

    fn facture(statut: FactureStatut, echeance: NaiveDate) -> Facture {
        Facture {
            id: FactureId("fac-1".to_string()),
            tenant_id: TenantId("tnt-1".to_string()),
            client_id: ClientId("cli-1".to_string()),
            dossier_id: None,
            devis_id: None,
            numero: "FAC-2025-0001".to_string(),
            statut,
            titre: "Facture".to_string(),
            description: None,
            montant_ht: Decimal::ZERO,
            montant_tva: Decimal::ZERO,
            montant_ttc: Decimal::ZERO,
            date_emission: echeance - chrono::Days::new(30),
            date_echeance: echeance,
            date_paiement: None,
            nb_relances: 0,
            derniere_relance: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn devis(statut: DevisStatut) -> Devis {
        Devis {
            id: DevisId("dev-1".to_string()),
            tenant_id: TenantId("tnt-1".to_string()),
            client_id: ClientId("cli-1".to_string()),
            dossier_id: None,
            numero: "DEV-2025-0001".to_string(),
            statut,
            titre: "Devis".to_string(),
            description: None,
            montant_ht: Decimal::ZERO,
            montant_tva: Decimal::ZERO,
            montant_ttc: Decimal::ZERO,
            date_emission: NaiveDate::from_ymd_opt(2025, 1, 15).expect("valid date"),
            date_validite: NaiveDate::from_ymd_opt(2025, 2, 14).expect("valid date"),
            delai_execution: None,
            adresse_chantier: None,
            nb_relances: 0,
            derniere_relance_client: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn all_three_rappels_become_due_in_order() {
        let start = Utc.with_ymd_and_hms(2025, 3, 10, 14, 0, 0).single().expect("valid instant");
        let rdv = rdv_at(start);

        // 3 days out: nothing
        assert!(due_rappels(&rdv, start - Duration::days(3)).is_empty());
        // 20 hours out: j1 has passed, and it is already the appointment day
        assert_eq!(
            due_rappels(&rdv, start - Duration::hours(20)),
            vec![RappelKind::J1, RappelKind::JourJ]
        );
        // 90 minutes out: everything
        assert_eq!(
            due_rappels(&rdv, start - Duration::minutes(90)),
            vec![RappelKind::J1, RappelKind::JourJ, RappelKind::H2]
        );
    }

    #[test]
    fn jour_j_waits_for_the_appointment_day() {
        // early-morning rdv: j1 fires the evening before, jour_j only after midnight
        let start = Utc.with_ymd_and_hms(2025, 3, 10, 8, 0, 0).single().expect("valid instant");
        let rdv = rdv_at(start);

        let evening_before = Utc.with_ymd_and_hms(2025, 3, 9, 10, 0, 0).single().expect("instant");
        assert_eq!(due_rappels(&rdv, evening_before), vec![RappelKind::J1]);

        let after_midnight = Utc.with_ymd_and_hms(2025, 3, 10, 0, 30, 0).single().expect("instant");
        assert_eq!(due_rappels(&rdv, after_midnight), vec![RappelKind::J1, RappelKind::JourJ]);
    }

    #[test]
    fn sent_flags_are_one_shot() {
        let start = Utc::now() + Duration::minutes(30);
        let mut rdv = rdv_at(start);
        rdv.rappel_j1_envoye = true;
        rdv.rappel_jour_j_envoye = true;

        assert_eq!(due_rappels(&rdv, Utc::now()), vec![RappelKind::H2]);

        rdv.rappel_2h_envoye = true;
        assert!(due_rappels(&rdv, Utc::now()).is_empty());
    }

    #[test]
    fn cancelled_or_started_rdv_gets_no_rappels() {
        let start = Utc::now() + Duration::minutes(30);
        let mut rdv = rdv_at(start);
        rdv.statut = RdvStatut::Annule;
        assert!(due_rappels(&rdv, Utc::now()).is_empty());

        let past = rdv_at(Utc::now() - Duration::minutes(5));
        assert!(due_rappels(&past, Utc::now()).is_empty());
    }

    #[test]
    fn paid_invoice_always_refuses_relances() {
        let today = NaiveDate::from_ymd_opt(2025, 5, 1).expect("valid date");
        for echeance in [today - chrono::Days::new(10), today + chrono::Days::new(10)] {
            let error = facture_relance_check(&facture(FactureStatut::Payee, echeance), today)
                .expect_err("payee must refuse");
            assert!(matches!(error, ActionError::RelanceSatisfied(_)));
        }
    }

    #[test]
    fn future_echeance_is_not_yet_due() {
        let today = NaiveDate::from_ymd_opt(2025, 5, 1).expect("valid date");
        let facture = facture(FactureStatut::Envoyee, today + chrono::Days::new(5));

        let error = facture_relance_check(&facture, today).expect_err("not due");
        assert!(matches!(error, ActionError::RelanceNotDue(_)));

        // the due day itself is still not strictly past
        let on_the_day =
            facture_relance_check(&Facture { date_echeance: today, ..facture }, today);
        assert!(matches!(on_the_day.expect_err("still not due"), ActionError::RelanceNotDue(_)));
    }

    #[test]
    fn overdue_sent_invoice_is_eligible() {
        let today = NaiveDate::from_ymd_opt(2025, 5, 1).expect("valid date");
        let overdue = facture(FactureStatut::Envoyee, today - chrono::Days::new(1));
        assert!(facture_relance_check(&overdue, today).is_ok());

        let late = facture(FactureStatut::EnRetard, today - chrono::Days::new(15));
        assert!(facture_relance_check(&late, today).is_ok());
    }

    #[test]
    fn draft_invoice_is_a_business_rule_error() {
        let today = NaiveDate::from_ymd_opt(2025, 5, 1).expect("valid date");
        let error = facture_relance_check(&facture(FactureStatut::Brouillon, today), today)
            .expect_err("draft must refuse");
        assert!(matches!(error, ActionError::BusinessRule(_)));
    }

    #[test]
    fn sweep_cooldown_spans_seven_full_days() {
        let now = Utc.with_ymd_and_hms(2025, 5, 10, 9, 0, 0).single().expect("valid instant");

        assert!(super::sweep_cooldown_elapsed(None, now));
        assert!(super::sweep_cooldown_elapsed(Some(now - Duration::days(7)), now));
        assert!(!super::sweep_cooldown_elapsed(Some(now - Duration::days(6)), now));
        assert!(!super::sweep_cooldown_elapsed(
            Some(now - Duration::days(7) + Duration::minutes(1)),
            now
        ));
    }

    #[test]
    fn devis_relance_only_for_sent_quotes() {
        assert!(devis_relance_check(&devis(DevisStatut::Envoye)).is_ok());

        let satisfied = devis_relance_check(&devis(DevisStatut::Accepte)).expect_err("satisfied");
        assert!(matches!(satisfied, ActionError::RelanceSatisfied(_)));

        let draft = devis_relance_check(&devis(DevisStatut::Brouillon)).expect_err("not sent");
        assert!(matches!(draft, ActionError::BusinessRule(_)));
    }
}
