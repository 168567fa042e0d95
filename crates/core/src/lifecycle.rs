use chrono::{Days, NaiveDate};

use crate::numbering::DocumentKind;

/// Payment is expected 30 days after emission unless the artisan says
/// otherwise; quote validity uses the same window.
pub const ECHEANCE_DEFAULT_DAYS: u64 = 30;

pub fn default_echeance(date_emission: NaiveDate) -> NaiveDate {
    date_emission + Days::new(ECHEANCE_DEFAULT_DAYS)
}

/// Explicit dates are left untouched; only absent ones are derived.
pub fn resolve_echeance(explicit: Option<NaiveDate>, date_emission: NaiveDate) -> NaiveDate {
    explicit.unwrap_or_else(|| default_echeance(date_emission))
}

pub fn resolve_validite(explicit: Option<NaiveDate>, date_emission: NaiveDate) -> NaiveDate {
    explicit.unwrap_or_else(|| default_echeance(date_emission))
}

/// `Devis Dupont - 15/01/2025`, used when the artisan gave no title.
pub fn synthesized_titre(kind: DocumentKind, client_nom: &str, date: NaiveDate) -> String {
    format!("{} {} - {}", kind.label(), client_nom.trim(), date.format("%d/%m/%Y"))
}

pub fn resolve_titre(
    explicit: Option<&str>,
    kind: DocumentKind,
    client_nom: &str,
    date: NaiveDate,
) -> String {
    match explicit.map(str::trim).filter(|titre| !titre.is_empty()) {
        Some(titre) => titre.to_owned(),
        None => synthesized_titre(kind, client_nom, date),
    }
}

pub fn synthesized_dossier_titre(client_nom: &str, type_travaux: Option<&str>) -> String {
    match type_travaux.map(str::trim).filter(|travaux| !travaux.is_empty()) {
        Some(travaux) => format!("{} - {}", travaux, client_nom.trim()),
        None => format!("Dossier {}", client_nom.trim()),
    }
}
