use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

/// French standard rate applied when a line does not carry its own.
pub fn default_tva_pct() -> Decimal {
    Decimal::new(20, 0)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineAmounts {
    pub ht: Decimal,
    pub tva: Decimal,
    pub ttc: Decimal,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentTotals {
    pub montant_ht: Decimal,
    pub montant_tva: Decimal,
    pub montant_ttc: Decimal,
}

fn round_money(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Line totals are computed, never input: HT and TVA are rounded to cents
/// per line, TTC is their sum.
pub fn line_amounts(quantite: Decimal, prix_unitaire_ht: Decimal, tva_pct: Decimal) -> LineAmounts {
    let ht = round_money(quantite * prix_unitaire_ht);
    let tva = round_money(ht * tva_pct / Decimal::ONE_HUNDRED);
    LineAmounts { ht, tva, ttc: ht + tva }
}

/// Header totals are the sum over the full line set. Recomputing from every
/// row keeps headers correct when lines arrive in several batches.
pub fn document_totals<'a, I>(lines: I) -> DocumentTotals
where
    I: IntoIterator<Item = &'a LineAmounts>,
{
    let mut totals = DocumentTotals::default();
    for line in lines {
        totals.montant_ht += line.ht;
        totals.montant_tva += line.tva;
        totals.montant_ttc += line.ttc;
    }
    totals
}
