use chrono::{DateTime, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use crate::domain::tenant::TenantId;
use crate::errors::DomainError;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PaymentTermTemplateId(pub String);

impl PaymentTermTemplateId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Tenant-defined deposit/installment/balance split, selectable by the
/// quote's TTC amount range. `montant_min`/`montant_max` are inclusive
/// bounds; a missing bound is open-ended.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentTermTemplate {
    pub id: PaymentTermTemplateId,
    pub tenant_id: TenantId,
    pub nom: String,
    pub montant_min: Option<Decimal>,
    pub montant_max: Option<Decimal>,
    pub acompte_pct: Decimal,
    pub intermediaire_pct: Decimal,
    pub solde_pct: Decimal,
    pub delai_intermediaire_jours: u32,
    pub delai_solde_jours: u32,
    pub par_defaut: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PaymentTermTemplate {
    pub fn validate(&self) -> Result<(), DomainError> {
        let total = self.acompte_pct + self.intermediaire_pct + self.solde_pct;
        if total != Decimal::ONE_HUNDRED {
            return Err(DomainError::InvariantViolation(format!(
                "payment term `{}` percentages sum to {total}, expected 100",
                self.nom
            )));
        }
        if let (Some(min), Some(max)) = (self.montant_min, self.montant_max) {
            if min > max {
                return Err(DomainError::InvariantViolation(format!(
                    "payment term `{}` has montant_min above montant_max",
                    self.nom
                )));
            }
        }
        Ok(())
    }

    pub fn matches_amount(&self, ttc: Decimal) -> bool {
        if self.montant_min.is_some_and(|min| ttc < min) {
            return false;
        }
        !self.montant_max.is_some_and(|max| ttc > max)
    }
}

/// First template whose range contains the amount, else the tenant default.
pub fn select_template(
    templates: &[PaymentTermTemplate],
    ttc: Decimal,
) -> Option<&PaymentTermTemplate> {
    templates
        .iter()
        .find(|template| !template.par_defaut && template.matches_amount(ttc))
        .or_else(|| templates.iter().find(|template| template.par_defaut))
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Installment {
    pub libelle: String,
    pub pct: Decimal,
    pub montant: Decimal,
}

/// Splits a TTC amount per the template. Each part is rounded to cents; the
/// balance absorbs the rounding remainder so the parts always sum exactly
/// to the total.
pub fn installment_plan(template: &PaymentTermTemplate, ttc: Decimal) -> Vec<Installment> {
    let part = |pct: Decimal| {
        (ttc * pct / Decimal::ONE_HUNDRED)
            .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
    };

    let mut plan = Vec::with_capacity(3);
    if template.acompte_pct > Decimal::ZERO {
        plan.push(Installment {
            libelle: "Acompte".to_owned(),
            pct: template.acompte_pct,
            montant: part(template.acompte_pct),
        });
    }
    if template.intermediaire_pct > Decimal::ZERO {
        plan.push(Installment {
            libelle: "Intermediaire".to_owned(),
            pct: template.intermediaire_pct,
            montant: part(template.intermediaire_pct),
        });
    }

    let paid_so_far: Decimal = plan.iter().map(|installment| installment.montant).sum();
    plan.push(Installment {
        libelle: "Solde".to_owned(),
        pct: template.solde_pct,
        montant: ttc - paid_so_far,
    });
    plan
}
