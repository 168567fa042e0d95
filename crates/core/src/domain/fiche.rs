use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::client::ClientId;
use crate::domain::dossier::DossierId;
use crate::domain::rdv::RdvId;
use crate::domain::tenant::TenantId;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FicheVisiteId(pub String);

impl FicheVisiteId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Site-visit report; feeds the quote that usually follows the visit.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FicheVisite {
    pub id: FicheVisiteId,
    pub tenant_id: TenantId,
    pub client_id: ClientId,
    pub dossier_id: Option<DossierId>,
    pub rdv_id: Option<RdvId>,
    pub observations: String,
    /// Measured work surface in square meters, when the artisan took one.
    pub surface_m2: Option<Decimal>,
    /// Condition of the support ("mur humide", "toiture saine").
    pub etat_support: Option<String>,
    pub date_visite: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
