use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Every entity in the system is partitioned by tenant; repository calls
/// always filter on this id.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TenantId(pub String);

impl TenantId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TenantId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tenant {
    pub id: TenantId,
    pub nom: String,
    pub metier: Option<String>,
    pub telephone: Option<String>,
    pub created_at: DateTime<Utc>,
}
