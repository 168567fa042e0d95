use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::tenant::TenantId;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ClientId(pub String);

impl ClientId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Channel a relance or rappel can be delivered on. Phone wins over email
/// because the assistant lives on WhatsApp.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContactChannel {
    Telephone(String),
    Email(String),
}

impl ContactChannel {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Telephone(_) => "telephone",
            Self::Email(_) => "email",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Client {
    pub id: ClientId,
    pub tenant_id: TenantId,
    pub nom: String,
    pub telephone: Option<String>,
    pub email: Option<String>,
    pub adresse: Option<String>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Client {
    pub fn contact_channel(&self) -> Option<ContactChannel> {
        if let Some(telephone) = non_blank(self.telephone.as_deref()) {
            return Some(ContactChannel::Telephone(telephone));
        }
        non_blank(self.email.as_deref()).map(ContactChannel::Email)
    }
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value.map(str::trim).filter(|v| !v.is_empty()).map(ToOwned::to_owned)
}
