use serde_json::Value;
use thiserror::Error;

use crate::domain::devis::DevisStatut;
use crate::domain::dossier::DossierStatut;
use crate::domain::facture::FactureStatut;
use crate::domain::rdv::RdvStatut;
use crate::domain::relance::RelanceStatut;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("invalid devis transition from {from:?} to {to:?}")]
    InvalidDevisTransition { from: DevisStatut, to: DevisStatut },
    #[error("invalid facture transition from {from:?} to {to:?}")]
    InvalidFactureTransition { from: FactureStatut, to: FactureStatut },
    #[error("invalid dossier transition from {from:?} to {to:?}")]
    InvalidDossierTransition { from: DossierStatut, to: DossierStatut },
    #[error("invalid rdv transition from {from:?} to {to:?}")]
    InvalidRdvTransition { from: RdvStatut, to: RdvStatut },
    #[error("invalid relance transition from {from:?} to {to:?}")]
    InvalidRelanceTransition { from: RelanceStatut, to: RelanceStatut },
    #[error("domain invariant violation: {0}")]
    InvariantViolation(String),
}

/// Stable machine-readable codes carried in every failure envelope.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorCode {
    ValidationError,
    NotFound,
    Conflict,
    BusinessRule,
    InvalidTransition,
    RelanceNotDue,
    RelanceSatisfied,
    MissingContact,
    NumeroGenerationError,
    VerificationFailed,
    StorageError,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ValidationError => "VALIDATION_ERROR",
            Self::NotFound => "NOT_FOUND",
            Self::Conflict => "CONFLICT",
            Self::BusinessRule => "BUSINESS_RULE",
            Self::InvalidTransition => "INVALID_TRANSITION",
            Self::RelanceNotDue => "RELANCE_NOT_DUE",
            Self::RelanceSatisfied => "RELANCE_SATISFIED",
            Self::MissingContact => "MISSING_CONTACT",
            Self::NumeroGenerationError => "NUMERO_GENERATION_ERROR",
            Self::VerificationFailed => "VERIFICATION_FAILED",
            Self::StorageError => "STORAGE_ERROR",
        }
    }
}

/// Outcome taxonomy for every action exposed by the service, chat-driven or
/// direct. Validation and not-found are terminal; conflicts are retried by
/// the caller (or internally for numbering); business rules are never
/// retried; verification mismatches are reported distinctly because the
/// underlying write may have landed.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum ActionError {
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("{entity} `{reference}` not found")]
    NotFound { entity: &'static str, reference: String },
    #[error("{entity} `{reference}` matches several records")]
    AmbiguousReference { entity: &'static str, reference: String, candidates: Vec<String> },
    #[error("concurrent update detected: {0}")]
    Conflict(String),
    #[error("business rule violated: {0}")]
    BusinessRule(String),
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error("relance not due: {0}")]
    RelanceNotDue(String),
    #[error("document already satisfied: {0}")]
    RelanceSatisfied(String),
    #[error("no usable contact channel for client `{client}`")]
    MissingContact { client: String, details: Value },
    #[error("numero generation failed after {attempts} attempts")]
    NumeroGeneration { attempts: u32 },
    #[error("persisted record could not be read back: {0}")]
    VerificationFailed(String),
    #[error("storage failure: {0}")]
    Storage(String),
}

impl ActionError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Validation(_) => ErrorCode::ValidationError,
            Self::NotFound { .. } => ErrorCode::NotFound,
            Self::AmbiguousReference { .. } => ErrorCode::ValidationError,
            Self::Conflict(_) => ErrorCode::Conflict,
            Self::BusinessRule(_) => ErrorCode::BusinessRule,
            Self::Domain(DomainError::InvariantViolation(_)) => ErrorCode::BusinessRule,
            Self::Domain(_) => ErrorCode::InvalidTransition,
            Self::RelanceNotDue(_) => ErrorCode::RelanceNotDue,
            Self::RelanceSatisfied(_) => ErrorCode::RelanceSatisfied,
            Self::MissingContact { .. } => ErrorCode::MissingContact,
            Self::NumeroGeneration { .. } => ErrorCode::NumeroGenerationError,
            Self::VerificationFailed(_) => ErrorCode::VerificationFailed,
            Self::Storage(_) => ErrorCode::StorageError,
        }
    }

    /// Side-effect details attached to the failure envelope, when any.
    pub fn details(&self) -> Option<Value> {
        match self {
            Self::MissingContact { details, .. } if !details.is_null() => Some(details.clone()),
            Self::AmbiguousReference { candidates, .. } => {
                Some(serde_json::json!({ "candidates": candidates }))
            }
            _ => None,
        }
    }

    pub fn not_found(entity: &'static str, reference: impl Into<String>) -> Self {
        Self::NotFound { entity, reference: reference.into() }
    }
}
