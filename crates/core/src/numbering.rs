use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    Devis,
    Facture,
}

impl DocumentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Devis => "devis",
            Self::Facture => "facture",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "devis" => Some(Self::Devis),
            "facture" => Some(Self::Facture),
            _ => None,
        }
    }

    pub fn prefix(&self) -> &'static str {
        match self {
            Self::Devis => "DEV",
            Self::Facture => "FAC",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Devis => "Devis",
            Self::Facture => "Facture",
        }
    }
}

/// `DEV-2025-0042`. The sequence value is per (tenant, kind) and never
/// resets, so a numero can never repeat even across a year rollover.
pub fn format_numero(kind: DocumentKind, year: i32, value: i64) -> String {
    format!("{}-{}-{:04}", kind.prefix(), year, value)
}

/// Bounded retry schedule for counter contention: exponential backoff with
/// jitter, capped per attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_attempts: 3, base_delay_ms: 25, max_delay_ms: 250 }
    }
}

impl RetryPolicy {
    /// Delay before the given retry; `attempt` starts at 1 for the first
    /// retry.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        let scaled = self.base_delay_ms.saturating_mul(1_u64 << exponent);
        let capped = scaled.min(self.max_delay_ms);
        let jitter = rand::thread_rng().gen_range(0..=self.base_delay_ms.max(1) / 2);
        Duration::from_millis(capped.saturating_add(jitter))
    }
}
