//! Conversational agent for the artisan back office.
//!
//! This crate is the "brain" between WhatsApp and the domain: it reads French
//! messages, drives the slot-filling dialogue and executes the resulting
//! actions against the repositories.
//!
//! # Architecture
//!
//! Each inbound message runs a constrained loop:
//! 1. **Intent resolution** (`nlu`) - text becomes a structured `MessageInput`
//! 2. **Dialogue advance** (`artibot_core::dialogue`) - the pure engine moves
//!    the conversation state and may emit an execute effect
//! 3. **Action execution** (`orchestrator`, `reminders`) - typed requests
//!    against the repositories, numbering and the relance pipeline
//! 4. **Rendering** (`templates`) - outcomes become plain-ASCII French
//!
//! # Key Types
//!
//! - `AgentRuntime` - the turn loop (see `runtime`)
//! - `IntentResolver` - pluggable message understanding; the deterministic
//!   keyword resolver ships here, a hosted model can slot in behind it
//! - `ActionExecutor` - typed create/update operations on documents
//! - `ReminderService` - relances and RDV rappels, chat-driven or swept
//! - `Notifier` - outbound delivery seam (WhatsApp sender, test collector)
//!
//! # Safety Principle
//!
//! The resolver is strictly a translator. It NEVER decides prices, numeros
//! or statut transitions. Those are deterministic decisions made by the
//! orchestrator and the domain types.

pub mod nlu;
pub mod notify;
pub mod orchestrator;
pub mod reminders;
pub mod runtime;
pub mod templates;

pub use nlu::{DeterministicIntentResolver, IntentResolver};
pub use notify::{InMemoryNotifier, NoopNotifier, Notifier, OutboundMessage};
pub use orchestrator::{ActionExecutor, Repositories};
pub use reminders::{ReminderService, RelanceOutcome, RelanceRequest, SweepReport};
pub use runtime::{ActionOutput, AgentRuntime, TurnReply};
