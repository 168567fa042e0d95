pub mod engine;
pub mod schema;
pub mod slots;
pub mod state;

pub use engine::{
    advance, post_visite_state, recovery_step, Effect, EngineOutcome, MessageInput, Prompt,
};
pub use schema::{schema_for, ActionSchema, ActionType};
pub use slots::{CollectedData, PrestationSlot, SlotKey, SlotValue};
pub use state::{ConversationId, ConversationState, Step};
