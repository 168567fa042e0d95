use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::dialogue::schema::{schema_for, ActionType};
use crate::dialogue::slots::{CollectedData, SlotKey, SlotValue};
use crate::dialogue::state::{ConversationState, Step};
use crate::errors::ActionError;

/// One parsed inbound message, as produced by the NLU collaborator.
///
/// A correction is only emitted when the user asks to change a slot without
/// giving its replacement in the same message; a direct replacement arrives
/// as a plain slot value.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MessageInput {
    pub intent: Option<ActionType>,
    pub slots: Vec<(SlotKey, SlotValue)>,
    /// Document numero spotted in the text ("DEV-2025-0012"). Only invoice
    /// creation and relances have a place for it; other actions drop it.
    pub document_ref: Option<String>,
    pub affirmation: Option<bool>,
    pub correction: Option<SlotKey>,
    pub abort: bool,
}

/// What the agent should say next; rendering to French text happens in the
/// template layer, which also has the full state for recaps.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Prompt {
    Welcome,
    AskSlot { key: SlotKey },
    Confirm { action: ActionType },
    ConfirmDeclined,
    Aborted,
    Acknowledged,
    CreationPending,
    OfferDevisApresVisite,
}

/// Side effect the runtime must execute once the advanced state is safely
/// persisted.
#[derive(Clone, Debug, PartialEq)]
pub enum Effect {
    Execute { action: ActionType, data: CollectedData },
}

#[derive(Clone, Debug, PartialEq)]
pub struct EngineOutcome {
    pub state: ConversationState,
    pub prompt: Option<Prompt>,
    pub effect: Option<Effect>,
}

impl EngineOutcome {
    fn reply(state: ConversationState, prompt: Prompt) -> Self {
        Self { state, prompt: Some(prompt), effect: None }
    }
}

/// Pure transition function of the slot-filling machine. Merges the new
/// input into the collected slots, recomputes the missing set and decides
/// the next step. No I/O: persistence and effect execution belong to the
/// caller.
pub fn advance(
    state: &ConversationState,
    input: &MessageInput,
    now: DateTime<Utc>,
) -> EngineOutcome {
    let mut next = state.clone();
    next.updated_at = now;

    if input.abort {
        if next.is_idle() {
            return EngineOutcome::reply(next, Prompt::Welcome);
        }
        next.clear();
        return EngineOutcome::reply(next, Prompt::Aborted);
    }

    // A claimed creation is in flight; do not disturb it.
    if next.current_step == Some(Step::ReadyToCreate) {
        return EngineOutcome::reply(next, Prompt::CreationPending);
    }

    if next.current_step == Some(Step::PostVisite) {
        match input.affirmation {
            Some(true) => {
                let client =
                    next.collected.as_ref().and_then(CollectedData::client).map(ToOwned::to_owned);
                let mut data = CollectedData::empty(ActionType::CreateDevis);
                if let Some(client) = client {
                    data.merge(SlotKey::Client, SlotValue::Text(client));
                }
                next.action_type = Some(ActionType::CreateDevis);
                next.collected = Some(data);
                next.pending_confirmation = false;
                next.confirmation_type = None;
            }
            Some(false) => {
                next.clear();
                return EngineOutcome::reply(next, Prompt::Acknowledged);
            }
            None if input.intent.is_some() => {
                // the artisan moved on to something else
                next.clear();
            }
            None => return EngineOutcome::reply(next, Prompt::OfferDevisApresVisite),
        }
    }

    if next.is_idle() {
        let Some(action) = input.intent else {
            return EngineOutcome::reply(next, Prompt::Welcome);
        };
        next.action_type = Some(action);
        next.collected = Some(CollectedData::empty(action));
        next.pending_confirmation = false;
        next.confirmation_type = None;
    }

    let Some(action) = next.action_type else {
        return EngineOutcome::reply(next, Prompt::Welcome);
    };
    let Some(data) = next.collected.as_mut() else {
        next.clear();
        return EngineOutcome::reply(next, Prompt::Welcome);
    };

    for (key, value) in &input.slots {
        data.merge(*key, value.clone());
    }
    if let Some(reference) = input.document_ref.as_deref() {
        data.set_reference(reference);
    }

    // At the RDV confirmation step a bare yes/no addresses the date.
    if state.current_step == Some(Step::AskRdvConfirm) {
        if let Some(confirmed) = input.affirmation {
            data.merge(SlotKey::RdvConfirme, SlotValue::Flag(confirmed));
            if !confirmed {
                data.unset(SlotKey::RdvDate);
            }
        }
    }

    let at_confirmation = state.current_step == Some(Step::Confirmation);
    if at_confirmation {
        if let Some(key) = input.correction {
            data.unset(key);
        }
    }

    let schema = schema_for(action);
    next.missing_fields = data.missing(schema);

    if let Some(first) = next.missing_fields.first().copied() {
        next.current_step = Some(Step::for_slot(first));
        next.pending_confirmation = false;
        next.confirmation_type = None;
        return EngineOutcome::reply(next, Prompt::AskSlot { key: first });
    }

    // All slots collected.
    if !schema.requires_confirmation || (at_confirmation && input.affirmation == Some(true)) {
        let data = data.clone();
        next.current_step = Some(Step::ReadyToCreate);
        next.pending_confirmation = false;
        return EngineOutcome {
            state: next,
            prompt: None,
            effect: Some(Effect::Execute { action, data }),
        };
    }

    if at_confirmation && input.affirmation == Some(false) {
        return EngineOutcome::reply(next, Prompt::ConfirmDeclined);
    }

    next.current_step = Some(Step::Confirmation);
    next.pending_confirmation = true;
    next.confirmation_type = Some(action.as_str().to_owned());
    EngineOutcome::reply(next, Prompt::Confirm { action })
}

/// State written after a successful fiche de visite so the next message can
/// chain straight into the quote that usually follows the visit.
pub fn post_visite_state(state: &ConversationState, now: DateTime<Utc>) -> ConversationState {
    let mut next = state.clone();
    next.current_step = Some(Step::PostVisite);
    next.action_type = Some(ActionType::CreerFicheVisite);
    next.missing_fields = Vec::new();
    next.pending_confirmation = false;
    next.confirmation_type = None;
    next.updated_at = now;
    next
}

/// Step to fall back to when the orchestrator rejects a completed slot set.
/// `None` means there is no offending slot: the state returns to the
/// confirmation step so the artisan can simply retry.
pub fn recovery_step(action: ActionType, error: &ActionError) -> Option<Step> {
    match error {
        ActionError::NotFound { entity: "client", .. } => Some(Step::AskClient),
        ActionError::AmbiguousReference { entity: "client", .. } => Some(Step::AskClient),
        ActionError::MissingContact { .. } => None,
        ActionError::Validation(_) | ActionError::BusinessRule(_)
            if action == ActionType::PlanifierRdv =>
        {
            Some(Step::AskRdvDate)
        }
        _ => None,
    }
}
