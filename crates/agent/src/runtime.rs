//! Turn loop of the conversational agent.
//!
//! One inbound WhatsApp message goes through four stages: the resolver reads
//! it into a [`MessageInput`], the pure engine advances the conversation
//! state, the advanced state is persisted under optimistic locking, and only
//! then is any emitted effect executed against the typed executors. The
//! resolver never decides business outcomes; prices, numeros and statut
//! transitions are owned by the orchestrator and the domain.
//!
//! [`MessageInput`]: artibot_core::MessageInput

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use artibot_core::config::DialogueConfig;
use artibot_core::dialogue::{advance, post_visite_state, recovery_step, Effect};
use artibot_core::errors::ActionError;
use artibot_core::{
    schema_for, ActionType, Client, CollectedData, ConversationId, ConversationState, Prompt,
    SlotKey, Step, TenantId,
};

use crate::nlu::IntentResolver;
use crate::orchestrator::{
    storage, ActionExecutor, CreateDevisRequest, CreateDossierRequest, CreateFactureRequest,
    CreerFicheVisiteRequest, DevisCree, DossierCree, FactureCreee, FicheCree, LigneRequest,
    PlanifierRdvRequest, RdvCree, Repositories,
};
use crate::reminders::{ReminderService, RelanceOutcome, RelanceRequest};
use crate::templates;

/// Result of one executed action, carried from the executors to the French
/// renderer and the API layer.
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ActionOutput {
    DevisCree(DevisCree),
    FactureCreee(FactureCreee),
    ClientsTrouves { query: String, clients: Vec<Client> },
    DossierCree(DossierCree),
    RdvPlanifie(RdvCree),
    FicheEnregistree(FicheCree),
    RelanceEnvoyee(RelanceOutcome),
}

/// What goes back over the wire for one inbound message.
#[derive(Clone, Debug, Serialize)]
pub struct TurnReply {
    pub conversation_id: String,
    pub reply: String,
    /// Action that ran this turn, when one did.
    pub action: Option<String>,
    pub error_code: Option<String>,
}

pub struct AgentRuntime {
    resolver: Arc<dyn IntentResolver>,
    executor: ActionExecutor,
    reminders: ReminderService,
    repos: Repositories,
    dialogue: DialogueConfig,
}

impl AgentRuntime {
    pub fn new(
        resolver: Arc<dyn IntentResolver>,
        executor: ActionExecutor,
        reminders: ReminderService,
        dialogue: DialogueConfig,
    ) -> Self {
        let repos = executor.repositories().clone();
        Self { resolver, executor, reminders, repos, dialogue }
    }

    pub fn executor(&self) -> &ActionExecutor {
        &self.executor
    }

    pub fn reminders(&self) -> &ReminderService {
        &self.reminders
    }

    pub fn repositories(&self) -> &Repositories {
        &self.repos
    }

    /// Process one inbound message and produce the French reply.
    ///
    /// The advanced state is persisted before the effect runs, so a crash
    /// between the two leaves the conversation at `READY_TO_CREATE` instead
    /// of double-executing. Action failures are translated into a recovery
    /// step and never lose the slots already collected.
    pub async fn handle_message(
        &self,
        tenant_id: &TenantId,
        conversation_id: &str,
        text: &str,
        now: DateTime<Utc>,
    ) -> Result<TurnReply, ActionError> {
        self.repos
            .tenants
            .find_by_id(tenant_id)
            .await
            .map_err(storage)?
            .ok_or_else(|| ActionError::not_found("tenant", tenant_id.as_str()))?;

        let conversation = ConversationId(conversation_id.to_string());
        let mut state = self.load_state(tenant_id, &conversation, now).await?;
        if state.is_expired(now, self.dialogue.abandon_after_hours) {
            tracing::debug!(conversation_id, "in-flight conversation expired, starting over");
            state.clear();
        }

        let input = self
            .resolver
            .resolve(text, &state, now)
            .await
            .map_err(|error| ActionError::Storage(format!("intent resolution failed: {error}")))?;

        // Optimistic-lock loop: advance on the freshest state and persist; a
        // lost race reloads the row and replays the same input.
        let mut attempts = 0u32;
        let outcome = loop {
            let mut outcome = advance(&state, &input, now);
            if self.repos.conversations.update(outcome.state.clone()).await.map_err(storage)? {
                // Mirror the version bump the successful update applied.
                outcome.state.state_version += 1;
                break outcome;
            }
            attempts += 1;
            if attempts >= self.dialogue.state_retry_attempts {
                return Err(ActionError::Conflict(
                    "conversation is being updated by another message".to_string(),
                ));
            }
            state = self
                .repos
                .conversations
                .find(tenant_id, &conversation)
                .await
                .map_err(storage)?
                .ok_or_else(|| {
                    ActionError::Conflict("conversation state disappeared mid-turn".to_string())
                })?;
        };

        let Some(Effect::Execute { action, data }) = outcome.effect else {
            let prompt = outcome.prompt.unwrap_or(Prompt::Acknowledged);
            return Ok(TurnReply {
                conversation_id: conversation.as_str().to_string(),
                reply: templates::render_prompt(&prompt, &outcome.state),
                action: None,
                error_code: None,
            });
        };

        match self.execute_action(tenant_id, data, now).await {
            Ok(output) => {
                let next = if action == ActionType::CreerFicheVisite {
                    post_visite_state(&outcome.state, now)
                } else {
                    let mut cleared = outcome.state.clone();
                    cleared.clear();
                    cleared.updated_at = now;
                    cleared
                };

                let mut reply = templates::render_output(&output);
                if action == ActionType::CreerFicheVisite {
                    reply.push(' ');
                    reply.push_str(&templates::render_prompt(
                        &Prompt::OfferDevisApresVisite,
                        &next,
                    ));
                }
                self.store_followup(next).await;

                tracing::info!(
                    tenant_id = %tenant_id.as_str(),
                    conversation_id,
                    action = action.as_str(),
                    "action executed"
                );
                Ok(TurnReply {
                    conversation_id: conversation.as_str().to_string(),
                    reply,
                    action: Some(action.as_str().to_string()),
                    error_code: None,
                })
            }
            Err(error) => {
                let code = error.code();
                let mut recovered = outcome.state.clone();
                recovered.updated_at = now;

                let step_and_key =
                    recovery_step(action, &error).and_then(|step| Some((step, slot_of(step)?)));
                let follow_up = match step_and_key {
                    Some((step, key)) => {
                        // Drop the rejected slot so its ASK step runs again;
                        // everything else already collected is kept.
                        if let Some(data) = recovered.collected.as_mut() {
                            data.unset(key);
                            recovered.missing_fields = data.missing_for_action();
                        }
                        recovered.current_step = Some(step);
                        recovered.pending_confirmation = false;
                        recovered.confirmation_type = None;
                        Some(templates::render_prompt(&Prompt::AskSlot { key }, &recovered))
                    }
                    None if schema_for(action).requires_confirmation => {
                        recovered.current_step = Some(Step::Confirmation);
                        recovered.pending_confirmation = true;
                        recovered.confirmation_type = Some(action.as_str().to_owned());
                        Some("Dites oui pour reessayer, ou annuler pour abandonner.".to_string())
                    }
                    None => {
                        recovered.clear();
                        None
                    }
                };
                self.store_followup(recovered).await;

                let mut reply = templates::render_error(&error);
                if let Some(follow_up) = follow_up {
                    reply.push(' ');
                    reply.push_str(&follow_up);
                }
                tracing::warn!(
                    tenant_id = %tenant_id.as_str(),
                    conversation_id,
                    action = action.as_str(),
                    code = code.as_str(),
                    "action failed"
                );
                Ok(TurnReply {
                    conversation_id: conversation.as_str().to_string(),
                    reply,
                    action: Some(action.as_str().to_string()),
                    error_code: Some(code.as_str().to_string()),
                })
            }
        }
    }

    async fn load_state(
        &self,
        tenant_id: &TenantId,
        conversation: &ConversationId,
        now: DateTime<Utc>,
    ) -> Result<ConversationState, ActionError> {
        if let Some(state) =
            self.repos.conversations.find(tenant_id, conversation).await.map_err(storage)?
        {
            return Ok(state);
        }
        let fresh = ConversationState::new(conversation.clone(), tenant_id.clone(), now);
        if self.repos.conversations.insert(fresh.clone()).await.map_err(storage)? {
            return Ok(fresh);
        }
        // Lost the insert race; the winner's row is authoritative.
        self.repos.conversations.find(tenant_id, conversation).await.map_err(storage)?.ok_or_else(
            || ActionError::Conflict("conversation row vanished after insert race".to_string()),
        )
    }

    /// The action already ran; losing this write only costs a stale step.
    async fn store_followup(&self, state: ConversationState) {
        match self.repos.conversations.update(state).await {
            Ok(true) => {}
            Ok(false) => tracing::debug!("post-action state write lost a race"),
            Err(error) => tracing::warn!(error = %error, "post-action state write failed"),
        }
    }

    async fn execute_action(
        &self,
        tenant_id: &TenantId,
        data: CollectedData,
        now: DateTime<Utc>,
    ) -> Result<ActionOutput, ActionError> {
        match data {
            CollectedData::CreateDevis(slots) => {
                let client = slots.client.ok_or_else(|| missing_slot(SlotKey::Client))?;
                let lignes = slots
                    .prestations
                    .unwrap_or_default()
                    .into_iter()
                    .map(|prestation| LigneRequest {
                        description: prestation.description,
                        quantite: prestation.quantite,
                        prix_unitaire_ht: prestation.prix_unitaire_ht,
                        tva_pct: prestation.tva_pct,
                    })
                    .collect();
                let request = CreateDevisRequest {
                    client,
                    lignes,
                    titre: None,
                    description: None,
                    delai_execution: slots.delai,
                    adresse_chantier: slots.adresse,
                    date_emission: None,
                    date_validite: None,
                };
                let created = self.executor.create_devis(tenant_id, request, now).await?;
                Ok(ActionOutput::DevisCree(created))
            }
            CollectedData::CreateFacture(slots) => {
                let client = slots.client.ok_or_else(|| missing_slot(SlotKey::Client))?;
                let request = CreateFactureRequest {
                    client,
                    devis_ref: slots.devis_ref,
                    lignes: Vec::new(),
                    titre: None,
                    description: None,
                    date_emission: None,
                    date_echeance: None,
                };
                let created = self.executor.create_facture(tenant_id, request, now).await?;
                Ok(ActionOutput::FactureCreee(created))
            }
            CollectedData::SearchClient(slots) => {
                let query = slots.client.ok_or_else(|| missing_slot(SlotKey::Client))?;
                let clients = self.executor.search_clients(tenant_id, &query).await?;
                Ok(ActionOutput::ClientsTrouves { query, clients })
            }
            CollectedData::CreateDossier(slots) => {
                let client = slots.client.ok_or_else(|| missing_slot(SlotKey::Client))?;
                let info = slots.info.ok_or_else(|| missing_slot(SlotKey::DossierInfo))?;
                let adresse = slots.adresse.ok_or_else(|| missing_slot(SlotKey::Adresse))?;
                let request = CreateDossierRequest {
                    client,
                    info,
                    type_travaux: None,
                    adresse_chantier: adresse,
                };
                let created = self.executor.create_dossier(tenant_id, request, now).await?;
                Ok(ActionOutput::DossierCree(created))
            }
            CollectedData::PlanifierRdv(slots) => {
                let client = slots.client.ok_or_else(|| missing_slot(SlotKey::Client))?;
                let date_heure = slots.date_heure.ok_or_else(|| missing_slot(SlotKey::RdvDate))?;
                let request = PlanifierRdvRequest {
                    client,
                    date_heure,
                    duree_minutes: None,
                    adresse: None,
                    notes: None,
                };
                let created = self.executor.planifier_rdv(tenant_id, request, now).await?;
                Ok(ActionOutput::RdvPlanifie(created))
            }
            CollectedData::CreerFicheVisite(slots) => {
                let client = slots.client.ok_or_else(|| missing_slot(SlotKey::Client))?;
                let observations =
                    slots.observations.ok_or_else(|| missing_slot(SlotKey::FicheObservations))?;
                let request = CreerFicheVisiteRequest {
                    client,
                    observations,
                    surface_m2: None,
                    etat_support: None,
                    rdv_id: None,
                    date_visite: None,
                };
                let created = self.executor.creer_fiche_visite(tenant_id, request, now).await?;
                Ok(ActionOutput::FicheEnregistree(created))
            }
            CollectedData::Relance(slots) => {
                let request =
                    RelanceRequest { client: slots.client, document_ref: slots.document_ref };
                let outcome = self.reminders.relance(tenant_id, request, now).await?;
                Ok(ActionOutput::RelanceEnvoyee(outcome))
            }
        }
    }
}

fn missing_slot(key: SlotKey) -> ActionError {
    ActionError::Validation(format!("slot `{}` was not collected", key.as_str()))
}

fn slot_of(step: Step) -> Option<SlotKey> {
    match step {
        Step::AskClient => Some(SlotKey::Client),
        Step::AskPrestations => Some(SlotKey::Prestations),
        Step::AskDelay => Some(SlotKey::Delai),
        Step::AskAddress => Some(SlotKey::Adresse),
        Step::AskDossierInfo => Some(SlotKey::DossierInfo),
        Step::AskRdvDate => Some(SlotKey::RdvDate),
        Step::AskRdvConfirm => Some(SlotKey::RdvConfirme),
        Step::AskFicheVisite => Some(SlotKey::FicheObservations),
        Step::PostVisite | Step::Confirmation | Step::ReadyToCreate => None,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
    use rust_decimal::Decimal;

    use artibot_core::config::DialogueConfig;
    use artibot_core::errors::{ActionError, ErrorCode};
    use artibot_core::{
        Client, ClientId, Facture, FactureId, FactureStatut, Step, Tenant, TenantId,
    };
    use artibot_db::InMemoryNumberAllocator;

    use crate::nlu::DeterministicIntentResolver;
    use crate::notify::NoopNotifier;
    use crate::orchestrator::{ActionExecutor, Repositories};
    use crate::reminders::ReminderService;

    use super::{AgentRuntime, TurnReply};

    fn tenant_id() -> TenantId {
        TenantId("tnt-1".to_string())
    }

    /// Monday 2025-03-10, 09:00 UTC.
    fn test_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 10, 9, 0, 0).single().expect("valid test clock")
    }

    async fn runtime() -> (AgentRuntime, Repositories) {
        let repos = Repositories::in_memory();
        repos
            .tenants
            .save(Tenant {
                id: tenant_id(),
                nom: "Plomberie Martin".to_string(),
                metier: Some("plombier".to_string()),
                telephone: Some("+33700000000".to_string()),
                created_at: test_now(),
            })
            .await
            .expect("seed tenant");
        repos
            .clients
            .save(Client {
                id: ClientId("cli-1".to_string()),
                tenant_id: tenant_id(),
                nom: "Dupont".to_string(),
                telephone: Some("+33612345678".to_string()),
                email: None,
                adresse: Some("12 rue des Lilas, Lyon".to_string()),
                notes: None,
                created_at: test_now(),
                updated_at: test_now(),
            })
            .await
            .expect("seed client");

        let executor =
            ActionExecutor::new(repos.clone(), Arc::new(InMemoryNumberAllocator::new()));
        let reminders = ReminderService::new(repos.clone(), Arc::new(NoopNotifier));
        let runtime = AgentRuntime::new(
            Arc::new(DeterministicIntentResolver),
            executor,
            reminders,
            DialogueConfig { abandon_after_hours: 24, state_retry_attempts: 3 },
        );
        (runtime, repos)
    }

    async fn say(runtime: &AgentRuntime, conversation: &str, text: &str) -> TurnReply {
        runtime
            .handle_message(&tenant_id(), conversation, text, test_now())
            .await
            .expect("turn should not fail")
    }

    #[tokio::test]
    async fn small_talk_gets_the_welcome_and_runs_nothing() {
        let (runtime, _repos) = runtime().await;
        let reply = say(&runtime, "conv-1", "bonjour").await;

        assert!(reply.reply.contains("Que puis-je faire"), "{}", reply.reply);
        assert_eq!(reply.action, None);
        assert_eq!(reply.error_code, None);
    }

    #[tokio::test]
    async fn devis_flow_collects_slot_by_slot_then_creates() {
        let (runtime, repos) = runtime().await;

        let reply =
            say(&runtime, "conv-1", "Un devis pour Dupont : 2 fenetres a 450 euros").await;
        assert!(reply.reply.contains("delai"), "{}", reply.reply);

        let reply = say(&runtime, "conv-1", "3 semaines").await;
        assert!(reply.reply.contains("adresse du chantier"), "{}", reply.reply);

        let reply = say(&runtime, "conv-1", "12 rue des Lilas, Lyon").await;
        assert!(reply.reply.contains("Je le cree ?"), "{}", reply.reply);
        assert!(reply.reply.contains("Dupont"), "{}", reply.reply);
        assert_eq!(reply.action, None, "nothing runs before the confirmation");

        let reply = say(&runtime, "conv-1", "oui").await;
        assert_eq!(reply.action.as_deref(), Some("create_devis"));
        assert_eq!(reply.error_code, None);
        assert!(reply.reply.contains("DEV-2025-0001"), "{}", reply.reply);
        assert!(reply.reply.contains("1080,00 EUR"), "{}", reply.reply);

        let state = repos
            .conversations
            .find(&tenant_id(), &artibot_core::ConversationId("conv-1".to_string()))
            .await
            .expect("read state")
            .expect("state exists");
        assert!(state.is_idle(), "conversation resets after the creation");
    }

    #[tokio::test]
    async fn unknown_client_is_asked_again_and_the_retry_succeeds() {
        let (runtime, _repos) = runtime().await;

        say(&runtime, "conv-1", "Un devis pour Machin : 2 fenetres a 450 euros").await;
        say(&runtime, "conv-1", "3 semaines").await;
        say(&runtime, "conv-1", "15 rue Neuve, Lyon").await;

        let reply = say(&runtime, "conv-1", "oui").await;
        assert_eq!(reply.error_code.as_deref(), Some("NOT_FOUND"));
        assert!(reply.reply.contains("Je ne trouve pas le client"), "{}", reply.reply);
        assert!(reply.reply.contains("C'est pour quel client ?"), "{}", reply.reply);

        // The other slots survived; only the client is asked again.
        let reply = say(&runtime, "conv-1", "Dupont").await;
        assert!(reply.reply.contains("Je le cree ?"), "{}", reply.reply);

        let reply = say(&runtime, "conv-1", "oui").await;
        assert_eq!(reply.error_code, None);
        assert!(reply.reply.contains("DEV-2025-0001"), "{}", reply.reply);
    }

    #[tokio::test]
    async fn expired_conversation_restarts_from_scratch() {
        let (runtime, repos) = runtime().await;

        let reply = say(&runtime, "conv-1", "un devis").await;
        assert!(reply.reply.contains("quel client"), "{}", reply.reply);

        let later = test_now() + Duration::hours(25);
        let reply = runtime
            .handle_message(&tenant_id(), "conv-1", "bonjour", later)
            .await
            .expect("turn after expiry");
        assert!(reply.reply.contains("Que puis-je faire"), "{}", reply.reply);

        let state = repos
            .conversations
            .find(&tenant_id(), &artibot_core::ConversationId("conv-1".to_string()))
            .await
            .expect("read state")
            .expect("state exists");
        assert!(state.is_idle());
    }

    #[tokio::test]
    async fn unknown_tenant_is_refused_outright() {
        let (runtime, _repos) = runtime().await;
        let error = runtime
            .handle_message(&TenantId("ghost".to_string()), "conv-1", "bonjour", test_now())
            .await
            .expect_err("tenant does not exist");
        assert_eq!(error.code(), ErrorCode::NotFound);
    }

    #[tokio::test]
    async fn relance_by_numero_confirms_then_sends() {
        let (runtime, repos) = runtime().await;
        repos
            .factures
            .save(Facture {
                id: FactureId("fac-1".to_string()),
                tenant_id: tenant_id(),
                client_id: ClientId("cli-1".to_string()),
                dossier_id: None,
                devis_id: None,
                numero: "FAC-2025-0001".to_string(),
                statut: FactureStatut::Envoyee,
                titre: "Facture FAC-2025-0001".to_string(),
                description: None,
                montant_ht: Decimal::new(25_000, 2),
                montant_tva: Decimal::new(5_000, 2),
                montant_ttc: Decimal::new(30_000, 2),
                date_emission: NaiveDate::from_ymd_opt(2025, 2, 1).expect("valid date"),
                date_echeance: NaiveDate::from_ymd_opt(2025, 3, 1).expect("valid date"),
                date_paiement: None,
                nb_relances: 0,
                derniere_relance: None,
                created_at: test_now(),
                updated_at: test_now(),
            })
            .await
            .expect("seed facture");

        let reply = say(&runtime, "conv-1", "Relance la facture FAC-2025-0001").await;
        assert!(reply.reply.contains("quel client"), "{}", reply.reply);

        let reply = say(&runtime, "conv-1", "Dupont").await;
        assert!(reply.reply.contains("FAC-2025-0001"), "{}", reply.reply);

        let reply = say(&runtime, "conv-1", "oui").await;
        assert_eq!(reply.action.as_deref(), Some("relance"));
        assert_eq!(reply.error_code, None);
        assert!(reply.reply.contains("Relance niveau 1"), "{}", reply.reply);

        let facture = repos
            .factures
            .find_by_id(&tenant_id(), &FactureId("fac-1".to_string()))
            .await
            .expect("re-read facture")
            .expect("facture still there");
        assert_eq!(facture.statut, FactureStatut::EnRetard);
        assert_eq!(facture.nb_relances, 1);
    }

    #[tokio::test]
    async fn fiche_visite_chains_into_the_devis_offer() {
        let (runtime, repos) = runtime().await;

        say(&runtime, "conv-1", "Fiche de visite pour Dupont").await;
        let reply = say(&runtime, "conv-1", "toiture usee, prevoir un remplacement").await;
        assert!(reply.reply.contains("J'enregistre ?"), "{}", reply.reply);

        let reply = say(&runtime, "conv-1", "oui").await;
        assert_eq!(reply.action.as_deref(), Some("creer_fiche_visite"));
        assert!(reply.reply.contains("Fiche de visite enregistree"), "{}", reply.reply);
        assert!(
            reply.reply.contains("je prepare le devis maintenant ?"),
            "{}",
            reply.reply
        );

        let state = repos
            .conversations
            .find(&tenant_id(), &artibot_core::ConversationId("conv-1".to_string()))
            .await
            .expect("read state")
            .expect("state exists");
        assert_eq!(state.current_step, Some(Step::PostVisite));

        // "oui" now flows into a devis pre-filled with the same client.
        let reply = say(&runtime, "conv-1", "oui").await;
        assert!(reply.reply.contains("prestations"), "{}", reply.reply);
    }
}
