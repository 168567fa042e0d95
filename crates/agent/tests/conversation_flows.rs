//! Multi-turn conversations end to end through the public crate API: French
//! text in, documents and conversation state out.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use rust_decimal::Decimal;

use artibot_agent::orchestrator::ChangeDevisStatutRequest;
use artibot_agent::{
    ActionExecutor, AgentRuntime, DeterministicIntentResolver, InMemoryNotifier, ReminderService,
    Repositories, TurnReply,
};
use artibot_core::config::DialogueConfig;
use artibot_core::errors::{ActionError, ErrorCode};
use artibot_core::{
    Client, ClientId, ConversationId, ConversationState, DevisStatut, Facture, FactureId,
    FactureStatut, Tenant, TenantId,
};
use artibot_db::repositories::{ConversationStateRepository, RepositoryError};
use artibot_db::InMemoryNumberAllocator;

/// Monday 2025-03-10, 09:00 UTC.
fn test_now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 10, 9, 0, 0).single().expect("valid test clock")
}

fn tenant_id() -> TenantId {
    TenantId("tnt-1".to_string())
}

fn client(id: &str, nom: &str, telephone: Option<&str>) -> Client {
    Client {
        id: ClientId(id.to_string()),
        tenant_id: tenant_id(),
        nom: nom.to_string(),
        telephone: telephone.map(ToOwned::to_owned),
        email: None,
        adresse: Some("12 rue des Lilas, Lyon".to_string()),
        notes: None,
        created_at: test_now(),
        updated_at: test_now(),
    }
}

async fn seed(repos: &Repositories) {
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
    repos.clients.save(client("cli-1", "Dupont", Some("+33612345678"))).await.expect("seed Dupont");
    repos.clients.save(client("cli-2", "Bernard", Some("+33698765432"))).await.expect("seed Bernard");
    repos.clients.save(client("cli-3", "Moreau", None)).await.expect("seed Moreau");
}

fn build_runtime(repos: Repositories, notifier: Arc<InMemoryNotifier>) -> AgentRuntime {
    let executor = ActionExecutor::new(repos.clone(), Arc::new(InMemoryNumberAllocator::new()));
    let reminders = ReminderService::new(repos, notifier);
    AgentRuntime::new(
        Arc::new(DeterministicIntentResolver),
        executor,
        reminders,
        DialogueConfig { abandon_after_hours: 24, state_retry_attempts: 3 },
    )
}

async fn runtime() -> (AgentRuntime, Repositories, Arc<InMemoryNotifier>) {
    let repos = Repositories::in_memory();
    seed(&repos).await;
    let notifier = Arc::new(InMemoryNotifier::default());
    (build_runtime(repos.clone(), notifier.clone()), repos, notifier)
}

async fn say(runtime: &AgentRuntime, conversation: &str, text: &str) -> TurnReply {
    runtime
        .handle_message(&tenant_id(), conversation, text, test_now())
        .await
        .expect("turn should not fail")
}

#[tokio::test]
async fn unpriced_devis_ends_up_as_a_zero_total_draft() {
    let (runtime, repos, _notifier) = runtime().await;

    say(&runtime, "conv-1", "Un devis pour Dupont : remplacement du chauffe-eau").await;
    say(&runtime, "conv-1", "2 semaines").await;
    say(&runtime, "conv-1", "8 avenue Foch, Lyon").await;
    let reply = say(&runtime, "conv-1", "oui").await;

    assert_eq!(reply.action.as_deref(), Some("create_devis"));
    assert!(reply.reply.contains("DEV-2025-0001"), "{}", reply.reply);
    assert!(reply.reply.contains("0,00 EUR"), "{}", reply.reply);

    let devis = repos
        .devis
        .find_by_numero(&tenant_id(), "DEV-2025-0001")
        .await
        .expect("find devis")
        .expect("devis exists");
    assert_eq!(devis.statut, DevisStatut::Brouillon);
    assert_eq!(devis.montant_ht, Decimal::ZERO);
    assert_eq!(devis.montant_ttc, Decimal::ZERO);
    assert_eq!(devis.delai_execution.as_deref(), Some("2 semaines"));
    assert_eq!(devis.adresse_chantier.as_deref(), Some("8 avenue Foch, Lyon"));

    let lignes = repos.devis.lignes(&devis.id).await.expect("devis lignes");
    assert_eq!(lignes.len(), 1);
    assert_eq!(lignes[0].description, "remplacement du chauffe-eau");
    assert_eq!(lignes[0].quantite, Decimal::ONE);
    assert_eq!(lignes[0].prix_unitaire_ht, Decimal::ZERO);
}

#[tokio::test]
async fn priced_lines_total_up_with_default_tva() {
    let (runtime, repos, _notifier) = runtime().await;

    say(&runtime, "conv-1", "Un devis pour Dupont : 2 carreaux a 100 euros, joint a 50 euros")
        .await;
    say(&runtime, "conv-1", "1 semaine").await;
    say(&runtime, "conv-1", "8 avenue Foch, Lyon").await;
    let reply = say(&runtime, "conv-1", "oui").await;

    assert!(reply.reply.contains("300,00 EUR TTC"), "{}", reply.reply);
    assert!(reply.reply.contains("250,00 EUR HT"), "{}", reply.reply);

    let devis = repos
        .devis
        .find_by_numero(&tenant_id(), "DEV-2025-0001")
        .await
        .expect("find devis")
        .expect("devis exists");
    assert_eq!(devis.montant_ht, Decimal::new(25_000, 2));
    assert_eq!(devis.montant_tva, Decimal::new(5_000, 2));
    assert_eq!(devis.montant_ttc, Decimal::new(30_000, 2));
}

#[tokio::test]
async fn confirmation_correction_reasks_only_the_client() {
    let (runtime, _repos, _notifier) = runtime().await;

    say(&runtime, "conv-1", "Un devis pour Dupont : 2 fenetres a 450 euros").await;
    say(&runtime, "conv-1", "3 semaines").await;
    let reply = say(&runtime, "conv-1", "12 rue des Lilas, Lyon").await;
    assert!(reply.reply.contains("Devis pour Dupont"), "{}", reply.reply);

    let reply = say(&runtime, "conv-1", "change le client").await;
    assert!(reply.reply.contains("C'est pour quel client ?"), "{}", reply.reply);

    // Prestations, delai and adresse survive the correction.
    let reply = say(&runtime, "conv-1", "Bernard").await;
    assert!(reply.reply.contains("Devis pour Bernard"), "{}", reply.reply);
    assert!(reply.reply.contains("Je le cree ?"), "{}", reply.reply);

    let reply = say(&runtime, "conv-1", "oui").await;
    assert_eq!(reply.error_code, None);
    assert!(reply.reply.contains("cree pour Bernard"), "{}", reply.reply);
}

#[tokio::test]
async fn abort_resets_and_the_next_message_starts_fresh() {
    let (runtime, repos, _notifier) = runtime().await;

    say(&runtime, "conv-1", "Un devis pour Dupont : 2 fenetres a 450 euros").await;
    let reply = say(&runtime, "conv-1", "laisse tomber").await;
    assert!(reply.reply.contains("C'est annule"), "{}", reply.reply);
    assert_eq!(reply.action, None);

    let state = repos
        .conversations
        .find(&tenant_id(), &ConversationId("conv-1".to_string()))
        .await
        .expect("read state")
        .expect("state exists");
    assert!(state.is_idle());

    let reply = say(&runtime, "conv-1", "un dossier pour Bernard").await;
    assert!(reply.reply.contains("travaux"), "{}", reply.reply);
}

#[tokio::test]
async fn sent_devis_becomes_a_facture_with_the_same_totals() {
    let (runtime, repos, _notifier) = runtime().await;

    say(&runtime, "conv-1", "Un devis pour Dupont : 2 carreaux a 100 euros, joint a 50 euros")
        .await;
    say(&runtime, "conv-1", "1 semaine").await;
    say(&runtime, "conv-1", "8 avenue Foch, Lyon").await;
    say(&runtime, "conv-1", "oui").await;
    for statut in ["en_preparation", "pret", "envoye"] {
        runtime
            .executor()
            .change_devis_statut(
                &tenant_id(),
                ChangeDevisStatutRequest {
                    devis: "DEV-2025-0001".to_string(),
                    statut: statut.to_string(),
                },
                test_now(),
            )
            .await
            .expect("walk devis statut");
    }

    let reply =
        say(&runtime, "conv-2", "Transforme le devis DEV-2025-0001 en facture").await;
    assert!(reply.reply.contains("quel client"), "{}", reply.reply);

    let reply = say(&runtime, "conv-2", "Dupont").await;
    assert!(reply.reply.contains("d'apres le devis DEV-2025-0001"), "{}", reply.reply);

    let reply = say(&runtime, "conv-2", "oui").await;
    assert_eq!(reply.action.as_deref(), Some("create_facture"));
    assert!(reply.reply.contains("FAC-2025-0001"), "{}", reply.reply);
    assert!(reply.reply.contains("300,00 EUR TTC"), "{}", reply.reply);

    let facture = repos
        .factures
        .find_by_numero(&tenant_id(), "FAC-2025-0001")
        .await
        .expect("find facture")
        .expect("facture exists");
    assert_eq!(facture.montant_ttc, Decimal::new(30_000, 2));
    assert!(facture.devis_id.is_some(), "the facture keeps its devis link");

    let lignes = repos.factures.lignes(&facture.id).await.expect("facture lignes");
    assert_eq!(lignes.len(), 2);

    let devis = repos
        .devis
        .find_by_numero(&tenant_id(), "DEV-2025-0001")
        .await
        .expect("find devis")
        .expect("devis exists");
    assert_eq!(devis.statut, DevisStatut::Accepte, "billing a sent devis accepts it");
}

#[tokio::test]
async fn relance_without_contact_reports_the_failure_but_keeps_the_flip() {
    let (runtime, repos, notifier) = runtime().await;
    repos
        .factures
        .save(Facture {
            id: FactureId("fac-1".to_string()),
            tenant_id: tenant_id(),
            client_id: ClientId("cli-3".to_string()),
            dossier_id: None,
            devis_id: None,
            numero: "FAC-2025-0009".to_string(),
            statut: FactureStatut::Envoyee,
            titre: "Facture FAC-2025-0009".to_string(),
            description: None,
            montant_ht: Decimal::new(10_000, 2),
            montant_tva: Decimal::new(2_000, 2),
            montant_ttc: Decimal::new(12_000, 2),
            date_emission: test_now().date_naive() - chrono::Duration::days(40),
            date_echeance: test_now().date_naive() - chrono::Duration::days(10),
            date_paiement: None,
            nb_relances: 0,
            derniere_relance: None,
            created_at: test_now(),
            updated_at: test_now(),
        })
        .await
        .expect("seed facture");

    say(&runtime, "conv-1", "Relance la facture FAC-2025-0009").await;
    say(&runtime, "conv-1", "Moreau").await;
    let reply = say(&runtime, "conv-1", "oui").await;

    assert_eq!(reply.error_code.as_deref(), Some("MISSING_CONTACT"));
    assert!(reply.reply.contains("ni telephone ni email"), "{}", reply.reply);
    assert!(notifier.sent().is_empty(), "nothing must go out without a channel");

    // The overdue flip and the failed relance row both survive the error.
    let facture = repos
        .factures
        .find_by_id(&tenant_id(), &FactureId("fac-1".to_string()))
        .await
        .expect("re-read facture")
        .expect("facture still there");
    assert_eq!(facture.statut, FactureStatut::EnRetard);
    assert_eq!(facture.nb_relances, 0);
}

/// Forces the first `failures` optimistic-lock updates to report a lost
/// race, exercising the runtime's reload-and-replay path.
struct FlakyConversationStore {
    inner: Arc<dyn ConversationStateRepository>,
    failures: AtomicU32,
}

#[async_trait::async_trait]
impl ConversationStateRepository for FlakyConversationStore {
    async fn find(
        &self,
        tenant_id: &TenantId,
        conversation_id: &ConversationId,
    ) -> Result<Option<ConversationState>, RepositoryError> {
        self.inner.find(tenant_id, conversation_id).await
    }

    async fn insert(&self, state: ConversationState) -> Result<bool, RepositoryError> {
        self.inner.insert(state).await
    }

    async fn update(&self, state: ConversationState) -> Result<bool, RepositoryError> {
        let remaining = self.failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failures.store(remaining - 1, Ordering::SeqCst);
            return Ok(false);
        }
        self.inner.update(state).await
    }
}

#[tokio::test]
async fn lost_update_races_are_replayed_transparently() {
    let mut repos = Repositories::in_memory();
    seed(&repos).await;
    repos.conversations = Arc::new(FlakyConversationStore {
        inner: repos.conversations.clone(),
        failures: AtomicU32::new(1),
    });
    let runtime = build_runtime(repos, Arc::new(InMemoryNotifier::default()));

    let reply = say(&runtime, "conv-1", "un devis pour Dupont").await;
    assert!(reply.reply.contains("prestations"), "{}", reply.reply);
}

#[tokio::test]
async fn persistent_races_give_up_with_a_conflict() {
    let mut repos = Repositories::in_memory();
    seed(&repos).await;
    repos.conversations = Arc::new(FlakyConversationStore {
        inner: repos.conversations.clone(),
        failures: AtomicU32::new(10),
    });
    let runtime = build_runtime(repos, Arc::new(InMemoryNotifier::default()));

    let error = runtime
        .handle_message(&tenant_id(), "conv-1", "un devis pour Dupont", test_now())
        .await
        .expect_err("retries must run out");
    assert!(matches!(error, ActionError::Conflict(_)), "{error}");
    assert_eq!(error.code(), ErrorCode::Conflict);
}
