//! JSON action API over the agent runtime. One POST route per capability,
//! every body carrying `tenant_id`, every response wrapped in the same
//! success/failure envelope so the WhatsApp gateway and the CLI read replies
//! identically.

use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::Json,
    routing::post,
    Router,
};
use chrono::Utc;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use tracing::error;

use artibot_agent::orchestrator::{
    AppendDevisLignesRequest, AppendFactureLignesRequest, ChangeDevisStatutRequest,
    ChangeDossierStatutRequest, ChangeFactureStatutRequest, CreateDevisRequest,
    CreateDossierRequest, CreateFactureRequest, DevisCree, DevisDetail, DossierCree, FactureCreee,
    FactureDetail, PlanifierRdvRequest, RdvCree,
};
use artibot_agent::{AgentRuntime, RelanceOutcome, RelanceRequest, SweepReport, TurnReply};
use artibot_core::{ActionError, Client, Dossier, ErrorCode, TenantId};

#[derive(Clone)]
struct ApiState {
    runtime: Arc<AgentRuntime>,
}

/// Success side of the envelope. `message` is a short French summary for
/// callers that relay it verbatim; `data` carries the full result.
#[derive(Debug, Serialize)]
pub struct ActionSuccess<T> {
    pub success: bool,
    pub data: T,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ActionFailure {
    pub success: bool,
    pub error: ErrorBody,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

type Rejection = (StatusCode, Json<ActionFailure>);

#[derive(Debug, Serialize)]
pub struct SearchResponse {
    pub query: String,
    pub clients: Vec<Client>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct MessageRequest {
    conversation_id: String,
    text: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct SearchRequest {
    query: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct SweepRequest {}

pub fn router(runtime: Arc<AgentRuntime>) -> Router {
    Router::new()
        .route("/api/v1/messages", post(post_message))
        .route("/api/v1/devis", post(create_devis))
        .route("/api/v1/devis/lignes", post(append_devis_lignes))
        .route("/api/v1/devis/statut", post(change_devis_statut))
        .route("/api/v1/factures", post(create_facture))
        .route("/api/v1/factures/lignes", post(append_facture_lignes))
        .route("/api/v1/factures/statut", post(change_facture_statut))
        .route("/api/v1/relances", post(send_relance))
        .route("/api/v1/rappels/sweep", post(sweep_rappels))
        .route("/api/v1/clients/search", post(search_clients))
        .route("/api/v1/dossiers", post(create_dossier))
        .route("/api/v1/dossiers/statut", post(change_dossier_statut))
        .route("/api/v1/rdv", post(planifier_rdv))
        .with_state(ApiState { runtime })
}

fn ok<T>(data: T, message: Option<String>) -> Json<ActionSuccess<T>> {
    Json(ActionSuccess { success: true, data, message })
}

fn failure(
    status: StatusCode,
    code: &'static str,
    message: String,
    details: Option<Value>,
) -> Rejection {
    (status, Json(ActionFailure { success: false, error: ErrorBody { code, message, details } }))
}

fn validation(message: impl Into<String>) -> Rejection {
    failure(StatusCode::BAD_REQUEST, ErrorCode::ValidationError.as_str(), message.into(), None)
}

/// Maps the agent error taxonomy onto HTTP statuses: not-found and conflict
/// keep their dedicated codes, infrastructure failures become 500, everything
/// else is a 400 the caller can fix.
fn action_failure(error: ActionError) -> Rejection {
    let code = error.code();
    let status = match code {
        ErrorCode::NotFound => StatusCode::NOT_FOUND,
        ErrorCode::Conflict => StatusCode::CONFLICT,
        ErrorCode::StorageError | ErrorCode::NumeroGenerationError | ErrorCode::VerificationFailed => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
        _ => StatusCode::BAD_REQUEST,
    };
    if status.is_server_error() {
        error!(code = code.as_str(), error = %error, "action failed in the storage layer");
    }
    failure(status, code.as_str(), error.to_string(), error.details())
}

/// Pulls `tenant_id` out of the raw body so the remaining fields can be
/// deserialized with `deny_unknown_fields` intact (serde does not allow that
/// attribute across a flatten). Rejection happens before any side effect.
fn split_tenant(body: &mut Value) -> Result<TenantId, Rejection> {
    let Some(map) = body.as_object_mut() else {
        return Err(validation("request body must be a JSON object"));
    };
    match map.remove("tenant_id") {
        Some(Value::String(id)) if !id.trim().is_empty() => Ok(TenantId(id)),
        Some(_) => Err(validation("`tenant_id` must be a non-empty string")),
        None => Err(validation("`tenant_id` is required")),
    }
}

fn parse_body<T: DeserializeOwned>(body: Value) -> Result<T, Rejection> {
    serde_json::from_value(body)
        .map_err(|error| validation(format!("invalid request body: {error}")))
}

async fn post_message(
    State(state): State<ApiState>,
    Json(mut body): Json<Value>,
) -> Result<Json<ActionSuccess<TurnReply>>, Rejection> {
    let tenant_id = split_tenant(&mut body)?;
    let request: MessageRequest = parse_body(body)?;
    let reply = state
        .runtime
        .handle_message(&tenant_id, &request.conversation_id, &request.text, Utc::now())
        .await
        .map_err(action_failure)?;
    Ok(ok(reply, None))
}

async fn create_devis(
    State(state): State<ApiState>,
    Json(mut body): Json<Value>,
) -> Result<Json<ActionSuccess<DevisCree>>, Rejection> {
    let tenant_id = split_tenant(&mut body)?;
    let request: CreateDevisRequest = parse_body(body)?;
    let created = state
        .runtime
        .executor()
        .create_devis(&tenant_id, request, Utc::now())
        .await
        .map_err(action_failure)?;
    let message = format!("devis {} cree pour {}", created.devis.numero, created.client_nom);
    Ok(ok(created, Some(message)))
}

async fn append_devis_lignes(
    State(state): State<ApiState>,
    Json(mut body): Json<Value>,
) -> Result<Json<ActionSuccess<DevisDetail>>, Rejection> {
    let tenant_id = split_tenant(&mut body)?;
    let request: AppendDevisLignesRequest = parse_body(body)?;
    let added = request.lignes.len();
    let detail = state
        .runtime
        .executor()
        .append_devis_lignes(&tenant_id, request, Utc::now())
        .await
        .map_err(action_failure)?;
    let message = format!("{added} lignes ajoutees au devis {}", detail.devis.numero);
    Ok(ok(detail, Some(message)))
}

async fn change_devis_statut(
    State(state): State<ApiState>,
    Json(mut body): Json<Value>,
) -> Result<Json<ActionSuccess<DevisDetail>>, Rejection> {
    let tenant_id = split_tenant(&mut body)?;
    let request: ChangeDevisStatutRequest = parse_body(body)?;
    let detail = state
        .runtime
        .executor()
        .change_devis_statut(&tenant_id, request, Utc::now())
        .await
        .map_err(action_failure)?;
    let message =
        format!("devis {} passe a {}", detail.devis.numero, detail.devis.statut.as_str());
    Ok(ok(detail, Some(message)))
}

async fn create_facture(
    State(state): State<ApiState>,
    Json(mut body): Json<Value>,
) -> Result<Json<ActionSuccess<FactureCreee>>, Rejection> {
    let tenant_id = split_tenant(&mut body)?;
    let request: CreateFactureRequest = parse_body(body)?;
    let created = state
        .runtime
        .executor()
        .create_facture(&tenant_id, request, Utc::now())
        .await
        .map_err(action_failure)?;
    let message = format!("facture {} creee pour {}", created.facture.numero, created.client_nom);
    Ok(ok(created, Some(message)))
}

async fn append_facture_lignes(
    State(state): State<ApiState>,
    Json(mut body): Json<Value>,
) -> Result<Json<ActionSuccess<FactureDetail>>, Rejection> {
    let tenant_id = split_tenant(&mut body)?;
    let request: AppendFactureLignesRequest = parse_body(body)?;
    let added = request.lignes.len();
    let detail = state
        .runtime
        .executor()
        .append_facture_lignes(&tenant_id, request, Utc::now())
        .await
        .map_err(action_failure)?;
    let message = format!("{added} lignes ajoutees a la facture {}", detail.facture.numero);
    Ok(ok(detail, Some(message)))
}

async fn change_facture_statut(
    State(state): State<ApiState>,
    Json(mut body): Json<Value>,
) -> Result<Json<ActionSuccess<FactureDetail>>, Rejection> {
    let tenant_id = split_tenant(&mut body)?;
    let request: ChangeFactureStatutRequest = parse_body(body)?;
    let detail = state
        .runtime
        .executor()
        .change_facture_statut(&tenant_id, request, Utc::now())
        .await
        .map_err(action_failure)?;
    let message =
        format!("facture {} passee a {}", detail.facture.numero, detail.facture.statut.as_str());
    Ok(ok(detail, Some(message)))
}

async fn send_relance(
    State(state): State<ApiState>,
    Json(mut body): Json<Value>,
) -> Result<Json<ActionSuccess<RelanceOutcome>>, Rejection> {
    let tenant_id = split_tenant(&mut body)?;
    let request: RelanceRequest = parse_body(body)?;
    let outcome = state
        .runtime
        .reminders()
        .relance(&tenant_id, request, Utc::now())
        .await
        .map_err(action_failure)?;
    let message = format!(
        "relance niveau {} envoyee pour {}",
        outcome.relance.niveau, outcome.document_numero
    );
    Ok(ok(outcome, Some(message)))
}

async fn sweep_rappels(
    State(state): State<ApiState>,
    Json(mut body): Json<Value>,
) -> Result<Json<ActionSuccess<SweepReport>>, Rejection> {
    let tenant_id = split_tenant(&mut body)?;
    let SweepRequest {} = parse_body(body)?;
    let report = state
        .runtime
        .reminders()
        .sweep(&tenant_id, Utc::now())
        .await
        .map_err(action_failure)?;
    let message = format!(
        "{} rappels envoyes, {} relances envoyees, {} ignorees",
        report.rappels.len(),
        report.relances.len(),
        report.relances_ignorees.len()
    );
    Ok(ok(report, Some(message)))
}

async fn search_clients(
    State(state): State<ApiState>,
    Json(mut body): Json<Value>,
) -> Result<Json<ActionSuccess<SearchResponse>>, Rejection> {
    let tenant_id = split_tenant(&mut body)?;
    let request: SearchRequest = parse_body(body)?;
    let clients = state
        .runtime
        .executor()
        .search_clients(&tenant_id, &request.query)
        .await
        .map_err(action_failure)?;
    Ok(ok(SearchResponse { query: request.query, clients }, None))
}

async fn create_dossier(
    State(state): State<ApiState>,
    Json(mut body): Json<Value>,
) -> Result<Json<ActionSuccess<DossierCree>>, Rejection> {
    let tenant_id = split_tenant(&mut body)?;
    let request: CreateDossierRequest = parse_body(body)?;
    let created = state
        .runtime
        .executor()
        .create_dossier(&tenant_id, request, Utc::now())
        .await
        .map_err(action_failure)?;
    let message = format!("dossier cree pour {}", created.client_nom);
    Ok(ok(created, Some(message)))
}

async fn change_dossier_statut(
    State(state): State<ApiState>,
    Json(mut body): Json<Value>,
) -> Result<Json<ActionSuccess<Dossier>>, Rejection> {
    let tenant_id = split_tenant(&mut body)?;
    let request: ChangeDossierStatutRequest = parse_body(body)?;
    let dossier = state
        .runtime
        .executor()
        .change_dossier_statut(&tenant_id, request, Utc::now())
        .await
        .map_err(action_failure)?;
    let message = format!("dossier passe a {}", dossier.statut.as_str());
    Ok(ok(dossier, Some(message)))
}

async fn planifier_rdv(
    State(state): State<ApiState>,
    Json(mut body): Json<Value>,
) -> Result<Json<ActionSuccess<RdvCree>>, Rejection> {
    let tenant_id = split_tenant(&mut body)?;
    let request: PlanifierRdvRequest = parse_body(body)?;
    let created = state
        .runtime
        .executor()
        .planifier_rdv(&tenant_id, request, Utc::now())
        .await
        .map_err(action_failure)?;
    let message = format!("rendez-vous planifie pour {}", created.client_nom);
    Ok(ok(created, Some(message)))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::{extract::State, http::StatusCode, Json};
    use chrono::{Datelike, Duration, NaiveDate, Utc};
    use rust_decimal::Decimal;
    use serde_json::json;

    use artibot_agent::{
        ActionExecutor, AgentRuntime, DeterministicIntentResolver, NoopNotifier, ReminderService,
        Repositories,
    };
    use artibot_core::config::DialogueConfig;
    use artibot_core::{
        Client, ClientId, DevisStatut, Facture, FactureId, FactureStatut, Tenant, TenantId,
    };
    use artibot_db::InMemoryNumberAllocator;

    use super::*;

    fn tenant_id() -> TenantId {
        TenantId("tnt-1".to_string())
    }

    fn client(id: &str, nom: &str) -> Client {
        let now = Utc::now();
        Client {
            id: ClientId(id.to_string()),
            tenant_id: tenant_id(),
            nom: nom.to_string(),
            telephone: Some("+33612345678".to_string()),
            email: None,
            adresse: Some("12 rue des Lilas, Lyon".to_string()),
            notes: None,
            created_at: now,
            updated_at: now,
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
                created_at: Utc::now(),
            })
            .await
            .expect("seed tenant");
        repos.clients.save(client("cli-1", "Dupont")).await.expect("seed client");
    }

    async fn seed_facture(
        repos: &Repositories,
        numero: &str,
        statut: FactureStatut,
        date_echeance: NaiveDate,
    ) {
        let now = Utc::now();
        repos
            .factures
            .save(Facture {
                id: FactureId(format!("fac-{numero}")),
                tenant_id: tenant_id(),
                client_id: ClientId("cli-1".to_string()),
                dossier_id: None,
                devis_id: None,
                numero: numero.to_string(),
                statut,
                titre: format!("Facture {numero}"),
                description: None,
                montant_ht: Decimal::new(25_000, 2),
                montant_tva: Decimal::new(5_000, 2),
                montant_ttc: Decimal::new(30_000, 2),
                date_emission: date_echeance - Duration::days(30),
                date_echeance,
                date_paiement: None,
                nb_relances: 0,
                derniere_relance: None,
                created_at: now,
                updated_at: now,
            })
            .await
            .expect("seed facture");
    }

    async fn api_state() -> ApiState {
        let repos = Repositories::in_memory();
        seed(&repos).await;
        let executor = ActionExecutor::new(repos.clone(), Arc::new(InMemoryNumberAllocator::new()));
        let reminders = ReminderService::new(repos, Arc::new(NoopNotifier));
        let runtime = AgentRuntime::new(
            Arc::new(DeterministicIntentResolver),
            executor,
            reminders,
            DialogueConfig { abandon_after_hours: 24, state_retry_attempts: 3 },
        );
        ApiState { runtime: Arc::new(runtime) }
    }

    #[tokio::test]
    async fn create_devis_wraps_the_result_in_the_success_envelope() {
        let state = api_state().await;

        let Json(reply) = create_devis(
            State(state),
            Json(json!({
                "tenant_id": "tnt-1",
                "client": "Dupont",
                "lignes": [{ "description": "2 fenetres", "quantite": "2", "prix_unitaire_ht": "450" }],
            })),
        )
        .await
        .expect("creation should succeed");

        let numero = format!("DEV-{}-0001", Utc::now().year());
        assert!(reply.success);
        assert_eq!(reply.data.devis.numero, numero);
        assert_eq!(reply.data.devis.statut, DevisStatut::Brouillon);
        assert_eq!(reply.data.client_nom, "Dupont");
        let message = reply.message.expect("creation carries a summary");
        assert!(message.contains(&numero), "summary names the numero: {message}");
    }

    #[tokio::test]
    async fn tenant_id_is_required_at_the_top_level() {
        let state = api_state().await;

        let result =
            create_devis(State(state), Json(json!({ "client": "Dupont", "lignes": [] }))).await;

        let (status, Json(body)) = result.expect_err("missing tenant_id must be rejected");
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(!body.success);
        assert_eq!(body.error.code, "VALIDATION_ERROR");
        assert!(body.error.message.contains("tenant_id"));
    }

    #[tokio::test]
    async fn unknown_fields_are_rejected_before_any_side_effect() {
        let state = api_state().await;

        let result = create_devis(
            State(state.clone()),
            Json(json!({ "tenant_id": "tnt-1", "client": "Dupont", "lines": [] })),
        )
        .await;

        let (status, Json(body)) = result.expect_err("typoed field must be rejected");
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body.error.code, "VALIDATION_ERROR");

        let ghost = state
            .runtime
            .repositories()
            .devis
            .find_by_numero(&tenant_id(), &format!("DEV-{}-0001", Utc::now().year()))
            .await
            .expect("lookup");
        assert!(ghost.is_none(), "rejected request must not have created a devis");
    }

    #[tokio::test]
    async fn unknown_client_maps_to_not_found() {
        let state = api_state().await;

        let result = create_devis(
            State(state),
            Json(json!({ "tenant_id": "tnt-1", "client": "Machin", "lignes": [] })),
        )
        .await;

        let (status, Json(body)) = result.expect_err("unknown client must fail");
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body.error.code, "NOT_FOUND");
        assert!(body.error.message.contains("Machin"));
    }

    #[tokio::test]
    async fn ambiguous_client_reference_carries_the_candidates() {
        let state = api_state().await;
        state
            .runtime
            .repositories()
            .clients
            .save(client("cli-2", "Dupond"))
            .await
            .expect("seed second client");

        let result = create_devis(
            State(state),
            Json(json!({ "tenant_id": "tnt-1", "client": "dupon", "lignes": [] })),
        )
        .await;

        let (status, Json(body)) = result.expect_err("two matches cannot be resolved");
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body.error.code, "VALIDATION_ERROR");
        let details = body.error.details.expect("candidates are listed");
        let candidates = details["candidates"].as_array().expect("array");
        assert_eq!(candidates.len(), 2);
    }

    #[tokio::test]
    async fn facture_lignes_append_totals_up() {
        let state = api_state().await;

        let Json(created) = create_facture(
            State(state.clone()),
            Json(json!({ "tenant_id": "tnt-1", "client": "Dupont" })),
        )
        .await
        .expect("empty facture should be created");
        let numero = format!("FAC-{}-0001", Utc::now().year());
        assert_eq!(created.data.facture.numero, numero);
        assert_eq!(created.data.facture.montant_ttc, Decimal::ZERO);

        let Json(detail) = append_facture_lignes(
            State(state),
            Json(json!({
                "tenant_id": "tnt-1",
                "facture": numero,
                "lignes": [
                    { "description": "carrelage", "quantite": "2", "prix_unitaire_ht": "100", "tva_pct": "20" },
                    { "description": "joint", "quantite": "1", "prix_unitaire_ht": "50", "tva_pct": "20" },
                ],
            })),
        )
        .await
        .expect("append should succeed");

        assert_eq!(detail.data.facture.montant_ht, Decimal::new(25_000, 2));
        assert_eq!(detail.data.facture.montant_tva, Decimal::new(5_000, 2));
        assert_eq!(detail.data.facture.montant_ttc, Decimal::new(30_000, 2));
        assert_eq!(detail.data.lignes.len(), 2);
    }

    #[tokio::test]
    async fn illegal_statut_change_is_rejected_as_invalid_transition() {
        let state = api_state().await;
        let today = Utc::now().date_naive();
        seed_facture(state.runtime.repositories(), "FAC-2025-0042", FactureStatut::Brouillon, today)
            .await;

        let result = change_facture_statut(
            State(state),
            Json(json!({ "tenant_id": "tnt-1", "facture": "FAC-2025-0042", "statut": "payee" })),
        )
        .await;

        let (status, Json(body)) = result.expect_err("brouillon cannot jump to payee");
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body.error.code, "INVALID_TRANSITION");
    }

    #[tokio::test]
    async fn relance_route_flips_an_overdue_facture() {
        let state = api_state().await;
        let overdue = Utc::now().date_naive() - Duration::days(10);
        seed_facture(state.runtime.repositories(), "FAC-2025-0007", FactureStatut::Envoyee, overdue)
            .await;

        let Json(reply) = send_relance(
            State(state.clone()),
            Json(json!({ "tenant_id": "tnt-1", "document_ref": "FAC-2025-0007" })),
        )
        .await
        .expect("overdue facture should be relanced");

        assert!(reply.success);
        assert_eq!(reply.data.relance.niveau, 1);
        assert_eq!(reply.data.facture_statut.as_deref(), Some("en_retard"));
        assert!(reply.message.expect("summary").contains("niveau 1"));

        let stored = state
            .runtime
            .repositories()
            .factures
            .find_by_numero(&tenant_id(), "FAC-2025-0007")
            .await
            .expect("lookup")
            .expect("facture exists");
        assert_eq!(stored.statut, FactureStatut::EnRetard);
    }

    #[tokio::test]
    async fn sweep_route_reports_what_it_sent() {
        let state = api_state().await;
        let overdue = Utc::now().date_naive() - Duration::days(10);
        seed_facture(state.runtime.repositories(), "FAC-2025-0008", FactureStatut::Envoyee, overdue)
            .await;

        let Json(reply) =
            sweep_rappels(State(state), Json(json!({ "tenant_id": "tnt-1" }))).await.expect("sweep");

        assert_eq!(reply.data.relances, vec!["FAC-2025-0008".to_string()]);
        assert!(reply.data.relances_ignorees.is_empty());
        assert!(reply.message.expect("summary").contains("1 relances"));
    }

    #[tokio::test]
    async fn message_route_runs_one_conversational_turn() {
        let state = api_state().await;

        let Json(reply) = post_message(
            State(state),
            Json(json!({ "tenant_id": "tnt-1", "conversation_id": "conv-1", "text": "bonjour" })),
        )
        .await
        .expect("turn should succeed");

        assert!(reply.success);
        assert!(reply.data.reply.contains("Que puis-je faire pour vous ?"));
        assert!(reply.data.action.is_none());
    }

    #[tokio::test]
    async fn search_route_lists_matching_clients() {
        let state = api_state().await;

        let Json(reply) = search_clients(
            State(state),
            Json(json!({ "tenant_id": "tnt-1", "query": "dup" })),
        )
        .await
        .expect("search should succeed");

        assert_eq!(reply.data.query, "dup");
        assert_eq!(reply.data.clients.len(), 1);
        assert_eq!(reply.data.clients[0].nom, "Dupont");
        assert!(reply.message.is_none(), "reads carry no summary");
    }

    #[tokio::test]
    async fn another_tenant_cannot_touch_the_documents() {
        let state = api_state().await;
        let today = Utc::now().date_naive();
        seed_facture(state.runtime.repositories(), "FAC-2025-0010", FactureStatut::Brouillon, today)
            .await;

        let result = change_facture_statut(
            State(state),
            Json(json!({ "tenant_id": "tnt-2", "facture": "FAC-2025-0010", "statut": "envoyee" })),
        )
        .await;

        let (status, Json(body)) = result.expect_err("cross-tenant access must miss");
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body.error.code, "NOT_FOUND");
    }

    mod routing {
        //! Full-router checks: verb mapping and the envelope as it goes over
        //! the wire, which direct handler calls cannot cover.

        use axum::body::Body;
        use axum::http::{header, Method, Request, StatusCode};
        use chrono::{Datelike, Utc};
        use serde_json::{json, Value};
        use tower::ServiceExt;

        use super::api_state;
        use crate::api::router;

        async fn send(method: Method, uri: &str, body: Value) -> (StatusCode, Value) {
            let state = api_state().await;
            let app = router(state.runtime.clone());

            let request = Request::builder()
                .method(method)
                .uri(uri)
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .expect("request");

            let response = app.oneshot(request).await.expect("router call");
            let status = response.status();
            let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
                .await
                .expect("read body");
            let payload = if bytes.is_empty() {
                Value::Null
            } else {
                serde_json::from_slice(&bytes).expect("json body")
            };
            (status, payload)
        }

        #[tokio::test]
        async fn success_envelope_goes_over_the_wire() {
            let (status, payload) = send(
                Method::POST,
                "/api/v1/devis",
                json!({ "tenant_id": "tnt-1", "client": "Dupont", "lignes": [] }),
            )
            .await;

            let numero = format!("DEV-{}-0001", Utc::now().year());
            assert_eq!(status, StatusCode::OK);
            assert_eq!(payload["success"], json!(true));
            assert_eq!(payload["data"]["devis"]["numero"], json!(numero.clone()));
            assert!(payload["message"].as_str().expect("summary").contains(&numero));
        }

        #[tokio::test]
        async fn failure_envelope_goes_over_the_wire() {
            let (status, payload) = send(
                Method::POST,
                "/api/v1/devis",
                json!({ "tenant_id": "tnt-1", "client": "Machin" }),
            )
            .await;

            assert_eq!(status, StatusCode::NOT_FOUND);
            assert_eq!(payload["success"], json!(false));
            assert_eq!(payload["error"]["code"], json!("NOT_FOUND"));
        }

        #[tokio::test]
        async fn wrong_verb_is_a_405() {
            let (status, _) = send(Method::GET, "/api/v1/devis", Value::Null).await;
            assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
        }

        #[tokio::test]
        async fn unknown_route_is_a_404() {
            let (status, _) = send(Method::POST, "/api/v1/avoirs", json!({})).await;
            assert_eq!(status, StatusCode::NOT_FOUND);
        }
    }
}
