//! Relance pipeline and the scheduler sweep. A relance is bookkeeping
//! first, delivery second: the en_retard flip and the relance row are
//! persisted before the message leaves, so validation and delivery
//! failures never lose what already happened.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use artibot_core::errors::ActionError;
use artibot_core::reminders::{
    devis_relance_check, due_rappels, facture_relance_check, relance_side_effects,
    sweep_cooldown_elapsed, RappelKind,
};
use artibot_core::{
    Client, ContactChannel, Devis, DocumentRef, Facture, FactureStatut, Relance, RelanceId,
    RelanceStatut, Tenant, TenantId,
};

use crate::notify::{Notifier, OutboundMessage};
use crate::orchestrator::{new_id, resolve_client, storage, Repositories};
use crate::templates;

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RelanceRequest {
    /// Client whose latest open document should be chased. Ignored when a
    /// document reference is given.
    #[serde(default)]
    pub client: Option<String>,
    /// Numero of the facture or devis to chase ("FAC-2025-0007").
    #[serde(default)]
    pub document_ref: Option<String>,
}

#[derive(Clone, Debug, Serialize)]
pub struct RelanceOutcome {
    pub relance: Relance,
    pub client_nom: String,
    pub document_numero: String,
    pub document_kind: &'static str,
    pub montant_ttc: Decimal,
    /// Set when the relance moved an envoyee facture to en_retard.
    pub facture_statut: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RappelEnvoye {
    pub rdv_id: String,
    pub rappel: &'static str,
}

#[derive(Debug, Serialize)]
pub struct RelanceIgnoree {
    pub facture: String,
    pub code: &'static str,
    pub message: String,
}

#[derive(Debug, Default, Serialize)]
pub struct SweepReport {
    pub rappels: Vec<RappelEnvoye>,
    pub relances: Vec<String>,
    pub relances_ignorees: Vec<RelanceIgnoree>,
}

enum RelanceTarget {
    Facture(Facture),
    Devis(Devis),
}

pub struct ReminderService {
    repos: Repositories,
    notifier: Arc<dyn Notifier>,
}

impl ReminderService {
    pub fn new(repos: Repositories, notifier: Arc<dyn Notifier>) -> Self {
        Self { repos, notifier }
    }

    /// Send one relance, targeted by document numero or by client. For an
    /// overdue envoyee facture the en_retard flip is saved before anything
    /// can still fail.
    pub async fn relance(
        &self,
        tenant_id: &TenantId,
        request: RelanceRequest,
        now: DateTime<Utc>,
    ) -> Result<RelanceOutcome, ActionError> {
        let tenant = self
            .repos
            .tenants
            .find_by_id(tenant_id)
            .await
            .map_err(storage)?
            .ok_or_else(|| ActionError::not_found("tenant", tenant_id.as_str()))?;

        let target = self.resolve_target(tenant_id, &request).await?;
        let client_id = match &target {
            RelanceTarget::Facture(facture) => facture.client_id.clone(),
            RelanceTarget::Devis(devis) => devis.client_id.clone(),
        };
        let client = self
            .repos
            .clients
            .find_by_id(tenant_id, &client_id)
            .await
            .map_err(storage)?
            .ok_or_else(|| ActionError::not_found("client", client_id.as_str()))?;

        match target {
            RelanceTarget::Facture(facture) => {
                self.relance_facture(&tenant, client, facture, now).await
            }
            RelanceTarget::Devis(devis) => self.relance_devis(&tenant, client, devis, now).await,
        }
    }

    async fn resolve_target(
        &self,
        tenant_id: &TenantId,
        request: &RelanceRequest,
    ) -> Result<RelanceTarget, ActionError> {
        let reference =
            request.document_ref.as_deref().map(str::trim).filter(|r| !r.is_empty());
        if let Some(reference) = reference {
            let numero = reference.to_uppercase();
            if numero.starts_with("FAC") {
                let facture = self
                    .repos
                    .factures
                    .find_by_numero(tenant_id, &numero)
                    .await
                    .map_err(storage)?
                    .ok_or_else(|| ActionError::not_found("facture", numero.clone()))?;
                return Ok(RelanceTarget::Facture(facture));
            }
            if numero.starts_with("DEV") {
                let devis = self
                    .repos
                    .devis
                    .find_by_numero(tenant_id, &numero)
                    .await
                    .map_err(storage)?
                    .ok_or_else(|| ActionError::not_found("devis", numero.clone()))?;
                return Ok(RelanceTarget::Devis(devis));
            }
            // No recognizable prefix: try both sides.
            if let Some(facture) =
                self.repos.factures.find_by_numero(tenant_id, &numero).await.map_err(storage)?
            {
                return Ok(RelanceTarget::Facture(facture));
            }
            if let Some(devis) =
                self.repos.devis.find_by_numero(tenant_id, &numero).await.map_err(storage)?
            {
                return Ok(RelanceTarget::Devis(devis));
            }
            return Err(ActionError::not_found("document", numero));
        }

        let Some(client_ref) = request.client.as_deref() else {
            return Err(ActionError::Validation(
                "give a client or a document reference to relance".to_string(),
            ));
        };
        let client = resolve_client(&self.repos, tenant_id, client_ref).await?;

        // Money first: chase the unpaid facture before the silent devis.
        if let Some(facture) = self
            .repos
            .factures
            .latest_unpaid_for_client(tenant_id, &client.id)
            .await
            .map_err(storage)?
        {
            return Ok(RelanceTarget::Facture(facture));
        }
        if let Some(devis) = self
            .repos
            .devis
            .latest_envoye_for_client(tenant_id, &client.id)
            .await
            .map_err(storage)?
        {
            return Ok(RelanceTarget::Devis(devis));
        }
        Err(ActionError::not_found("document", client.nom))
    }

    async fn relance_facture(
        &self,
        tenant: &Tenant,
        client: Client,
        mut facture: Facture,
        now: DateTime<Utc>,
    ) -> Result<RelanceOutcome, ActionError> {
        facture_relance_check(&facture, now.date_naive())?;

        // The lateness is a fact as soon as the relance is attempted; flag
        // it before the steps that can still fail.
        let mut facture_statut = None;
        if facture.statut == FactureStatut::Envoyee {
            facture.transition_to(FactureStatut::EnRetard)?;
            facture.updated_at = now;
            self.repos.factures.save(facture.clone()).await.map_err(storage)?;
            facture_statut = Some(FactureStatut::EnRetard.as_str().to_string());
        }

        let document = DocumentRef::Facture(facture.id.clone());
        let niveau = self
            .repos
            .relances
            .count_for_document(&tenant.id, &document)
            .await
            .map_err(storage)?
            + 1;
        let message = templates::relance_facture_message(
            &tenant.nom,
            &client.nom,
            &facture.numero,
            facture.montant_ttc,
            facture.date_echeance,
            niveau,
        );

        let relance = self
            .send_relance(tenant, &client, document, niveau, message, facture_statut.as_deref(), now)
            .await?;

        facture.record_relance(now);
        facture.updated_at = now;
        self.repos.factures.save(facture.clone()).await.map_err(storage)?;

        tracing::info!(
            tenant_id = %tenant.id.as_str(),
            numero = %facture.numero,
            niveau,
            "facture relance sent"
        );

        Ok(RelanceOutcome {
            relance,
            client_nom: client.nom,
            document_numero: facture.numero,
            document_kind: "facture",
            montant_ttc: facture.montant_ttc,
            facture_statut,
        })
    }

    async fn relance_devis(
        &self,
        tenant: &Tenant,
        client: Client,
        mut devis: Devis,
        now: DateTime<Utc>,
    ) -> Result<RelanceOutcome, ActionError> {
        devis_relance_check(&devis)?;

        let document = DocumentRef::Devis(devis.id.clone());
        let niveau = self
            .repos
            .relances
            .count_for_document(&tenant.id, &document)
            .await
            .map_err(storage)?
            + 1;
        let message = templates::relance_devis_message(
            &tenant.nom,
            &client.nom,
            &devis.numero,
            devis.montant_ttc,
            niveau,
        );

        let relance =
            self.send_relance(tenant, &client, document, niveau, message, None, now).await?;

        devis.record_relance(now);
        devis.updated_at = now;
        self.repos.devis.save(devis.clone()).await.map_err(storage)?;

        tracing::info!(
            tenant_id = %tenant.id.as_str(),
            numero = %devis.numero,
            niveau,
            "devis relance sent"
        );

        Ok(RelanceOutcome {
            relance,
            client_nom: client.nom,
            document_numero: devis.numero,
            document_kind: "devis",
            montant_ttc: devis.montant_ttc,
            facture_statut: None,
        })
    }

    /// Persist the relance row, pick the contact channel and deliver. The
    /// row is saved in every branch so failed attempts stay auditable.
    async fn send_relance(
        &self,
        tenant: &Tenant,
        client: &Client,
        document: DocumentRef,
        niveau: u32,
        message: String,
        document_statut: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<Relance, ActionError> {
        let mut relance = Relance {
            id: RelanceId(new_id()),
            tenant_id: tenant.id.clone(),
            document,
            niveau,
            statut: RelanceStatut::Planifie,
            canal: None,
            message: Some(message.clone()),
            date_envoi: None,
            created_at: now,
            updated_at: now,
        };
        self.repos.relances.save(relance.clone()).await.map_err(storage)?;

        let Some(channel) = client.contact_channel() else {
            relance.transition_to(RelanceStatut::Echoue)?;
            relance.updated_at = now;
            self.repos.relances.save(relance.clone()).await.map_err(storage)?;
            return Err(ActionError::MissingContact {
                client: client.nom.clone(),
                details: relance_side_effects(document_statut, relance.id.as_str()),
            });
        };
        let (canal, destinataire) = match channel {
            ContactChannel::Telephone(value) => ("telephone", value),
            ContactChannel::Email(value) => ("email", value),
        };

        relance.canal = Some(canal.to_string());
        relance.transition_to(RelanceStatut::Envoye)?;
        relance.date_envoi = Some(now);
        relance.updated_at = now;
        self.repos.relances.save(relance.clone()).await.map_err(storage)?;

        let outbound = OutboundMessage {
            tenant_id: tenant.id.clone(),
            destinataire,
            canal: canal.to_string(),
            body: message,
        };
        if let Err(error) = self.notifier.send(outbound).await {
            relance.transition_to(RelanceStatut::Echoue)?;
            relance.updated_at = now;
            self.repos.relances.save(relance.clone()).await.map_err(storage)?;
            return Err(ActionError::Storage(format!("relance delivery failed: {error}")));
        }

        Ok(relance)
    }

    /// One scheduler pass: due appointment rappels, then automatic relances
    /// on overdue factures paced by the cooldown. Individual failures are
    /// reported, never fatal to the pass.
    pub async fn sweep(
        &self,
        tenant_id: &TenantId,
        now: DateTime<Utc>,
    ) -> Result<SweepReport, ActionError> {
        let tenant = self
            .repos
            .tenants
            .find_by_id(tenant_id)
            .await
            .map_err(storage)?
            .ok_or_else(|| ActionError::not_found("tenant", tenant_id.as_str()))?;
        // Rappels go to the artisan; the tenant id doubles as an opaque
        // routing key when no phone is on file.
        let destinataire =
            tenant.telephone.clone().unwrap_or_else(|| tenant.id.as_str().to_string());

        let mut report = SweepReport::default();

        let pending =
            self.repos.rdv.list_with_pending_rappels(tenant_id, now).await.map_err(storage)?;
        for mut rdv in pending {
            let due = due_rappels(&rdv, now);
            if due.is_empty() {
                continue;
            }
            let client = self
                .repos
                .clients
                .find_by_id(tenant_id, &rdv.client_id)
                .await
                .map_err(storage)?;
            let Some(client) = client else {
                tracing::warn!(rdv_id = %rdv.id.as_str(), "rdv without client, rappels skipped");
                continue;
            };

            let mut changed = false;
            for kind in due {
                let body = templates::rappel_message(
                    kind,
                    &client.nom,
                    rdv.date_heure,
                    rdv.adresse.as_deref(),
                );
                let outbound = OutboundMessage {
                    tenant_id: tenant_id.clone(),
                    destinataire: destinataire.clone(),
                    canal: "telephone".to_string(),
                    body,
                };
                if let Err(error) = self.notifier.send(outbound).await {
                    // Flag stays unset so the next sweep retries this one.
                    tracing::warn!(
                        rdv_id = %rdv.id.as_str(),
                        rappel = kind.as_str(),
                        error = %error,
                        "rappel delivery failed"
                    );
                    continue;
                }
                match kind {
                    RappelKind::J1 => rdv.rappel_j1_envoye = true,
                    RappelKind::JourJ => rdv.rappel_jour_j_envoye = true,
                    RappelKind::H2 => rdv.rappel_2h_envoye = true,
                }
                changed = true;
                report.rappels.push(RappelEnvoye {
                    rdv_id: rdv.id.as_str().to_string(),
                    rappel: kind.as_str(),
                });
            }
            if changed {
                rdv.updated_at = now;
                self.repos.rdv.save(rdv).await.map_err(storage)?;
            }
        }

        let candidates = self
            .repos
            .factures
            .list_relance_candidates(tenant_id, now.date_naive())
            .await
            .map_err(storage)?;
        for facture in candidates {
            if !sweep_cooldown_elapsed(facture.derniere_relance, now) {
                continue;
            }
            let request = RelanceRequest {
                client: None,
                document_ref: Some(facture.numero.clone()),
            };
            match self.relance(tenant_id, request, now).await {
                Ok(outcome) => report.relances.push(outcome.document_numero),
                Err(error) => report.relances_ignorees.push(RelanceIgnoree {
                    facture: facture.numero.clone(),
                    code: error.code().as_str(),
                    message: error.to_string(),
                }),
            }
        }

        tracing::info!(
            tenant_id = %tenant_id.as_str(),
            rappels = report.rappels.len(),
            relances = report.relances.len(),
            ignorees = report.relances_ignorees.len(),
            "sweep completed"
        );

        Ok(report)
    }
}
