//! Outbound delivery seam. Relances and rappels are composed here but sent
//! by whatever sits behind [`Notifier`]; the default deployment plugs the
//! WhatsApp gateway in at the server boundary.

use std::sync::Mutex;

use anyhow::Result;
use async_trait::async_trait;

use artibot_core::domain::tenant::TenantId;

/// One message ready to leave the system.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OutboundMessage {
    pub tenant_id: TenantId,
    pub destinataire: String,
    pub canal: String,
    pub body: String,
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, message: OutboundMessage) -> Result<()>;
}

/// Swallows every message. Used when delivery is handled out of band and
/// the pipeline only needs the bookkeeping (statut transitions, niveaux).
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopNotifier;

#[async_trait]
impl Notifier for NoopNotifier {
    async fn send(&self, message: OutboundMessage) -> Result<()> {
        tracing::debug!(
            tenant_id = %message.tenant_id.as_str(),
            canal = %message.canal,
            "outbound message dropped (noop notifier)"
        );
        Ok(())
    }
}

/// Records messages instead of sending them.
#[derive(Default)]
pub struct InMemoryNotifier {
    sent: Mutex<Vec<OutboundMessage>>,
}

impl InMemoryNotifier {
    pub fn sent(&self) -> Vec<OutboundMessage> {
        self.sent.lock().expect("notifier mutex poisoned").clone()
    }
}

#[async_trait]
impl Notifier for InMemoryNotifier {
    async fn send(&self, message: OutboundMessage) -> Result<()> {
        self.sent.lock().expect("notifier mutex poisoned").push(message);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{InMemoryNotifier, Notifier, OutboundMessage};
    use artibot_core::domain::tenant::TenantId;

    #[tokio::test]
    async fn in_memory_notifier_keeps_messages_in_order() {
        let notifier = InMemoryNotifier::default();
        for body in ["premier", "second"] {
            notifier
                .send(OutboundMessage {
                    tenant_id: TenantId("tnt-1".to_string()),
                    destinataire: "+33612345678".to_string(),
                    canal: "telephone".to_string(),
                    body: body.to_string(),
                })
                .await
                .expect("in-memory send");
        }

        let sent = notifier.sent();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].body, "premier");
        assert_eq!(sent[1].body, "second");
    }
}
