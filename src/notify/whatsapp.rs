use async_trait::async_trait;
use serde_json::json;

use crate::{
    config::WhatsAppConfig,
    notify::{render_message, MemberContact, NotificationKind, NotificationSink, SendOutcome},
};

/// Pushes messages through an HTTP WhatsApp gateway. The gateway contract
/// is a single JSON POST; anything other than a 2xx response counts as a
/// failed (and forgotten) send.
pub struct WhatsAppSink {
    config: WhatsAppConfig,
    client: reqwest::Client,
}

impl WhatsAppSink {
    pub fn new(config: Option<WhatsAppConfig>) -> Option<Self> {
        config.filter(|cfg| cfg.enabled).map(|config| Self {
            config,
            client: reqwest::Client::new(),
        })
    }
}

#[async_trait]
impl NotificationSink for WhatsAppSink {
    fn name(&self) -> &str {
        "whatsapp"
    }

    fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    async fn send(
        &self,
        contact: &MemberContact,
        kind: NotificationKind,
        data: &serde_json::Value,
    ) -> SendOutcome {
        if contact.phone.is_empty() {
            return SendOutcome::Skipped;
        }

        let payload = json!({
            "phone": contact.phone,
            "message": render_message(contact, kind, data),
        });

        let response = self
            .client
            .post(&self.config.api_url)
            .bearer_auth(&self.config.api_key)
            .json(&payload)
            .send()
            .await;

        match response {
            Ok(resp) if resp.status().is_success() => SendOutcome::Sent,
            Ok(resp) => SendOutcome::Failed(format!("Gateway returned {}", resp.status())),
            Err(e) => SendOutcome::Failed(format!("Gateway request failed: {}", e)),
        }
    }
}
