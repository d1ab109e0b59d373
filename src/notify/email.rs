use async_trait::async_trait;
use lettre::{
    message::Mailbox, transport::smtp::authentication::Credentials, AsyncSmtpTransport,
    AsyncTransport, Message, Tokio1Executor,
};

use crate::{
    config::SmtpConfig,
    notify::{render_message, MemberContact, NotificationKind, NotificationSink, SendOutcome},
};

pub struct EmailSink {
    config: SmtpConfig,
    mailer: AsyncSmtpTransport<Tokio1Executor>,
}

impl EmailSink {
    pub fn new(config: Option<SmtpConfig>) -> Option<Self> {
        let config = config.filter(|cfg| cfg.enabled)?;

        let mailer = AsyncSmtpTransport::<Tokio1Executor>::relay(&config.host)
            .map(|builder| {
                builder
                    .port(config.port)
                    .credentials(Credentials::new(
                        config.username.clone(),
                        config.password.clone(),
                    ))
                    .build()
            })
            .map_err(|e| {
                tracing::warn!("SMTP transport could not be built, email disabled: {}", e);
                e
            })
            .ok()?;

        Some(Self { config, mailer })
    }
}

#[async_trait]
impl NotificationSink for EmailSink {
    fn name(&self) -> &str {
        "email"
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
        let from: Mailbox = match self.config.from.parse() {
            Ok(mb) => mb,
            Err(e) => return SendOutcome::Failed(format!("Invalid from address: {}", e)),
        };
        let to: Mailbox = match contact.email.parse() {
            Ok(mb) => mb,
            Err(_) => return SendOutcome::Skipped,
        };

        let message = match Message::builder()
            .from(from)
            .to(to)
            .subject(kind.subject())
            .body(render_message(contact, kind, data))
        {
            Ok(m) => m,
            Err(e) => return SendOutcome::Failed(format!("Message build failed: {}", e)),
        };

        match self.mailer.send(message).await {
            Ok(_) => SendOutcome::Sent,
            Err(e) => SendOutcome::Failed(format!("SMTP send failed: {}", e)),
        }
    }
}
