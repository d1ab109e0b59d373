use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::domain::Member;

pub mod email;
pub mod whatsapp;

pub use email::EmailSink;
pub use whatsapp::WhatsAppSink;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
    Welcome,
    PaymentConfirmed,
    PaymentRejected,
    RenewalApproved,
    RenewalRejected,
    MembershipExpired,
    ExpiringSoon,
}

impl NotificationKind {
    pub fn subject(&self) -> &'static str {
        match self {
            NotificationKind::Welcome => "Welcome to the gym",
            NotificationKind::PaymentConfirmed => "Payment received",
            NotificationKind::PaymentRejected => "Payment could not be confirmed",
            NotificationKind::RenewalApproved => "Your renewal is confirmed",
            NotificationKind::RenewalRejected => "Your renewal was declined",
            NotificationKind::MembershipExpired => "Your membership has expired",
            NotificationKind::ExpiringSoon => "Your membership expires soon",
        }
    }
}

/// Delivery outcome. Sinks never return an error: a failed send is data,
/// not a fault that should unwind payment or subscription state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    Sent,
    Skipped,
    Failed(String),
}

#[derive(Debug, Clone)]
pub struct MemberContact {
    pub name: String,
    pub email: String,
    pub phone: String,
}

impl MemberContact {
    pub fn from_member(member: &Member) -> Self {
        Self {
            name: member.name.clone(),
            email: member.email.clone(),
            phone: member.phone.clone(),
        }
    }
}

#[async_trait]
pub trait NotificationSink: Send + Sync {
    fn name(&self) -> &str;
    fn is_enabled(&self) -> bool;
    async fn send(
        &self,
        contact: &MemberContact,
        kind: NotificationKind,
        data: &serde_json::Value,
    ) -> SendOutcome;
}

/// Fans a notification out to every registered sink. Failures are logged
/// and otherwise ignored; callers treat dispatch as fire-and-forget.
pub struct NotificationManager {
    sinks: RwLock<Vec<Arc<dyn NotificationSink>>>,
}

impl NotificationManager {
    pub fn new() -> Self {
        Self {
            sinks: RwLock::new(Vec::new()),
        }
    }

    pub async fn register(&self, sink: Arc<dyn NotificationSink>) {
        if sink.is_enabled() {
            let mut sinks = self.sinks.write().await;
            tracing::info!("Registered notification sink: {}", sink.name());
            sinks.push(sink);
        }
    }

    pub async fn dispatch(
        &self,
        contact: &MemberContact,
        kind: NotificationKind,
        data: &serde_json::Value,
    ) {
        let sinks = self.sinks.read().await;
        if sinks.is_empty() {
            tracing::debug!("No notification sinks registered, skipping dispatch");
            return;
        }

        for sink in sinks.iter() {
            match sink.send(contact, kind, data).await {
                SendOutcome::Sent => {
                    tracing::debug!(sink = sink.name(), "Notification sent");
                }
                SendOutcome::Skipped => {
                    tracing::debug!(sink = sink.name(), "Notification skipped");
                }
                SendOutcome::Failed(reason) => {
                    // Deliberately swallowed: the payment/subscription
                    // change this message describes has already committed.
                    tracing::warn!(sink = sink.name(), reason = %reason, "Notification failed");
                }
            }
        }
    }
}

impl Default for NotificationManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Plain-text body shared by the email and WhatsApp sinks.
pub fn render_message(
    contact: &MemberContact,
    kind: NotificationKind,
    data: &serde_json::Value,
) -> String {
    let mut body = format!("Hi {},\n\n", contact.name);

    match kind {
        NotificationKind::Welcome => {
            body.push_str("Welcome aboard! Your membership has been registered.");
        }
        NotificationKind::PaymentConfirmed => {
            body.push_str("We have received your payment");
            if let Some(amount) = data.get("amount").and_then(|v| v.as_i64()) {
                body.push_str(&format!(" of INR {}", amount));
            }
            if let Some(plan) = data.get("plan").and_then(|v| v.as_str()) {
                body.push_str(&format!(" for the {} plan", plan));
            }
            body.push_str(". Your membership is active.");
            if let Some(txn) = data.get("transaction_ref").and_then(|v| v.as_str()) {
                body.push_str(&format!("\nTransaction reference: {}", txn));
            }
        }
        NotificationKind::PaymentRejected => {
            body.push_str("Your payment could not be confirmed.");
            if let Some(reason) = data.get("reason").and_then(|v| v.as_str()) {
                body.push_str(&format!(" Reason: {}.", reason));
            }
            body.push_str(" Please get in touch with the front desk.");
        }
        NotificationKind::RenewalApproved => {
            body.push_str("Your renewal has been approved and your membership is active again.");
        }
        NotificationKind::RenewalRejected => {
            body.push_str("Your renewal request was declined. Please contact the front desk.");
        }
        NotificationKind::MembershipExpired => {
            body.push_str("Your membership has expired.");
            if let Some(link) = data.get("renewal_link").and_then(|v| v.as_str()) {
                body.push_str(&format!("\nRenew here: {}", link));
            }
        }
        NotificationKind::ExpiringSoon => {
            body.push_str("Your membership expires");
            if let Some(days) = data.get("days_left").and_then(|v| v.as_i64()) {
                body.push_str(&format!(" in {} day(s)", days));
            } else {
                body.push_str(" soon");
            }
            body.push_str(". Renew in time to keep training without a break.");
        }
    }

    body.push_str("\n\n- Fitdesk");
    body
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn contact() -> MemberContact {
        MemberContact {
            name: "Priya".to_string(),
            email: "priya@example.com".to_string(),
            phone: "9876543210".to_string(),
        }
    }

    #[test]
    fn expired_message_embeds_renewal_link() {
        let body = render_message(
            &contact(),
            NotificationKind::MembershipExpired,
            &json!({"renewal_link": "http://localhost:8080/renew?token=abc"}),
        );
        assert!(body.contains("http://localhost:8080/renew?token=abc"));
    }

    #[test]
    fn confirmation_message_includes_amount_and_plan() {
        let body = render_message(
            &contact(),
            NotificationKind::PaymentConfirmed,
            &json!({"amount": 8000, "plan": "yearly"}),
        );
        assert!(body.contains("INR 8000"));
        assert!(body.contains("yearly"));
    }
}
