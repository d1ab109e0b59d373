use std::sync::Arc;

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use serde_json::json;
use sha2::Sha256;
use uuid::Uuid;

use crate::{
    catalog::PlanCatalog,
    domain::{
        Member, MemberSummary, PaymentMethod, PaymentOrder, PlanCode, ProposalSource,
        RenewalApplication, SubmitRenewalRequest,
    },
    error::{AppError, Result},
    notify::{MemberContact, NotificationKind, NotificationManager},
    payments::PaymentOrchestrator,
    repository::MemberRepository,
};

type HmacSha256 = Hmac<Sha256>;

/// Signed, time-boxed renewal credentials. A token binds a member id to
/// an expiry instant: `base64url(member_id:expiry).hex(hmac)`. It acts
/// as a capability link, so verification failures are deliberately
/// uniform: a caller cannot tell a forged token from a stale one.
#[derive(Clone)]
pub struct RenewalTokens {
    secret: String,
    ttl: Duration,
}

impl RenewalTokens {
    pub fn new(secret: impl Into<String>, ttl_days: i64) -> Self {
        Self {
            secret: secret.into(),
            ttl: Duration::days(ttl_days),
        }
    }

    pub fn issue(&self, member_id: Uuid) -> Result<String> {
        self.issue_expiring_at(member_id, Utc::now() + self.ttl)
    }

    pub fn issue_expiring_at(
        &self,
        member_id: Uuid,
        expires_at: DateTime<Utc>,
    ) -> Result<String> {
        let payload = format!("{}:{}", member_id, expires_at.timestamp());
        let mut mac = HmacSha256::new_from_slice(self.secret.as_bytes())
            .map_err(|e| AppError::Internal(format!("HMAC init failed: {}", e)))?;
        mac.update(payload.as_bytes());
        let signature = mac.finalize().into_bytes();

        Ok(format!(
            "{}.{}",
            URL_SAFE_NO_PAD.encode(payload),
            hex::encode(signature)
        ))
    }

    pub fn verify(&self, token: &str) -> Result<Uuid> {
        let (payload_b64, signature_hex) = token.split_once('.').ok_or(AppError::InvalidToken)?;

        let payload = URL_SAFE_NO_PAD
            .decode(payload_b64)
            .map_err(|_| AppError::InvalidToken)?;
        let signature = hex::decode(signature_hex).map_err(|_| AppError::InvalidToken)?;

        let mut mac = HmacSha256::new_from_slice(self.secret.as_bytes())
            .map_err(|_| AppError::InvalidToken)?;
        mac.update(&payload);
        // Constant-time comparison under the hood.
        mac.verify_slice(&signature)
            .map_err(|_| AppError::InvalidToken)?;

        let payload = String::from_utf8(payload).map_err(|_| AppError::InvalidToken)?;
        let (id_str, expiry_str) = payload.split_once(':').ok_or(AppError::InvalidToken)?;
        let expires_at = expiry_str
            .parse::<i64>()
            .map_err(|_| AppError::InvalidToken)?;

        if Utc::now().timestamp() > expires_at {
            return Err(AppError::InvalidToken);
        }

        Uuid::parse_str(id_str).map_err(|_| AppError::InvalidToken)
    }
}

/// Result of a renewal submission: the member is now pending, and for
/// online payment the freshly minted order carries the polling data.
#[derive(Debug)]
pub struct RenewalOutcome {
    pub member: Member,
    pub order: Option<PaymentOrder>,
}

/// The renewal workflow: `active → expired → pending → active|expired`,
/// driven by the member through a token link and gated by an admin.
pub struct RenewalService {
    members: Arc<dyn MemberRepository>,
    catalog: Arc<PlanCatalog>,
    orchestrator: Arc<PaymentOrchestrator>,
    notifier: Arc<NotificationManager>,
    tokens: RenewalTokens,
}

impl RenewalService {
    pub fn new(
        members: Arc<dyn MemberRepository>,
        catalog: Arc<PlanCatalog>,
        orchestrator: Arc<PaymentOrchestrator>,
        notifier: Arc<NotificationManager>,
        tokens: RenewalTokens,
    ) -> Self {
        Self {
            members,
            catalog,
            orchestrator,
            notifier,
            tokens,
        }
    }

    pub async fn issue_renewal_token(&self, member_id: Uuid) -> Result<String> {
        self.active_member(member_id).await?;
        self.tokens.issue(member_id)
    }

    pub async fn verify_renewal_token(&self, token: &str) -> Result<MemberSummary> {
        let member_id = self.tokens.verify(token)?;
        let member = self.active_member(member_id).await?;
        Ok(MemberSummary::from_member(&member))
    }

    pub async fn submit_renewal(&self, request: SubmitRenewalRequest) -> Result<RenewalOutcome> {
        let member_id = self.tokens.verify(&request.token)?;
        let member = self.active_member(member_id).await?;

        if request.end_date < request.start_date {
            return Err(AppError::Validation(
                "end_date must not be before start_date".to_string(),
            ));
        }

        self.apply(
            member,
            request.plan,
            request.start_date,
            request.end_date,
            request.payment_method,
            ProposalSource::Token,
        )
        .await
    }

    /// Deprecated inline renewal form. Routed through the same
    /// transition as the token path, with the window derived from the
    /// plan duration, so the two entry points cannot diverge.
    pub async fn submit_renewal_legacy(
        &self,
        member_id: Uuid,
        plan: PlanCode,
        payment_method: PaymentMethod,
    ) -> Result<RenewalOutcome> {
        let member = self.active_member(member_id).await?;

        let start_date = Utc::now().date_naive();
        let end_date = start_date
            .checked_add_months(chrono::Months::new(plan.months()))
            .ok_or_else(|| AppError::Validation("Renewal window out of range".to_string()))?;

        self.apply(
            member,
            plan,
            start_date,
            end_date,
            payment_method,
            ProposalSource::Legacy,
        )
        .await
    }

    pub async fn approve_renewal(&self, member_id: Uuid) -> Result<Member> {
        let member = self.orchestrator.admin_confirm(member_id).await?;
        tracing::info!(member_id = %member_id, "Renewal approved");
        self.notifier
            .dispatch(
                &MemberContact::from_member(&member),
                NotificationKind::RenewalApproved,
                &json!({
                    "plan": member.plan.as_str(),
                    "end_date": member.end_date,
                }),
            )
            .await;
        Ok(member)
    }

    pub async fn reject_renewal(&self, member_id: Uuid) -> Result<Member> {
        let member = self.members.reject_pending_renewal(member_id).await?;
        tracing::info!(member_id = %member_id, "Renewal rejected");
        self.notifier
            .dispatch(
                &MemberContact::from_member(&member),
                NotificationKind::RenewalRejected,
                &json!({}),
            )
            .await;
        Ok(member)
    }

    async fn apply(
        &self,
        member: Member,
        plan: PlanCode,
        start_date: chrono::NaiveDate,
        end_date: chrono::NaiveDate,
        payment_method: PaymentMethod,
        source: ProposalSource,
    ) -> Result<RenewalOutcome> {
        // Captured before any mutation; apply_renewal rewrites the plan.
        let previous_plan = member.plan;
        let previous_amount = self.catalog.resolve_price(previous_plan).await;
        let new_amount = self.catalog.resolve_price(plan).await;

        let updated = self
            .members
            .apply_renewal(
                member.id,
                RenewalApplication {
                    plan,
                    start_date,
                    end_date,
                    payment_method,
                    previous_plan,
                    previous_amount,
                    new_amount,
                    source,
                },
            )
            .await?;

        let order = if payment_method == PaymentMethod::Online {
            Some(
                self.orchestrator
                    .create_order(member.id, Some(plan), Some(new_amount), true)
                    .await?,
            )
        } else {
            None
        };

        tracing::info!(
            member_id = %member.id,
            plan = plan.as_str(),
            source = source.as_str(),
            online = order.is_some(),
            "Renewal submitted"
        );

        Ok(RenewalOutcome {
            member: updated,
            order,
        })
    }

    async fn active_member(&self, member_id: Uuid) -> Result<Member> {
        let member = self
            .members
            .find_by_id(member_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Member not found".to_string()))?;

        if member.deleted {
            return Err(AppError::NotFound("Member not found".to_string()));
        }
        Ok(member)
    }
}
