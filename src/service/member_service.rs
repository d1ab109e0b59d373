use std::sync::Arc;

use chrono::{Months, Utc};
use serde_json::json;
use uuid::Uuid;
use validator::Validate;

use crate::{
    domain::{
        CreateMemberRequest, LedgerEntry, Member, NewMember, RenewalAudit, UpdateMemberRequest,
    },
    error::{AppError, Result},
    notify::{MemberContact, NotificationKind, NotificationManager},
    repository::MemberRepository,
};

pub struct MemberService {
    members: Arc<dyn MemberRepository>,
    notifier: Arc<NotificationManager>,
}

impl MemberService {
    pub fn new(members: Arc<dyn MemberRepository>, notifier: Arc<NotificationManager>) -> Self {
        Self { members, notifier }
    }

    pub async fn register(&self, request: CreateMemberRequest) -> Result<Member> {
        request
            .validate()
            .map_err(|e| AppError::Validation(e.to_string()))?;

        if self.members.find_by_email(&request.email).await?.is_some() {
            return Err(AppError::Conflict("Email already registered".to_string()));
        }
        if self.members.find_by_phone(&request.phone).await?.is_some() {
            return Err(AppError::Conflict("Phone already registered".to_string()));
        }

        let start_date = request.start_date.unwrap_or_else(|| Utc::now().date_naive());
        let end_date = start_date
            .checked_add_months(Months::new(request.plan.months()))
            .ok_or_else(|| AppError::Validation("start_date out of range".to_string()))?;

        let member = self
            .members
            .create(NewMember {
                name: request.name,
                email: request.email,
                phone: request.phone,
                plan: request.plan,
                start_date,
                end_date,
                payment_method: request.payment_method,
            })
            .await?;

        tracing::info!(
            member_id = %member.id,
            plan = member.plan.as_str(),
            "Member registered"
        );
        self.notifier
            .dispatch(
                &MemberContact::from_member(&member),
                NotificationKind::Welcome,
                &json!({ "plan": member.plan.as_str() }),
            )
            .await;

        Ok(member)
    }

    pub async fn get(&self, id: Uuid) -> Result<Member> {
        self.members
            .find_by_id(id)
            .await?
            .ok_or_else(|| AppError::NotFound("Member not found".to_string()))
    }

    pub async fn list(&self, limit: i64, offset: i64) -> Result<Vec<Member>> {
        self.members.list(limit, offset).await
    }

    pub async fn update(&self, id: Uuid, update: UpdateMemberRequest) -> Result<Member> {
        if let (Some(start), Some(end)) = (update.start_date, update.end_date) {
            if end < start {
                return Err(AppError::Validation(
                    "end_date must not be before start_date".to_string(),
                ));
            }
        }
        self.members.update(id, update).await
    }

    /// Soft delete. Display fields are anonymized for good; the member's
    /// ledger stays intact and remains part of revenue reporting.
    pub async fn soft_delete(&self, id: Uuid) -> Result<Member> {
        let member = self.members.soft_delete(id).await?;
        tracing::info!(member_id = %id, "Member soft-deleted and anonymized");
        Ok(member)
    }

    pub async fn ledger(&self, member_id: Uuid) -> Result<Vec<LedgerEntry>> {
        // Deliberately no deleted-member filter: the ledger outlives the
        // member's display identity.
        self.members.ledger(member_id).await
    }

    pub async fn renewal_history(&self, member_id: Uuid) -> Result<Vec<RenewalAudit>> {
        self.members.renewal_audits(member_id).await
    }
}
