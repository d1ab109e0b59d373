use std::sync::Arc;

use chrono::{NaiveTime, Utc};
use serde::Serialize;
use serde_json::json;

use crate::{
    error::Result,
    notify::{MemberContact, NotificationKind, NotificationManager},
    repository::{MemberRepository, OrderRepository},
    service::renewal_service::RenewalTokens,
};

const EXPIRY_WARNING_DAYS: i64 = 7;

#[derive(Debug, Clone, Serialize)]
pub struct SweepReport {
    pub expired: usize,
    pub expiring_soon: usize,
    pub orders_expired: u64,
}

/// Daily reconciliation: lapsed members are flipped to expired and sent
/// a renewal link, members inside the warning window get a reminder, and
/// stale payment orders are marked expired. Every step is idempotent, so
/// rerunning the sweep is harmless.
pub struct ExpiryService {
    members: Arc<dyn MemberRepository>,
    orders: Arc<dyn OrderRepository>,
    notifier: Arc<NotificationManager>,
    tokens: RenewalTokens,
    base_url: String,
}

impl ExpiryService {
    pub fn new(
        members: Arc<dyn MemberRepository>,
        orders: Arc<dyn OrderRepository>,
        notifier: Arc<NotificationManager>,
        tokens: RenewalTokens,
        base_url: String,
    ) -> Self {
        Self {
            members,
            orders,
            notifier,
            tokens,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub async fn run_sweep(&self) -> Result<SweepReport> {
        let today = Utc::now().date_naive();
        let mut expired = 0;

        for member in self.members.list_lapsed(today).await? {
            // The guarded flip makes concurrent or repeated sweeps
            // single-winner; only the winner notifies.
            if !self.members.mark_expired(member.id).await? {
                continue;
            }
            expired += 1;

            let data = match self.tokens.issue(member.id) {
                Ok(token) => json!({
                    "end_date": member.end_date,
                    "renewal_link": format!("{}/renew?token={}", self.base_url, token),
                }),
                Err(e) => {
                    tracing::warn!(member_id = %member.id, "Could not mint renewal token: {}", e);
                    json!({ "end_date": member.end_date })
                }
            };
            self.notifier
                .dispatch(
                    &MemberContact::from_member(&member),
                    NotificationKind::MembershipExpired,
                    &data,
                )
                .await;
        }

        let expiring = self
            .members
            .list_expiring_within(today, EXPIRY_WARNING_DAYS)
            .await?;
        for member in &expiring {
            let days_left = (member.end_date - today).num_days();
            self.notifier
                .dispatch(
                    &MemberContact::from_member(member),
                    NotificationKind::ExpiringSoon,
                    &json!({
                        "end_date": member.end_date,
                        "days_left": days_left,
                    }),
                )
                .await;
        }

        let orders_expired = self.orders.expire_lapsed(Utc::now()).await?;

        let report = SweepReport {
            expired,
            expiring_soon: expiring.len(),
            orders_expired,
        };
        tracing::info!(
            expired = report.expired,
            expiring_soon = report.expiring_soon,
            orders_expired = report.orders_expired,
            "Expiry sweep finished"
        );
        Ok(report)
    }

    /// Spawns the midnight-aligned timer loop.
    pub fn spawn(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(until_next_midnight()).await;
                if let Err(e) = self.run_sweep().await {
                    tracing::error!("Expiry sweep failed: {}", e);
                }
            }
        })
    }
}

fn until_next_midnight() -> std::time::Duration {
    let now = Utc::now().naive_utc();
    let next = (now.date() + chrono::Duration::days(1)).and_time(NaiveTime::MIN);
    (next - now)
        .to_std()
        .unwrap_or_else(|_| std::time::Duration::from_secs(60))
}
