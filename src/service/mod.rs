pub mod expiry_service;
pub mod member_service;
pub mod rate_limit;
pub mod renewal_service;

use std::sync::Arc;
use std::time::Duration;

use sqlx::SqlitePool;

use crate::{
    catalog::PlanCatalog,
    config::Settings,
    notify::NotificationManager,
    payments::PaymentOrchestrator,
    repository::{
        MemberRepository, OrderRepository, SqliteMemberRepository, SqliteOrderRepository,
    },
};

pub use expiry_service::{ExpiryService, SweepReport};
pub use member_service::MemberService;
pub use rate_limit::{RateLimiter, SlidingWindowLimiter};
pub use renewal_service::{RenewalOutcome, RenewalService, RenewalTokens};

pub struct ServiceContext {
    pub member_repo: Arc<dyn MemberRepository>,
    pub order_repo: Arc<dyn OrderRepository>,
    pub catalog: Arc<PlanCatalog>,
    pub notifier: Arc<NotificationManager>,
    pub orchestrator: Arc<PaymentOrchestrator>,
    pub member_service: Arc<MemberService>,
    pub renewal_service: Arc<RenewalService>,
    pub expiry_service: Arc<ExpiryService>,
    pub rate_limiter: Arc<dyn RateLimiter>,
    pub db_pool: SqlitePool,
}

impl ServiceContext {
    pub fn new(
        db_pool: SqlitePool,
        settings: &Settings,
        notifier: Arc<NotificationManager>,
    ) -> Self {
        let member_repo: Arc<dyn MemberRepository> =
            Arc::new(SqliteMemberRepository::new(db_pool.clone()));
        let order_repo: Arc<dyn OrderRepository> =
            Arc::new(SqliteOrderRepository::new(db_pool.clone()));

        let catalog = Arc::new(PlanCatalog::new(
            db_pool.clone(),
            Duration::from_secs(settings.pricing.cache_ttl_secs),
        ));

        let tokens = RenewalTokens::new(
            settings.auth.renewal_token_secret.clone(),
            settings.auth.renewal_token_days,
        );

        let orchestrator = Arc::new(PaymentOrchestrator::new(
            member_repo.clone(),
            order_repo.clone(),
            catalog.clone(),
            notifier.clone(),
            settings.upi.clone(),
            settings.webhook.shared_secret.clone(),
        ));

        let member_service = Arc::new(MemberService::new(member_repo.clone(), notifier.clone()));

        let renewal_service = Arc::new(RenewalService::new(
            member_repo.clone(),
            catalog.clone(),
            orchestrator.clone(),
            notifier.clone(),
            tokens.clone(),
        ));

        let expiry_service = Arc::new(ExpiryService::new(
            member_repo.clone(),
            order_repo.clone(),
            notifier.clone(),
            tokens,
            settings.server.base_url.clone(),
        ));

        let rate_limiter: Arc<dyn RateLimiter> = Arc::new(SlidingWindowLimiter::new(
            settings.rate_limit.max_requests,
            Duration::from_secs(settings.rate_limit.window_secs),
        ));

        Self {
            member_repo,
            order_repo,
            catalog,
            notifier,
            orchestrator,
            member_service,
            renewal_service,
            expiry_service,
            rate_limiter,
            db_pool,
        }
    }
}
