use std::sync::Arc;

use chrono::NaiveDate;
use fitdesk::{
    config::Settings,
    domain::{
        CreateMemberRequest, LedgerEntryKind, OrderStatus, PaymentMethod, PaymentStatus,
        PlanCode, SubmitRenewalRequest, SubscriptionStatus,
    },
    error::AppError,
    notify::NotificationManager,
    service::ServiceContext,
};
use sqlx::SqlitePool;
use uuid::Uuid;

async fn setup() -> ServiceContext {
    let pool = SqlitePool::connect(":memory:").await.unwrap();
    sqlx::migrate!("./migrations").run(&pool).await.unwrap();

    let mut settings = Settings::default();
    settings.upi.payee_vpa = Some("gym@upi".to_string());
    settings.webhook.shared_secret = Some("s3cret".to_string());
    settings.auth.renewal_token_secret = "test-secret".to_string();
    // No caching in tests so price edits are visible immediately.
    settings.pricing.cache_ttl_secs = 0;

    ServiceContext::new(pool, &settings, Arc::new(NotificationManager::new()))
}

fn registration(email: &str, phone: &str, method: PaymentMethod) -> CreateMemberRequest {
    CreateMemberRequest {
        name: "Asha Verma".to_string(),
        email: email.to_string(),
        phone: phone.to_string(),
        plan: PlanCode::OneMonth,
        payment_method: method,
        start_date: Some(NaiveDate::from_ymd_opt(2025, 1, 15).unwrap()),
    }
}

/// The full journey: cash join confirmed by an admin, then an online
/// yearly renewal confirmed through the webhook path.
#[tokio::test]
async fn test_end_to_end_join_then_renewal() -> anyhow::Result<()> {
    let ctx = setup().await;
    let join_date = NaiveDate::from_ymd_opt(2025, 1, 15).unwrap();

    // Registration: pending/pending, cash, 1month
    let member = ctx
        .member_service
        .register(registration("asha@example.com", "9876543210", PaymentMethod::Cash))
        .await?;
    assert_eq!(member.payment_status, PaymentStatus::Pending);
    assert_eq!(member.subscription_status, SubscriptionStatus::Pending);

    // Admin confirms the cash payment
    let member = ctx.orchestrator.admin_confirm(member.id).await?;
    assert_eq!(member.payment_status, PaymentStatus::Confirmed);
    assert_eq!(member.subscription_status, SubscriptionStatus::Active);

    let ledger = ctx.member_service.ledger(member.id).await?;
    assert_eq!(ledger.len(), 1);
    assert_eq!(ledger[0].kind, LedgerEntryKind::Join);
    assert_eq!(ledger[0].amount, 1500);
    assert_eq!(ledger[0].plan, PlanCode::OneMonth);
    assert_eq!(ledger[0].payment_status, PaymentStatus::Confirmed);

    // Member submits an online yearly renewal via a token link
    let token = ctx.renewal_service.issue_renewal_token(member.id).await?;
    let outcome = ctx
        .renewal_service
        .submit_renewal(SubmitRenewalRequest {
            token,
            plan: PlanCode::Yearly,
            start_date: NaiveDate::from_ymd_opt(2025, 2, 16).unwrap(),
            end_date: NaiveDate::from_ymd_opt(2026, 2, 16).unwrap(),
            payment_method: PaymentMethod::Online,
        })
        .await?;

    assert_eq!(outcome.member.subscription_status, SubscriptionStatus::Pending);
    assert_eq!(outcome.member.payment_status, PaymentStatus::Pending);
    assert_eq!(outcome.member.original_join_date, Some(join_date));

    let order = outcome.order.expect("online renewal should mint an order");
    assert_eq!(order.amount, 8000);
    assert_eq!(order.status, OrderStatus::Created);
    assert!(order.is_renewal);
    assert!(order.intent.starts_with("upi://pay?pa=gym%40upi&"));
    assert!(order.intent.contains("&am=8000.00"));

    // Gateway webhook confirms the order
    assert!(ctx.orchestrator.verify_webhook(Some("s3cret")));
    ctx.orchestrator
        .mark_paid(&order.id, Some("TXN12345".to_string()))
        .await?;

    let member = ctx.member_service.get(member.id).await?;
    assert_eq!(member.plan, PlanCode::Yearly);
    assert_eq!(member.subscription_status, SubscriptionStatus::Active);
    assert_eq!(member.payment_status, PaymentStatus::Confirmed);
    assert_eq!(member.original_join_date, Some(join_date));

    let ledger = ctx.member_service.ledger(member.id).await?;
    assert_eq!(ledger.len(), 2);
    assert_eq!(ledger[0].amount, 1500);
    assert_eq!(ledger[1].amount, 8000);
    assert_eq!(ledger[1].kind, LedgerEntryKind::Renewal);
    assert_eq!(ledger[1].transaction_ref.as_deref(), Some("TXN12345"));

    Ok(())
}

#[tokio::test]
async fn test_mark_paid_is_idempotent() -> anyhow::Result<()> {
    let ctx = setup().await;

    let member = ctx
        .member_service
        .register(registration("idem@example.com", "9876500001", PaymentMethod::Online))
        .await?;

    let order = ctx
        .orchestrator
        .create_order(member.id, None, None, false)
        .await?;

    let first = ctx
        .orchestrator
        .mark_paid(&order.id, Some("TXN-A".to_string()))
        .await?;
    let second = ctx
        .orchestrator
        .mark_paid(&order.id, Some("TXN-B".to_string()))
        .await?;

    // The second confirmation is a no-op returning the stored record:
    // same external ref, same paid timestamp.
    assert_eq!(first.status, OrderStatus::Paid);
    assert_eq!(second.status, OrderStatus::Paid);
    assert_eq!(second.external_ref.as_deref(), Some("TXN-A"));
    assert_eq!(second.paid_at, first.paid_at);

    // Exactly one ledger entry despite two confirmations
    let ledger = ctx.member_service.ledger(member.id).await?;
    assert_eq!(ledger.len(), 1);
    assert_eq!(ledger[0].amount, order.amount);

    Ok(())
}

#[tokio::test]
async fn test_paid_order_and_member_move_together() -> anyhow::Result<()> {
    let ctx = setup().await;

    let member = ctx
        .member_service
        .register(registration("atomic@example.com", "9876500002", PaymentMethod::Online))
        .await?;
    let order = ctx
        .orchestrator
        .create_order(member.id, None, None, false)
        .await?;

    // Before confirmation: nothing recognized
    assert!(ctx.member_service.ledger(member.id).await?.is_empty());
    assert_eq!(
        ctx.member_service.get(member.id).await?.payment_status,
        PaymentStatus::Pending
    );

    ctx.orchestrator.mark_paid(&order.id, None).await?;

    // After: the order is paid AND the member is confirmed with a
    // matching confirmed ledger entry. Never one without the other.
    let paid = ctx.orchestrator.check_status(&order.id).await?;
    assert_eq!(paid.status, OrderStatus::Paid);
    // No external ref supplied: falls back to the order id
    assert_eq!(paid.external_ref.as_deref(), Some(order.id.as_str()));

    let member = ctx.member_service.get(member.id).await?;
    assert_eq!(member.payment_status, PaymentStatus::Confirmed);
    let ledger = ctx.member_service.ledger(member.id).await?;
    assert!(ledger
        .iter()
        .any(|e| e.amount == order.amount && e.payment_status == PaymentStatus::Confirmed));

    Ok(())
}

#[tokio::test]
async fn test_mark_failed_leaves_member_untouched() -> anyhow::Result<()> {
    let ctx = setup().await;

    let member = ctx
        .member_service
        .register(registration("fail@example.com", "9876500003", PaymentMethod::Online))
        .await?;
    let order = ctx
        .orchestrator
        .create_order(member.id, None, None, false)
        .await?;

    let failed = ctx
        .orchestrator
        .mark_failed(&order.id, "UPI transfer declined")
        .await?;
    assert_eq!(failed.status, OrderStatus::Failed);
    assert_eq!(failed.failure_reason.as_deref(), Some("UPI transfer declined"));

    let member = ctx.member_service.get(member.id).await?;
    assert_eq!(member.payment_status, PaymentStatus::Pending);
    assert!(ctx.member_service.ledger(member.id).await?.is_empty());

    // A paid order shrugs off a late failure signal
    ctx.orchestrator.mark_paid(&order.id, None).await?;
    let still_paid = ctx.orchestrator.mark_failed(&order.id, "too late").await?;
    assert_eq!(still_paid.status, OrderStatus::Paid);

    Ok(())
}

#[tokio::test]
async fn test_order_amount_survives_catalog_edits() -> anyhow::Result<()> {
    let ctx = setup().await;

    let member = ctx
        .member_service
        .register(registration("stable@example.com", "9876500004", PaymentMethod::Online))
        .await?;

    let order = ctx
        .orchestrator
        .create_order(member.id, Some(PlanCode::SixMonth), None, false)
        .await?;
    assert_eq!(order.amount, 7500);

    // Admin bumps the price after the order exists
    ctx.catalog.set_price(PlanCode::SixMonth, 9900).await?;

    // New orders see the new price...
    let fresh = ctx
        .orchestrator
        .create_order(member.id, Some(PlanCode::SixMonth), None, false)
        .await?;
    assert_eq!(fresh.amount, 9900);

    // ...the old order and its settlement do not
    let paid = ctx.orchestrator.mark_paid(&order.id, None).await?;
    assert_eq!(paid.amount, 7500);
    let ledger = ctx.member_service.ledger(member.id).await?;
    assert_eq!(ledger[0].amount, 7500);

    Ok(())
}

#[tokio::test]
async fn test_webhook_secret_matrix() {
    let ctx = setup().await;

    assert!(!ctx.orchestrator.verify_webhook(None));
    assert!(!ctx.orchestrator.verify_webhook(Some("")));
    assert!(!ctx.orchestrator.verify_webhook(Some("wrong-secret")));
    assert!(ctx.orchestrator.verify_webhook(Some("s3cret")));
}

#[tokio::test]
async fn test_ledger_survives_soft_delete() -> anyhow::Result<()> {
    let ctx = setup().await;

    let member = ctx
        .member_service
        .register(registration("ledger@example.com", "9876500005", PaymentMethod::Cash))
        .await?;
    ctx.orchestrator.admin_confirm(member.id).await?;

    let before = ctx.member_service.ledger(member.id).await?;
    assert_eq!(before.len(), 1);

    let deleted = ctx.member_service.soft_delete(member.id).await?;
    assert!(deleted.deleted);
    assert_ne!(deleted.email, "ledger@example.com");

    // Revenue reporting still sees the entry, unchanged
    let after = ctx.member_service.ledger(member.id).await?;
    assert_eq!(after.len(), 1);
    assert_eq!(after[0].id, before[0].id);
    assert_eq!(after[0].amount, before[0].amount);

    Ok(())
}

#[tokio::test]
async fn test_create_order_error_paths() -> anyhow::Result<()> {
    let ctx = setup().await;

    // Unknown member
    let err = ctx
        .orchestrator
        .create_order(Uuid::new_v4(), None, None, false)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));

    // Unconfigured payee VPA
    let pool = SqlitePool::connect(":memory:").await?;
    sqlx::migrate!("./migrations").run(&pool).await?;
    let mut settings = Settings::default();
    settings.auth.renewal_token_secret = "test-secret".to_string();
    let bare = ServiceContext::new(pool, &settings, Arc::new(NotificationManager::new()));

    let member = bare
        .member_service
        .register(registration("novpa@example.com", "9876500006", PaymentMethod::Online))
        .await?;
    let err = bare
        .orchestrator
        .create_order(member.id, None, None, false)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::ServiceUnavailable(_)));

    Ok(())
}

#[tokio::test]
async fn test_admin_confirm_settles_open_order() -> anyhow::Result<()> {
    let ctx = setup().await;

    let member = ctx
        .member_service
        .register(registration("open@example.com", "9876500007", PaymentMethod::Online))
        .await?;
    let order = ctx
        .orchestrator
        .create_order(member.id, None, None, false)
        .await?;

    // Admin approval settles through the order, keeping its amount
    // authoritative.
    let member = ctx.orchestrator.admin_confirm(member.id).await?;
    assert_eq!(member.payment_status, PaymentStatus::Confirmed);

    let status = ctx.orchestrator.check_status(&order.id).await?;
    assert_eq!(status.status, OrderStatus::Paid);

    let ledger = ctx.member_service.ledger(member.id).await?;
    assert_eq!(ledger.len(), 1);
    assert_eq!(ledger[0].amount, order.amount);
    assert_eq!(ledger[0].payment_mode, PaymentMethod::Online);

    // Clicking confirm again changes nothing
    ctx.orchestrator.admin_confirm(member.id).await?;
    assert_eq!(ctx.member_service.ledger(member.id).await?.len(), 1);

    Ok(())
}
