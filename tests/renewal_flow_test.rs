use std::sync::Arc;

use chrono::{Duration, NaiveDate, Utc};
use fitdesk::{
    config::Settings,
    domain::{
        CreateMemberRequest, LedgerEntryKind, PaymentMethod, PlanCode, ProposalSource,
        ProposalStatus, SubmitRenewalRequest, SubscriptionStatus, UpdateMemberRequest,
    },
    error::AppError,
    notify::NotificationManager,
    repository::MemberRepository,
    service::ServiceContext,
};
use sqlx::SqlitePool;

async fn setup_with(order_expiry_minutes: i64) -> ServiceContext {
    let pool = SqlitePool::connect(":memory:").await.unwrap();
    sqlx::migrate!("./migrations").run(&pool).await.unwrap();

    let mut settings = Settings::default();
    settings.upi.payee_vpa = Some("gym@upi".to_string());
    settings.upi.order_expiry_minutes = order_expiry_minutes;
    settings.webhook.shared_secret = Some("s3cret".to_string());
    settings.auth.renewal_token_secret = "test-secret".to_string();
    settings.pricing.cache_ttl_secs = 0;

    ServiceContext::new(pool, &settings, Arc::new(NotificationManager::new()))
}

async fn setup() -> ServiceContext {
    setup_with(15).await
}

fn registration(email: &str, phone: &str) -> CreateMemberRequest {
    CreateMemberRequest {
        name: "Ravi Kumar".to_string(),
        email: email.to_string(),
        phone: phone.to_string(),
        plan: PlanCode::OneMonth,
        payment_method: PaymentMethod::Cash,
        start_date: Some(NaiveDate::from_ymd_opt(2025, 3, 1).unwrap()),
    }
}

#[tokio::test]
async fn test_token_verify_returns_masked_summary() -> anyhow::Result<()> {
    let ctx = setup().await;

    let member = ctx
        .member_service
        .register(registration("ravi@example.com", "9876600001"))
        .await?;

    let token = ctx.renewal_service.issue_renewal_token(member.id).await?;
    let summary = ctx.renewal_service.verify_renewal_token(&token).await?;

    assert_eq!(summary.name, "Ravi Kumar");
    assert_eq!(summary.email, "r***@example.com");
    assert_eq!(summary.plan, PlanCode::OneMonth);
    assert_eq!(summary.end_date, member.end_date);

    Ok(())
}

#[tokio::test]
async fn test_bad_tokens_fail_uniformly() -> anyhow::Result<()> {
    let ctx = setup().await;

    for junk in ["", "garbage", "a.b.c"] {
        let err = ctx
            .renewal_service
            .verify_renewal_token(junk)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidToken));
    }

    let err = ctx
        .renewal_service
        .submit_renewal(SubmitRenewalRequest {
            token: "garbage".to_string(),
            plan: PlanCode::Yearly,
            start_date: NaiveDate::from_ymd_opt(2025, 4, 1).unwrap(),
            end_date: NaiveDate::from_ymd_opt(2026, 4, 1).unwrap(),
            payment_method: PaymentMethod::Cash,
        })
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidToken));

    Ok(())
}

#[tokio::test]
async fn test_two_renewals_preserve_original_join_date() -> anyhow::Result<()> {
    let ctx = setup().await;
    let join_date = NaiveDate::from_ymd_opt(2025, 3, 1).unwrap();

    let member = ctx
        .member_service
        .register(registration("twice@example.com", "9876600002"))
        .await?;
    ctx.orchestrator.admin_confirm(member.id).await?;

    // First renewal
    let token = ctx.renewal_service.issue_renewal_token(member.id).await?;
    ctx.renewal_service
        .submit_renewal(SubmitRenewalRequest {
            token,
            plan: PlanCode::ThreeMonth,
            start_date: NaiveDate::from_ymd_opt(2025, 4, 1).unwrap(),
            end_date: NaiveDate::from_ymd_opt(2025, 7, 1).unwrap(),
            payment_method: PaymentMethod::Cash,
        })
        .await?;
    ctx.renewal_service.approve_renewal(member.id).await?;

    let after_first = ctx.member_service.get(member.id).await?;
    assert_eq!(after_first.original_join_date, Some(join_date));
    assert_eq!(after_first.renewal_count, 1);

    // Second renewal
    let token = ctx.renewal_service.issue_renewal_token(member.id).await?;
    let final_start = NaiveDate::from_ymd_opt(2025, 7, 2).unwrap();
    let final_end = NaiveDate::from_ymd_opt(2026, 7, 2).unwrap();
    ctx.renewal_service
        .submit_renewal(SubmitRenewalRequest {
            token,
            plan: PlanCode::Yearly,
            start_date: final_start,
            end_date: final_end,
            payment_method: PaymentMethod::Cash,
        })
        .await?;
    ctx.renewal_service.approve_renewal(member.id).await?;

    let after_second = ctx.member_service.get(member.id).await?;
    // The join date survives both rewrites; the window reflects only the
    // latest renewal.
    assert_eq!(after_second.original_join_date, Some(join_date));
    assert_eq!(after_second.start_date, final_start);
    assert_eq!(after_second.end_date, final_end);
    assert_eq!(after_second.renewal_count, 2);

    // Three recognized entries: join + two renewals
    let ledger = ctx.member_service.ledger(member.id).await?;
    assert_eq!(ledger.len(), 3);
    assert_eq!(ledger[0].kind, LedgerEntryKind::Join);
    assert_eq!(ledger[1].kind, LedgerEntryKind::Renewal);
    assert_eq!(ledger[2].kind, LedgerEntryKind::Renewal);

    // The audit trail captured the previous plan on each submission
    let audits = ctx.member_service.renewal_history(member.id).await?;
    assert_eq!(audits.len(), 2);
    assert_eq!(audits[0].previous_plan, PlanCode::OneMonth);
    assert_eq!(audits[1].previous_plan, PlanCode::ThreeMonth);

    Ok(())
}

#[tokio::test]
async fn test_rejected_renewal_recognizes_no_revenue() -> anyhow::Result<()> {
    let ctx = setup().await;

    let member = ctx
        .member_service
        .register(registration("reject@example.com", "9876600003"))
        .await?;
    ctx.orchestrator.admin_confirm(member.id).await?;

    let token = ctx.renewal_service.issue_renewal_token(member.id).await?;
    ctx.renewal_service
        .submit_renewal(SubmitRenewalRequest {
            token,
            plan: PlanCode::SixMonth,
            start_date: NaiveDate::from_ymd_opt(2025, 4, 1).unwrap(),
            end_date: NaiveDate::from_ymd_opt(2025, 10, 1).unwrap(),
            payment_method: PaymentMethod::Cash,
        })
        .await?;

    let proposal = ctx.member_repo.find_pending_proposal(member.id).await?;
    assert!(proposal.is_some());

    let member_after = ctx.renewal_service.reject_renewal(member.id).await?;
    assert_eq!(member_after.subscription_status, SubscriptionStatus::Expired);

    // The pending proposal is resolved and no ledger entry was added
    assert!(ctx.member_repo.find_pending_proposal(member.id).await?.is_none());
    let ledger = ctx.member_service.ledger(member.id).await?;
    assert_eq!(ledger.len(), 1);

    Ok(())
}

#[tokio::test]
async fn test_legacy_form_routes_through_same_state_machine() -> anyhow::Result<()> {
    let ctx = setup().await;

    let member = ctx
        .member_service
        .register(registration("legacy@example.com", "9876600004"))
        .await?;
    ctx.orchestrator.admin_confirm(member.id).await?;

    let outcome = ctx
        .renewal_service
        .submit_renewal_legacy(member.id, PlanCode::TwoMonth, PaymentMethod::Cash)
        .await?;
    assert_eq!(outcome.member.subscription_status, SubscriptionStatus::Pending);
    assert!(outcome.order.is_none());

    let proposal = ctx
        .member_repo
        .find_pending_proposal(member.id)
        .await?
        .expect("legacy submission should leave a pending proposal");
    assert_eq!(proposal.source, ProposalSource::Legacy);
    assert_eq!(proposal.status, ProposalStatus::Pending);
    assert_eq!(proposal.plan, PlanCode::TwoMonth);

    ctx.renewal_service.approve_renewal(member.id).await?;
    let ledger = ctx.member_service.ledger(member.id).await?;
    assert_eq!(ledger.len(), 2);
    assert_eq!(ledger[1].kind, LedgerEntryKind::Renewal);
    assert_eq!(ledger[1].amount, 2800);

    Ok(())
}

#[tokio::test]
async fn test_resubmission_supersedes_pending_proposal() -> anyhow::Result<()> {
    let ctx = setup().await;

    let member = ctx
        .member_service
        .register(registration("super@example.com", "9876600005"))
        .await?;
    ctx.orchestrator.admin_confirm(member.id).await?;

    ctx.renewal_service
        .submit_renewal_legacy(member.id, PlanCode::TwoMonth, PaymentMethod::Cash)
        .await?;
    ctx.renewal_service
        .submit_renewal_legacy(member.id, PlanCode::Yearly, PaymentMethod::Cash)
        .await?;

    // Only the latest proposal is live
    let proposal = ctx
        .member_repo
        .find_pending_proposal(member.id)
        .await?
        .unwrap();
    assert_eq!(proposal.plan, PlanCode::Yearly);

    ctx.renewal_service.approve_renewal(member.id).await?;
    assert!(ctx.member_repo.find_pending_proposal(member.id).await?.is_none());

    Ok(())
}

#[tokio::test]
async fn test_sweep_expires_and_reminds() -> anyhow::Result<()> {
    let ctx = setup().await;
    let today = Utc::now().date_naive();

    // A member whose window lapsed long ago
    let lapsed = ctx
        .member_service
        .register(CreateMemberRequest {
            name: "Lapsed Member".to_string(),
            email: "lapsed@example.com".to_string(),
            phone: "9876600006".to_string(),
            plan: PlanCode::OneMonth,
            payment_method: PaymentMethod::Cash,
            start_date: Some(today - Duration::days(90)),
        })
        .await?;
    ctx.orchestrator.admin_confirm(lapsed.id).await?;

    // A member expiring in three days
    let expiring = ctx
        .member_service
        .register(registration("soon@example.com", "9876600007"))
        .await?;
    ctx.orchestrator.admin_confirm(expiring.id).await?;
    ctx.member_service
        .update(
            expiring.id,
            UpdateMemberRequest {
                end_date: Some(today + Duration::days(3)),
                ..Default::default()
            },
        )
        .await?;

    let report = ctx.expiry_service.run_sweep().await?;
    assert_eq!(report.expired, 1);
    assert_eq!(report.expiring_soon, 1);

    let member = ctx.member_service.get(lapsed.id).await?;
    assert_eq!(member.subscription_status, SubscriptionStatus::Expired);

    // Rerunning against the already-expired member is a no-op
    let rerun = ctx.expiry_service.run_sweep().await?;
    assert_eq!(rerun.expired, 0);

    Ok(())
}

#[tokio::test]
async fn test_sweep_expires_stale_orders() -> anyhow::Result<()> {
    // Orders expire immediately in this context
    let ctx = setup_with(0).await;

    let member = ctx
        .member_service
        .register(registration("stale@example.com", "9876600008"))
        .await?;
    ctx.orchestrator
        .create_order(member.id, None, None, false)
        .await?;

    tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    let report = ctx.expiry_service.run_sweep().await?;
    assert_eq!(report.orders_expired, 1);

    Ok(())
}
