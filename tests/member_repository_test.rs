use chrono::NaiveDate;
use fitdesk::{
    domain::{NewMember, PaymentMethod, PaymentStatus, PlanCode, SubscriptionStatus, UpdateMemberRequest},
    repository::{MemberRepository, SqliteMemberRepository},
};
use sqlx::SqlitePool;

async fn setup() -> SqlitePool {
    let pool = SqlitePool::connect(":memory:").await.unwrap();
    sqlx::migrate!("./migrations").run(&pool).await.unwrap();
    pool
}

fn new_member(email: &str, phone: &str) -> NewMember {
    NewMember {
        name: "Test Member".to_string(),
        email: email.to_string(),
        phone: phone.to_string(),
        plan: PlanCode::OneMonth,
        start_date: NaiveDate::from_ymd_opt(2025, 1, 15).unwrap(),
        end_date: NaiveDate::from_ymd_opt(2025, 2, 15).unwrap(),
        payment_method: PaymentMethod::Cash,
    }
}

#[tokio::test]
async fn test_member_crud() -> anyhow::Result<()> {
    let pool = setup().await;
    let repo = SqliteMemberRepository::new(pool.clone());

    // Test Create: new members start pending/pending
    let member = repo.create(new_member("test@example.com", "9876543210")).await?;
    assert_eq!(member.email, "test@example.com");
    assert_eq!(member.payment_status, PaymentStatus::Pending);
    assert_eq!(member.subscription_status, SubscriptionStatus::Pending);
    assert_eq!(member.renewal_count, 0);
    assert!(member.original_join_date.is_none());

    // Test Find by ID
    let found = repo.find_by_id(member.id).await?;
    assert!(found.is_some());
    assert_eq!(found.unwrap().id, member.id);

    // Test Find by Email / Phone
    assert!(repo.find_by_email("test@example.com").await?.is_some());
    assert!(repo.find_by_phone("9876543210").await?.is_some());

    // Test List
    let members = repo.list(10, 0).await?;
    assert_eq!(members.len(), 1);

    // Test Update
    let updated = repo
        .update(
            member.id,
            UpdateMemberRequest {
                subscription_status: Some(SubscriptionStatus::Active),
                plan: Some(PlanCode::ThreeMonth),
                ..Default::default()
            },
        )
        .await?;
    assert_eq!(updated.subscription_status, SubscriptionStatus::Active);
    assert_eq!(updated.plan, PlanCode::ThreeMonth);
    // Untouched fields survive the partial update
    assert_eq!(updated.email, "test@example.com");

    Ok(())
}

#[tokio::test]
async fn test_soft_delete_anonymizes_but_keeps_row() -> anyhow::Result<()> {
    let pool = setup().await;
    let repo = SqliteMemberRepository::new(pool.clone());

    let member = repo.create(new_member("gone@example.com", "9876500000")).await?;
    let deleted = repo.soft_delete(member.id).await?;

    assert!(deleted.deleted);
    assert!(deleted.deleted_at.is_some());
    assert_ne!(deleted.name, "Test Member");
    assert_ne!(deleted.email, "gone@example.com");
    assert_ne!(deleted.phone, "9876500000");

    // Still addressable by id, absent from listings
    assert!(repo.find_by_id(member.id).await?.is_some());
    assert!(repo.list(10, 0).await?.is_empty());

    // Deleting twice is a no-op returning the stored record
    let again = repo.soft_delete(member.id).await?;
    assert_eq!(again.email, deleted.email);

    Ok(())
}

#[tokio::test]
async fn test_expiry_queries_are_guarded() -> anyhow::Result<()> {
    let pool = setup().await;
    let repo = SqliteMemberRepository::new(pool.clone());

    let mut lapsed = new_member("lapsed@example.com", "9876511111");
    lapsed.start_date = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
    lapsed.end_date = NaiveDate::from_ymd_opt(2024, 2, 1).unwrap();
    let lapsed = repo.create(lapsed).await?;
    repo.update(
        lapsed.id,
        UpdateMemberRequest {
            subscription_status: Some(SubscriptionStatus::Active),
            ..Default::default()
        },
    )
    .await?;

    let today = chrono::Utc::now().date_naive();
    let found = repo.list_lapsed(today).await?;
    assert_eq!(found.len(), 1);

    // First flip wins, the rerun is a no-op
    assert!(repo.mark_expired(lapsed.id).await?);
    assert!(!repo.mark_expired(lapsed.id).await?);
    assert!(repo.list_lapsed(today).await?.is_empty());

    Ok(())
}
