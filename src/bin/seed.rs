use chrono::{Duration, Utc};
use clap::Parser;
use fake::{faker::name::en::Name, Fake};
use rand::Rng;
use sqlx::sqlite::SqlitePoolOptions;
use std::sync::Arc;

use fitdesk::{
    config::Settings,
    domain::{CreateMemberRequest, PaymentMethod, PlanCode},
    notify::NotificationManager,
    service::ServiceContext,
};

/// Seeds a database with demo members, payments, and renewals.
#[derive(Parser)]
struct Args {
    /// Number of members to create
    #[arg(long, default_value_t = 20)]
    members: usize,

    /// Database URL (falls back to DATABASE_URL, then sqlite:fitdesk.db)
    #[arg(long)]
    database_url: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    println!("🌱 Starting database seeding...");

    let database_url = args
        .database_url
        .or_else(|| std::env::var("DATABASE_URL").ok())
        .unwrap_or_else(|| "sqlite:fitdesk.db".to_string());

    let db_pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await?;

    println!("📋 Running migrations...");
    sqlx::migrate!("./migrations").run(&db_pool).await?;

    let mut settings = Settings::default();
    settings.upi.payee_vpa = Some("fitdesk@upi".to_string());

    let notifier = Arc::new(NotificationManager::new());
    let services = ServiceContext::new(db_pool, &settings, notifier);

    let plans = [
        PlanCode::OneMonth,
        PlanCode::TwoMonth,
        PlanCode::ThreeMonth,
        PlanCode::SixMonth,
        PlanCode::Yearly,
    ];

    println!("👥 Creating {} members...", args.members);
    let mut rng = rand::thread_rng();
    let mut created = Vec::new();

    for i in 0..args.members {
        let name: String = Name().fake();
        let slug: String = name
            .to_lowercase()
            .chars()
            .map(|c| if c == ' ' { '.' } else { c })
            .filter(|c| c.is_ascii_alphanumeric() || *c == '.')
            .collect();
        let plan = plans[rng.gen_range(0..plans.len())];
        let payment_method = if rng.gen_bool(0.5) {
            PaymentMethod::Cash
        } else {
            PaymentMethod::Online
        };
        // Spread start dates into the past so the expiry sweep has work.
        let start_date = Utc::now().date_naive() - Duration::days(rng.gen_range(0..400));

        let member = services
            .member_service
            .register(CreateMemberRequest {
                name,
                email: format!("{}.{}@example.com", slug, i),
                phone: format!("9{:09}", rng.gen_range(0..1_000_000_000u64)),
                plan,
                payment_method,
                start_date: Some(start_date),
            })
            .await?;
        created.push(member);
    }
    println!("  ✅ Created {} members", created.len());

    println!("💳 Confirming payments for roughly two thirds...");
    let mut confirmed = 0;
    for member in &created {
        if rng.gen_bool(0.66) {
            services.orchestrator.admin_confirm(member.id).await?;
            confirmed += 1;
        }
    }
    println!("  ✅ Confirmed {} payments", confirmed);

    println!("🔁 Submitting a few renewals...");
    let mut renewed = 0;
    for member in created.iter().take(4) {
        let plan = plans[rng.gen_range(0..plans.len())];
        services
            .renewal_service
            .submit_renewal_legacy(member.id, plan, PaymentMethod::Cash)
            .await?;
        services.renewal_service.approve_renewal(member.id).await?;
        renewed += 1;
    }
    println!("  ✅ Renewed {} members", renewed);

    println!("📱 Creating a couple of open UPI orders...");
    for member in created.iter().rev().take(2) {
        let order = services
            .orchestrator
            .create_order(member.id, None, None, false)
            .await?;
        println!("  🧾 {} → {}", member.name, order.id);
    }

    println!("🎉 Seeding complete!");
    Ok(())
}
