use std::sync::Arc;

use sqlx::sqlite::SqlitePoolOptions;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use fitdesk::{
    api,
    config::Settings,
    notify::{EmailSink, NotificationManager, WhatsAppSink},
    service::ServiceContext,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "fitdesk=debug,tower_http=debug,axum=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let settings = Settings::new().unwrap_or_else(|e| {
        tracing::warn!("Failed to load config: {}. Using defaults.", e);
        Settings::default()
    });
    settings.validate().map_err(|e| anyhow::anyhow!(e))?;

    tracing::info!(
        "Starting Fitdesk server on {}:{}",
        settings.server.host,
        settings.server.port
    );

    // Initialize database
    let db_pool = SqlitePoolOptions::new()
        .max_connections(settings.database.max_connections)
        .connect(&settings.database.url)
        .await?;

    // Run migrations
    sqlx::migrate!("./migrations").run(&db_pool).await?;

    // Register notification sinks
    let notifier = Arc::new(NotificationManager::new());
    if let Some(email) = EmailSink::new(settings.notifications.smtp.clone()) {
        notifier.register(Arc::new(email)).await;
    }
    if let Some(whatsapp) = WhatsAppSink::new(settings.notifications.whatsapp.clone()) {
        notifier.register(Arc::new(whatsapp)).await;
    }

    // Wire repositories, the orchestrator, and the services
    let services = Arc::new(ServiceContext::new(db_pool, &settings, notifier));

    // Background expiry sweep, midnight-aligned
    services.expiry_service.clone().spawn();

    let app = api::create_app(services, Arc::new(settings.clone()));

    let listener = tokio::net::TcpListener::bind(format!(
        "{}:{}",
        settings.server.host, settings.server.port
    ))
    .await?;

    tracing::info!(
        "Server listening on http://{}:{}",
        settings.server.host,
        settings.server.port
    );

    axum::serve(listener, app).await?;

    Ok(())
}
