//! OpenSASE Storefront - order and payment reconciliation service

use std::sync::Arc;

use anyhow::Result;
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use opensase_storefront::admin::AdminStatusController;
use opensase_storefront::api::{self, AppState};
use opensase_storefront::config::AppConfig;
use opensase_storefront::notify::{EmailSender, ExpoPushSender, NotificationDispatcher, SmtpEmailSender};
use opensase_storefront::payment::StripeGateway;
use opensase_storefront::publisher::EventPublisher;
use opensase_storefront::reconciler::OrderReconciler;
use opensase_storefront::store::{
    MemoryOrderStore, MemoryPushRecipientStore, OrderStore, PgOrderStore, PgPushRecipientStore, PushRecipientStore,
};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::from_env()?;

    let (orders, push_recipients): (Arc<dyn OrderStore>, Arc<dyn PushRecipientStore>) = match &config.database_url {
        Some(url) => {
            let db = PgPoolOptions::new().max_connections(10).connect(url).await?;
            sqlx::migrate!("./migrations").run(&db).await?;
            (Arc::new(PgOrderStore::new(db.clone())), Arc::new(PgPushRecipientStore::new(db)))
        }
        None => {
            tracing::warn!("DATABASE_URL not set; orders are kept in memory only");
            (Arc::new(MemoryOrderStore::new()), Arc::new(MemoryPushRecipientStore::new()))
        }
    };

    let nats = match &config.nats_url {
        Some(url) => match async_nats::connect(url.as_str()).await {
            Ok(client) => Some(client),
            Err(e) => {
                tracing::warn!(error = %e, "NATS unavailable; domain events will only be logged");
                None
            }
        },
        None => None,
    };
    let publisher = EventPublisher::new(nats);

    let email: Option<Arc<dyn EmailSender>> = match config.email.clone() {
        Some(cfg) => Some(Arc::new(SmtpEmailSender::new(cfg))),
        None => {
            tracing::warn!("SMTP_HOST not set; confirmation emails are disabled");
            None
        }
    };
    let notifier = Arc::new(NotificationDispatcher::new(
        push_recipients.clone(),
        Arc::new(ExpoPushSender::new(config.push_endpoint.clone())?),
        email,
    ));
    let gateway = Arc::new(StripeGateway::new(config.stripe.clone())?);

    let reconciler = OrderReconciler::new(orders.clone(), gateway, notifier, publisher.clone(), config.checkout.clone());
    let state = AppState {
        reconciler: Arc::new(reconciler),
        admin: Arc::new(AdminStatusController::new(orders, publisher)),
        push_recipients,
        webhook_secret: Arc::from(config.webhook_secret.as_str()),
    };

    let app = api::router(state);
    tracing::info!("🚀 OpenSASE Storefront listening on 0.0.0.0:{}", config.port);
    axum::serve(tokio::net::TcpListener::bind(format!("0.0.0.0:{}", config.port)).await?, app).await?;
    Ok(())
}
