use anyhow::Context;
use duka_api::{app, worker, AppState, AuthConfig};
use duka_order::{DeliveryService, InvoiceNotifier, OrderManager, Outbox, OutboxWorker, PaymentOrchestrator};
use duka_store::{app_config::Config, HttpMailRelay, MpesaGateway, Stores};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "duka_api=debug,duka_order=debug,tower_http=debug,axum::rejection=trace".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load().context("Failed to load config")?;
    tracing::info!("Starting Duka API on port {}", config.server.port);
    tracing::info!(
        "Lifecycle policy: transitions={:?} payment={:?}",
        config.lifecycle.transitions,
        config.lifecycle.payment
    );

    let stores = Stores::open(&config.database).await.context("Failed to open stores")?;
    let gateway = MpesaGateway::from_config(&config.mpesa).context("Failed to build payment gateway")?;
    let relay = HttpMailRelay::from_config(&config.mail).context("Failed to build mail relay")?;

    let deliveries = DeliveryService::new(stores.deliveries.clone());
    let notifier = Arc::new(InvoiceNotifier::new(
        stores.directory.clone(),
        Arc::new(relay),
        stores.notifications.clone(),
    ));

    // Follow-up jobs
    let (outbox, jobs) = Outbox::channel(config.outbox.capacity);
    let outbox_worker = OutboxWorker::new(
        stores.orders.clone(),
        deliveries.clone(),
        notifier,
        config.outbox.retry,
    )
    .with_concurrency(config.outbox.concurrency);
    worker::start_outbox_worker(outbox_worker, jobs);

    let manager = Arc::new(OrderManager::new(
        stores.orders.clone(),
        deliveries.clone(),
        PaymentOrchestrator::new(Arc::new(gateway)),
        outbox,
        config.lifecycle,
    ));

    let app_state = AppState {
        manager,
        deliveries,
        notifications: stores.notifications.clone(),
        auth: AuthConfig {
            secret: config.auth.jwt_secret.clone(),
        },
    };

    let app = app(app_state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
