use std::time::Duration;

use actix_web::{dev::Server, http::KeepAlive, middleware::Logger, web, App, HttpServer};
use campfund_engine::{
    DonationApi,
    HttpWalletService,
    IdempotencyGuard,
    ReconciliationApi,
    SqliteDatabase,
    WebhookIngestor,
};
use log::*;

use crate::{
    cache::ServerCache,
    config::ServerConfig,
    errors::ServerError,
    event_handlers::create_event_handlers,
    outbox_worker::start_outbox_worker,
    routes::{health, BankFeedWebhookRoute, CreateDonationRoute, PushWebhookRoute},
    scheduler_worker::start_scheduler_workers,
};

pub async fn run_server(config: ServerConfig) -> Result<(), ServerError> {
    let db = SqliteDatabase::new_with_url(&config.database_url, config.max_connections)
        .await
        .map_err(|e| ServerError::InitializeError(e.to_string()))?;
    if config.run_migrations {
        db.migrate().await.map_err(|e| ServerError::InitializeError(e.to_string()))?;
    }
    let cache = ServerCache::from_config(&config).await;
    let wallet = HttpWalletService::new(config.wallet.clone())
        .map_err(|e| ServerError::ConfigurationError(format!("Invalid wallet service configuration. {e}")))?;

    let handlers = create_event_handlers();
    let producers = handlers.producers();
    handlers.start_handlers().await;
    let _outbox = start_outbox_worker(db.clone(), wallet, cache.clone(), producers, config.outbox.clone());
    let _scheduler = start_scheduler_workers(db.clone(), config.scheduler.clone());

    info!("🚀️ Starting server on {}:{}", config.host, config.port);
    let srv = create_server_instance(config, db, cache)?;
    srv.await.map_err(|e| ServerError::Unspecified(e.to_string()))
}

pub fn create_server_instance(
    config: ServerConfig,
    db: SqliteDatabase,
    cache: ServerCache,
) -> Result<Server, ServerError> {
    let srv = HttpServer::new(move || {
        let guard = IdempotencyGuard::new(cache.clone()).with_ttl(config.idempotency_ttl);
        let reconciliation_api = ReconciliationApi::new(db.clone(), config.holding_account_id.clone());
        let ingestor = WebhookIngestor::new(guard, reconciliation_api);
        let donation_api = DonationApi::new(db.clone());
        App::new()
            .wrap(Logger::new("%t (%D ms) %s %a %{Host}i %U").log_target("cfs::access_log"))
            .app_data(web::Data::new(ingestor))
            .app_data(web::Data::new(donation_api))
            .service(health)
            .service(CreateDonationRoute::<SqliteDatabase>::new())
            .service(PushWebhookRoute::<SqliteDatabase, ServerCache>::new())
            .service(BankFeedWebhookRoute::<SqliteDatabase, ServerCache>::new())
    })
    .keep_alive(KeepAlive::Timeout(Duration::from_secs(600)))
    .bind((config.host.as_str(), config.port))?
    .run();
    Ok(srv)
}
