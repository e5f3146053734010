//! Campaign Dialer Server
//!
//! Places outbound voice calls through a telephony provider under a
//! daily/monthly budget, and ingests the provider's status callbacks.

use actix_cors::Cors;
use actix_web::{http::header, middleware, web, App, HttpResponse, HttpServer};
use anyhow::Context;
use dialer_api::{configure_routes, AppState};
use dialer_core::config::{AppConfig, ProviderKind};
use dialer_core::traits::{BudgetRepository, CallRepository, ContactRepository, ProviderClient};
use dialer_db::{
    create_pool, run_migrations, InMemoryStore, PgBudgetRepository, PgCallRepository,
    PgContactRepository,
};
use dialer_provider::{FakeProviderClient, TwilioClient};
use dialer_services::{
    BatchEnqueuer, BudgetLedgerService, CancellationService, ContactService, JobProcessor,
    JobScheduler, RetryPolicy, StatusIngestion,
};
use std::env;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_actix_web::TracingLogger;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Repositories backing the services
struct Storage {
    calls: Arc<dyn CallRepository>,
    contacts: Arc<dyn ContactRepository>,
    budget: Arc<dyn BudgetRepository>,
}

/// Initialize tracing/logging
///
/// `LOG_FORMAT=json` switches to one JSON object per line.
fn init_tracing() {
    let log_level = env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "campaign_dialer={lvl},dialer_api={lvl},dialer_services={lvl},dialer_provider={lvl},dialer_db={lvl},actix_web=info,sqlx=warn",
            lvl = log_level
        ))
    });

    let json = env::var("LOG_FORMAT")
        .map(|f| f.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let registry = tracing_subscriber::registry().with(env_filter);
    if json {
        registry
            .with(fmt::layer().json().with_current_span(true))
            .init();
    } else {
        registry
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_file(true)
                    .with_line_number(true),
            )
            .init();
    }
}

async fn open_storage(config: &AppConfig) -> anyhow::Result<Storage> {
    match config.database.url.as_deref() {
        Some(url) if !url.trim().is_empty() => {
            info!("Connecting to database...");
            let pool = create_pool(url, &config.database)
                .await
                .context("failed to create database pool")?;
            run_migrations(&pool)
                .await
                .context("failed to run migrations")?;
            info!(
                "Database connection established with {} max connections",
                config.database.max_connections
            );

            Ok(Storage {
                calls: Arc::new(PgCallRepository::new(pool.clone())),
                contacts: Arc::new(PgContactRepository::new(pool.clone())),
                budget: Arc::new(PgBudgetRepository::new(pool)),
            })
        }
        _ => {
            warn!("No database.url configured; state lives in memory and is lost on restart");
            let store = Arc::new(InMemoryStore::new());
            Ok(Storage {
                calls: store.clone(),
                contacts: store.clone(),
                budget: store,
            })
        }
    }
}

fn build_provider(config: &AppConfig) -> anyhow::Result<Arc<dyn ProviderClient>> {
    let pricing = config.pricing.table()?;
    let safety = config.safety.policy();

    let provider: Arc<dyn ProviderClient> = match config.provider.kind {
        ProviderKind::Twilio => Arc::new(TwilioClient::new(&config.provider, pricing, safety)?),
        ProviderKind::Fake => {
            warn!("Using the fake provider; no real calls will be placed");
            Arc::new(FakeProviderClient::new(pricing, safety))
        }
    };
    Ok(provider)
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    init_tracing();

    info!("Starting Campaign Dialer v{}", env!("CARGO_PKG_VERSION"));

    let config = AppConfig::load().context("failed to load configuration")?;
    config.validate()?;

    let storage = open_storage(&config).await?;
    let provider = build_provider(&config)?;

    let (daily_limit, monthly_limit) = config.budget.limits()?;
    let budget = Arc::new(
        BudgetLedgerService::open(
            storage.budget.clone(),
            &config.budget.name,
            daily_limit,
            monthly_limit,
        )
        .await?,
    );

    let processor = Arc::new(JobProcessor::new(
        storage.calls.clone(),
        provider.clone(),
        budget.clone(),
        RetryPolicy::from(&config.dialer),
        &config.provider.status_callback_base_url,
        config.provider.call_timeout_secs,
    ));
    let scheduler = Arc::new(JobScheduler::new(
        processor.clone(),
        config.dialer.worker_concurrency,
    ));
    let contacts = Arc::new(ContactService::new(
        storage.contacts.clone(),
        config.safety.policy(),
    ));

    let enqueuer = Arc::new(BatchEnqueuer::new(
        contacts.clone(),
        storage.calls.clone(),
        processor,
        scheduler.clone(),
    ));
    enqueuer
        .resume_unplaced()
        .await
        .context("failed to resume unplaced calls")?;

    let state = web::Data::new(AppState {
        calls: storage.calls.clone(),
        budget,
        contacts,
        enqueuer,
        ingestion: Arc::new(StatusIngestion::new(storage.calls.clone(), provider.clone())),
        cancellation: Arc::new(CancellationService::new(
            storage.calls.clone(),
            provider,
            scheduler.clone(),
        )),
        default_inter_call_delay: Duration::from_secs(config.dialer.default_inter_call_delay_secs),
    });

    // CORS configuration
    let cors_origins = env::var("CORS_ORIGINS")
        .unwrap_or_else(|_| "http://localhost:3000,http://127.0.0.1:3000".to_string());

    let bind_addr = config.server_addr();
    let workers = config.server.workers.max(1);
    info!(
        "Starting HTTP server on {} with {} workers",
        bind_addr, workers
    );

    HttpServer::new(move || {
        let cors_origins_inner = cors_origins.clone();
        let cors = Cors::default()
            .allowed_origin_fn(move |origin, _req_head| {
                origin
                    .to_str()
                    .map(|o| cors_origins_inner.split(',').any(|allowed| allowed.trim() == o))
                    .unwrap_or(false)
            })
            .allowed_methods(vec!["GET", "POST", "PUT", "DELETE", "OPTIONS"])
            .allowed_headers(vec![header::ACCEPT, header::CONTENT_TYPE])
            .max_age(3600);

        App::new()
            .app_data(state.clone())
            .app_data(web::QueryConfig::default().error_handler(|err, _req| {
                let error_message = err.to_string();
                actix_web::error::InternalError::from_response(
                    err,
                    HttpResponse::BadRequest().json(serde_json::json!({
                        "error": "invalid_query",
                        "message": error_message
                    })),
                )
                .into()
            }))
            .app_data(web::JsonConfig::default().error_handler(|err, _req| {
                let error_message = err.to_string();
                actix_web::error::InternalError::from_response(
                    err,
                    HttpResponse::BadRequest().json(serde_json::json!({
                        "error": "invalid_json",
                        "message": error_message
                    })),
                )
                .into()
            }))
            // Middleware
            .wrap(cors)
            .wrap(TracingLogger::default())
            .wrap(middleware::Logger::new("%a \"%r\" %s %b %Dms"))
            .wrap(middleware::Compress::default())
            .wrap(middleware::NormalizePath::trim())
            .configure(configure_routes)
            .route(
                "/",
                web::get().to(|| async {
                    HttpResponse::Found()
                        .append_header(("Location", "/api/v1/health"))
                        .finish()
                }),
            )
    })
    .workers(workers)
    .bind(&bind_addr)?
    .run()
    .await?;

    scheduler.shutdown();
    info!("Campaign Dialer stopped");
    Ok(())
}
