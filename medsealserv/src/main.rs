mod auth;
mod config;
mod db;
mod handlers;

use anyhow::Context;
use clap::Parser;
use tracing::info;

use actix_web::{
    App,
    HttpServer,
    middleware::Logger
};

use actix_cors::Cors;
use actix_web::web::{self};
use medseal::server::context::{BootstrapError, ServerContext};

use crate::config::Config;

const DEFAULT_LOG_FILTER: &str = "info,actix_server=warn,actix_http::h1::dispatcher=off";

fn routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
            web::scope("/auth")
                .route("/public-key", web::get().to(handlers::public_key))
                .route("/get-public-key", web::get().to(handlers::public_key))
                .route("/login", web::post().to(handlers::login))
                .route("/register", web::post().to(handlers::register))
        )
        .service(
            web::scope("/patients")
                .route("", web::get().to(handlers::list_patients))
                .route("", web::post().to(handlers::create_patient))
                .route("/{id}", web::get().to(handlers::get_patient))
                .route("/{id}", web::put().to(handlers::update_patient))
                .route("/{id}", web::delete().to(handlers::delete_patient))
        );
}

/// Every route is served under `/api` and at the root.
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(web::scope("/api").configure(routes))
        .configure(routes);
}

fn report_bootstrap_error(e: &BootstrapError) {
    match e {
        BootstrapError::Crypto(crypto) if crypto.is_startup_fatal() => {
            tracing::error!("❌ Server key material rejected, refusing to serve: {}", crypto);
        }
        BootstrapError::Crypto(crypto) => tracing::error!("❌ Startup crypto failure: {}", crypto),
        BootstrapError::Secret(secret) => tracing::error!("❌ Startup secret unavailable: {}", secret),
    }
}

/// Browser UI origin; credentials are allowed so the bearer header survives preflight.
fn cors_policy(origin: &str) -> Cors {
    Cors::default()
        .allowed_origin(origin)
        .allowed_methods(vec!["GET", "POST", "PUT", "DELETE"])
        .allow_any_header()
        .supports_credentials()
        .max_age(3600)
}

fn init_tracing() -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(DEFAULT_LOG_FILTER));
    let timer = tracing_subscriber::fmt::time::ChronoLocal::new("%Y-%m-%dT%H:%M:%S".to_string());

    if std::env::var("SERVER_LOG").unwrap_or_default() == "true" {
        let file_appender = tracing_appender::rolling::RollingFileAppender::new(
            tracing_appender::rolling::Rotation::DAILY,
            "./logs",
            "medseal-server.log"
        );
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

        tracing_subscriber::fmt()
            .with_writer(tracing_subscriber::fmt::writer::MakeWriterExt::and(non_blocking, std::io::stdout))
            .with_file(true)
            .with_line_number(true)
            .with_env_filter(filter)
            .with_timer(timer)
            .init();

        Some(guard)
    } else {
        tracing_subscriber::fmt()
            .with_writer(std::io::stdout)
            .with_file(true)
            .with_line_number(true)
            .with_env_filter(filter)
            .with_timer(timer)
            .init();

        None
    }
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::parse();
    let _guard = init_tracing();

    // Initialize SQLite database
    let db_pool = db::init::init_db(&config.database_url)
        .map_err(|e| anyhow::anyhow!("Failed to open database {}: {}", config.database_url, e))?;
    db::init::run_migrations(&db_pool)
        .map_err(|e| anyhow::anyhow!("Failed to create database tables: {}", e))?;
    if config.seed {
        db::init::seed_demo_data(&db_pool)
            .map_err(|e| anyhow::anyhow!("Failed to seed demo data: {}", e))?;
    }
    info!("✅ Database initialized");

    // Key store and token issuer are built once and shared read-only by all workers
    let provider = config.secret_provider();
    let server_context = ServerContext::bootstrap(provider.as_ref(), &config.jwt_issuer, &config.jwt_audience)
        .inspect_err(report_bootstrap_error)
        .context("Failed to load startup secrets")?;
    let server_context = web::Data::new(server_context);

    let db_data = web::Data::new(db_pool);
    let bind = (config.host.clone(), config.port);
    let cors_origin = config.cors_origin.clone();
    if config.is_development() {
        tracing::warn!("Development mode: error responses include diagnostic details");
    }
    let config_data = web::Data::new(config);

    info!("Server starting on http://{}:{}/ (CORS origin {})", bind.0, bind.1, cors_origin);

    HttpServer::new(move || {
        App::new()
            .app_data(server_context.clone())
            .app_data(db_data.clone())
            .app_data(config_data.clone())
            .wrap(cors_policy(&cors_origin))
            .wrap(Logger::default())
            .configure(configure_routes)
    })
    .bind(bind)?
    .run()
    .await?;

    Ok(())
}
