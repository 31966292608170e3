mod api;
mod dao;
mod model;
mod service;

use std::thread;
use std::time::Duration;

use crate::api::endpoints::{
    artists_add, artists_delete, artists_get, artists_list, artists_me, artists_nationalities, artists_performance, artists_update, authenticate, chart_entries_add, chart_entries_by_artist,
    chart_entries_by_manager, chart_entries_delete, chart_entries_get, chart_entries_list, chart_entries_upsert, charts_add, charts_by_country, charts_countries, charts_delete, charts_get,
    charts_list, clusters_add, clusters_delete, clusters_development, clusters_get, clusters_list, countries_add, countries_delete, countries_get, countries_list, countries_update,
    export_potential, logout, token_refresh, users_add, users_assign_role, users_delete, users_get, users_list, users_me, users_update,
};
use crate::api::middleware::timing_middleware;
use crate::api::security::JwtSecurityService;
use crate::api::state::AppState;
use crate::dao::artists::ArtistDao;
use crate::dao::charts::ChartDao;
use crate::dao::clusters::ClusterDao;
use crate::dao::countries::CountryDao;
use crate::dao::tokens::TokenDao;
use crate::dao::users::UserDao;
use crate::model::apperror::{ApplicationError, ErrorType};
use crate::model::config::{ApplicationArguments, BatchCommand, DatabaseType, HttpsConfig, LoggingConfig};
use crate::service::analysis::ExportAnalysisService;
use crate::service::artists::ArtistService;
use crate::service::charts::ChartService;
use crate::service::countries::CountryService;
use crate::service::loader::DatasetLoaderService;
use crate::service::seed::SeedService;
use crate::service::users::UserService;

use actix_web::middleware::from_fn;
use actix_web::{App, HttpServer, web};
use actix_web_prom::{PrometheusMetrics, PrometheusMetricsBuilder};
use clap::Parser;
use prometheus::IntGauge;
use rustls::pki_types::PrivateKeyDer;
use rustls::{ServerConfig, SupportedProtocolVersion};
use rustls_pemfile::{certs, pkcs8_private_keys};
use sqlx::{Pool, Postgres, pool};
use tracing_subscriber::EnvFilter;

/**
 * Entry point. Starts the HTTP server, or runs a batch command against
 * the database and exits.
 */
#[actix_web::main]
async fn main() -> std::io::Result<()> {
    let args = ApplicationArguments::parse();

    let config = get_config(&args.config_file)?;

    init_logging(&config.logging)?;

    let connection_pool: Pool<Postgres> = match config.clone().database.db_type {
        DatabaseType::Postgresql { connection_string, max_connections, min_connections, acquire_timeout, acquire_slow_threshold, idle_timeout, max_lifetime } => pool::PoolOptions::new()
            .max_connections(max_connections)
            .min_connections(min_connections)
            .acquire_timeout(Duration::from_millis(acquire_timeout))
            .acquire_slow_threshold(Duration::from_millis(acquire_slow_threshold))
            .idle_timeout(Duration::from_millis(idle_timeout))
            .max_lifetime(Duration::from_millis(max_lifetime))
            .connect(connection_string.as_str())
            .await
            .map_err(|err| std::io::Error::other(format!("Failed to create database pool: {err}")))?,
    };

    sqlx::migrate!("./migrations").run(&connection_pool).await.map_err(|err| std::io::Error::other(format!("Failed to run migrations: {err}")))?;

    if let Some(command) = args.command {
        return run_batch_command(command, connection_pool).await;
    }

    let jwt_service = JwtSecurityService::new(&config.auth).map_err(|err| std::io::Error::other(format!("Failed to create JWT service: {err}")))?;
    let user_service = UserService::new(UserDao::new(), ArtistDao::new(), CountryDao::new(), TokenDao::new(), connection_pool.clone());
    let artist_service = ArtistService::new(ArtistDao::new(), ChartDao::new(), UserDao::new(), connection_pool.clone());
    let chart_service = ChartService::new(ChartDao::new(), CountryDao::new(), ArtistDao::new(), UserDao::new(), connection_pool.clone());
    let country_service = CountryService::new(CountryDao::new(), ClusterDao::new(), connection_pool.clone());
    let analysis_service = ExportAnalysisService::new(ArtistDao::new(), ChartDao::new(), ClusterDao::new(), connection_pool.clone());

    let state = web::Data::new(AppState::new(jwt_service, user_service, artist_service, chart_service, country_service, analysis_service));

    let prometheus = PrometheusMetricsBuilder::new("")
        .endpoint("/metrics")
        .mask_unmatched_patterns("UNKNOWN")
        .build()
        .map_err(|err| std::io::Error::other(format!("Failed to create Prometheus metrics: {err}")))?;

    // Initialize custom metrics
    let max_connections_gauge = IntGauge::new("max_connections", "Connection pool maximum").map_err(|err| std::io::Error::other(format!("Failed to create max_connections gauge: {err}")))?;
    let min_connections_gauge = IntGauge::new("min_connections", "Connection pool minimum").map_err(|err| std::io::Error::other(format!("Failed to create min_connections gauge: {err}")))?;
    let active_connections_gauge = IntGauge::new("active_connections", "Connection pool active").map_err(|err| std::io::Error::other(format!("Failed to create active_connections gauge: {err}")))?;
    let idle_connections_gauge = IntGauge::new("idle_connections", "Connection pool idle").map_err(|err| std::io::Error::other(format!("Failed to create idle_connections gauge: {err}")))?;
    register_prometheus_metrics(&prometheus, &max_connections_gauge)?;
    register_prometheus_metrics(&prometheus, &min_connections_gauge)?;
    register_prometheus_metrics(&prometheus, &active_connections_gauge)?;
    register_prometheus_metrics(&prometheus, &idle_connections_gauge)?;

    gather_db_metrics(max_connections_gauge, min_connections_gauge, active_connections_gauge, idle_connections_gauge, connection_pool);

    let server_init = HttpServer::new(move || {
        App::new()
            .wrap(prometheus.clone())
            .wrap(from_fn(timing_middleware))
            .app_data(state.clone())
            .service(authenticate)
            .service(token_refresh)
            .service(logout)
            .service(users_me)
            .service(users_add)
            .service(users_list)
            .service(users_assign_role)
            .service(users_get)
            .service(users_update)
            .service(users_delete)
            .service(artists_me)
            .service(artists_nationalities)
            .service(artists_add)
            .service(artists_list)
            .service(artists_performance)
            .service(artists_get)
            .service(artists_update)
            .service(artists_delete)
            .service(countries_add)
            .service(countries_list)
            .service(countries_get)
            .service(countries_update)
            .service(countries_delete)
            .service(charts_countries)
            .service(charts_by_country)
            .service(charts_add)
            .service(charts_list)
            .service(charts_get)
            .service(charts_delete)
            .service(chart_entries_by_manager)
            .service(chart_entries_by_artist)
            .service(chart_entries_upsert)
            .service(chart_entries_add)
            .service(chart_entries_list)
            .service(chart_entries_get)
            .service(chart_entries_delete)
            .service(clusters_development)
            .service(clusters_add)
            .service(clusters_list)
            .service(clusters_get)
            .service(clusters_delete)
            .service(export_potential)
    });

    let server_init = if let Some(http_port) = &config.server.http_port { server_init.bind(("127.0.0.1", *http_port))? } else { server_init };
    let server_init = if let Some(https_config) = &config.server.https_config {
        let ssl_builder = ssl_builder(https_config).map_err(|err| std::io::Error::other(format!("Failed to create SSL/TLS configuration: {err}")))?;
        server_init
            .bind_rustls_0_23("127.0.0.1:".to_string() + &https_config.port.to_string(), ssl_builder)
            .map_err(|err| std::io::Error::other(format!("Failed to bind HTTPS server: {err}")))?
    } else {
        server_init
    };

    server_init.workers(config.server.workers).run().await
}

/**
 * Runs one of the batch commands and exits.
 *
 * #Arguments
 * `command`: The batch command to run.
 * `connection_pool`: The connection pool to run it against.
 */
async fn run_batch_command(command: BatchCommand, connection_pool: Pool<Postgres>) -> std::io::Result<()> {
    match command {
        BatchCommand::LoadData { datasets_dir } => {
            let loader = DatasetLoaderService::new(CountryDao::new(), ArtistDao::new(), ChartDao::new(), ClusterDao::new(), connection_pool);
            loader.load(std::path::Path::new(&datasets_dir)).await.map_err(|err| std::io::Error::other(format!("Failed to load datasets: {err}")))
        }
        BatchCommand::SeedUsers { managers, password } => {
            let seeder = SeedService::new(UserDao::new(), ArtistDao::new(), connection_pool);
            seeder.seed(managers, &password).await.map_err(|err| std::io::Error::other(format!("Failed to seed users: {err}")))
        }
    }
}

/**
 * Initializes logging from the logging configuration.
 *
 * #Arguments
 * `logging`: The logging configuration.
 *
 * #Returns
 * A `Result` indicating success or failure.
 */
fn init_logging(logging: &LoggingConfig) -> Result<(), std::io::Error> {
    let mut filter = EnvFilter::from_default_env();
    for directive in &logging.directives {
        let directive = directive.parse().map_err(|err| std::io::Error::other(format!("Invalid logging directive {directive}: {err}")))?;
        filter = filter.add_directive(directive);
    }
    tracing_subscriber::fmt()
        .with_target(logging.target)
        .with_thread_ids(logging.thread_ids)
        .with_thread_names(logging.thread_names)
        .with_line_number(logging.line_number)
        .with_level(logging.level)
        .with_ansi(logging.ansi)
        .with_env_filter(filter)
        .init();
    Ok(())
}

/**
 * Registers custom Prometheus metrics.
 *
 * #Arguments
 * `prometheus_metrics`: The Prometheus metrics instance to register the gauge with.
 * `gauge`: The gauge to register.
 */
fn register_prometheus_metrics(prometheus_metrics: &PrometheusMetrics, gauge: &IntGauge) -> Result<(), std::io::Error> {
    prometheus_metrics.registry.register(Box::new(gauge.clone())).map_err(|err| std::io::Error::other(format!("Failed to register Prometheus gauge: {err}")))?;
    Ok(())
}

/**
 * Gathers database metrics in a separate thread.
 *
 * #Arguments
 * `max_connections_gauge`: Gauge for maximum connections.
 * `min_connections_gauge`: Gauge for minimum connections.
 * `active_connections_gauge`: Gauge for active connections.
 * `idle_connections_gauge`: Gauge for idle connections.
 * `connection_pool`: The connection pool to gather metrics from.
 */
fn gather_db_metrics(max_connections_gauge: IntGauge, min_connections_gauge: IntGauge, active_connections_gauge: IntGauge, idle_connections_gauge: IntGauge, connection_pool: Pool<Postgres>) {
    thread::spawn(move || {
        loop {
            max_connections_gauge.set(i64::from(connection_pool.options().get_max_connections()));
            min_connections_gauge.set(i64::from(connection_pool.options().get_min_connections()));
            active_connections_gauge.set(i64::from(connection_pool.size()));
            #[allow(clippy::cast_possible_wrap)]
            idle_connections_gauge.set(connection_pool.num_idle() as i64);
            thread::sleep(Duration::from_secs(1));
        }
    });
}

/**
 * Initializes the SSL/TLS configuration for the server.
 *
 * #Arguments
 * `https_config`: The HTTPS configuration containing the certificate and private key files.
 *
 * #Returns
 * A `Result` containing the initialized `ServerConfig` or an `ApplicationError` if initialization fails.
 */
fn ssl_builder(https_config: &HttpsConfig) -> Result<ServerConfig, ApplicationError> {
    let config_builder = ServerConfig::builder_with_protocol_versions(&get_protocol_versions());
    let cert_file = &mut std::io::BufReader::new(
        std::fs::File::open(https_config.clone().certificate_file).map_err(|err| ApplicationError::new(ErrorType::Initialization, format!("Failed to read certificate file: {err}")))?,
    );
    let key_file = &mut std::io::BufReader::new(
        std::fs::File::open(https_config.clone().private_key_file).map_err(|err| ApplicationError::new(ErrorType::Initialization, format!("Failed to read private key file: {err}")))?,
    );
    let cert_chain = certs(cert_file).collect::<Result<Vec<_>, _>>().map_err(|err| ApplicationError::new(ErrorType::Initialization, format!("Failed to convert certificate to der: {err}")))?;
    let mut keys = pkcs8_private_keys(key_file)
        .map(|key| key.map(PrivateKeyDer::Pkcs8))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|err| ApplicationError::new(ErrorType::Initialization, format!("Failed to convert private key to der: {err}")))?;
    if keys.is_empty() {
        return Err(ApplicationError::new(ErrorType::Initialization, "No private key found in key file".to_string()));
    }
    let config = config_builder
        .with_no_client_auth()
        .with_single_cert(cert_chain, keys.remove(0))
        .map_err(|err| ApplicationError::new(ErrorType::Initialization, format!("Failed to create server config: {err}")))?;
    Ok(config)
}

/**
 * Returns the supported TLS protocol versions.
 *
 * #Returns
 * A vector of supported protocol versions.
 */
fn get_protocol_versions() -> Vec<&'static SupportedProtocolVersion> {
    vec![&rustls::version::TLS13]
}

/**
 * Reads the configuration from the specified file.
 *
 * #Arguments
 * `config_file`: The path to the configuration file.
 *
 * #Returns
 * A `Result` containing the parsed `Config` or an `std::io::Error` if reading or parsing fails.
 */
fn get_config(config_file: &str) -> Result<model::config::Config, std::io::Error> {
    let config_str: String = std::fs::read_to_string(config_file).map_err(|err| std::io::Error::other(format!("Failed to read config file: {err}")))?;
    let config: model::config::Config = toml::from_str(&config_str).map_err(|err| std::io::Error::other(format!("Failed to parse config file: {err}")))?;
    Ok(config)
}
