use actix_cors::Cors;
use actix_web::{middleware, web, App, HttpServer};
use reval_engine::config::Settings;
use reval_engine::core::{BatchRunner, GeoIndex, ValuationEngine};
use reval_engine::models::Asset;
use reval_engine::routes::{self, AppState};
use reval_engine::services::{InMemoryGeoIndex, PostgresClient};
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

fn io_error(message: String) -> std::io::Error {
    std::io::Error::new(std::io::ErrorKind::Other, message)
}

/// Comparables for the in-memory index, from a JSON array of assets
fn load_comparables(path: &str) -> std::io::Result<Vec<Asset>> {
    let raw = std::fs::read_to_string(path)?;
    serde_json::from_str(&raw).map_err(|e| io_error(format!("Invalid comparables file {}: {}", path, e)))
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // Load .env file if present
    dotenv::dotenv().ok();

    // Load configuration
    let settings = Settings::load().map_err(|e| io_error(format!("Configuration error: {}", e)))?;

    // Initialize logging; RUST_LOG wins over LOG_LEVEL and the config file
    let log_level = std::env::var("LOG_LEVEL").unwrap_or_else(|_| settings.logging.level.clone());
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_else(|_| settings.logging.format.clone());
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&log_level));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_level(true);

    if log_format == "pretty" {
        subscriber.pretty().init();
    } else {
        subscriber.compact().init();
    }

    info!("Starting revaluation service...");

    // Spatial index: PostGIS when configured, in-memory otherwise
    let (index, postgres): (Arc<dyn GeoIndex>, Option<Arc<PostgresClient>>) = match &settings.database.url {
        Some(url) => {
            let client = PostgresClient::from_settings(
                url,
                settings.database.max_connections,
                settings.database.min_connections,
                settings.database.acquire_timeout_secs,
                settings.database.idle_timeout_secs,
            )
            .await
            .map_err(|e| {
                error!("Failed to connect to PostgreSQL: {}", e);
                io_error(format!("PostgreSQL connection error: {}", e))
            })?;
            let client = Arc::new(client);
            info!("PostgreSQL client initialized");
            let index: Arc<dyn GeoIndex> = client.clone();
            (index, Some(client))
        }
        None => {
            let comparables = match &settings.valuation.comparables_file {
                Some(path) => load_comparables(path)?,
                None => Vec::new(),
            };
            info!("No database configured, using in-memory index with {} comparables", comparables.len());
            let index: Arc<dyn GeoIndex> = Arc::new(InMemoryGeoIndex::from_assets(comparables));
            (index, None)
        }
    };

    let engine = ValuationEngine::new(index, settings.valuation.engine_settings()).map_err(|e| {
        error!("Invalid valuation settings: {}", e);
        io_error(e.to_string())
    })?;

    info!("Valuation engine initialized: {:?}", engine.settings().expansion);

    let runner = Arc::new(BatchRunner::new(
        Arc::new(engine),
        settings.valuation.row_markers(),
        settings.valuation.batch_workers,
    ));

    // Build application state
    let app_state = AppState {
        runner,
        postgres,
        default_location_tolerance: settings.valuation.default_location_tolerance,
    };

    // Configure HTTP server
    let host = settings.server.host.clone();
    let port = settings.server.port;
    let workers = settings.server.workers.unwrap_or(4);
    let json_limit = settings.server.json_limit;

    info!("Starting HTTP server on {}:{}", host, port);

    HttpServer::new(move || {
        let cors = Cors::permissive();

        App::new()
            .app_data(web::Data::new(app_state.clone()))
            .app_data(
                web::JsonConfig::default()
                    .limit(json_limit)
                    .error_handler(routes::handle_json_payload_error),
            )
            .app_data(web::QueryConfig::default().error_handler(routes::handle_query_payload_error))
            .wrap(cors)
            .wrap(middleware::Logger::default())
            .wrap(middleware::Compress::default())
            .configure(routes::configure_routes)
    })
    .workers(workers)
    .bind((host, port))?
    .run()
    .await
}
