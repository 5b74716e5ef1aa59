pub mod api;
pub mod config;
pub mod error;
pub mod logic;
pub mod model;
pub mod store;

use axum::{routing::get, Router};
use std::sync::Arc;

pub use api::{CrudMethod, EndpointCreator, FilterConfig};
pub use error::{CrudError, Result};
pub use logic::{Crud, QueryAssembler, ResultValidator};
pub use model::*;
pub use store::{Dialect, PostgresStore, RowStore, SqliteStore, Statement};

/// Router serving every configured resource plus `/health`
pub fn build_app<S: RowStore + 'static>(
    config: &config::AppConfig,
    store: Arc<S>,
) -> anyhow::Result<Router> {
    let registry = config.registry()?;
    let mut app = Router::new().route("/health", get(api::health_check));
    for resource in &config.resources {
        let router = resource
            .endpoint_creator(&registry)?
            .into_router(Arc::clone(&store))?;
        app = app.merge(router);
    }
    Ok(app)
}

async fn serve_app(app: Router, config: &config::AppConfig) -> anyhow::Result<()> {
    let bind_address = config.server_address();
    let listener = tokio::net::TcpListener::bind(&bind_address).await?;
    log::info!("autocrud listening on http://{}", bind_address);

    axum::serve(listener, app).await?;

    Ok(())
}

/// Loads configuration, connects the store the URL points at and serves
pub async fn run_server() -> anyhow::Result<()> {
    let config = config::AppConfig::load()?;
    log::info!(
        "Configuration loaded: server={}, {} resource(s)",
        config.server_address(),
        config.resources.len()
    );

    let database_url = config.database_url();
    if database_url.starts_with("sqlite:") {
        log::info!("Connecting to SQLite...");
        let store = SqliteStore::new(&database_url, config.max_connections()).await?;
        serve_app(build_app(&config, Arc::new(store))?, &config).await
    } else {
        log::info!("Connecting to PostgreSQL...");
        let store = PostgresStore::new(&database_url, config.max_connections()).await?;
        serve_app(build_app(&config, Arc::new(store))?, &config).await
    }
}
