mod config;
mod errors;
mod generation;
mod jobs;
mod models;
mod pipeline;
mod providers;
mod render;
mod routes;
mod state;
mod templates;

use anyhow::Result;
use std::net::SocketAddr;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use std::sync::Arc;

use crate::config::Config;
use crate::generation::Orchestrator;
use crate::jobs::InMemoryJobStore;
use crate::providers::{FileDataProvider, HttpDataProvider, ProviderRegistry};
use crate::render::{JsonRenderer, PlaceholderRenderer, RendererRegistry};
use crate::routes::build_router;
use crate::state::AppState;
use crate::templates::{MappingRegistry, TemplateRegistry};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_PKG_NAME"), &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting docgen v{}", env!("CARGO_PKG_VERSION"));

    // Data providers
    let mut providers = ProviderRegistry::new();
    providers.register(Arc::new(FileDataProvider::new(&config.data_dir)));
    if let Some(url) = &config.data_service_url {
        let http = HttpDataProvider::new(url.clone(), config.data_service_token.clone())?;
        providers.register(Arc::new(http));
    }
    if providers.get(&config.default_provider).is_none() {
        anyhow::bail!(
            "DEFAULT_PROVIDER '{}' is not registered (available: {})",
            config.default_provider,
            providers.names().join(", ")
        );
    }

    // Renderers
    let mut renderers = RendererRegistry::new();
    renderers.register(Arc::new(PlaceholderRenderer::new(&config.output_dir)));
    renderers.register(Arc::new(JsonRenderer::new(&config.output_dir)));

    // Templates and mappings
    let templates = TemplateRegistry::load(&config.template_dir)?;
    let mappings = MappingRegistry::load(&config.mapping_dir)?;

    let orchestrator = Orchestrator::new(
        providers,
        renderers,
        templates,
        mappings,
        Arc::new(InMemoryJobStore::new()),
        config.orchestrator_settings(),
    );

    let state = AppState {
        orchestrator: Arc::new(orchestrator),
    };

    // Build router
    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
