use anyhow::{Context, Result};
use lune_api::config::{Config, StoreBackend};
use lune_api::{AppState, InterviewLocks, ReportModels, TokenSettings, build_router};
use lune_core::generator::OpenAiReportClient;
use lune_core::prompts::Prompts;
use lune_core::store::{FileStore, MemoryStore, ReportStore};
use openai_realtime::secrets::CLIENT_SECRETS_URL;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::time::ChronoLocal;

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env().context("Failed to load application configuration")?;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_timer(ChronoLocal::rfc_3339())
        .init();

    if config.openai_api_key.is_none() {
        tracing::warn!("OPENAI_API_KEY is not set; /token and finalize will fail");
    }

    let prompts = Prompts::load_or_default(&config.prompts_dir);

    let store: Arc<dyn ReportStore> = match config.store_backend {
        StoreBackend::File => {
            tracing::info!("storing interviews under {}", config.data_dir.display());
            Arc::new(FileStore::new(&config.data_dir))
        }
        StoreBackend::Memory => {
            tracing::info!("storing interviews in memory for {:?}", config.store_ttl);
            Arc::new(MemoryStore::new(config.store_ttl))
        }
    };

    let generator = Arc::new(OpenAiReportClient::new(
        config.openai_api_key.clone(),
        prompts.report,
        config.reasoning_effort,
    ));

    let state = AppState {
        store,
        generator,
        models: ReportModels {
            primary: config.report_model.clone(),
            fallback: config.report_fallback_model.clone(),
        },
        token: TokenSettings {
            http: reqwest::Client::new(),
            url: CLIENT_SECRETS_URL.to_string(),
            api_key: config.openai_api_key.clone(),
        },
        locks: InterviewLocks::default(),
    };

    let app = build_router(state);

    tracing::info!(
        primary = %config.report_model,
        fallback = %config.report_fallback_model,
        "Starting interview API, listening on {}",
        config.bind_address
    );
    let listener = tokio::net::TcpListener::bind(config.bind_address)
        .await
        .with_context(|| format!("Failed to bind {}", config.bind_address))?;
    axum::serve(listener, app).await?;

    Ok(())
}
