use std::error::Error;

use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use changelog_bot::config::Config;
use changelog_bot::github::OctocrabFactory;
use changelog_bot::llm::{AnthropicBackend, ChangelogSynthesizer};
use changelog_bot::pipeline::{Pipeline, PipelineSettings};
use changelog_bot::publish::RepositoryPublisher;
use changelog_bot::quota::{FileStore, QuotaTracker};
use changelog_bot::server::{AppState, build_router};

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "changelog_bot=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;
    info!(?config, "Loaded configuration");

    if config.webhook_secret.is_none() {
        warn!("GITHUB_WEBHOOK_SECRET is not set; webhook signatures will not be verified");
    }

    let github = OctocrabFactory::from_token(config.github_token.clone(), config.github_timeout)?;
    let backend = AnthropicBackend::new(
        config.anthropic_api_key.clone(),
        config.model.clone(),
        config.llm_timeout,
    )?
    .with_base_url(config.anthropic_url.clone());
    let store = FileStore::open(config.state_file.clone())?;

    let pipeline = Pipeline::new(
        github,
        ChangelogSynthesizer::new(backend, config.changelog_path.clone()),
        QuotaTracker::new(store, config.free_limit),
        RepositoryPublisher::new(config.changelog_path.clone()),
        PipelineSettings {
            webhook_secret: config.webhook_secret.clone().map(String::into_bytes),
            app_url: config.app_url.clone(),
        },
    );

    let app = build_router(AppState::new(pipeline));

    let listener = tokio::net::TcpListener::bind(config.bind).await?;
    info!("listening on {}", config.bind);

    axum::serve(listener, app).await?;
    Ok(())
}
