
use anyhow::Context;

use fieldhand_api::app::{build_app, AppState};
use fieldhand_infra::{open_directory, AppConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::from_env()?;
    fieldhand_observability::init(config.log_format);

    let directory = open_directory(&config).await?;
    let app = build_app(AppState::new(directory, config.session_cookie.clone()));

    let listener = tokio::net::TcpListener::bind(config.bind)
        .await
        .with_context(|| format!("failed to bind {}", config.bind))?;

    tracing::info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, app).await?;
    Ok(())
}
