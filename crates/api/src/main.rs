use anyhow::Context;

use platform_api::{ApiConfig, build_app};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    platform_observability::init();

    let config = ApiConfig::from_env()?;
    let app = build_app(&config).await?;

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;

    tracing::info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, app).await?;
    Ok(())
}
