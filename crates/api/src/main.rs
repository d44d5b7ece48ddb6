use anyhow::Context;

use classroom_infra::AppConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    classroom_observability::init();

    let config = AppConfig::from_env().context("invalid configuration")?;
    tracing::info!(?config, "starting classroom api");

    let store = classroom_api::app::build_store(&config).await?;
    let port = config.port;
    let app = classroom_api::app::build_app(config, store);

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port))
        .await
        .with_context(|| format!("failed to bind 0.0.0.0:{port}"))?;

    tracing::info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, app).await.context("server error")?;
    Ok(())
}
