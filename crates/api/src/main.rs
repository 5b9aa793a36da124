use anyhow::Context as _;

use firelancer_infra::config::FirelancerConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    firelancer_observability::init();

    let config = FirelancerConfig::from_env().context("invalid configuration")?;
    let bind = config.api.bind.clone();

    let app = firelancer_api::app::build_app(config)
        .await
        .context("failed to build application")?;

    let listener = tokio::net::TcpListener::bind(&bind)
        .await
        .with_context(|| format!("failed to bind {bind}"))?;

    tracing::info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, app.router()).await?;
    app.shutdown().await;
    Ok(())
}
