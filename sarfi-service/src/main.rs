use anyhow::Result;
use sarfi_service::{
    config::AppConfig,
    http_api::{self, ApiState},
    metrics_server, observability,
    pipeline::SarfiPipeline,
    sources::ConfiguredStore,
};
use std::{net::SocketAddr, sync::Arc};
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first; it carries the log format.
    let cfg = AppConfig::load()?;
    observability::init_tracing(&cfg.logging);

    // Start metrics server if configured
    if let Some(metrics_cfg) = &cfg.metrics {
        metrics_server::init(&metrics_cfg.bind_addr)?;
    }

    let http_cfg = cfg
        .http
        .as_ref()
        .ok_or_else(|| anyhow::anyhow!("missing [http] section"))?;
    let addr: SocketAddr = http_cfg
        .bind_addr
        .parse()
        .map_err(|e| anyhow::anyhow!("invalid http.bind_addr: {e}"))?;

    let store = ConfiguredStore::connect(&cfg).await?;
    let shutdown = CancellationToken::new();

    let state = ApiState {
        pipeline: Arc::new(SarfiPipeline::from_store(store.clone(), cfg.fetch.timeout())),
        store,
        defaults: cfg.defaults.clone(),
        shutdown: shutdown.clone(),
    };
    let app = http_api::router(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, store = ?cfg.store.kind, "sarfi service listening");

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutdown requested, cancelling in-flight computations");
            shutdown.cancel();
        })
        .await?;

    Ok(())
}
