//! EpochMesh Server binary.
//!
//! Wires the orchestration core, cognitive rails, bus, memory queue, and
//! HTTP surface, then serves until interrupted. Shutdown drains the retry
//! queue and closes the bus so nothing pending is dropped silently.

use anyhow::Context;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use epochmesh_server::{build_runtime, router, MeshConfig, TelemetryPump};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = MeshConfig::from_env();
    tracing::info!(
        port = config.port,
        simulation = %config.simulation_url,
        mode = ?config.mode,
        "starting mesh server"
    );
    tracing::info!("{}", config.mode.status_message());

    let runtime = build_runtime(&config).context("wiring mesh runtime")?;
    let telemetry = if config.telemetry {
        Some(TelemetryPump::start(
            runtime.state.coordinator.clone(),
            config.simulation_url.clone(),
        ))
    } else {
        None
    };

    let app = router(runtime.state.clone());
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    tracing::info!("mesh server listening on http://{addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutdown signal received");
        })
        .await
        .context("serving")?;

    // Drain before the timers stop: pending persistence ops must reach the
    // memory graph or be accounted for.
    if let Some(pump) = telemetry {
        pump.stop().await;
    }
    let outcome = runtime.autoflush.drain_and_stop(runtime.memory.as_ref()).await;
    tracing::info!(
        applied = outcome.applied,
        requeued = outcome.requeued,
        expired = outcome.expired,
        "retry queue drained"
    );
    runtime.state.bus.close();
    Ok(())
}
