//! Warden binary.

use std::path::PathBuf;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use epochmesh_warden::{Warden, WardenConfig, WardenPolicy};

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let defaults = WardenPolicy::default();
    let policy = WardenPolicy {
        max_restarts: env_or("WARDEN_MAX_RESTARTS", defaults.max_restarts),
        restart_window_s: env_or("WARDEN_RESTART_WINDOW_S", defaults.restart_window_s),
        max_failures: env_or("WARDEN_MAX_FAILURES", defaults.max_failures),
        memory_limit_bytes: env_or("WARDEN_MEMORY_LIMIT_BYTES", defaults.memory_limit_bytes),
        cycle_interval_s: env_or("WARDEN_CYCLE_INTERVAL_S", defaults.cycle_interval_s),
    };

    let worker_port: u16 = env_or("WARDEN_WORKER_PORT", 8787);
    let config = WardenConfig {
        policy,
        worker_command: std::env::var("WARDEN_WORKER_CMD")
            .unwrap_or_else(|_| "mesh-server".into())
            .split_whitespace()
            .map(str::to_string)
            .collect(),
        worker_port,
        health_url: std::env::var("WARDEN_WORKER_HEALTH")
            .unwrap_or_else(|_| format!("http://127.0.0.1:{worker_port}/health")),
        watch_parent_pid: std::env::var("WARDEN_PARENT_PID")
            .ok()
            .and_then(|v| v.parse().ok()),
        state_dir: PathBuf::from(
            std::env::var("WARDEN_STATE_DIR").unwrap_or_else(|_| "./run".into()),
        ),
    };

    tracing::info!(
        worker = ?config.worker_command,
        port = config.worker_port,
        state_dir = %config.state_dir.display(),
        "warden starting"
    );
    Warden::new(config).run().await
}
