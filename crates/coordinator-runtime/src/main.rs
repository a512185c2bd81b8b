//! Coordinator entry point.

use coordinator_runtime::{build, loops, CoordinatorConfig};
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config_path = std::env::args()
        .skip_while(|a| a != "--config")
        .nth(1)
        .or_else(|| std::env::var("COORDINATOR_CONFIG").ok())
        .map(PathBuf::from);
    let config = CoordinatorConfig::load(config_path.as_deref())?;
    let listen_addr: SocketAddr = config.listen_addr.parse()?;

    let coordinator = build(config)?;

    // Run one bootstrap cycle before serving so a restarted coordinator
    // rejoins the mesh immediately.
    let reached = coordinator
        .bootstrap
        .run_cycle(coordinator.state.mesh.table(), coordinator.state.now_ms())
        .await;
    info!(reached, "initial bootstrap");

    loops::spawn_all(&coordinator);

    let app = cm_06_gateway::build_router(coordinator.state);
    let listener = tokio::net::TcpListener::bind(listen_addr).await?;
    info!(%listen_addr, "coordinator listening");
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;
    Ok(())
}
