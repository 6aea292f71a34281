use dotenvy::dotenv;
use tracing::info;

use saas_kit::infra::{
    InfraError,
    app::create_app,
    setup::{init_app_state, init_tracing, spawn_rate_limit_sweep},
};
use std::net::SocketAddr;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    init_tracing()?;

    let app_state = init_app_state().await.inspect_err(|e| {
        tracing::error!(error = %e, "Startup failed");
    })?;

    let bind_addr = app_state.config.bind_addr;

    // Spawn after tracing is initialized so sweeps are logged.
    spawn_rate_limit_sweep(
        app_state.rate_limit_store.clone(),
        app_state.config.rate_limit_sweep_secs,
    );

    let app = create_app(app_state);

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .map_err(InfraError::TcpBind)?;

    info!("Backend listening at {}", &listener.local_addr()?);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .map_err(InfraError::Server)?;

    Ok(())
}
