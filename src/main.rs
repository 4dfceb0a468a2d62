use quize::config::Config;
use std::net::SocketAddr;
use quize::{build_state, routes::build_router};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .json()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse()?))
        .init();

    let config = Config::from_env();
    let addr = config.bind_addr()?;
    match config.state_path.as_ref() {
        Some(path) => tracing::info!("local state snapshot at {}", path.display()),
        None => tracing::warn!("LOCAL_STATE_PATH is empty, state is kept in memory only"),
    }
    if config.generator_command.is_none() {
        tracing::info!("GENERATOR_COMMAND not set, questions come from the built-in heuristic");
    }

    let state = build_state(config)?;
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("quize listening on {}", addr);
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>()).await?;
    Ok(())
}
