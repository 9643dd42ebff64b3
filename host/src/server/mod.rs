use crate::{interfaces::HostError, server::api::create_router, AppState};
use anyhow::Context;
use std::{net::SocketAddr, str::FromStr};
use tokio::net::TcpListener;
use tracing::info;

pub mod api;

/// Starts the investigation host server.
pub async fn serve(state: AppState) -> anyhow::Result<()> {
    let addr = SocketAddr::from_str(&state.opts.address)
        .map_err(|_| HostError::InvalidRequest(format!("invalid address {}", state.opts.address)))?;
    let listener = TcpListener::bind(addr).await?;

    info!("Listening on: {}", listener.local_addr()?);

    let router = create_router(state.opts.concurrency_limit).with_state(state);
    axum::serve(listener, router)
        .await
        .context("Server couldn't serve")?;

    Ok(())
}
