//! HTTP surface of the gateway.
//!
//! A single fallback handler receives every request and hands it to the
//! [`Gateway`] dispatcher, so routing is the resource graph's job, not the
//! router's.

use std::net::SocketAddr;

use anyhow::{Context, Result};
use axum::body::Bytes;
use axum::extract::State;
use axum::http::header::{ALLOW, CONTENT_TYPE, LOCATION};
use axum::http::{HeaderMap, HeaderValue, Method, Uri};
use axum::response::{IntoResponse, Response};
use axum::{Json, Router};
use tokio::net::TcpListener;
use tracing::info;

use crate::dispatch::{Gateway, Reply, Request};
use crate::signal::ShutdownToken;

/// The API router.
pub fn router(gateway: Gateway) -> Router {
    Router::new().fallback(handle).with_state(gateway)
}

async fn handle(
    State(gateway): State<Gateway>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let request = Request {
        method,
        path: uri.path().to_string(),
        content_type: headers
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
        body,
    };
    into_response(gateway.handle(request).await)
}

fn into_response(reply: Reply) -> Response {
    let mut response = match reply.body {
        Some(body) => (reply.status, Json(body)).into_response(),
        None => reply.status.into_response(),
    };
    let headers = response.headers_mut();
    for (name, value) in [(LOCATION, reply.location), (ALLOW, reply.allow)] {
        if let Some(value) = value.and_then(|v| HeaderValue::from_str(&v).ok()) {
            headers.insert(name, value);
        }
    }
    response
}

/// Serve the API on `addr` until `shutdown` is cancelled.
pub async fn serve(gateway: Gateway, addr: SocketAddr, shutdown: ShutdownToken) -> Result<()> {
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind API server to {addr}"))?;
    info!(addr = %addr, "API listening");

    axum::serve(listener, router(gateway))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .context("API server error")?;

    info!("API server stopped");
    Ok(())
}
