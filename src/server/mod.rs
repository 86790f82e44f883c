// src/server/mod.rs

//! Live-reload dev server.
//!
//! Runs in exactly one of two modes:
//! - proxy: forwards every request to `proxy_target`;
//! - local: serves files from `base_dirs`.
//!
//! HTML responses get the reload client injected. The client listens on an
//! SSE stream for `reload` and `css` events published through [`ReloadHub`].

use std::convert::Infallible;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use axum::extract::{Request, State};
use axum::http::header;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use futures::stream::{self, Stream};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::config::model::{DevServerConfig, DevServerMode};
use crate::errors::Result;

pub mod inject;
pub mod local;
pub mod proxy;
pub mod reload;

pub use reload::{ReloadHub, ReloadSubscription};

/// Path of the injected client script.
pub const CLIENT_PATH: &str = "/__assetdag/client.js";
/// Path of the SSE reload stream.
pub const EVENTS_PATH: &str = "/__assetdag/events";

const CLIENT_JS: &str = include_str!("client.js");

enum Backend {
    Proxy { client: reqwest::Client, target: String },
    Local { base_dirs: Vec<PathBuf> },
}

struct ServerState {
    hub: ReloadHub,
    backend: Backend,
}

/// Running dev server. Dropping the handle stops it.
#[derive(Debug)]
pub struct DevServerHandle {
    local_addr: SocketAddr,
    task: JoinHandle<()>,
}

impl DevServerHandle {
    /// Address actually bound (useful with port 0).
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }
}

impl Drop for DevServerHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Resolve the mode, bind and start serving.
///
/// Mode errors are reported before any socket is bound.
pub async fn start(cfg: &DevServerConfig, root: &Path, hub: ReloadHub) -> Result<DevServerHandle> {
    let backend = match cfg.mode()? {
        DevServerMode::Proxy { target } => {
            let client = reqwest::Client::builder()
                .redirect(reqwest::redirect::Policy::none())
                .build()
                .context("building proxy client")?;
            info!(upstream = %target, "dev server in proxy mode");
            Backend::Proxy { client, target }
        }
        DevServerMode::Local { base_dirs } => {
            let base_dirs: Vec<PathBuf> = base_dirs.iter().map(|dir| root.join(dir)).collect();
            info!(?base_dirs, "dev server in local mode");
            Backend::Local { base_dirs }
        }
    };

    let state = Arc::new(ServerState { hub, backend });
    let app = Router::new()
        .route(CLIENT_PATH, get(client_script))
        .route(EVENTS_PATH, get(reload_events))
        .fallback(site)
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let listener = TcpListener::bind((cfg.host.as_str(), cfg.port))
        .await
        .with_context(|| format!("binding dev server to {}:{}", cfg.host, cfg.port))?;
    let local_addr = listener.local_addr().context("reading bound address")?;
    info!(addr = %local_addr, "dev server listening on http://{local_addr}");

    let task = tokio::spawn(async move {
        if let Err(err) = axum::serve(listener, app).await {
            error!(error = %err, "dev server stopped");
        }
    });

    Ok(DevServerHandle { local_addr, task })
}

async fn client_script() -> impl IntoResponse {
    ([(header::CONTENT_TYPE, "text/javascript; charset=utf-8")], CLIENT_JS)
}

async fn reload_events(
    State(state): State<Arc<ServerState>>,
) -> Sse<impl Stream<Item = std::result::Result<Event, Infallible>>> {
    let subscription = state.hub.subscribe();
    let events = stream::unfold(subscription, |mut sub| async move {
        loop {
            let kind = sub.next().await?;
            if let Some(name) = kind.event_name() {
                return Some((Ok(Event::default().event(name).data(name)), sub));
            }
        }
    });
    Sse::new(events).keep_alive(KeepAlive::default())
}

async fn site(State(state): State<Arc<ServerState>>, req: Request) -> Response {
    match &state.backend {
        Backend::Proxy { client, target } => proxy::forward(client, target, req).await,
        Backend::Local { base_dirs } => local::serve(base_dirs, req.uri()).await,
    }
}
