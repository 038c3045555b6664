//! HTTP server
//!
//! Assembles the gateway routes and the WebSocket endpoint into one axum app.

use axum::Router;
use axum::extract::FromRef;
use axum::routing::{get, post};
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tracing::info;

use crate::gateway::{self, Gateway};
use crate::router::{self, ResponseRouter};

/// Application state shared by all handlers
#[derive(Clone)]
pub struct AppState {
    gateway: Gateway,
    router: ResponseRouter,
}

impl FromRef<AppState> for Gateway {
    fn from_ref(state: &AppState) -> Self {
        state.gateway.clone()
    }
}

impl FromRef<AppState> for ResponseRouter {
    fn from_ref(state: &AppState) -> Self {
        state.router.clone()
    }
}

/// Build the axum application router
///
/// Separated from `run_server` to enable testing without TCP binding.
pub(crate) fn build_app(gateway: Gateway, router: ResponseRouter) -> Router {
    Router::new()
        .route("/connectors", get(gateway::list_connectors))
        .route("/connectors/{name}", get(gateway::get_connector))
        .route("/connectors/{name}/state", get(gateway::get_state))
        .route("/connectors/{name}/features", get(gateway::get_features))
        .route("/connectors/{name}/time", get(gateway::get_time))
        .route("/connectors/{name}/file", get(gateway::get_file))
        .route("/connectors/{name}/play", post(gateway::play))
        .route("/connectors/{name}/stop", post(gateway::stop))
        .route("/connectors/{name}/eject", post(gateway::eject))
        .route("/connectors/{name}/load", post(gateway::load))
        .route("/ws", get(router::ws_handler))
        .layer(CorsLayer::permissive())
        .with_state(AppState { gateway, router })
}

/// Run the HTTP server
///
/// Binds to `listen` and serves until the listener fails.
pub async fn run_server(
    listen: &str,
    gateway: Gateway,
    router: ResponseRouter,
) -> Result<(), std::io::Error> {
    let app = build_app(gateway, router);

    let listener = TcpListener::bind(listen).await?;
    info!(listen = %listen, "playcast server listening");

    axum::serve(listener, app).await
}
