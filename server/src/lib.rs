pub mod config;
pub mod error;
pub mod extract;
pub mod geo;
pub mod middleware;
pub mod routes;
pub mod state;
pub mod verify;

use std::future::Future;
use std::net::SocketAddr;
use tokio::net::TcpListener;

/// Serves the router on `listener` until `shutdown` resolves.
pub async fn serve(
    listener: TcpListener,
    state: state::AppState,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> std::io::Result<()> {
    let app = routes::router(state).into_make_service_with_connect_info::<SocketAddr>();
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
}
