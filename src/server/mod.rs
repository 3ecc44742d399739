//! HTTP front end for a [`Kernel`]
//!
//! ## Endpoints
//!
//! - `POST /run_cell/` - run one cell
//! - `POST /run_all/` - run cells in order, stopping at the first failure
//! - `GET /variables/` - type and preview of every user variable
//! - `POST /reset_context/` - drop all user variables
//! - `POST /delete_var/` - remove one variable
//! - `POST /set_var/` - bind a variable from raw text and a type tag
//! - `GET /session/` - session manager status
//! - `GET /health` - liveness and version

mod error;
mod routes;

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::error::Result;
use crate::kernel::Kernel;

pub use error::ApiError;
pub use routes::{CellRequest, CellsRequest, DeleteRequest, SetRequest};

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub kernel: Arc<Kernel>,
}

/// Build the router for `kernel`
pub fn router(kernel: Arc<Kernel>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/run_cell/", post(routes::run_cell))
        .route("/run_all/", post(routes::run_all))
        .route("/variables/", get(routes::variables))
        .route("/reset_context/", post(routes::reset_context))
        .route("/delete_var/", post(routes::delete_var))
        .route("/set_var/", post(routes::set_var))
        .route("/session/", get(routes::session))
        .route("/health", get(routes::health))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(AppState { kernel })
}

/// Serve until Ctrl-C or SIGTERM, then release the session
pub async fn serve(kernel: Arc<Kernel>, bind: &str) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(bind).await?;
    info!(
        address = %listener.local_addr()?,
        policy = %kernel.policy(),
        detached = kernel.is_detached(),
        "workcell listening"
    );

    axum::serve(listener, router(Arc::clone(&kernel)))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("server stopped, releasing session");
    tokio::task::spawn_blocking(move || kernel.shutdown())
        .await
        .map_err(|e| crate::error::WorkcellError::ExecutionError(e.to_string()))?;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
