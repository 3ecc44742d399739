use std::sync::Arc;

use axum::{extract::State, Json};
use serde::Deserialize;
use serde_json::{json, Value as JsonValue};

use super::{ApiError, AppState};
use crate::context::Snapshot;
use crate::kernel::{Kernel, RunOutcome};

#[derive(Debug, Deserialize)]
pub struct CellRequest {
    #[serde(default)]
    pub code: String,
}

#[derive(Debug, Deserialize)]
pub struct CellsRequest {
    #[serde(default)]
    pub cells: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct DeleteRequest {
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SetRequest {
    pub name: String,
    /// Raw value; non-string JSON is converted from its textual form
    pub value: JsonValue,
    #[serde(rename = "type", alias = "kind", default = "default_kind")]
    pub kind: String,
}

fn default_kind() -> String {
    "str".to_string()
}

impl SetRequest {
    fn raw_value(&self) -> String {
        match &self.value {
            JsonValue::String(s) => s.clone(),
            other => other.to_string(),
        }
    }
}

/// Run `f` on the blocking pool; kernel calls may block on the session or the script
async fn blocking<T, F>(kernel: &Arc<Kernel>, f: F) -> Result<T, ApiError>
where
    F: FnOnce(&Kernel) -> T + Send + 'static,
    T: Send + 'static,
{
    let kernel = Arc::clone(kernel);
    tokio::task::spawn_blocking(move || f(&kernel))
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))
}

/// POST /run_cell/
pub async fn run_cell(
    State(state): State<AppState>,
    Json(request): Json<CellRequest>,
) -> Result<Json<RunOutcome>, ApiError> {
    let outcome = blocking(&state.kernel, move |kernel| kernel.run_cell(&request.code)).await??;
    Ok(Json(outcome))
}

/// POST /run_all/
pub async fn run_all(
    State(state): State<AppState>,
    Json(request): Json<CellsRequest>,
) -> Result<Json<RunOutcome>, ApiError> {
    let outcome = blocking(&state.kernel, move |kernel| kernel.run_cells(request.cells.as_slice())).await??;
    Ok(Json(outcome))
}

/// GET /variables/
pub async fn variables(State(state): State<AppState>) -> Result<Json<Snapshot>, ApiError> {
    let snapshot = blocking(&state.kernel, |kernel| kernel.variables()).await?;
    Ok(Json(snapshot))
}

/// POST /reset_context/
pub async fn reset_context(State(state): State<AppState>) -> Result<Json<JsonValue>, ApiError> {
    blocking(&state.kernel, |kernel| kernel.reset()).await?;
    Ok(Json(json!({ "status": "reset" })))
}

/// POST /delete_var/
pub async fn delete_var(
    State(state): State<AppState>,
    Json(request): Json<DeleteRequest>,
) -> Result<Json<JsonValue>, ApiError> {
    let deleted = match request.name {
        Some(name) => Some(blocking(&state.kernel, move |kernel| kernel.delete_variable(&name)).await?),
        None => None,
    };
    Ok(Json(json!({ "status": "ok", "deleted": deleted })))
}

/// POST /set_var/
pub async fn set_var(
    State(state): State<AppState>,
    Json(request): Json<SetRequest>,
) -> Result<Json<JsonValue>, ApiError> {
    let raw = request.raw_value();
    let name = request.name.clone();
    let value = blocking(&state.kernel, move |kernel| {
        kernel.set_variable(&request.name, &raw, &request.kind)
    })
    .await??;

    Ok(Json(json!({
        "status": "ok",
        "name": name,
        "value": value.to_json().unwrap_or(JsonValue::Null),
    })))
}

/// GET /session/
pub async fn session(State(state): State<AppState>) -> Result<Json<JsonValue>, ApiError> {
    let status = blocking(&state.kernel, |kernel| kernel.session_status()).await?;
    let body = match status {
        Some(status) => serde_json::to_value(status).map_err(|e| ApiError::Internal(e.to_string()))?,
        None => json!({ "state": "detached" }),
    };
    Ok(Json(body))
}

/// GET /health
pub async fn health() -> Json<JsonValue> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
