//! Scenario documents downloaded by devices

use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, State},
};
use fleetman_api::responses::ErrorBody;
use fleetman_core::CoreError;
use tracing::warn;

use crate::api::error::AppError;
use crate::state::AppState;

fn valid_id(id: &str) -> bool {
    !id.is_empty()
        && !id.starts_with('.')
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
}

/// Serve `<scenarios_dir>/<id>.json`
///
/// # Errors
/// Returns 400 for a malformed id, 404 if the document does not exist and
/// 500 if it cannot be read or is not JSON
#[utoipa::path(
    get,
    path = "/api/scenarios/{id}",
    tag = "scenarios",
    params(("id" = String, Path, description = "Scenario id")),
    responses(
        (status = 200, description = "Scenario document", body = Object),
        (status = 400, body = ErrorBody),
        (status = 404, body = ErrorBody)
    )
)]
pub async fn get_scenario(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    if !valid_id(&id) {
        return Err(CoreError::InvalidRequest(format!("bad scenario id {id:?}")).into());
    }
    let dir = state
        .scenarios_dir
        .as_ref()
        .ok_or_else(|| AppError::not_found(format!("scenario not found: {id}")))?;

    let path = dir.join(format!("{id}.json"));
    let content = match tokio::fs::read(&path).await {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(AppError::not_found(format!("scenario not found: {id}")));
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "cannot read scenario");
            return Err(AppError::internal(format!("cannot read scenario {id}")));
        }
    };

    serde_json::from_slice(&content).map(Json).map_err(|e| {
        warn!(path = %path.display(), error = %e, "scenario is not JSON");
        AppError::internal(format!("scenario {id} is not valid JSON"))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_id() {
        assert!(valid_id("warehouse-2"));
        assert!(valid_id("v1.2_final"));
        assert!(!valid_id(""));
        assert!(!valid_id(".hidden"));
        assert!(!valid_id("../secrets"));
        assert!(!valid_id("a/b"));
    }
}
