pub mod events;
pub mod todos;

use crate::{error::AppError, state::AppState};
use axum::{Json, extract::State};
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    q: Option<String>,
}

impl SearchQuery {
    /// The trimmed search term. `None` means the query string was missing;
    /// an empty term is allowed and matches nothing.
    fn term(&self) -> Result<String, AppError> {
        self.q
            .as_deref()
            .map(|q| q.trim().to_string())
            .ok_or_else(|| AppError::BadRequest("Please provide a search term".to_string()))
    }
}

#[derive(Serialize)]
pub struct HealthResponse {
    status: &'static str,
}

pub async fn health(State(app_state): State<AppState>) -> Result<Json<HealthResponse>, AppError> {
    app_state.events.ping().await?;
    Ok(Json(HealthResponse { status: "ok" }))
}
