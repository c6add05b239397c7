//! AI analysis endpoint

use axum::{
    extract::{Path, State},
    Json,
};

use crate::error::Result;
use crate::server::state::AppState;
use crate::types::StoredFile;

/// POST /api/analyze/:id - Analyze a stored file and attach the result
pub async fn analyze_file(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<StoredFile>> {
    let file = state.analyzer().analyze(&id).await?;
    Ok(Json(file))
}
