//! Coze workflow endpoint

use axum::{extract::State, Json};
use serde::Deserialize;
use serde_json::{json, Value};

use super::required;
use crate::error::Result;
use crate::server::state::AppState;

const DEFAULT_TABLE_SUMMARY: &str = "document analysis";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowRequest {
    pub file_url: Option<String>,
    pub table_summary: Option<String>,
}

/// POST /api/coze/workflow - Run the document workflow on a file URL
pub async fn run_workflow(
    State(state): State<AppState>,
    Json(request): Json<WorkflowRequest>,
) -> Result<Json<Value>> {
    let file_url = required(&request.file_url, "fileUrl")?;
    let summary = request
        .table_summary
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or(DEFAULT_TABLE_SUMMARY);

    let output = state.coze()?.analyze_document(file_url, summary).await?;
    Ok(Json(json!({
        "success": true,
        "content": output.content,
        "nodeTitle": output.node_title,
        "usage": output.usage,
        "messages": output.messages,
    })))
}
