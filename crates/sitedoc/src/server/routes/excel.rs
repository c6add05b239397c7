//! Spreadsheet correction endpoints

use axum::{
    extract::{Path, State},
    response::Response,
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::path::PathBuf;

use super::{attachment, required};
use crate::error::{Error, Result};
use crate::extract::{extract_modifications as extract_records, modification_stats};
use crate::server::state::AppState;

/// Request body for spreadsheet correction
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModifyExcelRequest {
    pub original_file_path: Option<String>,
    pub file_id: Option<String>,
    /// AI answer: plain text, or an object carrying it under `content`
    pub ai_result: Option<Value>,
    pub original_file_name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ExtractRequest {
    pub content: Option<String>,
}

fn ai_text(ai_result: &Option<Value>) -> Result<&str> {
    let text = match ai_result {
        Some(Value::String(text)) => Some(text.as_str()),
        Some(Value::Object(map)) => map.get("content").and_then(Value::as_str),
        _ => None,
    };
    text.filter(|t| !t.trim().is_empty())
        .ok_or_else(|| Error::validation("Missing required parameter: aiResult"))
}

/// Spreadsheet to correct: a stored upload, or a path inside the upload root
async fn resolve_original(state: &AppState, request: &ModifyExcelRequest) -> Result<PathBuf> {
    if let Some(id) = request.file_id.as_deref().filter(|id| !id.trim().is_empty()) {
        let file = state.store().load(id.trim()).await?;
        let path = state.layout().binary_path(&file.name)?;
        if !tokio::fs::try_exists(&path).await.unwrap_or(false) {
            return Err(Error::not_found(format!("Stored file missing for {}", id)));
        }
        return Ok(path);
    }

    let raw = required(&request.original_file_path, "originalFilePath or fileId")?;
    let path = match tokio::fs::canonicalize(raw).await {
        Ok(path) => path,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(Error::not_found(format!("Original file not found: {}", raw)));
        }
        Err(e) => return Err(e.into()),
    };
    let root = tokio::fs::canonicalize(state.layout().root()).await?;
    if !path.starts_with(&root) {
        return Err(Error::validation("Original file must be inside the upload directory"));
    }
    Ok(path)
}

/// POST /api/files/modify-excel - Apply AI corrections to a spreadsheet
pub async fn modify_excel(
    State(state): State<AppState>,
    Json(request): Json<ModifyExcelRequest>,
) -> Result<Json<Value>> {
    let text = ai_text(&request.ai_result)?;
    let original = resolve_original(&state, &request).await?;

    let records = extract_records(text);
    if records.is_empty() {
        tracing::info!("No corrections found in AI result for {}", original.display());
        return Ok(Json(json!({
            "success": false,
            "error": "no corrections found",
        })));
    }

    let display_name = match request.original_file_name.as_deref() {
        Some(name) => name.to_string(),
        None => original.display().to_string(),
    };
    tracing::info!("Applying {} corrections to {}", records.len(), display_name);
    let corrections = serde_json::to_string(&records)?;
    let report = state.excel().modify(&original, &corrections).await?;

    let download_url = report
        .filename
        .as_deref()
        .map(|name| format!("/api/files/download-modified/{}", urlencoding::encode(name)));

    Ok(Json(json!({
        "success": report.success,
        "downloadUrl": download_url,
        "fileName": report.filename,
        "statistics": report.statistics,
        "warnings": report.warnings,
        "error": report.error,
        "message": report.message,
        "corrections": records.len(),
    })))
}

/// POST /api/files/extract-modifications - Correction records in AI text
pub async fn extract_modifications(Json(request): Json<ExtractRequest>) -> Result<Json<Value>> {
    let content = required(&request.content, "content")?;
    let records = extract_records(content);
    let stats = modification_stats(&records);

    Ok(Json(json!({
        "success": !records.is_empty(),
        "count": stats.total_count,
        "records": records,
        "fieldStats": stats.field_stats,
    })))
}

/// GET /api/files/download-modified/:filename - A corrected spreadsheet
pub async fn download_modified(
    State(state): State<AppState>,
    Path(filename): Path<String>,
) -> Result<Response> {
    let path = state.layout().modified_file(&filename)?;
    let mime = mime_guess::from_path(&path).first_or_octet_stream();
    attachment(&path, &filename, mime.as_ref()).await
}
