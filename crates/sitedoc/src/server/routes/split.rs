//! DOCX split endpoints

use axum::{
    extract::{Path, Query, State},
    response::{
        sse::{Event, KeepAlive, Sse},
        Response,
    },
    Json,
};
use futures_util::stream::Stream;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio_stream::{wrappers::UnboundedReceiverStream, StreamExt};

use super::{attachment, required};
use crate::docx::{pages_from_value, ProgressSink, SplitOutcome, SplitStatus};
use crate::error::Result;
use crate::server::state::AppState;
use crate::storage::validate_id;
use crate::types::StoredFile;

const DOCX_MIME: &str = "application/vnd.openxmlformats-officedocument.wordprocessingml.document";

/// Request body for split operations
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SplitRequest {
    pub file_id: Option<String>,
    /// Number or numeric string
    pub pages_per_file: Option<Value>,
}

/// Query parameters for the streaming split
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SplitStreamQuery {
    pub file_id: Option<String>,
    pub pages_per_file: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SplitStatusResponse {
    pub file_id: String,
    #[serde(flatten)]
    pub status: SplitStatus,
}

/// Validate parameters, then load the source record
async fn prepare(
    state: &AppState,
    file_id: &Option<String>,
    pages: Option<&Value>,
) -> Result<(StoredFile, u32)> {
    let pages = pages_from_value(pages, state.config().splitter.default_pages_per_file)?;
    let id = required(file_id, "fileId")?;
    let file = state.store().load(id).await?;
    Ok((file, pages))
}

/// POST /api/files/split-docx - Split into DOCX files plus a ZIP
pub async fn split_docx(
    State(state): State<AppState>,
    Json(request): Json<SplitRequest>,
) -> Result<Json<SplitOutcome>> {
    let (file, pages) = prepare(&state, &request.file_id, request.pages_per_file.as_ref()).await?;
    let outcome = state
        .splitter()
        .split_to_disk(&file, pages, ProgressSink::none())
        .await?;
    Ok(Json(outcome))
}

/// GET /api/files/split-docx-stream - Same split, progress as server-sent events
pub async fn split_docx_stream(
    State(state): State<AppState>,
    Query(query): Query<SplitStreamQuery>,
) -> Result<Sse<impl Stream<Item = std::result::Result<Event, axum::Error>>>> {
    let pages = query.pages_per_file.map(Value::String);
    let (file, pages) = prepare(&state, &query.file_id, pages.as_ref()).await?;

    let (sink, rx) = ProgressSink::channel();
    tokio::spawn(async move {
        // failures reach the client as an `error` event
        let _ = state.splitter().split_to_disk(&file, pages, sink).await;
    });

    let stream = UnboundedReceiverStream::new(rx).map(|event| Event::default().json_data(&event));
    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

/// POST /api/files/split-xml - Split into standalone document.xml strings
pub async fn split_xml(
    State(state): State<AppState>,
    Json(request): Json<SplitRequest>,
) -> Result<Json<Value>> {
    let (file, pages) = prepare(&state, &request.file_id, request.pages_per_file.as_ref()).await?;
    let chunks = state.splitter().split_xml(&file, pages).await?;
    Ok(Json(json!({
        "success": true,
        "totalChunks": chunks.len(),
        "chunks": chunks.into_iter().map(|c| c.xml).collect::<Vec<_>>(),
    })))
}

/// GET /api/files/split-status/:id - Phase of the last split
pub async fn split_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<SplitStatusResponse>> {
    validate_id(&id)?;
    let status = state.splitter().status(&id);
    Ok(Json(SplitStatusResponse { file_id: id, status }))
}

/// POST /api/files/split-urls - Download URLs of the last split's files
pub async fn split_urls(
    State(state): State<AppState>,
    Json(request): Json<SplitRequest>,
) -> Result<Json<Value>> {
    let id = required(&request.file_id, "fileId")?;
    let files = state.splitter().list_outputs(id).await?;

    let base = state.config().server.public_base_url.trim_end_matches('/');
    let file_urls: Vec<String> = files
        .iter()
        .map(|name| {
            format!(
                "{}/api/files/download-split-file/{}/{}",
                base,
                id,
                urlencoding::encode(name)
            )
        })
        .collect();

    tracing::info!("Listed {} split file URLs for {}", files.len(), id);
    Ok(Json(json!({
        "success": true,
        "totalFiles": files.len(),
        "files": files,
        "fileUrls": file_urls,
    })))
}

/// GET /api/files/download-split/:file_id - Aggregate ZIP
pub async fn download_split(
    State(state): State<AppState>,
    Path(file_id): Path<String>,
) -> Result<Response> {
    let path = state.layout().split_zip(&file_id)?;
    attachment(&path, "split_documents.zip", "application/zip").await
}

/// GET /api/files/download-split-file/:file_id/:file_name - One chunk
pub async fn download_split_file(
    State(state): State<AppState>,
    Path((file_id, file_name)): Path<(String, String)>,
) -> Result<Response> {
    let path = state.layout().split_file(&file_id, &file_name)?;
    attachment(&path, &file_name, DOCX_MIME).await
}
