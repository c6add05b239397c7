//! File upload, listing, download and conversion endpoints

use axum::{
    extract::{multipart::MultipartError, Multipart, Path, State},
    http::StatusCode,
    response::Response,
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::{attachment, required};
use crate::docx::{extract_docx_text, DocxPackage, DocxXml};
use crate::error::{Error, Result};
use crate::server::state::AppState;
use crate::types::{is_code_file, is_text_mime, StoredFile};

const OCTET_STREAM: &str = "application/octet-stream";

/// Response for file list
#[derive(Debug, Serialize)]
pub struct FileListResponse {
    pub files: Vec<StoredFile>,
}

/// Request body for DOCX conversion
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConvertRequest {
    pub file_id: Option<String>,
    pub format: Option<String>,
}

fn multipart_error(e: MultipartError) -> Error {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        Error::PayloadTooLarge(e.body_text())
    } else {
        Error::validation(format!("Invalid multipart body: {}", e.body_text()))
    }
}

/// Last path component of a client-supplied file name
fn client_file_name(raw: &str) -> &str {
    raw.rsplit(['/', '\\']).next().unwrap_or(raw).trim()
}

/// POST /api/files/upload - Store one uploaded file
pub async fn upload_file(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<StoredFile>> {
    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.name() != Some("file") {
            continue;
        }

        let original_name = field
            .file_name()
            .map(client_file_name)
            .filter(|name| !name.is_empty())
            .map(str::to_string)
            .ok_or_else(|| Error::validation("Uploaded file has no name"))?;
        let declared = field.content_type().map(str::to_string);
        let data = field.bytes().await.map_err(multipart_error)?;

        if data.is_empty() {
            return Err(Error::validation("Uploaded file is empty"));
        }

        let mime_type = declared
            .filter(|m| !m.is_empty() && m != OCTET_STREAM)
            .unwrap_or_else(|| {
                mime_guess::from_path(&original_name)
                    .first_or_octet_stream()
                    .to_string()
            });

        let file = state.store().create(&original_name, &mime_type, &data).await?;
        return Ok(Json(file));
    }

    Err(Error::validation("No file uploaded (expected multipart field 'file')"))
}

/// GET /api/files - List stored files, newest first
pub async fn list_files(State(state): State<AppState>) -> Result<Json<FileListResponse>> {
    let files = state.store().list().await?;
    Ok(Json(FileListResponse { files }))
}

/// DELETE /api/files/:id - Delete one file and its sidecar
pub async fn delete_file(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>> {
    let file = state.store().delete(&id).await?;
    Ok(Json(json!({
        "success": true,
        "message": format!("File {} deleted", file.original_name),
    })))
}

/// DELETE /api/files - Delete every stored file
pub async fn delete_all_files(State(state): State<AppState>) -> Result<Json<Value>> {
    let deleted = state.store().clear_all().await?;
    tracing::info!("Deleted all stored files ({} entries)", deleted);
    Ok(Json(json!({
        "success": true,
        "message": format!("Deleted {} files", deleted),
        "deletedCount": deleted,
    })))
}

/// GET /api/files/:id/download - Stream the original binary
pub async fn download_file(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response> {
    let file = state.store().load(&id).await?;
    let path = state.layout().binary_path(&file.name)?;
    attachment(&path, &file.original_name, &file.mime_type).await
}

/// GET /api/files/:id/content - Text content of a text-like file
pub async fn file_content(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>> {
    let file = state.store().load(&id).await?;
    if !is_text_mime(&file.mime_type) && !is_code_file(&file.original_name) {
        return Err(Error::validation(format!(
            "File type {} cannot be shown as text",
            file.mime_type
        )));
    }

    let path = state.layout().binary_path(&file.name)?;
    let bytes = match tokio::fs::read(&path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(Error::not_found(format!("Stored file missing for {}", id)));
        }
        Err(e) => return Err(e.into()),
    };

    Ok(Json(json!({
        "content": String::from_utf8_lossy(&bytes),
        "encoding": "utf-8",
        "size": bytes.len(),
    })))
}

/// POST /api/files/convert-docx - DOCX as XML parts or plain text
pub async fn convert_docx(
    State(state): State<AppState>,
    Json(request): Json<ConvertRequest>,
) -> Result<Json<Value>> {
    let id = required(&request.file_id, "fileId")?;
    let format = request.format.as_deref().unwrap_or("xml").to_string();
    if !matches!(format.as_str(), "xml" | "xml-formatted" | "text") {
        return Err(Error::validation(format!(
            "Unsupported format '{}' (expected xml, xml-formatted or text)",
            format
        )));
    }

    let file = state.store().load(id).await?;
    if !file.is_docx() {
        return Err(Error::validation("File must be a DOCX document"));
    }
    let path = state.layout().binary_path(&file.name)?;

    let body = tokio::task::spawn_blocking(move || {
        let package = DocxPackage::open(&path)?;
        let converted = match format.as_str() {
            "xml" => json!({
                "success": true,
                "format": format,
                "data": DocxXml::from_package(&package),
            }),
            "xml-formatted" => json!({
                "success": true,
                "format": format,
                "content": DocxXml::from_package(&package).concatenated(),
            }),
            _ => json!({
                "success": true,
                "format": format,
                "content": extract_docx_text(&package)?,
            }),
        };
        Ok::<_, Error>(converted)
    })
    .await
    .map_err(|e| Error::internal(format!("Conversion task failed: {}", e)))??;

    tracing::info!("Converted {} to {}", file.original_name, body["format"]);
    Ok(Json(body))
}
