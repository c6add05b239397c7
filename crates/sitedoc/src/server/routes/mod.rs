//! API routes for the document server

pub mod analyze;
pub mod cleanup;
pub mod coze;
pub mod excel;
pub mod files;
pub mod split;

use axum::{
    body::Body,
    extract::DefaultBodyLimit,
    http::header,
    response::Response,
    routing::{delete, get, post},
    Router,
};
use std::path::Path;
use tokio_util::io::ReaderStream;

use crate::error::{Error, Result};
use crate::server::state::AppState;

/// Build all API routes
pub fn api_routes(max_upload_size: usize) -> Router<AppState> {
    Router::new()
        // File management
        .route("/files", get(files::list_files).delete(files::delete_all_files))
        .route(
            "/files/upload",
            post(files::upload_file).layer(DefaultBodyLimit::max(max_upload_size)),
        )
        .route("/files/:id", delete(files::delete_file))
        .route("/files/:id/download", get(files::download_file))
        .route("/files/:id/content", get(files::file_content))
        .route("/files/convert-docx", post(files::convert_docx))
        // Retention
        .route("/files/cleanup", post(cleanup::run_cleanup))
        .route("/files/cleanup-stats", get(cleanup::cleanup_stats))
        // Splitting
        .route("/files/split-docx", post(split::split_docx))
        .route("/files/split-docx-stream", get(split::split_docx_stream))
        .route("/files/split-xml", post(split::split_xml))
        .route("/files/split-status/:id", get(split::split_status))
        .route("/files/split-urls", post(split::split_urls))
        .route("/files/download-split/:file_id", get(split::download_split))
        .route(
            "/files/download-split-file/:file_id/:file_name",
            get(split::download_split_file),
        )
        // Spreadsheet corrections
        .route("/files/modify-excel", post(excel::modify_excel))
        .route("/files/extract-modifications", post(excel::extract_modifications))
        .route("/files/download-modified/:filename", get(excel::download_modified))
        // AI
        .route("/analyze/:id", post(analyze::analyze_file))
        .route("/coze/workflow", post(coze::run_workflow))
        // Info
        .route("/info", get(info))
}

/// `Content-Disposition` value that survives non-ASCII names
fn content_disposition(file_name: &str) -> String {
    let fallback: String = file_name
        .chars()
        .map(|c| match c {
            '"' | '\\' => '_',
            c if c == ' ' || c.is_ascii_graphic() => c,
            _ => '_',
        })
        .collect();
    format!(
        "attachment; filename=\"{}\"; filename*=UTF-8''{}",
        fallback,
        urlencoding::encode(file_name)
    )
}

/// Stream a file from disk as an attachment
pub(crate) async fn attachment(path: &Path, download_name: &str, content_type: &str) -> Result<Response> {
    let file = match tokio::fs::File::open(path).await {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(Error::not_found(format!("File not found: {}", download_name)));
        }
        Err(e) => return Err(e.into()),
    };
    let length = file.metadata().await?.len();

    Response::builder()
        .header(header::CONTENT_TYPE, content_type)
        .header(header::CONTENT_LENGTH, length)
        .header(header::CONTENT_DISPOSITION, content_disposition(download_name))
        .body(Body::from_stream(ReaderStream::new(file)))
        .map_err(|e| Error::internal(format!("Failed to build download response: {}", e)))
}

/// A required string field from a request body
pub(crate) fn required<'a>(value: &'a Option<String>, name: &str) -> Result<&'a str> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| Error::validation(format!("Missing required parameter: {}", name)))
}

/// API info endpoint
async fn info() -> axum::Json<serde_json::Value> {
    axum::Json(serde_json::json!({
        "name": "sitedoc",
        "version": env!("CARGO_PKG_VERSION"),
        "description": "Construction document storage, splitting and AI review",
        "endpoints": {
            "POST /api/files/upload": "Upload a file (multipart field 'file')",
            "GET /api/files": "List stored files",
            "DELETE /api/files": "Delete all stored files",
            "DELETE /api/files/:id": "Delete a file",
            "GET /api/files/:id/download": "Download a file",
            "GET /api/files/:id/content": "Text content of a file",
            "POST /api/files/convert-docx": "DOCX to XML or text",
            "POST /api/files/cleanup": "Run a retention sweep now",
            "GET /api/files/cleanup-stats": "Retention statistics",
            "POST /api/files/split-docx": "Split a DOCX into smaller DOCX files",
            "GET /api/files/split-docx-stream": "Split with server-sent progress events",
            "POST /api/files/split-xml": "Split a DOCX into document.xml chunks",
            "GET /api/files/split-status/:id": "Status of the last split",
            "POST /api/files/split-urls": "Download URLs of split files",
            "GET /api/files/download-split/:fileId": "ZIP of all split files",
            "GET /api/files/download-split-file/:fileId/:fileName": "One split file",
            "POST /api/files/modify-excel": "Apply AI corrections to a spreadsheet",
            "POST /api/files/extract-modifications": "Extract corrections from AI text",
            "GET /api/files/download-modified/:filename": "Download a corrected spreadsheet",
            "POST /api/analyze/:id": "AI analysis and error detection",
            "POST /api/coze/workflow": "Run the Coze document workflow"
        }
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_disposition() {
        assert_eq!(
            content_disposition("plan.docx"),
            "attachment; filename=\"plan.docx\"; filename*=UTF-8''plan.docx"
        );
        let value = content_disposition("施工 \"方案\".docx");
        assert!(value.starts_with("attachment; filename=\"__ ____.docx\""));
        assert!(value.contains("filename*=UTF-8''%E6%96%BD%E5%B7%A5%20%22"));
    }
}
