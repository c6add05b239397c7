//! Retention endpoints

use axum::{extract::State, Json};
use chrono::Utc;
use serde_json::{json, Value};

use crate::error::Result;
use crate::retention::{format_bytes, format_duration};
use crate::server::state::AppState;

/// POST /api/files/cleanup - Run one sweep now
pub async fn run_cleanup(State(state): State<AppState>) -> Result<Json<Value>> {
    let report = state.cleanup().sweep().await?;
    Ok(Json(json!({
        "success": true,
        "message": format!(
            "Cleanup complete: {} files deleted, {} errors",
            report.deleted, report.errors
        ),
        "timestamp": Utc::now(),
        "report": report,
    })))
}

/// GET /api/files/cleanup-stats - Current retention picture
pub async fn cleanup_stats(State(state): State<AppState>) -> Result<Json<Value>> {
    let cleanup = state.cleanup();
    let stats = cleanup.stats().await?;
    let config = cleanup.config();

    let last_sweep = cleanup.last_sweep();
    let next_cleanup = match (&last_sweep, config.enabled) {
        (Some((at, _)), true) => chrono::Duration::from_std(config.interval())
            .ok()
            .map(|interval| *at + interval),
        _ => None,
    };

    Ok(Json(json!({
        "success": true,
        "data": {
            "totalFiles": stats.total_files,
            "oldFiles": stats.old_files,
            "totalSize": stats.total_size,
            "oldFilesSize": stats.old_files_size,
            "totalSizeFormatted": format_bytes(stats.total_size),
            "oldFileSizeFormatted": format_bytes(stats.old_files_size),
            "cleanupThreshold": format_duration(config.max_age()),
            "nextCleanup": next_cleanup,
            "lastSweep": last_sweep.map(|(at, report)| json!({
                "timestamp": at,
                "report": report,
            })),
            "cumulative": cleanup.cumulative(),
        }
    })))
}
