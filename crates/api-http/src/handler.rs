//! HTTP Route Handlers

use crate::error::ApiError;
use crate::types::{BackupListItem, BackupResponse, ListQuery};
use axum::extract::{Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use backy_core::application::Orchestrator;
use backy_core::domain::BackupStatus;
use std::sync::Arc;
use tracing::info;

pub type AppState = Arc<Orchestrator>;

/// Status code for a create call: settled-available, still running, or
/// settled unsuccessfully inside the fast-path window
fn create_status(status: BackupStatus) -> StatusCode {
    match status {
        BackupStatus::Available => StatusCode::CREATED,
        BackupStatus::Running => StatusCode::ACCEPTED,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// POST /backups
pub async fn create_backup(
    State(orchestrator): State<AppState>,
) -> Result<(StatusCode, Json<BackupResponse>), ApiError> {
    let job = orchestrator.create_backup().await?;
    let status = create_status(job.status);
    info!(job_id = %job.id, status = %job.status, http_status = %status.as_u16(), "Create backup answered");
    Ok((status, Json(BackupResponse::from(&job))))
}

/// GET /backups
pub async fn list_backups(
    State(orchestrator): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Response, ApiError> {
    let listing = orchestrator.list_backups().await?;
    if query.raw {
        return Ok((
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            listing.raw,
        )
            .into_response());
    }

    let items: Vec<BackupListItem> = listing.backups.iter().map(BackupListItem::from).collect();
    Ok(Json(items).into_response())
}

/// GET /backups/:id
pub async fn get_backup(
    State(orchestrator): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<BackupResponse>, ApiError> {
    let job = orchestrator.get_backup(&id).await?;
    Ok(Json(BackupResponse::from(&job)))
}

/// DELETE /backups/:id
pub async fn delete_backup(
    State(orchestrator): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<BackupResponse>, ApiError> {
    let job = orchestrator.delete_backup(&id).await?;
    info!(job_id = %id, status = %job.status, "Delete backup answered");
    Ok(Json(BackupResponse::from(&job)))
}
