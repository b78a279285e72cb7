//! Post attachments: finalize staged uploads, list, download and delete.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use stowage_core::Attachment;
use stowage_services::{DownloadLink, FinalizeOutcome, PendingAttachment};

use crate::error::{HttpAppError, ValidatedJson};
use crate::extract::Caller;
use crate::state::AppState;

/// Signed URLs may not outlive a day regardless of what the client asks for.
const MAX_DOWNLOAD_TTL_SECS: u64 = 24 * 60 * 60;

#[derive(Debug, Deserialize)]
pub struct FinalizeRequest {
    pub uploads: Vec<PendingAttachment>,
}

pub async fn finalize_attachments(
    State(state): State<Arc<AppState>>,
    Caller(ctx): Caller,
    Path(post_id): Path<i64>,
    ValidatedJson(body): ValidatedJson<FinalizeRequest>,
) -> Result<Json<FinalizeOutcome>, HttpAppError> {
    let outcome = state
        .services
        .attachments
        .finalize(post_id, &ctx, body.uploads)
        .await?;
    Ok(Json(outcome))
}

pub async fn list_attachments(
    State(state): State<Arc<AppState>>,
    Path(post_id): Path<i64>,
) -> Result<Json<Vec<Attachment>>, HttpAppError> {
    let attachments = state.services.attachments.list_for_post(post_id).await?;
    Ok(Json(attachments))
}

#[derive(Debug, Deserialize)]
pub struct DownloadQuery {
    #[serde(default)]
    pub expires_in: Option<u64>,
}

pub async fn download_attachment(
    State(state): State<Arc<AppState>>,
    Path(attachment_id): Path<i64>,
    Query(query): Query<DownloadQuery>,
) -> Result<Json<DownloadLink>, HttpAppError> {
    let ttl = query
        .expires_in
        .map(|secs| Duration::from_secs(secs.clamp(1, MAX_DOWNLOAD_TTL_SECS)));
    let link = state
        .services
        .attachments
        .download_url(attachment_id, ttl)
        .await?;
    Ok(Json(link))
}

pub async fn delete_attachment(
    State(state): State<Arc<AppState>>,
    Caller(ctx): Caller,
    Path(attachment_id): Path<i64>,
) -> Result<StatusCode, HttpAppError> {
    state
        .services
        .attachments
        .delete(attachment_id, &ctx)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
