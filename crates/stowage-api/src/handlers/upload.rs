//! Upload ingress: multipart and base64 payloads land in temp storage.

use axum::{
    extract::{Multipart, State},
    http::StatusCode,
    Json,
};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use stowage_core::{AppError, Category};
use stowage_services::{StagedObject, UploadRequest};

use crate::error::{HttpAppError, ValidatedJson};
use crate::extract::Caller;
use crate::state::AppState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    pub key: String,
    pub url: String,
    pub size: u64,
    pub content_type: String,
    pub category: Category,
}

impl From<StagedObject> for UploadResponse {
    fn from(staged: StagedObject) -> Self {
        Self {
            key: staged.object.key,
            url: staged.url,
            size: staged.object.size,
            content_type: staged.object.content_type,
            category: staged.object.category,
        }
    }
}

struct MultipartUpload {
    file_name: String,
    content_type: String,
    data: Bytes,
    board: Option<String>,
}

/// Read exactly one `file` field plus an optional `board` text field.
async fn read_multipart(mut multipart: Multipart) -> Result<MultipartUpload, AppError> {
    let mut file: Option<(String, String, Bytes)> = None;
    let mut board = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::InvalidInput(format!("Failed to read multipart: {}", e)))?
    {
        match field.name().unwrap_or_default() {
            "file" => {
                if file.is_some() {
                    return Err(AppError::InvalidInput(
                        "Multiple file fields are not allowed; send exactly one field named 'file'"
                            .to_string(),
                    ));
                }
                let file_name = field.file_name().unwrap_or_default().to_string();
                let content_type = field
                    .content_type()
                    .unwrap_or("application/octet-stream")
                    .to_string();
                let data = field.bytes().await.map_err(|e| {
                    AppError::InvalidInput(format!("Failed to read file data: {}", e))
                })?;
                file = Some((file_name, content_type, data));
            }
            "board" => {
                let value = field.text().await.map_err(|e| {
                    AppError::InvalidInput(format!("Failed to read board field: {}", e))
                })?;
                board = Some(value).filter(|b| !b.trim().is_empty());
            }
            _ => {}
        }
    }

    let (file_name, content_type, data) =
        file.ok_or_else(|| AppError::InvalidInput("No file provided".to_string()))?;
    Ok(MultipartUpload {
        file_name,
        content_type,
        data,
        board,
    })
}

pub async fn upload_file(
    State(state): State<Arc<AppState>>,
    Caller(ctx): Caller,
    multipart: Multipart,
) -> Result<(StatusCode, Json<UploadResponse>), HttpAppError> {
    let upload = read_multipart(multipart).await?;

    let staged = state
        .services
        .uploads
        .upload(UploadRequest {
            ctx,
            original_name: upload.file_name,
            mime_type: upload.content_type,
            data: upload.data,
            board: upload.board,
        })
        .await?;

    tracing::info!(key = %staged.object.key, size_bytes = staged.object.size, "File uploaded to temp storage");
    Ok((StatusCode::CREATED, Json(staged.into())))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Base64UploadRequest {
    /// `data:<mime>;base64,<payload>` or bare base64.
    pub data: String,
    #[serde(default)]
    pub file_name: Option<String>,
    #[serde(default)]
    pub board: Option<String>,
}

pub async fn upload_base64(
    State(state): State<Arc<AppState>>,
    Caller(ctx): Caller,
    ValidatedJson(body): ValidatedJson<Base64UploadRequest>,
) -> Result<(StatusCode, Json<UploadResponse>), HttpAppError> {
    let staged = state
        .services
        .uploads
        .upload_base64(ctx, &body.data, body.file_name.as_deref(), body.board)
        .await?;

    tracing::info!(key = %staged.object.key, size_bytes = staged.object.size, "Pasted payload uploaded to temp storage");
    Ok((StatusCode::CREATED, Json(staged.into())))
}
