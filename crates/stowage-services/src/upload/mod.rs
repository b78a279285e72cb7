//! Upload ingress: gate, quota, optional optimisation, then staging.

pub mod ingress;

pub use ingress::{decode_base64_payload, repair_latin1_filename, sanitize_filename, DecodedPayload};

use bytes::Bytes;
use std::sync::Arc;
use stowage_core::models::normalize_mime;
use stowage_core::{AppError, FileCandidate, UploadContext};

use crate::gate::SecurityGate;
use crate::optimize::{ImageOptimizer, OptimizeOptions};
use crate::quota::QuotaProvider;
use crate::staging::{StagedObject, StagingStore};
use crate::validation::ContentScanner;

/// A raw upload as received by the HTTP layer.
#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub ctx: UploadContext,
    pub original_name: String,
    pub mime_type: String,
    pub data: Bytes,
    /// Board the upload is destined for, when known.
    pub board: Option<String>,
}

#[derive(Clone)]
pub struct UploadService {
    gate: SecurityGate,
    quota: Arc<dyn QuotaProvider>,
    staging: StagingStore,
    scanner: ContentScanner,
    optimizer: Arc<dyn ImageOptimizer>,
}

impl UploadService {
    pub fn new(
        gate: SecurityGate,
        quota: Arc<dyn QuotaProvider>,
        staging: StagingStore,
        scanner: ContentScanner,
        optimizer: Arc<dyn ImageOptimizer>,
    ) -> Self {
        Self {
            gate,
            quota,
            staging,
            scanner,
            optimizer,
        }
    }

    /// Accept an upload into temp storage.
    ///
    /// Rejections carry the full violation list. Quota is checked after the
    /// gate and before any write; the check reserves nothing, so concurrent
    /// uploads can overshoot the limit together.
    #[tracing::instrument(
        skip(self, request),
        fields(
            tenant.id = %request.ctx.tenant_id,
            user.id = ?request.ctx.user_id,
            size_bytes = request.data.len()
        )
    )]
    pub async fn upload(&self, request: UploadRequest) -> Result<StagedObject, AppError> {
        let UploadRequest {
            ctx,
            original_name,
            mime_type,
            data,
            board,
        } = request;

        let original_name = repair_latin1_filename(&original_name);
        let mime_type = normalize_mime(&mime_type);
        let candidate = FileCandidate::new(original_name, mime_type, data.len() as u64);

        let decision = self.gate.inspect(&ctx, &candidate, board.as_deref()).await;
        let category = decision.category;
        let mut violations = decision.violations;
        if let Some(violation) = self.scanner.scan(&candidate.mime_type, &data) {
            violations.push(violation);
        }
        if !violations.is_empty() {
            return Err(AppError::from_violations(violations));
        }
        let category = category.ok_or_else(|| {
            AppError::InvalidInput("Could not determine the file category".to_string())
        })?;

        self.quota.check_quota(&ctx.tenant_id, candidate.size).await?;

        let data = if category.policy().auto_optimize {
            self.optimize(data, &candidate.mime_type).await
        } else {
            data
        };

        let staged = self
            .staging
            .create(
                &ctx.tenant_id,
                category,
                &candidate.original_name,
                &candidate.mime_type,
                data,
            )
            .await?;

        self.quota.invalidate(&ctx.tenant_id).await;
        Ok(staged)
    }

    /// Accept a base64 payload (data URL or bare base64) pasted from the editor.
    pub async fn upload_base64(
        &self,
        ctx: UploadContext,
        payload: &str,
        file_name: Option<&str>,
        board: Option<String>,
    ) -> Result<StagedObject, AppError> {
        let decoded = decode_base64_payload(payload, file_name)?;
        self.upload(UploadRequest {
            ctx,
            original_name: decoded.file_name,
            mime_type: decoded.mime_type,
            data: decoded.data,
            board,
        })
        .await
    }

    async fn optimize(&self, data: Bytes, content_type: &str) -> Bytes {
        let optimizer = self.optimizer.clone();
        let options = OptimizeOptions::for_content_type(content_type);
        let fallback = data.clone();
        match tokio::task::spawn_blocking(move || optimizer.optimize(data, &options)).await {
            Ok(optimized) => optimized,
            Err(e) => {
                tracing::warn!(error = %e, "Image optimization task failed, keeping original");
                fallback
            }
        }
    }
}
