//! Promote temp objects referenced by a saved post body.

use axum::{extract::State, Json};
use serde::Deserialize;
use std::sync::Arc;
use stowage_services::RewriteOutcome;

use crate::error::{HttpAppError, ValidatedJson};
use crate::extract::Caller;
use crate::state::AppState;

#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BodyFormat {
    #[default]
    Markup,
    /// Structured editor document serialised as JSON.
    Tree,
}

#[derive(Debug, Deserialize)]
pub struct PromoteRequest {
    pub body: String,
    #[serde(default)]
    pub format: BodyFormat,
}

/// Rewrites every temp URL in the body to its permanent URL. URLs whose
/// promotion failed are left untouched and listed in `failed`.
pub async fn promote_body(
    State(state): State<Arc<AppState>>,
    Caller(ctx): Caller,
    ValidatedJson(request): ValidatedJson<PromoteRequest>,
) -> Result<Json<RewriteOutcome>, HttpAppError> {
    let staging = &state.services.staging;
    let outcome = match request.format {
        BodyFormat::Markup => staging.rewrite_markup(&request.body).await,
        BodyFormat::Tree => staging.rewrite_tree(&request.body).await?,
    };

    if !outcome.is_complete() {
        tracing::warn!(
            tenant.id = %ctx.tenant_id,
            promoted = outcome.promoted.len(),
            failed = outcome.failed.len(),
            "Some temp objects could not be promoted"
        );
    }
    state.services.quota.invalidate(&ctx.tenant_id).await;
    Ok(Json(outcome))
}
