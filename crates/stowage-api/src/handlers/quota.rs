use axum::{extract::State, Json};
use std::sync::Arc;
use stowage_services::QuotaStats;

use crate::error::HttpAppError;
use crate::extract::Caller;
use crate::state::AppState;

pub async fn quota_stats(
    State(state): State<Arc<AppState>>,
    Caller(ctx): Caller,
) -> Result<Json<QuotaStats>, HttpAppError> {
    let stats = state.services.quota.stats(&ctx.tenant_id).await?;
    Ok(Json(stats))
}
