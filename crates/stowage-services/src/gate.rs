//! Single admission decision for an upload, taken before any storage write.

use chrono::{DateTime, Utc};
use serde::Serialize;
use stowage_core::models::BoardKind;
use stowage_core::{AppError, Category, FileCandidate, UploadContext, UploadViolation};
use stowage_infra::IpRateLimiter;

use crate::limits::UserUploadLimiter;
use crate::validation::FileValidator;

/// Aggregated result of every gate check.
#[derive(Debug, Clone, Serialize)]
pub struct GateDecision {
    pub category: Option<Category>,
    pub violations: Vec<UploadViolation>,
}

impl GateDecision {
    pub fn is_allowed(&self) -> bool {
        self.violations.is_empty()
    }

    /// The admitted category, or the rejection to return to the caller.
    pub fn into_result(self) -> Result<Category, AppError> {
        match (self.category, self.violations.is_empty()) {
            (Some(category), true) => Ok(category),
            (None, true) => Err(AppError::InvalidInput(
                "Could not determine the file category".to_string(),
            )),
            (_, false) => Err(AppError::from_violations(self.violations)),
        }
    }
}

/// Composition of the IP limiter, the file validator, the user rolling limiter
/// and the role permission table. Holds no state of its own.
///
/// Every check runs even when an earlier one failed, so the caller always gets
/// the complete list.
#[derive(Clone)]
pub struct SecurityGate {
    ip_limiter: IpRateLimiter,
    validator: FileValidator,
    user_limiter: UserUploadLimiter,
}

impl SecurityGate {
    pub fn new(
        ip_limiter: IpRateLimiter,
        validator: FileValidator,
        user_limiter: UserUploadLimiter,
    ) -> Self {
        Self {
            ip_limiter,
            validator,
            user_limiter,
        }
    }

    pub async fn inspect(
        &self,
        ctx: &UploadContext,
        candidate: &FileCandidate,
        board: Option<&str>,
    ) -> GateDecision {
        self.inspect_at(ctx, candidate, board, Utc::now()).await
    }

    #[tracing::instrument(
        skip(self, ctx, candidate, now),
        fields(
            tenant.id = %ctx.tenant_id,
            user.role = %ctx.role,
            file.name = %candidate.original_name,
            file.size = candidate.size
        )
    )]
    pub async fn inspect_at(
        &self,
        ctx: &UploadContext,
        candidate: &FileCandidate,
        board: Option<&str>,
        now: DateTime<Utc>,
    ) -> GateDecision {
        let mut violations = Vec::new();

        if let Some(ip) = ctx.client_ip {
            if let Err(violation) = self.ip_limiter.check_at(ip, now).await {
                violations.push(violation);
            }
        }

        let report = self.validator.validate(candidate);
        violations.extend(report.violations);

        violations.extend(self.user_limiter.check(ctx, candidate.size, now).await);

        let category = report
            .category
            .or_else(|| Category::detect(&candidate.mime_type, &candidate.original_name));
        violations.extend(Self::check_role(ctx, category, candidate.size, board));

        if violations.is_empty() {
            tracing::debug!(category = ?category, "Upload admitted");
        } else {
            tracing::info!(
                violation_count = violations.len(),
                "Upload rejected by security gate"
            );
        }

        GateDecision {
            category,
            violations,
        }
    }

    fn check_role(
        ctx: &UploadContext,
        category: Option<Category>,
        size: u64,
        board: Option<&str>,
    ) -> Vec<UploadViolation> {
        let role = ctx.role;
        let permissions = role.permissions();
        let mut violations = Vec::new();

        if let Some(category) = category {
            if !permissions.allows_category(category) {
                violations.push(UploadViolation::CategoryNotPermitted { role, category });
            }
        }

        if let Some(board) = board {
            let allowed = BoardKind::parse(board).is_some_and(|b| permissions.allows_board(b));
            if !allowed {
                violations.push(UploadViolation::board_not_permitted(role, board));
            }
        }

        if size > permissions.max_file_size {
            violations.push(UploadViolation::RoleFileSizeExceeded {
                size,
                max: permissions.max_file_size,
                role,
            });
        }

        violations
    }
}
