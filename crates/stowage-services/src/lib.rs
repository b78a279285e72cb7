//! Stowage Services Layer
//!
//! Upload governance and storage lifecycle: the security gate and its checks,
//! temp -> permanent staging, quota computation, and the reclaim sweeps. The
//! HTTP and CLI crates only wire these services together.

pub mod attachment;
pub mod gate;
pub mod limits;
pub mod optimize;
pub mod quota;
pub mod staging;
pub mod sweeper;
pub mod upload;
pub mod validation;
pub mod wiring;

pub use attachment::{
    AttachmentService, DownloadLink, FinalizeFailure, FinalizeOutcome, PendingAttachment,
};
pub use gate::{GateDecision, SecurityGate};
pub use limits::UserUploadLimiter;
#[cfg(feature = "image")]
pub use optimize::ResizeOptimizer;
pub use optimize::{ImageOptimizer, NoopOptimizer, OptimizeOptions};
#[cfg(feature = "quota-cache")]
pub use quota::CachedQuotaManager;
pub use quota::{QuotaManager, QuotaProvider, QuotaStats, ReferenceSet};
pub use staging::{
    FailedPromotion, Promotion, PromotionError, RewriteOutcome, StagedObject, StagingStore,
};
pub use sweeper::{
    OrphanCursor, OrphanReportPage, ReclaimSweeper, SweepFailure, SweepReport, SweepScheduler,
    TempPrefixStats,
};
pub use upload::{UploadRequest, UploadService};
pub use validation::{ContentScanner, FileValidator, ValidationReport};
pub use wiring::StowageServices;

pub use stowage_infra::{InMemoryRateLimitStore, IpRateLimiter, RateLimitStore};
pub use stowage_storage::{create_storage, KeyLayout, Storage, StorageError};
