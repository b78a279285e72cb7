//! Typed rejection reasons produced by the upload security pipeline.
//!
//! Each variant carries the structured values (limits, thresholds, offending
//! names) a client needs to localise the message or branch on the code.

use serde::Serialize;

use crate::models::{BoardKind, Category, Role};

#[derive(Debug, Clone, PartialEq, Serialize, thiserror::Error)]
#[serde(tag = "code", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UploadViolation {
    #[error("Filename is empty")]
    FilenameEmpty,

    #[error("Filename exceeds {max} characters")]
    FilenameTooLong { length: usize, max: usize },

    #[error("Filename contains forbidden characters")]
    FilenameForbiddenChars,

    #[error("Filename '{name}' is a reserved system name")]
    FilenameReserved { name: String },

    #[error("Filename may not start with '{prefix}'")]
    FilenameForbiddenPrefix { prefix: String },

    #[error("Extension '{extension}' is not allowed")]
    ForbiddenExtension { extension: String },

    #[error("Filename matches a forbidden script pattern")]
    ForbiddenPattern,

    #[error("Unsupported file extension '{extension}'")]
    UnsupportedExtension { extension: String },

    #[error("MIME type '{mime_type}' is not allowed")]
    ForbiddenMimeType { mime_type: String },

    #[error("Unsupported MIME type '{mime_type}'")]
    UnsupportedMimeType { mime_type: String },

    #[error("File size {size} bytes exceeds the {category} limit of {max} bytes")]
    FileTooLarge {
        size: u64,
        max: u64,
        category: Category,
    },

    #[error("Uploads from this address are blocked")]
    IpBlocked,

    #[error("Too many uploads from this address; banned for {retry_after_secs} more seconds")]
    IpBanned { retry_after_secs: u64 },

    #[error("More than {limit} uploads per minute; banned for {retry_after_secs} seconds")]
    IpRateExceeded { limit: usize, retry_after_secs: u64 },

    #[error("A signed-in user is required to upload")]
    MissingUser,

    #[error("Daily upload count reached ({count}/{limit})")]
    DailyFileCountExceeded { count: u64, limit: u64 },

    #[error("Daily upload volume would reach {would_be} bytes (limit {limit})")]
    DailyVolumeExceeded { would_be: u64, limit: u64 },

    #[error("Could not determine recent upload usage")]
    UsageLookupFailed,

    #[error("Role '{role}' may not upload {category} files")]
    CategoryNotPermitted { role: Role, category: Category },

    #[error("Role '{role}' may not post to the '{board}' board")]
    BoardNotPermitted { role: Role, board: String },

    #[error("File size {size} bytes exceeds the {role} limit of {max} bytes")]
    RoleFileSizeExceeded { size: u64, max: u64, role: Role },

    #[error("File content matches suspicious pattern '{pattern}'")]
    SuspiciousContent { pattern: String },
}

impl UploadViolation {
    /// Rate limit rejections carry a retry-after; everything else is permanent
    /// for the given input.
    pub fn retry_after_secs(&self) -> Option<u64> {
        match self {
            UploadViolation::IpBanned { retry_after_secs }
            | UploadViolation::IpRateExceeded {
                retry_after_secs, ..
            } => Some(*retry_after_secs),
            _ => None,
        }
    }

    pub fn board_not_permitted(role: Role, board: &str) -> Self {
        UploadViolation::BoardNotPermitted {
            role,
            board: BoardKind::parse(board)
                .map(|b| b.as_str().to_string())
                .unwrap_or_else(|| board.to_string()),
        }
    }
}
