//! Static upload policy table.
//!
//! Every rule is a constant or a `match` over a closed enum, so the table is
//! read-only at runtime and cannot drift out of sync with `Category` or `Role`.

use regex::{Regex, RegexBuilder};
use std::sync::LazyLock;
use std::time::Duration;

use crate::models::{BoardKind, Category, Role};

pub const MB: u64 = 1024 * 1024;
pub const GB: u64 = 1024 * MB;

/// Per-category acceptance rules.
#[derive(Debug, Clone, Copy)]
pub struct CategoryPolicy {
    pub category: Category,
    pub allowed_mime_types: &'static [&'static str],
    pub allowed_extensions: &'static [&'static str],
    pub max_size_bytes: u64,
    pub auto_optimize: bool,
    pub generate_thumbnail: bool,
    /// Longest edge accepted before optimisation kicks in.
    pub max_dimensions: Option<(u32, u32)>,
    pub description: &'static str,
}

impl CategoryPolicy {
    pub fn allows_mime(&self, mime: &str) -> bool {
        self.allowed_mime_types.contains(&mime)
    }

    pub fn allows_extension(&self, ext: &str) -> bool {
        self.allowed_extensions.contains(&ext)
    }
}

const IMAGE_POLICY: CategoryPolicy = CategoryPolicy {
    category: Category::Image,
    allowed_mime_types: &[
        "image/jpeg",
        "image/jpg",
        "image/png",
        "image/gif",
        "image/webp",
        "image/bmp",
        "image/tiff",
    ],
    allowed_extensions: &[".jpg", ".jpeg", ".png", ".gif", ".webp", ".bmp", ".tiff"],
    max_size_bytes: 10 * MB,
    auto_optimize: true,
    generate_thumbnail: true,
    max_dimensions: Some((4096, 4096)),
    description: "Image files",
};

const DOCUMENT_POLICY: CategoryPolicy = CategoryPolicy {
    category: Category::Document,
    allowed_mime_types: &[
        "application/pdf",
        "application/msword",
        "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        "application/vnd.ms-excel",
        "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        "application/vnd.ms-powerpoint",
        "application/vnd.openxmlformats-officedocument.presentationml.presentation",
        "text/plain",
    ],
    allowed_extensions: &[".pdf", ".doc", ".docx", ".xls", ".xlsx", ".ppt", ".pptx"],
    max_size_bytes: 50 * MB,
    auto_optimize: false,
    generate_thumbnail: false,
    max_dimensions: None,
    description: "Document files",
};

const ARCHIVE_POLICY: CategoryPolicy = CategoryPolicy {
    category: Category::Archive,
    allowed_mime_types: &[
        "application/zip",
        "application/x-rar-compressed",
        "application/x-7z-compressed",
        "application/gzip",
        "application/x-tar",
    ],
    allowed_extensions: &[".zip", ".rar", ".7z", ".gz", ".tar"],
    max_size_bytes: 100 * MB,
    auto_optimize: false,
    generate_thumbnail: false,
    max_dimensions: None,
    description: "Compressed archives",
};

const CODE_POLICY: CategoryPolicy = CategoryPolicy {
    category: Category::Code,
    allowed_mime_types: &[
        "text/plain",
        "text/javascript",
        "text/html",
        "text/css",
        "application/json",
        "text/xml",
    ],
    allowed_extensions: &[
        ".txt", ".js", ".html", ".css", ".json", ".xml", ".py", ".java", ".cpp", ".c",
    ],
    max_size_bytes: 5 * MB,
    auto_optimize: false,
    generate_thumbnail: false,
    max_dimensions: None,
    description: "Source code and text files",
};

impl Category {
    pub fn policy(&self) -> &'static CategoryPolicy {
        match self {
            Category::Image => &IMAGE_POLICY,
            Category::Document => &DOCUMENT_POLICY,
            Category::Archive => &ARCHIVE_POLICY,
            Category::Code => &CODE_POLICY,
        }
    }
}

/// Whether a MIME type appears in any category's allow-list.
pub fn is_allowed_mime(mime: &str) -> bool {
    Category::ALL.iter().any(|c| c.policy().allows_mime(mime))
}

/// Per-role limits and permissions.
#[derive(Debug, Clone, Copy)]
pub struct RolePermissions {
    pub max_file_size: u64,
    /// Files a user may upload in a rolling 24 hour window.
    pub max_files_per_post: u64,
    pub allowed_boards: &'static [BoardKind],
    pub allowed_categories: &'static [Category],
    /// Bytes a user may upload in a rolling 24 hour window.
    pub daily_upload_limit: u64,
}

impl RolePermissions {
    pub fn allows_category(&self, category: Category) -> bool {
        self.allowed_categories.contains(&category)
    }

    pub fn allows_board(&self, board: BoardKind) -> bool {
        self.allowed_boards.contains(&board)
    }
}

const ALL_BOARDS: &[BoardKind] = &[BoardKind::Free, BoardKind::Education, BoardKind::Notice];

impl Role {
    pub fn permissions(&self) -> RolePermissions {
        match self {
            Role::Student => RolePermissions {
                max_file_size: 10 * MB,
                max_files_per_post: 5,
                allowed_boards: &[BoardKind::Free],
                allowed_categories: &[Category::Image, Category::Document],
                daily_upload_limit: 50 * MB,
            },
            Role::Teacher => RolePermissions {
                max_file_size: 50 * MB,
                max_files_per_post: 10,
                allowed_boards: &[BoardKind::Free, BoardKind::Education],
                allowed_categories: &Category::ALL,
                daily_upload_limit: 200 * MB,
            },
            Role::Manager => RolePermissions {
                max_file_size: 100 * MB,
                max_files_per_post: 15,
                allowed_boards: ALL_BOARDS,
                allowed_categories: &Category::ALL,
                daily_upload_limit: 500 * MB,
            },
            Role::Admin => RolePermissions {
                max_file_size: 200 * MB,
                max_files_per_post: 20,
                allowed_boards: ALL_BOARDS,
                allowed_categories: &Category::ALL,
                daily_upload_limit: GB,
            },
        }
    }
}

/// Limits applied to one post at finalize time.
pub const MAX_FILES_PER_POST: usize = 10;
pub const MAX_TOTAL_SIZE_PER_POST: u64 = 200 * MB;

pub const FORBIDDEN_EXTENSIONS: &[&str] = &[
    ".exe", ".bat", ".cmd", ".com", ".scr", ".pif", ".vbs", ".vbe", ".js", ".jse", ".jar",
    ".class", ".dex", ".apk", ".ipa", ".php", ".asp", ".aspx", ".jsp", ".cfm", ".cgi", ".pl",
    ".sh", ".bash", ".zsh", ".fish", ".ps1", ".psm1", ".msi", ".deb", ".rpm", ".dmg", ".pkg",
    ".app", ".dll", ".so", ".dylib", ".sys", ".drv",
];

pub const FORBIDDEN_MIME_TYPES: &[&str] = &[
    "application/x-executable",
    "application/x-msdownload",
    "application/x-dosexec",
    "application/java-archive",
    "application/x-java-archive",
];

static FORBIDDEN_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [r"\.php\d*$", r"\.asp\w*$", r"\.jsp\w*$", r"\.(sh|bash|zsh)$"]
        .iter()
        .filter_map(|p| RegexBuilder::new(p).case_insensitive(true).build().ok())
        .collect()
});

/// Whether a filename matches one of the script deny patterns.
pub fn matches_forbidden_pattern(filename: &str) -> bool {
    FORBIDDEN_PATTERNS.iter().any(|re| re.is_match(filename))
}

pub const FILENAME_MAX_LENGTH: usize = 255;
pub const FILENAME_MIN_LENGTH: usize = 1;

pub const RESERVED_FILENAMES: &[&str] = &[
    "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8",
    "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
];

pub const FORBIDDEN_FILENAME_PREFIXES: &[&str] = &[".", "..", "~"];

/// Characters that are never valid inside a filename.
pub fn is_forbidden_filename_char(c: char) -> bool {
    matches!(c, '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*') || (c as u32) < 0x20
}

/// Per-IP sliding window thresholds.
#[derive(Debug, Clone)]
pub struct IpRateLimitPolicy {
    pub enabled: bool,
    pub max_uploads_per_minute: usize,
    pub ban_duration: Duration,
    pub whitelist: Vec<std::net::IpAddr>,
    pub blacklist: Vec<std::net::IpAddr>,
}

impl Default for IpRateLimitPolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            max_uploads_per_minute: 10,
            ban_duration: Duration::from_secs(60 * 60),
            whitelist: Vec::new(),
            blacklist: Vec::new(),
        }
    }
}

pub const RATE_WINDOW: Duration = Duration::from_secs(60);

/// Pattern-based text scanning. Off unless explicitly enabled.
#[derive(Debug, Clone, Copy)]
pub struct ContentScanPolicy {
    pub enabled: bool,
    pub max_scan_size: u64,
}

impl Default for ContentScanPolicy {
    fn default() -> Self {
        Self {
            enabled: false,
            max_scan_size: 10 * MB,
        }
    }
}

pub const SUSPICIOUS_CONTENT_PATTERNS: &[&str] = &[
    r"(?i)<script\s*>",
    r"(?i)javascript:",
    r"(?i)vbscript:",
    r"(?i)onload\s*=",
    r"(?i)onerror\s*=",
    r"(?i)onclick\s*=",
];

pub const TEMP_FILE_MAX_AGE: Duration = Duration::from_secs(24 * 60 * 60);
pub const TEMP_CLEANUP_INTERVAL: Duration = Duration::from_secs(60 * 60);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forbidden_patterns_case_insensitive() {
        assert!(matches_forbidden_pattern("shell.PHP5"));
        assert!(matches_forbidden_pattern("page.aspx"));
        assert!(matches_forbidden_pattern("view.JSPX"));
        assert!(matches_forbidden_pattern("install.zsh"));
        assert!(!matches_forbidden_pattern("photo.png"));
        assert!(!matches_forbidden_pattern("php-notes.txt"));
    }

    #[test]
    fn test_role_tiers_grow_monotonically() {
        let tiers = [Role::Student, Role::Teacher, Role::Manager, Role::Admin];
        for pair in tiers.windows(2) {
            let (lower, higher) = (pair[0].permissions(), pair[1].permissions());
            assert!(lower.max_file_size < higher.max_file_size);
            assert!(lower.daily_upload_limit < higher.daily_upload_limit);
        }
    }

    #[test]
    fn test_student_restrictions() {
        let perms = Role::Student.permissions();
        assert!(perms.allows_category(Category::Image));
        assert!(!perms.allows_category(Category::Archive));
        assert!(!perms.allows_board(BoardKind::Notice));
    }

    #[test]
    fn test_text_plain_is_allowed_mime() {
        assert!(is_allowed_mime("text/plain"));
        assert!(!is_allowed_mime("application/x-msdownload"));
    }
}
