use serde::Serialize;
use stowage_core::models::{extension_of, normalize_mime};
use stowage_core::policy::{
    is_allowed_mime, is_forbidden_filename_char, matches_forbidden_pattern, FILENAME_MAX_LENGTH,
    FILENAME_MIN_LENGTH, FORBIDDEN_EXTENSIONS, FORBIDDEN_FILENAME_PREFIXES, FORBIDDEN_MIME_TYPES,
    RESERVED_FILENAMES,
};
use stowage_core::{Category, FileCandidate, UploadViolation};

/// Outcome of [`FileValidator::validate`]. Every failed check is listed.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ValidationReport {
    /// Category resolved from the extension, when it is an allowed one.
    pub category: Option<Category>,
    pub violations: Vec<UploadViolation>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.violations.is_empty()
    }

    /// Human readable messages, one per violation.
    pub fn errors(&self) -> Vec<String> {
        self.violations.iter().map(|v| v.to_string()).collect()
    }
}

/// Filename, extension, MIME and size checks against the static policy table.
///
/// Checks never short-circuit: a file that is too long, badly named and of a
/// denied type gets all three reported at once.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileValidator;

impl FileValidator {
    pub fn new() -> Self {
        Self
    }

    pub fn validate(&self, candidate: &FileCandidate) -> ValidationReport {
        let mut violations = Vec::new();

        violations.extend(Self::check_filename(&candidate.original_name));

        let extension = extension_of(&candidate.original_name);
        violations.extend(Self::check_extension(
            &candidate.original_name,
            extension.as_deref(),
        ));
        violations.extend(Self::check_mime(&candidate.mime_type));

        let category = extension.as_deref().and_then(Category::from_extension);
        if let Some(category) = category {
            let max = category.policy().max_size_bytes;
            if candidate.size > max {
                violations.push(UploadViolation::FileTooLarge {
                    size: candidate.size,
                    max,
                    category,
                });
            }
        }

        if !violations.is_empty() {
            tracing::debug!(
                filename = %candidate.original_name,
                mime_type = %candidate.mime_type,
                violation_count = violations.len(),
                "File failed validation"
            );
        }

        ValidationReport {
            category,
            violations,
        }
    }

    fn check_filename(name: &str) -> Vec<UploadViolation> {
        let mut violations = Vec::new();

        let length = name.chars().count();
        if length < FILENAME_MIN_LENGTH {
            violations.push(UploadViolation::FilenameEmpty);
            return violations;
        }
        if length > FILENAME_MAX_LENGTH {
            violations.push(UploadViolation::FilenameTooLong {
                length,
                max: FILENAME_MAX_LENGTH,
            });
        }

        if name.chars().any(is_forbidden_filename_char) {
            violations.push(UploadViolation::FilenameForbiddenChars);
        }

        let stem = match name.rsplit_once('.') {
            Some((stem, _)) if !stem.is_empty() => stem,
            _ => name,
        };
        let stem = stem.to_uppercase();
        if RESERVED_FILENAMES.contains(&stem.as_str()) {
            violations.push(UploadViolation::FilenameReserved { name: stem });
        }

        // Longest matching prefix, so "..x" reports ".." rather than "."
        if let Some(prefix) = FORBIDDEN_FILENAME_PREFIXES
            .iter()
            .filter(|p| name.starts_with(*p))
            .max_by_key(|p| p.len())
        {
            violations.push(UploadViolation::FilenameForbiddenPrefix {
                prefix: prefix.to_string(),
            });
        }

        violations
    }

    /// The deny-list and deny patterns are checked on their own, before the
    /// allow-list, so a denied extension is rejected whatever its MIME says.
    fn check_extension(name: &str, extension: Option<&str>) -> Vec<UploadViolation> {
        if let Some(ext) = extension {
            if FORBIDDEN_EXTENSIONS.contains(&ext) {
                return vec![UploadViolation::ForbiddenExtension {
                    extension: ext.to_string(),
                }];
            }
        }
        if matches_forbidden_pattern(name) {
            return vec![UploadViolation::ForbiddenPattern];
        }
        match extension {
            Some(ext) if Category::from_extension(ext).is_some() => Vec::new(),
            other => vec![UploadViolation::UnsupportedExtension {
                extension: other.unwrap_or_default().to_string(),
            }],
        }
    }

    fn check_mime(mime_type: &str) -> Vec<UploadViolation> {
        let mime = normalize_mime(mime_type);
        if FORBIDDEN_MIME_TYPES.contains(&mime.as_str()) {
            vec![UploadViolation::ForbiddenMimeType { mime_type: mime }]
        } else if !is_allowed_mime(&mime) {
            vec![UploadViolation::UnsupportedMimeType { mime_type: mime }]
        } else {
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stowage_core::policy::MB;

    fn validate(name: &str, mime: &str, size: u64) -> ValidationReport {
        FileValidator::new().validate(&FileCandidate::new(name, mime, size))
    }

    #[test]
    fn test_accepts_ordinary_files() {
        let report = validate("holiday photo.jpg", "image/jpeg", 2 * MB);
        assert!(report.is_valid(), "{:?}", report.violations);
        assert_eq!(report.category, Some(Category::Image));
    }

    #[test]
    fn test_accepts_korean_filenames() {
        assert!(validate("수업 자료.pdf", "application/pdf", MB).is_valid());
        assert!(validate("사진_2024.PNG", "image/png", MB).is_valid());
    }

    #[test]
    fn test_rejects_reserved_device_names() {
        for name in ["CON.txt", "con.txt", "COM1.pdf", "com1.pdf", "Lpt9.png"] {
            let report = validate(name, "text/plain", 10);
            assert!(
                report
                    .violations
                    .iter()
                    .any(|v| matches!(v, UploadViolation::FilenameReserved { .. })),
                "{} should be reserved",
                name
            );
        }
        assert!(validate("CONTRACT.pdf", "application/pdf", 10).is_valid());
    }

    #[test]
    fn test_denied_extension_wins_over_mime() {
        let report = validate("payload.js", "image/png", 10);
        assert!(!report.is_valid());
        assert!(report.violations.contains(&UploadViolation::ForbiddenExtension {
            extension: ".js".to_string()
        }));
    }

    #[test]
    fn test_forbidden_pattern() {
        let report = validate("shell.php7", "text/plain", 10);
        assert!(report.violations.contains(&UploadViolation::ForbiddenPattern));
    }

    #[test]
    fn test_aggregates_every_failure() {
        let name = format!("~{}.exe", "a".repeat(300));
        let report = validate(&name, "application/x-msdownload", 10);
        let codes: Vec<_> = report.violations.iter().collect();
        assert!(codes
            .iter()
            .any(|v| matches!(v, UploadViolation::FilenameTooLong { .. })));
        assert!(codes
            .iter()
            .any(|v| matches!(v, UploadViolation::FilenameForbiddenPrefix { prefix } if prefix == "~")));
        assert!(codes
            .iter()
            .any(|v| matches!(v, UploadViolation::ForbiddenExtension { .. })));
        assert!(codes
            .iter()
            .any(|v| matches!(v, UploadViolation::ForbiddenMimeType { .. })));
        assert_eq!(report.errors().len(), report.violations.len());
    }

    #[test]
    fn test_filename_characters_and_prefixes() {
        assert!(validate("a<b>.png", "image/png", 1)
            .violations
            .contains(&UploadViolation::FilenameForbiddenChars));
        assert!(validate("tab\there.png", "image/png", 1)
            .violations
            .contains(&UploadViolation::FilenameForbiddenChars));
        assert!(validate("..hidden.png", "image/png", 1)
            .violations
            .contains(&UploadViolation::FilenameForbiddenPrefix {
                prefix: "..".to_string()
            }));
        assert_eq!(
            validate("", "image/png", 1).violations.first(),
            Some(&UploadViolation::FilenameEmpty)
        );
    }

    #[test]
    fn test_unsupported_types() {
        let report = validate("notes.md", "text/markdown", 1);
        assert!(report.violations.contains(&UploadViolation::UnsupportedExtension {
            extension: ".md".to_string()
        }));
        assert!(report.violations.contains(&UploadViolation::UnsupportedMimeType {
            mime_type: "text/markdown".to_string()
        }));
        assert_eq!(report.category, None);

        let report = validate("README", "text/plain", 1);
        assert!(report.violations.contains(&UploadViolation::UnsupportedExtension {
            extension: String::new()
        }));
    }

    #[test]
    fn test_size_checked_against_extension_category() {
        let report = validate("big.png", "image/png", 10 * MB + 1);
        assert_eq!(
            report.violations,
            vec![UploadViolation::FileTooLarge {
                size: 10 * MB + 1,
                max: 10 * MB,
                category: Category::Image
            }]
        );
        assert!(validate("big.png", "image/png", 10 * MB).is_valid());
        assert!(validate("big.zip", "application/zip", 90 * MB).is_valid());
    }
}
