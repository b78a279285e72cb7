//! File-type categories and the closed extension/MIME lookups behind them.

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;

/// File-type classification driving every policy lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Image,
    Document,
    Archive,
    Code,
}

impl Category {
    pub const ALL: [Category; 4] = [
        Category::Image,
        Category::Document,
        Category::Archive,
        Category::Code,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Image => "image",
            Category::Document => "document",
            Category::Archive => "archive",
            Category::Code => "code",
        }
    }

    /// Resolve a category from a lowercase, dot-prefixed extension (".png").
    ///
    /// Every allowed extension belongs to exactly one category.
    pub fn from_extension(ext: &str) -> Option<Category> {
        match ext {
            ".jpg" | ".jpeg" | ".png" | ".gif" | ".webp" | ".bmp" | ".tiff" => {
                Some(Category::Image)
            }
            ".pdf" | ".doc" | ".docx" | ".xls" | ".xlsx" | ".ppt" | ".pptx" => {
                Some(Category::Document)
            }
            ".zip" | ".rar" | ".7z" | ".gz" | ".tar" => Some(Category::Archive),
            ".txt" | ".js" | ".html" | ".css" | ".json" | ".xml" | ".py" | ".java" | ".cpp"
            | ".c" => Some(Category::Code),
            _ => None,
        }
    }

    /// Resolve a category from a MIME type. `text/plain` is listed by both the
    /// document and code policies; the first category in declaration order wins.
    pub fn from_mime(mime: &str) -> Option<Category> {
        Category::ALL
            .into_iter()
            .find(|category| category.policy().allows_mime(mime))
    }

    /// Detect the category of an upload. The extension is authoritative when it is
    /// known; otherwise the MIME type decides.
    pub fn detect(mime: &str, filename: &str) -> Option<Category> {
        extension_of(filename)
            .as_deref()
            .and_then(Category::from_extension)
            .or_else(|| Category::from_mime(&normalize_mime(mime)))
    }
}

impl FromStr for Category {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "image" => Ok(Category::Image),
            "document" => Ok(Category::Document),
            "archive" => Ok(Category::Archive),
            "code" => Ok(Category::Code),
            _ => Err(anyhow::anyhow!("Invalid category: {}", s)),
        }
    }
}

impl Display for Category {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.as_str())
    }
}

/// Lowercase, dot-prefixed extension of a filename (`"a.PNG"` -> `".png"`).
///
/// Dotfiles without a further dot (`".env"`) have no extension.
pub fn extension_of(filename: &str) -> Option<String> {
    let (stem, ext) = filename.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() {
        return None;
    }
    Some(format!(".{}", ext.to_lowercase()))
}

/// Strip parameters and lowercase a MIME type (`"Image/PNG; q=1"` -> `"image/png"`).
pub fn normalize_mime(mime: &str) -> String {
    mime.split(';').next().unwrap_or("").trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extension_of() {
        assert_eq!(extension_of("photo.JPG").as_deref(), Some(".jpg"));
        assert_eq!(extension_of("backup.tar.gz").as_deref(), Some(".gz"));
        assert_eq!(extension_of(".env"), None);
        assert_eq!(extension_of("README"), None);
        assert_eq!(extension_of("trailing."), None);
    }

    #[test]
    fn test_every_allowed_extension_maps_to_its_own_category() {
        for category in Category::ALL {
            for ext in category.policy().allowed_extensions {
                assert_eq!(Category::from_extension(ext), Some(category), "{ext}");
            }
        }
    }

    #[test]
    fn test_detect_prefers_extension() {
        assert_eq!(
            Category::detect("text/plain", "notes.txt"),
            Some(Category::Code)
        );
        assert_eq!(
            Category::detect("application/pdf", "report.pdf"),
            Some(Category::Document)
        );
        assert_eq!(
            Category::detect("image/png; charset=binary", "no-extension"),
            Some(Category::Image)
        );
        assert_eq!(Category::detect("application/x-unknown", "blob"), None);
    }

    #[test]
    fn test_from_str_roundtrip_names() {
        assert_eq!("IMAGE".parse::<Category>().unwrap(), Category::Image);
        assert!("video".parse::<Category>().is_err());
    }
}
