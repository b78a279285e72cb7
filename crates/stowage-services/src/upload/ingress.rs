//! Normalisation of raw upload inputs: filenames from multipart headers and
//! base64 payloads pasted from the editor.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use bytes::Bytes;
use stowage_core::models::normalize_mime;
use stowage_core::policy::{is_forbidden_filename_char, FILENAME_MAX_LENGTH};
use stowage_core::AppError;

pub const DEFAULT_PASTED_NAME: &str = "pasted-image.png";
const DEFAULT_PASTED_MIME: &str = "image/png";

/// Re-decode a filename whose UTF-8 bytes were read as Latin-1 by the multipart
/// parser ("ì\u{9d}´ë¯¸ì§\u{80}.png" -> "이미지.png"). Names that are not such
/// mojibake are returned unchanged.
pub fn repair_latin1_filename(name: &str) -> String {
    let looks_garbled = name.chars().any(|c| ('\u{80}'..='\u{ff}').contains(&c))
        && name.chars().all(|c| (c as u32) <= 0xff);
    if !looks_garbled {
        return name.to_string();
    }

    let bytes: Vec<u8> = name.chars().map(|c| c as u32 as u8).collect();
    match String::from_utf8(bytes) {
        Ok(repaired) => {
            tracing::debug!(original = %name, repaired = %repaired, "Repaired filename encoding");
            repaired
        }
        Err(_) => name.to_string(),
    }
}

/// Filename safe to hand back in a download header: path components dropped,
/// forbidden characters replaced, length capped.
pub fn sanitize_filename(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or_default();
    let cleaned: String = base
        .chars()
        .map(|c| if is_forbidden_filename_char(c) { '_' } else { c })
        .take(FILENAME_MAX_LENGTH)
        .collect();
    let cleaned = cleaned.trim();
    if cleaned.is_empty() {
        "file".to_string()
    } else {
        cleaned.to_string()
    }
}

/// A decoded base64 upload.
#[derive(Debug, Clone)]
pub struct DecodedPayload {
    pub data: Bytes,
    pub mime_type: String,
    pub file_name: String,
}

/// Decode `data:<mime>;base64,<payload>` or bare base64. The MIME type comes
/// from the data URL header and defaults to PNG.
pub fn decode_base64_payload(
    payload: &str,
    file_name: Option<&str>,
) -> Result<DecodedPayload, AppError> {
    let payload = payload.trim();
    let (mime_type, encoded) = match payload.strip_prefix("data:") {
        Some(rest) => {
            let (header, encoded) = rest.split_once(',').ok_or_else(|| {
                AppError::InvalidInput("Data URL is missing its payload".to_string())
            })?;
            let mime = header
                .strip_suffix(";base64")
                .ok_or_else(|| AppError::InvalidInput("Data URL is not base64 encoded".to_string()))?;
            let mime = normalize_mime(mime);
            let mime = if mime.is_empty() {
                DEFAULT_PASTED_MIME.to_string()
            } else {
                mime
            };
            (mime, encoded)
        }
        None => (DEFAULT_PASTED_MIME.to_string(), payload),
    };

    let compact: String = encoded.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    let data = STANDARD
        .decode(compact.as_bytes())
        .map_err(|e| AppError::InvalidInput(format!("Invalid base64 payload: {}", e)))?;
    if data.is_empty() {
        return Err(AppError::InvalidInput("Empty upload".to_string()));
    }

    let file_name = file_name
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .unwrap_or(DEFAULT_PASTED_NAME)
        .to_string();

    Ok(DecodedPayload {
        data: Bytes::from(data),
        mime_type,
        file_name,
    })
}
