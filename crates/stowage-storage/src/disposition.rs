//! `Content-Disposition` values for downloads.

/// Build an attachment disposition that preserves non-ASCII names.
///
/// The plain `filename` parameter carries an ASCII fallback for old clients,
/// `filename*` carries the UTF-8 name percent-encoded.
pub fn content_disposition(filename: &str) -> String {
    let fallback: String = filename
        .chars()
        .map(|c| {
            if c.is_ascii() && !c.is_ascii_control() && c != '"' && c != '\\' {
                c
            } else {
                '_'
            }
        })
        .collect();
    format!(
        "attachment; filename=\"{}\"; filename*=UTF-8''{}",
        fallback,
        urlencoding::encode(filename)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ascii_name() {
        assert_eq!(
            content_disposition("report.pdf"),
            "attachment; filename=\"report.pdf\"; filename*=UTF-8''report.pdf"
        );
    }

    #[test]
    fn test_unicode_name_is_encoded() {
        let value = content_disposition("과제.pdf");
        assert!(value.starts_with("attachment; filename=\"__.pdf\""));
        assert!(value.ends_with("filename*=UTF-8''%EA%B3%BC%EC%A0%9C.pdf"));
    }

    #[test]
    fn test_quotes_are_replaced_in_fallback() {
        assert!(content_disposition("a\"b.txt").contains("filename=\"a_b.txt\""));
    }
}
