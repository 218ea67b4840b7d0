//! Helpers for naming and typing uploaded payloads.

use crate::error::ValidationError;
use crate::types::ItemId;

/// Longest file name accepted, in bytes.
pub const MAX_FILE_NAME_LEN: usize = 255;

/// Content type used when the extension is not recognised.
pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Check that a display name can be embedded as a single blob key segment.
pub fn validate_file_name(name: &str) -> Result<(), ValidationError> {
    if name.is_empty() {
        return Err(ValidationError::MissingField("fileName"));
    }
    if name == "." || name == ".." {
        return Err(ValidationError::InvalidFileName(name.to_owned()));
    }
    if name.len() > MAX_FILE_NAME_LEN {
        return Err(ValidationError::InvalidFileName(format!(
            "name exceeds {MAX_FILE_NAME_LEN} bytes"
        )));
    }
    if name.chars().any(|c| c == '/' || c == '\\' || c.is_control()) {
        return Err(ValidationError::InvalidFileName(name.to_owned()));
    }
    Ok(())
}

/// Blob key for an item: `{id}/{name}`.
#[must_use]
pub fn blob_path_for(id: &ItemId, name: &str) -> String {
    format!("{id}/{name}")
}

/// Guess a content type from the file extension.
#[must_use]
pub fn infer_content_type(name: &str) -> &'static str {
    let ext = name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();

    match ext.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        _ => DEFAULT_CONTENT_TYPE,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_plain_names() {
        assert!(validate_file_name("screenshot.png").is_ok());
        assert!(validate_file_name("report final (2).pdf").is_ok());
        assert!(validate_file_name(".hidden").is_ok());
    }

    #[test]
    fn rejects_path_like_names() {
        for bad in ["a/b.png", "..\\evil", ".", "..", "line\nbreak"] {
            assert!(
                matches!(
                    validate_file_name(bad),
                    Err(ValidationError::InvalidFileName(_))
                ),
                "{bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn rejects_empty_and_oversized_names() {
        assert_eq!(
            validate_file_name(""),
            Err(ValidationError::MissingField("fileName"))
        );
        let long = "x".repeat(MAX_FILE_NAME_LEN + 1);
        assert!(validate_file_name(&long).is_err());
    }

    #[test]
    fn content_type_by_extension() {
        assert_eq!(infer_content_type("a.JPG"), "image/jpeg");
        assert_eq!(infer_content_type("a.jpeg"), "image/jpeg");
        assert_eq!(infer_content_type("a.png"), "image/png");
        assert_eq!(infer_content_type("a.gif"), "image/gif");
        assert_eq!(infer_content_type("a.webp"), "image/webp");
        assert_eq!(infer_content_type("a.tar.gz"), DEFAULT_CONTENT_TYPE);
        assert_eq!(infer_content_type("noext"), DEFAULT_CONTENT_TYPE);
    }

    #[test]
    fn blob_path_embeds_id_and_name() {
        let id = ItemId::new();
        assert_eq!(blob_path_for(&id, "x.png"), format!("{id}/x.png"));
    }
}
