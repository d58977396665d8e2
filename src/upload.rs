//! Validation for documents uploaded through the web front end.

use thiserror::Error;

/// Largest accepted upload, in bytes.
pub const MAX_UPLOAD_BYTES: usize = 1024 * 1024;

/// Reasons an upload is refused before it reaches the indexer.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum UploadError {
    /// Body exceeds [`MAX_UPLOAD_BYTES`].
    #[error("file is too large ({size} bytes, limit {limit})")]
    TooLarge {
        /// Upload size in bytes.
        size: usize,
        /// Configured limit in bytes.
        limit: usize,
    },
    /// Only `.txt` documents are indexed.
    #[error("only .txt files are accepted, got {0:?}")]
    InvalidType(String),
    /// File name is empty or contains path components.
    #[error("invalid file name {0:?}")]
    InvalidName(String),
    /// Body is not valid UTF-8 text.
    #[error("file is not valid UTF-8 text")]
    NotUtf8,
}

/// Checks an upload's size and extension and returns the document name it
/// should be stored under.
///
/// Browsers may send a full client-side path; only the final component is
/// kept.
pub fn validate_upload(file_name: &str, len: usize) -> Result<String, UploadError> {
    if len > MAX_UPLOAD_BYTES {
        return Err(UploadError::TooLarge {
            size: len,
            limit: MAX_UPLOAD_BYTES,
        });
    }
    let base = file_name
        .rsplit(|ch: char| ch == '/' || ch == '\\')
        .next()
        .unwrap_or_default()
        .trim();
    let is_txt = base
        .rsplit_once('.')
        .is_some_and(|(_, ext)| ext.eq_ignore_ascii_case("txt"));
    if !is_txt {
        return Err(UploadError::InvalidType(file_name.to_string()));
    }
    let stem_len = base.len() - ".txt".len();
    if stem_len == 0 || base.starts_with('.') {
        return Err(UploadError::InvalidName(file_name.to_string()));
    }
    Ok(base.to_string())
}

/// Decodes an upload body as UTF-8 text.
pub fn decode_text(bytes: &[u8]) -> Result<String, UploadError> {
    String::from_utf8(bytes.to_vec()).map_err(|_| UploadError::NotUtf8)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn accepts_txt_case_insensitively() {
        assert_eq!(validate_upload("notes.TXT", 10).unwrap(), "notes.TXT");
        assert_eq!(validate_upload("notes.txt", 0).unwrap(), "notes.txt");
    }

    #[test]
    fn size_is_checked_before_type() {
        let err = validate_upload("photo.png", MAX_UPLOAD_BYTES + 1).unwrap_err();
        assert!(matches!(err, UploadError::TooLarge { .. }));
        assert!(validate_upload("a.txt", MAX_UPLOAD_BYTES).is_ok());
    }

    #[test]
    fn rejects_other_extensions() {
        assert_eq!(
            validate_upload("report.pdf", 5),
            Err(UploadError::InvalidType("report.pdf".into()))
        );
        assert!(matches!(
            validate_upload("README", 5),
            Err(UploadError::InvalidType(_))
        ));
    }

    #[test]
    fn strips_client_side_directories() {
        assert_eq!(
            validate_upload(r"C:\Users\me\docs\guide.txt", 5).unwrap(),
            "guide.txt"
        );
        assert_eq!(validate_upload("../../etc/x.txt", 5).unwrap(), "x.txt");
    }

    #[test]
    fn rejects_nameless_uploads() {
        assert!(matches!(
            validate_upload(".txt", 5),
            Err(UploadError::InvalidName(_))
        ));
        assert!(matches!(
            validate_upload("dir/", 5),
            Err(UploadError::InvalidType(_))
        ));
    }

    #[test]
    fn decodes_only_utf8() {
        assert_eq!(decode_text("héllo".as_bytes()).unwrap(), "héllo");
        assert_eq!(decode_text(&[0xff, 0xfe]), Err(UploadError::NotUtf8));
    }
}
