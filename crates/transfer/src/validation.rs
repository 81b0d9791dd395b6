use std::path::Path;

use crate::TransferError;

/// Upper bound on upload identifier length.
const MAX_FILE_ID_LEN: usize = 128;

/// Validates an upload identifier before it is placed in a URL path.
///
/// Accepts ASCII alphanumerics plus `_`, `-` and `.`; rejects `.` and `..`
/// on their own so an identifier can never name a parent directory.
pub fn validate_file_id(file_id: &str) -> Result<(), TransferError> {
    if file_id.is_empty() {
        return Err(TransferError::InvalidIdentifier("empty file id".into()));
    }
    if file_id.len() > MAX_FILE_ID_LEN {
        return Err(TransferError::InvalidIdentifier(format!(
            "file id longer than {MAX_FILE_ID_LEN} characters"
        )));
    }
    if file_id == "." || file_id == ".." {
        return Err(TransferError::InvalidIdentifier(format!(
            "reserved file id: {file_id}"
        )));
    }
    if let Some(bad) = file_id
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.')))
    {
        return Err(TransferError::InvalidIdentifier(format!(
            "invalid character {bad:?} in file id: {file_id}"
        )));
    }
    Ok(())
}

/// Name the server stores an upload under: the final path component.
pub fn upload_filename(path: &Path) -> Result<String, TransferError> {
    path.file_name()
        .and_then(|n| n.to_str())
        .filter(|n| !n.is_empty())
        .map(str::to_string)
        .ok_or_else(|| {
            TransferError::InvalidIdentifier(format!(
                "path has no usable file name: {}",
                path.display()
            ))
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_file_ids() {
        assert!(validate_file_id("1700000000000_k3j9x0abc").is_ok());
        assert!(validate_file_id("upload-1.part").is_ok());
        assert!(validate_file_id("a").is_ok());
    }

    #[test]
    fn rejects_empty_file_id() {
        assert!(validate_file_id("").is_err());
    }

    #[test]
    fn rejects_path_separators() {
        assert!(validate_file_id("a/b").is_err());
        assert!(validate_file_id("..\\x").is_err());
        assert!(validate_file_id("..").is_err());
        assert!(validate_file_id(".").is_err());
    }

    #[test]
    fn rejects_query_characters() {
        assert!(validate_file_id("a?b=1").is_err());
        assert!(validate_file_id("a b").is_err());
        assert!(validate_file_id("a#b").is_err());
    }

    #[test]
    fn rejects_overlong_file_id() {
        let id = "x".repeat(MAX_FILE_ID_LEN + 1);
        assert!(validate_file_id(&id).is_err());
        assert!(validate_file_id(&id[1..]).is_ok());
    }

    #[test]
    fn filename_from_path() {
        assert_eq!(
            upload_filename(Path::new("/videos/holiday.mp4")).unwrap(),
            "holiday.mp4"
        );
        assert_eq!(upload_filename(Path::new("notes.txt")).unwrap(), "notes.txt");
    }

    #[test]
    fn filename_missing() {
        assert!(upload_filename(Path::new("/")).is_err());
        assert!(upload_filename(Path::new("..")).is_err());
    }
}
