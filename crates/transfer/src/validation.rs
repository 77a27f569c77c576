use std::path::{Component, Path};

use crate::TransferError;

const MAX_FILE_NAME_LEN: usize = 255;

/// Validates a sender-declared file name before it is used on disk.
///
/// The receiver only ever writes a single plain file name into the output
/// directory. Rejects:
/// - Empty or whitespace-only names
/// - Any path separator (`/` or `\`)
/// - `.` and `..`
/// - Absolute paths and Windows prefixes (`C:`)
/// - Control characters
///
/// Returns the trimmed name.
pub fn sanitize_file_name(declared: &str) -> Result<String, TransferError> {
    let name = declared.trim();
    if name.is_empty() {
        return Err(TransferError::InvalidFileName("empty file name".into()));
    }

    if name.contains(['/', '\\']) {
        return Err(TransferError::InvalidFileName(format!(
            "path separators not allowed: {declared}"
        )));
    }

    if name.chars().any(char::is_control) {
        return Err(TransferError::InvalidFileName(format!(
            "control characters not allowed: {declared:?}"
        )));
    }

    if name.len() > MAX_FILE_NAME_LEN {
        return Err(TransferError::InvalidFileName(format!(
            "file name longer than {MAX_FILE_NAME_LEN} bytes"
        )));
    }

    let mut components = Path::new(name).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => {}
        (Some(Component::CurDir | Component::ParentDir), _) => {
            return Err(TransferError::InvalidFileName(format!(
                "relative directory not allowed: {declared}"
            )));
        }
        _ => {
            return Err(TransferError::InvalidFileName(format!(
                "not a plain file name: {declared}"
            )));
        }
    }

    if name.len() >= 2 && name.as_bytes()[1] == b':' {
        return Err(TransferError::InvalidFileName(format!(
            "drive prefix not allowed: {declared}"
        )));
    }

    Ok(name.to_string())
}
