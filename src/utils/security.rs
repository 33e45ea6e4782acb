use std::path::{Component, Path};
use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Path contains parent directory (..)")]
    ContainsParentDir,

    #[error("File path is absolute")]
    AbsolutePath,

    #[error("File path contains invalid component")]
    InvalidComponent,

    #[error("File path contains null byte")]
    NullByte,

    #[error("File path is empty")]
    Empty,

    #[error("Filename contains directory separator")]
    ContainsDirectorySeparator,
}

// Checks for: empty strings, null bytes, parent directory traversal, absolute paths
fn validate_path_components(path_str: &str) -> Result<(), ValidationError> {
    if path_str.trim().is_empty() {
        return Err(ValidationError::Empty);
    }

    // rust uses C-style APIs so \0 can end str early
    if path_str.contains('\0') {
        return Err(ValidationError::NullByte);
    }

    for component in Path::new(path_str).components() {
        match component {
            Component::Normal(_) => continue,
            Component::ParentDir => return Err(ValidationError::ContainsParentDir),
            Component::RootDir => return Err(ValidationError::AbsolutePath),
            Component::CurDir => return Err(ValidationError::InvalidComponent),
            Component::Prefix(_) => return Err(ValidationError::InvalidComponent), // Windows
        }
    }

    Ok(())
}

/// Upload names must be a single plain file name so the destination stays
/// inside the receive directory.
pub fn validate_filename(filename: &str) -> Result<(), ValidationError> {
    if filename.contains('/') || filename.contains('\\') {
        return Err(ValidationError::ContainsDirectorySeparator);
    }

    validate_path_components(filename)
}
