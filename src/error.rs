/// Error types for the wallpaper library
///
/// Validation failures on tree mutations are returned before anything is
/// touched, so the in-memory state and the catalog on disk are unchanged when
/// one of them comes back.
use std::io;
use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, LibraryError>;

#[derive(Error, Debug)]
pub enum LibraryError {
    /// The library root could not be listed. The kind tells a missing
    /// directory apart from a permission problem.
    #[error("library root {path} is unreadable ({kind:?}): {source}")]
    LibraryUnreadable {
        path: PathBuf,
        kind: io::ErrorKind,
        #[source]
        source: io::Error,
    },

    /// A project.json could not be read or parsed
    #[error("project descriptor in {path} is unreadable: {reason}")]
    DescriptorUnreadable { path: PathBuf, reason: String },

    #[error("a folder named '{0}' already exists here")]
    DuplicateName(String),

    #[error("invalid folder name '{0}'")]
    InvalidName(String),

    #[error("virtual path not found: {0}")]
    NotFound(String),

    #[error("folder {0} is not empty")]
    FolderNotEmpty(String),

    #[error("cannot move folder {folder} into itself or one of its subfolders ({target})")]
    IllegalMove { folder: String, target: String },

    #[error("target folder not found: {0}")]
    TargetNotFound(String),

    #[error("unknown item id: {0}")]
    UnknownItem(String),

    /// Writing the catalog failed. The in-memory state is still the source of
    /// truth for this session but will be lost on restart.
    #[error("failed to persist catalog to {path}: {source}")]
    PersistenceFailure {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid library root {path}: {reason}")]
    InvalidLibraryRoot { path: PathBuf, reason: String },

    #[error("cannot import {0}: the source lies inside the library")]
    ImportSourceInsideLibrary(PathBuf),

    #[error("cannot import into {0}: destination already exists")]
    ImportDestinationExists(PathBuf),

    #[error("settings error: {0}")]
    Settings(String),

    #[error("catalog serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl LibraryError {
    /// True for the validation family: the operation was refused and nothing
    /// was changed.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            LibraryError::DuplicateName(_)
                | LibraryError::InvalidName(_)
                | LibraryError::NotFound(_)
                | LibraryError::FolderNotEmpty(_)
                | LibraryError::IllegalMove { .. }
                | LibraryError::TargetNotFound(_)
        )
    }
}
