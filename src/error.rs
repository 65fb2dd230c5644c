use std::path::PathBuf;

use thiserror::Error;

/// Failures surfaced by player operations. None of these are fatal: the
/// event loop turns them into a status line and keeps running.
#[derive(Debug, Error)]
pub enum PlayerError {
    #[error("media backend is not available")]
    BackendUnavailable,

    #[error("no playable files loaded")]
    EmptyCatalog,

    #[error("a playlist named \"{0}\" already exists")]
    DuplicateName(String),

    #[error("no playlist named \"{0}\"")]
    UnknownPlaylist(String),

    #[error("playlist name must not be blank")]
    InvalidName,

    #[error("index {index} is out of range for {len} items")]
    OutOfRange { index: usize, len: usize },

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("playlist document is malformed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("cannot show image: {0}")]
    Image(#[from] image::ImageError),

    #[error("display error: {0}")]
    Display(String),

    #[error("backend error: {0}")]
    Backend(String),
}

impl PlayerError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

pub type PlayerResult<T> = Result<T, PlayerError>;
