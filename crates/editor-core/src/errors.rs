pub type EditorResult<T> = Result<T, EditorError>;

#[derive(Debug, thiserror::Error)]
pub enum EditorError {
    /// `pos` (or `pos + len`) does not address the current document.
    #[error("position {pos} out of range for a document of {size} bytes")]
    OutOfRange { pos: usize, size: usize },

    /// An append buffer could not be allocated.
    #[error("failed to allocate an append buffer")]
    OutOfMemory,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Load was pointed at something that is not a regular file.
    #[error("not a regular file: {}", .0.display())]
    NotRegularFile(std::path::PathBuf),
}

impl From<std::collections::TryReserveError> for EditorError {
    fn from(_: std::collections::TryReserveError) -> Self {
        EditorError::OutOfMemory
    }
}
