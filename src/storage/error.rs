/// Errors returned by [`StorageApi`](super::StorageApi).
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// An internal error occurred.
    #[error("an internal error occurred")]
    InternalError(#[from] eyre::Error),
}
