use thiserror::Error;

/// Failure while resolving children for iteration or serialization.
#[derive(Debug, Error)]
pub enum RenderError {
    /// A deferred thunk failed; the source is the error raised by author logic.
    #[error(transparent)]
    Deferred(Box<dyn std::error::Error + Send + Sync>),
    /// An element was appended inside itself.
    #[error("element <{0}> contains itself")]
    Cycle(String),
}

impl RenderError {
    pub fn deferred(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        RenderError::Deferred(Box::new(err))
    }
}

pub type RenderResult<T> = Result<T, RenderError>;
