/// Application error type
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Duplicate: {0}")]
    Duplicate(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Self share: {0}")]
    SelfShare(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Discriminant of [`AppError`] for callers that branch on the failure class
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Database,
    Duplicate,
    NotFound,
    InvalidArgument,
    SelfShare,
    Io,
}

impl AppError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AppError::Database(_) => ErrorKind::Database,
            AppError::Duplicate(_) => ErrorKind::Duplicate,
            AppError::NotFound(_) => ErrorKind::NotFound,
            AppError::InvalidArgument(_) => ErrorKind::InvalidArgument,
            AppError::SelfShare(_) => ErrorKind::SelfShare,
            AppError::Io(_) => ErrorKind::Io,
        }
    }

    /// Caller-facing message, without the variant prefix
    pub fn message(&self) -> String {
        match self {
            AppError::Duplicate(msg)
            | AppError::NotFound(msg)
            | AppError::InvalidArgument(msg)
            | AppError::SelfShare(msg) => msg.clone(),
            AppError::Database(e) => e.to_string(),
            AppError::Io(e) => e.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
