//! Application-wide error types.
//!
//! Library modules return [`Result`] with the crate [`Error`], while the
//! CLI and `main` use `anyhow` for convenient propagation.
//!
//! Per-item failures during an import are logged and swallowed by the
//! caller; only run-level failures travel all the way up to a task's
//! FAILED message, so the `Display` output is what a polling client sees.

/// Application-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level application error.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// File I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Migration error while opening the catalog
    #[error("Migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    /// HTTP error talking to a remote source
    #[error("Remote error: {0}")]
    Remote(#[from] reqwest::Error),

    /// WebDAV protocol error (bad URL, unexpected status)
    #[error("WebDAV error: {0}")]
    WebDav(String),

    /// File watcher error
    #[error("Watcher error: {0}")]
    Watch(#[from] crate::scanner::WatchError),

    /// Background task failed to complete
    #[error("Task join error: {0}")]
    Join(#[from] tokio::task::JoinError),

    /// Generic error with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    /// Create a WebDAV error.
    pub fn webdav(message: impl Into<String>) -> Self {
        Self::WebDav(message.into())
    }

    /// Add context to an error.
    pub fn context(self, ctx: impl Into<String>) -> Self {
        Self::WithContext {
            context: ctx.into(),
            source: Box::new(self),
        }
    }
}

/// Extension trait for adding context to Results.
pub trait ResultExt<T> {
    /// Add context to an error result.
    fn with_context(self, ctx: impl Into<String>) -> Result<T>;
}

impl<T> ResultExt<T> for Result<T> {
    fn with_context(self, ctx: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.context(ctx))
    }
}

impl<T> ResultExt<T> for std::result::Result<T, std::io::Error> {
    fn with_context(self, ctx: impl Into<String>) -> Result<T> {
        self.map_err(|e| Error::Io(e).context(ctx))
    }
}

impl<T> ResultExt<T> for std::result::Result<T, sqlx::Error> {
    fn with_context(self, ctx: impl Into<String>) -> Result<T> {
        self.map_err(|e| Error::Database(e).context(ctx))
    }
}
