use thiserror::Error;

/// Failure of a whole file's transform. Other files are unaffected.
#[derive(Debug, Error)]
pub enum TransformError {
    #[error("failed to parse {file}:{line}:{column}: {message}")]
    Parse {
        file: String,
        line: u32,
        column: u32,
        message: String,
    },

    #[error("failed to build source map for {file}: {source}")]
    SourceMap {
        file: String,
        #[source]
        source: sourcemap::Error,
    },
}

/// Returned by a resolver that could not map a locator to a local path.
/// Only the affected call site is skipped.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct ResolveError {
    message: String,
}

impl ResolveError {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into() }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<String> for ResolveError {
    fn from(message: String) -> Self {
        Self { message }
    }
}

impl From<&str> for ResolveError {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid scripts config: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid exclude pattern `{pattern}`: {source}")]
    Pattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}
