// ABOUTME: Error types for the deckhand application
// ABOUTME: Provides structured error handling for each stage of the render pipeline

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DeckError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Document not found: {0}")]
    DocumentNotFound(String),

    #[error("Collection not found: {0}")]
    CollectionNotFound(String),

    #[error("Failed to load preprocessor {path:?}: {message}")]
    PreprocessorLoad { path: PathBuf, message: String },

    #[error("Preprocessor failed: {0}")]
    Preprocessor(String),

    #[error("Invalid front matter in {url}: {source}")]
    FrontMatter {
        url: String,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("Template error: {0}")]
    Template(#[from] minijinja::Error),

    #[error("Invalid pattern: {0}")]
    Regex(#[from] regex::Error),

    #[error("Invalid glob pattern: {0}")]
    Glob(#[from] glob::PatternError),

    #[error("File system error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to copy {from:?} to {to:?}: {source}")]
    Copy {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Headless browser error: {message}: {source}")]
    Browser {
        message: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Server error: {0}")]
    Server(String),

    #[error("Watch error: {0}")]
    Watch(String),
}

impl DeckError {
    /// Wrap a browser failure under a short description of the failed step.
    pub fn browser(
        message: impl Into<String>,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        DeckError::Browser {
            message: message.into(),
            source: source.into(),
        }
    }
}

impl From<notify::Error> for DeckError {
    fn from(err: notify::Error) -> Self {
        DeckError::Watch(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, DeckError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn browser_errors_keep_their_source() {
        let cause = anyhow::anyhow!("Timed out waiting for .reveal");
        let err = DeckError::browser("Presentation did not load", cause);

        assert_eq!(
            err.to_string(),
            "Headless browser error: Presentation did not load: Timed out waiting for .reveal"
        );
        let source = err.source().expect("Missing source");
        assert_eq!(source.to_string(), "Timed out waiting for .reveal");
    }

    #[test]
    fn browser_errors_accept_messages() {
        let err = DeckError::browser("Failed to build browser options", "missing path".to_string());
        assert_eq!(err.source().map(|e| e.to_string()).as_deref(), Some("missing path"));
    }
}
