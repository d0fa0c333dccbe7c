use thiserror::Error;

#[derive(Debug, Error)]
pub enum EvaluatorError {
    #[error("Invalid environment: {0}")]
    InvalidEnvironment(String),

    #[error("{0}")]
    MissingToken(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Server reported a problem: {0}")]
    RemoteProblem(String),

    #[error("{0}")]
    NothingLeft(String),

    #[error("{0}")]
    DockerComposeFail(String),

    #[error("Could not download all artefacts: {0}")]
    CouldNotDownloadAll(String),

    #[error("Corrupt cache or download for {rpath} at {path}: expected {expected} bytes, found {found}")]
    CorruptArtefact {
        rpath: String,
        path: String,
        expected: u64,
        found: u64,
    },

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Invalid challenge description: {0}")]
    InvalidChallengeDescription(String),

    #[error("{0}")]
    NotEquivalent(String),

    #[error("No challenge results found at {0}")]
    NoResults(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl EvaluatorError {
    /// Errors worth backing off for in continuous mode.
    pub fn is_connection(&self) -> bool {
        matches!(self, EvaluatorError::Connection(_) | EvaluatorError::Http(_))
    }
}

pub type Result<T> = std::result::Result<T, EvaluatorError>;

/// Prefix every line of `s` with `prefix`.
pub fn indent(s: &str, prefix: &str) -> String {
    s.lines()
        .map(|line| format!("{}{}", prefix, line.trim_end()))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_indent() {
        assert_eq!(indent("a\nb  \n", "> "), "> a\n> b");
        assert_eq!(indent("", "> "), "");
    }

    #[test]
    fn test_is_connection() {
        assert!(EvaluatorError::Connection("down".into()).is_connection());
        assert!(!EvaluatorError::NothingLeft("empty".into()).is_connection());
    }
}
