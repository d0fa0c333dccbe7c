use serde::{Deserialize, Serialize};
use serde_yaml::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use crate::error::{EvaluatorError, Result};
use crate::layout::CHALLENGE_RESULTS_YAML;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChallengeResultsStatus {
    Success,
    Failed,
    Error,
    Aborted,
}

impl ChallengeResultsStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChallengeResultsStatus::Success => "success",
            ChallengeResultsStatus::Failed => "failed",
            ChallengeResultsStatus::Error => "error",
            ChallengeResultsStatus::Aborted => "aborted",
        }
    }
}

impl fmt::Display for ChallengeResultsStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the evaluator container declares at the end of a step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChallengeResults {
    pub status: ChallengeResultsStatus,
    #[serde(default)]
    pub msg: Option<String>,
    #[serde(default)]
    pub scores: BTreeMap<String, Value>,
}

impl ChallengeResults {
    pub fn new(status: ChallengeResultsStatus, msg: Option<String>) -> Self {
        Self {
            status,
            msg,
            scores: BTreeMap::new(),
        }
    }

    pub fn error(msg: impl Into<String>) -> Self {
        Self::new(ChallengeResultsStatus::Error, Some(msg.into()))
    }

    pub fn failed(msg: impl Into<String>) -> Self {
        Self::new(ChallengeResultsStatus::Failed, Some(msg.into()))
    }

    pub fn status(&self) -> ChallengeResultsStatus {
        self.status
    }

    /// Payload sent to the server as `stats`.
    ///
    /// Fails when a score cannot be expressed in JSON, e.g. a mapping with
    /// sequence keys.
    pub fn get_stats(&self) -> Result<serde_json::Value> {
        let mut stats = serde_json::Map::new();
        stats.insert("scores".into(), serde_json::to_value(&self.scores)?);
        stats.insert("msg".into(), serde_json::to_value(&self.msg)?);
        Ok(serde_json::Value::Object(stats))
    }
}

pub fn read_challenge_results(wd: &Path) -> Result<ChallengeResults> {
    let path = wd.join(CHALLENGE_RESULTS_YAML);
    let data = match std::fs::read_to_string(&path) {
        Ok(d) => d,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(EvaluatorError::NoResults(path.display().to_string()));
        }
        Err(e) => return Err(e.into()),
    };
    serde_yaml::from_str(&data).map_err(|e| {
        EvaluatorError::InvalidConfiguration(format!(
            "Invalid challenge results in {}: {}",
            path.display(),
            e
        ))
    })
}

pub fn declare_challenge_results(root: &Path, cr: &ChallengeResults) -> Result<()> {
    let path = root.join(CHALLENGE_RESULTS_YAML);
    crate::interface::write_yaml(&path, cr)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_declare_then_read() {
        let tmp = tempfile::tempdir().unwrap();
        let mut cr = ChallengeResults::new(ChallengeResultsStatus::Success, None);
        cr.scores.insert("distance".into(), Value::from(12.5));
        declare_challenge_results(tmp.path(), &cr).unwrap();

        let back = read_challenge_results(tmp.path()).unwrap();
        assert_eq!(back, cr);
        assert_eq!(back.status().to_string(), "success");
    }

    #[test]
    fn test_missing_results() {
        let tmp = tempfile::tempdir().unwrap();
        let err = read_challenge_results(tmp.path()).unwrap_err();
        assert!(matches!(err, EvaluatorError::NoResults(_)));
    }

    #[test]
    fn test_malformed_results() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join(CHALLENGE_RESULTS_YAML);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "status: maybe\n").unwrap();
        assert!(matches!(
            read_challenge_results(tmp.path()).unwrap_err(),
            EvaluatorError::InvalidConfiguration(_)
        ));
    }

    #[test]
    fn test_stats_payload() {
        let cr = ChallengeResults::error("boom");
        let stats = cr.get_stats().unwrap();
        assert_eq!(stats["msg"], "boom");
        assert!(stats["scores"].as_object().unwrap().is_empty());
    }

    #[test]
    fn test_stats_with_non_string_score_key() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join(CHALLENGE_RESULTS_YAML);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(
            &path,
            "status: success\nscores:\n  per_episode:\n    [1, 2]: 3.0\n",
        )
        .unwrap();

        let cr = read_challenge_results(tmp.path()).unwrap();
        assert!(matches!(cr.get_stats(), Err(EvaluatorError::Json(_))));
    }
}
