use serde_yaml::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, error, info};

use super::{
    completed_steps, list_dir, read_yaml_file, wait_for_file, write_yaml, Dict, FileSet,
    InterfaceError, StepIdentity, POLL_WAIT, TIMEOUT_SOLUTION,
};
use crate::layout::{
    CHALLENGE_DESCRIPTION_DIR, CHALLENGE_DESCRIPTION_YAML, CHALLENGE_EVALUATION_OUTPUT_DIR,
    CHALLENGE_PREVIOUS_STEPS_DIR, CHALLENGE_SOLUTION_OUTPUT_DIR, CHALLENGE_SOLUTION_OUTPUT_YAML,
};
use crate::results::{declare_challenge_results, ChallengeResults, ChallengeResultsStatus};

type Result<T> = std::result::Result<T, InterfaceError>;

#[derive(Debug, Clone)]
pub struct ReportedScore {
    pub name: String,
    pub value: Value,
    pub description: Option<String>,
}

/// What an evaluator sees of the evaluation.
#[derive(Debug)]
pub struct EvaluatorContext {
    root: PathBuf,
    identity: StepIdentity,
    timeout: Duration,
    challenge_files: FileSet,
    parameters: Option<Dict>,
    evaluation_files: FileSet,
    scores: BTreeMap<String, ReportedScore>,
}

impl EvaluatorContext {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            identity: StepIdentity::from_env(),
            timeout: TIMEOUT_SOLUTION,
            challenge_files: FileSet::new(),
            parameters: None,
            evaluation_files: FileSet::new(),
            scores: BTreeMap::new(),
        }
    }

    pub fn with_identity(mut self, identity: StepIdentity) -> Self {
        self.identity = identity;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn get_tmp_dir(&self) -> Result<tempfile::TempDir> {
        Ok(tempfile::tempdir()?)
    }

    pub fn set_challenge_parameters(&mut self, data: Dict) {
        self.parameters = Some(data);
    }

    pub fn set_challenge_file(
        &mut self,
        basename: &str,
        from_file: &Path,
        description: Option<&str>,
    ) -> Result<()> {
        self.challenge_files
            .add(basename, from_file, description)
            .map_err(|e| InterfaceError::InvalidEvaluator(format!("Invalid set_challenge_file(): {}", e)))
    }

    pub fn wait_for_solution(&self) -> Result<()> {
        let path = self.root.join(CHALLENGE_SOLUTION_OUTPUT_YAML);
        wait_for_file(&path, self.timeout, POLL_WAIT)
            .map_err(|e| InterfaceError::InvalidSubmission(format!("Time out: {}", e)))
    }

    pub fn get_solution_output_dict(&self) -> Result<Dict> {
        Ok(read_yaml_file(&self.root.join(CHALLENGE_SOLUTION_OUTPUT_YAML))?)
    }

    pub fn get_solution_output_file(&self, basename: &str) -> Result<PathBuf> {
        let path = self.root.join(CHALLENGE_SOLUTION_OUTPUT_DIR).join(basename);
        if !path.exists() {
            return Err(InterfaceError::InvalidSubmission(format!(
                "Could not find file {}",
                path.display()
            )));
        }
        Ok(path)
    }

    pub fn get_solution_output_files(&self) -> Result<Vec<String>> {
        list_dir(&self.root.join(CHALLENGE_SOLUTION_OUTPUT_DIR))
    }

    /// Record a score. Non-finite numbers and repeated names are rejected.
    pub fn set_score(
        &mut self,
        name: &str,
        value: impl Into<Value>,
        description: Option<&str>,
    ) -> Result<()> {
        let value = value.into();
        if let Some(f) = value.as_f64() {
            if !f.is_finite() {
                return Err(InterfaceError::InvalidEvaluator(format!(
                    "Invalid value {} for score {:?}: we do not allow infinity or NaN.",
                    f, name
                )));
            }
        }
        if self.scores.contains_key(name) {
            return Err(InterfaceError::InvalidEvaluator(format!(
                "Already know score {:?}",
                name
            )));
        }
        self.scores.insert(
            name.to_string(),
            ReportedScore {
                name: name.to_string(),
                value,
                description: description.map(str::to_string),
            },
        );
        Ok(())
    }

    pub fn set_scores(&mut self, scores: BTreeMap<String, Value>) -> Result<()> {
        for (k, v) in scores {
            self.set_score(&k, v, None)?;
        }
        Ok(())
    }

    pub fn set_evaluation_file(
        &mut self,
        basename: &str,
        from_file: &Path,
        description: Option<&str>,
    ) -> Result<()> {
        self.evaluation_files
            .add(basename, from_file, description)
            .map_err(|e| InterfaceError::InvalidEvaluator(format!("Invalid set_evaluation_file(): {}", e)))
    }

    pub fn set_evaluation_file_from_data(
        &mut self,
        basename: &str,
        contents: impl Into<Vec<u8>>,
        description: Option<&str>,
    ) -> Result<()> {
        self.evaluation_files
            .add_from_data(basename, contents, description)
            .map_err(|e| {
                InterfaceError::InvalidEvaluator(format!(
                    "Invalid set_evaluation_file_from_data(): {}",
                    e
                ))
            })
    }

    /// Add every file below `realdir`, keeping the tree under `basename`.
    pub fn set_evaluation_dir(&mut self, basename: &str, realdir: &Path) -> Result<()> {
        for entry in std::fs::read_dir(realdir)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().to_string();
            let rel = format!("{}/{}", basename.trim_end_matches('/'), name);
            if entry.file_type()?.is_dir() {
                self.set_evaluation_dir(&rel, &entry.path())?;
            } else {
                self.set_evaluation_file(&rel, &entry.path(), None)?;
            }
        }
        Ok(())
    }

    pub fn info(&self, s: &str) {
        info!("evaluation: {}", s);
    }

    pub fn error(&self, s: &str) {
        error!("evaluation: {}", s);
    }

    pub fn debug(&self, s: &str) {
        debug!("evaluation: {}", s);
    }

    pub fn get_challenge_name(&self) -> Result<String> {
        self.identity.challenge_name()
    }

    pub fn get_current_step(&self) -> Result<String> {
        self.identity.current_step()
    }

    pub fn get_completed_steps(&self) -> Result<Vec<String>> {
        completed_steps(&self.root)
    }

    fn step_output_dir(&self, step_name: &str) -> Result<PathBuf> {
        if !self.get_completed_steps()?.iter().any(|s| s == step_name) {
            return Err(InterfaceError::InvalidEvaluator(format!("No step {:?}", step_name)));
        }
        Ok(self
            .root
            .join(CHALLENGE_PREVIOUS_STEPS_DIR)
            .join(step_name)
            .join(CHALLENGE_EVALUATION_OUTPUT_DIR))
    }

    pub fn get_completed_step_evaluation_files(&self, step_name: &str) -> Result<Vec<String>> {
        list_dir(&self.step_output_dir(step_name)?)
    }

    pub fn get_completed_step_evaluation_file(
        &self,
        step_name: &str,
        basename: &str,
    ) -> Result<PathBuf> {
        let path = self.step_output_dir(step_name)?.join(basename);
        if !path.is_file() {
            return Err(InterfaceError::InvalidEvaluator(format!(
                "No file {:?} in step {:?}",
                basename, step_name
            )));
        }
        Ok(path)
    }

    pub fn get_completed_step_evaluation_file_contents(
        &self,
        step_name: &str,
        basename: &str,
    ) -> Result<String> {
        let path = self.get_completed_step_evaluation_file(step_name, basename)?;
        Ok(std::fs::read_to_string(path)?)
    }

    /// Publish the challenge description for the solution.
    pub fn after_prepare(&mut self) -> Result<()> {
        let parameters = self.parameters.as_ref().ok_or_else(|| {
            InterfaceError::InvalidEvaluator(
                "Parameters not set. Evaluator must use set_challenge_parameters().".into(),
            )
        })?;
        self.challenge_files
            .write(&self.root.join(CHALLENGE_DESCRIPTION_DIR))?;
        write_yaml(&self.root.join(CHALLENGE_DESCRIPTION_YAML), parameters)?;
        Ok(())
    }

    /// Write evaluation files and declare success with the recorded scores.
    pub fn after_score(&mut self) -> Result<ChallengeResults> {
        if self.scores.is_empty() {
            return Err(InterfaceError::InvalidEvaluator("No scores created".into()));
        }
        self.evaluation_files
            .write(&self.root.join(CHALLENGE_EVALUATION_OUTPUT_DIR))?;

        let mut cr = ChallengeResults::new(ChallengeResultsStatus::Success, None);
        cr.scores = self
            .scores
            .values()
            .map(|s| (s.name.clone(), s.value.clone()))
            .collect();
        declare_challenge_results(&self.root, &cr)?;
        Ok(cr)
    }
}
