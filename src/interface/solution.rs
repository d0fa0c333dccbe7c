use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, error, info};

use super::{
    completed_steps, list_dir, read_yaml_file, single, wait_for_file, write_yaml, Dict, FileSet,
    InterfaceError, StepIdentity, POLL_WAIT, SPECIAL_INVALID_SUBMISSION, TIMEOUT_PREPARATION,
};
use crate::layout::{
    CHALLENGE_DESCRIPTION_DIR, CHALLENGE_DESCRIPTION_YAML, CHALLENGE_PREVIOUS_STEPS_DIR,
    CHALLENGE_SOLUTION_OUTPUT_DIR, CHALLENGE_SOLUTION_OUTPUT_YAML,
};

type Result<T> = std::result::Result<T, InterfaceError>;

/// What a solution sees of the evaluation.
#[derive(Debug)]
pub struct SolutionContext {
    root: PathBuf,
    identity: StepIdentity,
    timeout: Duration,
    output_files: FileSet,
    output_dict: Option<Dict>,
    failure: Option<String>,
}

impl SolutionContext {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            identity: StepIdentity::from_env(),
            timeout: TIMEOUT_PREPARATION,
            output_files: FileSet::new(),
            output_dict: None,
            failure: None,
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

    pub fn get_challenge_parameters(&self) -> Result<Dict> {
        Ok(read_yaml_file(&self.root.join(CHALLENGE_DESCRIPTION_YAML))?)
    }

    /// Names of the files the evaluator prepared.
    pub fn get_challenge_files(&self) -> Result<Vec<String>> {
        list_dir(&self.root.join(CHALLENGE_DESCRIPTION_DIR))
    }

    pub fn get_challenge_file(&self, basename: &str) -> Result<PathBuf> {
        let path = self.root.join(CHALLENGE_DESCRIPTION_DIR).join(basename);
        if !path.exists() {
            return Err(InterfaceError::InvalidEvaluator(format!(
                "Could not get file {}",
                path.display()
            )));
        }
        Ok(path)
    }

    pub fn set_solution_output_dict(&mut self, data: Dict) {
        self.output_dict = Some(data);
    }

    pub fn solution_output_dict(&self) -> Option<&Dict> {
        self.output_dict.as_ref()
    }

    /// Mark the submission as failed, with an explanation.
    pub fn declare_failure(&mut self, msg: &str) {
        self.failure = Some(msg.to_string());
    }

    pub fn failure_declared(&self) -> Option<&str> {
        self.failure.as_deref()
    }

    pub fn set_solution_output_file(
        &mut self,
        basename: &str,
        from_file: &Path,
        description: Option<&str>,
    ) -> Result<()> {
        self.output_files
            .add(basename, from_file, description)
            .map_err(|e| {
                InterfaceError::InvalidSubmission(format!("Invalid set_solution_output_file(): {}", e))
            })
    }

    pub fn set_solution_output_file_from_data(
        &mut self,
        basename: &str,
        contents: impl Into<Vec<u8>>,
        description: Option<&str>,
    ) -> Result<()> {
        self.output_files
            .add_from_data(basename, contents, description)
            .map_err(|e| {
                InterfaceError::InvalidSubmission(format!(
                    "Invalid set_solution_output_file_from_data(): {}",
                    e
                ))
            })
    }

    pub fn info(&self, s: &str) {
        info!("solution: {}", s);
    }

    pub fn error(&self, s: &str) {
        error!("solution: {}", s);
    }

    pub fn debug(&self, s: &str) {
        debug!("solution: {}", s);
    }

    pub fn wait_for_preparation(&self) -> Result<()> {
        let path = self.root.join(CHALLENGE_DESCRIPTION_YAML);
        wait_for_file(&path, self.timeout, POLL_WAIT)
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
            return Err(InterfaceError::InvalidSubmission(format!(
                "No step {:?}",
                step_name
            )));
        }
        Ok(self
            .root
            .join(CHALLENGE_PREVIOUS_STEPS_DIR)
            .join(step_name)
            .join(CHALLENGE_SOLUTION_OUTPUT_DIR))
    }

    /// Files the solution produced in an earlier step.
    pub fn get_completed_step_solution_files(&self, step_name: &str) -> Result<Vec<String>> {
        list_dir(&self.step_output_dir(step_name)?)
    }

    pub fn get_completed_step_solution_file(&self, step_name: &str, basename: &str) -> Result<PathBuf> {
        let path = self.step_output_dir(step_name)?.join(basename);
        if !path.is_file() {
            return Err(InterfaceError::InvalidSubmission(format!(
                "No file {:?} in step {:?}",
                basename, step_name
            )));
        }
        Ok(path)
    }

    pub fn get_completed_step_solution_file_contents(
        &self,
        step_name: &str,
        basename: &str,
    ) -> Result<String> {
        let path = self.get_completed_step_solution_file(step_name, basename)?;
        Ok(std::fs::read_to_string(path)?)
    }

    /// Write the declared files, then the output dict.
    ///
    /// The evaluator wakes up on the output yaml, so it is written last. If
    /// the files cannot be written the dict declares an invalid submission.
    pub(super) fn finish(self) -> Result<Dict> {
        let dict = match self
            .output_files
            .write(&self.root.join(CHALLENGE_SOLUTION_OUTPUT_DIR))
        {
            Ok(()) => self.output_dict.unwrap_or_default(),
            Err(e) => {
                let msg = format!("Invalid solution:\nCould not write output files: {}", e);
                self.error(&msg);
                single(SPECIAL_INVALID_SUBMISSION, msg)
            }
        };
        write_yaml(&self.root.join(CHALLENGE_SOLUTION_OUTPUT_YAML), &dict)?;
        Ok(dict)
    }
}
