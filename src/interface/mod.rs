//! The in-container side of an evaluation.
//!
//! The evaluator and the solution run in separate containers that share the
//! job directories. They talk through files:
//!
//! 1. the evaluator prepares and writes `challenge-description/description.yaml`;
//! 2. the solution waits for it, runs and writes
//!    `challenge-solution-output/output-solution.yaml`;
//! 3. the evaluator waits for that, scores and writes
//!    `challenge-results/challenge_results.yaml`.
//!
//! Failures travel through the same files: the evaluator writes `{abort: msg}`
//! as parameters, the solution writes one of `invalid-environment`,
//! `invalid-evaluator` or `invalid-submission` as its output.

mod evaluator;
mod files;
mod solution;

pub use evaluator::EvaluatorContext;
pub use files::{ChallengeFile, FileSet};
pub use solution::SolutionContext;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_yaml::Value;
use std::any::Any;
use std::collections::BTreeMap;
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, error, info};

use crate::error::{EvaluatorError, Result};
use crate::layout::{CHALLENGE_PREVIOUS_STEPS_DIR, ENV_CHALLENGE_NAME, ENV_CHALLENGE_STEP_NAME};
use crate::results::{declare_challenge_results, ChallengeResults};

/// Written by the evaluator as challenge parameters when preparation fails.
pub const SPECIAL_ABORT: &str = "abort";
pub const SPECIAL_INVALID_ENVIRONMENT: &str = "invalid-environment";
pub const SPECIAL_INVALID_EVALUATOR: &str = "invalid-evaluator";
pub const SPECIAL_INVALID_SUBMISSION: &str = "invalid-submission";

pub const TIMEOUT_PREPARATION: Duration = Duration::from_secs(6000);
pub const TIMEOUT_SOLUTION: Duration = Duration::from_secs(6000);
const POLL_WAIT: Duration = Duration::from_secs(1);

pub type Dict = BTreeMap<String, Value>;

#[derive(Debug, Error)]
pub enum InterfaceError {
    #[error("{0}")]
    InvalidSubmission(String),

    #[error("{0}")]
    InvalidEvaluator(String),

    #[error("{0}")]
    InvalidEnvironment(String),

    #[error("{0}")]
    Timeout(String),

    #[error("{0}")]
    InvalidFile(String),

    #[error("{0}")]
    Unexpected(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Evaluator(#[from] EvaluatorError),
}

/// Implemented by submissions.
pub trait Solution {
    fn run(&mut self, ctx: &mut SolutionContext) -> std::result::Result<(), InterfaceError>;
}

/// Implemented by challenge evaluators.
pub trait Evaluator {
    fn prepare(&mut self, ctx: &mut EvaluatorContext) -> std::result::Result<(), InterfaceError>;
    fn score(&mut self, ctx: &mut EvaluatorContext) -> std::result::Result<(), InterfaceError>;
}

/// Write `data` as YAML, creating parent directories.
pub fn write_yaml<T: Serialize + ?Sized>(path: &Path, data: &T) -> Result<()> {
    let yaml = serde_yaml::to_string(data)?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let tmp = path.with_extension("yaml.tmp");
    std::fs::write(&tmp, yaml)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

pub fn read_yaml_file<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let data = std::fs::read_to_string(path)?;
    serde_yaml::from_str(&data).map_err(|e| {
        EvaluatorError::InvalidConfiguration(format!("Cannot parse {}: {}", path.display(), e))
    })
}

/// Poll until `path` exists.
pub fn wait_for_file(
    path: &Path,
    timeout: Duration,
    wait: Duration,
) -> std::result::Result<(), InterfaceError> {
    let t0 = Instant::now();
    while !path.exists() {
        let passed = t0.elapsed();
        if passed >= timeout {
            return Err(InterfaceError::Timeout(format!(
                "Timeout of {} s while waiting for {}.",
                timeout.as_secs(),
                path.display()
            )));
        }
        debug!(
            "Output {} not ready yet ({} secs passed, will wait {} secs more)",
            path.display(),
            passed.as_secs(),
            (timeout - passed).as_secs()
        );
        std::thread::sleep(wait.min(timeout - passed));
    }
    Ok(())
}

/// Challenge and step names as passed in the container environment.
#[derive(Debug, Clone, Default)]
pub struct StepIdentity {
    challenge_name: Option<String>,
    step_name: Option<String>,
}

impl StepIdentity {
    pub fn from_env() -> Self {
        Self {
            challenge_name: std::env::var(ENV_CHALLENGE_NAME).ok(),
            step_name: std::env::var(ENV_CHALLENGE_STEP_NAME).ok(),
        }
    }

    pub fn new(challenge_name: &str, step_name: &str) -> Self {
        Self {
            challenge_name: Some(challenge_name.to_string()),
            step_name: Some(step_name.to_string()),
        }
    }

    fn get(value: &Option<String>, var: &str) -> std::result::Result<String, InterfaceError> {
        value.clone().ok_or_else(|| {
            InterfaceError::InvalidEnvironment(format!("Environment variable {:?} not set", var))
        })
    }

    pub fn challenge_name(&self) -> std::result::Result<String, InterfaceError> {
        Self::get(&self.challenge_name, ENV_CHALLENGE_NAME)
    }

    pub fn current_step(&self) -> std::result::Result<String, InterfaceError> {
        Self::get(&self.step_name, ENV_CHALLENGE_STEP_NAME)
    }
}

fn list_dir(dir: &Path) -> std::result::Result<Vec<String>, InterfaceError> {
    let mut names = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        names.push(entry?.file_name().to_string_lossy().to_string());
    }
    names.sort();
    Ok(names)
}

fn completed_steps(root: &Path) -> std::result::Result<Vec<String>, InterfaceError> {
    let p = root.join(CHALLENGE_PREVIOUS_STEPS_DIR);
    if !p.exists() {
        return Err(InterfaceError::InvalidEnvironment(format!(
            "Directory not found {}",
            p.display()
        )));
    }
    list_dir(&p)
}

fn value_to_message(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        other => serde_yaml::to_string(other).unwrap_or_default(),
    }
}

fn single(key: &str, msg: String) -> Dict {
    let mut d = Dict::new();
    d.insert(key.to_string(), Value::from(msg));
    d
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Run user code, turning a panic into an error.
fn catch_panics<F>(f: F) -> std::result::Result<(), InterfaceError>
where
    F: FnOnce() -> std::result::Result<(), InterfaceError>,
{
    std::panic::catch_unwind(AssertUnwindSafe(f)).unwrap_or_else(|payload| {
        Err(InterfaceError::Unexpected(format!(
            "panicked: {}",
            panic_message(payload)
        )))
    })
}

fn failure_results(e: InterfaceError) -> ChallengeResults {
    match e {
        InterfaceError::InvalidSubmission(m) => {
            ChallengeResults::failed(format!("InvalidSubmission:\n{}", m))
        }
        InterfaceError::InvalidEvaluator(m) => {
            ChallengeResults::error(format!("InvalidEvaluator:\n{}", m))
        }
        InterfaceError::InvalidEnvironment(m) => {
            ChallengeResults::error(format!("InvalidEnvironment:\n{}", m))
        }
        other => ChallengeResults::error(format!("Unexpected exception:\n{}", other)),
    }
}

fn conclude(
    root: &Path,
    outcome: std::result::Result<ChallengeResults, InterfaceError>,
) -> std::result::Result<ChallengeResults, InterfaceError> {
    match outcome {
        Ok(cr) => {
            info!("Completed.");
            Ok(cr)
        }
        Err(e) => {
            let cr = failure_results(e);
            error!(
                "declare {}:\n{}",
                cr.status(),
                cr.msg.as_deref().unwrap_or_default()
            );
            declare_challenge_results(root, &cr)?;
            Ok(cr)
        }
    }
}

fn check_solution_output(out: &Dict) -> std::result::Result<(), InterfaceError> {
    if let Some(v) = out.get(SPECIAL_INVALID_ENVIRONMENT) {
        return Err(InterfaceError::InvalidEnvironment(value_to_message(v)));
    }
    if let Some(v) = out.get(SPECIAL_INVALID_EVALUATOR) {
        return Err(InterfaceError::InvalidEvaluator(value_to_message(v)));
    }
    if let Some(v) = out.get(SPECIAL_INVALID_SUBMISSION) {
        return Err(InterfaceError::InvalidSubmission(value_to_message(v)));
    }
    Ok(())
}

fn evaluate(
    evaluator: &mut dyn Evaluator,
    cie: &mut EvaluatorContext,
) -> std::result::Result<ChallengeResults, InterfaceError> {
    if let Err(e) = catch_panics(|| evaluator.prepare(cie)) {
        let msg = format!("Preparation aborted:\n{}", e);
        cie.set_challenge_parameters(single(SPECIAL_ABORT, msg));
        cie.after_prepare()?;
        return Err(e);
    }
    cie.after_prepare()?;

    cie.wait_for_solution()?;
    let out = cie.get_solution_output_dict()?;
    check_solution_output(&out)?;

    catch_panics(|| evaluator.score(cie))?;
    cie.after_score()
}

/// Run the full evaluator protocol rooted at `root` and declare the results.
pub fn wrap_evaluator(
    evaluator: &mut dyn Evaluator,
    root: impl Into<PathBuf>,
) -> std::result::Result<ChallengeResults, InterfaceError> {
    wrap_evaluator_with(evaluator, EvaluatorContext::new(root))
}

pub fn wrap_evaluator_with(
    evaluator: &mut dyn Evaluator,
    mut cie: EvaluatorContext,
) -> std::result::Result<ChallengeResults, InterfaceError> {
    let outcome = evaluate(evaluator, &mut cie);
    conclude(cie.root(), outcome)
}

/// Only the scoring phase, for steps whose solution output already exists.
pub fn wrap_scorer(
    evaluator: &mut dyn Evaluator,
    root: impl Into<PathBuf>,
) -> std::result::Result<ChallengeResults, InterfaceError> {
    wrap_scorer_with(evaluator, EvaluatorContext::new(root))
}

pub fn wrap_scorer_with(
    evaluator: &mut dyn Evaluator,
    mut cie: EvaluatorContext,
) -> std::result::Result<ChallengeResults, InterfaceError> {
    let outcome = catch_panics(|| evaluator.score(&mut cie)).and_then(|_| cie.after_score());
    conclude(cie.root(), outcome)
}

fn solve(
    solution: &mut dyn Solution,
    cis: &mut SolutionContext,
) -> std::result::Result<(), InterfaceError> {
    cis.get_challenge_name()?;
    cis.get_current_step()?;

    cis.wait_for_preparation().map_err(|e| match e {
        InterfaceError::Timeout(m) => {
            InterfaceError::InvalidEvaluator(format!("Timeout while waiting for evaluator: {}", m))
        }
        other => other,
    })?;

    let parameters = cis.get_challenge_parameters()?;
    if let Some(v) = parameters.get(SPECIAL_ABORT) {
        return Err(InterfaceError::InvalidEvaluator(format!(
            "I will not run solution because evaluator has aborted: \n{}",
            value_to_message(v)
        )));
    }

    catch_panics(|| solution.run(cis)).map_err(|e| match e {
        e @ (InterfaceError::InvalidSubmission(_)
        | InterfaceError::InvalidEnvironment(_)
        | InterfaceError::InvalidEvaluator(_)) => e,
        other => {
            InterfaceError::InvalidSubmission(format!("Uncaught exception in solution:\n{}", other))
        }
    })?;

    if let Some(msg) = cis.failure_declared() {
        return Err(InterfaceError::InvalidSubmission(format!(
            "Submission declares failure:\n{}",
            msg
        )));
    }
    if cis.solution_output_dict().is_none() {
        return Err(InterfaceError::InvalidSubmission(
            "solution_output_dict not set. Solution must use set_solution_output_dict().".into(),
        ));
    }
    Ok(())
}

/// Run the solution protocol rooted at `root`. Returns what was written as
/// the solution output.
pub fn wrap_solution(
    solution: &mut dyn Solution,
    root: impl Into<PathBuf>,
) -> std::result::Result<Dict, InterfaceError> {
    wrap_solution_with(solution, SolutionContext::new(root))
}

pub fn wrap_solution_with(
    solution: &mut dyn Solution,
    mut cis: SolutionContext,
) -> std::result::Result<Dict, InterfaceError> {
    if let Err(e) = solve(solution, &mut cis) {
        let (key, msg) = match e {
            InterfaceError::InvalidEnvironment(m) => {
                (SPECIAL_INVALID_ENVIRONMENT, format!("InvalidEnvironment:\n{}", m))
            }
            InterfaceError::InvalidEvaluator(m) => {
                (SPECIAL_INVALID_EVALUATOR, format!("InvalidEvaluator:\n{}", m))
            }
            InterfaceError::InvalidSubmission(m) => {
                (SPECIAL_INVALID_SUBMISSION, format!("Invalid solution:\n{}", m))
            }
            other => (
                SPECIAL_INVALID_ENVIRONMENT,
                format!("Uncaught exception: invalid wrap_evaluator:\n{}", other),
            ),
        };
        cis.error(&msg);
        cis.set_solution_output_dict(single(key, msg));
    }
    cis.finish()
}
