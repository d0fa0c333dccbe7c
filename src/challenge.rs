//! Challenge definitions as exchanged with the server.
//!
//! Parsing is strict: unknown keys are rejected so that typos in a challenge
//! definition surface as errors instead of being silently ignored.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_yaml::Value;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, error, info};

use crate::error::{indent, EvaluatorError, Result};
use crate::layout::SUBMISSION_CONTAINER_TAG;

pub const STATE_START: &str = "START";
pub const STATE_ERROR: &str = "ERROR";
pub const STATE_SUCCESS: &str = "SUCCESS";
pub const STATE_FAILED: &str = "FAILED";

const TERMINAL_STATES: [&str; 3] = [STATE_ERROR, STATE_FAILED, STATE_SUCCESS];
const ALLOWED_PERMISSIONS: [&str; 4] = ["snoop", "change", "moderate", "grant"];

/// Status of a job as known to the server.
pub const ALLOWED_JOB_STATUS: [&str; 6] =
    ["evaluating", "timeout", "failed", "error", "success", "aborted"];
/// Statuses a finished job can end with; only these can trigger a transition.
pub const TRANSITION_CONDITIONS: [&str; 4] = ["success", "failed", "error", "aborted"];
pub const STATUS_ABORTED: &str = "aborted";
pub const STATUS_SUCCESS: &str = "success";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Build {
    #[serde(default = "default_context")]
    pub context: String,
    #[serde(default = "default_dockerfile")]
    pub dockerfile: String,
    #[serde(default)]
    pub args: BTreeMap<String, Value>,
}

fn default_context() -> String {
    ".".to_string()
}

fn default_dockerfile() -> String {
    "Dockerfile".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServiceDefinition {
    #[serde(alias = "container")]
    pub image: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub environment: BTreeMap<String, Value>,
    #[serde(default)]
    pub image_digest: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub build: Option<Build>,
}

impl ServiceDefinition {
    pub fn is_submission(&self) -> bool {
        self.image == SUBMISSION_CONTAINER_TAG
    }

    pub fn equivalent(&self, other: &ServiceDefinition) -> Result<()> {
        if !self.is_submission() {
            match (&self.image_digest, &other.image_digest) {
                (Some(a), Some(b)) if a != b => {
                    return Err(EvaluatorError::NotEquivalent(format!(
                        "Different digests:\n\n  {}\n\n  {}",
                        a, b
                    )));
                }
                (Some(_), Some(_)) => {}
                _ => {
                    return Err(EvaluatorError::NotEquivalent(format!(
                        "No digest information, assuming different.\nself: {}\nother: {}",
                        self.image, other.image
                    )));
                }
            }
        }
        if self.environment != other.environment {
            return Err(EvaluatorError::NotEquivalent(format!(
                "Different environments:\n\n {:?}\n\n  {:?}",
                self.environment, other.environment
            )));
        }
        Ok(())
    }
}

/// The compose-like description of the containers of one step.
///
/// ```yaml
/// version: '3'
/// services:
///   evaluator:
///     image: imagename
///     environment:
///       var: var
///   solution:
///     image: SUBMISSION_CONTAINER
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EvaluationParameters {
    #[serde(default = "default_version", deserialize_with = "string_or_number")]
    pub version: String,
    pub services: BTreeMap<String, ServiceDefinition>,
}

fn default_version() -> String {
    "3".to_string()
}

impl EvaluationParameters {
    pub fn from_yaml(value: &Value) -> Result<Self> {
        let params: EvaluationParameters = parse_config(value, "EvaluationParameters")?;
        if params.services.is_empty() {
            return Err(config_error(
                value,
                "EvaluationParameters",
                "No services described.",
            ));
        }
        Ok(params)
    }

    pub fn equivalent(&self, other: &EvaluationParameters) -> Result<()> {
        let mine: BTreeSet<_> = self.services.keys().collect();
        let theirs: BTreeSet<_> = other.services.keys().collect();
        if mine != theirs {
            return Err(EvaluatorError::NotEquivalent(
                "Different set of services.".to_string(),
            ));
        }
        for (name, service) in &self.services {
            service.equivalent(&other.services[name]).map_err(|e| {
                EvaluatorError::NotEquivalent(format!(
                    "Service {:?} differs:\n\n{}",
                    name,
                    indent(&e.to_string(), "  ")
                ))
            })?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ChallengeStep {
    #[serde(skip)]
    pub name: String,
    pub title: String,
    pub description: String,
    pub evaluation_parameters: EvaluationParameters,
    pub features_required: BTreeMap<String, Value>,
    pub timeout: f64,
}

impl ChallengeStep {
    pub fn from_yaml(value: &Value, name: &str) -> Result<Self> {
        let mut step: ChallengeStep = parse_config(value, "ChallengeStep")?;
        if step.evaluation_parameters.services.is_empty() {
            return Err(config_error(value, "ChallengeStep", "No services described."));
        }
        step.name = name.to_string();
        Ok(step)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ScoreOrder {
    #[default]
    Ascending,
    Descending,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Score {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub order: ScoreOrder,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Scoring {
    pub scores: Vec<Score>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Transition {
    pub first: String,
    pub condition: String,
    pub second: String,
}

/// Outcome of [`ChallengeTransitions::get_next_steps`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NextSteps {
    pub complete: bool,
    /// Lowercase terminal state once `complete`.
    pub result: Option<String>,
    pub to_activate: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChallengeTransitions {
    pub transitions: Vec<Transition>,
    pub steps: Vec<String>,
}

impl ChallengeTransitions {
    pub fn new(transitions: &[(String, String, String)], steps: Vec<String>) -> Result<Self> {
        let mut out = Vec::with_capacity(transitions.len());
        for (first, condition, second) in transitions {
            if first != STATE_START && !steps.contains(first) {
                return Err(EvaluatorError::InvalidChallengeDescription(format!(
                    "Invalid transition source {:?}",
                    first
                )));
            }
            if !TERMINAL_STATES.contains(&second.as_str()) && !steps.contains(second) {
                return Err(EvaluatorError::InvalidChallengeDescription(format!(
                    "Invalid transition target {:?}",
                    second
                )));
            }
            if !TRANSITION_CONDITIONS.contains(&condition.as_str()) {
                return Err(EvaluatorError::InvalidChallengeDescription(format!(
                    "Invalid transition condition {:?}",
                    condition
                )));
            }
            out.push(Transition {
                first: first.clone(),
                condition: condition.clone(),
                second: second.clone(),
            });
        }
        Ok(Self {
            transitions: out,
            steps,
        })
    }

    pub fn steps_explanation(&self) -> Vec<String> {
        self.transitions
            .iter()
            .map(|t| {
                if t.first == STATE_START {
                    format!("At the beginning execute step `{}`.", t.second)
                } else if TERMINAL_STATES.contains(&t.second.as_str()) {
                    format!(
                        "If step `{}` finishes with status `{}`, then declare the submission `{}`.",
                        t.first, t.condition, t.second
                    )
                } else {
                    format!(
                        "If step `{}` finishes with status `{}`, then execute step `{}`.",
                        t.first, t.condition, t.second
                    )
                }
            })
            .collect()
    }

    /// Decide what to do next given the status of each step so far.
    ///
    /// `status` must contain `START: success`. An empty activation list with
    /// `complete == false` means steps are still running.
    pub fn get_next_steps(&self, status: &BTreeMap<String, String>) -> Result<NextSteps> {
        info!("Received status = {:?}", status);
        if status.get(STATE_START).map(String::as_str) != Some(STATUS_SUCCESS) {
            return Err(EvaluatorError::InvalidChallengeDescription(format!(
                "Status must contain {}: {}",
                STATE_START, STATUS_SUCCESS
            )));
        }

        let mut status = status.clone();
        status.retain(|k, ks| {
            let valid_step = k == STATE_START || self.steps.contains(k);
            let valid_status = ALLOWED_JOB_STATUS.contains(&ks.as_str());
            if !valid_step || !valid_status {
                error!("Ignoring invalid step {} -> {}", k, ks);
            }
            valid_step && valid_status
        });

        let mut to_activate: Vec<String> = Vec::new();
        for t in &self.transitions {
            if status.get(&t.first) != Some(&t.condition) {
                continue;
            }
            debug!("Transition {:?} is activated", t);

            match status.get(&t.second) {
                Some(s) if s != STATUS_ABORTED => {
                    debug!("Second {} already activated (and in {})", t.second, s);
                }
                _ => {
                    if TERMINAL_STATES.contains(&t.second.as_str()) {
                        debug!("Finishing here");
                        return Ok(NextSteps {
                            complete: true,
                            result: Some(t.second.to_lowercase()),
                            to_activate: Vec::new(),
                        });
                    }
                    if !to_activate.contains(&t.second) {
                        to_activate.push(t.second.clone());
                    }
                }
            }
        }

        debug!("Incomplete; need to do: {:?}", to_activate);
        Ok(NextSteps {
            complete: false,
            result: None,
            to_activate,
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawChallengeDescription {
    challenge: String,
    #[serde(default)]
    tags: Vec<String>,
    title: String,
    description: String,
    protocol: String,
    #[serde(rename = "date-open", deserialize_with = "flexible_datetime")]
    date_open: DateTime<Utc>,
    #[serde(rename = "date-close", deserialize_with = "flexible_datetime")]
    date_close: DateTime<Utc>,
    roles: BTreeMap<String, BTreeMap<String, Value>>,
    transitions: Vec<(String, String, String)>,
    steps: BTreeMap<String, Value>,
    scoring: Scoring,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChallengeDescription {
    pub name: String,
    pub title: String,
    pub description: String,
    pub protocol: String,
    pub date_open: DateTime<Utc>,
    pub date_close: DateTime<Utc>,
    pub steps: BTreeMap<String, ChallengeStep>,
    pub roles: BTreeMap<String, BTreeMap<String, Value>>,
    pub transitions: ChallengeTransitions,
    pub tags: Vec<String>,
    pub scoring: Scoring,
}

impl ChallengeDescription {
    pub fn from_yaml(value: &Value) -> Result<Self> {
        let raw: RawChallengeDescription = serde_yaml::from_value(value.clone())
            .map_err(|e| EvaluatorError::InvalidChallengeDescription(e.to_string()))?;

        for (role, permissions) in &raw.roles {
            if !role.starts_with("user:") {
                return Err(EvaluatorError::InvalidChallengeDescription(format!(
                    "Permissions should start with \"user:\", {}",
                    role
                )));
            }
            let unknown: Vec<_> = permissions
                .keys()
                .filter(|p| !ALLOWED_PERMISSIONS.contains(&p.as_str()))
                .collect();
            if !unknown.is_empty() {
                return Err(EvaluatorError::InvalidChallengeDescription(format!(
                    "Unknown permissions: {:?}",
                    unknown
                )));
            }
        }

        let mut steps = BTreeMap::new();
        for (name, v) in &raw.steps {
            steps.insert(name.clone(), ChallengeStep::from_yaml(v, name)?);
        }
        let transitions =
            ChallengeTransitions::new(&raw.transitions, steps.keys().cloned().collect())?;

        Ok(Self {
            name: raw.challenge,
            title: raw.title,
            description: raw.description,
            protocol: raw.protocol,
            date_open: raw.date_open,
            date_close: raw.date_close,
            steps,
            roles: raw.roles,
            transitions,
            tags: raw.tags,
            scoring: raw.scoring,
        })
    }

    pub fn get_next_steps(&self, status: &BTreeMap<String, String>) -> Result<NextSteps> {
        self.transitions.get_next_steps(status)
    }

    pub fn as_value(&self) -> Result<Value> {
        let mut m = serde_yaml::Mapping::new();
        m.insert("challenge".into(), self.name.clone().into());
        m.insert("title".into(), self.title.clone().into());
        m.insert("description".into(), self.description.clone().into());
        m.insert("protocol".into(), self.protocol.clone().into());
        m.insert("date-open".into(), self.date_open.to_rfc3339().into());
        m.insert("date-close".into(), self.date_close.to_rfc3339().into());
        m.insert("roles".into(), serde_yaml::to_value(&self.roles)?);
        let transitions: Vec<[&str; 3]> = self
            .transitions
            .transitions
            .iter()
            .map(|t| [t.first.as_str(), t.condition.as_str(), t.second.as_str()])
            .collect();
        m.insert("transitions".into(), serde_yaml::to_value(transitions)?);
        m.insert("steps".into(), serde_yaml::to_value(&self.steps)?);
        m.insert("tags".into(), serde_yaml::to_value(&self.tags)?);
        m.insert("scoring".into(), serde_yaml::to_value(&self.scoring)?);
        Ok(Value::Mapping(m))
    }

    pub fn as_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(&self.as_value()?)?)
    }
}

fn parse_config<T: serde::de::DeserializeOwned>(value: &Value, what: &str) -> Result<T> {
    serde_yaml::from_value(value.clone()).map_err(|e| config_error(value, what, &e.to_string()))
}

fn config_error(value: &Value, what: &str, reason: &str) -> EvaluatorError {
    let dump = serde_yaml::to_string(value).unwrap_or_default();
    EvaluatorError::InvalidConfiguration(format!(
        "Could not interpret the configuration data using {}::from_yaml()\n\n{}\n{}",
        what,
        indent(&dump, "  "),
        indent(reason, "| ")
    ))
}

fn null_as_default<'de, D, T>(d: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(d)?.unwrap_or_default())
}

fn string_or_number<'de, D>(d: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(d)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected a string or a number, got {:?}",
            other
        ))),
    }
}

fn flexible_datetime<'de, D>(d: D) -> std::result::Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let s = String::deserialize(d)?;
    parse_datetime(&s).ok_or_else(|| serde::de::Error::custom(format!("invalid date {:?}", s)))
}

fn parse_datetime(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(dt.and_utc());
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn yaml(s: &str) -> Value {
        serde_yaml::from_str(s).unwrap()
    }

    const PARAMS: &str = r#"
version: '3'
services:
  evaluator:
    image: org/evaluator:v1
    image_digest: sha256:aaa
    environment:
      episodes: 3
  solution:
    container: SUBMISSION_CONTAINER
    environment: null
"#;

    #[test]
    fn test_parse_evaluation_parameters() {
        let p = EvaluationParameters::from_yaml(&yaml(PARAMS)).unwrap();
        assert_eq!(p.version, "3");
        assert_eq!(p.services.len(), 2);
        assert!(p.services["solution"].is_submission());
        assert!(p.services["solution"].environment.is_empty());
        assert_eq!(
            p.services["evaluator"].image_digest.as_deref(),
            Some("sha256:aaa")
        );
    }

    #[test]
    fn test_numeric_version_and_default() {
        let p = EvaluationParameters::from_yaml(&yaml("version: 3\nservices: {a: {image: x}}"))
            .unwrap();
        assert_eq!(p.version, "3");
        let p = EvaluationParameters::from_yaml(&yaml("services: {a: {image: x}}")).unwrap();
        assert_eq!(p.version, "3");
    }

    #[test]
    fn test_rejects_empty_services_and_extra_keys() {
        assert!(EvaluationParameters::from_yaml(&yaml("services: {}")).is_err());
        assert!(EvaluationParameters::from_yaml(&yaml("services: {a: {image: x}}\nfoo: 1")).is_err());
        assert!(
            EvaluationParameters::from_yaml(&yaml("services: {a: {image: x, ports: [1]}}"))
                .is_err()
        );
        let err = EvaluationParameters::from_yaml(&yaml("services: {a: {environment: {}}}"))
            .unwrap_err();
        assert!(err.to_string().contains("Could not interpret"));
    }

    #[test]
    fn test_build_defaults() {
        let p = EvaluationParameters::from_yaml(&yaml("services: {a: {image: x, build: {}}}"))
            .unwrap();
        let b = p.services["a"].build.as_ref().unwrap();
        assert_eq!(b.context, ".");
        assert_eq!(b.dockerfile, "Dockerfile");
        assert!(b.args.is_empty());
    }

    #[test]
    fn test_equivalent() {
        let a = EvaluationParameters::from_yaml(&yaml(PARAMS)).unwrap();
        let b = a.clone();
        assert!(a.equivalent(&b).is_ok());

        let mut c = a.clone();
        c.services.get_mut("evaluator").unwrap().image_digest = Some("sha256:bbb".into());
        assert!(a.equivalent(&c).unwrap_err().to_string().contains("evaluator"));

        let mut d = a.clone();
        d.services.get_mut("evaluator").unwrap().image_digest = None;
        assert!(a.equivalent(&d).is_err());

        let mut e = a.clone();
        e.services.remove("solution");
        assert!(a.equivalent(&e).is_err());
    }

    fn transitions() -> ChallengeTransitions {
        let t = |a: &str, b: &str, c: &str| (a.to_string(), b.to_string(), c.to_string());
        ChallengeTransitions::new(
            &[
                t("START", "success", "step1"),
                t("step1", "success", "step2"),
                t("step1", "failed", "FAILED"),
                t("step1", "error", "ERROR"),
                t("step2", "success", "SUCCESS"),
                t("step2", "failed", "FAILED"),
            ],
            vec!["step1".into(), "step2".into()],
        )
        .unwrap()
    }

    fn status(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_next_steps_from_start() {
        let next = transitions()
            .get_next_steps(&status(&[("START", "success")]))
            .unwrap();
        assert!(!next.complete);
        assert_eq!(next.to_activate, vec!["step1".to_string()]);
    }

    #[test]
    fn test_next_steps_running() {
        let next = transitions()
            .get_next_steps(&status(&[("START", "success"), ("step1", "evaluating")]))
            .unwrap();
        assert!(!next.complete);
        assert!(next.to_activate.is_empty());
    }

    #[test]
    fn test_next_steps_terminal() {
        let next = transitions()
            .get_next_steps(&status(&[
                ("START", "success"),
                ("step1", "success"),
                ("step2", "success"),
            ]))
            .unwrap();
        assert!(next.complete);
        assert_eq!(next.result.as_deref(), Some("success"));

        let next = transitions()
            .get_next_steps(&status(&[("START", "success"), ("step1", "failed")]))
            .unwrap();
        assert_eq!(next.result.as_deref(), Some("failed"));
    }

    #[test]
    fn test_next_steps_aborted_is_rerun() {
        let next = transitions()
            .get_next_steps(&status(&[("START", "success"), ("step1", "aborted")]))
            .unwrap();
        assert_eq!(next.to_activate, vec!["step1".to_string()]);
    }

    #[test]
    fn test_next_steps_ignores_invalid_entries() {
        let next = transitions()
            .get_next_steps(&status(&[
                ("START", "success"),
                ("nostep", "success"),
                ("step1", "weird"),
            ]))
            .unwrap();
        assert_eq!(next.to_activate, vec!["step1".to_string()]);
    }

    #[test]
    fn test_next_steps_requires_start() {
        assert!(transitions().get_next_steps(&BTreeMap::new()).is_err());
    }

    #[test]
    fn test_invalid_transitions() {
        let t = |a: &str, b: &str, c: &str| (a.to_string(), b.to_string(), c.to_string());
        assert!(ChallengeTransitions::new(&[t("nope", "success", "SUCCESS")], vec![]).is_err());
        assert!(ChallengeTransitions::new(&[t("START", "success", "nope")], vec![]).is_err());
        assert!(
            ChallengeTransitions::new(&[t("START", "evaluating", "SUCCESS")], vec![]).is_err()
        );
        assert!(
            ChallengeTransitions::new(&[t("START", "great", "SUCCESS")], vec![]).is_err()
        );
    }

    #[test]
    fn test_steps_explanation() {
        let lines = transitions().steps_explanation();
        assert_eq!(lines[0], "At the beginning execute step `step1`.");
        assert!(lines[1].contains("then execute step `step2`"));
        assert!(lines[2].contains("declare the submission `FAILED`"));
    }

    const CHALLENGE: &str = r#"
challenge: aido1_LF1-v3
title: Lane following
description: Follow the lane.
protocol: p1
date-open: 2018-10-01 00:00:00
date-close: 2018-12-01T00:00:00Z
roles:
  user:andrea:
    snoop: true
    change: true
transitions:
  - [START, success, step1]
  - [step1, success, SUCCESS]
steps:
  step1:
    title: Simulation
    description: Runs the simulation.
    features_required: {ram_available_mb: 4000}
    timeout: 3600
    evaluation_parameters:
      services:
        evaluator: {image: org/eval}
        solution: {image: SUBMISSION_CONTAINER}
scoring:
  scores:
    - name: survival_time
      order: descending
    - name: distance
"#;

    #[test]
    fn test_challenge_description() {
        let c = ChallengeDescription::from_yaml(&yaml(CHALLENGE)).unwrap();
        assert_eq!(c.name, "aido1_LF1-v3");
        assert_eq!(c.steps["step1"].name, "step1");
        assert_eq!(c.steps["step1"].timeout, 3600.0);
        assert_eq!(c.scoring.scores[0].order, ScoreOrder::Descending);
        assert_eq!(c.scoring.scores[1].order, ScoreOrder::Ascending);
        assert!(c.tags.is_empty());
        assert!(c.date_open < c.date_close);

        let next = c
            .get_next_steps(&status(&[("START", "success"), ("step1", "success")]))
            .unwrap();
        assert_eq!(next.result.as_deref(), Some("success"));

        let reparsed = ChallengeDescription::from_yaml(&yaml(&c.as_yaml().unwrap())).unwrap();
        assert_eq!(reparsed, c);
    }

    #[test]
    fn test_challenge_rejects_bad_roles() {
        let bad = CHALLENGE.replace("user:andrea", "andrea");
        assert!(ChallengeDescription::from_yaml(&yaml(&bad)).is_err());
        let bad = CHALLENGE.replace("snoop: true", "delete: true");
        assert!(ChallengeDescription::from_yaml(&yaml(&bad)).is_err());
    }

    #[test]
    fn test_parse_datetime_formats() {
        assert!(parse_datetime("2018-10-01").is_some());
        assert!(parse_datetime("2018-10-01 12:00:00").is_some());
        assert!(parse_datetime("2018-10-01T12:00:00+02:00").is_some());
        assert!(parse_datetime("tomorrow").is_none());
    }
}
