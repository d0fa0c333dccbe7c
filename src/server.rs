use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use crate::artefacts::{ArtefactRecord, StepsArtefacts};
use crate::error::{EvaluatorError, Result};
use crate::features::FeatureMap;
use crate::storage::AwsConfig;

const TAKE_SUBMISSION: &str = "/take-submission";
const TOKEN_HEADER: &str = "X-Messaging-Token";

#[derive(Debug, Clone, Serialize)]
pub struct TakeRequest {
    pub submission_id: Option<u64>,
    pub machine_id: String,
    pub process_id: String,
    pub evaluator_version: String,
    pub features: FeatureMap,
    pub reset: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SubmissionParameters {
    /// Image of the solution container.
    pub hash: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JobAssignment {
    pub job_id: u64,
    pub challenge_name: String,
    pub step_name: String,
    pub submission_id: u64,
    #[serde(default)]
    pub aws_config: Option<AwsConfig>,
    #[serde(default)]
    pub steps2artefacts: StepsArtefacts,
    pub parameters: SubmissionParameters,
    pub challenge_parameters: serde_yaml::Value,
}

/// A job the server has handed to us.
///
/// Only `job_id` is read up front. Once it is known the job must be
/// reported, so decoding the rest is left to [`TakenJob::assignment`].
#[derive(Debug, Clone)]
pub struct TakenJob {
    pub job_id: u64,
    raw: serde_json::Value,
}

impl TakenJob {
    pub fn assignment(&self) -> Result<JobAssignment> {
        serde_json::from_value(self.raw.clone()).map_err(|e| {
            EvaluatorError::RemoteProblem(format!("Cannot interpret job assignment: {}", e))
        })
    }
}

#[derive(Debug)]
pub enum TakeOutcome {
    Job(TakenJob),
    NothingLeft(String),
}

#[derive(Debug, Clone, Serialize)]
pub struct JobReport {
    pub job_id: u64,
    pub result: String,
    pub stats: serde_json::Value,
    pub machine_id: String,
    pub process_id: String,
    pub evaluator_version: String,
    pub uploaded: Vec<ArtefactRecord>,
}

#[derive(Debug, Deserialize)]
struct Envelope {
    ok: bool,
    #[serde(default)]
    msg: Option<String>,
    #[serde(default)]
    result: serde_json::Value,
}

/// Client for the challenges server REST API.
pub struct ServerClient {
    base: String,
    token: String,
    http: reqwest::Client,
}

impl ServerClient {
    pub fn new(base: &str, token: String, timeout_secs: u64) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| EvaluatorError::Connection(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            base: base.trim_end_matches('/').to_string(),
            token,
            http,
        })
    }

    pub async fn take_submission(&self, req: &TakeRequest) -> Result<TakeOutcome> {
        let result = self
            .request(reqwest::Method::GET, TAKE_SUBMISSION, req)
            .await?;
        parse_take_result(result)
    }

    pub async fn report_job(&self, report: &JobReport) -> Result<()> {
        self.request(reqwest::Method::POST, TAKE_SUBMISSION, report)
            .await?;
        Ok(())
    }

    async fn request<T: Serialize>(
        &self,
        method: reqwest::Method,
        endpoint: &str,
        data: &T,
    ) -> Result<serde_json::Value> {
        let url = format!("{}{}", self.base, endpoint);
        debug!("{} {}", method, url);

        let resp = self
            .http
            .request(method, &url)
            .header(TOKEN_HEADER, &self.token)
            .json(data)
            .send()
            .await
            .map_err(|e| EvaluatorError::Connection(format!("Cannot connect to {}: {}", url, e)))?;

        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| EvaluatorError::Connection(format!("Cannot read response from {}: {}", url, e)))?;

        match decode_envelope(&body) {
            Ok(result) => Ok(result),
            Err(e) if status.is_success() => Err(e),
            Err(EvaluatorError::RemoteProblem(msg)) => Err(EvaluatorError::RemoteProblem(msg)),
            Err(_) => Err(EvaluatorError::Connection(format!(
                "{} returned HTTP {}",
                url, status
            ))),
        }
    }
}

/// Unpack `{ok, msg, result}`.
fn decode_envelope(body: &str) -> Result<serde_json::Value> {
    let envelope: Envelope = serde_json::from_str(body).map_err(|e| {
        EvaluatorError::Connection(format!("Cannot interpret server response: {}", e))
    })?;
    if !envelope.ok {
        return Err(EvaluatorError::RemoteProblem(
            envelope.msg.unwrap_or_else(|| "no message given".into()),
        ));
    }
    Ok(envelope.result)
}

fn parse_take_result(result: serde_json::Value) -> Result<TakeOutcome> {
    if result.get("job_id").map_or(true, |v| v.is_null()) {
        let msg = result
            .get("msg")
            .and_then(|m| m.as_str())
            .unwrap_or("no message");
        return Ok(TakeOutcome::NothingLeft(format!("Could not find jobs: {}", msg)));
    }
    let job_id = result["job_id"].as_u64().ok_or_else(|| {
        EvaluatorError::RemoteProblem(format!("Invalid job_id: {}", result["job_id"]))
    })?;
    Ok(TakeOutcome::Job(TakenJob {
        job_id,
        raw: result,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_envelope_ok() {
        let v = decode_envelope(r#"{"ok": true, "result": {"a": 1}}"#).unwrap();
        assert_eq!(v["a"], 1);
    }

    #[test]
    fn test_envelope_not_ok() {
        let err = decode_envelope(r#"{"ok": false, "msg": "invalid token"}"#).unwrap_err();
        match err {
            EvaluatorError::RemoteProblem(m) => assert_eq!(m, "invalid token"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_envelope_garbage() {
        let err = decode_envelope("<html>502</html>").unwrap_err();
        assert!(err.is_connection());
    }

    #[test]
    fn test_take_nothing_left() {
        let out = parse_take_result(json!({"msg": "no jobs for you"})).unwrap();
        match out {
            TakeOutcome::NothingLeft(m) => assert_eq!(m, "Could not find jobs: no jobs for you"),
            TakeOutcome::Job(_) => panic!("expected nothing left"),
        }
    }

    #[test]
    fn test_take_job() {
        let out = parse_take_result(json!({
            "job_id": 42,
            "challenge_name": "aido1_LF1-v3",
            "step_name": "step1-simulation",
            "submission_id": 7,
            "aws_config": null,
            "steps2artefacts": {
                "step0": {
                    "out.txt": {"sha256hex": "ab", "size": 3, "storage": {}}
                }
            },
            "parameters": {"hash": "user/solution@sha256:123"},
            "challenge_parameters": {
                "services": {"evaluator": {"image": "dt/eval", "environment": {}}}
            }
        }))
        .unwrap();
        let taken = match out {
            TakeOutcome::Job(j) => j,
            TakeOutcome::NothingLeft(m) => panic!("unexpected {}", m),
        };
        assert_eq!(taken.job_id, 42);
        let job = taken.assignment().unwrap();
        assert_eq!(job.job_id, 42);
        assert_eq!(job.submission_id, 7);
        assert!(job.aws_config.is_none());
        assert_eq!(job.parameters.hash, "user/solution@sha256:123");
        assert_eq!(job.steps2artefacts["step0"]["out.txt"].size, 3);
        assert!(job.challenge_parameters.get("services").is_some());
    }

    #[test]
    fn test_take_keeps_job_id_when_assignment_is_broken() {
        let out = parse_take_result(json!({
            "job_id": 77,
            "aws_config": {"bucket_name": "b"},
        }))
        .unwrap();
        let TakeOutcome::Job(taken) = out else {
            panic!("expected a job")
        };
        assert_eq!(taken.job_id, 77);
        let err = taken.assignment().unwrap_err();
        assert!(err.to_string().contains("Cannot interpret job assignment"));
    }

    #[test]
    fn test_take_rejects_non_numeric_job_id() {
        let err = parse_take_result(json!({"job_id": "abc"})).unwrap_err();
        assert!(matches!(err, EvaluatorError::RemoteProblem(_)));
    }

    #[test]
    fn test_report_serialization() {
        let report = JobReport {
            job_id: 1,
            result: "success".into(),
            stats: json!({"scores": {}, "msg": null}),
            machine_id: "m".into(),
            process_id: "p-1".into(),
            evaluator_version: "3.1.0".into(),
            uploaded: vec![],
        };
        let v = serde_json::to_value(&report).unwrap();
        assert_eq!(v["result"], "success");
        assert!(v["uploaded"].as_array().unwrap().is_empty());
    }
}
