use clap::Parser;

use crate::error::{EvaluatorError, Result};
use crate::features::FeatureMap;

#[derive(Parser, Debug, Clone)]
#[command(name = "dt-challenges-evaluator", version, about = "Evaluates challenge submissions")]
pub struct Opts {
    /// Keep taking jobs from the server until interrupted
    #[arg(long)]
    pub continuous: bool,

    /// Do not pull images before starting the containers
    #[arg(long = "no-pull")]
    pub no_pull: bool,

    /// Keep artefacts in the local cache only
    #[arg(long = "no-upload")]
    pub no_upload: bool,

    /// Keep the working directory and the containers after the job
    #[arg(long = "no-delete")]
    pub no_delete: bool,

    /// Machine name, defaults to the hostname
    #[arg(long = "machine-id")]
    pub machine_id: Option<String>,

    /// Evaluator name, defaults to `p-<pid>`
    #[arg(long)]
    pub name: Option<String>,

    /// Evaluate this particular submission
    #[arg(long)]
    pub submission: Option<u64>,

    /// Reset the submission
    #[arg(long)]
    pub reset: bool,

    /// YAML mapping overriding the detected machine features
    #[arg(long, default_value = "{}")]
    pub features: String,

    /// Verbose logging
    #[arg(long, short)]
    pub verbose: bool,
}

impl Opts {
    pub fn parsed_features(&self) -> Result<FeatureMap> {
        parse_features(&self.features)
    }

    pub fn evaluator_name(&self) -> String {
        self.name
            .clone()
            .unwrap_or_else(|| format!("p-{}", std::process::id()))
    }

    pub fn machine_id(&self) -> String {
        self.machine_id.clone().unwrap_or_else(|| {
            sysinfo::System::host_name().unwrap_or_else(|| "unknown-host".to_string())
        })
    }
}

/// Parse the `--features` argument, which must be a YAML mapping.
pub fn parse_features(s: &str) -> Result<FeatureMap> {
    let value: serde_yaml::Value = serde_yaml::from_str(s).map_err(|e| {
        EvaluatorError::InvalidConfiguration(format!(
            "Could not evaluate your YAML string {:?}:\n{}",
            s, e
        ))
    })?;
    match value {
        serde_yaml::Value::Mapping(m) => {
            let mut out = FeatureMap::new();
            for (k, v) in m {
                let key = k.as_str().map(str::to_string).ok_or_else(|| {
                    EvaluatorError::InvalidConfiguration(format!(
                        "Feature names must be strings, got {:?}",
                        k
                    ))
                })?;
                out.insert(key, v);
            }
            Ok(out)
        }
        other => Err(EvaluatorError::InvalidConfiguration(format!(
            "I expected that the features are a dict; obtained {:?}",
            other
        ))),
    }
}
