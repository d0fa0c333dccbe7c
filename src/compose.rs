//! Docker Compose project generation and invocation.
//!
//! Every job gets its own compose project, named `job<id>-<n>`, whose file is
//! written in the job working directory. The five shared directories are
//! bind-mounted at the same path in every container.

use anyhow::Context;
use bollard::container::{LogOutput, LogsOptions};
use bollard::network::PruneNetworksOptions;
use bollard::Docker;
use futures::StreamExt;
use rand::Rng;
use serde::Serialize;
use serde_yaml::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::challenge::EvaluationParameters;
use crate::error::{indent, EvaluatorError, Result};
use crate::layout::{
    COMPOSE_FILE_NAME, ENV_CHALLENGE_NAME, ENV_CHALLENGE_STEP_NAME, EVALUATION_NETWORK,
    SHARED_DIRS,
};

const MAX_OUTPUT: usize = 1024 * 1024;

/// Who runs the job, passed to every container.
#[derive(Debug, Clone)]
pub struct JobIdentity {
    pub username: String,
    pub uid: u32,
    pub challenge_name: String,
    pub step_name: String,
}

impl JobIdentity {
    pub fn current(challenge_name: &str, step_name: &str) -> Self {
        // SAFETY: getuid has no preconditions and cannot fail.
        let uid = unsafe { libc::getuid() };
        let username = ["LOGNAME", "USER", "LNAME", "USERNAME"]
            .iter()
            .find_map(|k| std::env::var(k).ok().filter(|v| !v.is_empty()))
            .unwrap_or_else(|| uid.to_string());
        Self {
            username,
            uid,
            challenge_name: challenge_name.to_string(),
            step_name: step_name.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NetworkAttachment {
    pub aliases: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComposeService {
    pub image: String,
    pub environment: BTreeMap<String, Value>,
    pub volumes: Vec<String>,
    pub networks: BTreeMap<String, NetworkAttachment>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComposeFile {
    pub version: String,
    pub services: BTreeMap<String, ComposeService>,
    pub networks: BTreeMap<String, Value>,
}

impl ComposeFile {
    pub fn service_names(&self) -> Vec<String> {
        self.services.keys().cloned().collect()
    }

    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }
}

/// Turn the step's evaluation parameters into a runnable compose file.
///
/// Build sections and digests are dropped, `SUBMISSION_CONTAINER` becomes the
/// solution image, and every service gets the identity environment, the
/// shared volumes and the `evaluation` network.
pub fn build_compose_config(
    params: &EvaluationParameters,
    solution_image: &str,
    identity: &JobIdentity,
) -> ComposeFile {
    let volumes: Vec<String> = SHARED_DIRS
        .iter()
        .map(|d| format!("./{}:/{}", d, d))
        .collect();

    let mut extra_env = BTreeMap::new();
    extra_env.insert("username".to_string(), Value::from(identity.username.clone()));
    extra_env.insert("uid".to_string(), Value::from(identity.uid));
    extra_env.insert(
        ENV_CHALLENGE_NAME.to_string(),
        Value::from(identity.challenge_name.clone()),
    );
    extra_env.insert(
        ENV_CHALLENGE_STEP_NAME.to_string(),
        Value::from(identity.step_name.clone()),
    );

    let mut services = BTreeMap::new();
    for (name, def) in &params.services {
        let image = if def.is_submission() {
            solution_image.to_string()
        } else {
            def.image.clone()
        };
        let mut environment = def.environment.clone();
        environment.extend(extra_env.clone());

        let mut networks = BTreeMap::new();
        networks.insert(
            EVALUATION_NETWORK.to_string(),
            NetworkAttachment {
                aliases: vec![EVALUATION_NETWORK.to_string()],
            },
        );

        services.insert(
            name.clone(),
            ComposeService {
                image,
                environment,
                volumes: volumes.clone(),
                networks,
            },
        );
    }

    let mut networks = BTreeMap::new();
    networks.insert(EVALUATION_NETWORK.to_string(), Value::Null);

    ComposeFile {
        version: params.version.clone(),
        services,
        networks,
    }
}

pub fn write_compose_file(wd: &Path, config: &ComposeFile) -> Result<PathBuf> {
    let yaml = config.to_yaml()?;
    debug!("YAML:\n{}", yaml);
    let path = wd.join(COMPOSE_FILE_NAME);
    std::fs::write(&path, yaml)?;
    Ok(path)
}

pub fn project_name(job_id: u64) -> String {
    format!("job{}-{}", job_id, rand::thread_rng().gen_range(1..=10000))
}

#[derive(Debug)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

fn truncate_output(raw: &[u8]) -> String {
    if raw.len() <= MAX_OUTPUT {
        String::from_utf8_lossy(raw).to_string()
    } else {
        let tail = String::from_utf8_lossy(&raw[raw.len() - MAX_OUTPUT..]).to_string();
        format!(
            "... [truncated, showing last {} of {} bytes]\n\n{}",
            MAX_OUTPUT,
            raw.len(),
            tail
        )
    }
}

pub async fn run_cmd(argv: &[&str], cwd: &Path, timeout: Duration) -> anyhow::Result<CommandOutput> {
    let (program, args) = argv.split_first().context("empty argv")?;

    let mut cmd = Command::new(program);
    cmd.args(args)
        .current_dir(cwd)
        .stdin(std::process::Stdio::null())
        .stdout(std::process::Stdio::piped())
        .stderr(std::process::Stdio::piped())
        .kill_on_drop(true);

    let child = cmd
        .spawn()
        .with_context(|| format!("Failed to spawn {}", program))?;

    let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
        Ok(Ok(o)) => o,
        Ok(Err(e)) => anyhow::bail!("Process error: {}", e),
        Err(_) => anyhow::bail!("Command timed out after {}s", timeout.as_secs()),
    };

    Ok(CommandOutput {
        stdout: truncate_output(&output.stdout),
        stderr: truncate_output(&output.stderr),
        exit_code: output.status.code().unwrap_or(-1),
    })
}

fn failure_message(cmdline: &str, out: &CommandOutput) -> String {
    format!(
        "Could not run {} (exit code {}):\n\n{}\n\n{}",
        cmdline,
        out.exit_code,
        indent(&out.stdout, " docker-compose stdout  | "),
        indent(&out.stderr, " docker-compose stderr  | ")
    )
}

/// A `docker-compose -p <project>` invocation rooted at the job directory.
#[derive(Debug, Clone)]
pub struct ComposeProject {
    pub wd: PathBuf,
    pub program: String,
    pub project: String,
    pub timeout: Duration,
}

impl ComposeProject {
    pub fn new(
        wd: impl Into<PathBuf>,
        program: impl Into<String>,
        project: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            wd: wd.into(),
            program: program.into(),
            project: project.into(),
            timeout,
        }
    }

    pub async fn run(&self, args: &[&str]) -> Result<()> {
        let out = self.run_output(args).await?;
        if !out.is_empty() {
            debug!("{}", out);
        }
        Ok(())
    }

    /// Run and return stdout.
    pub async fn run_output(&self, args: &[&str]) -> Result<String> {
        let mut argv = vec![self.program.as_str(), "-p", self.project.as_str()];
        argv.extend_from_slice(args);
        let cmdline = argv.join(" ");
        info!("Running:\n\t{}\n\n in {}", cmdline, self.wd.display());

        let out = run_cmd(&argv, &self.wd, self.timeout).await.map_err(|e| {
            EvaluatorError::DockerComposeFail(format!(
                "Could not run {}:\n\n{}",
                cmdline,
                indent(&format!("{:#}", e), "  >  ")
            ))
        })?;
        if out.exit_code != 0 {
            return Err(EvaluatorError::DockerComposeFail(failure_message(
                &cmdline, &out,
            )));
        }
        Ok(out.stdout)
    }
}

/// Remove unused docker networks left over by previous jobs.
pub async fn prune_networks(docker: &Docker) {
    match docker
        .prune_networks(None::<PruneNetworksOptions<String>>)
        .await
    {
        Ok(resp) => debug!("pruned networks: {:?}", resp.networks_deleted.unwrap_or_default()),
        Err(e) => warn!("Could not prune networks: {}", e),
    }
}

/// Stdout and stderr of a container, interleaved as the engine sends them.
async fn logs_for_container(docker: &Docker, container_id: &str) -> String {
    let options = LogsOptions::<String> {
        stdout: true,
        stderr: true,
        timestamps: true,
        ..Default::default()
    };
    let mut stream = Box::pin(docker.logs(container_id, Some(options)));
    let mut logs = String::new();
    while let Some(chunk) = stream.next().await {
        match chunk {
            Ok(LogOutput::StdOut { message })
            | Ok(LogOutput::StdErr { message })
            | Ok(LogOutput::Console { message }) => {
                logs.push_str(&String::from_utf8_lossy(&message));
            }
            Ok(LogOutput::StdIn { .. }) => {}
            Err(e) => {
                logs.push_str(&format!(
                    "\nCould not get logs of container {}: {}\n",
                    container_id, e
                ));
                break;
            }
        }
    }
    logs
}

/// Logs of one service, or `None` when its container cannot be looked up.
async fn service_logs(project: &ComposeProject, docker: &Docker, service: &str) -> Option<String> {
    let container_id = project
        .run_output(&["ps", "-q", service])
        .await
        .ok()?
        .trim()
        .to_string();

    if container_id.is_empty() {
        let msg = format!("Service \"{}\" was not started.", service);
        warn!("{}", msg);
        Some(msg)
    } else {
        info!("Found container ID = {:?}", container_id);
        Some(logs_for_container(docker, &container_id).await)
    }
}

/// Save the logs of each service as `log-<service>.txt` and `.html`.
pub async fn write_logs(
    project: &ComposeProject,
    docker: &Docker,
    services: &[String],
) -> Result<()> {
    let all_logs =
        futures::future::join_all(services.iter().map(|s| service_logs(project, docker, s))).await;

    for (service, logs) in services.iter().zip(all_logs) {
        let Some(logs) = logs else { continue };
        tokio::fs::write(project.wd.join(format!("log-{}.txt", service)), &logs).await?;
        tokio::fs::write(
            project.wd.join(format!("log-{}.html", service)),
            ansi_to_html(&logs),
        )
        .await?;
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct Style {
    bold: bool,
    fg: Option<&'static str>,
    bg: Option<&'static str>,
}

impl Style {
    fn css(&self) -> String {
        let mut parts = Vec::new();
        if self.bold {
            parts.push("font-weight: bold".to_string());
        }
        if let Some(c) = self.fg {
            parts.push(format!("color: {}", c));
        }
        if let Some(c) = self.bg {
            parts.push(format!("background-color: {}", c));
        }
        parts.join("; ")
    }

    fn apply(&mut self, code: u32) {
        match code {
            0 => *self = Style::default(),
            1 => self.bold = true,
            22 => self.bold = false,
            30..=37 => self.fg = Some(PALETTE[(code - 30) as usize]),
            39 => self.fg = None,
            40..=47 => self.bg = Some(PALETTE[(code - 40) as usize]),
            49 => self.bg = None,
            90..=97 => self.fg = Some(BRIGHT_PALETTE[(code - 90) as usize]),
            100..=107 => self.bg = Some(BRIGHT_PALETTE[(code - 100) as usize]),
            _ => {}
        }
    }
}

const PALETTE: [&str; 8] = [
    "#000000", "#aa0000", "#00aa00", "#aa5500", "#0000aa", "#aa00aa", "#00aaaa", "#aaaaaa",
];
const BRIGHT_PALETTE: [&str; 8] = [
    "#555555", "#ff5555", "#55ff55", "#ffff55", "#5555ff", "#ff55ff", "#55ffff", "#ffffff",
];

fn escape_html(c: char, out: &mut String) {
    match c {
        '&' => out.push_str("&amp;"),
        '<' => out.push_str("&lt;"),
        '>' => out.push_str("&gt;"),
        '"' => out.push_str("&quot;"),
        _ => out.push(c),
    }
}

/// Render terminal output as a standalone HTML page.
pub fn ansi_to_html(text: &str) -> String {
    let mut body = String::with_capacity(text.len());
    let mut style = Style::default();
    let mut open = false;
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '\x1b' {
            escape_html(c, &mut body);
            continue;
        }
        if chars.peek() != Some(&'[') {
            continue;
        }
        chars.next();
        let mut params = String::new();
        let mut terminator = None;
        for p in chars.by_ref() {
            if p.is_ascii_alphabetic() {
                terminator = Some(p);
                break;
            }
            params.push(p);
        }
        if terminator != Some('m') {
            continue;
        }

        let before = style;
        if params.is_empty() {
            style.apply(0);
        }
        for code in params.split(';') {
            if let Ok(code) = code.parse::<u32>() {
                style.apply(code);
            }
        }
        if style == before {
            continue;
        }
        if open {
            body.push_str("</span>");
            open = false;
        }
        if style != Style::default() {
            body.push_str(&format!("<span style=\"{}\">", style.css()));
            open = true;
        }
    }
    if open {
        body.push_str("</span>");
    }

    format!(
        "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n\
         <style>body {{ background-color: #000000; color: #aaaaaa; }}</style>\n\
         </head>\n<body>\n<pre>\n{}</pre>\n</body>\n</html>\n",
        body
    )
}
