//! The job pipeline: take a job, run its compose project, report the outcome.

use anyhow::Context;
use bollard::Docker;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::artefacts::{download_artefacts, upload_files, ArtefactRecord};
use crate::cache::ArtefactCache;
use crate::challenge::EvaluationParameters;
use crate::cleanup::{prepare_work_dir, remove_work_dir};
use crate::cli::Opts;
use crate::compose::{
    build_compose_config, prune_networks, project_name, write_compose_file, write_logs,
    ComposeProject, JobIdentity,
};
use crate::config::Config;
use crate::error::EvaluatorError;
use crate::features::{get_features, FeatureMap};
use crate::layout::CHALLENGE_PREVIOUS_STEPS_DIR;
use crate::metrics::Metrics;
use crate::results::{read_challenge_results, ChallengeResults, ChallengeResultsStatus};
use crate::server::{JobAssignment, JobReport, ServerClient, TakeOutcome, TakeRequest, TakenJob};
use crate::storage::{ObjectStore, S3Store};
use crate::token::get_token_from_shell_config;

const BACKOFF_FACTOR: f64 = 1.5;
const MAX_MULTIPLIER: f64 = 10.0;

/// Per-process choices made on the command line.
#[derive(Debug, Clone)]
pub struct RunnerOptions {
    pub do_pull: bool,
    pub do_upload: bool,
    pub delete: bool,
    pub reset: bool,
    pub evaluator_name: String,
    pub machine_id: String,
    pub more_features: FeatureMap,
}

impl RunnerOptions {
    pub fn from_opts(opts: &Opts) -> crate::error::Result<Self> {
        Ok(Self {
            do_pull: !opts.no_pull,
            do_upload: !opts.no_upload,
            delete: !opts.no_delete,
            reset: opts.reset,
            evaluator_name: opts.evaluator_name(),
            machine_id: opts.machine_id(),
            more_features: opts.parsed_features()?,
        })
    }
}

pub struct RunnerContext {
    pub config: Arc<Config>,
    pub opts: RunnerOptions,
    pub cache: ArtefactCache,
    pub metrics: Arc<Metrics>,
    pub docker: Docker,
}

impl RunnerContext {
    pub fn new(
        config: Arc<Config>,
        opts: RunnerOptions,
        metrics: Arc<Metrics>,
        docker: Docker,
    ) -> Self {
        let cache = ArtefactCache::new(&config.cache_dir);
        Self {
            config,
            opts,
            cache,
            metrics,
            docker,
        }
    }
}

pub fn job_work_dir(base: &Path, job: &JobAssignment, evaluator_name: &str) -> PathBuf {
    base.join(&job.challenge_name)
        .join(format!("submission{}", job.submission_id))
        .join(format!(
            "{}-{}-job{}",
            job.step_name, evaluator_name, job.job_id
        ))
}

/// Take one job from the server and see it through to the report.
///
/// Returns `EvaluatorError::NothingLeft` (through anyhow) when the server has
/// no job for us. Once a job id is known, every failure becomes an `error`
/// result that is reported like any other.
pub async fn run_job(
    ctx: &RunnerContext,
    submission_id: Option<u64>,
    reset: bool,
) -> anyhow::Result<ChallengeResultsStatus> {
    let overrides = ctx.opts.more_features.clone();
    let features = tokio::task::spawn_blocking(move || get_features(&overrides))
        .await
        .context("feature detection task failed")?;
    let token = get_token_from_shell_config(&ctx.config.shell_config)?;
    let client = ServerClient::new(&ctx.config.server, token, ctx.config.request_timeout_secs)?;
    let evaluator_version = env!("CARGO_PKG_VERSION").to_string();
    let process_id = ctx.opts.evaluator_name.clone();

    let request = TakeRequest {
        submission_id,
        machine_id: ctx.opts.machine_id.clone(),
        process_id: process_id.clone(),
        evaluator_version: evaluator_version.clone(),
        features,
        reset,
    };
    let taken = match client.take_submission(&request).await? {
        TakeOutcome::Job(taken) => taken,
        TakeOutcome::NothingLeft(msg) => return Err(EvaluatorError::NothingLeft(msg).into()),
    };

    ctx.metrics.job_taken();
    let started = Instant::now();
    info!("Evaluating job {}", taken.job_id);

    let (mut cr, uploaded) = match evaluate_taken(ctx, &taken).await {
        Ok(done) => done,
        Err(e) => {
            let msg = format!("Uncaught exception:\n{:#}", e);
            error!("{}", msg);
            (ChallengeResults::error(msg), Vec::new())
        }
    };

    let stats = match cr.get_stats() {
        Ok(stats) => stats,
        Err(e) => {
            let msg = format!("Cannot report the scores of job {}: {}", taken.job_id, e);
            error!("{}", msg);
            cr = ChallengeResults::error(msg);
            cr.get_stats().unwrap_or_default()
        }
    };

    let status = cr.status();
    let msg = format!(
        "This is what is being reported.\n\nstatus = {}\n\n{}",
        status,
        cr.msg.as_deref().unwrap_or("None")
    );
    if status == ChallengeResultsStatus::Success {
        info!("{}", msg);
    } else {
        error!("{}", msg);
    }
    ctx.metrics
        .job_finished(status, started.elapsed().as_millis() as u64);

    let report = JobReport {
        job_id: taken.job_id,
        result: status.to_string(),
        stats,
        machine_id: ctx.opts.machine_id.clone(),
        process_id,
        evaluator_version,
        uploaded,
    };
    report_with_retries(ctx, &client, &report).await;
    Ok(status)
}

async fn evaluate_taken(
    ctx: &RunnerContext,
    taken: &TakenJob,
) -> anyhow::Result<(ChallengeResults, Vec<ArtefactRecord>)> {
    let job = taken.assignment()?;
    debug!("{:#?}", job);
    execute_job(ctx, &job).await
}

async fn execute_job(
    ctx: &RunnerContext,
    job: &JobAssignment,
) -> anyhow::Result<(ChallengeResults, Vec<ArtefactRecord>)> {
    let opts = &ctx.opts;

    let store = match &job.aws_config {
        Some(aws) => Some(S3Store::new(aws.clone()).await),
        None => None,
    };
    if let (Some(store), true) = (&store, opts.do_upload) {
        store
            .check_connection()
            .await
            .context("Could not write to the S3 bucket")?;
    }

    let wd = job_work_dir(&ctx.config.workspace_base, job, &opts.evaluator_name);
    prepare_work_dir(&wd)
        .await
        .with_context(|| format!("Could not create {}", wd.display()))?;

    let params = EvaluationParameters::from_yaml(&job.challenge_parameters)?;

    download_artefacts(
        store.as_ref().map(|s| s as &dyn ObjectStore),
        &ctx.cache,
        &job.steps2artefacts,
        &wd.join(CHALLENGE_PREVIOUS_STEPS_DIR),
    )
    .await?;

    let identity = JobIdentity::current(&job.challenge_name, &job.step_name);
    let compose = build_compose_config(&params, &job.parameters.hash, &identity);
    write_compose_file(&wd, &compose)?;

    let project = ComposeProject::new(
        &wd,
        ctx.config.compose_bin.as_str(),
        project_name(job.job_id),
        Duration::from_secs(ctx.config.compose_timeout_secs),
    );

    let cr = match project.run(&["config"]).await {
        Ok(()) => {
            let cr = run_containers(&project, &ctx.docker, opts.do_pull).await;
            write_logs(&project, &ctx.docker, &compose.service_names()).await?;
            cr
        }
        Err(e) => {
            let msg = format!("Could not validate Docker Compose configuration:\n{}", e);
            error!("{}", msg);
            ChallengeResults::error(msg)
        }
    };

    let upload_store = if opts.do_upload {
        store.as_ref().map(|s| s as &dyn ObjectStore)
    } else {
        None
    };
    let uploaded = upload_files(&wd, upload_store, &ctx.cache).await?;

    if opts.delete {
        project.run(&["down"]).await?;
        remove_work_dir(&wd).await;
    }

    Ok((cr, uploaded))
}

async fn run_containers(project: &ComposeProject, docker: &Docker, do_pull: bool) -> ChallengeResults {
    let outcome: crate::error::Result<ChallengeResults> = async {
        if do_pull {
            info!("pulling containers");
            project.run(&["pull"]).await?;
        }
        prune_networks(docker).await;

        info!("Running containers");
        project.run(&["up", "--abort-on-container-exit"]).await?;
        read_challenge_results(&project.wd)
    }
    .await;

    outcome.unwrap_or_else(|e| {
        let msg = format!("Uncaught exception while running Docker Compose:\n{}", e);
        error!("{}", msg);
        ChallengeResults::error(msg)
    })
}

async fn report_with_retries(ctx: &RunnerContext, client: &ServerClient, report: &JobReport) -> bool {
    let interval = Duration::from_secs(ctx.config.report_retry_interval_secs);
    let mut remaining = ctx.config.report_retries;
    loop {
        match client.report_job(report).await {
            Ok(()) => {
                info!("Reported job {}", report.job_id);
                return true;
            }
            Err(e) => {
                warn!("Could not report: {}", e);
                if remaining == 0 {
                    error!("Giving up reporting job {}", report.job_id);
                    ctx.metrics.report_failed();
                    return false;
                }
                info!(
                    "Retrying {} more times after {} seconds",
                    remaining,
                    interval.as_secs()
                );
                remaining -= 1;
                tokio::time::sleep(interval).await;
            }
        }
    }
}

/// Evaluate a single job, either from the queue or a given submission.
pub async fn run_once(ctx: &RunnerContext, submission_id: Option<u64>) -> anyhow::Result<()> {
    match run_job(ctx, submission_id, ctx.opts.reset).await {
        Ok(_) => Ok(()),
        Err(e) => match e.downcast_ref::<EvaluatorError>() {
            Some(EvaluatorError::NothingLeft(detail)) => {
                let msg = match submission_id {
                    None => "No submissions available to evaluate.".to_string(),
                    Some(id) => format!("Could not evaluate submission {}.", id),
                };
                error!("{}\n{}", msg, detail);
                Ok(())
            }
            _ => Err(e),
        },
    }
}

/// Sleep multiplier between polls in continuous mode.
#[derive(Debug, Clone)]
pub struct Backoff {
    base: Duration,
    multiplier: f64,
}

impl Backoff {
    pub fn new(base: Duration) -> Self {
        Self {
            base,
            multiplier: 1.0,
        }
    }

    pub fn reset(&mut self) {
        self.multiplier = 1.0;
    }

    pub fn increase(&mut self) {
        self.multiplier = (self.multiplier * BACKOFF_FACTOR).min(MAX_MULTIPLIER);
    }

    pub fn delay(&self) -> Duration {
        self.base.mul_f64(self.multiplier)
    }
}

/// Keep taking jobs until `shutdown` flips to true. `--reset` only applies to
/// single runs.
pub async fn run_continuous(ctx: &RunnerContext, mut shutdown: watch::Receiver<bool>) {
    let mut backoff = Backoff::new(Duration::from_secs(ctx.config.poll_interval_secs));

    while !*shutdown.borrow() {
        match run_job(ctx, None, false).await {
            Ok(_) => {
                backoff.reset();
                info!("{}", ctx.metrics.summary());
            }
            Err(e) => match e.downcast_ref::<EvaluatorError>() {
                Some(EvaluatorError::NothingLeft(_)) => {
                    ctx.metrics.nothing_left();
                    eprint!(".");
                    debug!("{}", ctx.metrics.summary());
                }
                Some(err) if err.is_connection() => {
                    error!("{}", err);
                    backoff.increase();
                }
                _ => {
                    error!("Uncaught exception:\n{:#}", e);
                    backoff.increase();
                }
            },
        }

        tokio::select! {
            _ = tokio::time::sleep(backoff.delay()) => {}
            _ = shutdown.changed() => {}
        }
    }
    info!("Stopped. {}", ctx.metrics.summary());
}
