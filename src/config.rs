use std::path::PathBuf;

const DEFAULT_SERVER: &str = "https://challenges.duckietown.org/v3";
const DEFAULT_WORKSPACE_BASE: &str = "/tmp/duckietown/DT18/evaluator/executions";
const DEFAULT_CACHE_DIR: &str = "/tmp/duckietown/DT18/evaluator/cache";
const DEFAULT_SHELL_CONFIG: &str = ".dt-shell/config";
const DEFAULT_COMPOSE_TIMEOUT: u64 = 3600;
const DEFAULT_REPORT_RETRIES: u32 = 5;
const DEFAULT_REPORT_RETRY_INTERVAL: u64 = 10;
const DEFAULT_POLL_INTERVAL: u64 = 5;
const DEFAULT_REQUEST_TIMEOUT: u64 = 30;
const DEFAULT_COMPOSE_BIN: &str = "docker-compose";

/// Process-wide settings read from the environment.
#[derive(Debug, Clone)]
pub struct Config {
    pub server: String,
    pub workspace_base: PathBuf,
    pub cache_dir: PathBuf,
    pub shell_config: PathBuf,
    pub compose_timeout_secs: u64,
    pub report_retries: u32,
    pub report_retry_interval_secs: u64,
    pub poll_interval_secs: u64,
    pub request_timeout_secs: u64,
    /// Orchestration CLI, looked up on `PATH` unless absolute.
    pub compose_bin: String,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            server: std::env::var("DTSERVER").unwrap_or_else(|_| DEFAULT_SERVER.into()),
            workspace_base: PathBuf::from(
                std::env::var("DT_EVALUATOR_WORKSPACE")
                    .unwrap_or_else(|_| DEFAULT_WORKSPACE_BASE.into()),
            ),
            cache_dir: PathBuf::from(
                std::env::var("DT_EVALUATOR_CACHE").unwrap_or_else(|_| DEFAULT_CACHE_DIR.into()),
            ),
            shell_config: std::env::var("DT_SHELL_CONFIG")
                .map(PathBuf::from)
                .unwrap_or_else(|_| default_shell_config()),
            compose_timeout_secs: env_parse("DT_COMPOSE_TIMEOUT_SECS", DEFAULT_COMPOSE_TIMEOUT),
            report_retries: env_parse("DT_REPORT_RETRIES", DEFAULT_REPORT_RETRIES),
            report_retry_interval_secs: env_parse(
                "DT_REPORT_RETRY_INTERVAL_SECS",
                DEFAULT_REPORT_RETRY_INTERVAL,
            ),
            poll_interval_secs: env_parse("DT_POLL_INTERVAL_SECS", DEFAULT_POLL_INTERVAL),
            request_timeout_secs: env_parse("DT_REQUEST_TIMEOUT_SECS", DEFAULT_REQUEST_TIMEOUT),
            compose_bin: std::env::var("DT_DOCKER_COMPOSE")
                .unwrap_or_else(|_| DEFAULT_COMPOSE_BIN.into()),
        }
    }

    pub fn print_banner(&self) {
        tracing::info!("╔══════════════════════════════════════════════════╗");
        tracing::info!("║       dt-challenges-evaluator v{:<18}║", env!("CARGO_PKG_VERSION"));
        tracing::info!("╠══════════════════════════════════════════════════╣");
        tracing::info!("║  Server:            {:<28}║", self.server);
        tracing::info!("║  Workspace:         {:<28}║", self.workspace_base.display());
        tracing::info!("║  Cache:             {:<28}║", self.cache_dir.display());
        tracing::info!("║  Compose:           {:<28}║", self.compose_bin);
        tracing::info!("║  Compose timeout:   {:<25}s ║", self.compose_timeout_secs);
        tracing::info!("║  Report retries:    {:<28}║", self.report_retries);
        tracing::info!("║  Poll interval:     {:<25}s ║", self.poll_interval_secs);
        tracing::info!("╚══════════════════════════════════════════════════╝");
    }
}

fn default_shell_config() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("/root"))
        .join(DEFAULT_SHELL_CONFIG)
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    parse_setting(key, std::env::var(key).ok().as_deref(), default)
}

/// An unset variable gives `default`; a malformed one too, with a warning.
fn parse_setting<T: std::str::FromStr>(key: &str, raw: Option<&str>, default: T) -> T {
    let Some(raw) = raw else { return default };
    match raw.trim().parse() {
        Ok(v) => v,
        Err(_) => {
            tracing::warn!("Ignoring {}={:?}: cannot parse it, using the default", key, raw);
            default
        }
    }
}
