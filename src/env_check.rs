use bollard::Docker;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::error::{EvaluatorError, Result};

const COMPOSE_INSTALL_DOCS: &str = "https://docs.docker.com/compose/install/#install-compose";

pub fn find_executable(name: &str) -> Option<PathBuf> {
    let path = std::env::var_os("PATH")?;
    std::env::split_paths(&path)
        .map(|dir| dir.join(name))
        .find(|p| is_executable(p))
}

fn is_executable(p: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    std::fs::metadata(p)
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

pub fn check_executable_exists(name: &str) -> Result<PathBuf> {
    find_executable(name).ok_or_else(|| {
        EvaluatorError::InvalidEnvironment(format!("Could not find executable {:?} in PATH.", name))
    })
}

/// Client for the local docker engine (`DOCKER_HOST` or the default socket).
pub fn docker_client() -> Result<Docker> {
    Docker::connect_with_local_defaults().map_err(|e| {
        EvaluatorError::InvalidEnvironment(format!("Cannot create a docker client: {}", e))
    })
}

/// Docker must be installed and the daemon reachable.
pub async fn check_docker_environment(docker: &Docker) -> Result<()> {
    check_executable_exists("docker")?;
    let version = docker.version().await.map_err(|e| {
        EvaluatorError::InvalidEnvironment(format!("Cannot connect to the docker daemon:\n{}", e))
    })?;
    info!(
        "docker engine {} (API {})",
        version.version.unwrap_or_default(),
        version.api_version.unwrap_or_default()
    );
    Ok(())
}

pub fn check_compose_available(program: &str) -> Result<()> {
    let found = if Path::new(program).is_absolute() {
        is_executable(Path::new(program))
    } else {
        find_executable(program).is_some()
    };
    if !found {
        return Err(EvaluatorError::InvalidEnvironment(format!(
            "Could not find {}. Please install it.\n\nSee: {}",
            program, COMPOSE_INSTALL_DOCS
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_sh() {
        assert!(find_executable("sh").is_some());
    }

    #[test]
    fn test_compose_not_installed() {
        let err = check_compose_available("/nonexistent/bin/docker-compose").unwrap_err();
        match err {
            EvaluatorError::InvalidEnvironment(msg) => assert!(msg.contains(COMPOSE_INSTALL_DOCS)),
            other => panic!("unexpected {:?}", other),
        }
        check_compose_available("sh").unwrap();
    }

    #[tokio::test]
    async fn test_unreachable_daemon() {
        let docker =
            Docker::connect_with_http("http://127.0.0.1:9", 5, bollard::API_DEFAULT_VERSION)
                .unwrap();
        let err = check_docker_environment(&docker).await.unwrap_err();
        assert!(matches!(err, EvaluatorError::InvalidEnvironment(_)));
    }

    #[test]
    fn test_missing_executable() {
        let err = check_executable_exists("no-such-binary-dt-xyz").unwrap_err();
        assert!(matches!(err, EvaluatorError::InvalidEnvironment(_)));
    }
}
