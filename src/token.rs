use std::path::Path;

use crate::error::{EvaluatorError, Result};

pub const TOKEN_CONFIG_KEY: &str = "token_dt1";

/// Read the user token from the shell's JSON configuration file.
pub fn get_token_from_shell_config(path: &Path) -> Result<String> {
    let data = std::fs::read_to_string(path).map_err(|e| {
        EvaluatorError::MissingToken(format!(
            "Could not read shell configuration {}: {}",
            path.display(),
            e
        ))
    })?;
    let config: serde_json::Value = serde_json::from_str(&data)?;
    match config.get(TOKEN_CONFIG_KEY).and_then(|v| v.as_str()) {
        Some(token) => Ok(token.to_string()),
        None => Err(EvaluatorError::MissingToken(
            "Please set a Duckietown Token using the command `dts tok set`.".to_string(),
        )),
    }
}
