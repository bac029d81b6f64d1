//! Environment variable substitution and body template resolution.

use super::types::MessageConfig;
use crate::error::ConfigError;
use regex::Regex;
use std::path::Path;

/// Maximum size for body_file (1MB).
const MAX_BODY_FILE_SIZE: u64 = 1024 * 1024;

/// Resolves `${VAR_NAME}` patterns in a string.
pub fn resolve_env_vars(value: &str) -> Result<String, ConfigError> {
    let re = Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("valid regex");

    let mut result = value.to_string();
    let mut errors = Vec::new();

    let matches: Vec<_> = re.captures_iter(value).collect();

    for cap in matches {
        let full_match = cap.get(0).expect("capture 0 always present").as_str();
        let var_name = &cap[1];

        match std::env::var(var_name) {
            Ok(var_value) => {
                result = result.replace(full_match, &var_value);
            }
            Err(_) => {
                errors.push(var_name.to_string());
            }
        }
    }

    if errors.is_empty() {
        Ok(result)
    } else {
        Err(ConfigError::ValidationError(format!(
            "undefined environment variable{}: {}",
            if errors.len() > 1 { "s" } else { "" },
            errors.join(", ")
        )))
    }
}

/// Resolves the message body template.
/// Priority: body_file > body (inline). One of the two is required.
pub fn resolve_body_template(
    message: &MessageConfig,
    config_dir: &Path,
) -> Result<String, ConfigError> {
    if message.body.is_some() && message.body_file.is_some() {
        tracing::warn!("both body and body_file defined, using body_file");
    }

    // Priority 1: body_file
    if let Some(ref file_path) = message.body_file {
        let path = if Path::new(file_path).is_absolute() {
            std::path::PathBuf::from(file_path)
        } else {
            config_dir.join(file_path)
        };

        if !path.exists() {
            return Err(ConfigError::ValidationError(format!(
                "body_file not found: {}",
                path.display()
            )));
        }

        let metadata = std::fs::metadata(&path).map_err(|e| {
            ConfigError::ValidationError(format!(
                "cannot read body_file '{}': {}",
                path.display(),
                e
            ))
        })?;

        if metadata.len() > MAX_BODY_FILE_SIZE {
            return Err(ConfigError::ValidationError(format!(
                "body_file '{}' exceeds maximum size of 1MB ({} bytes)",
                path.display(),
                metadata.len()
            )));
        }

        let content = std::fs::read_to_string(&path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::InvalidData {
                ConfigError::ValidationError(format!(
                    "body_file '{}' must be valid UTF-8",
                    path.display()
                ))
            } else {
                ConfigError::ValidationError(format!(
                    "cannot read body_file '{}': {}",
                    path.display(),
                    e
                ))
            }
        })?;

        tracing::debug!("body template source: file");
        return Ok(content);
    }

    // Priority 2: body (inline)
    if let Some(ref template) = message.body {
        tracing::debug!("body template source: inline");
        return Ok(template.clone());
    }

    Err(ConfigError::ValidationError(
        "message requires either body or body_file".to_string(),
    ))
}
