use super::Config;
use anyhow::Result;
use tracing::warn;

/// A single problem found in a configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigValidationError {
    pub path: String,
    pub message: String,
}

impl std::fmt::Display for ConfigValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

pub fn validate_config(config: &Config) -> Vec<ConfigValidationError> {
    let mut errors = Vec::new();

    match url::Url::parse(&config.fleet.endpoint) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => {}
        Ok(url) => errors.push(ConfigValidationError {
            path: "fleet.endpoint".to_string(),
            message: format!("Unsupported scheme '{}'", url.scheme()),
        }),
        Err(e) => errors.push(ConfigValidationError {
            path: "fleet.endpoint".to_string(),
            message: format!("Invalid URL: {e}"),
        }),
    }

    if config.fleet.username.is_some() != config.fleet.password.is_some() {
        errors.push(ConfigValidationError {
            path: "fleet.username".to_string(),
            message: "Username and password must be set together".to_string(),
        });
    }

    if config.fleet.api_key.is_some() && config.fleet.username.is_some() {
        warn!("Both fleet.apiKey and fleet.username are set; the API key takes precedence");
    }

    if config.reconcile.max_parallel == 0 {
        errors.push(ConfigValidationError {
            path: "reconcile.maxParallel".to_string(),
            message: "Must be greater than 0".to_string(),
        });
    }

    errors
}

/// Validate configuration and return Result.
pub fn validate_config_object(config: &Config) -> Result<()> {
    let errors = validate_config(config);
    if errors.is_empty() {
        Ok(())
    } else {
        let messages: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
        anyhow::bail!("Configuration validation failed:\n{}", messages.join("\n"));
    }
}
