//! Configuration loading from disk and environment.

use std::fs;
use std::path::Path;

use crate::config::schema::RegistrarConfig;
use crate::config::validation::{validate_config, ValidationError};

pub const ENV_NAMESPACE: &str = "VAULT_K8S_NAMESPACE";
pub const ENV_POD_NAME: &str = "VAULT_K8S_POD_NAME";
pub const ENV_SERVICE_HOST: &str = "KUBERNETES_SERVICE_HOST";
pub const ENV_SERVICE_PORT: &str = "KUBERNETES_SERVICE_PORT";

/// Error type for configuration loading.
#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(toml::de::Error),
    InvalidEnv { name: &'static str, value: String },
    Validation(Vec<ValidationError>),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "IO error: {}", e),
            ConfigError::Parse(e) => write!(f, "Parse error: {}", e),
            ConfigError::InvalidEnv { name, value } => {
                write!(f, "Invalid value for {}: {:?}", name, value)
            }
            ConfigError::Validation(errors) => {
                write!(f, "Validation failed: ")?;
                for (i, err) in errors.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", err)?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for ConfigError {}

/// Load configuration from an optional TOML file, apply environment
/// overrides from the process environment, then validate.
pub fn load_config(path: Option<&Path>) -> Result<RegistrarConfig, ConfigError> {
    load_config_with_env(path, |name| std::env::var(name).ok())
}

/// Same as [`load_config`] with an explicit environment lookup.
pub fn load_config_with_env<F>(path: Option<&Path>, env: F) -> Result<RegistrarConfig, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let mut config = match path {
        Some(path) => {
            let content = fs::read_to_string(path).map_err(ConfigError::Io)?;
            toml::from_str(&content).map_err(ConfigError::Parse)?
        }
        None => RegistrarConfig::default(),
    };

    apply_env_overrides(&mut config, env)?;
    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}

/// Environment wins over the file for the pod coordinates and API address.
pub fn apply_env_overrides<F>(config: &mut RegistrarConfig, env: F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let kube = &mut config.kubernetes;

    if let Some(namespace) = env(ENV_NAMESPACE) {
        kube.namespace = namespace;
    }
    if let Some(pod_name) = env(ENV_POD_NAME) {
        kube.pod_name = pod_name;
    }
    if let Some(host) = env(ENV_SERVICE_HOST) {
        kube.service_host = host;
    }
    if let Some(port) = env(ENV_SERVICE_PORT) {
        kube.service_port = port.trim().parse().map_err(|_| ConfigError::InvalidEnv {
            name: ENV_SERVICE_PORT,
            value: port.clone(),
        })?;
    }

    Ok(())
}
