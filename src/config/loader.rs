//! Configuration loading from disk and environment.

use std::fs;
use std::path::{Path, PathBuf};

use crate::config::deploy::{load_topology, DeployError};
use crate::config::schema::BalancerConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(toml::de::Error),
    Deploy(DeployError),
    Secret(PathBuf, std::io::Error),
    Validation(Vec<ValidationError>),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "IO error: {}", e),
            ConfigError::Parse(e) => write!(f, "Parse error: {}", e),
            ConfigError::Deploy(e) => write!(f, "Deploy error: {}", e),
            ConfigError::Secret(path, e) => {
                write!(f, "Cannot read exchange token file {}: {}", path.display(), e)
            }
            ConfigError::Validation(errors) => {
                write!(f, "Validation failed: ")?;
                for (i, err) in errors.iter().enumerate() {
                    if i > 0 { write!(f, ", ")?; }
                    write!(f, "{}", err)?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for ConfigError {}

/// Load, expand and validate configuration from a TOML file.
///
/// Environment variables override the file (see [`apply_env_overrides`]).
pub fn load_config(path: &Path) -> Result<BalancerConfig, ConfigError> {
    let content = fs::read_to_string(path).map_err(ConfigError::Io)?;
    let mut config: BalancerConfig = toml::from_str(&content).map_err(ConfigError::Parse)?;

    apply_env_overrides(&mut config, |key| std::env::var(key).ok());
    finalize_config(config)
}

/// Expand the deploy file into backend URLs and validate.
pub fn finalize_config(mut config: BalancerConfig) -> Result<BalancerConfig, ConfigError> {
    if let Some(deploy_file) = config.backends.deploy_file.clone() {
        let topology = load_topology(&deploy_file).map_err(ConfigError::Deploy)?;
        let generated = topology.app_urls(&config.backends.app_host_prefix, config.backends.app_port);
        tracing::info!(
            path = %deploy_file.display(),
            apps = generated.len(),
            version = ?topology.version,
            "Deploy topology loaded"
        );
        for url in generated {
            if !config.backends.urls.contains(&url) {
                config.backends.urls.push(url);
            }
        }
    }

    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

/// Apply `ADDR`, `DEPLOY_FILE_PATH`, `APP_PORT` and `EXCHANGE_TOKEN_FILE_PATH`.
pub fn apply_env_overrides<F>(config: &mut BalancerConfig, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(addr) = lookup("ADDR") {
        config.listener.bind_address = addr;
    }
    if let Some(path) = lookup("DEPLOY_FILE_PATH") {
        config.backends.deploy_file = Some(PathBuf::from(path));
    }
    if let Some(port) = lookup("APP_PORT") {
        match port.parse() {
            Ok(port) => config.backends.app_port = port,
            Err(_) => tracing::warn!(value = %port, "Ignoring invalid APP_PORT"),
        }
    }
    if let Some(path) = lookup("EXCHANGE_TOKEN_FILE_PATH") {
        config.security.exchange_token_file = PathBuf::from(path);
    }
}

/// Read the shared exchange secret, trimming surrounding whitespace.
pub fn load_exchange_token(path: &Path) -> Result<String, ConfigError> {
    let content = fs::read_to_string(path).map_err(|e| ConfigError::Secret(path.to_path_buf(), e))?;
    Ok(content.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn temp_file(name: &str, content: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!("pingpong-balancer-{}-{}", std::process::id(), name));
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_load_config_with_deploy_file() {
        let deploy = temp_file("deploy.json", r#"{"scaling": {"app": 2}}"#);
        let config_path = temp_file(
            "balancer.toml",
            &format!(
                r#"
                [backends]
                urls = ["http://127.0.0.1:9000"]
                deploy_file = "{}"
                app_port = 8088

                [proxy]
                algorithm = "round"
                "#,
                deploy.display()
            ),
        );

        let config = load_config(&config_path).unwrap();
        assert_eq!(
            config.backends.urls,
            vec![
                "http://127.0.0.1:9000",
                "http://notifyr-app-1:8088",
                "http://notifyr-app-2:8088",
            ]
        );
        assert_eq!(config.proxy.algorithm, "round");
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("ADDR", "0.0.0.0:8000"),
            ("APP_PORT", "9999"),
            ("EXCHANGE_TOKEN_FILE_PATH", "/tmp/token"),
        ]
        .into_iter()
        .collect();

        let mut config = BalancerConfig::default();
        apply_env_overrides(&mut config, |key| env.get(key).map(|v| v.to_string()));

        assert_eq!(config.listener.bind_address, "0.0.0.0:8000");
        assert_eq!(config.backends.app_port, 9999);
        assert_eq!(config.security.exchange_token_file, PathBuf::from("/tmp/token"));
        assert!(config.backends.deploy_file.is_none());
    }

    #[test]
    fn test_empty_backends_rejected() {
        let err = finalize_config(BalancerConfig::default()).unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));
        assert!(err.to_string().contains("no backend configured"));
    }

    #[test]
    fn test_exchange_token_trimmed() {
        let path = temp_file("token.txt", "  s3cret\n");
        assert_eq!(load_exchange_token(&path).unwrap(), "s3cret");
        assert!(load_exchange_token(Path::new("/nonexistent/token")).is_err());
    }
}
