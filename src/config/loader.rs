use std::path::Path;

use config::{Config, Environment, File, FileFormat};
use eyre::{Context, Result};

use crate::config::models::ServerConfig;

/// Prefix of environment variables overriding file values,
/// e.g. `FANOUT__FORWARDING__ATTEMPT_TIMEOUT=2s`.
pub const ENV_PREFIX: &str = "FANOUT";

/// Load configuration from a file using the config crate
/// Supports multiple formats: YAML, JSON, TOML, etc.
pub async fn load_config(config_path: &str) -> Result<ServerConfig> {
    load_config_sync(config_path)
}

/// Load configuration synchronously.
///
/// A missing file is not an error: defaults plus environment overrides apply.
pub fn load_config_sync(config_path: &str) -> Result<ServerConfig> {
    let config_path = Path::new(config_path);

    // Determine file format based on extension
    let format = match config_path.extension().and_then(|ext| ext.to_str()) {
        Some("yaml") | Some("yml") => FileFormat::Yaml,
        Some("json") => FileFormat::Json,
        Some("toml") => FileFormat::Toml,
        Some("ini") => FileFormat::Ini,
        _ => FileFormat::Yaml, // Default to YAML
    };

    let settings = Config::builder()
        .add_source(
            File::new(
                config_path
                    .to_str()
                    .ok_or_else(|| eyre::eyre!("Invalid UTF-8 path: {}", config_path.display()))?,
                format,
            )
            .required(false),
        )
        .add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__")
                .list_separator(",")
                .with_list_parse_key("forwarding.excluded_headers")
                .try_parsing(true),
        )
        .build()
        .with_context(|| format!("Failed to build config from {}", config_path.display()))?;

    let server_config: ServerConfig = settings.try_deserialize().with_context(|| {
        format!(
            "Failed to deserialize config from {}",
            config_path.display()
        )
    })?;

    Ok(server_config)
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use tempfile::NamedTempFile;

    use super::*;

    #[tokio::test]
    async fn test_load_yaml_config() {
        let yaml_content = r#"
listen_addr: "127.0.0.1:3000"
forwarding:
  excluded_headers: ["host", "x-internal-token"]
  max_concurrent_attempts: 16
  attempt_timeout: "5s"
logging:
  level: "debug"
  json: false
"#;

        let mut temp_file = NamedTempFile::with_suffix(".yaml").unwrap();
        write!(temp_file, "{}", yaml_content).unwrap();

        let config = load_config(temp_file.path().to_str().unwrap())
            .await
            .unwrap();
        assert_eq!(config.listen_addr, "127.0.0.1:3000");
        assert_eq!(config.forwarding.excluded_headers.len(), 2);
        assert_eq!(config.forwarding.max_concurrent_attempts, Some(16));
        assert_eq!(config.forwarding.attempt_timeout.as_deref(), Some("5s"));
        assert!(!config.logging.json);
    }

    #[tokio::test]
    async fn test_load_toml_config() {
        let toml_content = r#"
listen_addr = "0.0.0.0:8081"

[forwarding]
max_body_bytes = 2048
request_timeout = "30s"
"#;

        let mut temp_file = NamedTempFile::with_suffix(".toml").unwrap();
        write!(temp_file, "{}", toml_content).unwrap();

        let config = load_config(temp_file.path().to_str().unwrap())
            .await
            .unwrap();
        assert_eq!(config.listen_addr, "0.0.0.0:8081");
        assert_eq!(config.forwarding.max_body_bytes, 2048);
        assert_eq!(config.forwarding.excluded_headers, vec!["host"]);
        assert_eq!(config.logging.level, "info");
    }

    #[tokio::test]
    async fn test_missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.yaml");
        let config = load_config(path.to_str().unwrap()).await.unwrap();
        assert_eq!(config.listen_addr, "127.0.0.1:8080");
        assert!(config.tls.is_none());
    }
}
