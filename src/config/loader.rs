//! Settings loading from disk.

use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::config::schema::{ProxySettings, StoreBackend};

/// Error type for settings loading.
#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("IO error reading {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid settings: {}", .0.join(", "))]
    Invalid(Vec<String>),
}

/// Settings given on the command line or through `PROXY_*` variables.
#[derive(Debug, Clone, Default)]
pub struct SettingsOverrides {
    pub bind_address: Option<String>,
    pub store_backend: Option<StoreBackend>,
    pub nats_url: Option<String>,
    pub bucket: Option<String>,
    pub key: Option<String>,
    pub file_path: Option<PathBuf>,
}

impl SettingsOverrides {
    pub fn apply(&self, settings: &mut ProxySettings) {
        if let Some(bind) = &self.bind_address {
            settings.listener.bind_address = bind.clone();
        }
        if let Some(backend) = self.store_backend {
            settings.store.backend = backend;
        }
        if let Some(url) = &self.nats_url {
            settings.store.nats_url = url.clone();
        }
        if let Some(bucket) = &self.bucket {
            settings.store.bucket = bucket.clone();
        }
        if let Some(key) = &self.key {
            settings.store.key = key.clone();
        }
        if let Some(file) = &self.file_path {
            settings.store.file_path = file.clone();
        }
    }
}

/// Load and validate settings from a TOML file.
pub fn load_settings(path: &Path) -> Result<ProxySettings, SettingsError> {
    let settings = read_settings(path)?;
    validate_settings(&settings).map_err(SettingsError::Invalid)?;
    Ok(settings)
}

/// Parse and validate settings from TOML text.
pub fn parse_settings(content: &str) -> Result<ProxySettings, SettingsError> {
    let settings: ProxySettings = toml::from_str(content)?;
    validate_settings(&settings).map_err(SettingsError::Invalid)?;
    Ok(settings)
}

/// Settings from `path`, or the defaults without one, with `overrides`
/// applied. Validation runs once, on the final values.
pub fn resolve_settings(path: Option<&Path>, overrides: &SettingsOverrides) -> Result<ProxySettings, SettingsError> {
    let mut settings = match path {
        Some(path) => read_settings(path)?,
        None => ProxySettings::default(),
    };
    overrides.apply(&mut settings);
    validate_settings(&settings).map_err(SettingsError::Invalid)?;
    Ok(settings)
}

fn read_settings(path: &Path) -> Result<ProxySettings, SettingsError> {
    let content = fs::read_to_string(path).map_err(|source| SettingsError::Io {
        path: path.display().to_string(),
        source,
    })?;
    Ok(toml::from_str(&content)?)
}

/// Semantic checks serde cannot express.
pub fn validate_settings(settings: &ProxySettings) -> Result<(), Vec<String>> {
    let mut errors = Vec::new();

    if settings.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(format!(
            "listener.bind_address '{}' is not a socket address",
            settings.listener.bind_address
        ));
    }
    if !matches!(settings.listener.scheme.as_str(), "http" | "https") {
        errors.push(format!("listener.scheme '{}' must be http or https", settings.listener.scheme));
    }
    if settings.store.key.trim().is_empty() {
        errors.push("store.key must not be empty".to_string());
    }
    if settings.store.backend == StoreBackend::Nats && settings.store.bucket.trim().is_empty() {
        errors.push("store.bucket must not be empty".to_string());
    }
    if settings.timeouts.request_secs == 0 {
        errors.push("timeouts.request_secs must be greater than zero".to_string());
    }
    if settings.observability.metrics_enabled
        && settings.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(format!(
            "observability.metrics_address '{}' is not a socket address",
            settings.observability.metrics_address
        ));
    }
    if settings.sync.watch_backoff_base_ms > settings.sync.watch_backoff_max_ms {
        errors.push("sync.watch_backoff_base_ms must not exceed sync.watch_backoff_max_ms".to_string());
    }
    if settings.sync.channel_capacity == 0 {
        errors.push("sync.channel_capacity must be greater than zero".to_string());
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::LogFormat;

    #[test]
    fn test_empty_file_uses_defaults() {
        let settings = parse_settings("").unwrap();
        assert_eq!(settings.listener.bind_address, "0.0.0.0:8080");
        assert_eq!(settings.store.key, "route-config");
        assert_eq!(settings.store.backend, StoreBackend::Nats);
    }

    #[test]
    fn test_partial_sections() {
        let settings = parse_settings(
            r#"
            [store]
            backend = "file"
            file_path = "/etc/proxy/routes.json"

            [observability]
            log_format = "json"
            "#,
        )
        .unwrap();
        assert_eq!(settings.store.backend, StoreBackend::File);
        assert_eq!(settings.store.bucket, "proxy");
        assert_eq!(settings.observability.log_format, LogFormat::Json);
    }

    #[test]
    fn test_invalid_values_collected() {
        let err = parse_settings(
            r#"
            [listener]
            bind_address = "nowhere"

            [sync]
            watch_backoff_base_ms = 5000
            watch_backoff_max_ms = 10
            "#,
        )
        .unwrap_err();
        match err {
            SettingsError::Invalid(errors) => assert_eq!(errors.len(), 2),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_overrides_are_validated_without_a_file() {
        let overrides = SettingsOverrides {
            key: Some("  ".to_string()),
            ..Default::default()
        };
        match resolve_settings(None, &overrides).unwrap_err() {
            SettingsError::Invalid(errors) => assert_eq!(errors, vec!["store.key must not be empty".to_string()]),
            other => panic!("unexpected error: {other}"),
        }

        let overrides = SettingsOverrides {
            store_backend: Some(StoreBackend::Memory),
            key: Some("edge-routes".to_string()),
            ..Default::default()
        };
        let settings = resolve_settings(None, &overrides).unwrap();
        assert_eq!(settings.store.backend, StoreBackend::Memory);
        assert_eq!(settings.store.key, "edge-routes");
    }

    #[test]
    fn test_override_can_fix_file_value() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("proxy.toml");
        fs::write(&path, "[listener]\nbind_address = \"nowhere\"\n").unwrap();

        assert!(matches!(load_settings(&path), Err(SettingsError::Invalid(_))));

        let overrides = SettingsOverrides {
            bind_address: Some("127.0.0.1:9000".to_string()),
            ..Default::default()
        };
        let settings = resolve_settings(Some(&path), &overrides).unwrap();
        assert_eq!(settings.listener.bind_address, "127.0.0.1:9000");
    }

    #[test]
    fn test_unknown_backend_rejected() {
        assert!(matches!(
            parse_settings("[store]\nbackend = \"etcd\"").unwrap_err(),
            SettingsError::Parse(_)
        ));
    }
}
