//! Configuration Loader
//!
//! Layers built-in defaults, an optional TOML file and `BAKAME__`-prefixed
//! environment overrides into a validated [`ResilienceConfig`].

use super::error::{ConfigResult, ConfigurationError};
use super::{Environment, ResilienceConfig};
use crate::constants::env_vars;
use config::{Config, File, FileFormat};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Where environment overrides come from
#[derive(Debug, Clone, Default)]
enum OverrideSource {
    #[default]
    None,
    Process,
    /// Explicit variables, used instead of the process environment
    Injected(HashMap<String, String>),
}

/// Builder for a layered [`ResilienceConfig`]
///
/// Later layers win: defaults, then the TOML file, then inline TOML
/// fragments in the order they were added, then environment overrides.
#[derive(Debug, Clone, Default)]
pub struct ConfigLoader {
    environment: Environment,
    file: Option<PathBuf>,
    fragments: Vec<String>,
    overrides: OverrideSource,
}

impl ConfigLoader {
    /// Loader with defaults only; the process environment is not consulted
    pub fn new() -> Self {
        Self::default()
    }

    /// Loader for the running process
    ///
    /// Detects the environment, reads the file named by `BAKAME_CONFIG_PATH`
    /// when set and applies `BAKAME__<SECTION>__<FIELD>` variables.
    pub fn from_env() -> Self {
        let file = std::env::var(env_vars::CONFIG_PATH)
            .ok()
            .filter(|path| !path.trim().is_empty())
            .map(PathBuf::from);

        Self {
            environment: Environment::detect(),
            file,
            fragments: Vec::new(),
            overrides: OverrideSource::Process,
        }
    }

    pub fn with_environment(mut self, environment: Environment) -> Self {
        self.environment = environment;
        self
    }

    /// Read a TOML file; loading fails if it does not exist
    pub fn with_file(mut self, path: impl AsRef<Path>) -> Self {
        self.file = Some(path.as_ref().to_path_buf());
        self
    }

    /// Add an inline TOML fragment
    pub fn with_toml(mut self, toml: impl Into<String>) -> Self {
        self.fragments.push(toml.into());
        self
    }

    /// Apply the given variables as environment overrides
    pub fn with_env_overrides(mut self, variables: HashMap<String, String>) -> Self {
        self.overrides = OverrideSource::Injected(variables);
        self
    }

    /// Build, deserialize and validate the configuration
    pub fn load(&self) -> ConfigResult<ResilienceConfig> {
        let defaults = ResilienceConfig {
            environment: self.environment,
            ..ResilienceConfig::default()
        };

        let mut builder = Config::builder().add_source(Config::try_from(&defaults)?);

        if let Some(path) = &self.file {
            if !path.is_file() {
                return Err(ConfigurationError::file_not_found(path));
            }
            debug!(path = %path.display(), "Reading configuration file");
            builder = builder.add_source(File::from(path.as_path()).format(FileFormat::Toml));
        }

        for fragment in &self.fragments {
            builder = builder.add_source(File::from_str(fragment, FileFormat::Toml));
        }

        builder = match &self.overrides {
            OverrideSource::None => builder,
            OverrideSource::Process => builder.add_source(Self::override_source()),
            OverrideSource::Injected(variables) => {
                builder.add_source(Self::override_source().source(Some(variables.clone())))
            }
        };

        let config: ResilienceConfig = builder.build()?.try_deserialize()?;
        config.validate()?;

        info!(
            environment = %config.environment,
            store_backend = %config.store.backend,
            cache_enabled = config.cache.enabled,
            endpoint_policies = config.rate_limits.endpoints.len(),
            breaker_profiles = config.circuit_breakers.service_configs.len(),
            "Configuration loaded successfully"
        );

        Ok(config)
    }

    fn override_source() -> config::Environment {
        config::Environment::with_prefix(env_vars::OVERRIDE_PREFIX)
            .prefix_separator(env_vars::OVERRIDE_SEPARATOR)
            .separator(env_vars::OVERRIDE_SEPARATOR)
            .try_parsing(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn overrides(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect()
    }

    #[test]
    fn test_defaults_only() {
        let config = ConfigLoader::new().load().unwrap();
        assert_eq!(config.environment, Environment::Development);
        assert_eq!(config.store.backend, "memory");
        assert_eq!(config.rate_limits.policy_for("chat").unwrap().anonymous.max_requests, 30);
    }

    #[test]
    fn test_file_layer_merges_with_defaults() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[cache]
default_ttl_seconds = 90

[rate_limits.endpoints.chat]
anonymous = {{ max_requests = 3, window_seconds = 60 }}
authenticated = {{ max_requests = 10, window_seconds = 60 }}
"#
        )
        .unwrap();

        let config = ConfigLoader::new()
            .with_environment(Environment::Test)
            .with_file(file.path())
            .load()
            .unwrap();

        assert_eq!(config.environment, Environment::Test);
        assert_eq!(config.cache.default_ttl_seconds, 90);
        // Untouched namespaces keep their defaults
        assert_eq!(config.cache.ttl_for("weather").as_secs(), 1800);
        assert_eq!(config.rate_limits.policy_for("chat").unwrap().anonymous.max_requests, 3);
        assert_eq!(config.rate_limits.policy_for("upload").unwrap().anonymous.max_requests, 5);
    }

    #[test]
    fn test_missing_file_is_reported() {
        let err = ConfigLoader::new()
            .with_file("/definitely/not/here/bakame.toml")
            .load()
            .unwrap_err();
        assert!(matches!(err, ConfigurationError::FileNotFound { .. }));
    }

    #[test]
    fn test_env_overrides_win_over_file() {
        let config = ConfigLoader::new()
            .with_toml("[cache]\ndefault_ttl_seconds = 90\nenabled = true")
            .with_env_overrides(overrides(&[
                ("BAKAME__CACHE__DEFAULT_TTL_SECONDS", "120"),
                ("BAKAME__CACHE__ENABLED", "false"),
                ("BAKAME__RATE_LIMITS__DEVELOPMENT_BYPASS", "true"),
            ]))
            .load()
            .unwrap();

        assert_eq!(config.cache.default_ttl_seconds, 120);
        assert!(!config.cache.enabled);
        assert!(config.rate_limits.development_bypass);
    }

    #[test]
    fn test_unrelated_variables_ignored() {
        let config = ConfigLoader::new()
            .with_env_overrides(overrides(&[("OTHER__CACHE__ENABLED", "false")]))
            .load()
            .unwrap();
        assert!(config.cache.enabled);
    }

    #[test]
    fn test_invalid_values_fail_validation() {
        let result = ConfigLoader::new()
            .with_toml("[cache]\ndefault_ttl_seconds = 0")
            .load();
        assert!(matches!(
            result,
            Err(ConfigurationError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_malformed_toml_is_a_parse_error() {
        let result = ConfigLoader::new().with_toml("[cache\nenabled = ").load();
        assert!(matches!(result, Err(ConfigurationError::ParseError { .. })));
    }
}
