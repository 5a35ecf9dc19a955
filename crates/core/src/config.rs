//! Layered runtime settings.
//!
//! Layers, lowest first: built-in defaults, a `tripwise.toml` file, `TRIPWISE_*`
//! environment variables, then [`ConfigOverrides`] from the caller. The file and
//! environment layers are merged into one TOML table and decoded once, so both
//! are held to the same serde rules (unknown keys are errors).

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use toml::{Table, Value};

/// Searched in order when no explicit path is given.
pub const DEFAULT_CONFIG_PATHS: [&str; 2] = ["tripwise.toml", "config/tripwise.toml"];

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self { url: "sqlite://tripwise.db?mode=rwc".to_string(), max_connections: 5, timeout_secs: 30 }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info".to_string(), format: LogFormat::Compact }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

impl LogFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Compact => "compact",
            Self::Pretty => "pretty",
            Self::Json => "json",
        }
    }
}

impl FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        [Self::Compact, Self::Pretty, Self::Json]
            .into_iter()
            .find(|format| value.trim().eq_ignore_ascii_case(format.as_str()))
            .ok_or_else(|| {
                ConfigError::Validation(format!(
                    "logging.format `{}` is not one of compact|pretty|json",
                    value.trim()
                ))
            })
    }
}

/// Values set by the caller; these win over every other layer.
#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub database_url: Option<String>,
    pub database_max_connections: Option<u32>,
    pub log_level: Option<String>,
    pub log_format: Option<LogFormat>,
}

impl ConfigOverrides {
    fn apply(self, config: &mut AppConfig) {
        if let Some(url) = self.database_url {
            config.database.url = url;
        }
        if let Some(max_connections) = self.database_max_connections {
            config.database.max_connections = max_connections;
        }
        if let Some(level) = self.log_level {
            config.logging.level = level;
        }
        if let Some(format) = self.log_format {
            config.logging.format = format;
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not decode settings from {origin}: {source}")]
    Decode { origin: String, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("config file references unset environment variable `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("config file has a `${{` without a closing `}}`")]
    UnterminatedInterpolation,
    #[error("invalid value for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

#[derive(Clone, Copy)]
enum EnvKind {
    Text,
    Number,
    Format,
}

/// One settings key and the variables that can set it; the first set variable wins.
struct EnvBinding {
    section: &'static str,
    key: &'static str,
    vars: &'static [&'static str],
    kind: EnvKind,
}

const ENV_BINDINGS: [EnvBinding; 5] = [
    EnvBinding {
        section: "database",
        key: "url",
        vars: &["TRIPWISE_DATABASE_URL"],
        kind: EnvKind::Text,
    },
    EnvBinding {
        section: "database",
        key: "max_connections",
        vars: &["TRIPWISE_DATABASE_MAX_CONNECTIONS"],
        kind: EnvKind::Number,
    },
    EnvBinding {
        section: "database",
        key: "timeout_secs",
        vars: &["TRIPWISE_DATABASE_TIMEOUT_SECS"],
        kind: EnvKind::Number,
    },
    EnvBinding {
        section: "logging",
        key: "level",
        vars: &["TRIPWISE_LOGGING_LEVEL", "TRIPWISE_LOG_LEVEL"],
        kind: EnvKind::Text,
    },
    EnvBinding {
        section: "logging",
        key: "format",
        vars: &["TRIPWISE_LOGGING_FORMAT", "TRIPWISE_LOG_FORMAT"],
        kind: EnvKind::Format,
    },
];

impl EnvBinding {
    fn lookup(&self) -> Option<(&'static str, String)> {
        self.vars.iter().find_map(|var| {
            env::var(var).ok().filter(|value| !value.trim().is_empty()).map(|value| (*var, value))
        })
    }

    fn to_toml(&self, var: &str, raw: String) -> Result<Value, ConfigError> {
        let parsed = match self.kind {
            EnvKind::Text => Some(Value::String(raw.trim().to_string())),
            EnvKind::Number => raw.trim().parse::<u32>().ok().map(|number| Value::Integer(number.into())),
            EnvKind::Format => {
                raw.parse::<LogFormat>().ok().map(|format| Value::String(format.as_str().to_string()))
            }
        };
        parsed.ok_or(ConfigError::InvalidEnvOverride { key: var.to_string(), value: raw })
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let file = locate_file(options.config_path.as_deref(), options.require_file)?;
        let mut layers = match &file {
            Some(path) => read_file_layer(path)?,
            None => Table::new(),
        };
        overlay_env(&mut layers)?;

        let mut config = layers.try_into::<AppConfig>().map_err(|source| ConfigError::Decode {
            origin: file.map_or_else(|| "environment".to_string(), |path| format!("`{}`", path.display())),
            source,
        })?;
        options.overrides.apply(&mut config);
        config.validate()?;

        Ok(config)
    }

    /// Reports every problem at once, separated by `; `.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut problems = Vec::new();

        let url = self.database.url.trim();
        if !(url.starts_with("sqlite://") || url.starts_with("sqlite::") || url == ":memory:") {
            problems.push(
                "database.url must be a sqlite URL (`sqlite://...`, `sqlite::...` or `:memory:`)".to_string(),
            );
        }
        if self.database.max_connections == 0 {
            problems.push("database.max_connections must be greater than zero".to_string());
        }
        if !(1..=300).contains(&self.database.timeout_secs) {
            problems.push(format!(
                "database.timeout_secs must be in range 1..=300 (got {})",
                self.database.timeout_secs
            ));
        }
        if !LOG_LEVELS.iter().any(|level| self.logging.level.trim().eq_ignore_ascii_case(level)) {
            problems.push(format!("logging.level must be one of {}", LOG_LEVELS.join("|")));
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(problems.join("; ")))
        }
    }
}

fn locate_file(explicit: Option<&Path>, required: bool) -> Result<Option<PathBuf>, ConfigError> {
    let found = match explicit {
        Some(path) => path.exists().then(|| path.to_path_buf()),
        None => DEFAULT_CONFIG_PATHS.iter().map(PathBuf::from).find(|path| path.exists()),
    };
    match found {
        None if required => Err(ConfigError::MissingConfigFile(
            explicit.map_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATHS[0]), Path::to_path_buf),
        )),
        found => Ok(found),
    }
}

fn read_file_layer(path: &Path) -> Result<Table, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;
    expand_env_refs(&raw)?
        .parse::<Table>()
        .map_err(|source| ConfigError::Decode { origin: format!("`{}`", path.display()), source })
}

fn overlay_env(layers: &mut Table) -> Result<(), ConfigError> {
    for binding in &ENV_BINDINGS {
        let Some((var, raw)) = binding.lookup() else {
            continue;
        };
        let value = binding.to_toml(var, raw)?;
        let section =
            layers.entry(binding.section).or_insert_with(|| Value::Table(Table::new()));
        if let Value::Table(section) = section {
            section.insert(binding.key.to_string(), value);
        }
    }
    Ok(())
}

/// Replaces each `${VAR}` with the variable's value.
fn expand_env_refs(raw: &str) -> Result<String, ConfigError> {
    let mut expanded = String::with_capacity(raw.len());
    let mut rest = raw;
    while let Some(start) = rest.find("${") {
        expanded.push_str(&rest[..start]);
        let tail = &rest[start + 2..];
        let end = tail.find('}').ok_or(ConfigError::UnterminatedInterpolation)?;
        let var = &tail[..end];
        let value = env::var(var)
            .map_err(|_| ConfigError::MissingEnvInterpolation { var: var.to_string() })?;
        expanded.push_str(&value);
        rest = &tail[end + 1..];
    }
    expanded.push_str(rest);
    Ok(expanded)
}
