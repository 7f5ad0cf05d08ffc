//! Configuration: required environment plus an optional TOML file

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Deserializer};
use tripline_core::{HttpConfig, StoreBackend};
use tripline_tlc::config::{DEFAULT_ARCHIVE_BASE_URL, DEFAULT_LOOKUP_URL};
use tripline_tlc::{RunConfig, Selection, Service};

pub const BUCKET_VAR: &str = "BUCKET";
pub const PROJECT_VAR: &str = "GOOGLE_CLOUD_PROJECT";
pub const CREDENTIALS_VAR: &str = "GOOGLE_APPLICATION_CREDENTIALS";
/// Explicit config file path, takes precedence over the search locations
pub const CONFIG_PATH_VAR: &str = "TRIPLINE_CONFIG";

/// Fatal configuration problem, detected before any work starts
#[derive(Debug)]
pub enum ConfigError {
    MissingVar(&'static str),
    CredentialsNotFound(PathBuf),
    Invalid(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingVar(name) => {
                write!(f, "Missing required environment variable {name}")
            }
            Self::CredentialsNotFound(path) => {
                write!(f, "Credentials file not found: {}", path.display())
            }
            Self::Invalid(msg) => write!(f, "Invalid configuration: {msg}"),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Values that must come from the environment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Environment {
    pub bucket: String,
    pub project_id: String,
    pub credentials_path: PathBuf,
}

impl Environment {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Resolve from any variable source. Empty values count as missing.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |name: &'static str| {
            lookup(name)
                .filter(|v| !v.trim().is_empty())
                .ok_or(ConfigError::MissingVar(name))
        };

        let bucket = get(BUCKET_VAR)?;
        let project_id = get(PROJECT_VAR)?;
        let credentials_path = PathBuf::from(get(CREDENTIALS_VAR)?);
        if !credentials_path.is_file() {
            return Err(ConfigError::CredentialsNotFound(credentials_path));
        }

        Ok(Self {
            bucket,
            project_id,
            credentials_path,
        })
    }
}

/// Contents of `tripline.toml`. Every key is optional.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub source: SourceConfig,
    pub run: RunSection,
    pub output: OutputConfig,
    pub http: HttpSection,
    pub store: StoreConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    pub archive_base_url: String,
    pub lookup_url: String,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            archive_base_url: DEFAULT_ARCHIVE_BASE_URL.to_string(),
            lookup_url: DEFAULT_LOOKUP_URL.to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RunSection {
    #[serde(deserialize_with = "deserialize_years")]
    pub years: Vec<String>,
    pub services: Vec<Service>,
    /// Explicit (year, service) pairs; replaces the years x services grid
    pub tasks: Vec<TaskEntry>,
}

impl Default for RunSection {
    fn default() -> Self {
        Self {
            years: vec!["2019".to_string(), "2020".to_string()],
            services: vec![Service::Green],
            tasks: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TaskEntry {
    #[serde(deserialize_with = "deserialize_year")]
    pub year: String,
    pub service: Service,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub scratch_dir: PathBuf,
    pub compression_level: i32,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            scratch_dir: std::env::temp_dir().join("tripline"),
            compression_level: 3,
        }
    }
}

/// Timeouts in seconds
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct HttpSection {
    pub connect_timeout: u64,
    pub read_timeout: u64,
}

impl Default for HttpSection {
    fn default() -> Self {
        Self {
            connect_timeout: 30,
            read_timeout: 60,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Write objects under this directory instead of Cloud Storage
    pub local_root: Option<PathBuf>,
}

/// Years may be written as `2019` or `"2019"`
#[derive(Deserialize)]
#[serde(untagged)]
enum YearRepr {
    Text(String),
    Number(u32),
}

impl From<YearRepr> for String {
    fn from(year: YearRepr) -> Self {
        match year {
            YearRepr::Text(s) => s,
            YearRepr::Number(n) => n.to_string(),
        }
    }
}

fn deserialize_year<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    YearRepr::deserialize(deserializer).map(String::from)
}

fn deserialize_years<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let years: Vec<YearRepr> = Vec::deserialize(deserializer)?;
    Ok(years.into_iter().map(String::from).collect())
}

impl FileConfig {
    /// Load configuration from default locations
    ///
    /// Search order:
    /// 1. `$TRIPLINE_CONFIG`
    /// 2. ./tripline.toml (current directory)
    /// 3. ~/.config/tripline/config.toml
    ///
    /// If no config file found, returns default config.
    pub fn load() -> Result<Self> {
        if let Some(path) = std::env::var_os(CONFIG_PATH_VAR) {
            return Self::from_file(Path::new(&path));
        }

        let local_config = PathBuf::from("tripline.toml");
        if local_config.exists() {
            return Self::from_file(&local_config);
        }

        if let Some(config_dir) = directories::ProjectDirs::from("", "", "tripline") {
            let user_config = config_dir.config_dir().join("config.toml");
            if user_config.exists() {
                return Self::from_file(&user_config);
            }
        }

        log::debug!("No config file found, using defaults");
        Ok(Self::default())
    }

    /// Load configuration from a specific file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: FileConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        log::info!("Loaded config from {}", path.display());
        Ok(config)
    }
}

/// Everything the binary needs to build a pipeline
#[derive(Debug, Clone)]
pub struct Settings {
    pub run: RunConfig,
    pub http: HttpConfig,
    pub backend: StoreBackend,
    pub compression_level: i32,
    pub project_id: String,
}

impl Settings {
    pub fn resolve(env: Environment, file: FileConfig) -> Result<Self, ConfigError> {
        let FileConfig {
            source,
            run,
            output,
            http,
            store,
        } = file;

        for year in run.years.iter().chain(run.tasks.iter().map(|t| &t.year)) {
            if year.is_empty() || !year.bytes().all(|b| b.is_ascii_digit()) {
                return Err(ConfigError::Invalid(format!("year {year:?} is not numeric")));
            }
        }
        if !(1..=22).contains(&output.compression_level) {
            return Err(ConfigError::Invalid(format!(
                "compression_level {} outside 1..=22",
                output.compression_level
            )));
        }
        if http.connect_timeout == 0 || http.read_timeout == 0 {
            return Err(ConfigError::Invalid("timeouts must be positive".to_string()));
        }

        let selection = if run.tasks.is_empty() {
            Selection::Grid {
                years: run.years,
                services: run.services,
            }
        } else {
            Selection::Pairs(run.tasks.into_iter().map(|t| (t.year, t.service)).collect())
        };

        let backend = match store.local_root {
            Some(root) => StoreBackend::Fs { root },
            None => StoreBackend::Gcs {
                credential_path: env.credentials_path,
            },
        };

        Ok(Self {
            run: RunConfig {
                bucket: env.bucket,
                archive_base_url: source.archive_base_url,
                lookup_url: source.lookup_url,
                scratch_dir: output.scratch_dir,
                selection,
            },
            http: HttpConfig {
                connect_timeout: Duration::from_secs(http.connect_timeout),
                read_timeout: Duration::from_secs(http.read_timeout),
            },
            backend,
            compression_level: output.compression_level,
            project_id: env.project_id,
        })
    }
}
