use facegate_keys::password::{DEFAULT_COST, MAX_COST, MIN_COST};
use facegate_keys::session::{DEFAULT_TTL_SECS, MAX_TTL_SECS};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("unknown bus {0:?} (expected \"session\" or \"system\")")]
    UnknownBus(String),
    #[error("similarity threshold must be in [0, 1), got {0}")]
    Threshold(f32),
    #[error("{0} must be greater than zero")]
    Zero(&'static str),
    #[error("session_ttl_secs must be in 1..={max}, got {0}", max = MAX_TTL_SECS)]
    SessionTtl(i64),
    #[error("password_cost must be in {min}..={max}, got {0}", min = MIN_COST, max = MAX_COST)]
    PasswordCost(u32),
}

/// Which D-Bus bus the daemon registers on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BusKind {
    Session,
    System,
}

impl std::str::FromStr for BusKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "session" => Ok(BusKind::Session),
            "system" => Ok(BusKind::System),
            other => Err(ConfigError::UnknownBus(other.to_string())),
        }
    }
}

/// Daemon configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// D-Bus bus to serve on (default: session).
    pub bus: BusKind,
    /// Path to the SQLite database file.
    pub db_path: PathBuf,
    /// Similarity a face must strictly exceed to be accepted.
    pub similarity_threshold: f32,
    /// Descriptor dimension accepted at registration.
    pub descriptor_dim: usize,
    /// Secret the session key is derived from. `None` means a random key per process.
    pub session_secret: Option<String>,
    /// Session lifetime in seconds, at most one year.
    pub session_ttl_secs: i64,
    /// bcrypt cost for new password hashes.
    pub password_cost: u32,
}

/// Optional overrides read from the TOML file.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileConfig {
    bus: Option<BusKind>,
    db_path: Option<PathBuf>,
    similarity_threshold: Option<f32>,
    descriptor_dim: Option<usize>,
    session_secret: Option<String>,
    session_ttl_secs: Option<i64>,
    password_cost: Option<u32>,
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = std::env::var("XDG_DATA_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
                PathBuf::from(home).join(".local/share")
            })
            .join("facegate");

        Self {
            bus: BusKind::Session,
            db_path: data_dir.join("accounts.db"),
            similarity_threshold: facegate_core::DEFAULT_THRESHOLD,
            descriptor_dim: 128,
            session_secret: None,
            session_ttl_secs: DEFAULT_TTL_SECS,
            password_cost: DEFAULT_COST,
        }
    }
}

impl Config {
    /// Defaults, then the TOML file named by `FACEGATE_CONFIG` (if set),
    /// then `FACEGATE_*` environment variables.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if let Ok(path) = std::env::var("FACEGATE_CONFIG") {
            config.merge_file(Path::new(&path))?;
        }
        config.merge_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    fn merge_file(&mut self, path: &Path) -> Result<(), ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let file: FileConfig = toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

        if let Some(v) = file.bus {
            self.bus = v;
        }
        if let Some(v) = file.db_path {
            self.db_path = v;
        }
        if let Some(v) = file.similarity_threshold {
            self.similarity_threshold = v;
        }
        if let Some(v) = file.descriptor_dim {
            self.descriptor_dim = v;
        }
        if let Some(v) = file.session_secret {
            self.session_secret = Some(v);
        }
        if let Some(v) = file.session_ttl_secs {
            self.session_ttl_secs = v;
        }
        if let Some(v) = file.password_cost {
            self.password_cost = v;
        }
        Ok(())
    }

    /// Apply environment overrides. Unparseable numbers are ignored, as are
    /// empty secrets.
    fn merge_env(&mut self, var: impl Fn(&str) -> Option<String>) -> Result<(), ConfigError> {
        if let Some(v) = var("FACEGATE_BUS") {
            self.bus = v.parse()?;
        }
        if let Some(v) = var("FACEGATE_DB_PATH") {
            self.db_path = PathBuf::from(v);
        }
        if let Some(v) = var("FACEGATE_SESSION_SECRET").filter(|s| !s.is_empty()) {
            self.session_secret = Some(v);
        }
        self.similarity_threshold = parse_or(
            &var,
            "FACEGATE_SIMILARITY_THRESHOLD",
            self.similarity_threshold,
        );
        self.descriptor_dim = parse_or(&var, "FACEGATE_DESCRIPTOR_DIM", self.descriptor_dim);
        self.session_ttl_secs = parse_or(&var, "FACEGATE_SESSION_TTL_SECS", self.session_ttl_secs);
        self.password_cost = parse_or(&var, "FACEGATE_PASSWORD_COST", self.password_cost);
        Ok(())
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..1.0).contains(&self.similarity_threshold) {
            return Err(ConfigError::Threshold(self.similarity_threshold));
        }
        if self.descriptor_dim == 0 {
            return Err(ConfigError::Zero("descriptor_dim"));
        }
        if !(1..=MAX_TTL_SECS).contains(&self.session_ttl_secs) {
            return Err(ConfigError::SessionTtl(self.session_ttl_secs));
        }
        if !(MIN_COST..=MAX_COST).contains(&self.password_cost) {
            return Err(ConfigError::PasswordCost(self.password_cost));
        }
        Ok(())
    }
}

fn parse_or<T: std::str::FromStr>(
    var: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> T {
    var(key).and_then(|v| v.parse().ok()).unwrap_or(default)
}
