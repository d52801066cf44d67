use serde::Deserialize;
use serde::Deserializer;
use serde::de::Error;

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub mod error;
pub use error::ConfigError;

pub mod date_range;
pub use date_range::DateRange;

pub const DEFAULT_CONFIG_PATH: &str = "./data/config/services.json";

const DEFAULT_BACKEND_URL: &str = "https://openeo.vito.be";
const DEFAULT_TIMESERIES_HOST: &str = "http://epod-openeo-dev.vgt.vito.be:8080";
const DEFAULT_UDF_DIR: &str = "udf";
const DEFAULT_POLL_INTERVAL_SECS: u64 = 30;
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 300;

/// How the session with the back-end is authenticated.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(tag = "method", rename_all = "lowercase")]
pub enum AuthMethod {
    /// HTTP basic credentials exchanged for an access token.
    Basic { username: String, password: String },
    /// Pre-obtained bearer token, e.g. `oidc/egi/<access token>`.
    Bearer { token: String },
}

#[derive(Debug, Clone)]
pub struct Config {
    backend_url: String,
    timeseries_host: String,
    udf_dir: PathBuf,
    poll_interval: Duration,
    request_timeout: Duration,
    auth: Option<AuthMethod>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            backend_url: DEFAULT_BACKEND_URL.to_string(),
            timeseries_host: DEFAULT_TIMESERIES_HOST.to_string(),
            udf_dir: PathBuf::from(DEFAULT_UDF_DIR),
            poll_interval: Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            auth: None,
        }
    }
}

fn validate_url(url: String) -> Result<String, ConfigError> {
    if url.starts_with("http://") || url.starts_with("https://") {
        Ok(url.trim_end_matches('/').to_string())
    } else {
        Err(ConfigError::InvalidUrl(url))
    }
}

// Every field is optional in the file; missing ones fall back to the defaults above.
impl<'de> Deserialize<'de> for Config {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(deny_unknown_fields)]
        struct ConfigHelper {
            backend_url: Option<String>,
            timeseries_host: Option<String>,
            udf_dir: Option<PathBuf>,
            poll_interval_secs: Option<u64>,
            request_timeout_secs: Option<u64>,
            auth: Option<AuthMethod>,
        }

        let helper = ConfigHelper::deserialize(deserializer)?;
        let defaults = Config::default();

        let backend_url = match helper.backend_url {
            Some(url) => validate_url(url).map_err(D::Error::custom)?,
            None => defaults.backend_url,
        };

        let timeseries_host = match helper.timeseries_host {
            Some(url) => validate_url(url).map_err(D::Error::custom)?,
            None => defaults.timeseries_host,
        };

        let poll_interval = match helper.poll_interval_secs {
            Some(0) => {
                return Err(D::Error::custom(ConfigError::ZeroInterval(
                    "poll_interval_secs",
                )));
            }
            Some(secs) => Duration::from_secs(secs),
            None => defaults.poll_interval,
        };

        let request_timeout = match helper.request_timeout_secs {
            Some(0) => {
                return Err(D::Error::custom(ConfigError::ZeroInterval(
                    "request_timeout_secs",
                )));
            }
            Some(secs) => Duration::from_secs(secs),
            None => defaults.request_timeout,
        };

        Ok(Config {
            backend_url,
            timeseries_host,
            udf_dir: helper.udf_dir.unwrap_or(defaults.udf_dir),
            poll_interval,
            request_timeout,
            auth: helper.auth,
        })
    }
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
        let file = File::open(path)?;
        let reader = BufReader::new(file);

        let config: Config = serde_json::from_reader(reader).map_err(ConfigError::from)?;

        Ok(config)
    }

    /// Loads `path` when given; otherwise the default location if it exists, else defaults.
    pub fn load(path: Option<&Path>) -> Result<Config, ConfigError> {
        match path {
            Some(path) => Self::from_file(path),
            None if Path::new(DEFAULT_CONFIG_PATH).is_file() => {
                Self::from_file(DEFAULT_CONFIG_PATH)
            }
            None => Ok(Config::default()),
        }
    }

    pub fn backend_url(&self) -> &str {
        &self.backend_url
    }

    pub fn timeseries_host(&self) -> &str {
        &self.timeseries_host
    }

    pub fn udf_dir(&self) -> &Path {
        &self.udf_dir
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    pub fn auth(&self) -> Option<&AuthMethod> {
        self.auth.as_ref()
    }
}
