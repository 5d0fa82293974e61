use batcher::BatchConfig;
use batcher::BatchConfigBuilder;
use batcher::BatchConfigError;
use camino::Utf8Path;
use camino::Utf8PathBuf;
use event_router_ext::DEFAULT_MAX_BODY_SIZE;
use reqwest::Url;
use serde::Deserialize;
use std::fs;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_CONFIG_PATH: &str = "/etc/event-router/event-router.toml";

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("Toml syntax error in the config file '{path}': {reason}")]
    InvalidSyntax { path: Utf8PathBuf, reason: String },

    #[error("Invalid log level: {name:?}, supported levels are error, warn, info, debug and trace")]
    InvalidLogLevel { name: String },

    #[error("No authorization token is configured: set `http.auth_token` or EVENT_ROUTER_AUTH_TOKEN")]
    MissingAuthToken,

    #[error("Invalid sink url {url:?}: {reason}")]
    InvalidSinkUrl { url: String, reason: String },

    #[error("`http.max_body_size` must be strictly positive")]
    ZeroMaxBodySize,

    #[error(transparent)]
    InvalidBatchConfig(#[from] BatchConfigError),
}

/// The content of the event router configuration file.
///
/// All sections are optional, missing values being given their defaults.
#[derive(Deserialize, Debug, Default, Clone, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct EventRouterConfig {
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub batch: BatchSettings,
    #[serde(default)]
    pub sink: SinkConfig,
    #[serde(default)]
    pub log: LogConfig,
}

#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct HttpConfig {
    #[serde(default = "HttpConfig::default_bind")]
    pub bind: SocketAddr,
    #[serde(default)]
    pub auth_token: Option<String>,
    /// Larger request bodies are rejected with `413 Payload Too Large`
    #[serde(default = "HttpConfig::default_max_body_size")]
    pub max_body_size: usize,
}

impl HttpConfig {
    fn default_bind() -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], 7070))
    }

    fn default_max_body_size() -> usize {
        DEFAULT_MAX_BODY_SIZE
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        HttpConfig {
            bind: HttpConfig::default_bind(),
            auth_token: None,
            max_body_size: HttpConfig::default_max_body_size(),
        }
    }
}

#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct BatchSettings {
    #[serde(default = "BatchSettings::default_max_batch_size")]
    pub max_batch_size: usize,

    /// Defaults to ten times the batch size
    #[serde(default)]
    pub buffer_capacity: Option<usize>,

    #[serde(
        default = "BatchSettings::default_flush_interval",
        deserialize_with = "parse_human_duration"
    )]
    pub flush_interval: Duration,

    /// Bound on a single ingestion call
    #[serde(
        default = "BatchSettings::default_flush_timeout",
        deserialize_with = "parse_human_duration"
    )]
    pub flush_timeout: Duration,

    /// Bound on the whole shutdown sequence when the service stops:
    /// the in-flight requests are given this long to complete,
    /// and the remaining events are delivered within what is left of it
    #[serde(
        default = "BatchSettings::default_shutdown_timeout",
        deserialize_with = "parse_human_duration"
    )]
    pub shutdown_timeout: Duration,
}

impl BatchSettings {
    fn default_max_batch_size() -> usize {
        1000
    }

    fn default_flush_interval() -> Duration {
        Duration::from_secs(1)
    }

    fn default_flush_timeout() -> Duration {
        Duration::from_secs(10)
    }

    fn default_shutdown_timeout() -> Duration {
        Duration::from_secs(30)
    }
}

impl Default for BatchSettings {
    fn default() -> Self {
        BatchSettings {
            max_batch_size: BatchSettings::default_max_batch_size(),
            buffer_capacity: None,
            flush_interval: BatchSettings::default_flush_interval(),
            flush_timeout: BatchSettings::default_flush_timeout(),
            shutdown_timeout: BatchSettings::default_shutdown_timeout(),
        }
    }
}

#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct SinkConfig {
    #[serde(default = "SinkConfig::default_url")]
    pub url: String,
    #[serde(default)]
    pub token: Option<String>,
}

impl SinkConfig {
    fn default_url() -> String {
        "https://api.tinybird.co".to_string()
    }
}

impl Default for SinkConfig {
    fn default() -> Self {
        SinkConfig {
            url: SinkConfig::default_url(),
            token: None,
        }
    }
}

#[derive(Deserialize, Debug, Default, Clone, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct LogConfig {
    #[serde(default)]
    pub level: Option<String>,
}

impl EventRouterConfig {
    /// Read the configuration file, returning the default configuration if there is no such file.
    pub fn try_new(path: &Utf8Path) -> Result<Self, ConfigError> {
        match fs::read_to_string(path) {
            Ok(contents) => toml::from_str(&contents).map_err(|e| ConfigError::InvalidSyntax {
                path: path.to_owned(),
                reason: e.to_string(),
            }),
            Err(_) => Ok(Self::default()),
        }
    }

    pub fn auth_token(&self) -> Result<&str, ConfigError> {
        match self.http.auth_token.as_deref() {
            Some(token) if !token.trim().is_empty() => Ok(token),
            _ => Err(ConfigError::MissingAuthToken),
        }
    }

    pub fn max_body_size(&self) -> Result<usize, ConfigError> {
        match self.http.max_body_size {
            0 => Err(ConfigError::ZeroMaxBodySize),
            size => Ok(size),
        }
    }

    pub fn sink_url(&self) -> Result<Url, ConfigError> {
        Url::parse(&self.sink.url).map_err(|e| ConfigError::InvalidSinkUrl {
            url: self.sink.url.clone(),
            reason: e.to_string(),
        })
    }

    pub fn batch_config(&self) -> Result<BatchConfig, ConfigError> {
        let mut builder = BatchConfigBuilder::new()
            .max_batch_size(self.batch.max_batch_size)
            .flush_interval(self.batch.flush_interval);
        if let Some(buffer_capacity) = self.batch.buffer_capacity {
            builder = builder.buffer_capacity(buffer_capacity);
        }
        Ok(builder.build()?)
    }

    pub fn log_level(&self) -> Result<Option<tracing::Level>, ConfigError> {
        self.log
            .level
            .as_deref()
            .map(|name| {
                tracing::Level::from_str(&name.to_uppercase()).map_err(|_| {
                    ConfigError::InvalidLogLevel {
                        name: name.to_string(),
                    }
                })
            })
            .transpose()
    }
}

fn parse_human_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: serde::de::Deserializer<'de>,
{
    let value = String::deserialize(deserializer)?;
    humantime::parse_duration(&value).map_err(|_| serde::de::Error::custom("Invalid duration"))
}
