use serde::Deserialize;
use std::{path::PathBuf, time::Duration};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    #[serde(deserialize_with = "deserialize_log_level")]
    pub log_level: LogLevel,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub vision: VisionConfig,
}

fn deserialize_log_level<'de, D>(deserializer: D) -> Result<LogLevel, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    s.try_into().map_err(serde::de::Error::custom)
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Request body cap in bytes. Unset means uploads are not size limited.
    #[serde(default)]
    pub max_body_bytes: Option<usize>,
}

impl ServerConfig {
    pub fn get_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    #[serde(default = "default_upload_dir")]
    pub upload_dir: PathBuf,
}

fn default_upload_dir() -> PathBuf {
    PathBuf::from("uploads")
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            upload_dir: default_upload_dir(),
        }
    }
}

/// Settings for the cloud vision provider.
///
/// The endpoint and key themselves are secrets and never live in the
/// configuration files: only the names of the environment variables holding
/// them do, and those variables are read on every request.
#[derive(Debug, Deserialize, Clone)]
pub struct VisionConfig {
    #[serde(default = "default_endpoint_env")]
    pub endpoint_env: String,
    #[serde(default = "default_key_env")]
    pub key_env: String,
    #[serde(default = "default_api_path")]
    pub api_path: String,
    #[serde(default = "default_visual_features")]
    pub visual_features: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_endpoint_env() -> String {
    "VISION_ENDPOINT".into()
}

fn default_key_env() -> String {
    "VISION_KEY".into()
}

fn default_api_path() -> String {
    "vision/v3.2/analyze".into()
}

fn default_visual_features() -> String {
    "Objects".into()
}

fn default_timeout_secs() -> u64 {
    30
}

impl VisionConfig {
    pub fn get_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for VisionConfig {
    fn default() -> Self {
        Self {
            endpoint_env: default_endpoint_env(),
            key_env: default_key_env(),
            api_path: default_api_path(),
            visual_features: default_visual_features(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub enum Environment {
    Local,
    Production,
}

impl Environment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Local => "local",
            Environment::Production => "production",
        }
    }
}

impl TryFrom<String> for Environment {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        match s.to_lowercase().as_str() {
            "local" => Ok(Self::Local),
            "production" => Ok(Self::Production),
            other => Err(format!(
                "{} is not a supported environment. Use either `local` or `production`.",
                other
            )),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub enum LogLevel {
    Debug,
    Info,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
        }
    }
}

impl TryFrom<String> for LogLevel {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        match s.to_lowercase().as_str() {
            "debug" => Ok(Self::Debug),
            "info" => Ok(Self::Info),
            other => Err(format!(
                "{} is not a supported minimum log level. Use either `debug` or `info`.",
                other
            )),
        }
    }
}

pub fn get_configuration() -> Result<Config, config::ConfigError> {
    let base_path = std::env::current_dir().map_err(|e| {
        config::ConfigError::Message(format!("Failed to determine the current directory: {}", e))
    })?;
    let configuration_directory = base_path.join("configuration");

    let environment = Environment::try_from(
        std::env::var("APP_ENVIRONMENT").unwrap_or_else(|_| "local".into()),
    )
    .map_err(config::ConfigError::Message)?;

    let config = config::Config::builder()
        .add_source(config::File::from(
            configuration_directory.join("base.yaml"),
        ))
        .add_source(
            config::File::from(
                configuration_directory.join(format!("{}.yaml", environment.as_str())),
            )
            .required(false),
        )
        .add_source(
            config::Environment::with_prefix("DG")
                .prefix_separator("_")
                .separator("__"),
        )
        .build()?;

    let config: Config = config.try_deserialize::<Config>()?;

    Ok(config)
}
