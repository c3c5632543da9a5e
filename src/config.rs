use serde::Deserialize;
use std::collections::BTreeMap;
use std::convert::TryFrom;
use std::path::Path;

/// Environment variable prefix for every configuration key.
const ENV_PREFIX: &str = "MICROHOST";

/// Immutable configuration snapshot for a [`MicroService`](crate::MicroService).
///
/// The snapshot is passed explicitly to the service at construction and on
/// every reload; components never query a process-wide configuration.
/// It can be initialized from environment variables with the `MICROHOST_`
/// prefix (nested keys separated by `__`, e.g. `MICROHOST_SERVICE__PORT`) or
/// from a config file.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ServiceConfig {
    /// HTTP service parameters (`service.*` keys).
    #[serde(default)]
    pub service: ServiceSettings,
    /// Directories checked by the default health probe, keyed by directory id
    /// (`dirs.<id>.path`, `dirs.<id>.access`).
    #[serde(default)]
    pub dirs: BTreeMap<String, DirectoryConfig>,
}

/// The `service` section of the configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceSettings {
    /// Service display name, reported by the health endpoint. Defaults to "Unknown".
    #[serde(default = "default_name")]
    pub name: String,
    /// Path prefix prepended to every route. Defaults to "/api/v1".
    #[serde(default = "default_prefix")]
    pub prefix: String,
    /// Bind address; `*` listens on every interface. Defaults to "*".
    #[serde(default = "default_address")]
    pub address: String,
    /// Bind port. Defaults to 5555.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Number of event-loop workers. Defaults to 10.
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,
}

/// Health-probe settings for one directory.
///
/// Both fields are optional in the source so that an incomplete entry can be
/// reported by the probe instead of failing the whole configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct DirectoryConfig {
    /// Filesystem path of the directory.
    #[serde(default)]
    pub path: Option<String>,
    /// Required access, any combination of `r`, `w` and `x`.
    #[serde(default)]
    pub access: Option<String>,
}

impl DirectoryConfig {
    pub fn new(path: impl Into<String>, access: impl Into<String>) -> Self {
        Self {
            path: Some(path.into()),
            access: Some(access.into()),
        }
    }
}

/// Implements conversion from the config crate's Config type to ServiceConfig.
impl TryFrom<config::Config> for ServiceConfig {
    type Error = config::ConfigError;

    fn try_from(config: config::Config) -> Result<Self, Self::Error> {
        config.try_deserialize()
    }
}

impl ServiceConfig {
    /// Creates a new ServiceConfig from environment variables and config file.
    ///
    /// This method will:
    /// 1. Load environment variables from a .env file if present
    /// 2. Load configuration from a "config" file (if it exists)
    /// 3. Override with environment variables prefixed with "MICROHOST_"
    ///
    /// # Errors
    /// Returns a ConfigError if configuration loading or parsing fails.
    pub fn new() -> Result<Self, config::ConfigError> {
        dotenv::dotenv().ok();

        let builder = config::Config::builder()
            .add_source(config::File::with_name("config").required(false))
            .add_source(Self::environment());

        builder.build()?.try_into()
    }

    /// Loads configuration from an explicit file, still allowing environment
    /// overrides. The format is inferred from the file extension.
    ///
    /// # Errors
    /// Returns a ConfigError if the file is missing or cannot be parsed.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, config::ConfigError> {
        let builder = config::Config::builder()
            .add_source(config::File::from(path.as_ref()))
            .add_source(Self::environment());

        builder.build()?.try_into()
    }

    fn environment() -> config::Environment {
        config::Environment::with_prefix(ENV_PREFIX)
            .prefix_separator("_")
            .separator("__")
    }

    /// Address handed to the socket layer; `*` becomes the IPv4 wildcard.
    pub fn bind_address(&self) -> &str {
        match self.service.address.as_str() {
            "*" | "" => "0.0.0.0",
            address => address,
        }
    }
}

fn default_name() -> String {
    "Unknown".to_string()
}

fn default_prefix() -> String {
    "/api/v1".to_string()
}

fn default_address() -> String {
    "*".to_string()
}

fn default_port() -> u16 {
    5555
}

fn default_pool_size() -> usize {
    10
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            name: default_name(),
            prefix: default_prefix(),
            address: default_address(),
            port: default_port(),
            pool_size: default_pool_size(),
        }
    }
}
