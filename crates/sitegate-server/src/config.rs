use serde::{Deserialize, Serialize};
use sitegate_auth::AuthConfig;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Authentication and authorization configuration
    #[serde(default)]
    pub auth: AuthConfig,
    /// Accounts seeded at startup
    #[serde(default)]
    pub bootstrap: BootstrapConfig,
}

impl AppConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.server.port == 0 {
            return Err("server.port must be > 0".into());
        }
        let lvl = self.logging.level.to_ascii_lowercase();
        let valid_levels = ["trace", "debug", "info", "warn", "error", "off"];
        if !valid_levels.contains(&lvl.as_str()) {
            return Err(format!("logging.level must be one of {valid_levels:?}"));
        }
        for account in &self.bootstrap.accounts {
            if account.username.trim().is_empty() || account.password.is_empty() {
                return Err("bootstrap accounts need a username and a password".into());
            }
        }
        self.auth
            .validate()
            .map_err(|e| format!("auth config error: {e}"))?;
        Ok(())
    }

    pub fn addr(&self) -> SocketAddr {
        let host: IpAddr = self
            .server
            .host
            .parse()
            .unwrap_or(IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0)));
        SocketAddr::from((host, self.server.port))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "0.0.0.0".into()
}
fn default_port() -> u16 {
    8080
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}
fn default_log_level() -> String {
    "info".into()
}
impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct BootstrapConfig {
    #[serde(default)]
    pub accounts: Vec<SeedAccount>,
}

/// An account registered on startup.
#[derive(Clone, Serialize, Deserialize)]
pub struct SeedAccount {
    pub username: String,
    /// Plain text, hashed before it is stored.
    /// Prefer SITEGATE__BOOTSTRAP__... env vars over the config file.
    pub password: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub fname: String,
    #[serde(default)]
    pub lname: String,
}

impl std::fmt::Debug for SeedAccount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SeedAccount")
            .field("username", &self.username)
            .field("password", &"***")
            .field("email", &self.email)
            .finish_non_exhaustive()
    }
}

pub mod loader {
    use super::AppConfig;
    use config::{Config, Environment, File};
    use std::path::PathBuf;

    pub const DEFAULT_CONFIG_PATH: &str = "sitegate.toml";

    /// Loads defaults, then the TOML file, then `SITEGATE__*` environment
    /// overrides.
    ///
    /// An explicit `path` must exist. Without one, `sitegate.toml` is read
    /// when present.
    pub fn load_config(path: Option<&str>) -> Result<AppConfig, String> {
        let file = match path {
            Some(path) => File::from(PathBuf::from(path)).required(true),
            None => File::from(PathBuf::from(DEFAULT_CONFIG_PATH)).required(false),
        };
        let cfg = Config::builder()
            .add_source(file)
            // e.g. SITEGATE__AUTH__TOKENS__SHORT_DURATION=30m
            .add_source(
                Environment::with_prefix("SITEGATE")
                    .try_parsing(true)
                    .separator("__"),
            )
            .build()
            .map_err(|e| format!("config build error: {e}"))?;
        let merged: AppConfig = cfg
            .try_deserialize()
            .map_err(|e| format!("config deserialize error: {e}"))?;
        merged.validate()?;
        Ok(merged)
    }
}
