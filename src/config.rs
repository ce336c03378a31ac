use std::env;
use std::fmt::Display;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::str::FromStr;
use std::time::Duration;

use reqwest::Url;
use tracing::warn;

/// Complete application configuration, loaded from environment variables or default values.
#[derive(Clone, Debug)]
pub struct AppConfig {
    pub api: ApiConfig,
    pub backend: BackendConfig,
    pub ingest: IngestConfig,
}

impl AppConfig {
    /// Creates a configuration from the currently available environment variables.
    pub fn from_env() -> Self {
        Self {
            api: ApiConfig::from_env(),
            backend: BackendConfig::from_env(),
            ingest: IngestConfig::from_env(),
        }
    }
}

/// Configuration for the console's own HTTP server.
#[derive(Clone, Debug)]
pub struct ApiConfig {
    bind_ip: IpAddr,
    display_host: String,
    port: u16,
}

impl ApiConfig {
    const HOST_VAR: &'static str = "STOWAGE_API_HOST";
    const PORT_VAR: &'static str = "STOWAGE_API_PORT";
    const DEFAULT_IP: IpAddr = IpAddr::V4(Ipv4Addr::UNSPECIFIED);
    const DEFAULT_HOST: &'static str = "0.0.0.0";
    const DEFAULT_PORT: u16 = 8080;

    fn from_env() -> Self {
        let (bind_ip, display_host) = match env_string(Self::HOST_VAR) {
            Some(raw) => match raw.parse::<IpAddr>() {
                Ok(ip) => (ip, raw),
                Err(err) => {
                    warn!(
                        "⚠️ Could not parse {} ('{}'): {}. Using {}.",
                        Self::HOST_VAR,
                        raw,
                        err,
                        Self::DEFAULT_HOST
                    );
                    (Self::DEFAULT_IP, Self::DEFAULT_HOST.to_string())
                }
            },
            None => (Self::DEFAULT_IP, Self::DEFAULT_HOST.to_string()),
        };

        let port = load_with_warning(
            Self::PORT_VAR,
            Self::DEFAULT_PORT,
            |value| *value != 0,
            "must not be 0",
        );

        Self {
            bind_ip,
            display_host,
            port,
        }
    }

    /// Socket address to bind the server to.
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_ip, self.port)
    }

    /// Visible hostname for logging and hints.
    pub fn display_host(&self) -> &str {
        &self.display_host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Indicates whether binding to all interfaces.
    pub fn binds_to_all_interfaces(&self) -> bool {
        match self.bind_ip {
            IpAddr::V4(addr) => addr == Ipv4Addr::UNSPECIFIED,
            IpAddr::V6(addr) => addr == Ipv6Addr::UNSPECIFIED,
        }
    }
}

/// Where and how the remote stowage backend is reached.
#[derive(Clone, Debug)]
pub struct BackendConfig {
    base_url: String,
    timeout: Duration,
}

impl BackendConfig {
    const URL_VAR: &'static str = "STOWAGE_BACKEND_URL";
    const TIMEOUT_VAR: &'static str = "STOWAGE_BACKEND_TIMEOUT_SECS";
    pub const DEFAULT_URL: &'static str = "http://127.0.0.1:8000/api";
    pub const DEFAULT_TIMEOUT_SECS: u64 = 15;

    fn from_env() -> Self {
        let base_url = match env_string(Self::URL_VAR) {
            Some(raw) => match validate_base_url(&raw) {
                Ok(url) => url,
                Err(reason) => {
                    warn!(
                        "⚠️ {} contains invalid value '{}': {}. Using {}.",
                        Self::URL_VAR,
                        raw,
                        reason,
                        Self::DEFAULT_URL
                    );
                    Self::DEFAULT_URL.to_string()
                }
            },
            None => Self::DEFAULT_URL.to_string(),
        };

        let timeout_secs = load_with_warning(
            Self::TIMEOUT_VAR,
            Self::DEFAULT_TIMEOUT_SECS,
            |value| *value > 0,
            "must be greater than 0",
        );

        Self {
            base_url,
            timeout: Duration::from_secs(timeout_secs),
        }
    }

    /// Builds a configuration directly, e.g. to target a local mock backend.
    pub fn new(base_url: impl AsRef<str>, timeout: Duration) -> Self {
        Self {
            base_url: base_url.as_ref().trim_end_matches('/').to_string(),
            timeout,
        }
    }

    /// Base URL without a trailing slash.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

/// Limits applied to uploaded CSV files.
#[derive(Clone, Copy, Debug)]
pub struct IngestConfig {
    preview_rows: usize,
    max_upload_bytes: usize,
}

impl IngestConfig {
    const PREVIEW_VAR: &'static str = "STOWAGE_PREVIEW_ROWS";
    const MAX_UPLOAD_VAR: &'static str = "STOWAGE_MAX_UPLOAD_BYTES";
    pub const DEFAULT_PREVIEW_ROWS: usize = 5;
    pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 5 * 1024 * 1024;

    fn from_env() -> Self {
        let preview_rows = load_with_warning(
            Self::PREVIEW_VAR,
            Self::DEFAULT_PREVIEW_ROWS,
            |value| *value > 0,
            "must be greater than 0",
        );
        let max_upload_bytes = load_with_warning(
            Self::MAX_UPLOAD_VAR,
            Self::DEFAULT_MAX_UPLOAD_BYTES,
            |value| *value > 0,
            "must be greater than 0",
        );

        Self::builder()
            .preview_rows(preview_rows)
            .max_upload_bytes(max_upload_bytes)
            .build()
    }

    pub fn builder() -> IngestConfigBuilder {
        IngestConfigBuilder::default()
    }

    /// Number of raw rows echoed back after an upload.
    pub fn preview_rows(&self) -> usize {
        self.preview_rows
    }

    pub fn max_upload_bytes(&self) -> usize {
        self.max_upload_bytes
    }
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// Builder for `IngestConfig`.
#[derive(Clone, Copy, Debug)]
pub struct IngestConfigBuilder {
    preview_rows: usize,
    max_upload_bytes: usize,
}

impl Default for IngestConfigBuilder {
    fn default() -> Self {
        Self {
            preview_rows: IngestConfig::DEFAULT_PREVIEW_ROWS,
            max_upload_bytes: IngestConfig::DEFAULT_MAX_UPLOAD_BYTES,
        }
    }
}

impl IngestConfigBuilder {
    pub fn preview_rows(mut self, rows: usize) -> Self {
        self.preview_rows = rows;
        self
    }

    pub fn max_upload_bytes(mut self, bytes: usize) -> Self {
        self.max_upload_bytes = bytes;
        self
    }

    pub fn build(self) -> IngestConfig {
        IngestConfig {
            preview_rows: self.preview_rows,
            max_upload_bytes: self.max_upload_bytes,
        }
    }
}

fn validate_base_url(raw: &str) -> Result<String, String> {
    let url = Url::parse(raw).map_err(|err| err.to_string())?;
    match url.scheme() {
        "http" | "https" => Ok(raw.trim_end_matches('/').to_string()),
        other => Err(format!("unsupported scheme '{other}'")),
    }
}

fn env_string(name: &str) -> Option<String> {
    match env::var(name) {
        Ok(value) => {
            let trimmed = value.trim();
            if trimmed.is_empty() {
                None
            } else {
                Some(trimmed.to_owned())
            }
        }
        Err(env::VarError::NotPresent) => None,
        Err(err) => {
            warn!("⚠️ Access to {} failed: {}. Using default value.", name, err);
            None
        }
    }
}

fn parse_with_warning<T>(
    var_name: &str,
    raw: &str,
    default: T,
    validator: impl Fn(&T) -> bool,
    invalid_hint: &str,
) -> T
where
    T: FromStr + Display + Copy,
    T::Err: Display,
{
    match raw.parse::<T>() {
        Ok(value) if validator(&value) => value,
        Ok(_) => {
            warn!(
                "⚠️ {} contains invalid value '{}': {}. Using {}.",
                var_name, raw, invalid_hint, default
            );
            default
        }
        Err(err) => {
            warn!(
                "⚠️ Could not parse {} ('{}'): {}. Using {}.",
                var_name, raw, err, default
            );
            default
        }
    }
}

fn load_with_warning<T>(
    var_name: &str,
    default: T,
    validator: impl Fn(&T) -> bool,
    invalid_hint: &str,
) -> T
where
    T: FromStr + Display + Copy,
    T::Err: Display,
{
    match env_string(var_name) {
        Some(raw) => parse_with_warning(var_name, &raw, default, validator, invalid_hint),
        None => default,
    }
}
