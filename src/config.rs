//! Configuration loading and types for blobgate.
//!
//! Configuration is read from a YAML file and deserialized into the
//! [`Config`] struct.  Each subsection governs a different part of the
//! system: networking, session checking, the backing store, logging and
//! observability.  Every field has a default, so an empty file is valid.

use serde::Deserialize;
use std::path::Path;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// HTTP server settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Session gate settings.
    #[serde(default)]
    pub auth: AuthConfig,

    /// Object storage backend settings.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Observability settings.
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

/// HTTP listener configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Bind host address.
    #[serde(default = "default_host")]
    pub host: String,

    /// Bind port.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Graceful shutdown timeout in seconds.
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout: u64,

    /// Longest wait for the next chunk of an upstream stream, in seconds.
    #[serde(default = "default_stream_idle_timeout")]
    pub stream_idle_timeout: u64,

    /// Longest wait for a metadata, open or list call, in seconds.
    #[serde(default = "default_store_timeout")]
    pub store_timeout: u64,

    /// Allow cross-origin requests from any origin.
    #[serde(default)]
    pub cors: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            shutdown_timeout: default_shutdown_timeout(),
            stream_idle_timeout: default_stream_idle_timeout(),
            store_timeout: default_store_timeout(),
            cors: false,
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: text or json.
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

/// Observability settings.
#[derive(Debug, Clone, Deserialize)]
pub struct ObservabilityConfig {
    /// Enable Prometheus metrics collection and the `/metrics` endpoint.
    #[serde(default = "default_true")]
    pub metrics: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self { metrics: true }
    }
}

/// Session gate settings.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    /// HMAC key used to sign and verify session cookies.
    #[serde(default = "default_session_secret")]
    pub session_secret: String,

    /// Name of the session cookie.
    #[serde(default = "default_cookie_name")]
    pub cookie_name: String,

    /// Lifetime of a freshly minted session, in seconds.
    #[serde(default = "default_session_ttl")]
    pub session_ttl: u64,

    /// Where to redirect requests without a valid session.  When unset,
    /// they receive 401.
    #[serde(default)]
    pub login_url: Option<String>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            session_secret: default_session_secret(),
            cookie_name: default_cookie_name(),
            session_ttl: default_session_ttl(),
            login_url: None,
        }
    }
}

/// Object storage backend configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Backend type: `local`, `memory`, `aws`.
    #[serde(default = "default_storage_backend")]
    pub backend: String,

    /// Local storage configuration.
    #[serde(default)]
    pub local: LocalStorageConfig,

    /// AWS S3 configuration.
    #[serde(default)]
    pub aws: Option<AwsStorageConfig>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: default_storage_backend(),
            local: LocalStorageConfig::default(),
            aws: None,
        }
    }
}

/// Local filesystem storage configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LocalStorageConfig {
    /// Root directory for stored objects.
    #[serde(default = "default_storage_root")]
    pub root_dir: String,
}

impl Default for LocalStorageConfig {
    fn default() -> Self {
        Self {
            root_dir: default_storage_root(),
        }
    }
}

/// AWS S3 configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct AwsStorageConfig {
    /// S3 bucket name.
    pub bucket: String,
    /// AWS region.
    #[serde(default = "default_region")]
    pub region: String,
    /// Key prefix in the bucket.
    #[serde(default)]
    pub prefix: String,
    /// Custom S3-compatible endpoint (e.g. MinIO, LocalStack).
    #[serde(default)]
    pub endpoint_url: String,
    /// Force path-style URL addressing.
    #[serde(default)]
    pub use_path_style: bool,
    /// Explicit AWS access key (falls back to env/credential chain).
    #[serde(default)]
    pub access_key_id: String,
    /// Explicit AWS secret key (falls back to env/credential chain).
    #[serde(default)]
    pub secret_access_key: String,
}

// -- Defaults ----------------------------------------------------------------

fn default_true() -> bool {
    true
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    9080
}

fn default_region() -> String {
    "us-east-1".to_string()
}

/// Built-in session secret; the server warns when it is still in use.
pub const DEFAULT_SESSION_SECRET: &str = "blobgate-secret";

fn default_session_secret() -> String {
    DEFAULT_SESSION_SECRET.to_string()
}

fn default_cookie_name() -> String {
    "blobgate_session".to_string()
}

fn default_session_ttl() -> u64 {
    86_400
}

fn default_storage_backend() -> String {
    "local".to_string()
}

fn default_storage_root() -> String {
    "./data/objects".to_string()
}

fn default_shutdown_timeout() -> u64 {
    30
}

fn default_stream_idle_timeout() -> u64 {
    30
}

fn default_store_timeout() -> u64 {
    10
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

// -- Loader ------------------------------------------------------------------

/// Load and parse configuration from a YAML file at `path`.
pub fn load_config<P: AsRef<Path>>(path: P) -> anyhow::Result<Config> {
    let contents = std::fs::read_to_string(path.as_ref())?;
    parse_config(&contents)
}

/// Parse configuration from YAML text.  Blank input yields the defaults.
pub fn parse_config(contents: &str) -> anyhow::Result<Config> {
    if contents.trim().is_empty() {
        return Ok(Config::default());
    }
    let config: Config = serde_yaml::from_str(contents)?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = parse_config("").unwrap();
        assert_eq!(config.server.port, 9080);
        assert_eq!(config.server.stream_idle_timeout, 30);
        assert_eq!(config.auth.cookie_name, "blobgate_session");
        assert!(config.auth.login_url.is_none());
        assert_eq!(config.storage.backend, "local");
        assert_eq!(config.storage.local.root_dir, "./data/objects");
        assert!(config.observability.metrics);
    }

    #[test]
    fn test_aws_section() {
        let yaml = r#"
server:
  port: 8088
  cors: true
auth:
  session_secret: "s3cr3t"
  login_url: "/login"
storage:
  backend: aws
  aws:
    bucket: media
    prefix: "library/"
    endpoint_url: "http://localhost:9000"
    use_path_style: true
logging:
  format: json
"#;
        let config = parse_config(yaml).unwrap();
        assert_eq!(config.server.port, 8088);
        assert!(config.server.cors);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.auth.session_secret, "s3cr3t");
        assert_eq!(config.auth.login_url.as_deref(), Some("/login"));
        assert_eq!(config.storage.backend, "aws");
        let aws = config.storage.aws.unwrap();
        assert_eq!(aws.bucket, "media");
        assert_eq!(aws.region, "us-east-1");
        assert_eq!(aws.prefix, "library/");
        assert!(aws.use_path_style);
        assert!(aws.access_key_id.is_empty());
        assert_eq!(config.logging.format, "json");
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_aws_section_requires_bucket() {
        let yaml = "storage:\n  aws:\n    region: eu-west-1\n";
        assert!(parse_config(yaml).is_err());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blobgate.yaml");
        std::fs::write(&path, "storage:\n  backend: memory\n").unwrap();
        let config = load_config(&path).unwrap();
        assert_eq!(config.storage.backend, "memory");
    }
}
