use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use std::{env, fmt, path::PathBuf, time::Duration};
use thiserror::Error;

use crate::{
    backend::s3::S3Settings,
    services::{
        gateway::{
            DEFAULT_BACKEND_TIMEOUT, DEFAULT_RETRIEVE_URL_EXPIRY, DEFAULT_UPLOAD_URL_EXPIRY,
            GatewayPolicy, MAX_URL_EXPIRY,
        },
        naming::KeyPolicy,
    },
};

const BUCKET_NAME_MIN_LEN: usize = 3;
const BUCKET_NAME_MAX_LEN: usize = 63;
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 10 << 20;

/// Which object store implementation backs the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum BackendKind {
    /// S3-compatible endpoint (MinIO, AWS S3, ...).
    S3,
    /// Process-local store; contents are lost on exit.
    Memory,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} is required")]
    Missing(&'static str),
    #[error("{key} has invalid value `{value}`: {reason}")]
    InvalidValue {
        key: &'static str,
        value: String,
        reason: String,
    },
    #[error("bucket `{name}` invalid: {reason}")]
    InvalidBucketName { name: String, reason: String },
}

/// Centralized application configuration.
/// Combines environment variables and CLI arguments.
#[derive(Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub backend: BackendKind,
    pub endpoint: String,
    pub access_key: String,
    pub secret_key: String,
    pub use_ssl: bool,
    pub bucket: String,
    pub region: String,
    pub max_upload_bytes: usize,
    pub upload_url_expiry: Duration,
    pub retrieve_url_expiry: Duration,
    pub key_policy: KeyPolicy,
    pub backend_timeout: Duration,
    pub spool_dir: Option<PathBuf>,
}

/// Command-line + environment configuration.
#[derive(Parser, Debug, Default)]
#[command(author, version, about = "HTTP gateway for an S3-compatible object store")]
pub struct Args {
    /// Host to bind to (overrides HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to (overrides PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Object store implementation (overrides GATEWAY_BACKEND)
    #[arg(long, value_enum)]
    pub backend: Option<BackendKind>,

    /// Object store endpoint, host:port or URL (overrides MINIO_ENDPOINT)
    #[arg(long)]
    pub endpoint: Option<String>,

    /// Use TLS when the endpoint has no scheme (overrides MINIO_USE_SSL)
    #[arg(long)]
    pub use_ssl: Option<bool>,

    /// Bucket holding all objects (overrides MINIO_BUCKET)
    #[arg(long)]
    pub bucket: Option<String>,

    /// Region the bucket is created in (overrides MINIO_LOCATION)
    #[arg(long)]
    pub region: Option<String>,

    /// Upload key policy: timestamp, uuid or content-hash (overrides GATEWAY_KEY_POLICY)
    #[arg(long)]
    pub key_policy: Option<String>,
}

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig.
    pub fn from_env_and_args() -> Result<Self> {
        let args = Args::parse();
        Self::from_sources(args, |key| env::var(key).ok()).context("invalid configuration")
    }

    /// Merge CLI arguments over values from `lookup`. Empty values count as
    /// unset and fall back to the default.
    pub fn from_sources(
        args: Args,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let var = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let port = match args.port {
            Some(port) => port,
            None => parse_number("PORT", var("PORT"), 8080u16)?,
        };
        let backend = match args.backend {
            Some(kind) => kind,
            None => match var("GATEWAY_BACKEND") {
                Some(value) => BackendKind::from_str(&value, true).map_err(|reason| {
                    ConfigError::InvalidValue {
                        key: "GATEWAY_BACKEND",
                        value,
                        reason,
                    }
                })?,
                None => BackendKind::S3,
            },
        };
        let use_ssl = args.use_ssl.unwrap_or_else(|| match var("MINIO_USE_SSL") {
            Some(value) => parse_flag(&value).unwrap_or_else(|| {
                tracing::warn!("MINIO_USE_SSL value `{}` is not a boolean, using false", value);
                false
            }),
            None => false,
        });
        let key_policy = match args.key_policy.or_else(|| var("GATEWAY_KEY_POLICY")) {
            Some(value) => value.parse::<KeyPolicy>().map_err(|reason| ConfigError::InvalidValue {
                key: "GATEWAY_KEY_POLICY",
                value,
                reason,
            })?,
            None => KeyPolicy::default(),
        };

        let cfg = Self {
            host: args.host.or_else(|| var("HOST")).unwrap_or_else(|| "0.0.0.0".into()),
            port,
            backend,
            endpoint: args
                .endpoint
                .or_else(|| var("MINIO_ENDPOINT"))
                .unwrap_or_else(|| "localhost:9000".into()),
            access_key: var("MINIO_ACCESS_KEY").unwrap_or_default(),
            secret_key: var("MINIO_SECRET_KEY").unwrap_or_default(),
            use_ssl,
            bucket: args
                .bucket
                .or_else(|| var("MINIO_BUCKET"))
                .unwrap_or_else(|| "mybucket".into()),
            region: args
                .region
                .or_else(|| var("MINIO_LOCATION"))
                .unwrap_or_else(|| "us-east-1".into()),
            max_upload_bytes: parse_number(
                "GATEWAY_MAX_UPLOAD_BYTES",
                var("GATEWAY_MAX_UPLOAD_BYTES"),
                DEFAULT_MAX_UPLOAD_BYTES,
            )?,
            upload_url_expiry: parse_secs(
                "GATEWAY_UPLOAD_URL_EXPIRY_SECS",
                var("GATEWAY_UPLOAD_URL_EXPIRY_SECS"),
                DEFAULT_UPLOAD_URL_EXPIRY,
            )?,
            retrieve_url_expiry: parse_secs(
                "GATEWAY_RETRIEVE_URL_EXPIRY_SECS",
                var("GATEWAY_RETRIEVE_URL_EXPIRY_SECS"),
                DEFAULT_RETRIEVE_URL_EXPIRY,
            )?,
            key_policy,
            backend_timeout: parse_secs(
                "GATEWAY_BACKEND_TIMEOUT_SECS",
                var("GATEWAY_BACKEND_TIMEOUT_SECS"),
                DEFAULT_BACKEND_TIMEOUT,
            )?,
            spool_dir: var("GATEWAY_SPOOL_DIR").map(PathBuf::from),
        };

        cfg.validate()?;
        Ok(cfg)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.endpoint.trim().is_empty() {
            return Err(ConfigError::Missing("MINIO_ENDPOINT"));
        }
        if self.backend == BackendKind::S3 {
            if self.access_key.is_empty() {
                return Err(ConfigError::Missing("MINIO_ACCESS_KEY"));
            }
            if self.secret_key.is_empty() {
                return Err(ConfigError::Missing("MINIO_SECRET_KEY"));
            }
        }
        if self.bucket.is_empty() {
            return Err(ConfigError::Missing("MINIO_BUCKET"));
        }
        validate_bucket_name(&self.bucket)?;
        for (key, expiry) in [
            ("GATEWAY_UPLOAD_URL_EXPIRY_SECS", self.upload_url_expiry),
            ("GATEWAY_RETRIEVE_URL_EXPIRY_SECS", self.retrieve_url_expiry),
        ] {
            if expiry > MAX_URL_EXPIRY {
                return Err(ConfigError::InvalidValue {
                    key,
                    value: expiry.as_secs().to_string(),
                    reason: format!("must not exceed {} seconds", MAX_URL_EXPIRY.as_secs()),
                });
            }
        }
        if self.max_upload_bytes == 0 {
            return Err(ConfigError::InvalidValue {
                key: "GATEWAY_MAX_UPLOAD_BYTES",
                value: "0".into(),
                reason: "must be positive".into(),
            });
        }
        Ok(())
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Endpoint as a URL; a bare `host:port` gets its scheme from `use_ssl`.
    pub fn endpoint_url(&self) -> String {
        if self.endpoint.contains("://") {
            self.endpoint.clone()
        } else {
            let scheme = if self.use_ssl { "https" } else { "http" };
            format!("{}://{}", scheme, self.endpoint)
        }
    }

    pub fn s3_settings(&self) -> S3Settings {
        S3Settings {
            endpoint_url: self.endpoint_url(),
            region: self.region.clone(),
            access_key: self.access_key.clone(),
            secret_key: self.secret_key.clone(),
        }
    }

    pub fn gateway_policy(&self) -> GatewayPolicy {
        GatewayPolicy {
            upload_url_expiry: self.upload_url_expiry,
            retrieve_url_expiry: self.retrieve_url_expiry,
            key_policy: self.key_policy,
            backend_timeout: self.backend_timeout,
            spool_dir: self.spool_dir.clone(),
        }
    }
}

impl fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("backend", &self.backend)
            .field("endpoint", &self.endpoint_url())
            .field("access_key", &self.access_key)
            .field("secret_key", &"<redacted>")
            .field("bucket", &self.bucket)
            .field("region", &self.region)
            .field("max_upload_bytes", &self.max_upload_bytes)
            .field("upload_url_expiry", &self.upload_url_expiry)
            .field("retrieve_url_expiry", &self.retrieve_url_expiry)
            .field("key_policy", &self.key_policy)
            .field("backend_timeout", &self.backend_timeout)
            .field("spool_dir", &self.spool_dir)
            .finish()
    }
}

/// Lenient boolean: `1/t/true/yes/on` and `0/f/false/no/off`, any case.
pub fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "t" | "true" | "yes" | "on" => Some(true),
        "0" | "f" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn parse_number<T>(key: &'static str, raw: Option<String>, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: fmt::Display,
{
    match raw {
        None => Ok(default),
        Some(value) => value.trim().parse::<T>().map_err(|err| ConfigError::InvalidValue {
            key,
            reason: err.to_string(),
            value,
        }),
    }
}

fn parse_secs(
    key: &'static str,
    raw: Option<String>,
    default: Duration,
) -> Result<Duration, ConfigError> {
    let secs = parse_number(key, raw, default.as_secs())?;
    if secs == 0 {
        return Err(ConfigError::InvalidValue {
            key,
            value: "0".into(),
            reason: "must be a positive number of seconds".into(),
        });
    }
    Ok(Duration::from_secs(secs))
}

/// Validate bucket name format.
///
/// Enforces S3-like naming rules:
/// - 3–63 characters
/// - lowercase letters, digits, dots, hyphens only
/// - cannot start/end with dot or hyphen
/// - cannot contain consecutive dots or dot-hyphen patterns
/// - cannot look like an IPv4 address
pub fn validate_bucket_name(name: &str) -> Result<(), ConfigError> {
    let invalid = |reason: &str| ConfigError::InvalidBucketName {
        name: name.to_string(),
        reason: reason.to_string(),
    };

    let len = name.len();
    if !(BUCKET_NAME_MIN_LEN..=BUCKET_NAME_MAX_LEN).contains(&len) {
        return Err(invalid("must be between 3 and 63 characters"));
    }
    if !name
        .chars()
        .all(|c| matches!(c, 'a'..='z' | '0'..='9' | '.' | '-'))
    {
        return Err(invalid(
            "allowed characters are lowercase letters, digits, dots, and hyphens",
        ));
    }
    if name.starts_with(['.', '-']) || name.ends_with(['.', '-']) {
        return Err(invalid("must start and end with a lowercase letter or digit"));
    }
    if name.contains("..") || name.contains("-.") || name.contains(".-") {
        return Err(invalid(
            "cannot contain consecutive dots or dot-hyphen combinations",
        ));
    }
    if is_ipv4_like(name) {
        return Err(invalid("must not be formatted like an IP address"));
    }
    Ok(())
}

/// Check if a string matches IPv4-like dotted decimal form.
fn is_ipv4_like(name: &str) -> bool {
    let parts: Vec<&str> = name.split('.').collect();
    parts.len() == 4
        && parts.iter().all(|segment| {
            !segment.is_empty()
                && segment.len() <= 3
                && segment.chars().all(|c| c.is_ascii_digit())
                && segment.parse::<u8>().is_ok()
        })
}
