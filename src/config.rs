use std::path::{Path, PathBuf};

use axum::http::{HeaderName, HeaderValue};
use clap::Parser;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::auth::Credentials;
use crate::error::ConfigError;
use crate::fs::FallbackMode;
use crate::status::parse_status_vars;

pub const DEFAULT_PORT: u16 = 8043;
pub const DEFAULT_BIND: &str = "0.0.0.0";
pub const DEFAULT_ROOT: &str = "/srv/http";
pub const DEFAULT_USER: &str = "gopher";
pub const DEFAULT_PASSWORD_LENGTH: usize = 16;
pub const DEFAULT_STATUS_PATH: &str = "/status";

#[derive(Parser, Debug, Default)]
#[command(name = "tinyserve")]
#[command(about = "Minimal static file server for container images")]
#[command(version)]
pub struct Cli {
    /// The listening port
    #[arg(long, env = "TINYSERVE_PORT")]
    pub port: Option<u16>,

    /// Address to bind to
    #[arg(long, env = "TINYSERVE_BIND")]
    pub bind: Option<String>,

    /// The 'context' path on which files are served, e.g. 'doc' serves the
    /// files at http://localhost:<port>/doc/
    #[arg(long, env = "TINYSERVE_CONTEXT")]
    pub context: Option<String>,

    /// The path for the static files
    #[arg(long, env = "TINYSERVE_PATH")]
    pub path: Option<PathBuf>,

    /// Default fallback file. Either absolute for a specific asset
    /// (/index.html), or relative to recursively resolve (index.html)
    #[arg(long, env = "TINYSERVE_FALLBACK")]
    pub fallback: Option<String>,

    /// HTTP response header, specified as `HeaderName:Value`, added to all
    /// responses
    #[arg(long, env = "TINYSERVE_APPEND_HEADER")]
    pub append_header: Option<String>,

    /// Enable basic auth. The password is randomly generated unless
    /// --set-basic-auth is given
    #[arg(long, env = "TINYSERVE_ENABLE_BASIC_AUTH")]
    pub enable_basic_auth: bool,

    /// Define the basic auth credentials, as user:password
    #[arg(long, env = "TINYSERVE_SET_BASIC_AUTH")]
    pub set_basic_auth: Option<String>,

    /// Username used with a generated password
    #[arg(long, env = "TINYSERVE_DEFAULT_USER_BASIC_AUTH")]
    pub default_user_basic_auth: Option<String>,

    /// Size of the generated password
    #[arg(long, env = "TINYSERVE_PASSWORD_LENGTH")]
    pub password_length: Option<usize>,

    /// Environment variables exposed on the status path:
    /// <ENV_VAR>[:<STATUS_KEY>],...
    #[arg(long, env = "TINYSERVE_STATUS_VARS")]
    pub status_vars: Option<String>,

    /// Path serving the status JSON
    #[arg(long, env = "TINYSERVE_STATUS_PATH")]
    pub status_path: Option<String>,

    /// Add the start timestamp to the status
    #[arg(long, env = "TINYSERVE_STATUS_START_TS")]
    pub status_start_ts: bool,

    /// Enable verbose logging
    #[arg(short, long, env = "TINYSERVE_VERBOSE")]
    pub verbose: bool,

    /// Config file path (optional)
    #[arg(short, long, env = "TINYSERVE_CONFIG")]
    pub config: Option<PathBuf>,
}

/// Settings read from a TOML file. Every key is optional.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub port: Option<u16>,
    pub bind: Option<String>,
    pub context: Option<String>,
    pub path: Option<PathBuf>,
    pub fallback: Option<String>,
    pub append_header: Option<String>,
    pub enable_basic_auth: bool,
    pub set_basic_auth: Option<String>,
    pub default_user_basic_auth: Option<String>,
    pub password_length: Option<usize>,
    pub status_vars: Vec<String>,
    pub status_path: Option<String>,
    pub status_start_ts: bool,
}

impl FileConfig {
    /// Load config from a TOML file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }
}

/// Effective server configuration, fixed at startup.
#[derive(Debug, Clone)]
pub struct Settings {
    pub port: u16,
    pub bind: String,
    /// Mount point without surrounding slashes; empty serves from `/`
    pub context: String,
    pub root: PathBuf,
    pub fallback: Option<FallbackMode>,
    pub append_header: Option<String>,
    pub enable_basic_auth: bool,
    pub basic_auth: Option<String>,
    pub default_user: String,
    pub password_length: usize,
    pub status_vars: Vec<String>,
    pub status_path: String,
    pub status_start_ts: bool,
    pub verbose: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            bind: DEFAULT_BIND.to_string(),
            context: String::new(),
            root: PathBuf::from(DEFAULT_ROOT),
            fallback: None,
            append_header: None,
            enable_basic_auth: false,
            basic_auth: None,
            default_user: DEFAULT_USER.to_string(),
            password_length: DEFAULT_PASSWORD_LENGTH,
            status_vars: Vec::new(),
            status_path: DEFAULT_STATUS_PATH.to_string(),
            status_start_ts: false,
            verbose: false,
        }
    }
}

impl Settings {
    /// Merge command line values over file values over defaults.
    pub fn from_sources(cli: Cli, file: FileConfig) -> Result<Self, ConfigError> {
        let defaults = Settings::default();

        let context = normalize_context(cli.context.or(file.context).unwrap_or_default())?;

        let status_vars = match cli.status_vars {
            Some(raw) => parse_status_vars(&raw),
            None => file.status_vars,
        };

        let status_path = ensure_leading_slash(
            cli.status_path
                .or(file.status_path)
                .unwrap_or(defaults.status_path),
        );
        validate_status_path(&status_path)?;

        Ok(Self {
            port: cli.port.or(file.port).unwrap_or(defaults.port),
            bind: cli.bind.or(file.bind).unwrap_or(defaults.bind),
            context,
            root: cli.path.or(file.path).unwrap_or(defaults.root),
            fallback: cli
                .fallback
                .or(file.fallback)
                .and_then(|value| FallbackMode::parse(&value)),
            append_header: cli.append_header.or(file.append_header),
            enable_basic_auth: cli.enable_basic_auth || file.enable_basic_auth,
            basic_auth: cli
                .set_basic_auth
                .or(file.set_basic_auth)
                .filter(|v| !v.is_empty()),
            default_user: cli
                .default_user_basic_auth
                .or(file.default_user_basic_auth)
                .unwrap_or(defaults.default_user),
            password_length: cli
                .password_length
                .or(file.password_length)
                .unwrap_or(defaults.password_length),
            status_vars,
            status_path,
            status_start_ts: cli.status_start_ts || file.status_start_ts,
            verbose: cli.verbose,
        })
    }

    /// URL prefix the static files are mounted under: `/` or `/<context>/`.
    pub fn path_prefix(&self) -> String {
        if self.context.is_empty() {
            "/".to_string()
        } else {
            format!("/{}/", self.context)
        }
    }

    /// The status endpoint exists only when it has something to report.
    pub fn status_enabled(&self) -> bool {
        !self.status_vars.is_empty() || self.status_start_ts
    }

    /// Check values that cannot be used as they are.
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_status_path(&self.status_path)
    }

    /// Setting explicit credentials implies enabling basic auth.
    pub fn basic_auth_enabled(&self) -> bool {
        self.enable_basic_auth || self.basic_auth.is_some()
    }

    /// Credentials to enforce, generating a password when none was given.
    /// Generated credentials are logged since there is no other way to
    /// retrieve them.
    pub fn resolve_credentials(&self) -> Option<Credentials> {
        if !self.basic_auth_enabled() {
            return None;
        }
        match &self.basic_auth {
            Some(value) => Some(Credentials::parse(value)),
            None => {
                let credentials = Credentials::generate(&self.default_user, self.password_length);
                warn!(
                    "User generated for basic auth. User: '{}', password: '{}'",
                    credentials.username(),
                    credentials.password()
                );
                Some(credentials)
            }
        }
    }

    /// The extra response header, if configured correctly.
    pub fn extra_header(&self) -> Option<(HeaderName, HeaderValue)> {
        let raw = self.append_header.as_deref()?;
        let parsed = parse_header_spec(raw);
        if parsed.is_none() {
            warn!("appendHeader misconfigured; ignoring.");
        }
        parsed
    }
}

/// Parse `Name:Value`. Both parts must be non-empty and valid in HTTP.
pub fn parse_header_spec(raw: &str) -> Option<(HeaderName, HeaderValue)> {
    let (name, value) = raw.split_once(':')?;
    let (name, value) = (name.trim(), value.trim());
    if name.is_empty() || value.is_empty() {
        return None;
    }
    let name = HeaderName::from_bytes(name.as_bytes()).ok()?;
    let value = HeaderValue::from_str(value).ok()?;
    Some((name, value))
}

fn normalize_context(raw: String) -> Result<String, ConfigError> {
    let trimmed = raw.trim().trim_matches('/');
    if trimmed.contains("//")
        || trimmed
            .split('/')
            .any(|segment| segment == "." || segment == "..")
    {
        return Err(ConfigError::InvalidContext(raw));
    }
    Ok(trimmed.to_string())
}

/// The status path is registered as a literal route. Anything the router
/// would read as a capture or wildcard is refused.
fn validate_status_path(path: &str) -> Result<(), ConfigError> {
    let pattern = path.contains(['{', '}'])
        || path
            .split('/')
            .any(|segment| segment.starts_with(':') || segment.starts_with('*'));
    if pattern {
        return Err(ConfigError::InvalidStatusPath(path.to_string()));
    }
    Ok(())
}

fn ensure_leading_slash(path: String) -> String {
    if path.starts_with('/') {
        path
    } else {
        format!("/{}", path)
    }
}
