//! Minimal static file server for container images.
//!
//! Serves a directory tree, optionally under a URL prefix, with fallback
//! resolution for single page applications, basic authentication, an extra
//! response header, JSON access logs and a status endpoint.

pub mod access_log;
pub mod auth;
pub mod config;
pub mod error;
pub mod fs;
pub mod handlers;
pub mod routes;
pub mod status;

use std::sync::Arc;

use axum::http::{HeaderName, HeaderValue};

pub use access_log::AccessLog;
pub use auth::Credentials;
pub use config::Settings;
pub use error::{ConfigError, FsError};
pub use handlers::StaticSite;
pub use status::StatusPayload;

use crate::access_log::{AccessLogSink, StdoutSink};
use crate::fs::{Dir, Fallback};

/// Status endpoint registration.
#[derive(Debug, Clone)]
pub struct StatusRoute {
    pub path: String,
    pub payload: Arc<StatusPayload>,
}

/// Everything the router needs, built once at startup.
#[derive(Clone)]
pub struct App {
    pub site: Arc<StaticSite>,
    /// Present when basic auth is enabled
    pub credentials: Option<Arc<Credentials>>,
    pub extra_header: Option<(HeaderName, HeaderValue)>,
    pub status: Option<StatusRoute>,
    pub access_log: Arc<AccessLog>,
}

impl App {
    /// Build the application from settings, reading the process environment
    /// for the status payload and logging requests to stdout.
    pub fn from_settings(settings: &Settings) -> Result<Self, ConfigError> {
        Self::with_sink(settings, Arc::new(StdoutSink), |name| {
            std::env::var(name).ok()
        })
    }

    /// Build the application with an explicit access log destination and
    /// environment lookup.
    pub fn with_sink<F>(
        settings: &Settings,
        sink: Arc<dyn AccessLogSink>,
        lookup: F,
    ) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        settings.validate()?;

        let status = settings.status_enabled().then(|| StatusRoute {
            path: settings.status_path.clone(),
            payload: Arc::new(StatusPayload::build(
                &settings.status_vars,
                settings.status_start_ts,
                lookup,
            )),
        });

        let access_log = AccessLog::new(status.as_ref().map(|s| s.path.clone()), sink);

        Ok(Self {
            site: Arc::new(site_from_settings(settings)),
            credentials: settings.resolve_credentials().map(Arc::new),
            extra_header: settings.extra_header(),
            status,
            access_log: Arc::new(access_log),
        })
    }
}

/// The static tree, wrapped in a fallback resolver when one is configured.
pub fn site_from_settings(settings: &Settings) -> StaticSite {
    let dir = Dir::new(&settings.root);
    match &settings.fallback {
        Some(mode) => StaticSite::new(settings.path_prefix(), Fallback::new(dir, mode.clone())),
        None => StaticSite::new(settings.path_prefix(), dir),
    }
}
