//! Status endpoint: a JSON document built once at startup from selected
//! environment variables and an optional start timestamp.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{
    extract::State,
    http::header,
    response::{IntoResponse, Response},
};
use chrono::{SecondsFormat, Utc};
use tracing::error;

/// Key under which the process start time is published.
pub const START_TIMESTAMP_KEY: &str = "startTimestamp";

/// Split a comma separated list of status variable specs, trimming spaces and
/// tabs around each entry.
pub fn parse_status_vars(raw: &str) -> Vec<String> {
    if raw.trim().is_empty() {
        return Vec::new();
    }
    raw.split(',')
        .map(|spec| spec.trim_matches(|c| c == ' ' || c == '\t').to_string())
        .collect()
}

/// Map status variable specs to their values.
///
/// `VAR` publishes `VAR` under its own name, `SRC:KEY` publishes `SRC` under
/// `KEY`. Specs with more than one colon, and empty specs, are skipped.
/// Unset variables are published as empty strings.
pub fn collect_env<F>(specs: &[String], lookup: F) -> BTreeMap<String, String>
where
    F: Fn(&str) -> Option<String>,
{
    let mut vars = BTreeMap::new();
    for spec in specs {
        if spec.is_empty() {
            continue;
        }
        let parts: Vec<&str> = spec.split(':').collect();
        let (source, key) = match parts.as_slice() {
            [name] => (*name, *name),
            [source, key] => (*source, *key),
            _ => continue,
        };
        vars.insert(key.to_string(), lookup(source).unwrap_or_default());
    }
    vars
}

/// Pre-serialized status document.
#[derive(Debug, Clone)]
pub struct StatusPayload {
    body: String,
}

impl StatusPayload {
    /// Build the payload, resolving variables through `lookup`.
    pub fn build<F>(specs: &[String], include_start: bool, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut vars = collect_env(specs, lookup);
        if include_start {
            vars.insert(
                START_TIMESTAMP_KEY.to_string(),
                Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true),
            );
        }
        Self {
            body: to_json(&vars),
        }
    }

    pub fn body(&self) -> &str {
        &self.body
    }
}

fn to_json(vars: &BTreeMap<String, String>) -> String {
    match serde_json::to_string(vars) {
        Ok(body) => body,
        Err(err) => {
            error!("Failed to serialize status payload: {}", err);
            String::new()
        }
    }
}

/// GET <status path> - serve the precomputed status document
pub async fn status_handler(State(payload): State<Arc<StatusPayload>>) -> Response {
    (
        [(header::CONTENT_TYPE, "application/json")],
        payload.body().to_string(),
    )
        .into_response()
}
