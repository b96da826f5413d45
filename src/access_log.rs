//! Per-request access log.
//!
//! Every request produces one JSON line on stdout once its response body has
//! been fully sent (or dropped). Liveness probes against the status endpoint
//! are not logged.

use std::io::Write;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll, ready};
use std::time::{Duration, Instant};

use axum::{
    body::Body,
    extract::{ConnectInfo, Request, State},
    http::{HeaderMap, StatusCode, header},
    middleware::Next,
    response::Response,
};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use http_body::{Body as _, Frame, SizeHint};
use serde::Serialize;
use tracing::{error, warn};

pub const X_FORWARDED_FOR: &str = "x-forwarded-for";
pub const LIVENESS_PROBE: &str = "liveness-probe";

/// One access log record.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub host: String,
    pub remote_addr: String,
    pub method: String,
    #[serde(rename = "RequestURI")]
    pub request_uri: String,
    pub proto: String,
    pub status: u16,
    pub content_len: u64,
    pub user_agent: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub liveness_probe: String,
    /// Nanoseconds
    pub duration: u64,
}

/// Destination for serialized log lines.
pub trait AccessLogSink: Send + Sync {
    fn write_line(&self, line: &str);
}

/// Writes each line to standard output.
#[derive(Debug, Default)]
pub struct StdoutSink;

impl AccessLogSink for StdoutSink {
    fn write_line(&self, line: &str) {
        let mut out = std::io::stdout().lock();
        if let Err(err) = writeln!(out, "{}", line) {
            warn!("Failed to write access log line: {}", err);
        }
    }
}

/// Access log configuration shared by all requests.
pub struct AccessLog {
    /// Path of the status endpoint, when it is enabled
    status_path: Option<String>,
    sink: Arc<dyn AccessLogSink>,
}

impl AccessLog {
    pub fn new(status_path: Option<String>, sink: Arc<dyn AccessLogSink>) -> Self {
        Self { status_path, sink }
    }

    /// Liveness probes hitting the status endpoint are dropped; everything
    /// else is logged.
    pub fn should_log(&self, entry: &LogEntry) -> bool {
        match &self.status_path {
            Some(path) => !(entry.request_uri == *path && !entry.liveness_probe.is_empty()),
            None => true,
        }
    }

    pub fn emit(&self, entry: &LogEntry) {
        if !self.should_log(entry) {
            return;
        }
        match serde_json::to_string(entry) {
            Ok(line) => self.sink.write_line(&line),
            Err(err) => error!("Failed to serialize log entry {:?}: {}", entry, err),
        }
    }
}

/// Status and size of a response as observed while it is written.
#[derive(Debug, Default, Clone)]
pub struct ResponseStats {
    status: Option<StatusCode>,
    bytes: u64,
}

impl ResponseStats {
    /// Record an explicit status. Only the first one counts.
    pub fn record_status(&mut self, status: StatusCode) {
        if self.status.is_none() {
            self.status = Some(status);
        }
    }

    /// Record body bytes. Writing a body without a status implies 200.
    pub fn record_body(&mut self, len: usize) {
        if self.status.is_none() {
            self.status = Some(StatusCode::OK);
        }
        self.bytes += len as u64;
    }

    /// Numeric status, 0 if nothing was written.
    pub fn status(&self) -> u16 {
        self.status.map(|s| s.as_u16()).unwrap_or(0)
    }

    pub fn bytes(&self) -> u64 {
        self.bytes
    }
}

/// Request fields captured before the request is handed to the inner service.
#[derive(Debug, Clone)]
struct RequestInfo {
    host: String,
    remote_addr: String,
    method: String,
    request_uri: String,
    proto: String,
    user_agent: String,
    liveness_probe: String,
}

impl RequestInfo {
    fn capture(req: &Request) -> Self {
        let headers = req.headers();
        let host = header_str(headers, header::HOST.as_str())
            .or_else(|| req.uri().authority().map(|a| a.to_string()))
            .unwrap_or_default();
        let remote_addr = header_str(headers, X_FORWARDED_FOR)
            .filter(|v| !v.is_empty())
            .or_else(|| {
                req.extensions()
                    .get::<ConnectInfo<SocketAddr>>()
                    .map(|ConnectInfo(addr)| addr.to_string())
            })
            .unwrap_or_default();
        let request_uri = req
            .uri()
            .path_and_query()
            .map(|pq| pq.as_str().to_string())
            .unwrap_or_else(|| req.uri().path().to_string());

        Self {
            host,
            remote_addr,
            method: req.method().to_string(),
            request_uri,
            proto: format!("{:?}", req.version()),
            user_agent: header_str(headers, header::USER_AGENT.as_str()).unwrap_or_default(),
            liveness_probe: header_str(headers, LIVENESS_PROBE).unwrap_or_default(),
        }
    }

    fn into_entry(self, stats: &ResponseStats, duration: Duration) -> LogEntry {
        LogEntry {
            timestamp: Utc::now(),
            host: self.host,
            remote_addr: self.remote_addr,
            method: self.method,
            request_uri: self.request_uri,
            proto: self.proto,
            status: stats.status(),
            content_len: stats.bytes(),
            user_agent: self.user_agent,
            liveness_probe: self.liveness_probe,
            duration: u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX),
        }
    }
}

fn header_str(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_string())
}

/// A request whose log line has not been written yet.
struct PendingEntry {
    log: Arc<AccessLog>,
    info: RequestInfo,
    started: Instant,
    stats: ResponseStats,
}

impl PendingEntry {
    fn finish(self) {
        let entry = self.info.into_entry(&self.stats, self.started.elapsed());
        self.log.emit(&entry);
    }
}

/// Response body wrapper that counts bytes and writes the log line when the
/// body completes or is dropped.
pub struct CountingBody {
    inner: Body,
    pending: Option<PendingEntry>,
}

impl CountingBody {
    fn finish(&mut self) {
        if let Some(pending) = self.pending.take() {
            pending.finish();
        }
    }
}

impl http_body::Body for CountingBody {
    type Data = Bytes;
    type Error = axum::Error;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let this = self.get_mut();
        let frame = ready!(Pin::new(&mut this.inner).poll_frame(cx));

        match &frame {
            Some(Ok(frame)) => {
                if let (Some(data), Some(pending)) = (frame.data_ref(), this.pending.as_mut()) {
                    pending.stats.record_body(data.len());
                }
            }
            Some(Err(_)) | None => this.finish(),
        }

        Poll::Ready(frame)
    }

    fn is_end_stream(&self) -> bool {
        self.inner.is_end_stream()
    }

    fn size_hint(&self) -> SizeHint {
        self.inner.size_hint()
    }
}

impl Drop for CountingBody {
    fn drop(&mut self) {
        self.finish();
    }
}

/// Middleware writing one access log line per request.
pub async fn access_log(State(log): State<Arc<AccessLog>>, req: Request, next: Next) -> Response {
    let started = Instant::now();
    let info = RequestInfo::capture(&req);

    let response = next.run(req).await;

    let mut stats = ResponseStats::default();
    stats.record_status(response.status());

    let (parts, body) = response.into_parts();
    let body = CountingBody {
        inner: body,
        pending: Some(PendingEntry {
            log,
            info,
            started,
            stats,
        }),
    };
    Response::from_parts(parts, Body::new(body))
}
