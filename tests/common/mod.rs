//! Test utilities and common setup.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use axum::Router;
use axum::body::Body;
use axum::http::{Request, Response};
use tempfile::TempDir;
use tower::ServiceExt;

use tinyserve::access_log::AccessLogSink;
use tinyserve::{App, Settings, routes};

/// Access log sink keeping lines in memory.
#[derive(Default)]
pub struct MemorySink {
    lines: Mutex<Vec<String>>,
}

impl MemorySink {
    pub fn entries(&self) -> Vec<serde_json::Value> {
        self.lines
            .lock()
            .unwrap()
            .iter()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect()
    }
}

impl AccessLogSink for MemorySink {
    fn write_line(&self, line: &str) {
        self.lines.lock().unwrap().push(line.to_string());
    }
}

/// A served tree with a few files:
///
/// ```text
/// index.html
/// hello.txt
/// app/index.html
/// docs/index.html
/// docs/guide.txt
/// empty/
/// ```
pub fn site_dir() -> TempDir {
    let temp_dir = TempDir::new().unwrap();
    let root = temp_dir.path();
    std::fs::create_dir_all(root.join("app")).unwrap();
    std::fs::create_dir_all(root.join("docs")).unwrap();
    std::fs::create_dir_all(root.join("empty")).unwrap();
    std::fs::write(root.join("index.html"), "<h1>root</h1>").unwrap();
    std::fs::write(root.join("hello.txt"), "hello world").unwrap();
    std::fs::write(root.join("app/index.html"), "<h1>app</h1>").unwrap();
    std::fs::write(root.join("docs/index.html"), "<h1>docs</h1>").unwrap();
    std::fs::write(root.join("docs/guide.txt"), "read me").unwrap();
    temp_dir
}

/// Settings serving `dir` with everything else at defaults.
pub fn settings_for(dir: &TempDir) -> Settings {
    Settings {
        root: dir.path().to_path_buf(),
        ..Default::default()
    }
}

/// Build the router from settings, with a fixed environment for the status
/// payload and an in-memory access log.
pub fn test_app(settings: &Settings, env: &[(&str, &str)]) -> (Router, Arc<MemorySink>) {
    let env: HashMap<String, String> = env
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

    let sink = Arc::new(MemorySink::default());
    let app = App::with_sink(settings, sink.clone(), |name| env.get(name).cloned()).unwrap();

    (routes::create_router(app), sink)
}

/// Send a request and collect the response body.
pub async fn send(app: &Router, req: Request<Body>) -> (Response<Body>, String) {
    let response = app.clone().oneshot(req).await.unwrap();
    let (parts, body) = response.into_parts();
    let bytes = axum::body::to_bytes(body, 1024 * 1024).await.unwrap();
    let text = String::from_utf8_lossy(&bytes).to_string();
    (Response::from_parts(parts, Body::empty()), text)
}

pub fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .header("host", "localhost")
        .body(Body::empty())
        .unwrap()
}
