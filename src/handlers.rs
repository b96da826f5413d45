use std::convert::Infallible;
use std::path::Path;
use std::sync::Arc;

use axum::{
    body::Body,
    extract::{Request, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use tower::ServiceExt;
use tower_http::services::ServeFile;
use tracing::debug;

use crate::error::FsError;
use crate::fs::{Asset, FileSystem};

/// Name of the file served for a directory request.
pub const INDEX_FILE: &str = "index.html";

/// The tree of static files and the URL prefix it is mounted under.
pub struct StaticSite {
    /// `/` or `/<context>/`
    prefix: String,
    fs: Box<dyn FileSystem>,
}

impl StaticSite {
    pub fn new(prefix: impl Into<String>, fs: impl FileSystem + 'static) -> Self {
        Self {
            prefix: prefix.into(),
            fs: Box::new(fs),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Path relative to the mount point (always starting with `/`), or `None`
    /// when `path` is outside of it.
    fn strip_prefix<'a>(&self, path: &'a str) -> Option<&'a str> {
        let mount = self.prefix.trim_end_matches('/');
        if mount.is_empty() {
            return Some(path);
        }
        path.strip_prefix(mount).filter(|rest| rest.starts_with('/'))
    }

    async fn open_index(&self, dir: &str) -> Result<Asset, FsError> {
        let name = format!("{}{}", dir, INDEX_FILE);
        let asset = self.fs.open(&name).await?;
        if asset.is_dir() {
            return Err(FsError::NotFound(name));
        }
        Ok(asset)
    }
}

/// Fallback handler - serve a file from the static tree
pub async fn serve_static(State(site): State<Arc<StaticSite>>, req: Request) -> Response {
    let path = req.uri().path().to_string();
    let query = req.uri().query().map(|q| format!("?{}", q)).unwrap_or_default();

    let cleaned = clean_path(&path);
    if cleaned != path {
        return redirect(format!("{}{}", cleaned, query));
    }

    let Some(relative) = site.strip_prefix(&path) else {
        // "/doc" -> "/doc/"
        if format!("{}/", path) == site.prefix() {
            return redirect(format!("{}{}", site.prefix(), query));
        }
        return FsError::NotFound(path).into_response();
    };

    // "/docs/index.html" -> "/docs/"
    if let Some(dir) = path.strip_suffix(INDEX_FILE).filter(|dir| dir.ends_with('/')) {
        return redirect(format!("{}{}", dir, query));
    }

    let name = match urlencoding::decode(relative) {
        Ok(name) => name.into_owned(),
        Err(_) => return FsError::InvalidPath.into_response(),
    };

    let asset = match site.fs.open(&name).await {
        Ok(asset) => asset,
        Err(err) => return err.into_response(),
    };

    let asset = if asset.is_dir() {
        if !path.ends_with('/') {
            return redirect(format!("{}/{}", path, query));
        }
        match site.open_index(&name).await {
            Ok(index) => index,
            Err(err) => return err.into_response(),
        }
    } else if let Some(file) = path.strip_suffix('/') {
        // "/hello.txt/" -> "/hello.txt"
        return redirect(format!("{}{}", file, query));
    } else {
        asset
    };

    debug!("Serving {} from {}", path, asset.path.display());
    serve_file(&asset.path, req).await
}

/// Hand the file to `ServeFile`, which deals with content types, ranges and
/// conditional requests.
async fn serve_file(path: &Path, req: Request) -> Response {
    let result: Result<_, Infallible> = ServeFile::new(path).oneshot(req).await;
    match result {
        Ok(response) => response.map(Body::new),
        Err(never) => match never {},
    }
}

/// Lexically normalize a rooted URL path: repeated slashes collapse, `.`
/// segments go away and `..` removes the segment before it. A trailing slash
/// survives unless the result is the root.
fn clean_path(path: &str) -> String {
    let mut segments: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            other => segments.push(other),
        }
    }

    let mut cleaned = format!("/{}", segments.join("/"));
    if path.ends_with('/') && cleaned != "/" {
        cleaned.push('/');
    }
    cleaned
}

fn redirect(location: String) -> Response {
    (StatusCode::MOVED_PERMANENTLY, [(header::LOCATION, location)]).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::Dir;
    use tempfile::TempDir;

    #[test]
    fn test_strip_prefix_root() {
        let site = StaticSite::new("/", Dir::new("/srv/http"));
        assert_eq!(site.strip_prefix("/a/b"), Some("/a/b"));
        assert_eq!(site.strip_prefix("/"), Some("/"));
    }

    #[test]
    fn test_strip_prefix_context() {
        let site = StaticSite::new("/doc/", Dir::new("/srv/http"));
        assert_eq!(site.strip_prefix("/doc/a/b"), Some("/a/b"));
        assert_eq!(site.strip_prefix("/doc/"), Some("/"));
        assert_eq!(site.strip_prefix("/doc"), None);
        assert_eq!(site.strip_prefix("/docs/a"), None);
        assert_eq!(site.strip_prefix("/other"), None);
    }

    #[test]
    fn test_clean_path() {
        assert_eq!(clean_path("/"), "/");
        assert_eq!(clean_path("/a/b/c.txt"), "/a/b/c.txt");
        assert_eq!(clean_path("/docs/../hello.txt"), "/hello.txt");
        assert_eq!(clean_path("/docs/../../etc/passwd"), "/etc/passwd");
        assert_eq!(clean_path("/a/./b//c/"), "/a/b/c/");
        assert_eq!(clean_path("/a/.."), "/");
        assert_eq!(clean_path("/a/../"), "/");
        // Encoded dots are not segments yet.
        assert_eq!(clean_path("/%2e%2e/x"), "/%2e%2e/x");
    }

    #[tokio::test]
    async fn test_open_index_rejects_directory() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::create_dir_all(temp_dir.path().join("sub/index.html")).unwrap();
        let site = StaticSite::new("/", Dir::new(temp_dir.path()));

        let result = site.open_index("/sub/").await;
        assert!(matches!(result, Err(FsError::NotFound(_))));
    }
}
