use axum::{Router, middleware, routing::get};
use tower_http::set_header::SetResponseHeaderLayer;

use crate::access_log::access_log;
use crate::auth::require_basic_auth;
use crate::handlers;
use crate::status::status_handler;
use crate::App;

/// Create the server router.
///
/// Request flow: access log -> extra header -> basic auth -> static files.
/// The status endpoint sits beside the static files and is only logged.
pub fn create_router(app: App) -> Router {
    let mut files = Router::new()
        .fallback(handlers::serve_static)
        .with_state(app.site);

    if let Some(credentials) = app.credentials {
        files = files.layer(middleware::from_fn_with_state(
            credentials,
            require_basic_auth,
        ));
    }

    if let Some((name, value)) = app.extra_header {
        files = files.layer(SetResponseHeaderLayer::overriding(name, value));
    }

    let mut router = Router::new();
    if let Some(status) = app.status {
        router = router.route(&status.path, get(status_handler).with_state(status.payload));
    }

    router
        .fallback_service(files)
        .layer(middleware::from_fn_with_state(app.access_log, access_log))
}
