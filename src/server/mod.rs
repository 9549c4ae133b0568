//! HTTP surface of the resolver.
//!
//! Two routes share one resolve-and-stream path:
//!
//! - `GET /lofimockups/{wiki}/{N}/{page...}/{attachment}/{inner path}`:
//!   positional resolver, content type derived from the inner path
//! - `GET /rest/lofimockups/page?wiki=&page=&attachment=&(zipPath=|pageNr=)`:
//!   named parameters; `zipPath` answers `image/jpeg`, `pageNr` answers
//!   `image/png`

mod error;
mod relay;
mod routes;

pub use relay::EntryBody;

use axum::Router;
use axum::routing::get;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::io::AttachmentLocator;
use crate::request::{REST_PAGE_PATH, RESOLVER_PREFIX};

/// Shared state handed to every handler. Holds no per-request data.
#[derive(Clone)]
pub struct AppState {
    locator: Arc<dyn AttachmentLocator>,
}

impl AppState {
    pub fn new(locator: Arc<dyn AttachmentLocator>) -> Self {
        Self { locator }
    }
}

/// Build the application router.
pub fn app(state: AppState) -> Router {
    Router::new()
        .route(&format!("{RESOLVER_PREFIX}/{{*path}}"), get(routes::resolve_positional))
        .route(REST_PAGE_PATH, get(routes::resolve_page))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
