use axum::body::Body;
use axum::extract::rejection::QueryRejection;
use axum::extract::{Query, State};
use axum::http::{HeaderValue, Uri, header};
use axum::response::Response;
use std::io;
use tracing::{info, warn};

use super::AppState;
use super::relay::EntryBody;
use crate::auth::Caller;
use crate::error::{Error, Result};
use crate::request::{EntrySelector, PageQuery, RESOLVER_PREFIX, ResourceRequest};
use crate::zip::{self, Lookup};

/// `GET /lofimockups/{wiki}/{N}/{page...}/{attachment}/{inner path}`
pub(super) async fn resolve_positional(
    State(state): State<AppState>,
    caller: Caller,
    uri: Uri,
    parameters: Result<Query<Vec<(String, String)>>, QueryRejection>,
) -> Result<Response> {
    let parameters = query_params(parameters)?;
    // The raw path, so that `%2F` inside a segment survives the split.
    let encoded = uri.path().strip_prefix(RESOLVER_PREFIX).unwrap_or(uri.path());
    let request = ResourceRequest::from_encoded_path(encoded)?.with_parameters(parameters);
    let content_type = content_type_for(request.inner_path());
    serve_entry(&state, &caller, &request, content_type).await
}

/// `GET /rest/lofimockups/page`
pub(super) async fn resolve_page(
    State(state): State<AppState>,
    caller: Caller,
    query: Result<Query<PageQuery>, QueryRejection>,
) -> Result<Response> {
    let (request, selector) = query_params(query)?.decode()?;
    let content_type = match selector {
        EntrySelector::Path(_) => "image/jpeg",
        EntrySelector::Page(_) => "image/png",
    };
    serve_entry(&state, &caller, &request, content_type).await
}

/// Query strings the extractor cannot parse (bad encoding, repeated names)
/// are malformed requests like any other.
fn query_params<T>(query: Result<Query<T>, QueryRejection>) -> Result<T> {
    query
        .map(|Query(params)| params)
        .map_err(|rejection| Error::MalformedRequest(rejection.body_text()))
}

async fn serve_entry(
    state: &AppState,
    caller: &Caller,
    request: &ResourceRequest,
    content_type: &'static str,
) -> Result<Response> {
    let source = state.locator.locate(caller, request.attachment_ref()).await?;

    let inner_path = request.inner_path().to_string();
    let lookup = tokio::task::spawn_blocking(move || zip::open(source, &inner_path))
        .await
        .map_err(|e| Error::SourceUnavailable(io::Error::other(e)))?
        .inspect_err(|e| {
            if let zip::ArchiveError::Corrupt(msg) = e {
                warn!(%request, reason = %msg, "attachment is not a readable archive");
            }
        })?;

    let stream = match lookup {
        Lookup::Found(stream) => stream,
        Lookup::NotFound(path) => return Err(Error::EntryNotFound(path)),
    };

    let size = stream.uncompressed_size();
    info!(%request, content_type, size = ?size, "serving archive entry");

    let mut response = Response::new(Body::new(EntryBody::spawn(stream)));
    let headers = response.headers_mut();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
    if let Some(size) = size {
        headers.insert(header::CONTENT_LENGTH, HeaderValue::from(size));
    }
    Ok(response)
}

/// Media type of an entry, by file extension.
fn content_type_for(inner_path: &str) -> &'static str {
    let name = inner_path.rsplit('/').next().unwrap_or(inner_path);
    let extension = match name.rsplit_once('.') {
        Some((_, ext)) => ext.to_ascii_lowercase(),
        None => return "application/octet-stream",
    };

    match extension.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "bmp" => "image/bmp",
        "webp" => "image/webp",
        "svg" => "image/svg+xml",
        "json" => "application/json",
        "xml" => "application/xml",
        "html" | "htm" => "text/html; charset=utf-8",
        "css" => "text/css; charset=utf-8",
        "js" => "text/javascript; charset=utf-8",
        "txt" => "text/plain; charset=utf-8",
        _ => "application/octet-stream",
    }
}
