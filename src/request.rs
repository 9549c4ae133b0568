//! Decoding of the URL shapes that name an entry inside an attached archive.
//!
//! Two encodings reach the same [`ResourceRequest`]:
//!
//! ```text
//! /lofimockups/{wiki}/{N}/{page_1}/.../{page_N}/{attachment}/{inner path}[?k=v...]
//! /rest/lofimockups/page?wiki=..&page=..&attachment=..&(zipPath=..|pageNr=..)
//! ```
//!
//! Decoding never performs I/O.

use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, percent_decode_str, utf8_percent_encode};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fmt;

use crate::error::{Error, Result};
use crate::io::AttachmentRef;

/// Mount point of the positional resolver.
pub const RESOLVER_PREFIX: &str = "/lofimockups";

/// Path of the named-parameter REST endpoint.
pub const REST_PAGE_PATH: &str = "/rest/lofimockups/page";

/// Escape set for one path segment or query value.
const COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

/// wiki, page count, one page segment, attachment... and the inner path
const MIN_SEGMENTS: usize = 4;

/// One archive entry of one wiki attachment.
///
/// Equality and hashing are structural over every field, including the
/// extra parameters carried over from the positional URL. Parameters are
/// keyed by name, so their order in the query string does not matter; the
/// values of a repeated name keep their order.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceRequest {
    wiki: String,
    page_path: Vec<String>,
    attachment: String,
    inner_path: String,
    parameters: BTreeMap<String, Vec<String>>,
}

impl ResourceRequest {
    /// Build a request, enforcing that the page path is non-empty and the
    /// inner path is a non-empty relative name.
    pub fn new(
        wiki: impl Into<String>,
        page_path: Vec<String>,
        attachment: impl Into<String>,
        inner_path: impl Into<String>,
    ) -> Result<Self> {
        let request = Self {
            wiki: wiki.into(),
            page_path,
            attachment: attachment.into(),
            inner_path: inner_path.into(),
            parameters: BTreeMap::new(),
        };

        if request.wiki.is_empty() {
            return Err(malformed("wiki is empty"));
        }
        if request.page_path.is_empty() {
            return Err(malformed("page path is empty"));
        }
        if request.page_path.iter().any(String::is_empty) {
            return Err(malformed("page path has an empty segment"));
        }
        if request.attachment.is_empty() {
            return Err(malformed("attachment name is empty"));
        }
        if request.inner_path.is_empty() {
            return Err(malformed("in-archive path is empty"));
        }
        if request.inner_path.starts_with('/') {
            return Err(malformed(format!(
                "in-archive path {:?} must not start with '/'",
                request.inner_path
            )));
        }

        Ok(request)
    }

    /// Decode the positional form from already percent-decoded segments.
    ///
    /// Layout: wiki, page segment count `N`, `N` page segments, attachment,
    /// inner path. The count must account for every segment.
    pub fn from_segments<S: AsRef<str>>(segments: &[S]) -> Result<Self> {
        if segments.len() < MIN_SEGMENTS {
            return Err(malformed(format!(
                "expected at least {MIN_SEGMENTS} path segments, got {}",
                segments.len()
            )));
        }

        let count_segment = segments[1].as_ref();
        let page_count: usize = count_segment.parse().map_err(|_| {
            malformed(format!(
                "page segment count {count_segment:?} is not a non-negative integer"
            ))
        })?;

        let expected = page_count.checked_add(4);
        if expected != Some(segments.len()) {
            return Err(malformed(format!(
                "{page_count} page segments need {} path segments, got {}",
                page_count.saturating_add(4),
                segments.len()
            )));
        }

        let page_path = segments[2..2 + page_count]
            .iter()
            .map(|s| s.as_ref().to_string())
            .collect();

        Self::new(
            segments[0].as_ref(),
            page_path,
            segments[2 + page_count].as_ref(),
            segments[3 + page_count].as_ref(),
        )
    }

    /// Decode the positional form from a raw, still percent-encoded URL path
    /// relative to [`RESOLVER_PREFIX`].
    ///
    /// Segments are split before decoding so an encoded `%2F` stays inside
    /// its segment.
    pub fn from_encoded_path(path: &str) -> Result<Self> {
        let segments = path
            .trim_start_matches('/')
            .split('/')
            .map(decode_segment)
            .collect::<Result<Vec<_>>>()?;
        Self::from_segments(&segments)
    }

    /// Attach extra query parameters, grouped by name.
    pub fn with_parameters(mut self, parameters: Vec<(String, String)>) -> Self {
        self.parameters.clear();
        for (key, value) in parameters {
            self.parameters.entry(key).or_default().push(value);
        }
        self
    }

    pub fn wiki(&self) -> &str {
        &self.wiki
    }

    pub fn page_path(&self) -> &[String] {
        &self.page_path
    }

    pub fn attachment(&self) -> &str {
        &self.attachment
    }

    pub fn inner_path(&self) -> &str {
        &self.inner_path
    }

    pub fn parameters(&self) -> &BTreeMap<String, Vec<String>> {
        &self.parameters
    }

    /// The (wiki, page path, attachment) triple handed to the locator.
    pub fn attachment_ref(&self) -> AttachmentRef<'_> {
        AttachmentRef {
            wiki: &self.wiki,
            page_path: &self.page_path,
            attachment: &self.attachment,
        }
    }

    /// Positional segments, undecoded; the inverse of [`from_segments`](Self::from_segments).
    pub fn to_segments(&self) -> Vec<String> {
        let mut segments = Vec::with_capacity(self.page_path.len() + 4);
        segments.push(self.wiki.clone());
        segments.push(self.page_path.len().to_string());
        segments.extend(self.page_path.iter().cloned());
        segments.push(self.attachment.clone());
        segments.push(self.inner_path.clone());
        segments
    }

    /// Positional URL path, each segment percent-encoded, parameters appended
    /// as a query string.
    pub fn to_path(&self) -> String {
        let mut path = String::from(RESOLVER_PREFIX);
        for segment in self.to_segments() {
            path.push('/');
            path.extend(utf8_percent_encode(&segment, COMPONENT));
        }

        let pairs = self
            .parameters
            .iter()
            .flat_map(|(key, values)| values.iter().map(move |value| (key, value)));
        for (i, (key, value)) in pairs.enumerate() {
            path.push(if i == 0 { '?' } else { '&' });
            path.extend(utf8_percent_encode(key, COMPONENT));
            path.push('=');
            path.extend(utf8_percent_encode(value, COMPONENT));
        }
        path
    }
}

impl fmt::Display for ResourceRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}/{}!{}",
            self.wiki,
            self.page_path.join("/"),
            self.attachment,
            self.inner_path
        )
    }
}

/// How the REST endpoint names the entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntrySelector {
    /// `zipPath`: the literal in-archive path
    Path(String),
    /// `pageNr`: a rendered mockup page
    Page(u32),
}

impl EntrySelector {
    pub fn inner_path(&self) -> String {
        match self {
            EntrySelector::Path(path) => path.clone(),
            EntrySelector::Page(page_nr) => page_inner_path(*page_nr),
        }
    }
}

/// Conventional archive location of a rendered mockup page.
pub fn page_inner_path(page_nr: u32) -> String {
    format!("pages/{page_nr}.png")
}

/// Query parameters of the REST endpoint, before validation.
#[derive(Debug, Default, Clone, Deserialize)]
pub struct PageQuery {
    pub wiki: Option<String>,
    /// Slash-joined page path whose components are themselves URL-encoded
    pub page: Option<String>,
    pub attachment: Option<String>,
    #[serde(rename = "zipPath")]
    pub zip_path: Option<String>,
    #[serde(rename = "pageNr")]
    pub page_nr: Option<String>,
}

impl PageQuery {
    /// Validate the parameters. `zipPath` takes precedence over `pageNr`.
    pub fn decode(&self) -> Result<(ResourceRequest, EntrySelector)> {
        let wiki = required(&self.wiki, "wiki")?;
        let page = required(&self.page, "page")?;
        let attachment = required(&self.attachment, "attachment")?;

        let selector = match (&self.zip_path, &self.page_nr) {
            (Some(path), _) => EntrySelector::Path(path.clone()),
            (None, Some(page_nr)) => EntrySelector::Page(page_nr.trim().parse().map_err(|_| {
                malformed(format!("pageNr {page_nr:?} is not a non-negative integer"))
            })?),
            (None, None) => return Err(malformed("either zipPath or pageNr is required")),
        };

        let request = ResourceRequest::new(
            wiki,
            split_page_path(page)?,
            attachment,
            selector.inner_path(),
        )?;
        Ok((request, selector))
    }
}

/// REST URL of a rendered mockup page, as embedded into wiki pages.
///
/// Page components are encoded individually, joined with `/`, and the joined
/// value is encoded once more as a query value.
pub fn page_image_url(wiki: &str, page_path: &[String], attachment: &str, page_nr: u32) -> String {
    let page = page_path
        .iter()
        .map(|component| utf8_percent_encode(component, COMPONENT).to_string())
        .collect::<Vec<_>>()
        .join("/");

    format!(
        "{REST_PAGE_PATH}?wiki={}&page={}&attachment={}&pageNr={page_nr}",
        utf8_percent_encode(wiki, COMPONENT),
        utf8_percent_encode(&page, COMPONENT),
        utf8_percent_encode(attachment, COMPONENT),
    )
}

/// Split the `page` parameter and decode each component.
///
/// Components use form encoding, so `+` stands for a space. Trailing empty
/// components are dropped.
fn split_page_path(page: &str) -> Result<Vec<String>> {
    let mut components: Vec<&str> = page.split('/').collect();
    while components.last() == Some(&"") {
        components.pop();
    }

    components
        .into_iter()
        .map(|component| decode_segment(&component.replace('+', " ")))
        .collect()
}

fn decode_segment(segment: &str) -> Result<String> {
    percent_decode_str(segment)
        .decode_utf8()
        .map(|decoded| decoded.into_owned())
        .map_err(|_| malformed(format!("segment {segment:?} is not valid UTF-8")))
}

fn required<'a>(value: &'a Option<String>, name: &str) -> Result<&'a str> {
    value
        .as_deref()
        .ok_or_else(|| malformed(format!("missing parameter {name}")))
}

fn malformed(msg: impl Into<String>) -> Error {
    Error::MalformedRequest(msg.into())
}
