//! Outgoing HTTP response type and the [`IntoResponse`] coercion trait.
//!
//! Handlers rarely build a [`Response`] by hand. Return a string, a
//! [`serde_json::Value`], a map, `()` or a [`Json`] wrapper and the pipeline
//! turns it into one:
//!
//! | Handler returns                  | Response                                  |
//! |----------------------------------|-------------------------------------------|
//! | `Response`                       | used as-is                                |
//! | `String` / `&str`                | `200`, `text/html; charset=utf-8`         |
//! | map, list, `Json<T>`             | `200`, `application/json; charset=utf-8`  |
//! | `()`, `None`, `Value::Null`      | `204`, empty body                         |
//! | number / `bool`                  | `200`, HTML of its string form            |

use std::collections::{BTreeMap, HashMap};
use std::hash::Hash;

use serde::Serialize;
use serde_json::Value;

use crate::error::Error;
use crate::sanitize;
use crate::transport::Transport;

// ── ContentType ───────────────────────────────────────────────────────────────

/// Common content-type values for [`Response::with_content_type`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ContentType {
    Csv,          // text/csv
    Html,         // text/html; charset=utf-8
    Json,         // application/json; charset=utf-8
    OctetStream,  // application/octet-stream
    Text,         // text/plain; charset=utf-8
    Xml,          // application/xml
}

impl ContentType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Csv         => "text/csv",
            Self::Html        => "text/html; charset=utf-8",
            Self::Json        => "application/json; charset=utf-8",
            Self::OctetStream => "application/octet-stream",
            Self::Text        => "text/plain; charset=utf-8",
            Self::Xml         => "application/xml",
        }
    }
}

// ── Response ─────────────────────────────────────────────────────────────────

/// An outgoing HTTP response.
///
/// Setters come in two flavours: `set_*` borrow mutably (for middleware
/// adjusting a response it got back from `next`), `with_*` consume and
/// return `self` (for building one inline).
///
/// ```rust
/// use passage::Response;
///
/// let res = Response::html("<h1>Created</h1>")
///     .with_status(201)
///     .with_header("Location", "/users/42");
///
/// assert_eq!(res.status(), 201);
/// assert_eq!(res.header("location"), Some("/users/42"));
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Response {
    content: String,
    status: u16,
    headers: Vec<(String, String)>,
}

impl Default for Response {
    fn default() -> Self {
        Self::new("", 200)
    }
}

impl Response {
    /// Response with a body and no headers.
    pub fn new(content: impl Into<String>, status: u16) -> Self {
        Self { content: content.into(), status, headers: Vec::new() }
    }

    /// `200 OK` with `text/html; charset=utf-8`.
    pub fn html(html: impl Into<String>) -> Self {
        Self::new(html, 200).with_content_type(ContentType::Html)
    }

    /// `200 OK` with `application/json; charset=utf-8`.
    ///
    /// Unicode and `/` are written unescaped. Fails when `data` cannot be
    /// represented as JSON (a map with non-string keys, a failing custom
    /// `Serialize` impl).
    pub fn json<T: Serialize + ?Sized>(data: &T) -> Result<Self, Error> {
        let content = serde_json::to_string(data)?;
        Ok(Self::new(content, 200).with_content_type(ContentType::Json))
    }

    /// Redirect to `url` with the given `3xx` status. Control characters and
    /// whitespace are stripped from `url`; unsafe schemes leave `Location`
    /// empty.
    pub fn redirect(url: &str, status: u16) -> Self {
        Self::new("", status).with_header("Location", &sanitize::url(url))
    }

    /// `302 Found` pointing at `url`.
    pub fn found(url: &str) -> Self {
        Self::redirect(url, 302)
    }

    /// Response with no body.
    pub fn empty(status: u16) -> Self {
        Self::new("", status)
    }

    /// `204 No Content`.
    pub fn no_content() -> Self {
        Self::empty(204)
    }

    /// JSON error body: `{"error": message}`.
    pub fn error(message: &str, status: u16) -> Self {
        let body = serde_json::json!({ "error": message });
        Self::new(body.to_string(), status).with_content_type(ContentType::Json)
    }

    // ── Accessors ─────────────────────────────────────────────────────────────

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    // ── Setters ───────────────────────────────────────────────────────────────

    pub fn set_content(&mut self, content: impl Into<String>) -> &mut Self {
        self.content = content.into();
        self
    }

    pub fn set_status(&mut self, status: u16) -> &mut Self {
        self.status = status;
        self
    }

    /// Sets a header, replacing any existing one with the same name.
    pub fn set_header(&mut self, name: &str, value: &str) -> &mut Self {
        let entry = (name.to_owned(), value.to_owned());
        match self.headers.iter_mut().find(|(k, _)| k.eq_ignore_ascii_case(name)) {
            Some(existing) => *existing = entry,
            None => self.headers.push(entry),
        }
        self
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.set_status(status);
        self
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.set_header(name, value);
        self
    }

    pub fn with_content_type(self, content_type: ContentType) -> Self {
        self.with_header("Content-Type", content_type.as_str())
    }

    pub(crate) fn into_parts(self) -> (String, u16, Vec<(String, String)>) {
        (self.content, self.status, self.headers)
    }

    // ── Flushing ──────────────────────────────────────────────────────────────

    /// Writes the response to `transport`.
    ///
    /// Status and headers are skipped when the transport reports they already
    /// went out; the body is always written.
    pub fn send<T: Transport + ?Sized>(&self, transport: &mut T) -> Result<(), Error> {
        if !transport.headers_sent() {
            transport.status(self.status);
            for (name, value) in &self.headers {
                transport.header(name, value);
            }
        }
        transport.write(self.content.as_bytes())?;
        Ok(())
    }

    /// [`send`](Self::send), then terminate the process.
    ///
    /// Exits with status `0` after a successful flush and `1` if writing
    /// failed.
    pub fn send_and_exit<T: Transport + ?Sized>(&self, transport: &mut T) -> ! {
        std::process::exit(self.send_for_exit(transport))
    }

    fn send_for_exit<T: Transport + ?Sized>(&self, transport: &mut T) -> i32 {
        match self.send(transport) {
            Ok(()) => 0,
            Err(e) => {
                tracing::error!("failed to flush response before exit: {e}");
                1
            }
        }
    }
}

// ── Json ──────────────────────────────────────────────────────────────────────

/// Returns any `Serialize` value from a handler as a JSON response.
///
/// ```rust
/// use passage::{IntoResponse, Json};
///
/// let res = Json(vec!["a", "b"]).into_response().unwrap();
/// assert_eq!(res.content(), r#"["a","b"]"#);
/// ```
#[derive(Clone, Debug)]
pub struct Json<T>(pub T);

// ── IntoResponse ──────────────────────────────────────────────────────────────

/// Conversion of a handler's return value into a [`Response`].
///
/// Applied exactly once, where a destination or plain-function middleware
/// hands its value back. Implement it on your own types to return them
/// directly from handlers.
pub trait IntoResponse {
    fn into_response(self) -> Result<Response, Error>;
}

impl IntoResponse for Response {
    fn into_response(self) -> Result<Response, Error> { Ok(self) }
}

impl IntoResponse for String {
    fn into_response(self) -> Result<Response, Error> { Ok(Response::html(self)) }
}

impl IntoResponse for &str {
    fn into_response(self) -> Result<Response, Error> { Ok(Response::html(self)) }
}

impl IntoResponse for () {
    fn into_response(self) -> Result<Response, Error> { Ok(Response::no_content()) }
}

impl IntoResponse for bool {
    fn into_response(self) -> Result<Response, Error> {
        Ok(Response::html(if self { "1" } else { "" }))
    }
}

impl IntoResponse for Value {
    fn into_response(self) -> Result<Response, Error> {
        match self {
            Value::Null => Ok(Response::no_content()),
            Value::String(s) => Ok(Response::html(s)),
            Value::Bool(b) => b.into_response(),
            Value::Number(n) => match n.as_f64().filter(|_| n.is_f64()) {
                Some(float) => float.into_response(),
                None => Ok(Response::html(n.to_string())),
            },
            structured @ (Value::Array(_) | Value::Object(_)) => Ok(
                Response::new(structured.to_string(), 200).with_content_type(ContentType::Json),
            ),
        }
    }
}

impl<T: Serialize> IntoResponse for Json<T> {
    fn into_response(self) -> Result<Response, Error> { Response::json(&self.0) }
}

impl<K: Serialize + Eq + Hash, V: Serialize> IntoResponse for HashMap<K, V> {
    fn into_response(self) -> Result<Response, Error> { Response::json(&self) }
}

impl<K: Serialize + Ord, V: Serialize> IntoResponse for BTreeMap<K, V> {
    fn into_response(self) -> Result<Response, Error> { Response::json(&self) }
}

impl<T: Serialize> IntoResponse for Vec<T> {
    fn into_response(self) -> Result<Response, Error> { Response::json(&self) }
}

impl<T: IntoResponse> IntoResponse for Option<T> {
    fn into_response(self) -> Result<Response, Error> {
        match self {
            Some(inner) => inner.into_response(),
            None => Ok(Response::no_content()),
        }
    }
}

/// Errors are not coerced: they propagate to the pipeline's caller.
impl<T: IntoResponse> IntoResponse for Result<T, Error> {
    fn into_response(self) -> Result<Response, Error> {
        self.and_then(IntoResponse::into_response)
    }
}

macro_rules! scalar_into_response {
    ($($ty:ty),*) => {
        $(
            impl IntoResponse for $ty {
                fn into_response(self) -> Result<Response, Error> {
                    Ok(Response::html(self.to_string()))
                }
            }
        )*
    };
}

scalar_into_response!(i8, i16, i32, i64, i128, isize, u8, u16, u32, u64, u128, usize, f32, f64);
