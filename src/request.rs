//! Incoming HTTP request value.
//!
//! A [`Request`] is built once from explicit input maps and never mutated
//! afterwards. Middleware that wants to hand a different request down the
//! chain builds a new one (see [`Request::to_builder`]).

use std::collections::HashMap;
use std::path::PathBuf;

use http::Method;
use serde_json::Value;
use tracing::debug;

use crate::sanitize;

/// A string-keyed bag of loosely typed input values.
pub type Params = serde_json::Map<String, Value>;

/// Server metadata keys starting with this marker are request headers.
const HEADER_PREFIX: &str = "HTTP_";

// ── FileUpload ────────────────────────────────────────────────────────────────

/// Metadata for one uploaded file.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FileUpload {
    /// Original file name as sent by the client.
    pub name: String,
    /// Client-declared media type.
    pub mime: String,
    /// Where the upload was spooled on disk.
    pub path: PathBuf,
    pub size: u64,
    /// Upload error code; `0` means the transfer succeeded.
    pub error: u16,
}

impl FileUpload {
    pub fn is_valid(&self) -> bool {
        self.error == 0
    }
}

// ── Request ───────────────────────────────────────────────────────────────────

/// An incoming HTTP request.
///
/// ```rust
/// use passage::Request;
///
/// let req = Request::builder()
///     .method("post")
///     .uri("/users?page=2")
///     .query("page", "2")
///     .body("name", "alice")
///     .header("X-Requested-With", "XMLHttpRequest")
///     .build();
///
/// assert!(req.is_post());
/// assert!(req.is_ajax());
/// assert_eq!(req.path(), "/users");
/// assert_eq!(req.int("page", 1), 2);
/// assert_eq!(req.header("x_requested_with"), Some("XMLHttpRequest"));
/// ```
#[derive(Clone, Debug, Default)]
pub struct Request {
    query: Params,
    body: Params,
    files: HashMap<String, FileUpload>,
    server: Params,
    headers: HashMap<String, String>,
}

impl Request {
    /// Builds a request from raw input maps. Headers are derived here, once.
    pub fn new(
        query: Params,
        body: Params,
        files: HashMap<String, FileUpload>,
        server: Params,
    ) -> Self {
        let headers = extract_headers(&server);
        Self { query, body, files, server, headers }
    }

    pub fn builder() -> RequestBuilder {
        RequestBuilder::default()
    }

    /// A builder pre-filled with this request's inputs.
    pub fn to_builder(&self) -> RequestBuilder {
        RequestBuilder {
            query: self.query.clone(),
            body: self.body.clone(),
            files: self.files.clone(),
            server: self.server.clone(),
        }
    }

    // ── Raw input ─────────────────────────────────────────────────────────────

    /// Looks a key up in the body, then the query string. `null` counts as
    /// absent.
    pub fn input(&self, key: &str) -> Option<&Value> {
        present(self.body.get(key)).or_else(|| present(self.query.get(key)))
    }

    /// Query and body merged; body values win on conflicts.
    pub fn all(&self) -> Params {
        let mut all = self.query.clone();
        all.extend(self.body.iter().map(|(k, v)| (k.clone(), v.clone())));
        all
    }

    pub fn only(&self, keys: &[&str]) -> Params {
        self.all().into_iter().filter(|(k, _)| keys.contains(&k.as_str())).collect()
    }

    pub fn except(&self, keys: &[&str]) -> Params {
        self.all().into_iter().filter(|(k, _)| !keys.contains(&k.as_str())).collect()
    }

    pub fn has(&self, key: &str) -> bool {
        self.input(key).is_some()
    }

    pub fn query(&self, key: &str) -> Option<&Value> {
        present(self.query.get(key))
    }

    pub fn post(&self, key: &str) -> Option<&Value> {
        present(self.body.get(key))
    }

    pub fn file(&self, key: &str) -> Option<&FileUpload> {
        self.files.get(key)
    }

    pub fn server(&self, key: &str) -> Option<&Value> {
        self.server.get(key)
    }

    // ── Typed and sanitized input ─────────────────────────────────────────────

    /// Single-line text with tags stripped and whitespace collapsed.
    pub fn text(&self, key: &str, default: &str) -> String {
        sanitize::text_field(&self.string(key, default))
    }

    /// Multi-line text with tags stripped.
    pub fn textarea(&self, key: &str, default: &str) -> String {
        sanitize::textarea_field(&self.string(key, default))
    }

    /// Rich text: markup outside a post-content allowlist is removed, the
    /// contents of `<script>` and `<style>` included.
    pub fn html(&self, key: &str, default: &str) -> String {
        sanitize::html(&self.string(key, default))
    }

    pub fn email(&self, key: &str, default: &str) -> String {
        sanitize::email(&self.string(key, default))
    }

    pub fn url(&self, key: &str, default: &str) -> String {
        sanitize::url(&self.string(key, default))
    }

    /// Integer input. Strings are read up to the first non-digit, so `"12px"`
    /// yields `12` and `"abc"` yields `0`.
    pub fn int(&self, key: &str, default: i64) -> i64 {
        self.input(key).map_or(default, to_int)
    }

    pub fn absint(&self, key: &str, default: i64) -> u64 {
        self.int(key, default).unsigned_abs()
    }

    pub fn float(&self, key: &str, default: f64) -> f64 {
        self.input(key).map_or(default, to_float)
    }

    /// `true` for `1`, `"1"`, `"true"`, `"on"` and `"yes"` (any case);
    /// `false` for every other present value.
    pub fn bool(&self, key: &str, default: bool) -> bool {
        self.input(key).map_or(default, to_bool)
    }

    /// Returns the value only when it is a list or a map.
    pub fn array(&self, key: &str) -> Option<&Value> {
        self.input(key).filter(|v| v.is_array() || v.is_object())
    }

    fn string(&self, key: &str, default: &str) -> String {
        self.input(key).map_or_else(|| default.to_owned(), to_string)
    }

    // ── Request info ──────────────────────────────────────────────────────────

    /// The uppercased `REQUEST_METHOD`, defaulting to `GET`.
    pub fn method(&self) -> Method {
        self.server_str("REQUEST_METHOD")
            .and_then(|m| Method::from_bytes(m.to_ascii_uppercase().as_bytes()).ok())
            .unwrap_or(Method::GET)
    }

    pub fn is_method(&self, method: &str) -> bool {
        self.method().as_str().eq_ignore_ascii_case(method)
    }

    pub fn is_post(&self) -> bool {
        self.method() == Method::POST
    }

    pub fn is_get(&self) -> bool {
        self.method() == Method::GET
    }

    pub fn is_ajax(&self) -> bool {
        self.header("X-Requested-With") == Some("XMLHttpRequest")
    }

    pub fn uri(&self) -> &str {
        self.server_str("REQUEST_URI").unwrap_or("/")
    }

    /// The URI without its query string.
    pub fn path(&self) -> &str {
        let uri = self.uri();
        uri.split_once('?').map_or(uri, |(path, _)| path)
    }

    /// Header lookup, case-insensitive and treating `-` and `_` alike.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&normalize_header(name)).map(String::as_str)
    }

    pub fn headers(&self) -> &HashMap<String, String> {
        &self.headers
    }

    pub fn ip(&self) -> &str {
        self.server_str("REMOTE_ADDR").unwrap_or("127.0.0.1")
    }

    fn server_str(&self, key: &str) -> Option<&str> {
        self.server.get(key).and_then(Value::as_str)
    }
}

// ── RequestBuilder ────────────────────────────────────────────────────────────

/// Fluent builder for [`Request`]. Obtain via [`Request::builder()`].
#[derive(Default)]
pub struct RequestBuilder {
    query: Params,
    body: Params,
    files: HashMap<String, FileUpload>,
    server: Params,
}

impl RequestBuilder {
    pub fn query(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.query.insert(key.to_owned(), value.into());
        self
    }

    pub fn body(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.body.insert(key.to_owned(), value.into());
        self
    }

    pub fn file(mut self, key: &str, file: FileUpload) -> Self {
        self.files.insert(key.to_owned(), file);
        self
    }

    pub fn server(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.server.insert(key.to_owned(), value.into());
        self
    }

    /// Stores a header under its `HTTP_`-prefixed server key.
    pub fn header(self, name: &str, value: &str) -> Self {
        self.server(&header_key(name), value)
    }

    pub fn method(self, method: &str) -> Self {
        self.server("REQUEST_METHOD", method)
    }

    /// Sets `REQUEST_URI`. Parameters in its query string fill the query
    /// map without overriding ones set through [`query`](Self::query).
    pub fn uri(mut self, uri: &str) -> Self {
        if let Some((_, query)) = uri.split_once('?') {
            for (key, value) in decode_form(query) {
                self.query.entry(key).or_insert(value);
            }
        }
        self.server("REQUEST_URI", uri)
    }

    pub fn build(self) -> Request {
        Request::new(self.query, self.body, self.files, self.server)
    }
}

// ── Helpers ───────────────────────────────────────────────────────────────────

fn present(value: Option<&Value>) -> Option<&Value> {
    value.filter(|v| !v.is_null())
}

fn normalize_header(name: &str) -> String {
    name.replace('-', "_").to_ascii_uppercase()
}

/// Decodes `application/x-www-form-urlencoded` input. Repeated keys keep the
/// last value; undecodable input yields an empty map.
pub(crate) fn decode_form(input: &str) -> Params {
    match serde_urlencoded::from_str::<Vec<(String, String)>>(input) {
        Ok(pairs) => pairs.into_iter().map(|(k, v)| (k, Value::String(v))).collect(),
        Err(e) => {
            debug!("ignoring undecodable form data: {e}");
            Params::new()
        }
    }
}

/// Server key a header is stored under: `Content-Type` → `HTTP_CONTENT_TYPE`.
pub(crate) fn header_key(name: &str) -> String {
    format!("{HEADER_PREFIX}{}", normalize_header(name))
}

fn extract_headers(server: &Params) -> HashMap<String, String> {
    server
        .iter()
        .filter_map(|(key, value)| {
            let name = key.strip_prefix(HEADER_PREFIX)?;
            Some((normalize_header(name), to_string(value)))
        })
        .collect()
}

/// String form of a scalar. Lists and maps have none and become empty.
fn to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(true) => "1".to_owned(),
        Value::Bool(false) | Value::Null | Value::Array(_) | Value::Object(_) => String::new(),
    }
}

fn to_int(value: &Value) -> i64 {
    match value {
        Value::Number(n) => n.as_i64().unwrap_or_else(|| n.as_f64().unwrap_or(0.0) as i64),
        Value::String(s) => leading_int(s),
        Value::Bool(b) => i64::from(*b),
        Value::Array(a) => i64::from(!a.is_empty()),
        Value::Object(o) => i64::from(!o.is_empty()),
        Value::Null => 0,
    }
}

fn to_float(value: &Value) -> f64 {
    match value {
        Value::Number(n) => n.as_f64().unwrap_or(0.0),
        Value::String(s) => leading_float(s),
        other => to_int(other) as f64,
    }
}

fn to_bool(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64() == Some(1.0),
        Value::String(s) => matches!(
            s.trim().to_ascii_lowercase().as_str(),
            "1" | "true" | "on" | "yes"
        ),
        Value::Null | Value::Array(_) | Value::Object(_) => false,
    }
}

fn leading_int(s: &str) -> i64 {
    let s = s.trim_start();
    let digits_start = usize::from(s.starts_with(['+', '-']));
    let digits_len = s[digits_start..].bytes().take_while(u8::is_ascii_digit).count();
    if digits_len == 0 {
        return 0;
    }
    let number = &s[..digits_start + digits_len];
    number.parse().unwrap_or(if s.starts_with('-') { i64::MIN } else { i64::MAX })
}

fn leading_float(s: &str) -> f64 {
    let s = s.trim_start();
    let candidate_len = s
        .bytes()
        .take_while(|b| b.is_ascii_digit() || b"+-.eE".contains(b))
        .count();
    (1..=candidate_len)
        .rev()
        .find_map(|len| s[..len].parse().ok())
        .unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn text_strips_script_tags() {
        let req = Request::builder().body("name", "<script>alert(1)</script>John").build();
        let name = req.text("name", "");
        assert!(!name.contains("<script>"));
        assert!(name.contains("John"));
    }

    #[test]
    fn html_keeps_safe_markup() {
        let req = Request::builder()
            .body("bio", r#"<p>Hi <b>there</b></p><script>alert(1)</script><a href="javascript:x()">x</a>"#)
            .build();
        let bio = req.html("bio", "");
        assert!(bio.starts_with("<p>Hi <b>there</b></p>"), "{bio}");
        assert!(!bio.contains("script"), "{bio}");
        assert!(!bio.contains("alert"), "{bio}");
        assert!(!bio.contains("javascript"), "{bio}");
        assert_eq!(req.html("missing", "<i>none</i>"), "<i>none</i>");
    }

    #[test]
    fn uri_query_fills_query_params() {
        let req = Request::builder().uri("/users?page=2&sort=name+asc").build();
        assert_eq!(req.int("page", 1), 2);
        assert_eq!(req.query("sort"), Some(&json!("name asc")));
        assert_eq!(req.path(), "/users");

        let req = Request::builder().query("page", 5).uri("/users?page=2").build();
        assert_eq!(req.int("page", 1), 5);
    }

    #[test]
    fn typed_accessors_coerce_strings() {
        let req = Request::builder()
            .body("age", "25")
            .body("active", "1")
            .body("width", "12px")
            .body("ratio", "1.5x")
            .body("offset", "-7")
            .build();

        assert_eq!(req.int("age", 0), 25);
        assert!(req.bool("active", false));
        assert_eq!(req.int("width", 0), 12);
        assert_eq!(req.float("ratio", 0.0), 1.5);
        assert_eq!(req.absint("offset", 0), 7);
        assert_eq!(req.int("missing", 3), 3);
        assert!(!req.bool("missing", false));
    }

    #[test]
    fn bool_accepts_common_truthy_words() {
        let req = Request::builder()
            .query("a", "Yes")
            .query("b", "off")
            .query("c", true)
            .query("d", 1)
            .build();
        assert!(req.bool("a", false));
        assert!(!req.bool("b", true));
        assert!(req.bool("c", false));
        assert!(req.bool("d", false));
    }

    #[test]
    fn body_takes_precedence_over_query() {
        let req = Request::builder()
            .query("page", "1")
            .query("sort", "asc")
            .body("page", "2")
            .body("empty", Value::Null)
            .build();

        assert_eq!(req.input("page"), Some(&json!("2")));
        assert_eq!(req.query("page"), Some(&json!("1")));
        assert_eq!(req.post("sort"), None);
        assert!(req.has("sort"));
        assert!(!req.has("empty"));
        assert!(!req.has("nonexistent"));
        assert_eq!(req.all()["page"], json!("2"));
    }

    #[test]
    fn only_and_except_select_keys() {
        let req = Request::builder().body("a", 1).body("b", 2).body("c", 3).build();

        let only = req.only(&["a", "c"]);
        assert!(only.contains_key("a"));
        assert!(only.contains_key("c"));
        assert!(!only.contains_key("b"));

        let except = req.except(&["a"]);
        assert_eq!(except.len(), 2);
        assert!(!except.contains_key("a"));
    }

    #[test]
    fn headers_are_case_and_separator_insensitive() {
        let req = Request::builder()
            .server("HTTP_CONTENT_TYPE", "application/json")
            .server("HTTP_X_API_KEY", "secret")
            .server("SERVER_NAME", "localhost")
            .build();

        assert_eq!(req.header("Content-Type"), Some("application/json"));
        assert_eq!(req.header("content_type"), Some("application/json"));
        assert_eq!(req.header("x-api-key"), Some("secret"));
        assert_eq!(req.header("X_Api-KEY"), Some("secret"));
        assert_eq!(req.header("server-name"), None);
        assert_eq!(req.headers().len(), 2);
    }

    #[test]
    fn request_info_defaults() {
        let req = Request::default();
        assert_eq!(req.method(), Method::GET);
        assert!(req.is_get());
        assert_eq!(req.uri(), "/");
        assert_eq!(req.path(), "/");
        assert_eq!(req.ip(), "127.0.0.1");
        assert!(!req.is_ajax());
    }

    #[test]
    fn method_is_uppercased() {
        let req = Request::builder().method("delete").uri("/items/4?force=1").build();
        assert!(req.is_method("DELETE"));
        assert!(req.is_method("delete"));
        assert_eq!(req.path(), "/items/4");
        assert_eq!(req.uri(), "/items/4?force=1");
    }

    #[test]
    fn array_only_returns_collections() {
        let req = Request::builder()
            .body("tags", json!(["a", "b"]))
            .body("name", "x")
            .build();
        assert_eq!(req.array("tags"), Some(&json!(["a", "b"])));
        assert_eq!(req.array("name"), None);
    }

    #[test]
    fn files_are_looked_up_by_field() {
        let upload = FileUpload {
            name: "avatar.png".into(),
            mime: "image/png".into(),
            path: PathBuf::from("/tmp/php123"),
            size: 2048,
            error: 0,
        };
        let req = Request::builder().file("avatar", upload.clone()).build();
        assert_eq!(req.file("avatar"), Some(&upload));
        assert!(req.file("avatar").is_some_and(FileUpload::is_valid));
        assert_eq!(req.file("resume"), None);
    }

    #[test]
    fn to_builder_preserves_inputs() {
        let req = Request::builder().query("q", "rust").header("Accept", "text/html").build();
        let derived = req.to_builder().body("extra", true).build();
        assert_eq!(derived.query("q"), Some(&json!("rust")));
        assert_eq!(derived.header("accept"), Some("text/html"));
        assert!(derived.bool("extra", false));
        assert!(!req.has("extra"));
    }
}
