//! Getting a [`Response`] out of the process.
//!
//! [`Response::send`] talks to a [`Transport`]: set the status, write each
//! header, write the body. Two transports ship with the crate:
//!
//! - [`Wire`] writes raw HTTP/1.1 to any [`std::io::Write`] (a socket, a
//!   CGI-style stdout, a `Vec<u8>` in tests).
//! - The `From<Response>` impl for `http::Response<Full<Bytes>>` hands the
//!   response to hyper, which does its own framing.

use std::io::{self, Write};

use bytes::Bytes;
use http::{HeaderName, HeaderValue, StatusCode};
use http_body_util::Full;
use tracing::warn;

use crate::response::Response;

/// Destination for a flushed response.
///
/// Once `headers_sent` reports `true`, [`Response::send`] only writes the
/// body; status and headers from later responses are dropped silently.
pub trait Transport {
    fn headers_sent(&self) -> bool;
    fn status(&mut self, code: u16);
    fn header(&mut self, name: &str, value: &str);
    fn write(&mut self, body: &[u8]) -> io::Result<()>;
}

// ── Wire ──────────────────────────────────────────────────────────────────────

/// HTTP/1.1 writer. Status and headers are buffered until the first body
/// write, at which point the head goes out and can no longer change.
///
/// ```rust
/// use passage::{Response, Wire};
///
/// let mut wire = Wire::new(Vec::new());
/// Response::html("hi").send(&mut wire).unwrap();
///
/// let raw = String::from_utf8(wire.into_inner()).unwrap();
/// assert!(raw.starts_with("HTTP/1.1 200 OK\r\n"));
/// assert!(raw.ends_with("\r\n\r\nhi"));
/// ```
pub struct Wire<W> {
    writer: W,
    status: u16,
    headers: Vec<(String, String)>,
    sent: bool,
}

impl<W: Write> Wire<W> {
    pub fn new(writer: W) -> Self {
        Self { writer, status: 200, headers: Vec::new(), sent: false }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }

    fn write_head(&mut self) -> io::Result<()> {
        write!(self.writer, "HTTP/1.1 {} {}\r\n", self.status, reason(self.status))?;
        for (name, value) in &self.headers {
            write!(self.writer, "{name}: {value}\r\n")?;
        }
        self.writer.write_all(b"\r\n")
    }
}

impl<W: Write> Transport for Wire<W> {
    fn headers_sent(&self) -> bool {
        self.sent
    }

    fn status(&mut self, code: u16) {
        self.status = code;
    }

    fn header(&mut self, name: &str, value: &str) {
        self.headers.push((name.to_owned(), value.to_owned()));
    }

    fn write(&mut self, body: &[u8]) -> io::Result<()> {
        if !self.sent {
            self.sent = true;
            self.write_head()?;
        }
        self.writer.write_all(body)?;
        self.writer.flush()
    }
}

fn reason(code: u16) -> &'static str {
    StatusCode::from_u16(code)
        .ok()
        .and_then(|s| s.canonical_reason())
        .unwrap_or("")
}

// ── hyper ─────────────────────────────────────────────────────────────────────

/// Statuses outside 100..=999 become `500`; headers that are not valid HTTP
/// tokens are dropped with a warning.
impl From<Response> for http::Response<Full<Bytes>> {
    fn from(response: Response) -> Self {
        let (content, status, headers) = response.into_parts();

        let mut res = http::Response::new(Full::new(Bytes::from(content)));
        *res.status_mut() = StatusCode::from_u16(status).unwrap_or_else(|_| {
            warn!(status, "invalid status code, sending 500");
            StatusCode::INTERNAL_SERVER_ERROR
        });

        for (name, value) in headers {
            match (HeaderName::from_bytes(name.as_bytes()), HeaderValue::from_str(&value)) {
                (Ok(name), Ok(value)) => {
                    res.headers_mut().insert(name, value);
                }
                _ => warn!(header = %name, "dropping invalid response header"),
            }
        }
        res
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;

    fn raw(wire: Wire<Vec<u8>>) -> String {
        String::from_utf8(wire.into_inner()).unwrap()
    }

    #[test]
    fn writes_status_line_headers_and_body() {
        let mut wire = Wire::new(Vec::new());
        Response::error("gone", 410).send(&mut wire).unwrap();

        assert_eq!(
            raw(wire),
            "HTTP/1.1 410 Gone\r\n\
             Content-Type: application/json; charset=utf-8\r\n\
             \r\n\
             {\"error\":\"gone\"}"
        );
    }

    #[test]
    fn second_send_only_writes_body() {
        let mut wire = Wire::new(Vec::new());
        Response::html("first ").send(&mut wire).unwrap();
        assert!(wire.headers_sent());

        Response::error("second", 500).with_header("X-Late", "1").send(&mut wire).unwrap();

        let out = raw(wire);
        assert!(out.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(!out.contains("X-Late"));
        assert!(!out.contains("500"));
        assert!(out.ends_with("first {\"error\":\"second\"}"));
    }

    #[test]
    fn unknown_status_has_empty_reason() {
        let mut wire = Wire::new(Vec::new());
        Response::empty(299).send(&mut wire).unwrap();
        assert_eq!(raw(wire), "HTTP/1.1 299 \r\n\r\n");
    }

    #[tokio::test]
    async fn converts_into_hyper_response() {
        let res: http::Response<Full<Bytes>> = Response::html("<b>ok</b>")
            .with_status(201)
            .with_header("X-Bad Header", "x")
            .into();

        assert_eq!(res.status(), StatusCode::CREATED);
        assert_eq!(res.headers()["content-type"], "text/html; charset=utf-8");
        assert_eq!(res.headers().len(), 1);

        let body = res.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&body[..], b"<b>ok</b>");
    }

    #[test]
    fn out_of_range_status_becomes_500() {
        let res: http::Response<Full<Bytes>> = Response::empty(42).into();
        assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
