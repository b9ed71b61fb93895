//! hyper host adapter and graceful shutdown.
//!
//! The pipeline itself never touches a socket. This module is the thin layer
//! that does: it captures each inbound `http::Request` into a [`Request`],
//! runs it through a fresh [`Pipeline`], and hands the [`Response`] back to
//! hyper. One pipeline per request keeps the "one request in flight per
//! pipeline" rule without any locking.
//!
//! # Graceful shutdown
//!
//! On **SIGTERM** or Ctrl-C the server:
//! 1. Stops calling `listener.accept()`, so no new connections are made.
//! 2. Lets every in-flight connection task run to completion.
//! 3. Returns from [`Server::serve`], which lets `main` exit cleanly.

use std::collections::HashMap;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use http::header::CONTENT_TYPE;
use http::request::Parts;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as ConnBuilder;
use serde_json::Value;
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

use crate::container::{Container, Services};
use crate::error::Error;
use crate::handler::{BoxedHandler, boxed_handler};
use crate::middleware::Pipe;
use crate::pipeline::Pipeline;
use crate::request::{Params, Request, decode_form, header_key};
use crate::response::{IntoResponse, Response};

/// Serves a middleware list and a destination over HTTP/1.1 and HTTP/2.
///
/// ```rust,no_run
/// use passage::{Pipe, Server, Services, Trace};
///
/// #[tokio::main]
/// async fn main() -> Result<(), passage::Error> {
///     Server::bind("0.0.0.0:3000")
///         .container(Services::new())
///         .through([Pipe::layer(Trace)])
///         .serve(|request| format!("<h1>{}</h1>", request.path()))
///         .await
/// }
/// ```
pub struct Server {
    addr: SocketAddr,
    container: Arc<dyn Container>,
    pipes: Vec<Pipe>,
}

/// Everything a connection task needs to answer requests.
struct App {
    container: Arc<dyn Container>,
    pipes: Vec<Pipe>,
    destination: BoxedHandler,
}

impl Server {
    /// A server for `addr`, with an empty [`Services`] container and no
    /// middleware. Nothing is bound until [`serve`](Server::serve).
    ///
    /// # Panics
    ///
    /// Panics if `addr` is not a valid `host:port` string.
    pub fn bind(addr: &str) -> Self {
        let addr: SocketAddr = addr.parse().expect("invalid socket address");
        Self { addr, container: Arc::new(Services::new()), pipes: Vec::new() }
    }

    /// The container named middleware entries are resolved from.
    pub fn container(mut self, container: impl Container + 'static) -> Self {
        self.container = Arc::new(container);
        self
    }

    /// The middleware every request is sent through, outermost first.
    pub fn through<I>(mut self, pipes: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<Pipe>,
    {
        self.pipes = pipes.into_iter().map(Into::into).collect();
        self
    }

    /// Starts accepting connections and dispatching them to `destination`.
    ///
    /// Resolves once a shutdown signal has arrived and every open
    /// connection has finished. Fails only if the address cannot be bound.
    pub async fn serve<F, R>(self, destination: F) -> Result<(), Error>
    where
        F: Fn(Request) -> R + Send + Sync + 'static,
        R: IntoResponse + 'static,
    {
        let listener = TcpListener::bind(self.addr).await?;

        let app = Arc::new(App {
            container: self.container,
            pipes: self.pipes,
            destination: boxed_handler(destination),
        });

        info!(addr = %self.addr, middleware = app.pipes.len(), "passage listening");

        let mut tasks = tokio::task::JoinSet::new();

        let shutdown = shutdown_signal();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                // Check shutdown first so a SIGTERM stops accepting at once,
                // even if more connections are queued.
                biased;

                () = &mut shutdown => {
                    info!(in_flight = tasks.len(), "shutdown signal received, draining connections");
                    break;
                }

                res = listener.accept() => {
                    let (stream, remote_addr) = match res {
                        Ok(v) => v,
                        Err(e) => {
                            error!("accept error: {e}");
                            continue;
                        }
                    };

                    let app = Arc::clone(&app);
                    let io = TokioIo::new(stream);

                    tasks.spawn(async move {
                        let svc = service_fn(move |req| {
                            let app = Arc::clone(&app);
                            async move { dispatch(app, req, remote_addr).await }
                        });

                        if let Err(e) = ConnBuilder::new(TokioExecutor::new())
                            .serve_connection(io, svc)
                            .await
                        {
                            error!(peer = %remote_addr, "connection error: {e}");
                        }
                    });
                }

                // Finished connections are reaped as they complete.
                Some(_) = tasks.join_next(), if !tasks.is_empty() => {}
            }
        }

        while tasks.join_next().await.is_some() {}

        info!("passage stopped");
        Ok(())
    }
}

// ── Request dispatch ──────────────────────────────────────────────────────────

/// Reads the body, then answers synchronously. Never fails towards hyper:
/// unreadable bodies become `400`, pipeline errors become `500`.
async fn dispatch(
    app: Arc<App>,
    req: hyper::Request<Incoming>,
    remote_addr: SocketAddr,
) -> Result<http::Response<Full<Bytes>>, Infallible> {
    let (parts, body) = req.into_parts();

    let body = match body.collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) => {
            warn!(peer = %remote_addr, "failed to read request body: {e}");
            return Ok(Response::error("Bad Request", 400).into());
        }
    };

    let request = capture(&parts, &body, remote_addr);
    Ok(respond(&app, request).into())
}

/// Runs one request through a fresh pipeline. The host-side policy for
/// errors lives here: log, then answer with a JSON `500`.
fn respond(app: &App, request: Request) -> Response {
    let result = Pipeline::new(Arc::clone(&app.container))
        .send(request)
        .through(app.pipes.iter().cloned())
        .then(|request| app.destination.call(request));

    result.unwrap_or_else(|e| {
        error!(error = %e, "pipeline failed");
        Response::error("Internal Server Error", 500)
    })
}

// ── Request capture ───────────────────────────────────────────────────────────

/// Builds a [`Request`] from hyper's parts and the collected body.
///
/// Query strings and `application/x-www-form-urlencoded` bodies are decoded
/// into string values (the last occurrence of a repeated key wins); JSON
/// object bodies keep their value types. Multipart bodies are not decoded.
fn capture(parts: &Parts, body: &[u8], remote_addr: SocketAddr) -> Request {
    let query_string = parts.uri.query().unwrap_or("");
    let content_type = parts
        .headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");

    let body = if content_type.starts_with("application/x-www-form-urlencoded") {
        decode_form(&String::from_utf8_lossy(body))
    } else if content_type.starts_with("application/json") && !body.is_empty() {
        serde_json::from_slice::<Params>(body).unwrap_or_else(|e| {
            debug!("ignoring non-object JSON body: {e}");
            Params::new()
        })
    } else {
        Params::new()
    };

    let mut server = Params::new();
    let mut set = |key: &str, value: String| {
        server.insert(key.to_owned(), Value::String(value));
    };
    set("REQUEST_METHOD", parts.method.as_str().to_owned());
    set(
        "REQUEST_URI",
        parts.uri.path_and_query().map_or_else(|| "/".to_owned(), |pq| pq.as_str().to_owned()),
    );
    set("QUERY_STRING", query_string.to_owned());
    set("SERVER_PROTOCOL", format!("{:?}", parts.version));
    set("REMOTE_ADDR", remote_addr.ip().to_string());

    for name in parts.headers.keys() {
        let values: Vec<&str> = parts
            .headers
            .get_all(name)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .collect();
        if values.is_empty() {
            continue;
        }
        set(&header_key(name.as_str()), values.join(", "));
    }

    Request::new(decode_form(query_string), body, HashMap::new(), server)
}

// ── Shutdown signal ───────────────────────────────────────────────────────────

/// Resolves on the first shutdown signal the process receives: SIGTERM or
/// SIGINT on Unix, Ctrl-C elsewhere.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("failed to listen for Ctrl-C: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let sigterm = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let sigterm = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c   => {}
        () = sigterm  => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middleware::Next;
    use serde_json::json;

    fn parts(method: &str, uri: &str, headers: &[(&str, &str)]) -> Parts {
        let mut builder = http::Request::builder().method(method).uri(uri);
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        builder.body(()).unwrap().into_parts().0
    }

    fn remote() -> SocketAddr {
        "10.0.0.7:5000".parse().unwrap()
    }

    #[test]
    fn captures_form_posts() {
        let parts = parts(
            "POST",
            "/users?page=2&sort=name",
            &[
                ("content-type", "application/x-www-form-urlencoded"),
                ("x-requested-with", "XMLHttpRequest"),
            ],
        );
        let request = capture(&parts, b"name=alice+smith&age=30", remote());

        assert!(request.is_post());
        assert!(request.is_ajax());
        assert_eq!(request.path(), "/users");
        assert_eq!(request.uri(), "/users?page=2&sort=name");
        assert_eq!(request.query("page"), Some(&json!("2")));
        assert_eq!(request.text("name", ""), "alice smith");
        assert_eq!(request.int("age", 0), 30);
        assert_eq!(request.ip(), "10.0.0.7");
        assert_eq!(request.header("Content-Type"), Some("application/x-www-form-urlencoded"));
        assert_eq!(request.server("SERVER_PROTOCOL"), Some(&json!("HTTP/1.1")));
    }

    #[test]
    fn captures_json_objects() {
        let parts = parts("PUT", "/items/9", &[("content-type", "application/json")]);
        let request = capture(&parts, br#"{"qty": 3, "gift": true}"#, remote());
        assert_eq!(request.int("qty", 0), 3);
        assert!(request.bool("gift", false));

        let request = capture(&parts, b"[1, 2]", remote());
        assert!(request.all().is_empty());
    }

    #[test]
    fn repeated_headers_are_joined() {
        let parts = parts("GET", "/", &[("accept", "text/html"), ("accept", "application/json")]);
        let request = capture(&parts, b"", remote());
        assert_eq!(request.header("accept"), Some("text/html, application/json"));
    }

    fn app(pipes: Vec<Pipe>) -> App {
        App {
            container: Arc::new(Services::new()),
            pipes,
            destination: boxed_handler(|request: Request| json!({ "path": request.path() })),
        }
    }

    #[test]
    fn respond_runs_the_pipeline() {
        let stamp = Pipe::func(|request: Request, next: Next<'_>| {
            let mut response = next.run(request)?;
            response.set_header("X-Stamp", "1");
            Ok::<_, Error>(response)
        });
        let response = respond(&app(vec![stamp]), Request::builder().uri("/a").build());

        assert_eq!(response.status(), 200);
        assert_eq!(response.content(), r#"{"path":"/a"}"#);
        assert_eq!(response.header("X-Stamp"), Some("1"));
    }

    #[test]
    fn respond_turns_errors_into_500() {
        let response = respond(&app(vec![Pipe::named("missing")]), Request::default());
        assert_eq!(response.status(), 500);
        assert_eq!(response.content(), r#"{"error":"Internal Server Error"}"#);
    }
}
