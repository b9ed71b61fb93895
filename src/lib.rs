//! # passage
//!
//! A synchronous middleware pipeline for HTTP request handling.
//!
//! A request is sent through an ordered list of middleware and finally to a
//! destination. Each middleware wraps everything after it: it may act before
//! the rest of the chain, after it, or instead of it.
//!
//! ## The contract
//!
//! - Middleware run in list order on the way in and in reverse on the way out.
//! - A middleware that does not call `next` short-circuits: nothing after it
//!   runs, the destination included.
//! - Named middleware are resolved through a [`Container`] only when the
//!   chain reaches them.
//! - Whatever the destination returns is coerced into a [`Response`] through
//!   [`IntoResponse`]: strings become HTML, maps and lists become JSON,
//!   `None` becomes `204 No Content`.
//! - Errors propagate to the caller untouched. Turning them into a status
//!   code is the host's job; [`Server`] answers with a JSON `500`.
//!
//! ## Quick start
//!
//! ```rust
//! use std::sync::Arc;
//! use passage::{Pipe, Pipeline, Request, Response, Services};
//!
//! let services = Services::new().middleware_fn("auth", |request, next| {
//!     if request.header("Authorization").is_none() {
//!         return Ok(Response::error("Unauthorized", 401));
//!     }
//!     next.run(request)
//! });
//!
//! let request = Request::builder()
//!     .uri("/users?page=2")
//!     .header("Authorization", "Bearer t0k3n")
//!     .build();
//!
//! let response = Pipeline::new(Arc::new(services))
//!     .send(request)
//!     .through([Pipe::named("auth")])
//!     .then(|request| serde_json::json!({ "page": request.int("page", 1) }))
//!     .unwrap();
//!
//! assert_eq!(response.status(), 200);
//! assert_eq!(response.content(), r#"{"page":2}"#);
//! ```
//!
//! Serving over HTTP is one more step, see [`Server`].

mod container;
mod error;
mod handler;
mod pipeline;
mod request;
mod response;
mod server;
mod transport;

pub mod middleware;
pub mod sanitize;

pub use container::{Container, Service, Services, resolve_as};
pub use error::{Error, ResolveError, Result};
pub use middleware::{Middleware, Next, Pipe, Trace};
pub use pipeline::Pipeline;
pub use request::{FileUpload, Params, Request, RequestBuilder};
pub use response::{ContentType, IntoResponse, Json, Response};
pub use server::Server;
pub use transport::{Transport, Wire};
