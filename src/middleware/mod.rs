//! Middleware layer.
//!
//! Middleware intercepts requests and responses and is the right place for
//! cross-cutting concerns: auth checks, request validation, structured
//! tracing, header injection.
//!
//! A middleware gets the current [`Request`] and a [`Next`] continuation for
//! the rest of the chain. It can
//!
//! - run code, call `next.run(request)`, then adjust the response on the way
//!   out (a full wrap),
//! - return a response without calling `next` at all (a short-circuit:
//!   nothing further down the chain runs, the destination included),
//! - forward to `next` and return its result unchanged.
//!
//! `Next` is consumed by `run`, so the rest of the chain can run at most once
//! per middleware invocation.
//!
//! # Entry shapes
//!
//! A pipeline's middleware list holds [`Pipe`] entries, one of:
//!
//! | Variant        | Built with            | Resolved                                  |
//! |----------------|-----------------------|-------------------------------------------|
//! | `Pipe::Named`  | `"auth".into()`       | lazily, through the [`Container`](crate::Container) |
//! | `Pipe::Layer`  | [`Pipe::layer`]       | used as-is; returns a `Response`          |
//! | `Pipe::Func`   | [`Pipe::func`]        | used as-is; result coerced via [`IntoResponse`](crate::IntoResponse) |

mod trace;

use std::fmt;
use std::sync::Arc;

use crate::error::Error;
use crate::handler::{BoxedCallable, FnCallable};
use crate::request::Request;
use crate::response::{IntoResponse, Response};

pub use trace::Trace;

// ── Middleware ────────────────────────────────────────────────────────────────

/// A middleware object.
///
/// Unlike plain-function middleware, `handle` returns a [`Response`] already,
/// so its result is never coerced again.
///
/// ```rust
/// use passage::{Middleware, Next, Request, Response, Result};
///
/// struct RequireToken;
///
/// impl Middleware for RequireToken {
///     fn handle(&self, request: Request, next: Next<'_>) -> Result<Response> {
///         if request.header("Authorization").is_none() {
///             return Ok(Response::error("Unauthorized", 401));
///         }
///         next.run(request)
///     }
/// }
/// ```
pub trait Middleware: Send + Sync + 'static {
    fn handle(&self, request: Request, next: Next<'_>) -> Result<Response, Error>;

    /// Name used in logs.
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}

// ── Next ──────────────────────────────────────────────────────────────────────

/// The rest of the chain, as seen from one middleware.
pub struct Next<'a> {
    inner: &'a (dyn Fn(Request) -> Result<Response, Error> + 'a),
}

impl<'a> Next<'a> {
    pub(crate) fn new(inner: &'a (dyn Fn(Request) -> Result<Response, Error> + 'a)) -> Self {
        Self { inner }
    }

    /// Runs every remaining middleware and the destination.
    pub fn run(self, request: Request) -> Result<Response, Error> {
        (self.inner)(request)
    }
}

impl fmt::Debug for Next<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Next")
    }
}

// ── Pipe ──────────────────────────────────────────────────────────────────────

/// One entry in a pipeline's middleware list.
#[derive(Clone)]
pub enum Pipe {
    /// Identifier resolved through the container when its position runs.
    Named(String),
    /// A middleware object.
    Layer(Arc<dyn Middleware>),
    /// A plain `(Request, Next) -> impl IntoResponse` function.
    Func(BoxedCallable),
}

impl Pipe {
    pub fn named(id: impl Into<String>) -> Self {
        Self::Named(id.into())
    }

    pub fn layer(middleware: impl Middleware) -> Self {
        Self::Layer(Arc::new(middleware))
    }

    /// Wraps a function or closure.
    ///
    /// ```rust
    /// use passage::Pipe;
    ///
    /// let stamp = Pipe::func(|request, next| {
    ///     let mut response = next.run(request)?;
    ///     response.set_header("X-Frame-Options", "DENY");
    ///     Ok::<_, passage::Error>(response)
    /// });
    /// ```
    pub fn func<F, R>(f: F) -> Self
    where
        F: Fn(Request, Next<'_>) -> R + Send + Sync + 'static,
        R: IntoResponse + 'static,
    {
        Self::Func(Arc::new(FnCallable::<F, R>::new(f)))
    }
}

impl From<&str> for Pipe {
    fn from(id: &str) -> Self {
        Self::named(id)
    }
}

impl From<String> for Pipe {
    fn from(id: String) -> Self {
        Self::Named(id)
    }
}

impl From<Arc<dyn Middleware>> for Pipe {
    fn from(middleware: Arc<dyn Middleware>) -> Self {
        Self::Layer(middleware)
    }
}

impl fmt::Debug for Pipe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Named(id) => f.debug_tuple("Named").field(id).finish(),
            Self::Layer(m) => f.debug_tuple("Layer").field(&m.name()).finish(),
            Self::Func(c) => f.debug_tuple("Func").field(&c.name()).finish(),
        }
    }
}
