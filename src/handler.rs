//! Type erasure for plain-function middleware and destinations.
//!
//! # How function middleware is stored
//!
//! A pipeline's middleware list mixes closures of *different* types in a
//! single `Vec<Pipe>`. Rust collections can only hold one concrete type, so
//! each function is wrapped in a newtype that implements a small object-safe
//! trait, and stored behind an `Arc<dyn …>`:
//!
//! ```text
//! |req, next| next.run(req)            ← user writes this
//!        ↓ Pipe::func(f)
//! Arc::new(FnCallable::new(f))         ← heap-allocated wrapper
//!        ↓  stored as BoxedCallable = Arc<dyn ErasedCallable>
//! callable.call(req, next)             ← one vtable dispatch
//!        ↓
//! f(req, next).into_response()         ← coercion happens here, once
//! ```
//!
//! Destinations handed to [`Server::serve`](crate::Server::serve) go through
//! the same steps with a one-argument signature.

use std::any::type_name;
use std::marker::PhantomData;
use std::sync::Arc;

use crate::error::Error;
use crate::middleware::Next;
use crate::request::Request;
use crate::response::{IntoResponse, Response};

// ── Plain-function middleware ─────────────────────────────────────────────────

/// Internal dispatch interface for function middleware.
///
/// `#[doc(hidden)] pub` rather than `pub(crate)` because it appears in the
/// public [`Pipe::Func`](crate::Pipe::Func) variant.
#[doc(hidden)]
pub trait ErasedCallable {
    fn call(&self, request: Request, next: Next<'_>) -> Result<Response, Error>;
    fn name(&self) -> &'static str;
}

/// A type-erased function middleware, cheap to clone into every pipeline.
#[doc(hidden)]
pub type BoxedCallable = Arc<dyn ErasedCallable + Send + Sync + 'static>;

/// Bridges a concrete `Fn(Request, Next) -> R` to [`ErasedCallable`].
///
/// `R` is carried in the type because the closure's signature is generic
/// over `Next`'s lifetime.
pub(crate) struct FnCallable<F, R>(F, PhantomData<fn() -> R>);

impl<F, R> FnCallable<F, R> {
    pub(crate) fn new(f: F) -> Self {
        Self(f, PhantomData)
    }
}

impl<F, R> ErasedCallable for FnCallable<F, R>
where
    F: Fn(Request, Next<'_>) -> R,
    R: IntoResponse,
{
    fn call(&self, request: Request, next: Next<'_>) -> Result<Response, Error> {
        (self.0)(request, next).into_response()
    }

    fn name(&self) -> &'static str {
        type_name::<F>()
    }
}

// ── Destinations ──────────────────────────────────────────────────────────────

/// Internal dispatch interface for destinations stored by the server.
pub(crate) trait ErasedHandler {
    fn call(&self, request: Request) -> Result<Response, Error>;
}

pub(crate) type BoxedHandler = Arc<dyn ErasedHandler + Send + Sync + 'static>;

struct FnHandler<F>(F);

impl<F, R> ErasedHandler for FnHandler<F>
where
    F: Fn(Request) -> R,
    R: IntoResponse,
{
    fn call(&self, request: Request) -> Result<Response, Error> {
        (self.0)(request).into_response()
    }
}

pub(crate) fn boxed_handler<F, R>(f: F) -> BoxedHandler
where
    F: Fn(Request) -> R + Send + Sync + 'static,
    R: IntoResponse,
{
    Arc::new(FnHandler(f))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn callable_coerces_its_result() {
        let callable =
            FnCallable::<_, String>::new(|request: Request, _next: Next<'_>| request.uri().to_owned());
        let unreachable = |_request: Request| -> Result<Response, Error> { Err(Error::MissingRequest) };

        let response = callable
            .call(Request::builder().uri("/x").build(), Next::new(&unreachable))
            .unwrap();
        assert_eq!(response.content(), "/x");
        assert_eq!(response.header("Content-Type"), Some("text/html; charset=utf-8"));
    }

    #[test]
    fn handler_maps_none_to_no_content() {
        let handler = boxed_handler(|_request| None::<String>);
        assert_eq!(handler.call(Request::default()).unwrap().status(), 204);
    }
}
