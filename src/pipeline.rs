//! The middleware pipeline.
//!
//! # How the chain is built
//!
//! [`Pipeline::then`] folds the middleware list **right to left** into one
//! nested function. The innermost link calls the destination and coerces its
//! return value; every middleware, starting from the last one, wraps the link
//! built so far and receives it as its [`Next`]:
//!
//! ```text
//! through([a, b, c]).then(d)
//!
//!   link_d = |req| d(req).into_response()
//!   link_c = |req| c.handle(req, Next(link_d))
//!   link_b = |req| b.handle(req, Next(link_c))
//!   link_a = |req| a.handle(req, Next(link_b))   ← called with the request
//! ```
//!
//! Calling the outermost link runs `a`, `b`, `c` in list order on the way in
//! and unwinds `c`, `b`, `a` on the way out. The first middleware sees the
//! raw request first and the finished response last.
//!
//! Named entries are resolved inside their link, so a container lookup only
//! happens if the chain actually reaches that position.

use std::sync::Arc;

use tracing::{debug, debug_span, trace};

use crate::container::{Container, Service};
use crate::error::Error;
use crate::handler::BoxedCallable;
use crate::middleware::{Middleware, Next, Pipe};
use crate::request::Request;
use crate::response::{IntoResponse, Response};

/// One link of the chain: the rest of the pipeline as a function.
type Link<'a> = Box<dyn Fn(Request) -> Result<Response, Error> + 'a>;

/// Sends a request through an ordered list of middleware to a destination.
///
/// A pipeline carries mutable configuration and runs one request at a time.
/// `then` consumes the attached request, so each run needs a fresh `send`.
///
/// ```rust
/// use std::sync::Arc;
/// use passage::{Pipe, Pipeline, Request, Response, Services};
///
/// let services = Services::new().middleware_fn("powered-by", |request, next| {
///     let mut response = next.run(request)?;
///     response.set_header("X-Powered-By", "passage");
///     Ok::<_, passage::Error>(response)
/// });
///
/// let response = Pipeline::new(Arc::new(services))
///     .send(Request::builder().uri("/hello").build())
///     .through(vec![
///         Pipe::named("powered-by"),
///         Pipe::func(|request, next| {
///             if request.path() == "/admin" {
///                 return Ok(Response::error("Forbidden", 403));
///             }
///             next.run(request)
///         }),
///     ])
///     .then(|request| format!("<p>{}</p>", request.path()))
///     .unwrap();
///
/// assert_eq!(response.content(), "<p>/hello</p>");
/// assert_eq!(response.header("x-powered-by"), Some("passage"));
/// ```
pub struct Pipeline {
    container: Arc<dyn Container>,
    pipes: Vec<Pipe>,
    request: Option<Request>,
}

impl Pipeline {
    pub fn new(container: Arc<dyn Container>) -> Self {
        Self { container, pipes: Vec::new(), request: None }
    }

    /// Attaches the request to run. Required before [`then`](Self::then).
    pub fn send(&mut self, request: Request) -> &mut Self {
        self.request = Some(request);
        self
    }

    /// Sets the middleware list, replacing any previous one.
    ///
    /// Entries are not validated here; a named entry that cannot be resolved
    /// only fails when the chain reaches it.
    pub fn through<I>(&mut self, pipes: I) -> &mut Self
    where
        I: IntoIterator,
        I::Item: Into<Pipe>,
    {
        self.pipes = pipes.into_iter().map(Into::into).collect();
        self
    }

    pub fn pipes(&self) -> &[Pipe] {
        &self.pipes
    }

    /// Runs the chain and returns the final response.
    ///
    /// Fails with [`Error::MissingRequest`] before anything runs if no
    /// request was attached. Any error raised inside the chain propagates
    /// unchanged.
    pub fn then<D, R>(&mut self, destination: D) -> Result<Response, Error>
    where
        D: Fn(Request) -> R,
        R: IntoResponse,
    {
        let request = self.request.take().ok_or(Error::MissingRequest)?;
        let _span = debug_span!("pipeline", pipes = self.pipes.len()).entered();

        let container = &*self.container;
        let innermost: Link<'_> =
            Box::new(move |request: Request| destination(request).into_response());

        let chain = self
            .pipes
            .iter()
            .enumerate()
            .rev()
            .fold(innermost, |next, (position, pipe)| link(container, position, pipe, next));

        chain(request)
    }
}

fn link<'a>(
    container: &'a dyn Container,
    position: usize,
    pipe: &'a Pipe,
    next: Link<'a>,
) -> Link<'a> {
    Box::new(move |request: Request| {
        invoke(container, position, pipe, request, Next::new(&*next))
    })
}

/// Dispatches one entry. Only function middleware results are coerced;
/// middleware objects already return a `Response`.
fn invoke(
    container: &dyn Container,
    position: usize,
    pipe: &Pipe,
    request: Request,
    next: Next<'_>,
) -> Result<Response, Error> {
    trace!(position, ?pipe, "entering middleware");

    match pipe {
        Pipe::Layer(middleware) => middleware.handle(request, next),
        Pipe::Func(callable) => callable.call(request, next),
        Pipe::Named(id) => match as_middleware(&container.resolve(id)?) {
            Some(Pipe::Layer(middleware)) => {
                debug!(%id, position, middleware = middleware.name(), "resolved middleware");
                middleware.handle(request, next)
            }
            Some(Pipe::Func(callable)) => {
                debug!(%id, position, middleware = callable.name(), "resolved middleware");
                callable.call(request, next)
            }
            Some(Pipe::Named(_)) | None => Err(Error::InvalidMiddleware { position, id: id.clone() }),
        },
    }
}

/// Accepts a resolved service that is a `Pipe`, an `Arc<dyn Middleware>` or
/// a boxed function middleware.
fn as_middleware(service: &Service) -> Option<Pipe> {
    service
        .downcast_ref::<Pipe>()
        .cloned()
        .or_else(|| service.downcast_ref::<Arc<dyn Middleware>>().cloned().map(Pipe::Layer))
        .or_else(|| service.downcast_ref::<BoxedCallable>().cloned().map(Pipe::Func))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::Services;

    fn pipeline() -> Pipeline {
        Pipeline::new(Arc::new(Services::new()))
    }

    #[test]
    fn then_without_send_fails() {
        let err = pipeline().through(["auth"]).then(|_request| "never").unwrap_err();
        assert!(matches!(err, Error::MissingRequest));
    }

    #[test]
    fn empty_list_calls_destination() {
        let response = pipeline()
            .send(Request::builder().uri("/ping").build())
            .then(|request| request.path().to_owned())
            .unwrap();
        assert_eq!(response.content(), "/ping");
        assert_eq!(response.status(), 200);
    }

    #[test]
    fn request_is_consumed_by_then() {
        let mut pipeline = pipeline();
        pipeline.send(Request::default());
        assert!(pipeline.then(|_request| ()).is_ok());
        assert!(matches!(pipeline.then(|_request| ()), Err(Error::MissingRequest)));
    }

    #[test]
    fn through_replaces_previous_list() {
        let mut pipeline = pipeline();
        pipeline.through(["a", "b"]).through(["c"]);
        assert_eq!(pipeline.pipes().len(), 1);
        assert!(matches!(&pipeline.pipes()[0], Pipe::Named(id) if id == "c"));
    }

    #[test]
    fn non_middleware_service_is_invalid() {
        let services = Services::new().instance("config", 42_u32);
        let err = Pipeline::new(Arc::new(services))
            .send(Request::default())
            .through(["config"])
            .then(|_request| "unreachable")
            .unwrap_err();
        assert!(matches!(err, Error::InvalidMiddleware { position: 0, ref id } if id == "config"));
    }

    struct Stamp;

    impl Middleware for Stamp {
        fn handle(&self, request: Request, next: Next<'_>) -> Result<Response, Error> {
            Ok(next.run(request)?.with_header("X-Stamp", "layer"))
        }
    }

    #[test]
    fn bare_middleware_object_service_is_accepted() {
        let services = Services::new().instance("stamp", Arc::new(Stamp) as Arc<dyn Middleware>);
        let response = Pipeline::new(Arc::new(services))
            .send(Request::default())
            .through(["stamp"])
            .then(|_request| "ok")
            .unwrap();
        assert_eq!(response.content(), "ok");
        assert_eq!(response.header("X-Stamp"), Some("layer"));
    }

    #[test]
    fn bare_callable_service_is_accepted() {
        let Pipe::Func(callable) = Pipe::func(|request: Request, next: Next<'_>| {
            Ok::<_, Error>(next.run(request)?.with_header("X-Stamp", "func"))
        }) else {
            unreachable!()
        };
        let services = Services::new().instance("stamp", callable);
        let response = Pipeline::new(Arc::new(services))
            .send(Request::default())
            .through(["stamp"])
            .then(|_request| "ok")
            .unwrap();
        assert_eq!(response.header("X-Stamp"), Some("func"));
    }
}
