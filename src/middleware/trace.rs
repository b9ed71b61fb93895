use std::time::Instant;

use tracing::{info, warn};

use super::{Middleware, Next};
use crate::error::Error;
use crate::request::Request;
use crate::response::Response;

/// Logs method, path, status and latency for every request passing through.
///
/// Put it first in the list so the latency covers the whole chain.
#[derive(Clone, Copy, Debug, Default)]
pub struct Trace;

impl Middleware for Trace {
    fn handle(&self, request: Request, next: Next<'_>) -> Result<Response, Error> {
        let method = request.method();
        let path = request.path().to_owned();
        let started = Instant::now();

        let result = next.run(request);
        let latency_us = started.elapsed().as_micros() as u64;

        match &result {
            Ok(response) => info!(%method, %path, status = response.status(), latency_us, "request"),
            Err(e) => warn!(%method, %path, latency_us, error = %e, "request failed"),
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn passes_the_response_through() {
        let inner = |_request: Request| -> Result<Response, Error> {
            Ok(Response::html("ok").with_status(202))
        };
        let response = Trace.handle(Request::default(), Next::new(&inner)).unwrap();
        assert_eq!(response.status(), 202);
        assert_eq!(response.content(), "ok");
    }

    #[test]
    fn passes_errors_through() {
        let inner = |_request: Request| -> Result<Response, Error> { Err(Error::custom("boom")) };
        let err = Trace.handle(Request::default(), Next::new(&inner)).unwrap_err();
        assert_eq!(err.to_string(), "handler: boom");
    }
}
