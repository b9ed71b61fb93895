//! Service lookup for named middleware.
//!
//! The pipeline only needs one capability from the host's dependency
//! container: turn an identifier into an instance. [`Container`] is that
//! capability. [`Services`] is a small in-memory implementation for hosts
//! that do not bring their own.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::error::{Error, ResolveError};
use crate::middleware::{Middleware, Next, Pipe};
use crate::request::Request;
use crate::response::IntoResponse;

/// A resolved service. Named middleware must resolve to a [`Pipe`] or an
/// `Arc<dyn Middleware>`.
pub type Service = Arc<dyn Any + Send + Sync>;

/// Resolves identifiers to services.
///
/// Called once per named entry per pipeline run, at the moment that entry's
/// position in the chain is reached. Implementations must tolerate repeated
/// read-only lookups.
pub trait Container: Send + Sync {
    fn resolve(&self, id: &str) -> Result<Service, ResolveError>;
}

enum Binding {
    Shared(Service),
    Factory(Box<dyn Fn() -> Service + Send + Sync>),
}

impl Binding {
    fn build(&self) -> Service {
        match self {
            Self::Shared(service) => Arc::clone(service),
            Self::Factory(factory) => factory(),
        }
    }
}

/// In-memory [`Container`].
///
/// Lookups try the exact identifier first, then fall back to an ASCII
/// case-insensitive match. A fallback that matches more than one
/// registration is ambiguous and fails.
///
/// ```rust
/// use passage::{Container, Pipe, Services};
///
/// let services = Services::new()
///     .middleware_fn("stamp", |request, next| next.run(request))
///     .instance("greeting", String::from("hello"));
///
/// assert!(services.resolve("stamp").unwrap().downcast_ref::<Pipe>().is_some());
/// assert!(services.resolve("missing").is_err());
/// ```
#[derive(Default)]
pub struct Services {
    bindings: HashMap<String, Binding>,
}

impl Services {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a shared instance. Every lookup returns the same `Arc`.
    pub fn instance<T: Any + Send + Sync>(mut self, id: &str, value: T) -> Self {
        self.bindings.insert(id.to_owned(), Binding::Shared(Arc::new(value)));
        self
    }

    /// Registers a factory. Every lookup builds a fresh instance.
    pub fn bind<T, F>(mut self, id: &str, factory: F) -> Self
    where
        T: Any + Send + Sync,
        F: Fn() -> T + Send + Sync + 'static,
    {
        let factory = move || -> Service { Arc::new(factory()) };
        self.bindings.insert(id.to_owned(), Binding::Factory(Box::new(factory)));
        self
    }

    /// Registers a middleware object under `id`.
    pub fn middleware(self, id: &str, middleware: impl Middleware) -> Self {
        self.instance(id, Pipe::layer(middleware))
    }

    /// Registers a function middleware under `id`.
    pub fn middleware_fn<F, R>(self, id: &str, f: F) -> Self
    where
        F: Fn(Request, Next<'_>) -> R + Send + Sync + 'static,
        R: IntoResponse + 'static,
    {
        self.instance(id, Pipe::func(f))
    }

    pub fn contains(&self, id: &str) -> bool {
        self.bindings.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}

impl Container for Services {
    fn resolve(&self, id: &str) -> Result<Service, ResolveError> {
        if let Some(binding) = self.bindings.get(id) {
            return Ok(binding.build());
        }

        let mut matches = self.bindings.iter().filter(|(k, _)| k.eq_ignore_ascii_case(id));
        match (matches.next(), matches.next()) {
            (Some((_, binding)), None) => Ok(binding.build()),
            (None, _) => Err(ResolveError::NotFound { id: id.to_owned() }),
            (Some(first), Some(second)) => {
                let mut candidates: Vec<String> = [first, second]
                    .into_iter()
                    .chain(matches)
                    .map(|(k, _)| k.clone())
                    .collect();
                candidates.sort();
                Err(ResolveError::Ambiguous { id: id.to_owned(), candidates })
            }
        }
    }
}

impl fmt::Debug for Services {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut ids: Vec<&str> = self.bindings.keys().map(String::as_str).collect();
        ids.sort_unstable();
        f.debug_struct("Services").field("ids", &ids).finish()
    }
}

/// Resolves `id` and downcasts it to `T`.
///
/// A service registered under `id` with a different type is reported as
/// [`Error::InvalidMiddleware`] only by the pipeline; here it is simply `None`.
pub fn resolve_as<T: Any + Send + Sync>(
    container: &dyn Container,
    id: &str,
) -> Result<Option<Arc<T>>, Error> {
    let service = container.resolve(id)?;
    Ok(service.downcast::<T>().ok())
}
