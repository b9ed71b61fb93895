//! Unified error type.

use std::fmt;

/// Shorthand for results produced by pipelines, handlers and middleware.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// The error type returned by passage's fallible operations.
///
/// Application-level rejections (401, 404, 422, etc.) are expressed as
/// [`Response`](crate::Response) values returned by middleware, not as
/// `Error`s. This type surfaces the failures a pipeline cannot turn into a
/// response on its own. Nothing inside the chain recovers them: every
/// variant propagates to whoever called [`Pipeline::then`](crate::Pipeline::then).
#[derive(Debug)]
pub enum Error {
    /// `then` was called without a request attached via `send`.
    MissingRequest,
    /// A named middleware entry could not be resolved by the container.
    Resolve(ResolveError),
    /// A named entry resolved to a service that is not a middleware.
    InvalidMiddleware { position: usize, id: String },
    /// A structured handler result could not be encoded as JSON.
    Serialize(serde_json::Error),
    /// Transport or socket failure.
    Io(std::io::Error),
    /// A failure raised by host code: a middleware or the destination.
    Handler(Box<dyn std::error::Error + Send + Sync>),
}

impl Error {
    /// Wraps an arbitrary host error so it can travel up the chain.
    ///
    /// ```rust
    /// use passage::Error;
    ///
    /// let err = Error::custom("token expired");
    /// assert_eq!(err.to_string(), "handler: token expired");
    /// ```
    pub fn custom(err: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self::Handler(err.into())
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingRequest => f.write_str("no request set on pipeline"),
            Self::Resolve(e) => write!(f, "resolve: {e}"),
            Self::InvalidMiddleware { position, id } => {
                write!(f, "cannot resolve middleware `{id}` at position {position}")
            }
            Self::Serialize(e) => write!(f, "json: {e}"),
            Self::Io(e) => write!(f, "io: {e}"),
            Self::Handler(e) => write!(f, "handler: {e}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Resolve(e) => Some(e),
            Self::Serialize(e) => Some(e),
            Self::Io(e) => Some(e),
            Self::Handler(e) => Some(e.as_ref()),
            Self::MissingRequest | Self::InvalidMiddleware { .. } => None,
        }
    }
}

impl From<ResolveError> for Error {
    fn from(e: ResolveError) -> Self {
        Self::Resolve(e)
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialize(e)
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

// ── ResolveError ──────────────────────────────────────────────────────────────

/// Why a [`Container`](crate::Container) could not produce a service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    /// Nothing is registered under the identifier.
    NotFound { id: String },
    /// The identifier matches more than one registration.
    Ambiguous { id: String, candidates: Vec<String> },
}

impl fmt::Display for ResolveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound { id } => write!(f, "no service registered as `{id}`"),
            Self::Ambiguous { id, candidates } => {
                write!(f, "`{id}` is ambiguous, matches: {}", candidates.join(", "))
            }
        }
    }
}

impl std::error::Error for ResolveError {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn display_names_the_failure() {
        let err = Error::InvalidMiddleware { position: 2, id: "auth".into() };
        assert_eq!(err.to_string(), "cannot resolve middleware `auth` at position 2");
        assert_eq!(Error::MissingRequest.to_string(), "no request set on pipeline");
    }

    #[test]
    fn resolve_errors_keep_their_source() {
        let err = Error::from(ResolveError::NotFound { id: "csrf".into() });
        assert_eq!(err.to_string(), "resolve: no service registered as `csrf`");
        assert!(err.source().is_some());
    }

    #[test]
    fn ambiguous_lists_candidates() {
        let err = ResolveError::Ambiguous {
            id: "auth".into(),
            candidates: vec!["Auth".into(), "AUTH".into()],
        };
        assert_eq!(err.to_string(), "`auth` is ambiguous, matches: Auth, AUTH");
    }
}
