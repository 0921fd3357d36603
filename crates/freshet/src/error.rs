// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::{fmt, sync::Arc};

/// The opaque, cloneable error carried by [`MutationResult::Failure`][failure].
///
/// A fetch failure wraps the last error produced by the fetch operation after
/// retry exhaustion. Because failures live in the cache and are delivered to
/// every current and future subscriber, the underlying error is reference
/// counted so the result stays cheap to clone.
///
/// # Limited introspection
///
/// Other than implementing [`std::error::Error`] (with the wrapped error as
/// its [`source`][std::error::Error::source]) and checking for the
/// no-data-available sentinel via [`is_no_data`][Self::is_no_data], this type
/// provides no introspection capabilities.
///
/// [failure]: crate::MutationResult::Failure
#[derive(Debug, Clone)]
pub struct FetchError(ErrorKind);

#[derive(Debug, Clone)]
enum ErrorKind {
    Fetch(Arc<dyn std::error::Error + Send + Sync + 'static>),
    NoData,
}

impl FetchError {
    /// Wraps the error produced by a fetch operation.
    #[must_use]
    pub fn new(error: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self(ErrorKind::Fetch(Arc::new(error)))
    }

    /// The sentinel returned by a read that disabled revalidation while
    /// nothing was cached and no initial data was configured.
    pub(crate) fn no_data() -> Self {
        Self(ErrorKind::NoData)
    }

    /// Returns `true` if this is the no-data-available sentinel rather than a
    /// fetch failure.
    #[must_use]
    pub fn is_no_data(&self) -> bool {
        matches!(self.0, ErrorKind::NoData)
    }
}

impl fmt::Display for FetchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0 {
            ErrorKind::Fetch(error) => error.fmt(f),
            ErrorKind::NoData => {
                write!(f, "no cached data is available and revalidation is disabled")
            }
        }
    }
}

impl std::error::Error for FetchError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match &self.0 {
            ErrorKind::Fetch(error) => Some(error.as_ref()),
            ErrorKind::NoData => None,
        }
    }
}
