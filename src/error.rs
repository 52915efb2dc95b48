/*
 * Copyright the s3-object-client contributors.
 * SPDX-License-Identifier: Apache-2.0
 */

use std::fmt;

/// A boxed error that is `Send` and `Sync`.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors returned by this library
///
/// NOTE: Display renders only the top-level message; walk `source()` for
/// the full cause chain.
#[derive(Debug)]
pub struct Error {
    kind: ErrorKind,
    context: ErrorContext,
    source: BoxError,
}

/// General categories of client errors.
#[derive(Clone, Debug, Eq, PartialEq)]
#[non_exhaustive]
pub enum ErrorKind {
    /// A caller-side precondition was violated (invalid bucket name, empty
    /// object name, expiry out of range, encryption over plain HTTP, ...)
    InvalidArgument,

    /// Unusable credentials or a signature the service rejected
    Auth,

    /// Bucket, key, upload or subresource does not exist
    NotFound,

    /// Bucket already exists/owned, bucket not empty, resource conflict
    Conflict,

    /// Connection failure, timeout, unexpected EOF, or a non-XML error
    /// response where an XML document was expected
    Transport,

    /// Malformed XML, unknown HTTP status, oversized policy document
    Protocol,

    /// Bugs escaping the categories above
    Internal,
}

/// Server-supplied context attached to an error where available.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
#[non_exhaustive]
pub struct ErrorContext {
    /// S3 error code (`NoSuchKey`, `AccessDenied`, ...)
    pub code: Option<String>,
    /// Bucket the failing request addressed
    pub bucket: Option<String>,
    /// Object key the failing request addressed
    pub key: Option<String>,
    /// `x-amz-request-id` of the failing exchange
    pub request_id: Option<String>,
    /// `x-amz-id-2` of the failing exchange
    pub host_id: Option<String>,
}

impl Error {
    /// Creates a new [`Error`] from a known kind of error as well as an
    /// arbitrary error source.
    pub fn new<E>(kind: ErrorKind, err: E) -> Error
    where
        E: Into<BoxError>,
    {
        Error {
            kind,
            context: ErrorContext::default(),
            source: err.into(),
        }
    }

    /// Returns the corresponding [`ErrorKind`] for this error.
    pub fn kind(&self) -> &ErrorKind {
        &self.kind
    }

    /// Returns server-supplied context, if any was available.
    pub fn context(&self) -> &ErrorContext {
        &self.context
    }

    /// The S3 error code carried by the service response, if any.
    pub fn code(&self) -> Option<&str> {
        self.context.code.as_deref()
    }

    pub(crate) fn with_context(mut self, context: ErrorContext) -> Error {
        self.context = context;
        self
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ErrorKind::InvalidArgument => write!(f, "invalid argument")?,
            ErrorKind::Auth => write!(f, "authentication failed")?,
            ErrorKind::NotFound => write!(f, "resource not found")?,
            ErrorKind::Conflict => write!(f, "resource conflict")?,
            ErrorKind::Transport => write!(f, "transport error")?,
            ErrorKind::Protocol => write!(f, "protocol error")?,
            ErrorKind::Internal => write!(f, "internal error")?,
        }
        if let Some(code) = &self.context.code {
            write!(f, " ({code})")?;
        }
        if let Some(bucket) = &self.context.bucket {
            write!(f, ": bucket {bucket}")?;
            if let Some(key) = &self.context.key {
                write!(f, ", key {key}")?;
            }
        }
        Ok(())
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(self.source.as_ref())
    }
}

impl From<std::io::Error> for Error {
    fn from(value: std::io::Error) -> Self {
        Self::new(ErrorKind::Transport, value)
    }
}

impl From<tokio::task::JoinError> for Error {
    fn from(value: tokio::task::JoinError) -> Self {
        Self::new(ErrorKind::Internal, value)
    }
}

impl<T> From<std::sync::PoisonError<T>> for Error
where
    T: Send + Sync + 'static,
{
    fn from(value: std::sync::PoisonError<T>) -> Self {
        Self::new(ErrorKind::Internal, value)
    }
}

pub(crate) fn invalid_argument<E>(err: E) -> Error
where
    E: Into<BoxError>,
{
    Error::new(ErrorKind::InvalidArgument, err)
}

pub(crate) fn transport<E>(err: E) -> Error
where
    E: Into<BoxError>,
{
    Error::new(ErrorKind::Transport, err)
}

pub(crate) fn protocol<E>(err: E) -> Error
where
    E: Into<BoxError>,
{
    Error::new(ErrorKind::Protocol, err)
}

pub(crate) fn internal<E>(err: E) -> Error
where
    E: Into<BoxError>,
{
    Error::new(ErrorKind::Internal, err)
}

pub(crate) fn from_kind<E>(kind: ErrorKind) -> impl FnOnce(E) -> Error
where
    E: Into<BoxError>,
{
    |err| Error::new(kind, err)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_code_and_resource() {
        let err = Error::new(ErrorKind::NotFound, "no such key").with_context(ErrorContext {
            code: Some("NoSuchKey".into()),
            bucket: Some("logs".into()),
            key: Some("2024/01/app.log".into()),
            ..Default::default()
        });
        let rendered = err.to_string();
        assert!(rendered.contains("NoSuchKey"));
        assert!(rendered.contains("logs"));
        assert!(rendered.contains("2024/01/app.log"));
    }
}
