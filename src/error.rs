//! Error types for the embedding API

use thiserror::Error;

/// Status codes reported across the C ABI. `Ok` is zero, failures are negative.
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    Ok = 0,
    /// A script exception is pending; fetch it with `get_and_clear_last_exception`.
    PendingException = -1,
    /// An exception escaped with no pending slot to hold it.
    UncaughtException = -2,
    ScopeMismatch = -3,
    AlreadyEscaped = -4,
    NoHandleScope = -5,
    InvalidHandle = -6,
    AlreadyWrapped = -7,
    NotWrapped = -8,
    AlreadyTagged = -9,
    TypeMismatch = -10,
    InvalidArgument = -11,
    Unsupported = -12,
    EnvDestroyed = -13,
    UnknownTeardown = -14,
}

/// Failure of an environment operation.
///
/// Script exceptions are never carried here: they sit in the environment's
/// pending-exception slot and `PendingException` tells the host to fetch it.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("a JavaScript exception is pending")]
    PendingException,

    #[error("an uncaught JavaScript exception occurred")]
    UncaughtException,

    #[error("handle scope closed out of order")]
    ScopeMismatch,

    #[error("escapable handle scope already escaped a value")]
    AlreadyEscaped,

    #[error("no handle scope is open")]
    NoHandleScope,

    #[error("stale or foreign {0} handle")]
    InvalidHandle(&'static str),

    #[error("object is already wrapped")]
    AlreadyWrapped,

    #[error("object is not wrapped")]
    NotWrapped,

    #[error("object is already type tagged")]
    AlreadyTagged,

    #[error("expected {expected}")]
    TypeMismatch { expected: &'static str },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("unsupported operation: {0}")]
    Unsupported(&'static str),

    #[error("environment has been destroyed")]
    EnvDestroyed,

    #[error("unknown teardown callback")]
    UnknownTeardown,
}

impl Error {
    pub fn status(&self) -> Status {
        match self {
            Error::PendingException => Status::PendingException,
            Error::UncaughtException => Status::UncaughtException,
            Error::ScopeMismatch => Status::ScopeMismatch,
            Error::AlreadyEscaped => Status::AlreadyEscaped,
            Error::NoHandleScope => Status::NoHandleScope,
            Error::InvalidHandle(_) => Status::InvalidHandle,
            Error::AlreadyWrapped => Status::AlreadyWrapped,
            Error::NotWrapped => Status::NotWrapped,
            Error::AlreadyTagged => Status::AlreadyTagged,
            Error::TypeMismatch { .. } => Status::TypeMismatch,
            Error::InvalidArgument(_) => Status::InvalidArgument,
            Error::Unsupported(_) => Status::Unsupported,
            Error::EnvDestroyed => Status::EnvDestroyed,
            Error::UnknownTeardown => Status::UnknownTeardown,
        }
    }
}

impl Status {
    pub fn code(self) -> i32 {
        self as i32
    }
}

impl<T> From<&Result<T>> for Status {
    fn from(result: &Result<T>) -> Self {
        match result {
            Ok(_) => Status::Ok,
            Err(e) => e.status(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(Status::Ok.code(), 0);
        assert_eq!(Error::PendingException.status().code(), -1);
        assert_eq!(Error::UncaughtException.status().code(), -2);
        assert!(Error::UnknownTeardown.status().code() < -2);
    }

    #[test]
    fn test_display() {
        assert_eq!(
            Error::TypeMismatch { expected: "a function" }.to_string(),
            "expected a function"
        );
        assert_eq!(
            Error::Unsupported("create_context").to_string(),
            "unsupported operation: create_context"
        );
    }
}
