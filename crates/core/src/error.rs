//! Error types for tickdb
//!
//! This module defines the error taxonomy shared by every layer.
//! We use `thiserror` for automatic `Display` and `Error` trait implementations.
//!
//! | Variant | Meaning |
//! |---------|---------|
//! | `Io` / `Corruption` | log open/read/write failures; the head never advances |
//! | `Timeout` | a bounded wait elapsed; a scheduling signal, not a fault |
//! | `HandlerFailure` | an event handler failed on one event |
//! | `LifecycleMisuse` | operation attempted before ready or after stop/close |
//! | `InvalidOperation` | caller broke a precondition |
//! | `Config` | configuration could not be parsed or validated |

use std::io;
use thiserror::Error;

/// Result type alias for tickdb operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for tickdb
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error (file open, read, write, sync)
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// On-disk data failed validation (bad magic, checksum, truncated frame)
    #[error("Data corruption: {0}")]
    Corruption(String),

    /// A bounded wait elapsed before the awaited condition held
    #[error("Timed out waiting for {0}")]
    Timeout(String),

    /// An event handler failed while processing a single event
    #[error("Handler failure: {0}")]
    HandlerFailure(String),

    /// Operation attempted in the wrong lifecycle state
    #[error("Lifecycle misuse: {0}")]
    LifecycleMisuse(String),

    /// Invalid operation or arguments
    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Create a corruption error
    pub fn corruption(msg: impl Into<String>) -> Self {
        Error::Corruption(msg.into())
    }

    /// Create a timeout error naming what was awaited
    pub fn timeout(what: impl Into<String>) -> Self {
        Error::Timeout(what.into())
    }

    /// Create a handler failure
    pub fn handler(msg: impl Into<String>) -> Self {
        Error::HandlerFailure(msg.into())
    }

    /// Create a lifecycle misuse error
    pub fn lifecycle(msg: impl Into<String>) -> Self {
        Error::LifecycleMisuse(msg.into())
    }

    /// Create an invalid operation error
    pub fn invalid(msg: impl Into<String>) -> Self {
        Error::InvalidOperation(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Error::Config(msg.into())
    }

    /// True for errors that come from the storage medium (IOFailure class)
    pub fn is_io_failure(&self) -> bool {
        matches!(self, Error::Io(_) | Error::Corruption(_))
    }

    /// True when the error is a timeout
    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::Timeout(_))
    }
}
