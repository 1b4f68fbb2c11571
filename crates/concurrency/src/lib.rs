//! Concurrency layer for tickdb
//!
//! This crate fans commit notifications out from writers to consumers:
//! - CommitEventChannel: bounded ring buffer with one cursor per consumer
//! - EventProcessor: drives a handler over a consumer's unread events
//! - ConsumerThread: runs a processor on a dedicated thread
//! - Latch: one-shot started/stopped signals

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod channel;
pub mod consumer;
pub mod handler;
pub mod latch;
pub mod processor;

pub use channel::{
    Availability, CommitEvent, CommitEventChannel, ConsumerCursor, DEFAULT_CAPACITY,
    DEFAULT_WAIT_TIMEOUT,
};
pub use consumer::ConsumerThread;
pub use handler::CommitEventHandler;
pub use latch::Latch;
pub use processor::{EventProcessor, ProcessorCounters};
