//! Integration tests for commit event fan-out.
//!
//! Real threads on both sides of the channel: producers publishing
//! concurrently, consumers running on `ConsumerThread`s or polled by hand.

#[path = "../common/mod.rs"]
mod common;

mod backpressure;
mod fan_out;
