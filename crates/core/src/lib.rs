//! Core types for tickdb
//!
//! This crate defines the foundational types used throughout the system:
//! - Error: Error taxonomy shared by the log, the channel and the engine
//! - rows: Composite row ids (partition index + local row)
//! - PartitionBy: Time partitioning granularity and partition naming

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod partition;
pub mod rows;

pub use error::{Error, Result};
pub use partition::{PartitionBy, DEFAULT_PARTITION_NAME};
