//! Integration tests for the journal.
//!
//! A writer commits through the transaction log and the commit channel;
//! independent readers and the partition cleaner observe it from their own
//! log handles.

#[path = "../common/mod.rs"]
mod common;

mod cleaner;
mod purge_properties;
mod writer_log;
