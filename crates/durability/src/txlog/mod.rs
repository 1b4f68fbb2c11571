//! Transaction log
//!
//! One log per journal, stored as `<journal>/_txi`. Every commit appends one
//! frame and then advances the head recorded in the file header. Readers
//! poll the header to discover commits and load frames by address.
//!
//! Binary layouts live in [`crate::format`].

mod iter;
mod log;
mod mode;

pub use iter::{ForwardIter, TxIter};
pub use log::{TxLog, TxLogCounters};
pub use mode::TxLogMode;

/// File name of the transaction log inside a journal directory
pub const TX_LOG_FILE_NAME: &str = "_txi";
