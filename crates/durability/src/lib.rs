//! Durability layer for tickdb
//!
//! This crate owns the journal's transaction log:
//!
//! - format: frame and header byte layouts with CRC32 validation
//! - txlog: append/read/locate protocol, forward and backward iteration

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod format;
pub mod txlog;

pub use format::{
    Tx, TxFrameError, FIRST_FRAME_ADDRESS, NO_PREV_TX, TX_COMMAND_COMMIT, TX_COMMAND_ROLLBACK,
};
pub use txlog::{ForwardIter, TxIter, TxLog, TxLogCounters, TxLogMode, TX_LOG_FILE_NAME};
