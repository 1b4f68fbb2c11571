//! On-disk byte formats for the transaction log.
//!
//! Serialization lives here, apart from the file handling in `txlog`.
//!
//! # Module Structure
//!
//! - `tx_header`: file header and the two head slots
//! - `tx_frame`: transaction frame format

pub mod tx_frame;
pub mod tx_header;

pub use tx_frame::{
    frame_length, Tx, TxFrameError, MAX_FRAME_SIZE, MIN_BODY_SIZE, NO_PREV_TX,
    TX_COMMAND_COMMIT, TX_COMMAND_ROLLBACK,
};
pub use tx_header::{
    select_head, slot_offset, HeadSlot, TxLogHeader, FILE_HEADER_SIZE, FIRST_FRAME_ADDRESS,
    HEAD_SLOT_SIZE, TX_LOG_FORMAT_VERSION, TX_LOG_MAGIC,
};
