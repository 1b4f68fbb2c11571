//! Iteration over committed frames.

use tickdb_core::{Error, Result};

use super::log::TxLog;
use crate::format::{Tx, NO_PREV_TX};

/// Walks backward from the head along `prev_tx_address`.
///
/// Yields the head first and stops after the frame whose
/// `prev_tx_address` is [`NO_PREV_TX`]. Stops after the first error.
pub struct TxIter<'a> {
    log: &'a mut TxLog,
    next: Option<u64>,
}

impl<'a> TxIter<'a> {
    pub(crate) fn new(log: &'a mut TxLog, start: Option<u64>) -> Self {
        TxIter { log, next: start }
    }
}

impl Iterator for TxIter<'_> {
    type Item = Result<Tx>;

    fn next(&mut self) -> Option<Self::Item> {
        let address = self.next.take()?;
        let tx = match self.log.read_frame_at(address) {
            Ok((tx, _)) => tx,
            Err(e) => return Some(Err(e)),
        };
        if tx.prev_tx_address != NO_PREV_TX {
            // frames only ever point backward; anything else is a cycle
            if tx.prev_tx_address >= address {
                return Some(Err(Error::corruption(format!(
                    "frame at {} links forward to {}",
                    address, tx.prev_tx_address
                ))));
            }
            self.next = Some(tx.prev_tx_address);
        }
        Some(Ok(tx))
    }
}

/// Walks forward frame by frame from a start address to the head captured
/// when the iterator was created.
pub struct ForwardIter<'a> {
    log: &'a mut TxLog,
    next: Option<u64>,
    head_address: u64,
}

impl<'a> ForwardIter<'a> {
    pub(crate) fn new(log: &'a mut TxLog, start: Option<u64>, head_address: u64) -> Self {
        ForwardIter {
            log,
            next: start,
            head_address,
        }
    }
}

impl Iterator for ForwardIter<'_> {
    type Item = Result<Tx>;

    fn next(&mut self) -> Option<Self::Item> {
        let address = self.next.take()?;
        if address > self.head_address {
            return Some(Err(Error::corruption(format!(
                "frame boundary {} skipped past head {}",
                address, self.head_address
            ))));
        }
        match self.log.read_frame_at(address) {
            Ok((tx, size)) => {
                if address != self.head_address {
                    self.next = Some(address + size);
                }
                Some(Ok(tx))
            }
            Err(e) => Some(Err(e)),
        }
    }
}
