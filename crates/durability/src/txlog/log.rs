//! Transaction log handle.
//!
//! The log is append-only: frames are written past the current head and
//! never touched again. The only in-place mutation is the head slot, which
//! alternates between the two header slots so the current head always
//! survives a torn header write.

use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

use tickdb_core::{Error, Result};
use tracing::{debug, warn};

use super::iter::{ForwardIter, TxIter};
use super::mode::TxLogMode;
use super::TX_LOG_FILE_NAME;
use crate::format::{
    frame_length, select_head, HeadSlot, Tx, TxLogHeader, FILE_HEADER_SIZE, FIRST_FRAME_ADDRESS,
    HEAD_SLOT_SIZE, NO_PREV_TX,
};

/// Cumulative transaction log counters.
///
/// Never reset; they cover the lifetime of one handle.
#[derive(Debug, Clone, Default)]
pub struct TxLogCounters {
    /// Frames written by this handle
    pub frames_written: u64,
    /// Frames read by this handle
    pub frames_read: u64,
    /// Bytes of frame data written
    pub bytes_written: u64,
    /// fsync calls issued
    pub sync_calls: u64,
    /// Nanoseconds spent in fsync
    pub sync_nanos: u64,
}

/// Reader position: the last frame seen and where it ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Cursor {
    address: u64,
    end: u64,
}

impl Cursor {
    const START: Cursor = Cursor {
        address: 0,
        end: FIRST_FRAME_ADDRESS,
    };
}

/// Handle to a journal's transaction log (`<location>/_txi`).
///
/// # Protocol
///
/// - `write` appends the frame, then publishes it by writing the head slot.
///   With `force_sync` both steps are fsynced in that order.
/// - A reader learns about new commits through `has_next`, which compares
///   the head address in the header with the last frame it has seen.
/// - `head` loads the newest frame, `next` walks forward one frame at a
///   time, `transactions` walks backward along `prev_tx_address`.
///
/// One handle is not shared between threads; open one per reader.
pub struct TxLog {
    location: PathBuf,
    path: PathBuf,
    mode: TxLogMode,
    /// `None` once closed
    file: Option<File>,
    /// Authoritative for Append, last loaded for Read
    head: HeadSlot,
    /// End of the committed region (Append only)
    append_offset: u64,
    cursor: Cursor,
    counters: TxLogCounters,
    #[cfg(test)]
    fail_head_write: bool,
}

impl TxLog {
    /// Open the transaction log of the journal at `location`.
    ///
    /// Append creates the directory and file when missing and truncates any
    /// bytes past the head frame. Read requires an existing, valid log.
    pub fn open(location: impl AsRef<Path>, mode: TxLogMode) -> Result<Self> {
        let location = location.as_ref().to_path_buf();
        let path = location.join(TX_LOG_FILE_NAME);

        let file = match mode {
            TxLogMode::Append => {
                fs::create_dir_all(&location)?;
                OpenOptions::new()
                    .read(true)
                    .write(true)
                    .create(true)
                    .truncate(false)
                    .open(&path)?
            }
            TxLogMode::Read => OpenOptions::new().read(true).open(&path)?,
        };

        let mut log = TxLog {
            location,
            path,
            mode,
            file: Some(file),
            head: HeadSlot::EMPTY,
            append_offset: FIRST_FRAME_ADDRESS,
            cursor: Cursor::START,
            counters: TxLogCounters::default(),
            #[cfg(test)]
            fail_head_write: false,
        };

        match mode {
            TxLogMode::Append => log.recover()?,
            TxLogMode::Read => {
                log.check_file_header()?;
                log.head = log.load_head()?;
            }
        }

        debug!(
            target: "tickdb::txlog",
            path = %log.path.display(),
            ?mode,
            head_address = log.head.head_address,
            txn = log.head.txn,
            "Opened transaction log"
        );
        Ok(log)
    }

    /// Initialize a new file, or validate an existing one and drop its torn tail.
    fn recover(&mut self) -> Result<()> {
        let len = self.file_mut()?.metadata()?.len();
        if len == 0 {
            let mut init = Vec::with_capacity(FIRST_FRAME_ADDRESS as usize);
            init.extend_from_slice(&TxLogHeader::new().to_bytes());
            init.extend_from_slice(&HeadSlot::EMPTY.to_bytes());
            init.extend_from_slice(&[0u8; HEAD_SLOT_SIZE as usize]);
            let file = self.file_mut()?;
            write_all_at(file, 0, &init)?;
            file.sync_all()?;
            self.head = HeadSlot::EMPTY;
            self.append_offset = FIRST_FRAME_ADDRESS;
            self.cursor = Cursor::START;
            return Ok(());
        }

        self.check_file_header()?;
        let head = self.load_head()?;
        self.append_offset = if head.is_empty() {
            FIRST_FRAME_ADDRESS
        } else {
            let (tx, size) = self.read_frame_at(head.head_address)?;
            if tx.pin != head.pin || tx.txn != head.txn {
                return Err(Error::corruption(format!(
                    "head frame at {} does not match header (txn {} pin {}, expected txn {} pin {})",
                    head.head_address, tx.txn, tx.pin, head.txn, head.pin
                )));
            }
            head.head_address + size
        };
        self.head = head;
        self.cursor = Cursor {
            address: head.head_address,
            end: self.append_offset,
        };

        if len > self.append_offset {
            warn!(
                target: "tickdb::txlog",
                path = %self.path.display(),
                committed = self.append_offset,
                file_len = len,
                "Truncating uncommitted tail of transaction log"
            );
            let end = self.append_offset;
            let file = self.file_mut()?;
            file.set_len(end)?;
            file.sync_all()?;
        }
        Ok(())
    }

    /// Append a frame and make it the new head.
    ///
    /// `tx.txn` must be greater than the current head's txn. The log fills
    /// in `prev_tx_address` and `pin`. Returns the address of the new head.
    /// On error the head is unchanged.
    pub fn write(&mut self, tx: &mut Tx, force_sync: bool) -> Result<u64> {
        if !self.mode.is_append() {
            return Err(Error::invalid(format!(
                "write on read-only transaction log {}",
                self.path.display()
            )));
        }
        self.file_mut()?;
        if !self.head.is_empty() && tx.txn <= self.head.txn {
            return Err(Error::invalid(format!(
                "txn {} does not follow current txn {}",
                tx.txn, self.head.txn
            )));
        }

        tx.prev_tx_address = if self.head.is_empty() {
            NO_PREV_TX
        } else {
            self.head.head_address
        };
        tx.pin = self.head.pin + 1;

        let bytes = tx.to_bytes();
        let address = self.append_offset;
        let new_head = HeadSlot {
            head_address: address,
            pin: tx.pin,
            txn: tx.txn,
        };

        write_all_at(self.file_mut()?, address, &bytes)?;
        if force_sync {
            self.sync()?;
        }

        if let Err(e) = self.write_head_slot(&new_head, force_sync) {
            self.discard_slot(&new_head);
            return Err(e);
        }

        self.head = new_head;
        self.append_offset = address + bytes.len() as u64;
        self.cursor = Cursor {
            address,
            end: self.append_offset,
        };
        self.counters.frames_written += 1;
        self.counters.bytes_written += bytes.len() as u64;

        debug!(
            target: "tickdb::txlog",
            txn = tx.txn,
            pin = tx.pin,
            address,
            force_sync,
            "Committed transaction frame"
        );
        Ok(address)
    }

    fn write_head_slot(&mut self, slot: &HeadSlot, force_sync: bool) -> Result<()> {
        #[cfg(test)]
        if self.fail_head_write {
            return Err(Error::Io(std::io::Error::new(
                ErrorKind::Other,
                "head slot write failed",
            )));
        }
        write_all_at(self.file_mut()?, slot.offset(), &slot.to_bytes())?;
        if force_sync {
            self.sync()?;
        }
        Ok(())
    }

    /// Invalidate a head slot whose write failed so readers keep the old head.
    fn discard_slot(&mut self, slot: &HeadSlot) {
        let offset = slot.offset();
        let result = self
            .file_mut()
            .and_then(|file| write_all_at(file, offset, &[0u8; HEAD_SLOT_SIZE as usize]));
        if let Err(e) = result {
            warn!(
                target: "tickdb::txlog",
                path = %self.path.display(),
                pin = slot.pin,
                error = %e,
                "Failed to discard head slot after failed commit"
            );
        }
    }

    fn sync(&mut self) -> Result<()> {
        let start = Instant::now();
        self.file_mut()?.sync_data()?;
        self.counters.sync_calls += 1;
        self.counters.sync_nanos += start.elapsed().as_nanos() as u64;
        Ok(())
    }

    /// Load the most recent committed frame and mark it consumed.
    ///
    /// Returns `None` for an empty log.
    pub fn head(&mut self) -> Result<Option<Tx>> {
        let head = self.current_head()?;
        if head.is_empty() {
            return Ok(None);
        }
        let (tx, size) = self.read_frame_at(head.head_address)?;
        if tx.pin != head.pin {
            return Err(Error::corruption(format!(
                "frame at {} has pin {}, header says {}",
                head.head_address, tx.pin, head.pin
            )));
        }
        self.cursor = Cursor {
            address: head.head_address,
            end: head.head_address + size,
        };
        Ok(Some(tx))
    }

    /// True when a commit happened that this handle has not seen yet.
    pub fn has_next(&mut self) -> Result<bool> {
        let head = self.current_head()?;
        Ok(!head.is_empty() && head.head_address != self.cursor.address)
    }

    /// The frame after the last one seen, or `None` when caught up.
    ///
    /// A fresh reader starts before the first frame.
    pub fn next(&mut self) -> Result<Option<Tx>> {
        let head = self.current_head()?;
        if head.is_empty() || self.cursor.address == head.head_address {
            return Ok(None);
        }
        let address = self.cursor.end;
        if address > head.head_address {
            return Err(Error::corruption(format!(
                "reader position {} is past head {}",
                address, head.head_address
            )));
        }
        let (tx, size) = self.read_frame_at(address)?;
        self.cursor = Cursor {
            address,
            end: address + size,
        };
        Ok(Some(tx))
    }

    /// Move the reader position back before the first frame.
    pub fn rewind(&mut self) {
        self.cursor = Cursor::START;
    }

    /// Iterate forward from the frame at `address` up to the current head.
    ///
    /// Does not move the reader position.
    pub fn iter_from(&mut self, address: u64) -> Result<ForwardIter<'_>> {
        let head = self.current_head()?;
        if !head.is_empty() && (address < FIRST_FRAME_ADDRESS || address > head.head_address) {
            return Err(Error::invalid(format!(
                "address {} outside committed frames {}..={}",
                address, FIRST_FRAME_ADDRESS, head.head_address
            )));
        }
        let next = if head.is_empty() { None } else { Some(address) };
        Ok(ForwardIter::new(self, next, head.head_address))
    }

    /// Iterate forward over every committed frame.
    pub fn iter_all(&mut self) -> Result<ForwardIter<'_>> {
        self.iter_from(FIRST_FRAME_ADDRESS)
    }

    /// Iterate backward from the head along `prev_tx_address`.
    pub fn transactions(&mut self) -> Result<TxIter<'_>> {
        let head = self.current_head()?;
        let next = if head.is_empty() {
            None
        } else {
            Some(head.head_address)
        };
        Ok(TxIter::new(self, next))
    }

    /// Transaction number of the head, read from the header only.
    pub fn current_txn(&mut self) -> Result<Option<u64>> {
        let head = self.current_head()?;
        Ok(if head.is_empty() { None } else { Some(head.txn) })
    }

    /// Head generation, read from the header only. 0 for an empty log.
    pub fn current_txn_pin(&mut self) -> Result<u64> {
        Ok(self.current_head()?.pin)
    }

    /// Close the handle. Calling it again is a no-op.
    pub fn close(&mut self) -> Result<()> {
        if let Some(file) = self.file.take() {
            if self.mode.is_append() {
                file.sync_all()?;
            }
            debug!(
                target: "tickdb::txlog",
                path = %self.path.display(),
                mode = ?self.mode,
                "Closed transaction log"
            );
        }
        Ok(())
    }

    /// True after `close`
    pub fn is_closed(&self) -> bool {
        self.file.is_none()
    }

    /// Journal directory
    pub fn location(&self) -> &Path {
        &self.location
    }

    /// Path of the log file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Access mode
    pub fn mode(&self) -> TxLogMode {
        self.mode
    }

    /// Counters for this handle
    pub fn counters(&self) -> TxLogCounters {
        self.counters.clone()
    }

    fn file_mut(&mut self) -> Result<&mut File> {
        self.file.as_mut().ok_or_else(|| {
            Error::lifecycle(format!("transaction log {} is closed", self.path.display()))
        })
    }

    /// Head as known now: cached for the writer, reloaded for readers.
    fn current_head(&mut self) -> Result<HeadSlot> {
        self.file_mut()?;
        if !self.mode.is_append() {
            self.head = self.load_head()?;
        }
        Ok(self.head)
    }

    fn check_file_header(&mut self) -> Result<()> {
        let mut buf = [0u8; FILE_HEADER_SIZE as usize];
        read_exact_at(self.file_mut()?, 0, &mut buf)?;
        let valid = TxLogHeader::from_bytes(&buf)
            .map(|h| h.is_valid())
            .unwrap_or(false);
        if !valid {
            return Err(Error::corruption(format!(
                "{} is not a transaction log (bad magic or version)",
                self.path.display()
            )));
        }
        Ok(())
    }

    fn load_head(&mut self) -> Result<HeadSlot> {
        let mut buf = [0u8; 2 * HEAD_SLOT_SIZE as usize];
        read_exact_at(self.file_mut()?, FILE_HEADER_SIZE, &mut buf)?;
        select_head(&buf).ok_or_else(|| {
            Error::corruption(format!("{}: no valid head slot", self.path.display()))
        })
    }

    /// Read and verify the frame at `address`. Returns the frame and its size.
    pub(crate) fn read_frame_at(&mut self, address: u64) -> Result<(Tx, u64)> {
        if address < FIRST_FRAME_ADDRESS {
            return Err(Error::corruption(format!(
                "frame address {} inside file header",
                address
            )));
        }
        let file = self.file_mut()?;
        let mut len_buf = [0u8; 4];
        read_exact_at(file, address, &mut len_buf)?;
        let length = frame_length(&len_buf)?;

        let mut buf = vec![0u8; 4 + length];
        buf[..4].copy_from_slice(&len_buf);
        read_exact_at(file, address + 4, &mut buf[4..])?;
        let (tx, consumed) = Tx::from_bytes(&buf)?;
        self.counters.frames_read += 1;
        Ok((tx, consumed as u64))
    }
}

impl Drop for TxLog {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

impl std::fmt::Debug for TxLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TxLog")
            .field("path", &self.path)
            .field("mode", &self.mode)
            .field("head", &self.head)
            .field("closed", &self.file.is_none())
            .finish()
    }
}

fn write_all_at(file: &mut File, offset: u64, bytes: &[u8]) -> Result<()> {
    file.seek(SeekFrom::Start(offset))?;
    file.write_all(bytes)?;
    Ok(())
}

/// Short reads mean the file ends inside a structure that should be there.
fn read_exact_at(file: &mut File, offset: u64, buf: &mut [u8]) -> Result<()> {
    file.seek(SeekFrom::Start(offset))?;
    file.read_exact(buf).map_err(|e| {
        if e.kind() == ErrorKind::UnexpectedEof {
            Error::corruption(format!(
                "unexpected end of file reading {} bytes at {}",
                buf.len(),
                offset
            ))
        } else {
            Error::Io(e)
        }
    })
}
