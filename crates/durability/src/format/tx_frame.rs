//! Transaction frame format.
//!
//! One frame is appended to the transaction log per committed transaction.
//!
//! # Frame Layout
//!
//! ```text
//! ┌─────────────────┬──────────────────────────────┬──────────┐
//! │ Length (4 bytes)│ Body (variable)              │ CRC32 (4)│
//! └─────────────────┴──────────────────────────────┴──────────┘
//!
//! Body (little-endian):
//! txn(8) prev_tx_address(8) pin(8) command(4) journal_max_row_id(8)
//! lag_size(4) lag_name(i32 len, -1 = none, UTF-8) timestamp(8)
//! last_partition_timestamp(8)
//! symbol_table_sizes(u32 count + i32 each)
//! symbol_table_index_pointers(u32 count + i64 each)
//! index_pointers(u32 count + i64 each)
//! lag_index_pointers(u32 count + i64 each)
//! ```
//!
//! The length field covers body + CRC. The CRC covers the body only.

use crc32fast::Hasher;
use tickdb_core::rows::NO_ROWS;

/// `prev_tx_address` of the first frame in a log
pub const NO_PREV_TX: u64 = 0;

/// Ordinary commit
pub const TX_COMMAND_COMMIT: i32 = 0;

/// Rollback marker written when a writer discards uncommitted work
pub const TX_COMMAND_ROLLBACK: i32 = 1;

/// Upper bound on a single frame (length field sanity check)
pub const MAX_FRAME_SIZE: usize = 64 * 1024 * 1024;

/// Size of the fixed part of a frame body (no strings, empty arrays)
pub const MIN_BODY_SIZE: usize = 8 + 8 + 8 + 4 + 8 + 4 + 4 + 8 + 8 + 4 * 4;

/// A transaction frame.
///
/// `prev_tx_address` and `pin` are assigned by the log on write; whatever the
/// caller put there is overwritten.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tx {
    /// Transaction number, strictly increasing across the log
    pub txn: u64,
    /// Address of the previous committed frame ([`NO_PREV_TX`] for the first)
    pub prev_tx_address: u64,
    /// Head generation at which this frame became head
    pub pin: u64,
    /// Kind of transaction ([`TX_COMMAND_COMMIT`], [`TX_COMMAND_ROLLBACK`], ...)
    pub command: i32,
    /// Highest composite row id visible as of this transaction
    pub journal_max_row_id: i64,
    /// Row count of the lag partition
    pub lag_size: i32,
    /// Directory name of the lag partition, if any
    pub lag_name: Option<String>,
    /// Commit time (ms since epoch)
    pub timestamp: i64,
    /// Interval start of the most recent partition (ms since epoch)
    pub last_partition_timestamp: i64,
    /// Symbol table sizes, one per symbol column
    pub symbol_table_sizes: Vec<i32>,
    /// Symbol table index pointers
    pub symbol_table_index_pointers: Vec<i64>,
    /// Secondary index pointers of the last partition
    pub index_pointers: Vec<i64>,
    /// Secondary index pointers of the lag partition
    pub lag_index_pointers: Vec<i64>,
}

impl Default for Tx {
    fn default() -> Self {
        Tx {
            txn: 0,
            prev_tx_address: NO_PREV_TX,
            pin: 0,
            command: TX_COMMAND_COMMIT,
            journal_max_row_id: NO_ROWS,
            lag_size: 0,
            lag_name: None,
            timestamp: 0,
            last_partition_timestamp: 0,
            symbol_table_sizes: Vec::new(),
            symbol_table_index_pointers: Vec::new(),
            index_pointers: Vec::new(),
            lag_index_pointers: Vec::new(),
        }
    }
}

impl Tx {
    /// Create an empty commit frame for `txn`.
    pub fn new(txn: u64) -> Self {
        Tx {
            txn,
            ..Default::default()
        }
    }

    /// True if this frame marks a rollback
    pub fn is_rollback(&self) -> bool {
        self.command == TX_COMMAND_ROLLBACK
    }

    fn body_len(&self) -> usize {
        MIN_BODY_SIZE
            + self.lag_name.as_ref().map(|n| n.len()).unwrap_or(0)
            + self.symbol_table_sizes.len() * 4
            + (self.symbol_table_index_pointers.len()
                + self.index_pointers.len()
                + self.lag_index_pointers.len())
                * 8
    }

    /// Serialize the frame (length prefix, body, CRC).
    pub fn to_bytes(&self) -> Vec<u8> {
        let body_len = self.body_len();
        let mut out = Vec::with_capacity(4 + body_len + 4);
        out.extend_from_slice(&((body_len + 4) as u32).to_le_bytes());

        out.extend_from_slice(&self.txn.to_le_bytes());
        out.extend_from_slice(&self.prev_tx_address.to_le_bytes());
        out.extend_from_slice(&self.pin.to_le_bytes());
        out.extend_from_slice(&self.command.to_le_bytes());
        out.extend_from_slice(&self.journal_max_row_id.to_le_bytes());
        out.extend_from_slice(&self.lag_size.to_le_bytes());
        match &self.lag_name {
            Some(name) => {
                out.extend_from_slice(&(name.len() as i32).to_le_bytes());
                out.extend_from_slice(name.as_bytes());
            }
            None => out.extend_from_slice(&(-1i32).to_le_bytes()),
        }
        out.extend_from_slice(&self.timestamp.to_le_bytes());
        out.extend_from_slice(&self.last_partition_timestamp.to_le_bytes());

        out.extend_from_slice(&(self.symbol_table_sizes.len() as u32).to_le_bytes());
        for v in &self.symbol_table_sizes {
            out.extend_from_slice(&v.to_le_bytes());
        }
        for array in [
            &self.symbol_table_index_pointers,
            &self.index_pointers,
            &self.lag_index_pointers,
        ] {
            out.extend_from_slice(&(array.len() as u32).to_le_bytes());
            for v in array {
                out.extend_from_slice(&v.to_le_bytes());
            }
        }

        let crc = compute_crc(&out[4..]);
        out.extend_from_slice(&crc.to_le_bytes());
        out
    }

    /// Deserialize a frame.
    ///
    /// Returns (frame, bytes_consumed) on success.
    pub fn from_bytes(bytes: &[u8]) -> Result<(Self, usize), TxFrameError> {
        let length = frame_length(bytes)?;
        if bytes.len() < 4 + length {
            return Err(TxFrameError::InsufficientData);
        }

        let body = &bytes[4..4 + length - 4];
        let stored_crc = read_u32(&bytes[4 + length - 4..4 + length]);
        let computed_crc = compute_crc(body);
        if stored_crc != computed_crc {
            return Err(TxFrameError::ChecksumMismatch {
                expected: stored_crc,
                computed: computed_crc,
            });
        }

        let mut d = BodyDecoder { body, pos: 0 };
        let txn = d.u64()?;
        let prev_tx_address = d.u64()?;
        let pin = d.u64()?;
        let command = d.i32()?;
        let journal_max_row_id = d.i64()?;
        let lag_size = d.i32()?;
        let lag_name = d.string()?;
        let timestamp = d.i64()?;
        let last_partition_timestamp = d.i64()?;

        let n = d.count(4)?;
        let mut symbol_table_sizes = Vec::with_capacity(n);
        for _ in 0..n {
            symbol_table_sizes.push(d.i32()?);
        }
        let symbol_table_index_pointers = d.i64_array()?;
        let index_pointers = d.i64_array()?;
        let lag_index_pointers = d.i64_array()?;

        if d.pos != body.len() {
            return Err(TxFrameError::InvalidFormat("trailing bytes in frame body"));
        }

        let tx = Tx {
            txn,
            prev_tx_address,
            pin,
            command,
            journal_max_row_id,
            lag_size,
            lag_name,
            timestamp,
            last_partition_timestamp,
            symbol_table_sizes,
            symbol_table_index_pointers,
            index_pointers,
            lag_index_pointers,
        };
        Ok((tx, 4 + length))
    }
}

/// Read and validate the length field of a serialized frame.
///
/// Returns the number of bytes following the length field (body + CRC).
pub fn frame_length(bytes: &[u8]) -> Result<usize, TxFrameError> {
    if bytes.len() < 4 {
        return Err(TxFrameError::InsufficientData);
    }
    let length = read_u32(&bytes[0..4]) as usize;
    if length < MIN_BODY_SIZE + 4 {
        return Err(TxFrameError::InvalidFormat("frame shorter than fixed body"));
    }
    if length > MAX_FRAME_SIZE {
        return Err(TxFrameError::InvalidFormat("frame length exceeds limit"));
    }
    Ok(length)
}

fn compute_crc(data: &[u8]) -> u32 {
    let mut hasher = Hasher::new();
    hasher.update(data);
    hasher.finalize()
}

fn read_u32(bytes: &[u8]) -> u32 {
    let mut buf = [0u8; 4];
    buf.copy_from_slice(&bytes[..4]);
    u32::from_le_bytes(buf)
}

struct BodyDecoder<'a> {
    body: &'a [u8],
    pos: usize,
}

impl<'a> BodyDecoder<'a> {
    fn take(&mut self, n: usize) -> Result<&'a [u8], TxFrameError> {
        if self.body.len() - self.pos < n {
            return Err(TxFrameError::InvalidFormat("field runs past end of frame"));
        }
        let slice = &self.body[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn u64(&mut self) -> Result<u64, TxFrameError> {
        let mut buf = [0u8; 8];
        buf.copy_from_slice(self.take(8)?);
        Ok(u64::from_le_bytes(buf))
    }

    fn i64(&mut self) -> Result<i64, TxFrameError> {
        let mut buf = [0u8; 8];
        buf.copy_from_slice(self.take(8)?);
        Ok(i64::from_le_bytes(buf))
    }

    fn i32(&mut self) -> Result<i32, TxFrameError> {
        let mut buf = [0u8; 4];
        buf.copy_from_slice(self.take(4)?);
        Ok(i32::from_le_bytes(buf))
    }

    /// Element count of an array, checked against the bytes left.
    fn count(&mut self, elem_size: usize) -> Result<usize, TxFrameError> {
        let n = read_u32(self.take(4)?) as usize;
        if n.saturating_mul(elem_size) > self.body.len() - self.pos {
            return Err(TxFrameError::InvalidFormat("array count exceeds frame"));
        }
        Ok(n)
    }

    fn i64_array(&mut self) -> Result<Vec<i64>, TxFrameError> {
        let n = self.count(8)?;
        let mut out = Vec::with_capacity(n);
        for _ in 0..n {
            out.push(self.i64()?);
        }
        Ok(out)
    }

    fn string(&mut self) -> Result<Option<String>, TxFrameError> {
        let len = self.i32()?;
        if len < 0 {
            return Ok(None);
        }
        let bytes = self.take(len as usize)?;
        String::from_utf8(bytes.to_vec())
            .map(Some)
            .map_err(|_| TxFrameError::InvalidFormat("lag name is not UTF-8"))
    }
}

/// Frame parsing errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TxFrameError {
    /// Not enough data to parse the frame
    #[error("Insufficient data to parse frame")]
    InsufficientData,

    /// Frame layout is invalid
    #[error("Invalid frame format: {0}")]
    InvalidFormat(&'static str),

    /// Checksum verification failed
    #[error("Checksum mismatch: expected {expected:08x}, computed {computed:08x}")]
    ChecksumMismatch {
        /// Checksum stored in the frame
        expected: u32,
        /// Checksum computed over the body
        computed: u32,
    },
}

impl From<TxFrameError> for tickdb_core::Error {
    fn from(e: TxFrameError) -> Self {
        tickdb_core::Error::corruption(e.to_string())
    }
}
