//! Transaction log file header.
//!
//! # File Layout
//!
//! ```text
//! offset  0: magic "TXLG"(4) format_version(4) reserved(8)
//! offset 16: head slot A (32)
//! offset 48: head slot B (32)
//! offset 80: first frame
//! ```
//!
//! A head slot is `head_address(8) pin(8) txn(8) crc32(4) reserved(4)`.
//! Each head advance writes the slot picked by the parity of its new pin,
//! leaving the slot of the current head intact. Readers use the valid slot
//! with the highest pin.

use crc32fast::Hasher;

/// Magic bytes at the start of every transaction log
pub const TX_LOG_MAGIC: [u8; 4] = *b"TXLG";

/// Current file format version
pub const TX_LOG_FORMAT_VERSION: u32 = 1;

/// Size of the fixed file header
pub const FILE_HEADER_SIZE: u64 = 16;

/// Size of one head slot
pub const HEAD_SLOT_SIZE: u64 = 32;

/// Address of the first frame
pub const FIRST_FRAME_ADDRESS: u64 = FILE_HEADER_SIZE + 2 * HEAD_SLOT_SIZE;

/// File header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TxLogHeader {
    /// Magic bytes
    pub magic: [u8; 4],
    /// Format version
    pub format_version: u32,
}

impl TxLogHeader {
    /// Header for a newly created log
    pub fn new() -> Self {
        TxLogHeader {
            magic: TX_LOG_MAGIC,
            format_version: TX_LOG_FORMAT_VERSION,
        }
    }

    /// Serialize to bytes
    pub fn to_bytes(&self) -> [u8; FILE_HEADER_SIZE as usize] {
        let mut bytes = [0u8; FILE_HEADER_SIZE as usize];
        bytes[0..4].copy_from_slice(&self.magic);
        bytes[4..8].copy_from_slice(&self.format_version.to_le_bytes());
        bytes
    }

    /// Deserialize from bytes, `None` if the slice is short
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < FILE_HEADER_SIZE as usize {
            return None;
        }
        let mut magic = [0u8; 4];
        magic.copy_from_slice(&bytes[0..4]);
        let mut version = [0u8; 4];
        version.copy_from_slice(&bytes[4..8]);
        Some(TxLogHeader {
            magic,
            format_version: u32::from_le_bytes(version),
        })
    }

    /// Check magic and version
    pub fn is_valid(&self) -> bool {
        self.magic == TX_LOG_MAGIC && self.format_version == TX_LOG_FORMAT_VERSION
    }
}

impl Default for TxLogHeader {
    fn default() -> Self {
        Self::new()
    }
}

/// One head slot: where the head frame lives and which generation it is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HeadSlot {
    /// Address of the head frame, 0 for an empty log
    pub head_address: u64,
    /// Head generation
    pub pin: u64,
    /// Transaction number of the head frame
    pub txn: u64,
}

impl HeadSlot {
    /// Slot of an empty log
    pub const EMPTY: HeadSlot = HeadSlot {
        head_address: 0,
        pin: 0,
        txn: 0,
    };

    /// True if no frame has been committed
    pub fn is_empty(&self) -> bool {
        self.head_address == 0
    }

    /// File offset of the slot this head is stored in
    pub fn offset(&self) -> u64 {
        slot_offset(self.pin)
    }

    /// Serialize to bytes, CRC included
    pub fn to_bytes(&self) -> [u8; HEAD_SLOT_SIZE as usize] {
        let mut bytes = [0u8; HEAD_SLOT_SIZE as usize];
        bytes[0..8].copy_from_slice(&self.head_address.to_le_bytes());
        bytes[8..16].copy_from_slice(&self.pin.to_le_bytes());
        bytes[16..24].copy_from_slice(&self.txn.to_le_bytes());
        let crc = slot_crc(&bytes[0..24]);
        bytes[24..28].copy_from_slice(&crc.to_le_bytes());
        bytes
    }

    /// Deserialize from bytes; `None` if short or the CRC does not match.
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < HEAD_SLOT_SIZE as usize {
            return None;
        }
        let stored = u32::from_le_bytes([bytes[24], bytes[25], bytes[26], bytes[27]]);
        if stored != slot_crc(&bytes[0..24]) {
            return None;
        }
        Some(HeadSlot {
            head_address: read_u64(&bytes[0..8]),
            pin: read_u64(&bytes[8..16]),
            txn: read_u64(&bytes[16..24]),
        })
    }
}

/// File offset of the slot holding the head with the given pin.
pub fn slot_offset(pin: u64) -> u64 {
    FILE_HEADER_SIZE + (pin % 2) * HEAD_SLOT_SIZE
}

/// Pick the current head from the raw bytes of both slots.
///
/// Returns `None` when neither slot is valid.
pub fn select_head(slots: &[u8; 2 * HEAD_SLOT_SIZE as usize]) -> Option<HeadSlot> {
    let (a, b) = slots.split_at(HEAD_SLOT_SIZE as usize);
    match (HeadSlot::from_bytes(a), HeadSlot::from_bytes(b)) {
        (Some(a), Some(b)) => Some(if a.pin >= b.pin { a } else { b }),
        (Some(slot), None) | (None, Some(slot)) => Some(slot),
        (None, None) => None,
    }
}

fn slot_crc(data: &[u8]) -> u32 {
    let mut hasher = Hasher::new();
    hasher.update(data);
    hasher.finalize()
}

fn read_u64(bytes: &[u8]) -> u64 {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&bytes[..8]);
    u64::from_le_bytes(buf)
}
