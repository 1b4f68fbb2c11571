//! Composite row identifiers
//!
//! A journal row id packs the partition index into the high bits and the
//! row's position inside that partition into the low 44 bits. `-1` stands
//! for "no rows".

/// Number of low bits holding the local row id
pub const LOCAL_ROW_BITS: u32 = 44;

/// Mask selecting the local row id
pub const LOCAL_ROW_MASK: i64 = (1i64 << LOCAL_ROW_BITS) - 1;

/// Row id of an empty journal
pub const NO_ROWS: i64 = -1;

/// Largest partition index representable in a row id
pub const MAX_PARTITION_INDEX: i64 = (1i64 << (63 - LOCAL_ROW_BITS)) - 1;

/// Combine partition index and local row id.
pub fn to_row_id(partition_index: i64, local_row_id: i64) -> i64 {
    debug_assert!((0..=MAX_PARTITION_INDEX).contains(&partition_index));
    debug_assert!((0..=LOCAL_ROW_MASK).contains(&local_row_id));
    (partition_index << LOCAL_ROW_BITS) | local_row_id
}

/// Partition index of a row id. Undefined for [`NO_ROWS`].
pub fn to_partition_index(row_id: i64) -> i64 {
    row_id >> LOCAL_ROW_BITS
}

/// Local row id of a row id. Undefined for [`NO_ROWS`].
pub fn to_local_row_id(row_id: i64) -> i64 {
    row_id & LOCAL_ROW_MASK
}

/// Highest partition index a row id references, or `None` for [`NO_ROWS`].
pub fn max_partition_index(row_id: i64) -> Option<i64> {
    if row_id < 0 {
        None
    } else {
        Some(to_partition_index(row_id))
    }
}
