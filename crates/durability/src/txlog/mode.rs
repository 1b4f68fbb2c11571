//! Transaction log access mode

/// How a [`TxLog`](super::TxLog) handle is opened.
///
/// | Mode | Creates file | May write | Recovery on open |
/// |------|--------------|-----------|------------------|
/// | Append | yes | yes | torn tail truncated |
/// | Read | no | no | none |
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxLogMode {
    /// Single writer. Creates the log if missing.
    Append,
    /// Any number of concurrent readers, each with its own cursor.
    Read,
}

impl TxLogMode {
    /// True for the writer mode
    pub fn is_append(&self) -> bool {
        matches!(self, TxLogMode::Append)
    }
}
