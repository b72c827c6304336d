//! Durability layer for Chronicle
//!
//! This crate implements:
//! - Segmented write-ahead log (`wal-NNNNNN.seg`) with CRC32 framing
//! - Durability modes (Cache, Always, Standard)
//! - `WalEntry`: the logical mutations replayed on open
//! - Storage codec seam for future encryption/compression
//! - Recovery reader with torn-tail detection
//!
//! Every committed mutation of the store is one WAL record. Replaying the
//! records in order rebuilds the exact in-memory state.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod codec;
pub mod entry;
pub mod format;
pub mod wal;

pub use codec::{get_codec, CodecError, IdentityCodec, StorageCodec};
pub use entry::WalEntry;
pub use format::{SegmentHeader, WalRecord, WalRecordError, WalSegment};
pub use wal::{
    DurabilityMode, ReadStopReason, TruncateInfo, WalConfig, WalConfigError, WalCounters,
    WalReadResult, WalReader, WalReaderError, WalWriter,
};

impl From<WalReaderError> for chronicle_core::Error {
    fn from(e: WalReaderError) -> Self {
        match e {
            WalReaderError::Io(msg) => chronicle_core::Error::storage(msg),
            other => chronicle_core::Error::corruption(other.to_string()),
        }
    }
}

impl From<WalConfigError> for chronicle_core::Error {
    fn from(e: WalConfigError) -> Self {
        chronicle_core::Error::invalid_input(e.to_string())
    }
}

impl From<CodecError> for chronicle_core::Error {
    fn from(e: CodecError) -> Self {
        chronicle_core::Error::corruption(e.to_string())
    }
}
