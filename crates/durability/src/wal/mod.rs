//! Segmented write-ahead log
//!
//! - `config`: WAL configuration (WalConfig, WalConfigError)
//! - `mode`: durability modes (Cache/Always/Standard)
//! - `writer`: appends records and rotates segments (WalWriter)
//! - `reader`: recovery scan with torn-tail detection (WalReader)

pub mod config;
pub mod mode;
pub mod reader;
pub mod writer;

pub use config::{WalConfig, WalConfigError};
pub use mode::DurabilityMode;
pub use reader::{ReadStopReason, TruncateInfo, WalReadResult, WalReader, WalReaderError};
pub use writer::{WalCounters, WalWriter};
