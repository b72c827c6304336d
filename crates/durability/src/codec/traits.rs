//! Storage codec trait definitions.

/// Storage codec trait.
///
/// Every WAL entry payload passes through the codec before it is framed
/// and checksummed. This provides a seam for encryption-at-rest and
/// compression.
///
/// Codecs must be `Send + Sync` so the writer can live behind a shared
/// mutex.
pub trait StorageCodec: Send + Sync {
    /// Encode bytes for storage.
    fn encode(&self, data: &[u8]) -> Vec<u8>;

    /// Decode bytes from storage.
    ///
    /// Returns an error if the data cannot be decoded (e.g., decryption
    /// failure, corruption).
    fn decode(&self, data: &[u8]) -> Result<Vec<u8>, CodecError>;

    /// Unique codec identifier, the `codec` key of the database config.
    fn codec_id(&self) -> &str;
}

/// Codec errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CodecError {
    /// Unknown codec identifier.
    #[error("Unknown codec: {0}")]
    UnknownCodec(String),
}
