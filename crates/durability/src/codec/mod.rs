//! Storage codecs
//!
//! Only the identity codec ships today. The engine records the codec id in
//! `chronicle.toml` and resolves it with [`get_codec`] on every open.

mod traits;

pub use traits::{CodecError, StorageCodec};

/// Pass-through codec
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityCodec;

impl StorageCodec for IdentityCodec {
    fn encode(&self, data: &[u8]) -> Vec<u8> {
        data.to_vec()
    }

    fn decode(&self, data: &[u8]) -> Result<Vec<u8>, CodecError> {
        Ok(data.to_vec())
    }

    fn codec_id(&self) -> &str {
        "identity"
    }
}

/// Look up a codec by its persisted id
pub fn get_codec(codec_id: &str) -> Result<Box<dyn StorageCodec>, CodecError> {
    match codec_id {
        "identity" => Ok(Box::new(IdentityCodec)),
        other => Err(CodecError::UnknownCodec(other.to_string())),
    }
}
