//! Payload compression codecs.
//!
//! Every stored record carries the code of the codec that produced it, so a
//! reader never needs to know the store-level setting to decode a record.

use std::borrow::Cow;
use std::io::{Read, Write};

use crate::config::Compression;
use crate::error::{DictionaryError, Result};

/// Compress `data` with `scheme`.
pub fn compress(scheme: Compression, data: &[u8]) -> Result<Vec<u8>> {
    match scheme {
        Compression::None => Ok(data.to_vec()),
        Compression::Zlib => {
            use flate2::write::ZlibEncoder;

            let mut encoder = ZlibEncoder::new(Vec::new(), flate2::Compression::default());
            encoder
                .write_all(data)
                .and_then(|_| encoder.finish())
                .map_err(|e| DictionaryError::Codec(format!("zlib: {}", e)))
        }
        Compression::Snappy => snap::raw::Encoder::new()
            .compress_vec(data)
            .map_err(|e| DictionaryError::Codec(format!("snappy: {}", e))),
        Compression::Zstd => zstd::bulk::compress(data, zstd::DEFAULT_COMPRESSION_LEVEL)
            .map_err(|e| DictionaryError::Codec(format!("zstd: {}", e))),
    }
}

/// Reverse [`compress`] for the codec identified by `code`.
///
/// # Errors
///
/// Unknown codes and corrupt streams are [`DictionaryError::Format`].
pub fn decompress(code: u8, data: &[u8]) -> Result<Cow<'_, [u8]>> {
    let scheme = Compression::from_code(code)
        .ok_or_else(|| DictionaryError::format(format!("unknown compression code {}", code)))?;

    match scheme {
        Compression::None => Ok(Cow::Borrowed(data)),
        Compression::Zlib => {
            use flate2::read::ZlibDecoder;

            let mut out = Vec::new();
            ZlibDecoder::new(data)
                .read_to_end(&mut out)
                .map_err(|e| DictionaryError::format(format!("corrupt zlib payload: {}", e)))?;
            Ok(Cow::Owned(out))
        }
        Compression::Snappy => snap::raw::Decoder::new()
            .decompress_vec(data)
            .map(Cow::Owned)
            .map_err(|e| DictionaryError::format(format!("corrupt snappy payload: {}", e))),
        Compression::Zstd => zstd::stream::decode_all(data)
            .map(Cow::Owned)
            .map_err(|e| DictionaryError::format(format!("corrupt zstd payload: {}", e))),
    }
}
