//! Body compression for stored resources.

use crate::Error;

/// zstd level used for stored bodies; 0 selects the library default.
const LEVEL: i32 = 0;

/// Compress a body for storage.
pub fn compress(body: &[u8]) -> Result<Vec<u8>, Error> {
    zstd::encode_all(body, LEVEL).map_err(|e| Error::Compression(e.to_string()))
}

/// Decompress a body previously produced by [`compress`].
pub fn decompress(stored: &[u8]) -> Result<Vec<u8>, Error> {
    zstd::decode_all(stored).map_err(|e| Error::Compression(e.to_string()))
}
