//! Textual encoding of derived values
//!
//! Every byte string that leaves the process as text (storage names, session
//! tokens, fingerprints, the root secret in configuration) uses URL-safe base64
//! without padding, so it is safe in file names, cookies and URLs alike.

use crate::Result;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};

/// Encode bytes as URL-safe, unpadded base64
pub fn str_encode(value: impl AsRef<[u8]>) -> String {
    URL_SAFE_NO_PAD.encode(value)
}

/// Decode URL-safe, unpadded base64
pub fn str_decode(value: &str) -> Result<Vec<u8>> {
    Ok(URL_SAFE_NO_PAD.decode(value)?)
}

/// Whether `c` belongs to the URL-safe base64 alphabet
pub fn is_encoding_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '-' || c == '_'
}
