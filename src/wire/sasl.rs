//! SASL payload encoding for `AUTHENTICATE`.
//!
//! Responses are base64-encoded and split into 400-character lines. A
//! response whose encoding is an exact multiple of 400 characters (including
//! the empty response) is terminated by an `AUTHENTICATE +` line.

use base64::{engine::general_purpose::STANDARD, Engine as _};

use crate::error::SaslError;

/// Maximum base64 characters carried by one `AUTHENTICATE` line.
pub const SASL_CHUNK_SIZE: usize = 400;

/// Encode bytes as standard base64.
pub fn encode_base64(data: &[u8]) -> String {
    STANDARD.encode(data)
}

/// Decode one complete challenge. `+` is the empty challenge.
pub fn decode_base64(encoded: &str) -> Result<Vec<u8>, SaslError> {
    if encoded == "+" {
        return Ok(Vec::new());
    }
    Ok(STANDARD.decode(encoded)?)
}

/// Split an already-encoded payload into `AUTHENTICATE` parameters.
pub fn chunk_encoded(encoded: &str) -> Vec<String> {
    if encoded.is_empty() {
        return vec!["+".to_owned()];
    }

    // base64 output is ASCII, so byte chunks are char boundaries.
    let mut chunks: Vec<String> = encoded
        .as_bytes()
        .chunks(SASL_CHUNK_SIZE)
        .map(|chunk| String::from_utf8_lossy(chunk).into_owned())
        .collect();

    if encoded.len() % SASL_CHUNK_SIZE == 0 {
        chunks.push("+".to_owned());
    }
    chunks
}

/// Encode a raw mechanism response into `AUTHENTICATE` parameters.
pub fn authenticate_chunks(response: &[u8]) -> Vec<String> {
    chunk_encoded(&encode_base64(response))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_response_is_plus() {
        assert_eq!(authenticate_chunks(b""), vec!["+"]);
    }

    #[test]
    fn test_short_response_single_chunk() {
        let chunks = authenticate_chunks(b"\0user\0pass");
        assert_eq!(chunks, vec!["AHVzZXIAcGFzcw=="]);
    }

    #[test]
    fn test_thousand_byte_response() {
        // 1000 bytes encode to 1336 characters: 400, 400, 400, 136.
        let chunks = authenticate_chunks(&[0x41; 1000]);
        let lengths: Vec<usize> = chunks.iter().map(String::len).collect();
        assert_eq!(lengths, vec![400, 400, 400, 136]);
        assert_ne!(chunks.last().map(String::as_str), Some("+"));
    }

    #[test]
    fn test_chunk_thousand_encoded_chars() {
        let encoded = "A".repeat(1000);
        let lengths: Vec<usize> = chunk_encoded(&encoded).iter().map(String::len).collect();
        assert_eq!(lengths, vec![400, 400, 200]);
    }

    #[test]
    fn test_exact_multiple_gets_terminator() {
        // 300 bytes encode to exactly 400 characters.
        let chunks = authenticate_chunks(&[7u8; 300]);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].len(), 400);
        assert_eq!(chunks[1], "+");

        let chunks = authenticate_chunks(&[7u8; 600]);
        let lengths: Vec<usize> = chunks.iter().map(String::len).collect();
        assert_eq!(lengths, vec![400, 400, 1]);
    }

    #[test]
    fn test_decode() {
        assert_eq!(decode_base64("+").unwrap(), Vec::<u8>::new());
        assert_eq!(decode_base64("aGVsbG8=").unwrap(), b"hello");
        assert!(matches!(decode_base64("aGVsbG8"), Err(SaslError::Decode(_))));
        assert!(decode_base64("!!!!").is_err());
    }
}
