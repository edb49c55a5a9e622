//! Stateless wire codec.
//!
//! - [`tokenizer`]: split a decoded line into prefix, command and parameters
//! - [`render`]: turn outbound commands into wire lines
//! - [`sasl`]: base64 and `AUTHENTICATE` chunking

pub mod render;
pub mod sasl;
pub mod tokenizer;

pub use self::render::{render, split_targets, EmissionKey, RenderedLine, TARGET_LINE_BUDGET};
pub use self::sasl::{authenticate_chunks, decode_base64, encode_base64, SASL_CHUNK_SIZE};
pub use self::tokenizer::{tokenize, RawLine};
