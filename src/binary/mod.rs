//! Binary format decoding: cursor, LEB128, vectors/names, sections, and the
//! expression decoder. All readers report `DecodeError` with the byte offset
//! at which the problem was detected.

pub mod code;
pub mod cursor;
pub mod leb128;
pub mod reader;
pub mod sections;

use crate::error::DecodeError;

/// Result alias for binary reading operations.
pub type Result<T> = core::result::Result<T, DecodeError>;
