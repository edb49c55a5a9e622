//! Fuzz target for inbound line parsing
//!
//! Feeds arbitrary server lines through the tokenizer and the event parser,
//! which must never panic.

#![no_main]

use libfuzzer_sys::fuzz_target;
use slirc_engine::{parser, wire, Connection};

fuzz_target!(|data: &[u8]| {
    // Longer than any line the reader would hand over
    if data.len() > 8191 {
        return;
    }

    let connection = Connection::new(None, encoding::UTF_8, "fuzz");
    let _ = parser::parse(&connection, data);

    if let Ok(line) = std::str::from_utf8(data) {
        let _ = wire::tokenize(line);
    }
});
