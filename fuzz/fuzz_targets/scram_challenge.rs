//! Fuzz target for SCRAM server messages
//!
//! Runs the client-first step, then feeds the input as the server's first
//! and final messages. Malformed input must surface as an error.

#![no_main]

use libfuzzer_sys::fuzz_target;
use slirc_engine::sasl::ScramClient;
use slirc_engine::SaslClient;

fuzz_target!(|data: &[u8]| {
    // Huge iteration counts only measure PBKDF2
    if iteration_digits(data) > 4 {
        return;
    }

    let mut client = ScramClient::with_nonce("fuzz", "pencil", "fyko+d2lbbFgONRv9qkxdawL".into());
    let _ = client.evaluate(b"");
    if client.evaluate(data).is_ok() {
        let _ = client.evaluate(data);
    }
});

fn iteration_digits(data: &[u8]) -> usize {
    (0..data.len())
        .filter(|&at| data[at..].starts_with(b"i="))
        .map(|at| {
            data[at + 2..]
                .iter()
                .take_while(|b| b.is_ascii_digit())
                .count()
        })
        .max()
        .unwrap_or(0)
}
