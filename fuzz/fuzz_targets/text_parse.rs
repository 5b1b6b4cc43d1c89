//! Fuzz target for plain text parsing.
//!
//! This fuzzer feeds arbitrary byte sequences to the plain text parser,
//! checking for panics, crashes, or hangs.

#![no_main]

use libfuzzer_sys::fuzz_target;
use pantier::ir::io_text::from_text_slice;

fuzz_target!(|data: &[u8]| {
    if data.len() > 10 * 1024 * 1024 {
        return;
    }
    let _ = from_text_slice(data);
});
