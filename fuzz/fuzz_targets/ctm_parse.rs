//! Fuzz target for CTM parsing.
//!
//! This fuzzer feeds arbitrary byte sequences to the CTM parser,
//! checking for panics, crashes, or hangs.

#![no_main]

use libfuzzer_sys::fuzz_target;
use pantier::ir::io_sclite::from_ctm_slice;

fuzz_target!(|data: &[u8]| {
    if data.len() > 10 * 1024 * 1024 {
        return;
    }
    let _ = from_ctm_slice(data);
});
