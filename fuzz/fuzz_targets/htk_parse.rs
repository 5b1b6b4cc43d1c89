//! Fuzz target for HTK label parsing.
//!
//! This fuzzer feeds arbitrary byte sequences to the HTK label parser,
//! checking for panics, crashes, or hangs.

#![no_main]

use libfuzzer_sys::fuzz_target;
use pantier::ir::io_htk::from_htk_slice;

fuzz_target!(|data: &[u8]| {
    if data.len() > 10 * 1024 * 1024 {
        return;
    }
    let _ = from_htk_slice(data);
});
