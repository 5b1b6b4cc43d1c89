//! Fuzz target for ELAN EAF parsing.
//!
//! This fuzzer feeds arbitrary byte sequences to the ELAN EAF parser,
//! checking for panics, crashes, or hangs.

#![no_main]

use libfuzzer_sys::fuzz_target;
use pantier::ir::io_eaf::from_eaf_slice;

fuzz_target!(|data: &[u8]| {
    if data.len() > 10 * 1024 * 1024 {
        return;
    }
    let _ = from_eaf_slice(data);
});
