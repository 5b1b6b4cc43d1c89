//! Fuzz target for subtitle cue timing lines.
//!
//! This fuzzer feeds arbitrary UTF-8 lines to the timing parser,
//! checking for panics, crashes, or hangs.

#![no_main]

use libfuzzer_sys::fuzz_target;
use pantier::ir::io_subtitles::fuzz_parse_timing;

fuzz_target!(|data: &[u8]| {
    if data.len() > 10 * 1024 * 1024 {
        return;
    }

    let Ok(line) = std::str::from_utf8(data) else {
        return;
    };

    let _ = fuzz_parse_timing(line);
});
