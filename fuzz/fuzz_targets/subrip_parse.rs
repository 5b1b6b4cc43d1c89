//! Fuzz target for SubRip parsing.
//!
//! This fuzzer feeds arbitrary byte sequences to the SubRip parser,
//! checking for panics, crashes, or hangs.

#![no_main]

use libfuzzer_sys::fuzz_target;
use pantier::ir::io_subtitles::{from_subtitles_slice, SubtitleFormat};

fuzz_target!(|data: &[u8]| {
    if data.len() > 10 * 1024 * 1024 {
        return;
    }
    let _ = from_subtitles_slice(data, SubtitleFormat::SubRip);
});
