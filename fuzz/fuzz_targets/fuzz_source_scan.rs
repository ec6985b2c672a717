#![no_main]

use jb_registry::scan_source;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(text) = std::str::from_utf8(data) {
        let _ = scan_source("fuzz.java", text);
    }
});
