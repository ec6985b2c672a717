#![no_main]

use jb_case::decode_case;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(input) = std::str::from_utf8(data) else {
        return;
    };
    // Accepted cases must re-render to a string that decodes to the same case.
    if let Ok(case) = decode_case(input) {
        let rendered = case.render();
        let reparsed = decode_case(&rendered).expect("canonical form decodes");
        assert_eq!(reparsed.render(), rendered);
    }
});
