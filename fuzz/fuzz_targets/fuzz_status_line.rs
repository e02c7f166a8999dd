#![no_main]

use libfuzzer_sys::fuzz_target;
use shiguredo_http11_transport::{parse_status_line, validate_header};

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };

    if let Ok(status) = parse_status_line(text) {
        // パースできたステータス行は範囲内のコードを持つ
        assert!((100..=599).contains(&status.status_code));
        assert!(text.starts_with(&status.version.to_string()));
    }

    if let Some((name, value)) = text.split_once(':') {
        if validate_header(name, value).is_ok() {
            assert!(!value.contains(['\r', '\n', '\0']));
        }
    }
});
