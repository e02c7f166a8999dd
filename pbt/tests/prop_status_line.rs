//! ステータス行とヘッダー検証のプロパティテスト (decoder/head.rs, headers.rs)

use pbt::{header_name, header_value, reason_phrase};
use proptest::prelude::*;
use shiguredo_http11_transport::{
    ErrorKind, Headers, HttpVersion, parse_status_line, validate_header,
};

proptest! {
    #[test]
    fn status_line_fields_are_preserved(
        minor in 0u8..=1,
        code in 100u16..=599,
        reason in reason_phrase(),
    ) {
        let line = format!("HTTP/1.{minor} {code} {reason}");
        let parsed = parse_status_line(&line).unwrap();
        prop_assert_eq!(parsed.version, HttpVersion { major: 1, minor });
        prop_assert_eq!(parsed.status_code, code);
        prop_assert_eq!(parsed.reason_phrase, reason);
    }

    #[test]
    fn status_code_out_of_range_is_rejected(code in prop_oneof![0u16..100, 600u16..1000]) {
        let line = format!("HTTP/1.1 {code:03} Whatever");
        prop_assert!(parse_status_line(&line).is_err());
    }

    #[test]
    fn status_code_must_be_three_digits(code in prop_oneof![0u16..10, 1000u16..10000]) {
        let line = format!("HTTP/1.1 {code} OK");
        prop_assert!(parse_status_line(&line).is_err());
    }

    #[test]
    fn status_line_never_panics(line in "\\PC{0,64}") {
        let _ = parse_status_line(&line);
    }
}

proptest! {
    #[test]
    fn valid_headers_are_accepted(name in header_name(), value in header_value()) {
        prop_assert!(validate_header(&name, &value).is_ok());
    }

    #[test]
    fn control_characters_are_rejected(
        name in header_name(),
        value in header_value(),
        at in any::<prop::sample::Index>(),
        ctl in prop_oneof![Just('\r'), Just('\n'), Just('\0'), Just('\x7f')],
    ) {
        let mut injected = value.clone();
        let pos = at.index(value.len() + 1);
        injected.insert(pos, ctl);
        let err = validate_header(&name, &injected).unwrap_err();
        prop_assert_eq!(err.kind(), ErrorKind::InvalidHeader);
    }

    #[test]
    fn append_joins_values(
        name in header_name(),
        values in proptest::collection::vec(header_value(), 1..5),
    ) {
        let mut headers = Headers::new();
        for value in &values {
            headers.append(name.clone(), value.clone());
        }
        prop_assert_eq!(headers.len(), 1);
        let upper = name.to_ascii_uppercase();
        let joined = values.join(", ");
        prop_assert_eq!(headers.get(&upper), Some(joined.as_str()));
    }
}
