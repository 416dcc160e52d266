//! Property tests for response format matching

use proptest::prelude::*;

use lx200r::validator::{matches_coordinate, matches_time, validate};
use lx200r::{FailureReason, FormatClass, ResponseValidator};

proptest! {
    #[test]
    fn prop_wellformed_time_accepted(h in 0u32..24, m in 0u32..60, s in 0u32..60) {
        let reply = format!("{h:02}:{m:02}:{s:02}#");
        prop_assert!(matches_time(reply.as_bytes()));
    }

    #[test]
    fn prop_wellformed_coordinate_accepted(
        negative in any::<bool>(),
        deg in 0u32..360,
        m in 0u32..60,
        s in 0u32..60,
        wide in any::<bool>(),
    ) {
        let sign = if negative { '-' } else { '+' };
        let reply = if wide || deg > 99 {
            format!("{sign}{deg:03}*{m:02}:{s:02}#")
        } else {
            format!("{sign}{deg:02}*{m:02}:{s:02}#")
        };
        prop_assert!(matches_coordinate(reply.as_bytes()));
    }

    #[test]
    fn prop_unterminated_never_matches_structured(bytes in proptest::collection::vec(any::<u8>(), 0..60)) {
        let bytes: Vec<u8> = bytes.into_iter().filter(|b| *b != b'#').collect();
        prop_assert!(!matches_time(&bytes));
        prop_assert!(!matches_coordinate(&bytes));
        prop_assert!(!validate(&FormatClass::TerminatedText, &bytes));
    }

    #[test]
    fn prop_none_always_passes(bytes in proptest::collection::vec(any::<u8>(), 0..60)) {
        prop_assert_eq!(ResponseValidator.judge(&FormatClass::None, &bytes), Ok(()));
    }

    #[test]
    fn prop_substring_found_anywhere(prefix in "[a-z]{0,10}", suffix in "[a-z]{0,10}") {
        let reply = format!("{prefix}G{suffix}");
        prop_assert!(validate(&FormatClass::substring("G"), reply.as_bytes()));
    }

    #[test]
    fn prop_failure_reason_follows_emptiness(bytes in proptest::collection::vec(b'a'..=b'z', 0..20)) {
        let verdict = ResponseValidator.judge(&FormatClass::TimeFormat, &bytes);
        let expected = if bytes.is_empty() { FailureReason::Timeout } else { FailureReason::FormatMismatch };
        prop_assert_eq!(verdict, Err(expected));
    }
}

#[test]
fn test_coordinate_requires_sign_and_star() {
    assert!(!matches_coordinate(b"+45:30:45#"));
    assert!(!matches_coordinate(b"45*30:45#"));
    assert!(matches_coordinate(b"-89*59:59#"));
}

#[test]
fn test_structured_classes_ignore_substring_fallback() {
    // A '#' somewhere is not enough for the time matcher
    assert!(!validate(&FormatClass::TimeFormat, b"error#"));
    assert!(validate(&FormatClass::TerminatedText, b"error#"));
}
