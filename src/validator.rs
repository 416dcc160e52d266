//! Response format validation
//!
//! One matcher per [`FormatClass`]. The dedicated time, coordinate and
//! terminated-text matchers are authoritative for their classes; substring
//! containment only applies to `SubstringMatch`.

use crate::catalog::FormatClass;
use crate::constants::TERMINATOR;
use crate::error::FailureReason;

/// Stateless response classifier
#[derive(Debug, Clone, Copy, Default)]
pub struct ResponseValidator;

impl ResponseValidator {
    pub fn validate(&self, format: &FormatClass, received: &[u8]) -> bool {
        validate(format, received)
    }

    /// Verdict for one command: `Ok` on pass, otherwise why it failed.
    /// An empty response is a timeout, anything else that fails is a mismatch.
    pub fn judge(&self, format: &FormatClass, received: &[u8]) -> Result<(), FailureReason> {
        if validate(format, received) {
            Ok(())
        } else if received.is_empty() {
            Err(FailureReason::Timeout)
        } else {
            Err(FailureReason::FormatMismatch)
        }
    }
}

pub fn validate(format: &FormatClass, received: &[u8]) -> bool {
    match format {
        FormatClass::None => true,
        FormatClass::SubstringMatch(token) => contains(received, token.as_bytes()),
        FormatClass::TimeFormat => matches_time(received),
        FormatClass::CoordinateFormat => matches_coordinate(received),
        FormatClass::TerminatedText => received.last() == Some(&TERMINATOR),
    }
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    needle.is_empty() || haystack.windows(needle.len()).any(|w| w == needle)
}

/// Consume between `min` and `max` ASCII digits, returning the rest
fn digits(input: &[u8], min: usize, max: usize) -> Option<&[u8]> {
    let count = input.iter().take(max).take_while(|b| b.is_ascii_digit()).count();
    if count < min {
        return None;
    }
    Some(&input[count..])
}

fn byte(input: &[u8], expected: u8) -> Option<&[u8]> {
    match input.split_first() {
        Some((&b, rest)) if b == expected => Some(rest),
        _ => None,
    }
}

/// `MM:SS#` tail shared by both formats
fn minutes_seconds_terminator(input: &[u8]) -> Option<&[u8]> {
    let rest = digits(input, 2, 2)?;
    let rest = byte(rest, b':')?;
    let rest = digits(rest, 2, 2)?;
    byte(rest, TERMINATOR)
}

/// `H[H]:MM:SS#` anchored at the start; trailing bytes are tolerated
pub fn matches_time(received: &[u8]) -> bool {
    digits(received, 1, 2)
        .and_then(|rest| byte(rest, b':'))
        .and_then(minutes_seconds_terminator)
        .is_some()
}

/// `±DD[D]*MM:SS#` anchored at the start with a mandatory sign
pub fn matches_coordinate(received: &[u8]) -> bool {
    let rest = match received.split_first() {
        Some((&sign, rest)) if sign == b'+' || sign == b'-' => rest,
        _ => return false,
    };
    digits(rest, 2, 3)
        .and_then(|rest| byte(rest, b'*'))
        .and_then(minutes_seconds_terminator)
        .is_some()
}
