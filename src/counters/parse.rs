//! Parser for the line-oriented text perfquery prints.
//!
//! Grammar of a counter line:
//!
//! ```text
//! line   = ident ':' filler+ digits
//! ident  = [A-Za-z0-9_]+
//! filler = any character except an ASCII digit
//! ```
//!
//! Lines starting with `#` are comments. Lines of any other shape
//! (hex values, banners, warnings) are skipped, not rejected.

use super::CounterSnapshot;

/// Counters perfquery(8) reports as octets divided by 4.
const QUAD_OCTET_COUNTERS: &[&str] = &["XmtData", "RcvData", "PortXmitData", "PortRcvData"];
const QUAD_OCTET_FACTOR: u64 = 4;

/// Parses the whole output, scaling data counters to bytes.
pub(crate) fn parse_output(text: &str) -> CounterSnapshot {
    let mut snapshot = CounterSnapshot::default();

    for line in text.lines() {
        let Some((key, raw)) = parse_line(line) else {
            continue;
        };
        let value = if QUAD_OCTET_COUNTERS.contains(&key) {
            raw.saturating_mul(QUAD_OCTET_FACTOR)
        } else {
            raw
        };
        snapshot.insert(key, value);
    }

    snapshot
}

/// Splits one counter line into its key and unscaled value.
pub(crate) fn parse_line(line: &str) -> Option<(&str, u64)> {
    let line = line.trim_end();
    if line.starts_with('#') {
        return None;
    }

    let (key, rest) = line.split_once(':')?;
    if key.is_empty() || !key.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return None;
    }

    let digits_at = rest.find(|c: char| c.is_ascii_digit())?;
    if digits_at == 0 {
        return None;
    }

    let digits = &rest[digits_at..];
    if !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }

    digits.parse().ok().map(|value| (key, value))
}
