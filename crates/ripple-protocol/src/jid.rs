//! Element identifiers and their compact text form.
//!
//! Jids are written in lowercase base-32 to keep frames short. The same
//! encoding is used for session keys in URLs.

use std::fmt;

/// Radix used for jids and session keys on the wire.
pub const RADIX: u32 = 32;

/// Prefix used when a jid is rendered as an HTML `id` attribute.
pub const HTML_ID_PREFIX: &str = "Jid.";

const DIGITS: &[u8; 32] = b"0123456789abcdefghijklmnopqrstuv";

/// Append `value` in base-32 to `out`.
pub fn append_radix(out: &mut String, value: u64) {
    if value == 0 {
        out.push('0');
        return;
    }
    let mut buf = [0u8; 13];
    let mut pos = buf.len();
    let mut v = value;
    while v > 0 {
        pos -= 1;
        buf[pos] = DIGITS[(v % u64::from(RADIX)) as usize];
        v /= u64::from(RADIX);
    }
    // digits are ASCII
    out.extend(buf[pos..].iter().map(|&b| b as char));
}

/// Format `value` in base-32.
#[must_use]
pub fn to_radix(value: u64) -> String {
    let mut s = String::with_capacity(13);
    append_radix(&mut s, value);
    s
}

/// Parse a base-32 string. Returns `None` for empty or invalid input.
#[must_use]
pub fn parse_radix(s: &str) -> Option<u64> {
    if s.is_empty() || !s.bytes().all(|b| DIGITS.contains(&b)) {
        return None;
    }
    u64::from_str_radix(s, RADIX).ok()
}

/// Per-session identifier of a renderable element.
///
/// Jids start at 1 and grow monotonically within a session. `Jid::NONE` (0)
/// stands for "no element" and is used by session-scoped commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Jid(pub u32);

impl Jid {
    /// The absent jid.
    pub const NONE: Jid = Jid(0);

    /// Whether this names a real element.
    #[must_use]
    pub const fn is_element(self) -> bool {
        self.0 > 0
    }

    /// Index into a 1-based arena, if this names a real element.
    #[must_use]
    pub fn index(self) -> Option<usize> {
        (self.0 as usize).checked_sub(1)
    }

    /// Append the wire form. `Jid::NONE` writes nothing.
    pub fn append_to(self, out: &mut String) {
        if self.is_element() {
            append_radix(out, u64::from(self.0));
        }
    }

    /// The value for an HTML `id` attribute, e.g. `Jid.1v`.
    #[must_use]
    pub fn html_id(self) -> String {
        let mut s = String::from(HTML_ID_PREFIX);
        append_radix(&mut s, u64::from(self.0));
        s
    }

    /// Parse the wire form, accepting an optional `Jid.` prefix.
    ///
    /// Anything that does not parse to a jid in range yields `Jid::NONE`.
    #[must_use]
    pub fn parse(s: &str) -> Jid {
        let digits = s.strip_prefix(HTML_ID_PREFIX).unwrap_or(s);
        parse_radix(digits)
            .and_then(|v| u32::try_from(v).ok())
            .map_or(Jid::NONE, Jid)
    }
}

impl fmt::Display for Jid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.html_id())
    }
}

impl From<u32> for Jid {
    fn from(v: u32) -> Self {
        Jid(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_radix() {
        assert_eq!(to_radix(0), "0");
        assert_eq!(to_radix(1), "1");
        assert_eq!(to_radix(31), "v");
        assert_eq!(to_radix(32), "10");
        assert_eq!(parse_radix("10"), Some(32));
        assert_eq!(parse_radix(&to_radix(u64::MAX)), Some(u64::MAX));
        assert_eq!(parse_radix(""), None);
        assert_eq!(parse_radix("w"), None);
        assert_eq!(parse_radix("V"), None);
    }

    #[test]
    fn test_jid_parse() {
        assert_eq!(Jid::parse("1"), Jid(1));
        assert_eq!(Jid::parse("Jid.1v"), Jid(63));
        assert_eq!(Jid::parse(""), Jid::NONE);
        assert_eq!(Jid::parse("nope!"), Jid::NONE);
        // larger than u32
        assert_eq!(Jid::parse("zzzzzzzzzz"), Jid::NONE);
        assert_eq!(Jid::parse(&to_radix(u64::from(u32::MAX) + 1)), Jid::NONE);
    }

    #[test]
    fn test_jid_forms() {
        let jid = Jid(1);
        assert_eq!(jid.html_id(), "Jid.1");
        assert_eq!(jid.index(), Some(0));
        assert_eq!(Jid::NONE.index(), None);

        let mut s = String::new();
        Jid::NONE.append_to(&mut s);
        assert!(s.is_empty());
        Jid(33).append_to(&mut s);
        assert_eq!(s, "11");
    }
}
