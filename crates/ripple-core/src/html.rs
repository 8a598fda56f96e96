//! HTML escaping and element markup helpers.

use ripple_protocol::Jid;

/// Escape text for use in HTML content and quoted attribute values.
#[must_use]
pub fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    escape_into(s, &mut out);
    out
}

/// Escape `s` onto the end of `out`.
pub fn escape_into(s: &str, out: &mut String) {
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&#34;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
}

/// Write `<tag id="Jid.x" attrs...`, leaving the tag open.
pub(crate) fn open_tag(out: &mut String, tag: &str, jid: Jid, attrs: &[&str]) {
    out.push('<');
    out.push_str(tag);
    if jid.is_element() {
        out.push_str(" id=\"");
        out.push_str(&jid.html_id());
        out.push('"');
    }
    for attr in attrs {
        out.push(' ');
        out.push_str(attr);
    }
}

/// Write ` name="escaped value"`.
pub(crate) fn attr(out: &mut String, name: &str, value: &str) {
    out.push(' ');
    out.push_str(name);
    out.push_str("=\"");
    escape_into(value, out);
    out.push('"');
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape() {
        assert_eq!(escape("plain"), "plain");
        assert_eq!(
            escape("<a href=\"x\">Tom & 'Jerry'</a>"),
            "&lt;a href=&#34;x&#34;&gt;Tom &amp; &#39;Jerry&#39;&lt;/a&gt;"
        );
    }

    #[test]
    fn test_open_tag() {
        let mut out = String::new();
        open_tag(&mut out, "input", Jid(33), &["class=\"x\""]);
        attr(&mut out, "value", "a\"b");
        out.push('>');
        assert_eq!(out, "<input id=\"Jid.11\" class=\"x\" value=\"a&#34;b\">");

        out.clear();
        open_tag(&mut out, "span", Jid::NONE, &[]);
        assert_eq!(out, "<span");
    }
}
