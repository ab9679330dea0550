/// Escape an identifier (id or class name) for use in a CSS selector,
/// following the `CSS.escape()` algorithm from CSSOM.
pub fn css_escape(ident: &str) -> String {
    let chars: Vec<char> = ident.chars().collect();
    let mut out = String::with_capacity(ident.len() + 4);

    if chars.len() == 1 && chars[0] == '-' {
        return "\\-".to_string();
    }

    for (i, &c) in chars.iter().enumerate() {
        let code = c as u32;
        if code == 0 {
            out.push('\u{FFFD}');
        } else if (0x1..=0x1F).contains(&code) || code == 0x7F {
            out.push_str(&format!("\\{:x} ", code));
        } else if c.is_ascii_digit() && (i == 0 || (i == 1 && chars[0] == '-')) {
            out.push_str(&format!("\\{:x} ", code));
        } else if code >= 0x80 || c == '-' || c == '_' || c.is_ascii_alphanumeric() {
            out.push(c);
        } else {
            out.push('\\');
            out.push(c);
        }
    }
    out
}

/// Quote an attribute value as a CSS string literal.
pub fn css_string(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for c in value.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\0' => out.push('\u{FFFD}'),
            c if (c as u32) < 0x20 || c as u32 == 0x7F => {
                out.push_str(&format!("\\{:x} ", c as u32));
            }
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

/// Quote a value as an XPath 1.0 string literal.
///
/// XPath has no escape sequences, so a value containing both quote kinds is
/// assembled with `concat()`.
pub fn xpath_literal(value: &str) -> String {
    if !value.contains('\'') {
        return format!("'{}'", value);
    }
    if !value.contains('"') {
        return format!("\"{}\"", value);
    }
    let parts: Vec<String> = value
        .split('\'')
        .map(|part| format!("'{}'", part))
        .collect();
    format!("concat({})", parts.join(", \"'\", "))
}
