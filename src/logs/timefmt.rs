/// Moment.js-style tokens and their strftime equivalents, longest first so
/// the scanner never splits a token
const TOKENS: &[(&str, &str)] = &[
    ("YYYY", "%Y"),
    ("SSS", "%3f"),
    ("YY", "%y"),
    ("MM", "%m"),
    ("DD", "%d"),
    ("HH", "%H"),
    ("hh", "%I"),
    ("mm", "%M"),
    ("ss", "%S"),
    ("ZZ", "%z"),
    ("Z", "%:z"),
    ("A", "%p"),
    ("a", "%P"),
];

/// Convert a moment.js-style date pattern (as used in PM2 ecosystem files)
/// into a strftime pattern. Unrecognized characters pass through unchanged;
/// literal `%` is escaped so the output is always a valid strftime string.
pub fn to_strftime(pattern: &str) -> String {
    let mut out = String::with_capacity(pattern.len());
    let mut rest = pattern;

    'scan: while let Some(ch) = rest.chars().next() {
        for (token, replacement) in TOKENS {
            if rest.starts_with(token) {
                out.push_str(replacement);
                rest = &rest[token.len()..];
                continue 'scan;
            }
        }

        if ch == '%' {
            out.push_str("%%");
        } else {
            out.push(ch);
        }
        rest = &rest[ch.len_utf8()..];
    }

    out
}
