//! Tolerant parser for `key=value` OS descriptor files such as
//! `/etc/os-release`.

use std::collections::HashMap;

/// Parses descriptor content into a key/value map.
///
/// Blank lines, `#` comments, and lines without `=` are skipped. Keys and
/// values are trimmed of surrounding spaces and single or double quotes; the
/// shell escapes permitted by os-release(5) are expanded.
pub(crate) fn parse(content: &str) -> HashMap<String, String> {
    content
        .lines()
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| line.split_once('='))
        .map(|(key, value)| (strip(key).to_owned(), unescape(strip(value))))
        .collect()
}

fn strip(raw: &str) -> &str {
    raw.trim_matches(' ').trim_matches('"').trim_matches('\'')
}

fn unescape(value: &str) -> String {
    value
        .replace(r#"\""#, "\"")
        .replace(r"\$", "$")
        .replace(r"\\", r"\")
        .replace(r"\`", "`")
}
