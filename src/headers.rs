// Copyright 2024 `multipart-sansio` Crate Developers
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.
//! Structured-header parsing for `Content-Type`-like header values.
//!
//! A value such as `form-data; name="field"; filename="a.txt"` is split into
//! a principal token and an ordered set of `key=value` options. Quoted
//! option values are unquoted, and `filename` values get the classic IE-6
//! workaround applied: old Internet Explorer versions sent the full client
//! path (`C:\Documents\a.txt`), so everything up to the last backslash is
//! dropped for values that look like a Windows path.
//!
//! This is pure string processing with no knowledge of the parser state
//! machine; malformed option tails never fail, they just yield a partial
//! mapping. Diagnosing a *missing* option is the caller's job.

use std::borrow::Cow;

/// Characters that cannot appear in an unquoted token, per RFC 2616.
const SPECIALS: &[u8] = b"()<>@,;:\"\\/[]?={} \t";

fn is_special(c: char) -> bool {
    c.is_ascii() && SPECIALS.contains(&(c as u8))
}

/// An ordered `key -> value` mapping of header options.
///
/// Keys are stored lowercased, in first-insertion order. Inserting an
/// existing key overwrites its value in place, so a duplicate option keeps
/// its original position but the later value wins.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Options {
    items: Vec<(String, String)>,
}

impl Options {
    /// Create an empty mapping.
    pub fn new() -> Self {
        Options::default()
    }

    /// Look up an option by its (lowercase) key.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.items
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Insert an option; a duplicate key overwrites the earlier value.
    pub fn insert(&mut self, key: String, value: String) {
        match self.items.iter_mut().find(|(k, _)| *k == key) {
            Some(item) => item.1 = value,
            None => self.items.push((key, value)),
        }
    }

    /// Iterate the options in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.items.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Number of options.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// `true` if no option was parsed.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Parse a structured header value into `(principal, options)`.
///
/// The principal token is lowercased and trimmed. Options are scanned from
/// the tail after the first `;` with the grammar `(;|^) key = value`, where
/// `value` is either a run of non-special characters or a quoted string
/// with `\`-escaping. Segments that do not match are skipped.
pub fn parse_options_header(header: &str) -> (String, Options) {
    let Some((principal, tail)) = header.split_once(';') else {
        return (header.trim().to_lowercase(), Options::new());
    };

    let mut options = Options::new();
    let mut rest = tail;
    let mut at_start = true;

    loop {
        if !at_start {
            match rest.find(';') {
                Some(idx) => rest = &rest[idx + 1..],
                None => break,
            }
        }

        match match_option(rest) {
            Some((key, value, after)) => {
                options.insert(key, value);
                rest = after;
                at_start = false;
            }
            None if at_start => at_start = false,
            None => {}
        }
    }

    (principal.trim().to_lowercase(), options)
}

/// Match `\s* key \s* = \s* value` at the start of `input`, returning the
/// lowercased key, the unquoted value and the remaining text.
fn match_option(input: &str) -> Option<(String, String, &str)> {
    let input = input.trim_start();

    let key_end = input.find(is_special).unwrap_or(input.len());
    if key_end == 0 {
        return None;
    }
    let key = input[..key_end].to_lowercase();

    let rest = input[key_end..].trim_start();
    let rest = rest.strip_prefix('=')?;
    let rest = rest.trim_start();

    let value_end = if rest.starts_with('"') {
        closing_quote(rest)? + 1
    } else {
        match rest.find(is_special).unwrap_or(rest.len()) {
            0 => return None,
            end => end,
        }
    };

    let value = header_unquote(&rest[..value_end], key == "filename");
    Some((key, value, &rest[value_end..]))
}

/// Byte index of the closing quote of a quoted string starting at byte 0,
/// honoring `\`-escapes. `None` if the string is unterminated.
fn closing_quote(quoted: &str) -> Option<usize> {
    let mut escaped = false;
    for (idx, c) in quoted.char_indices().skip(1) {
        if escaped {
            escaped = false;
        } else if c == '\\' {
            escaped = true;
        } else if c == '"' {
            return Some(idx);
        }
    }
    None
}

/// Unquote a header option value.
///
/// Strips surrounding quotes and undoes `\\` and `\"` escapes. When the
/// value is a `filename`, a quoted Windows path (`C:\...` or a UNC `\\...`)
/// is reduced to its final component first.
pub fn header_unquote(value: &str, is_filename: bool) -> String {
    let Some(inner) = value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
    else {
        return value.to_owned();
    };

    let inner = if is_filename && (inner.get(1..3) == Some(":\\") || inner.starts_with("\\\\")) {
        inner.rsplit('\\').next().unwrap_or(inner)
    } else {
        inner
    };

    inner.replace("\\\\", "\\").replace("\\\"", "\"")
}

/// Quote a header option value if it contains special characters.
pub fn header_quote(value: &str) -> Cow<'_, str> {
    if !value.chars().any(is_special) {
        return Cow::Borrowed(value);
    }

    Cow::Owned(format!(
        "\"{}\"",
        value.replace('\\', "\\\\").replace('"', "\\\"")
    ))
}

#[test]
fn test_parse_no_options() {
    let (principal, options) = parse_options_header(" Text/Plain ");
    assert_eq!(principal, "text/plain");
    assert!(options.is_empty());
}

#[test]
fn test_parse_token_and_quoted_options() {
    let (principal, options) =
        parse_options_header("form-data; name=field; filename=\"a b.txt\"");
    assert_eq!(principal, "form-data");
    assert_eq!(options.get("name"), Some("field"));
    assert_eq!(options.get("filename"), Some("a b.txt"));
    assert_eq!(options.len(), 2);
}

#[test]
fn test_parse_uppercase_keys_and_principal() {
    let (principal, options) = parse_options_header("Form-Data; NAME=\"x\"");
    assert_eq!(principal, "form-data");
    assert_eq!(options.get("name"), Some("x"));
}

#[test]
fn test_parse_quoted_semicolon_and_escapes() {
    let (_, options) =
        parse_options_header("form-data; a=\"b;c\"; d=\"say \\\"hi\\\"\"; e=f");
    assert_eq!(options.get("a"), Some("b;c"));
    assert_eq!(options.get("d"), Some("say \"hi\""));
    assert_eq!(options.get("e"), Some("f"));
}

#[test]
fn test_parse_skips_malformed_segments() {
    let (_, options) = parse_options_header("form-data; garbage; name=field; =nope");
    assert_eq!(options.get("name"), Some("field"));
    assert_eq!(options.len(), 1);
}

#[test]
fn test_parse_duplicate_key_later_wins() {
    let (_, options) = parse_options_header("v; name=a; name=b");
    assert_eq!(options.get("name"), Some("b"));
    assert_eq!(options.len(), 1);
}

#[test]
fn test_unterminated_quote_is_skipped() {
    let (_, options) = parse_options_header("v; name=\"never closed; other=x");
    assert_eq!(options.get("name"), None);
    // the scanner resumes at the next `;`, which sits inside the open quote
    assert_eq!(options.get("other"), Some("x"));
}

#[test]
fn test_filename_ie6_drive_path() {
    let (_, options) =
        parse_options_header("form-data; name=\"f\"; filename=\"C:\\data\\report.pdf\"");
    assert_eq!(options.get("filename"), Some("report.pdf"));
}

#[test]
fn test_filename_ie6_unc_path() {
    let (_, options) =
        parse_options_header("form-data; filename=\"\\\\server\\share\\a.txt\"");
    assert_eq!(options.get("filename"), Some("a.txt"));
}

#[test]
fn test_filename_plain_is_untouched() {
    let (_, options) = parse_options_header("form-data; filename=\"a.txt\"");
    assert_eq!(options.get("filename"), Some("a.txt"));
}

#[test]
fn test_header_quote() {
    assert_eq!(header_quote("plain-token"), "plain-token");
    assert_eq!(header_quote("has space"), "\"has space\"");
    assert_eq!(header_quote("a\\b\"c"), "\"a\\\\b\\\"c\"");
}

#[test]
fn test_quote_unquote_round_trip() {
    for original in ["simple", "with space", "x=\"y\"; z\\w"] {
        let quoted = header_quote(original);
        assert_eq!(header_unquote(&quoted, false), original);
    }
}
