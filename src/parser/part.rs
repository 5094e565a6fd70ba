// Copyright 2024 `multipart-sansio` Crate Developers
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.
//! The semantic unit of a multipart message, and its body fragments.

use bytes::{Bytes, BytesMut};

use crate::helpers::encoding_for_label;

/// One headers+body unit of a multipart message.
///
/// A `Part` event is emitted as soon as its header block closes; the body
/// arrives afterwards as zero or more [`PartData`] events. Callers that
/// want the whole body in memory push each `PartData` back into the part
/// with [`Part::buffer`].
///
/// ### Note: Untrustworthy
/// `name`, `filename` and the raw headers are provided by the client.
/// Avoid unsanitized use on the filesystem, in a shell, or in a database.
#[derive(Debug, Clone)]
pub struct Part {
    headerlist: Vec<(String, String)>,
    /// Principal token of `Content-Disposition`, lowercased.
    pub disposition: String,
    /// The `name` option of `Content-Disposition`, if sent.
    pub name: Option<String>,
    /// The `filename` option of `Content-Disposition`, if sent, after the
    /// IE-6 full-path workaround.
    pub filename: Option<String>,
    /// Principal token of `Content-Type`, lowercased; `None` when the
    /// header is absent.
    pub content_type: Option<String>,
    /// Charset from the `Content-Type` options, else the parser default.
    pub charset: String,
    /// Declared `Content-Length` of this part's body, if sent.
    pub expected_size: Option<u64>,
    data: BytesMut,
}

impl Part {
    pub(crate) fn new(charset: &str) -> Self {
        Part {
            headerlist: Vec::new(),
            disposition: String::new(),
            name: None,
            filename: None,
            content_type: None,
            charset: charset.to_owned(),
            expected_size: None,
            data: BytesMut::new(),
        }
    }

    pub(crate) fn push_header(&mut self, name: &str, value: &str) {
        self.headerlist.push((name.to_owned(), value.to_owned()));
    }

    /// The part's headers in wire order, with the casing as parsed.
    pub fn headers(&self) -> &[(String, String)] {
        &self.headerlist
    }

    /// Case-insensitive header lookup; the first occurrence wins.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headerlist
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Append a body fragment to this part's accumulator.
    pub fn buffer(&mut self, data: &PartData) {
        self.data.extend_from_slice(&data.raw);
    }

    /// The accumulated body bytes, without decoding.
    pub fn raw(&self) -> &[u8] {
        &self.data
    }

    /// Number of accumulated body bytes.
    pub fn size(&self) -> usize {
        self.data.len()
    }

    /// The accumulated body decoded with this part's charset.
    pub fn value(&self) -> String {
        encoding_for_label(&self.charset)
            .decode_without_bom_handling(&self.data)
            .0
            .into_owned()
    }
}

/// A slice of one part's body.
///
/// Concatenating every `PartData` emitted between a [`Part`] and the next
/// `Part` (or the end of the message) yields that part's body
/// byte-for-byte.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartData {
    /// The raw body bytes.
    pub raw: Bytes,
    /// Byte count, equal to `raw.len()`.
    pub size: usize,
}

impl PartData {
    pub(crate) fn new(raw: Bytes) -> Self {
        let size = raw.len();
        PartData { raw, size }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_header_lookup_is_case_insensitive_first_wins() {
        let mut part = Part::new("latin1");
        part.push_header("Content-Type", "text/plain");
        part.push_header("X-Extra", "1");
        part.push_header("x-extra", "2");

        assert_eq!(part.header("content-TYPE"), Some("text/plain"));
        assert_eq!(part.header("X-EXTRA"), Some("1"));
        assert_eq!(part.header("missing"), None);
        assert_eq!(part.headers().len(), 3);
    }

    #[test]
    fn test_buffered_value_decodes_with_charset() {
        let mut part = Part::new("latin1");
        part.buffer(&PartData::new(Bytes::from_static(b"caf\xe9")));
        assert_eq!(part.size(), 4);
        assert_eq!(part.value(), "café");

        let mut utf8 = Part::new("utf-8");
        utf8.buffer(&PartData::new(Bytes::from_static(b"caf\xc3\xa9")));
        assert_eq!(utf8.value(), "café");
    }
}
