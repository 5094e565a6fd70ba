// Copyright 2024 `multipart-sansio` Crate Developers
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.
//! A buffering form adapter over the sans-I/O core.
//!
//! [`parse_form_data`] is the convenience layer for servers that do not
//! want to consume events themselves: it reads a request body off any
//! [`Read`] in chunks, drives [`MultipartParser`], and bins the parts.
//! A part with a `filename` is a file, anything else is a plain form
//! field decoded with its charset. Bodies of type
//! `application/x-www-form-urlencoded` are handled too, so the adapter can
//! be pointed at either kind of HTML form submission.
//!
//! The core is always strict; leniency lives here. With
//! [`FormConfig::strict`] unset (the default), a malformed body yields
//! whatever fields and files were collected before the error, and only
//! I/O errors propagate.

use std::io::{self, ErrorKind, Read};

use http::header::{CONTENT_LENGTH, CONTENT_TYPE};
use http::HeaderMap;
use log::debug;
use mime::Mime;
use multimap::MultiMap;
use thiserror::Error as ThisError;

use crate::error::Error;
use crate::headers::parse_options_header;
use crate::parser::{Event, MultipartParser, Part};

const READ_BUF_LEN: usize = 8 * 1024;

/// Failures surfaced by [`parse_form_data`].
#[derive(Debug, ThisError)]
pub enum FormError {
    /// The multipart stream itself was malformed or truncated.
    #[error(transparent)]
    Parse(#[from] Error),
    /// Reading the body failed.
    #[error(transparent)]
    Io(#[from] io::Error),
    /// The request carried no `Content-Type` header.
    #[error("Missing Content-Type header.")]
    MissingContentType,
    /// A multipart `Content-Type` without a `boundary` option.
    #[error("No boundary for multipart/form-data.")]
    MissingBoundary,
    /// The `Content-Type` is neither multipart nor urlencoded.
    #[error("Unsupported content type.")]
    UnsupportedContentType,
    /// An urlencoded body exceeded [`FormConfig::mem_limit`].
    #[error("request body larger than the configured memory limit ({limit} bytes)")]
    TooLarge {
        /// The limit that was exceeded.
        limit: usize,
    },
}

/// Knobs for [`parse_form_data`].
#[derive(Debug, Clone)]
pub struct FormConfig {
    /// Charset to assume when the request does not name one. Default:
    /// `utf8`.
    pub charset: String,
    /// Propagate parse errors instead of returning the bins collected so
    /// far. I/O errors always propagate. Default: `false`.
    pub strict: bool,
    /// Maximum byte size accepted for an urlencoded body. Default: 1 MiB.
    pub mem_limit: usize,
}

impl Default for FormConfig {
    fn default() -> Self {
        FormConfig {
            charset: "utf8".to_owned(),
            strict: false,
            mem_limit: 1 << 20,
        }
    }
}

/// The form fields and files extracted from a request body.
///
/// Both bins are multimaps because a form may repeat a field name.
#[derive(Debug, Default)]
pub struct FormData {
    /// Plain form fields, decoded with each part's effective charset.
    pub fields: MultiMap<String, String>,
    /// Uploaded files, kept as full [`Part`]s with their buffered bytes.
    pub files: MultiMap<String, Part>,
}

impl FormData {
    /// Create an empty `FormData`.
    pub fn new() -> Self {
        FormData::default()
    }
}

/// Parse a request body into form fields and files.
///
/// `headers` supplies `Content-Type` (and through it the boundary and
/// charset) plus the advisory `Content-Length`; `body` is read to the end
/// in chunks.
pub fn parse_form_data<R: Read>(
    headers: &HeaderMap,
    body: R,
    config: &FormConfig,
) -> Result<FormData, FormError> {
    let mut form = FormData::new();

    match fill_form_data(headers, body, config, &mut form) {
        Ok(()) => Ok(form),
        Err(err @ FormError::Io(_)) => Err(err),
        Err(err) if config.strict => Err(err),
        Err(err) => {
            debug!("lenient form parse swallowed: {}", err);
            Ok(form)
        }
    }
}

fn fill_form_data<R: Read>(
    headers: &HeaderMap,
    body: R,
    config: &FormConfig,
    out: &mut FormData,
) -> Result<(), FormError> {
    let content_type = headers
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("");

    if content_type.is_empty() {
        return Err(FormError::MissingContentType);
    }

    let (principal, options) = parse_options_header(content_type);
    let charset = options
        .get("charset")
        .unwrap_or(config.charset.as_str())
        .to_owned();

    let ctype: Mime = principal
        .parse()
        .map_err(|_| FormError::UnsupportedContentType)?;

    if ctype.type_() == mime::MULTIPART && ctype.subtype() == mime::FORM_DATA {
        let boundary = options
            .get("boundary")
            .filter(|boundary| !boundary.is_empty())
            .ok_or(FormError::MissingBoundary)?;

        read_multipart(headers, body, boundary, &charset, out)
    } else if ctype.type_() == mime::APPLICATION
        && (ctype.subtype() == mime::WWW_FORM_URLENCODED
            || ctype.subtype().as_str() == "x-url-encoded")
    {
        let data = read_limited(body, config.mem_limit)?;
        for (name, value) in form_urlencoded::parse(&data).into_owned() {
            out.fields.insert(name, value);
        }
        Ok(())
    } else {
        Err(FormError::UnsupportedContentType)
    }
}

fn read_multipart<R: Read>(
    headers: &HeaderMap,
    mut body: R,
    boundary: &str,
    charset: &str,
    out: &mut FormData,
) -> Result<(), FormError> {
    let mut parser = MultipartParser::new(boundary).with_charset(charset);
    if let Some(content_length) = declared_length(headers) {
        parser = parser.with_content_length(content_length);
    }

    let mut current: Option<Part> = None;
    let mut buf = [0u8; READ_BUF_LEN];

    loop {
        let n = match body.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => return Err(err.into()),
        };

        parser.feed(&buf[..n])?;

        for event in parser.events() {
            match event {
                Event::Part(part) => bin_part(out, current.replace(part)),
                Event::PartData(data) => {
                    if let Some(part) = current.as_mut() {
                        part.buffer(&data);
                    }
                }
                Event::Finished => bin_part(out, current.take()),
                Event::NeedData => {}
            }
        }
    }

    parser.finish()?;
    Ok(())
}

/// File a completed part into the right bin. Parts without a `name` are
/// dropped, since neither bin could key them.
fn bin_part(out: &mut FormData, part: Option<Part>) {
    let Some(part) = part else { return };

    let Some(name) = part.name.clone() else {
        debug!("skipping part without a name (filename {:?})", part.filename);
        return;
    };

    if part.filename.is_some() {
        out.files.insert(name, part);
    } else {
        out.fields.insert(name, part.value());
    }
}

fn read_limited<R: Read>(body: R, limit: usize) -> Result<Vec<u8>, FormError> {
    let mut data = Vec::new();
    body.take(limit as u64 + 1).read_to_end(&mut data)?;

    if data.len() > limit {
        return Err(FormError::TooLarge { limit });
    }

    Ok(data)
}

fn declared_length(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(CONTENT_LENGTH)?
        .to_str()
        .ok()?
        .trim()
        .parse()
        .ok()
}
