// Copyright 2024 `multipart-sansio` Crate Developers
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.
//! An incremental, push-driven parser for HTTP `multipart/form-data`
//! request bodies (RFC 7578 / RFC 2046), written sans-I/O.
//!
//! The core [`MultipartParser`] never reads from a socket, never blocks and
//! knows nothing about transports: callers [`feed`](MultipartParser::feed)
//! it byte chunks exactly as they arrive and drain a stream of [`Event`]s:
//! a [`Part`] when a part's headers are complete, [`PartData`] slices of
//! its body, [`Event::NeedData`] when the parser is starved, and
//! [`Event::Finished`] once the closing terminator line is consumed. Any
//! chunk boundary is tolerated, including ones that bisect a boundary
//! marker or a header line.
//!
//! ```
//! use multipart_sansio::{Event, MultipartParser};
//!
//! let body: &[&[u8]] = &[
//!     b"--boundary\r\nContent-Disposition: form-data;",
//!     b" name=\"greeting\"\r\n\r\nhello",
//!     b" there\r\n--boun",
//!     b"dary--\r\n",
//! ];
//!
//! let mut parser = MultipartParser::new("boundary");
//! let mut greeting = Vec::new();
//!
//! for chunk in body {
//!     parser.feed(chunk).unwrap();
//!     for event in parser.events() {
//!         match event {
//!             Event::Part(part) => assert_eq!(part.name.as_deref(), Some("greeting")),
//!             Event::PartData(data) => greeting.extend_from_slice(&data.raw),
//!             Event::NeedData | Event::Finished => {}
//!         }
//!     }
//! }
//!
//! parser.finish().unwrap();
//! assert_eq!(greeting, b"hello there");
//! ```
//!
//! For callers that just want a request body turned into form fields and
//! files, the [`form`] module wraps the core in a buffering adapter driven
//! by any [`std::io::Read`].
#![deny(missing_docs)]

mod error;
mod headers;
mod helpers;
mod parser;

pub mod form;

pub use crate::error::Error;
pub use crate::form::parse_form_data;
pub use crate::headers::{header_quote, header_unquote, parse_options_header, Options};
pub use crate::parser::{Event, MultipartParser, Part, PartData};
