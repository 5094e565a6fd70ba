// Copyright 2024 `multipart-sansio` Crate Developers
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.
//! Error types for the core parser.

use std::borrow::Cow;

use thiserror::Error;

/// Failures surfaced by [`MultipartParser`](crate::MultipartParser).
///
/// The parser makes no attempt to recover: any `MalformedData` moves it to
/// its terminal error state, after which every further feed fails with
/// `InvalidState`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// The byte stream violated multipart framing or the header grammar.
    #[error("malformed multipart data: {0}")]
    MalformedData(Cow<'static, str>),
    /// End of input was declared before the terminator line was parsed.
    #[error("Unexpected end. No terminator line parsed.")]
    UnexpectedExit,
    /// The parser was fed again after a previous call already failed.
    #[error("Cannot use parser in ERROR state.")]
    InvalidState,
}

impl Error {
    pub(crate) fn malformed(msg: impl Into<Cow<'static, str>>) -> Self {
        Error::MalformedData(msg.into())
    }
}
