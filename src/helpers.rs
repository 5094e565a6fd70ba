// Copyright 2024 `multipart-sansio` Crate Developers
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.
use encoding_rs::{Encoding, WINDOWS_1252};

pub use display_bytes::display_bytes as show_bytes;

/// Resolve a charset label to an encoding.
///
/// Follows the WHATWG label registry, so `latin1` maps to windows-1252.
/// Unknown labels fall back to windows-1252 as well, which decodes any byte
/// sequence.
pub(crate) fn encoding_for_label(label: &str) -> &'static Encoding {
    Encoding::for_label(label.as_bytes()).unwrap_or(WINDOWS_1252)
}
