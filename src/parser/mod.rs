// Copyright 2024 `multipart-sansio` Crate Developers
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.
//! The push-driven multipart state machine.
//!
//! [`MultipartParser`] performs no I/O. Callers feed byte chunks exactly as
//! they arrive and drain [`Event`]s between calls; when the parser cannot
//! make progress it emits [`Event::NeedData`] and waits for the next feed.
//! Any chunk boundary is tolerated, including ones that bisect a boundary
//! marker, a header line, or the line break preceding a separator.
//!
//! Bytes the parser cannot classify yet are kept in an internal carry-over
//! buffer, bounded by roughly one header block plus one boundary-length
//! fragment. The parser never retains references into caller chunks.

use std::collections::VecDeque;
use std::mem;

use bytes::BytesMut;
use encoding_rs::Encoding;
use log::{debug, trace, warn};

use crate::error::Error;
use crate::headers::parse_options_header;
use crate::helpers::{encoding_for_label, show_bytes};

use self::lines::{LineEnding, Lines};

mod lines;
mod part;

pub use self::part::{Part, PartData};

const DEFAULT_CHARSET: &str = "latin1";

/// What the parser hands back to the caller.
#[derive(Debug)]
pub enum Event {
    /// A part's header block is complete; its body follows.
    Part(Part),
    /// A slice of the current part's body.
    PartData(PartData),
    /// No progress is possible until more bytes are fed.
    NeedData,
    /// The terminator line was consumed; the message is complete.
    Finished,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    BuildingHeaders,
    BuildingHeadersNeedData,
    BuildingBody,
    BuildingBodyNeedData,
    Finished,
    Error,
}

/// An incremental, push-driven parser for `multipart/form-data` bodies.
///
/// ```
/// use multipart_sansio::{Event, MultipartParser};
///
/// let mut parser = MultipartParser::new("boundary");
/// let events = parser
///     .parse(b"--boundary\r\nContent-Disposition: form-data; name=\"a\"\r\n\r\nhi\r\n--boundary--\r\n")
///     .unwrap();
///
/// assert!(matches!(events[0], Event::Part(_)));
/// assert!(matches!(events.last(), Some(Event::Finished)));
/// parser.finish().unwrap();
/// ```
pub struct MultipartParser {
    separator: Vec<u8>,
    terminator: Vec<u8>,
    charset: String,
    encoding: &'static Encoding,
    content_length: Option<u64>,

    state: State,
    queue: VecDeque<Event>,
    carry: BytesMut,
    current_part: Option<Part>,

    /// The terminator of the last confirmed body line, withheld until the
    /// next line proves it was not the break preceding a boundary.
    pending_break: LineEnding,
    expected_part_size: Option<u64>,
    current_part_size: u64,
}

impl MultipartParser {
    /// Construct a parser for the given boundary (without the leading
    /// `--`; the requisite dashes are prepended here).
    pub fn new<B: AsRef<[u8]>>(boundary: B) -> Self {
        let boundary = boundary.as_ref();
        let mut separator = Vec::with_capacity(boundary.len() + 4);
        separator.extend_from_slice(b"--");
        separator.extend_from_slice(boundary);
        let mut terminator = separator.clone();
        terminator.extend_from_slice(b"--");

        debug!("separator: {}", show_bytes(&separator));

        MultipartParser {
            separator,
            terminator,
            charset: DEFAULT_CHARSET.to_owned(),
            encoding: encoding_for_label(DEFAULT_CHARSET),
            content_length: None,
            state: State::BuildingHeaders,
            queue: VecDeque::new(),
            carry: BytesMut::new(),
            current_part: None,
            pending_break: LineEnding::Empty,
            expected_part_size: None,
            current_part_size: 0,
        }
    }

    /// Set the charset used to decode header lines and defaulted onto
    /// parts whose `Content-Type` does not name one. Default: `latin1`.
    pub fn with_charset(mut self, charset: &str) -> Self {
        if Encoding::for_label(charset.as_bytes()).is_none() {
            warn!("unknown charset label {:?}, decoding as latin1", charset);
        }
        self.encoding = encoding_for_label(charset);
        self.charset = charset.to_owned();
        self
    }

    /// Record the declared length of the whole body. Advisory only: the
    /// core never reads it, but adapters hand it through.
    pub fn with_content_length(mut self, content_length: u64) -> Self {
        self.content_length = Some(content_length);
        self
    }

    /// The declared length of the whole body, if one was recorded.
    pub fn content_length(&self) -> Option<u64> {
        self.content_length
    }

    /// Incorporate a chunk, appending any resulting events to the queue.
    ///
    /// A protocol violation fails with [`Error::MalformedData`] and leaves
    /// the parser unusable; feeding it again fails with
    /// [`Error::InvalidState`]. Bytes fed after the terminator has been
    /// consumed are ignored.
    pub fn feed(&mut self, chunk: &[u8]) -> Result<(), Error> {
        match self.state {
            State::Error => return Err(Error::InvalidState),
            State::Finished => {
                trace!("ignoring {} bytes fed after the terminator", chunk.len());
                return Ok(());
            }
            _ => {}
        }

        trace!("feed: {} bytes, state {:?}", chunk.len(), self.state);

        let mut work = mem::take(&mut self.carry);
        work.extend_from_slice(chunk);

        self.run(&work).inspect_err(|_| {
            self.state = State::Error;
            self.carry.clear();
        })
    }

    /// Pop one event. When the queue is empty this is [`Event::Finished`]
    /// if the message is complete, else [`Event::NeedData`].
    pub fn next_event(&mut self) -> Event {
        match self.queue.pop_front() {
            Some(event) => event,
            None if self.state == State::Finished => Event::Finished,
            None => Event::NeedData,
        }
    }

    /// Drain all currently queued events, in order.
    pub fn events(&mut self) -> impl Iterator<Item = Event> + '_ {
        self.queue.drain(..)
    }

    /// Convenience: [`feed`](Self::feed) followed by a full drain.
    pub fn parse(&mut self, chunk: &[u8]) -> Result<Vec<Event>, Error> {
        self.feed(chunk)?;
        Ok(self.events().collect())
    }

    /// Declare end-of-input. Fails with [`Error::UnexpectedExit`] unless
    /// the terminator line was parsed.
    pub fn finish(self) -> Result<(), Error> {
        if self.state == State::Finished {
            Ok(())
        } else {
            Err(Error::UnexpectedExit)
        }
    }

    /// Drive the state machine over the carry-over plus the new chunk.
    ///
    /// `pos` only ever advances past fully-classified lines; whatever is
    /// left when the machine suspends becomes the new carry-over.
    fn run(&mut self, work: &[u8]) -> Result<(), Error> {
        let mut pos = 0;

        loop {
            match self.state {
                State::BuildingHeaders => {
                    if let Some(part) = self.build_headers(work, &mut pos)? {
                        self.queue.push_back(Event::Part(part));
                    }
                }
                State::BuildingBody => {
                    if let Some(data) = self.build_body(work, &mut pos)? {
                        self.queue.push_back(Event::PartData(data));
                    }
                }
                _ => {}
            }

            match self.state {
                State::BuildingHeadersNeedData => {
                    self.queue.push_back(Event::NeedData);
                    self.state = State::BuildingHeaders;
                    self.carry.extend_from_slice(&work[pos..]);
                    return Ok(());
                }
                State::BuildingBodyNeedData => {
                    self.queue.push_back(Event::NeedData);
                    self.state = State::BuildingBody;
                    self.carry.extend_from_slice(&work[pos..]);
                    return Ok(());
                }
                State::Finished => {
                    debug!("terminator consumed, {} trailing bytes ignored", work.len() - pos);
                    self.queue.push_back(Event::Finished);
                    return Ok(());
                }
                _ => {}
            }
        }
    }

    /// Header-building: consume the opening separator (skipping blank
    /// preamble lines) and accumulate header lines until the blank line
    /// closes the block. Returns the completed part, if reached.
    fn build_headers(&mut self, work: &[u8], pos: &mut usize) -> Result<Option<Part>, Error> {
        let mut lines = Lines::new(work, *pos);

        if self.current_part.is_none() {
            let first = loop {
                match lines.next() {
                    Some(line) if line.content.is_empty() && !line.ending.is_empty() => {
                        // blank preamble line
                        *pos = line.end();
                    }
                    other => break other,
                }
            };

            let Some(first) = first else {
                self.state = State::BuildingHeadersNeedData;
                return Ok(None);
            };

            if first.ending.is_empty() {
                // not a whole line yet
                self.state = State::BuildingHeadersNeedData;
                return Ok(None);
            }

            if !is_delimiter_line(first.content, &self.separator) {
                if first.content.len() >= self.separator.len() {
                    return Err(Error::malformed("Part does not start with boundary"));
                }
                trace!(
                    "tolerating short non-boundary line before part: {}",
                    show_bytes(first.content)
                );
            }

            *pos = first.end();
            self.current_part = Some(Part::new(&self.charset));
        }

        loop {
            let Some(line) = lines.next() else {
                self.state = State::BuildingHeadersNeedData;
                return Ok(None);
            };

            if line.ending.is_empty() {
                self.state = State::BuildingHeadersNeedData;
                return Ok(None);
            }

            let text = self.encoding.decode_without_bom_handling(line.content).0;
            *pos = line.end();

            if text.trim().is_empty() {
                let part = self.close_headers()?;
                self.state = State::BuildingBody;
                return Ok(Some(part));
            }

            let Some((name, value)) = text.split_once(':') else {
                return Err(Error::malformed("Syntax error in header: No colon."));
            };

            if let Some(part) = self.current_part.as_mut() {
                part.push_header(name.trim(), value.trim());
            }
        }
    }

    /// Freeze the in-progress part's headers and derive the structured
    /// fields from them.
    fn close_headers(&mut self) -> Result<Part, Error> {
        let mut part = self
            .current_part
            .take()
            .unwrap_or_else(|| Part::new(&self.charset));

        let disposition = match part.header("Content-Disposition") {
            Some(value) if !value.trim().is_empty() => value.to_owned(),
            _ => return Err(Error::malformed("Content-Disposition header is missing.")),
        };

        let (disposition, options) = parse_options_header(&disposition);
        part.disposition = disposition;
        part.name = options.get("name").map(str::to_owned);
        part.filename = options.get("filename").map(str::to_owned);

        if let Some(content_type) = part.header("Content-Type").map(str::to_owned) {
            let (principal, options) = parse_options_header(&content_type);
            if let Some(charset) = options.get("charset").filter(|c| !c.is_empty()) {
                part.charset = charset.to_owned();
            }
            part.content_type = Some(principal);
        }

        if let Some(value) = part.header("Content-Length") {
            let expected = value
                .trim()
                .parse::<u64>()
                .map_err(|_| Error::malformed("invalid Content-Length in part header"))?;
            part.expected_size = Some(expected);
            self.expected_part_size = Some(expected);
        }

        self.current_part_size = 0;
        debug!(
            "part headers complete: name {:?}, filename {:?}",
            part.name, part.filename
        );

        Ok(part)
    }

    /// Body-building: emit confirmed body bytes until a separator or the
    /// terminator is seen, holding back anything that might still turn out
    /// to be a boundary line.
    fn build_body(&mut self, work: &[u8], pos: &mut usize) -> Result<Option<PartData>, Error> {
        let mut lines = Lines::new(work, *pos);
        let mut emitted = BytesMut::new();

        loop {
            let Some(line) = lines.next() else {
                self.state = State::BuildingBodyNeedData;
                break;
            };

            if is_delimiter_line(line.content, &self.terminator) {
                // the terminator may arrive without its line ending at the
                // very end of the input
                *pos = line.end();
                self.state = State::Finished;
                self.reset_part_tracking();
                break;
            }

            if !line.ending.is_empty() && is_delimiter_line(line.content, &self.separator) {
                // leave the separator for the header pass to re-read
                *pos = line.start;
                self.state = State::BuildingHeaders;
                self.reset_part_tracking();
                break;
            }

            if line.ending.is_empty() && self.could_be_delimiter(line.content) {
                trace!(
                    "holding possible boundary fragment: {}",
                    show_bytes(line.content)
                );
                self.state = State::BuildingBodyNeedData;
                break;
            }

            // confirmed body bytes
            self.police_part_size(line.content.len() as u64)?;
            emitted.extend_from_slice(self.pending_break.as_bytes());
            emitted.extend_from_slice(line.content);
            self.pending_break = line.ending;
            *pos = line.end();
        }

        if emitted.is_empty() {
            Ok(None)
        } else {
            Ok(Some(PartData::new(emitted.freeze())))
        }
    }

    /// Whether an unterminated fragment could still grow into a separator
    /// or terminator line once more bytes arrive.
    fn could_be_delimiter(&self, fragment: &[u8]) -> bool {
        fragment.len() < self.separator.len()
            || self.terminator.starts_with(fragment)
            || is_delimiter_line(fragment, &self.separator)
    }

    fn police_part_size(&mut self, line_size: u64) -> Result<(), Error> {
        if let Some(expected) = self.expected_part_size {
            self.current_part_size += line_size;
            if self.current_part_size > expected {
                return Err(Error::malformed(
                    "Size of part body exceeds part Content-Length.",
                ));
            }
        }
        Ok(())
    }

    fn reset_part_tracking(&mut self) {
        self.expected_part_size = None;
        self.current_part_size = 0;
        self.pending_break = LineEnding::Empty;
    }
}

/// Whole-line delimiter match: the delimiter text followed by nothing but
/// optional ASCII whitespace.
fn is_delimiter_line(line: &[u8], delimiter: &[u8]) -> bool {
    line.starts_with(delimiter)
        && line[delimiter.len()..]
            .iter()
            .all(|b| matches!(b, b' ' | b'\t'))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_fresh_parser_needs_data() {
        let mut parser = MultipartParser::new("X");
        assert!(matches!(parser.next_event(), Event::NeedData));
    }

    #[test]
    fn test_content_length_is_advisory() {
        let parser = MultipartParser::new("X").with_content_length(12);
        assert_eq!(parser.content_length(), Some(12));
        assert_eq!(MultipartParser::new("X").content_length(), None);
    }

    #[test]
    fn test_delimiter_line_matching() {
        assert!(is_delimiter_line(b"--X", b"--X"));
        assert!(is_delimiter_line(b"--X \t", b"--X"));
        assert!(!is_delimiter_line(b"--X--", b"--X"));
        assert!(!is_delimiter_line(b"--Y", b"--X"));
        assert!(!is_delimiter_line(b"--", b"--X"));
    }

    #[test]
    fn test_fragment_delimiter_candidates() {
        let parser = MultipartParser::new("bound");
        assert!(parser.could_be_delimiter(b"-"));
        assert!(parser.could_be_delimiter(b"--bo"));
        assert!(parser.could_be_delimiter(b"--bound"));
        assert!(parser.could_be_delimiter(b"--bound-"));
        assert!(parser.could_be_delimiter(b"--bound "));
        assert!(!parser.could_be_delimiter(b"--bounce"));
        assert!(!parser.could_be_delimiter(b"-- bound"));
    }
}
