//! End-to-end tests of the event stream, including the chunking
//! invariance the sans-I/O design exists for: any split of the input must
//! produce the same parts and the same body bytes as a single-shot parse.

use multipart_sansio::{Error, Event, MultipartParser, Part};

const SINGLE_PART: &[u8] =
    b"--X\r\nContent-Disposition: form-data; name=\"a\"\r\n\r\nhello\r\n--X--\r\n";

const TWO_PARTS: &[u8] = b"--X\r\n\
    Content-Disposition: form-data; name=\"a\"\r\n\r\n\
    1\r\n\
    --X\r\n\
    Content-Disposition: form-data; name=\"b\"\r\n\r\n\
    2\r\n\
    --X--\r\n";

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Feed the chunks, collecting each part with its reassembled body.
fn run_chunks(boundary: &str, chunks: &[&[u8]]) -> Result<Vec<(Part, Vec<u8>)>, Error> {
    let mut parser = MultipartParser::new(boundary);
    let mut parts: Vec<(Part, Vec<u8>)> = Vec::new();

    for chunk in chunks {
        parser.feed(chunk)?;
        for event in parser.events() {
            match event {
                Event::Part(part) => parts.push((part, Vec::new())),
                Event::PartData(data) => {
                    let (_, body) = parts.last_mut().expect("data before any part");
                    body.extend_from_slice(&data.raw);
                }
                Event::NeedData | Event::Finished => {}
            }
        }
    }

    parser.finish()?;
    Ok(parts)
}

fn run_single_shot(boundary: &str, input: &[u8]) -> Result<Vec<(Part, Vec<u8>)>, Error> {
    run_chunks(boundary, &[input])
}

#[test]
fn single_text_part() {
    init_logging();

    let mut parser = MultipartParser::new("X");
    let events = parser.parse(SINGLE_PART).unwrap();

    assert_eq!(events.len(), 3);
    match &events[0] {
        Event::Part(part) => {
            assert_eq!(part.disposition, "form-data");
            assert_eq!(part.name.as_deref(), Some("a"));
            assert_eq!(part.filename, None);
            assert_eq!(part.charset, "latin1");
        }
        other => panic!("expected Part, got {:?}", other),
    }
    match &events[1] {
        Event::PartData(data) => {
            assert_eq!(&data.raw[..], b"hello");
            assert_eq!(data.size, 5);
        }
        other => panic!("expected PartData, got {:?}", other),
    }
    assert!(matches!(events[2], Event::Finished));

    parser.finish().unwrap();
}

#[test]
fn file_upload_with_charset_and_ie6_filename() {
    init_logging();

    let input: &[u8] = b"--X\r\n\
        Content-Disposition: form-data; name=\"f\"; filename=\"C:\\path\\a.txt\"\r\n\
        Content-Type: text/plain; charset=utf-8\r\n\r\n\
        \xcf\x80\n\r\n\
        --X--\r\n";

    let parts = run_single_shot("X", input).unwrap();
    assert_eq!(parts.len(), 1);

    let (part, body) = &parts[0];
    assert_eq!(part.name.as_deref(), Some("f"));
    assert_eq!(part.filename.as_deref(), Some("a.txt"));
    assert_eq!(part.content_type.as_deref(), Some("text/plain"));
    assert_eq!(part.charset, "utf-8");
    assert_eq!(body, b"\xcf\x80\n");
}

#[test]
fn chunked_mid_boundary() {
    init_logging();

    // the input split inside the terminator line: "...hello\r\n--X" / "-" / "-\r\n"
    let chunks: &[&[u8]] = &[&SINGLE_PART[..59], b"-", b"-\r\n"];
    assert_eq!(&SINGLE_PART[56..59], b"--X");

    let mut parser = MultipartParser::new("X");
    let mut names = Vec::new();
    let mut body = Vec::new();

    for chunk in chunks {
        parser.feed(chunk).unwrap();
        for event in parser.events() {
            match event {
                Event::Part(part) => names.push(part.name.clone()),
                Event::PartData(data) => {
                    // boundary bytes must never leak into body data
                    assert!(!data
                        .raw
                        .windows(3)
                        .any(|window| window == b"--X"));
                    body.extend_from_slice(&data.raw);
                }
                Event::NeedData | Event::Finished => {}
            }
        }
    }
    parser.finish().unwrap();

    assert_eq!(names, vec![Some("a".to_owned())]);
    assert_eq!(body, b"hello");
}

#[test]
fn two_parts() {
    init_logging();

    let parts = run_single_shot("X", TWO_PARTS).unwrap();
    assert_eq!(parts.len(), 2);
    assert_eq!(parts[0].0.name.as_deref(), Some("a"));
    assert_eq!(parts[0].1, b"1");
    assert_eq!(parts[1].0.name.as_deref(), Some("b"));
    assert_eq!(parts[1].1, b"2");
}

#[test]
fn every_split_point_parses_identically() {
    init_logging();

    for input in [SINGLE_PART, TWO_PARTS] {
        let expected = run_single_shot("X", input).unwrap();

        for split_at in 0..=input.len() {
            let (left, right) = input.split_at(split_at);
            let parts = run_chunks("X", &[left, right])
                .unwrap_or_else(|err| panic!("split at {} failed: {}", split_at, err));

            assert_eq!(parts.len(), expected.len(), "split at {}", split_at);
            for (got, want) in parts.iter().zip(&expected) {
                assert_eq!(got.0.name, want.0.name, "split at {}", split_at);
                assert_eq!(got.1, want.1, "split at {}", split_at);
            }
        }
    }
}

#[test]
fn byte_at_a_time_feed() {
    init_logging();

    let chunks: Vec<&[u8]> = TWO_PARTS.chunks(1).collect();
    let parts = run_chunks("X", &chunks).unwrap();

    assert_eq!(parts.len(), 2);
    assert_eq!(parts[0].1, b"1");
    assert_eq!(parts[1].1, b"2");
}

#[test]
fn line_ending_agnosticism() {
    init_logging();

    let crlf = String::from_utf8(SINGLE_PART.to_vec()).unwrap();
    let lf = crlf.replace("\r\n", "\n");
    let cr = crlf.replace("\r\n", "\r");

    for input in [lf.as_bytes(), cr.as_bytes()] {
        let parts = run_single_shot("X", input).unwrap();
        assert_eq!(parts.len(), 1);
        assert_eq!(parts[0].0.name.as_deref(), Some("a"));
        assert_eq!(parts[0].1, b"hello");
    }
}

#[test]
fn multiline_body_keeps_interior_breaks() {
    init_logging();

    let input: &[u8] = b"--X\r\n\
        Content-Disposition: form-data; name=\"a\"\r\n\r\n\
        line one\r\n\
        \r\n\
        line three\r\n\
        --X--\r\n";

    let expected: &[u8] = b"line one\r\n\r\nline three";
    let single = run_single_shot("X", input).unwrap();
    assert_eq!(single[0].1, expected);

    for split_at in 0..=input.len() {
        let (left, right) = input.split_at(split_at);
        let parts = run_chunks("X", &[left, right]).unwrap();
        assert_eq!(parts[0].1, expected, "split at {}", split_at);
    }
}

#[test]
fn content_length_overflow() {
    init_logging();

    let input: &[u8] = b"--X\r\n\
        Content-Disposition: form-data; name=\"a\"\r\n\
        Content-Length: 3\r\n\r\n\
        1234\r\n\
        --X--\r\n";

    let err = run_single_shot("X", input).unwrap_err();
    match err {
        Error::MalformedData(msg) => assert!(msg.contains("exceeds"), "{}", msg),
        other => panic!("expected MalformedData, got {:?}", other),
    }

    // exceeding is detected under any chunking
    for split_at in 0..=input.len() {
        let (left, right) = input.split_at(split_at);
        assert!(
            matches!(run_chunks("X", &[left, right]), Err(Error::MalformedData(_))),
            "split at {}",
            split_at
        );
    }
}

#[test]
fn content_length_exact_is_accepted() {
    init_logging();

    let input: &[u8] = b"--X\r\n\
        Content-Disposition: form-data; name=\"a\"\r\n\
        Content-Length: 3\r\n\r\n\
        123\r\n\
        --X--\r\n";

    let parts = run_single_shot("X", input).unwrap();
    assert_eq!(parts[0].0.expected_size, Some(3));
    assert_eq!(parts[0].1, b"123");
}

#[test]
fn missing_content_disposition() {
    init_logging();

    let input: &[u8] = b"--X\r\nContent-Type: text/plain\r\n\r\nhi\r\n--X--\r\n";
    let err = run_single_shot("X", input).unwrap_err();
    match err {
        Error::MalformedData(msg) => assert!(msg.contains("Content-Disposition"), "{}", msg),
        other => panic!("expected MalformedData, got {:?}", other),
    }
}

#[test]
fn header_line_without_colon() {
    init_logging();

    let input: &[u8] = b"--X\r\nnot a header line\r\n\r\nhi\r\n--X--\r\n";
    let err = run_single_shot("X", input).unwrap_err();
    match err {
        Error::MalformedData(msg) => assert!(msg.contains("No colon"), "{}", msg),
        other => panic!("expected MalformedData, got {:?}", other),
    }
}

#[test]
fn unexpected_eof() {
    init_logging();

    // truncated before the terminator line
    let truncated = &SINGLE_PART[..SINGLE_PART.len() - 7];

    let mut parser = MultipartParser::new("X");
    parser.feed(truncated).unwrap();
    let _ = parser.events().count();
    assert!(matches!(parser.finish(), Err(Error::UnexpectedExit)));
}

#[test]
fn corrupt_first_boundary_is_rejected() {
    init_logging();

    // corrupt each byte of the opening separator line in turn
    for idx in 0..3 {
        let mut input = SINGLE_PART.to_vec();
        input[idx] = b'#';
        assert!(
            matches!(run_single_shot("X", &input), Err(Error::MalformedData(_))),
            "corrupted byte {}",
            idx
        );
    }
}

#[test]
fn corrupt_interior_separator_becomes_body() {
    init_logging();

    // flip one byte of the separator between the two parts: everything up
    // to the terminator is then part `a`'s body
    let mut input = TWO_PARTS.to_vec();
    let sep_at = 52;
    assert_eq!(&input[sep_at..sep_at + 5], b"--X\r\n");
    input[sep_at + 2] ^= 0x20;

    let parts = run_single_shot("X", &input).unwrap();
    assert_eq!(parts.len(), 1);
    assert_eq!(parts[0].0.name.as_deref(), Some("a"));
    assert!(parts[0].1.starts_with(b"1\r\n--x\r\n"));
    assert!(parts[0].1.ends_with(b"\r\n2"));
}

#[test]
fn leading_blank_lines_are_tolerated() {
    init_logging();

    let mut input = b"\r\n\r\n".to_vec();
    input.extend_from_slice(SINGLE_PART);

    let parts = run_single_shot("X", &input).unwrap();
    assert_eq!(parts.len(), 1);
    assert_eq!(parts[0].1, b"hello");
}

#[test]
fn trailing_bytes_after_terminator_are_ignored() {
    init_logging();

    let mut input = SINGLE_PART.to_vec();
    input.extend_from_slice(b"epilogue junk");

    let parts = run_single_shot("X", &input).unwrap();
    assert_eq!(parts.len(), 1);
}

#[test]
fn feeding_after_finished_is_a_no_op() {
    init_logging();

    let mut parser = MultipartParser::new("X");
    parser.feed(SINGLE_PART).unwrap();
    let events = parser.events().count();
    assert_eq!(events, 3);

    parser.feed(b"more bytes").unwrap();
    assert_eq!(parser.events().count(), 0);
    assert!(matches!(parser.next_event(), Event::Finished));
    parser.finish().unwrap();
}

#[test]
fn parser_is_unusable_after_error() {
    init_logging();

    let mut parser = MultipartParser::new("X");
    let err = parser.feed(b"--WRONG-BOUNDARY\r\n").unwrap_err();
    assert!(matches!(err, Error::MalformedData(_)));

    assert!(matches!(parser.feed(b"--X\r\n"), Err(Error::InvalidState)));
}

#[test]
fn terminator_without_trailing_newline_finishes() {
    init_logging();

    let input = &SINGLE_PART[..SINGLE_PART.len() - 2];
    let parts = run_single_shot("X", input).unwrap();
    assert_eq!(parts.len(), 1);
    assert_eq!(parts[0].1, b"hello");
}

#[test]
fn separator_sized_body_line_is_emitted() {
    init_logging();

    // "abc" is exactly as long as the separator "--X" but has a line
    // terminator, so it is plain body data
    let input: &[u8] = b"--X\r\n\
        Content-Disposition: form-data; name=\"a\"\r\n\r\n\
        abc\r\n\
        --X--\r\n";

    let parts = run_single_shot("X", input).unwrap();
    assert_eq!(parts[0].1, b"abc");
}

#[test]
fn next_event_reports_need_data_then_finished() {
    init_logging();

    let mut parser = MultipartParser::new("X");
    assert!(matches!(parser.next_event(), Event::NeedData));

    parser.feed(SINGLE_PART).unwrap();
    assert!(matches!(parser.next_event(), Event::Part(_)));
    assert!(matches!(parser.next_event(), Event::PartData(_)));
    assert!(matches!(parser.next_event(), Event::Finished));
    // drained and finished: stays Finished
    assert!(matches!(parser.next_event(), Event::Finished));
}
