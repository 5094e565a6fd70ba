//! AFL harness: feed arbitrary bytes through the parser under an
//! input-derived chunking. The parser must never panic; errors are fine.

use multipart_sansio::MultipartParser;

fn main() {
    afl::fuzz!(|data: &[u8]| {
        let Some((&chunking, body)) = data.split_first() else {
            return;
        };
        let chunk_len = usize::from(chunking) % 16 + 1;

        let mut parser = MultipartParser::new("fuzz");
        for chunk in body.chunks(chunk_len) {
            if parser.feed(chunk).is_err() {
                return;
            }
            for event in parser.events() {
                drop(event);
            }
        }
        let _ = parser.finish();
    });
}
