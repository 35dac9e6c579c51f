use std::char::REPLACEMENT_CHARACTER;

/// Incremental UTF-8 decoder for a body that arrives in arbitrary byte chunks.
///
/// A character split across two reads is held back until its remaining bytes
/// arrive. Invalid sequences decode to U+FFFD and decoding carries on.
#[derive(Debug, Default)]
pub struct Utf8ChunkDecoder {
    pending: Vec<u8>,
}

impl Utf8ChunkDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode as much of `bytes` (plus anything held back) as forms complete
    /// characters.
    pub fn decode(&mut self, bytes: &[u8]) -> String {
        self.pending.extend_from_slice(bytes);

        let mut text = String::with_capacity(self.pending.len());
        let mut cursor = 0;

        while cursor < self.pending.len() {
            match std::str::from_utf8(&self.pending[cursor..]) {
                Ok(valid) => {
                    text.push_str(valid);
                    cursor = self.pending.len();
                }
                Err(err) => {
                    let valid_end = cursor + err.valid_up_to();
                    text.push_str(&String::from_utf8_lossy(&self.pending[cursor..valid_end]));

                    match err.error_len() {
                        Some(invalid_len) => {
                            text.push(REPLACEMENT_CHARACTER);
                            cursor = valid_end + invalid_len;
                        }
                        // incomplete sequence at the end, wait for more bytes
                        None => {
                            cursor = valid_end;
                            break;
                        }
                    }
                }
            }
        }

        self.pending.drain(..cursor);
        text
    }

    /// Flush at end of stream. A truncated trailing character becomes a
    /// single U+FFFD.
    pub fn finish(&mut self) -> String {
        if self.pending.is_empty() {
            return String::new();
        }
        self.pending.clear();
        REPLACEMENT_CHARACTER.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn passes_complete_text_through() {
        let mut decoder = Utf8ChunkDecoder::new();
        assert_eq!(decoder.decode("ایک دفعہ".as_bytes()), "ایک دفعہ");
        assert_eq!(decoder.finish(), "");
    }

    #[test]
    fn holds_back_character_split_across_reads() {
        let word = "دفعہ".as_bytes();
        // every Arabic-script letter is two bytes; split inside the first one
        let mut decoder = Utf8ChunkDecoder::new();

        assert_eq!(decoder.decode(&word[..1]), "");
        assert_eq!(decoder.decode(&word[1..3]), "د");
        assert_eq!(decoder.decode(&word[3..]), "فعہ");
        assert_eq!(decoder.finish(), "");
    }

    #[test]
    fn byte_at_a_time_reassembles_the_text() {
        let story = "ایک دفعہ کا ذکر ہے";
        let mut decoder = Utf8ChunkDecoder::new();
        let mut out = String::new();
        for byte in story.as_bytes() {
            out.push_str(&decoder.decode(std::slice::from_ref(byte)));
        }
        out.push_str(&decoder.finish());
        assert_eq!(out, story);
    }

    #[test]
    fn invalid_bytes_become_replacement_characters() {
        let mut decoder = Utf8ChunkDecoder::new();
        assert_eq!(decoder.decode(b"ab\xFFcd"), "ab\u{FFFD}cd");
        assert_eq!(decoder.finish(), "");
    }

    #[test]
    fn truncated_tail_is_flushed_as_one_replacement() {
        let mut decoder = Utf8ChunkDecoder::new();
        let bytes = "کا".as_bytes();
        assert_eq!(decoder.decode(&bytes[..3]), "ک");
        assert_eq!(decoder.finish(), "\u{FFFD}");
        assert_eq!(decoder.finish(), "");
    }
}
