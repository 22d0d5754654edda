//! Tokenizer for MC5 declaration texts.

/// A cursor over one MC5 declaration text.
///
/// The text decomposes into words, single-byte delimiter tokens from a
/// caller-supplied set, and `//` line comments. Whitespace separates tokens
/// and is never returned.
pub(crate) struct Tokenizer<'a> {
    text: &'a [u8],
    pos: usize,
}

impl<'a> Tokenizer<'a> {
    pub(crate) fn new(text: &'a [u8]) -> Self {
        Self { text, pos: 0 }
    }

    /// Current cursor position, in bytes.
    pub(crate) fn position(&self) -> usize {
        self.pos
    }

    /// Move the cursor to an earlier [`position`](Self::position).
    ///
    /// Complex array elements are laid out by re-reading their type
    /// declaration once per element.
    pub(crate) fn seek(&mut self, position: usize) {
        debug_assert!(position <= self.text.len());
        self.pos = position;
    }

    /// Step back over the last returned token, given its byte length.
    pub(crate) fn rewind(&mut self, len: usize) {
        debug_assert!(len <= self.pos);
        self.pos -= len;
    }

    /// The next token, or `None` at end of input.
    ///
    /// Bytes in `delimiters` come back as single-byte tokens and terminate
    /// words. Line comments are skipped unless `want_comments` is set, in
    /// which case they come back with the leading `//` and without the line
    /// terminator.
    pub(crate) fn next_token(&mut self, delimiters: &[u8], want_comments: bool) -> Option<&'a [u8]> {
        loop {
            while self.pos < self.text.len() && self.text[self.pos].is_ascii_whitespace() {
                self.pos += 1;
            }
            if self.pos == self.text.len() {
                return None;
            }
            let start = self.pos;
            if self.text[start..].starts_with(b"//") {
                while self.pos < self.text.len()
                    && self.text[self.pos] != b'\r'
                    && self.text[self.pos] != b'\n'
                {
                    self.pos += 1;
                }
                if want_comments {
                    return Some(&self.text[start..self.pos]);
                }
                continue;
            }
            if delimiters.contains(&self.text[start]) {
                self.pos += 1;
                return Some(&self.text[start..self.pos]);
            }
            while self.pos < self.text.len()
                && !self.text[self.pos].is_ascii_whitespace()
                && !delimiters.contains(&self.text[self.pos])
            {
                self.pos += 1;
            }
            return Some(&self.text[start..self.pos]);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn words_and_delimiters() {
        let mut tokens = Tokenizer::new(b"abc : ARRAY[1..5];");
        assert_eq!(Some(&b"abc"[..]), tokens.next_token(b":;[]", false));
        assert_eq!(Some(&b":"[..]), tokens.next_token(b":;[]", false));
        assert_eq!(Some(&b"ARRAY"[..]), tokens.next_token(b":;[]", false));
        assert_eq!(Some(&b"["[..]), tokens.next_token(b":;[]", false));
        // With only the dot as delimiter, the bracket is part of the word.
        assert_eq!(Some(&b"1"[..]), tokens.next_token(b".", false));
        assert_eq!(Some(&b"."[..]), tokens.next_token(b".", false));
        assert_eq!(Some(&b"."[..]), tokens.next_token(b".", false));
        assert_eq!(Some(&b"5];"[..]), tokens.next_token(b".", false));
        assert_eq!(None, tokens.next_token(b".", false));
    }

    #[test]
    fn comments_are_skipped_by_default() {
        let mut tokens = Tokenizer::new(b"a // note\r\nb");
        assert_eq!(Some(&b"a"[..]), tokens.next_token(b"", false));
        assert_eq!(Some(&b"b"[..]), tokens.next_token(b"", false));
        assert_eq!(None, tokens.next_token(b"", false));
    }

    #[test]
    fn comments_on_request() {
        let mut tokens = Tokenizer::new(b"// first\n// second\nnext");
        assert_eq!(Some(&b"// first"[..]), tokens.next_token(b"", true));
        assert_eq!(Some(&b"// second"[..]), tokens.next_token(b"", true));
        assert_eq!(Some(&b"next"[..]), tokens.next_token(b"", true));
    }

    #[test]
    fn rewind_returns_the_same_token() {
        let mut tokens = Tokenizer::new(b"a ; END_VAR");
        assert_eq!(Some(&b"a"[..]), tokens.next_token(b";", false));
        assert_eq!(Some(&b";"[..]), tokens.next_token(b";", false));
        let token = tokens.next_token(b";", false).unwrap();
        assert_eq!(b"END_VAR", token);
        tokens.rewind(token.len());
        assert_eq!(Some(&b"END_VAR"[..]), tokens.next_token(b";", false));
    }

    #[test]
    fn seek_replays_from_a_saved_position() {
        let mut tokens = Tokenizer::new(b"UDT 7 ; rest");
        assert_eq!(Some(&b"UDT"[..]), tokens.next_token(b";", false));
        let saved = tokens.position();
        assert_eq!(Some(&b"7"[..]), tokens.next_token(b";", false));
        tokens.seek(saved);
        assert_eq!(Some(&b"7"[..]), tokens.next_token(b";", false));
    }
}
