//! A forward-only read head over borrowed text. Positions are byte offsets and always sit on
//! char boundaries; nothing here ever copies or mutates the source.

/// Borrowed source text plus a position that only ever moves forward. Cloning is how you get a
/// lookahead: scan ahead with the clone, then either `seek` the original to where the clone
/// ended up or throw the clone away.
#[derive(Clone, Debug)]
pub struct Cursor<'a> {
    source: &'a str,
    pos: usize,
}

impl<'a> Cursor<'a> {
    pub fn new(source: &'a str) -> Self {
        Self { source, pos: 0 }
    }

    pub fn source(&self) -> &'a str {
        self.source
    }

    pub fn pos(&self) -> usize {
        self.pos
    }

    pub fn len(&self) -> usize {
        self.source.len()
    }

    pub fn is_empty(&self) -> bool {
        self.source.is_empty()
    }

    pub fn at_end(&self) -> bool {
        self.pos >= self.source.len()
    }

    /// Everything from the current position on
    pub fn rest(&self) -> &'a str {
        &self.source[self.pos..]
    }

    /// The character under the cursor, without consuming it
    pub fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    /// Consume and return the character under the cursor. Remember chars are up to 4 bytes!
    pub fn bump(&mut self) -> Option<char> {
        let ch = self.peek()?;
        self.pos += ch.len_utf8();
        Some(ch)
    }

    /// Consume exactly one `expected` character. Returns false (and doesn't move) if the next
    /// character is anything else.
    pub fn expect(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.pos += expected.len_utf8();
            true
        } else {
            false
        }
    }

    /// Move past every character for which `stop` is false, returning the run that was skipped.
    /// Stops at the first character where `stop` is true (or at the end).
    pub fn advance_until<P>(&mut self, stop: P) -> &'a str
    where
        P: FnMut(char) -> bool,
    {
        let end = self.find_char(stop).unwrap_or(self.source.len());
        self.take_to(end)
    }

    pub fn skip_whitespace(&mut self) -> &'a str {
        self.advance_until(|c| !c.is_whitespace())
    }

    /// Jump forward to `pos` (clamped to the length). Asking to go backward does nothing.
    pub fn seek(&mut self, pos: usize) {
        let pos = pos.min(self.source.len());
        if pos > self.pos {
            debug_assert!(self.source.is_char_boundary(pos));
            self.pos = pos;
        }
    }

    /// Seek to `end` and return the text that was passed over
    pub fn take_to(&mut self, end: usize) -> &'a str {
        let begin = self.pos;
        self.seek(end);
        self.slice(begin, self.pos)
    }

    /// The source between two offsets. Out of range or inverted offsets produce an empty string
    /// rather than a panic.
    pub fn slice(&self, begin: usize, end: usize) -> &'a str {
        let end = end.min(self.source.len());
        if begin >= end {
            return "";
        }
        self.source.get(begin..end).unwrap_or("")
    }

    /// Absolute offset of the first character at or after the cursor matching `pred`
    pub fn find_char<P>(&self, pred: P) -> Option<usize>
    where
        P: FnMut(char) -> bool,
    {
        self.rest().find(pred).map(|i| self.pos + i)
    }

    /// Same as [`Cursor::find_char`], but only looks at characters before `limit`
    pub fn find_char_before<P>(&self, limit: usize, pred: P) -> Option<usize>
    where
        P: FnMut(char) -> bool,
    {
        self.slice(self.pos, limit).find(pred).map(|i| self.pos + i)
    }

    /// Absolute offset of the next occurrence of `pattern` at or after the cursor
    pub fn find(&self, pattern: &str) -> Option<usize> {
        self.rest().find(pattern).map(|i| self.pos + i)
    }
}
