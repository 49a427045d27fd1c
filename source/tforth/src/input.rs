use crate::{layout, memory::Memory, word::Cell};

/// Cursor over the line buffer at [`layout::BUFFER`].
///
/// The text itself lives in the VM's memory so that `WORD` can hand programs
/// an address into it. Tokens are returned as `(address, length)` pairs.
pub struct LineBuffer {
    len: Cell,
    cur: Cell,
    exhausted: bool,
}

impl Default for LineBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl LineBuffer {
    pub fn new() -> Self {
        Self {
            len: 0,
            cur: 0,
            exhausted: true,
        }
    }

    /// Copies `line` into the buffer. Lines longer than the buffer are
    /// truncated.
    pub fn fill(&mut self, mem: &mut Memory, line: &str) {
        let mut bytes = line.trim_end_matches(['\r', '\n']).as_bytes();
        if bytes.len() > layout::BUFFER_SIZE as usize {
            tracing::warn!(len = bytes.len(), max = layout::BUFFER_SIZE, "truncating input line");
            bytes = &bytes[..layout::BUFFER_SIZE as usize];
        }
        mem.set_text(layout::BUFFER, bytes);
        self.len = bytes.len() as Cell;
        self.cur = 0;
        self.exhausted = false;
    }

    /// Whether the outer interpreter has used up the current line and needs
    /// a new one.
    #[inline]
    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    #[inline]
    pub fn mark_exhausted(&mut self) {
        self.exhausted = true;
    }

    /// Discards whatever is left of the current line.
    pub fn flush(&mut self) {
        self.cur = self.len;
        self.exhausted = true;
    }

    fn at(&self, mem: &Memory, pos: Cell) -> u8 {
        mem.byte(layout::BUFFER + pos)
    }

    /// Next whitespace-delimited token. A `\` at the start of a token
    /// comments out the rest of the line.
    pub fn next_token(&mut self, mem: &Memory) -> Option<(Cell, Cell)> {
        while self.cur < self.len && self.at(mem, self.cur).is_ascii_whitespace() {
            self.cur += 1;
        }
        if self.cur >= self.len {
            return None;
        }
        let start = self.cur;
        while self.cur < self.len && !self.at(mem, self.cur).is_ascii_whitespace() {
            self.cur += 1;
        }
        if self.at(mem, start) == b'\\' {
            self.cur = self.len;
            return None;
        }
        Some((layout::BUFFER + start, self.cur - start))
    }

    /// Text up to (not including) `delim`, skipping the single space that
    /// separates it from the preceding token. The cursor ends up past the
    /// delimiter. Returns `None` if the line holds no `delim`; the rest of
    /// the line is consumed either way.
    pub fn scan_until(&mut self, mem: &Memory, delim: u8) -> Option<(Cell, Cell)> {
        if self.cur < self.len && self.at(mem, self.cur).is_ascii_whitespace() {
            self.cur += 1;
        }
        let start = self.cur;
        while self.cur < self.len {
            if self.at(mem, self.cur) == delim {
                let found = (layout::BUFFER + start, self.cur - start);
                self.cur += 1;
                return Some(found);
            }
            self.cur += 1;
        }
        None
    }
}

/// Reads a token back out of memory.
pub fn token_text(mem: &Memory, (addr, len): (Cell, Cell)) -> String {
    String::from_utf8_lossy(&mem.text(addr, len)).into_owned()
}

#[cfg(test)]
pub mod test {
    use super::{token_text, LineBuffer};
    use crate::{layout, memory::Memory};

    fn tokens(buf: &mut LineBuffer, mem: &Memory) -> Vec<String> {
        let mut out = Vec::new();
        while let Some(tok) = buf.next_token(mem) {
            out.push(token_text(mem, tok));
        }
        out
    }

    #[test]
    fn splits_on_whitespace() {
        let mut mem = Memory::new(1024, 8192);
        let mut buf = LineBuffer::new();
        assert!(buf.is_exhausted());

        buf.fill(&mut mem, "  : double\t2 * ;  \n");
        assert!(!buf.is_exhausted());
        assert_eq!(tokens(&mut buf, &mem), vec![":", "double", "2", "*", ";"]);
        assert_eq!(buf.next_token(&mem), None);
    }

    #[test]
    fn tokens_point_into_the_buffer() {
        let mut mem = Memory::new(1024, 8192);
        let mut buf = LineBuffer::new();
        buf.fill(&mut mem, "ab cde");
        assert_eq!(buf.next_token(&mem), Some((layout::BUFFER, 2)));
        assert_eq!(buf.next_token(&mem), Some((layout::BUFFER + 3, 3)));
    }

    #[test]
    fn backslash_comments() {
        let mut mem = Memory::new(1024, 8192);
        let mut buf = LineBuffer::new();
        buf.fill(&mut mem, "1 2 \\ 3 4");
        assert_eq!(tokens(&mut buf, &mem), vec!["1", "2"]);

        // Only at the start of a token.
        buf.fill(&mut mem, "a\\b c");
        assert_eq!(tokens(&mut buf, &mem), vec!["a\\b", "c"]);
    }

    #[test]
    fn scans_strings() {
        let mut mem = Memory::new(1024, 8192);
        let mut buf = LineBuffer::new();
        buf.fill(&mut mem, ".\" hello  world\" DUP");
        assert_eq!(buf.next_token(&mem).map(|t| token_text(&mem, t)), Some(".\"".into()));
        let s = buf.scan_until(&mem, b'"').unwrap();
        assert_eq!(token_text(&mem, s), "hello  world");
        assert_eq!(tokens(&mut buf, &mem), vec!["DUP"]);

        buf.fill(&mut mem, "S\" oops");
        buf.next_token(&mem);
        assert_eq!(buf.scan_until(&mem, b'"'), None);
        assert_eq!(buf.next_token(&mem), None);
    }

    #[test]
    fn truncates_and_flushes() {
        let mut mem = Memory::new(1024, 8192);
        let mut buf = LineBuffer::new();
        let long = "X".repeat(300);
        buf.fill(&mut mem, &long);
        let tok = buf.next_token(&mem).unwrap();
        assert_eq!(tok.1, layout::BUFFER_SIZE);

        buf.fill(&mut mem, "1 2 3");
        buf.next_token(&mem);
        buf.flush();
        assert!(buf.is_exhausted());
        assert_eq!(buf.next_token(&mem), None);
    }
}
