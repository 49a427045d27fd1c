use std::collections::{BTreeMap, BTreeSet};

use crate::{
    layout,
    memory::Memory,
    number::format_number,
    word::{aligned, Cell, Flags, CELL, SENTINEL},
    Error, ReplaceErr,
};

// Each dictionary entry starts with this header:
//
//   Pointer to previous entry (0 for the oldest)
//     ^
//     |         Flags
//     |         ^
//     |         |   Length of name            Body (the word's xt) starts here
//     |         |   ^                         |
//     |         |   |                         v
//   +---------+---+---+---+---+---+---+---+---+--- - -
//   | LINK    | x | 4 | T | E | S | T | 0 | 0 |
//   +---------+---+---+---+---+---+---+---+---+--- - -
//                      \------v------/ \--v--/
//                            Name       Padding to the next cell boundary
//
// A native word has an empty body: its body address is a key in the native
// table. A colon definition's body is a list of cells ending with SENTINEL:
//
// +--------+---------+--- - - - ---+---------+----------+
// | HEADER | ENTER   |     ...     | EXIT    | SENTINEL |
// +--------+---------+--- - - - ---+---------+----------+

const FLAGS_OFFSET: Cell = CELL;
const LEN_OFFSET: Cell = CELL + 1;
const NAME_OFFSET: Cell = CELL + 2;

/// What the inner interpreter does when it dispatches a native body address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Native {
    Enter,
    Exit,
    Lit,
    LitString,
    Branch,
    ZeroBranch,
    /// `(LOOP)`: counted loop step with an inline branch offset.
    Loop,
    /// `'`: parses a name when run by the outer interpreter, otherwise pushes
    /// the inline cell that follows it.
    Tick,
    /// Index into the machine's static builtin table.
    Builtin(u16),
    /// Index into the builtins added at runtime by the host.
    Host(u16),
    /// Pushes a constant (or a variable's address).
    Push(Cell),
}

pub struct Dictionary {
    natives: BTreeMap<Cell, Native>,
    /// Headers below this address belong to the built-in vocabulary.
    fence: Cell,
}

impl Default for Dictionary {
    fn default() -> Self {
        Self::new()
    }
}

impl Dictionary {
    pub fn new() -> Self {
        Self {
            natives: BTreeMap::new(),
            fence: 0,
        }
    }

    #[inline]
    pub fn latest(&self, mem: &Memory) -> Cell {
        mem.cell(layout::LATEST)
    }

    #[inline]
    pub fn set_latest(&self, mem: &mut Memory, word: Cell) {
        mem.set_cell(layout::LATEST, word);
    }

    /// Marks everything defined so far as built in (see [`Dictionary::forget`]).
    pub fn seal(&mut self, mem: &Memory) {
        self.fence = mem.here();
    }

    pub fn is_builtin(&self, word: Cell) -> bool {
        word < self.fence
    }

    #[inline]
    pub fn native(&self, xt: Cell) -> Option<Native> {
        self.natives.get(&xt).copied()
    }

    #[inline]
    pub fn link(&self, mem: &Memory, word: Cell) -> Cell {
        mem.cell(word)
    }

    pub fn flags(&self, mem: &Memory, word: Cell) -> Flags {
        Flags::from_bits(mem.byte(word + FLAGS_OFFSET))
    }

    pub fn toggle(&self, mem: &mut Memory, word: Cell, flags: Flags) {
        let cur = mem.byte(word + FLAGS_OFFSET);
        mem.set_byte(word + FLAGS_OFFSET, cur ^ flags.bits());
    }

    fn is_visible(&self, mem: &Memory, word: Cell) -> bool {
        !self.flags(mem, word).contains(Flags::HIDDEN)
    }

    /// The name bytes of the word whose header is at `word`.
    pub fn id(&self, mem: &Memory, word: Cell) -> Vec<u8> {
        let len = mem.byte(word + LEN_OFFSET);
        mem.text(word + NAME_OFFSET, Cell::from(len))
    }

    pub fn name(&self, mem: &Memory, word: Cell) -> String {
        String::from_utf8_lossy(&self.id(mem, word)).into_owned()
    }

    /// First body cell (the execution token) of the word at `word`.
    pub fn body(&self, mem: &Memory, word: Cell) -> Cell {
        let len = mem.byte(word + LEN_OFFSET);
        aligned(word + NAME_OFFSET + Cell::from(len))
    }

    /// Appends a new header at `HERE` and returns the address of its body.
    pub fn create(&mut self, mem: &mut Memory, name: &str, flags: Flags) -> Result<Cell, Error> {
        if name.is_empty() {
            return Err(Error::MissingName);
        }
        let len = u8::try_from(name.len()).replace_err(Error::NameTooLong)?;
        let needed = (NAME_OFFSET + Cell::from(len) + CELL) as usize;
        if mem.unused() < needed {
            return Err(Error::OutOfMemory);
        }

        let word = mem.here();
        mem.append_cell(self.latest(mem));
        mem.append_byte(flags.bits());
        mem.append_byte(len);
        mem.append_text(&name.as_bytes().to_ascii_uppercase());
        mem.align();
        self.set_latest(mem, word);
        tracing::debug!(name, word, ?flags, "created word");
        Ok(mem.here())
    }

    /// Creates a word whose body is the given native operation.
    pub fn define_native(
        &mut self,
        mem: &mut Memory,
        name: &str,
        flags: Flags,
        native: Native,
    ) -> Result<Cell, Error> {
        let xt = self.create(mem, name, flags)?;
        self.natives.insert(xt, native);
        Ok(xt)
    }

    /// Creates a compound word from a list of cells, appending the sentinel.
    pub fn define_words(
        &mut self,
        mem: &mut Memory,
        name: &str,
        flags: Flags,
        cells: &[Cell],
    ) -> Result<Cell, Error> {
        let xt = self.create(mem, name, flags)?;
        if mem.unused() < (cells.len() + 1) * CELL as usize {
            return Err(Error::OutOfMemory);
        }
        for &cell in cells {
            mem.append_cell(cell);
        }
        mem.append_cell(SENTINEL);
        Ok(xt)
    }

    /// Registers a native operation for an existing body address.
    pub fn register(&mut self, xt: Cell, native: Native) {
        self.natives.insert(xt, native);
    }

    /// Newest visible word called `name` (case-insensitive), if any.
    pub fn find(&self, mem: &Memory, name: &str) -> Option<Cell> {
        let wanted = name.as_bytes().to_ascii_uppercase();
        let mut word = self.latest(mem);
        while word != 0 {
            if self.is_visible(mem, word) && self.id(mem, word) == wanted {
                return Some(word);
            }
            word = self.link(mem, word);
        }
        None
    }

    /// The newest word whose header lies below `addr`, i.e. the word whose
    /// body contains `addr`.
    pub fn link_for(&self, mem: &Memory, addr: Cell) -> Option<Cell> {
        let mut word = self.latest(mem);
        while word != 0 {
            if word < addr {
                return Some(word);
            }
            word = self.link(mem, word);
        }
        None
    }

    /// Sorted, de-duplicated names of every visible, finished word.
    pub fn words(&self, mem: &Memory) -> Vec<String> {
        let mut names = BTreeSet::new();
        let mut word = self.latest(mem);
        while word != 0 {
            let flags = self.flags(mem, word);
            if !flags.contains(Flags::HIDDEN) && !flags.contains(Flags::DIRTY) {
                names.insert(self.name(mem, word));
            }
            word = self.link(mem, word);
        }
        names.into_iter().collect()
    }

    /// The oldest word still marked dirty, if any.
    pub fn oldest_dirty(&self, mem: &Memory) -> Option<Cell> {
        let mut found = None;
        let mut word = self.latest(mem);
        while word != 0 {
            if self.flags(mem, word).contains(Flags::DIRTY) {
                found = Some(word);
            }
            word = self.link(mem, word);
        }
        found
    }

    /// Discards `word` and everything defined after it.
    pub fn forget(&mut self, mem: &mut Memory, word: Cell) {
        tracing::debug!(name = %self.name(mem, word), word, "forgetting");
        let link = self.link(mem, word);
        mem.set_here(word);
        self.set_latest(mem, link);
        // A native body address equals the header address of the word that
        // follows it, so `word` itself may still be a live key.
        let _discarded = self.natives.split_off(&(word + 1));
    }

    fn xt_name(&self, mem: &Memory, xt: Cell, base: Cell) -> String {
        match self.link_for(mem, xt) {
            Some(word) => self.name(mem, word),
            None => format_number(xt, base),
        }
    }

    /// Decompiles a single instruction, advancing `addr` past it and any
    /// inline operands.
    fn see_at(&self, mem: &Memory, addr: &mut Cell, base: Cell) -> String {
        let xt = mem.cell(*addr);
        let result = match self.native(xt) {
            // Implied by the leading `:`.
            Some(Native::Enter) => String::new(),
            Some(Native::Lit) => {
                *addr += CELL;
                format!(" {}", format_number(mem.cell(*addr), base))
            }
            Some(Native::LitString) => {
                *addr += CELL;
                let len = mem.cell(*addr);
                let text = mem.text(*addr + CELL, len);
                let end = addr
                    .saturating_add(CELL)
                    .saturating_add(len.max(0))
                    .min(Cell::MAX - CELL);
                *addr = aligned(end) - CELL;
                format!(" S\" {}\"", String::from_utf8_lossy(&text))
            }
            Some(Native::Branch | Native::ZeroBranch | Native::Loop) => {
                let name = self.xt_name(mem, xt, base);
                *addr += CELL;
                format!(" {} {}", name, format_number(mem.cell(*addr), base))
            }
            Some(Native::Tick) => {
                *addr += CELL;
                let target = mem.cell(*addr);
                format!(" ' {}", self.xt_name(mem, target, base))
            }
            Some(Native::Exit) if mem.cell(*addr + CELL) == SENTINEL => String::new(),
            _ => format!(" {}", self.xt_name(mem, xt, base)),
        };
        *addr += CELL;
        result
    }

    /// Source-like listing of the word at `word`, with literals in `base`.
    pub fn see(&self, mem: &Memory, word: Cell, base: Cell) -> String {
        let mut result = format!(": {}", self.name(mem, word));
        if self.flags(mem, word).contains(Flags::IMMEDIATE) {
            result.push_str(" IMMEDIATE");
        }
        let mut addr = self.body(mem, word);
        if self.native(addr).is_some() {
            result.push_str(" ;");
            return result;
        }
        let end = mem.here();
        while addr < end && mem.cell(addr) != SENTINEL {
            result.push_str(&self.see_at(mem, &mut addr, base));
        }
        result.push_str(" ;");
        result
    }
}

#[cfg(test)]
pub mod test {
    use super::{Dictionary, Native};
    use crate::{
        layout,
        memory::Memory,
        word::{Flags, CELL, SENTINEL},
        Error,
    };

    fn fresh() -> (Memory, Dictionary) {
        let mut mem = Memory::new(1024, 64 * 1024);
        mem.set_here(layout::DICTIONARY);
        let dict = Dictionary::new();
        dict.set_latest(&mut mem, 0);
        (mem, dict)
    }

    #[test]
    fn header_layout() {
        let (mut mem, mut dict) = fresh();
        let here = mem.here();
        let xt = dict.create(&mut mem, "dup", Flags::IMMEDIATE).unwrap();
        assert_eq!(dict.latest(&mem), here);
        assert_eq!(mem.cell(here), 0);
        assert_eq!(mem.byte(here + CELL), 0x80);
        assert_eq!(mem.byte(here + CELL + 1), 3);
        assert_eq!(mem.text(here + CELL + 2, 3), b"DUP".to_vec());
        // 4 + 1 + 1 + 3 = 9, padded to 12
        assert_eq!(xt, here + 12);
        assert_eq!(dict.body(&mem, here), xt);
        assert_eq!(mem.here(), xt);
    }

    #[test]
    fn find_and_shadow() {
        let (mut mem, mut dict) = fresh();
        dict.define_native(&mut mem, "FOO", Flags::NONE, Native::Push(1)).unwrap();
        let first = dict.latest(&mem);
        assert_eq!(dict.find(&mem, "foo"), Some(first));

        dict.define_native(&mut mem, "FOO", Flags::NONE, Native::Push(2)).unwrap();
        let second = dict.latest(&mem);
        assert_ne!(first, second);
        assert_eq!(dict.find(&mem, "FOO"), Some(second));
        assert_eq!(dict.words(&mem), vec!["FOO".to_string()]);

        dict.toggle(&mut mem, second, Flags::HIDDEN);
        assert_eq!(dict.find(&mem, "FOO"), Some(first));
        assert_eq!(dict.find(&mem, "BAR"), None);
    }

    #[test]
    fn words_skip_hidden_and_dirty() {
        let (mut mem, mut dict) = fresh();
        dict.create(&mut mem, "B", Flags::NONE).unwrap();
        dict.create(&mut mem, "A", Flags::NONE).unwrap();
        dict.create(&mut mem, "C", Flags::HIDDEN).unwrap();
        dict.create(&mut mem, "D", Flags::DIRTY).unwrap();
        assert_eq!(dict.words(&mem), vec!["A".to_string(), "B".to_string()]);
    }

    #[test]
    fn create_then_forget_restores_state() {
        let (mut mem, mut dict) = fresh();
        dict.define_native(&mut mem, "KEEP", Flags::NONE, Native::Push(7)).unwrap();
        let here = mem.here();
        let latest = dict.latest(&mem);
        let keep_xt = dict.body(&mem, latest);

        dict.create(&mut mem, "GONE", Flags::HIDDEN | Flags::DIRTY).unwrap();
        mem.append_cell(1);
        mem.append_cell(2);
        let gone = dict.latest(&mem);
        assert_eq!(dict.oldest_dirty(&mem), Some(gone));

        dict.forget(&mut mem, gone);
        assert_eq!(mem.here(), here);
        assert_eq!(dict.latest(&mem), latest);
        assert_eq!(dict.native(keep_xt), Some(Native::Push(7)));
        assert_eq!(dict.oldest_dirty(&mem), None);
    }

    #[test]
    fn forget_drops_natives() {
        let (mut mem, mut dict) = fresh();
        let xt = dict.define_native(&mut mem, "X", Flags::NONE, Native::Push(1)).unwrap();
        let word = dict.latest(&mem);
        dict.forget(&mut mem, word);
        assert_eq!(dict.native(xt), None);
    }

    #[test]
    fn link_for_finds_owner() {
        let (mut mem, mut dict) = fresh();
        let a = dict.define_words(&mut mem, "A", Flags::NONE, &[1, 2, 3]).unwrap();
        let a_hdr = dict.latest(&mem);
        let b = dict.define_words(&mut mem, "B", Flags::NONE, &[4]).unwrap();
        let b_hdr = dict.latest(&mem);
        assert_eq!(dict.link_for(&mem, a), Some(a_hdr));
        assert_eq!(dict.link_for(&mem, a + 2 * CELL), Some(a_hdr));
        assert_eq!(dict.link_for(&mem, b), Some(b_hdr));
        assert_eq!(dict.link_for(&mem, a_hdr), None);
        assert_eq!(mem.cell(b + CELL), SENTINEL);
    }

    #[test]
    fn see_decompiles() {
        let (mut mem, mut dict) = fresh();
        let enter = dict.define_native(&mut mem, "ENTER", Flags::NONE, Native::Enter).unwrap();
        let exit = dict.define_native(&mut mem, "EXIT", Flags::NONE, Native::Exit).unwrap();
        let lit = dict.define_native(&mut mem, "LIT", Flags::NONE, Native::Lit).unwrap();
        let litstr = dict
            .define_native(&mut mem, "LITSTRING", Flags::NONE, Native::LitString)
            .unwrap();
        let zbranch = dict
            .define_native(&mut mem, "0BRANCH", Flags::NONE, Native::ZeroBranch)
            .unwrap();
        let star = dict.define_native(&mut mem, "*", Flags::NONE, Native::Builtin(0)).unwrap();

        dict.define_words(&mut mem, "DOUBLE", Flags::NONE, &[enter, lit, 2, star, exit])
            .unwrap();
        let double = dict.latest(&mem);
        assert_eq!(dict.see(&mem, double, 10), ": DOUBLE 2 * ;");

        let double_xt = dict.body(&mem, double);
        let hi = i32::from_be_bytes(*b"HI\0\0");
        dict.define_words(
            &mut mem,
            "MIX",
            Flags::IMMEDIATE,
            &[enter, zbranch, 8, exit, lit, 255, litstr, 2, hi, double_xt, exit],
        )
        .unwrap();
        let mix = dict.latest(&mem);
        assert_eq!(
            dict.see(&mem, mix, 16),
            ": MIX IMMEDIATE 0BRANCH 8 EXIT FF S\" HI\" DOUBLE ;"
        );

        let star_hdr = dict.link_for(&mem, star).unwrap();
        assert_eq!(dict.see(&mem, star_hdr, 10), ": * ;");
    }

    #[test]
    fn rejects_bad_names() {
        let (mut mem, mut dict) = fresh();
        assert_eq!(dict.create(&mut mem, "", Flags::NONE), Err(Error::MissingName));
        let long = "X".repeat(300);
        assert_eq!(dict.create(&mut mem, &long, Flags::NONE), Err(Error::NameTooLong));

        let mut tiny = Memory::new(64, layout::DICTIONARY as usize + 8);
        tiny.set_here(layout::DICTIONARY);
        assert_eq!(dict.create(&mut tiny, "TOOBIG", Flags::NONE), Err(Error::OutOfMemory));
    }
}
