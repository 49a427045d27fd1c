//! The outer interpreter, the colon compiler, and the words that parse their
//! arguments out of the input line.

use crate::{
    dictionary::Native,
    input::token_text,
    layout,
    number::parse_number,
    system::System,
    vm::{Machine, Origin},
    word::{aligned, Cell, Flags, CELL, SENTINEL},
    Error, State,
};

impl<S: System + 'static> Machine<S> {
    /// Reads the next token, refilling the line buffer as needed.
    fn next_token(&mut self) -> Result<(Cell, Cell), Error> {
        loop {
            if let Some(tok) = self.input.next_token(&self.mem) {
                return Ok(tok);
            }
            match self.system.read_line() {
                Some(line) => self.input.fill(&mut self.mem, &line),
                None => return Err(Error::MissingName),
            }
        }
    }

    fn word(&mut self) -> Result<String, Error> {
        let tok = self.next_token()?;
        Ok(token_text(&self.mem, tok))
    }

    /// Looks up the word named by the next token.
    fn named_word(&mut self) -> Result<Cell, Error> {
        let name = self.word()?;
        self.dict
            .find(&self.mem, &name)
            .ok_or(Error::UnknownWord(name))
    }

    pub fn interpret(&mut self) -> Result<(), Error> {
        if self.input.is_exhausted() {
            match self.system.read_line() {
                Some(line) => self.input.fill(&mut self.mem, &line),
                None => return Err(Error::Halt(0)),
            }
        }
        let tok = match self.input.next_token(&self.mem) {
            Some(tok) => tok,
            None => {
                self.input.mark_exhausted();
                return Ok(());
            }
        };
        let name = token_text(&self.mem, tok);

        if let Some(word) = self.dict.find(&self.mem, &name) {
            let xt = self.dict.body(&self.mem, word);
            let immediate = self.dict.flags(&self.mem, word).contains(Flags::IMMEDIATE);
            if immediate || self.state() == State::Immediate {
                self.schedule(xt, Origin::Interpret);
                return Ok(());
            }
            return self.comma(xt);
        }

        let val = parse_number(&name, self.base())?;
        match self.state() {
            State::Immediate => self.push(val),
            State::Compile => {
                self.comma(self.core.lit)?;
                self.comma(val)
            }
        }
    }

    /// `'`: when compiled, pushes the xt stored in the following cell;
    /// when typed at the interpreter or run by `EXECUTE`, parses a name and
    /// pushes its xt.
    pub(crate) fn tick(&mut self) -> Result<(), Error> {
        if self.origin == Origin::Threaded {
            self.advance()?;
            let xt = self.mem.cell(self.ip);
            return self.push(xt);
        }
        let word = self.named_word()?;
        let xt = self.dict.body(&self.mem, word);
        self.push(xt)
    }

    pub fn colon(&mut self) -> Result<(), Error> {
        let name = self.word()?;
        self.dict
            .create(&mut self.mem, &name, Flags::HIDDEN | Flags::DIRTY)?;
        self.comma(self.core.enter)?;
        self.set_state(State::Compile);
        Ok(())
    }

    pub fn semicolon(&mut self) -> Result<(), Error> {
        if self.state() != State::Compile {
            return Err(Error::InterpretingCompileOnlyWord);
        }
        self.comma(self.core.exit)?;
        self.comma(SENTINEL)?;
        let latest = self.dict.latest(&self.mem);
        self.dict
            .toggle(&mut self.mem, latest, Flags::HIDDEN | Flags::DIRTY);
        self.set_state(State::Immediate);
        tracing::debug!(name = %self.dict.name(&self.mem, latest), "defined");
        Ok(())
    }

    pub fn lbrac(&mut self) -> Result<(), Error> {
        self.set_state(State::Immediate);
        Ok(())
    }

    pub fn rbrac(&mut self) -> Result<(), Error> {
        self.set_state(State::Compile);
        Ok(())
    }

    fn string_literal(&mut self) -> Result<Vec<u8>, Error> {
        let tok = self
            .input
            .scan_until(&self.mem, b'"')
            .ok_or(Error::LQuoteMissingRQuote)?;
        Ok(self.mem.text(tok.0, tok.1))
    }

    /// Compiles `LITSTRING len text`, padded to a cell boundary.
    fn compile_string(&mut self, text: &[u8]) -> Result<(), Error> {
        let len = Cell::try_from(text.len()).map_err(|_| Error::OutOfMemory)?;
        if self.mem.unused() < (2 * CELL + aligned(len)) as usize {
            return Err(Error::OutOfMemory);
        }
        self.comma(self.core.lit_string)?;
        self.comma(len)?;
        self.mem.append_text(text);
        self.mem.align();
        Ok(())
    }

    /// `S" text"` ( -- addr len )
    pub fn s_quote(&mut self) -> Result<(), Error> {
        let text = self.string_literal()?;
        match self.state() {
            State::Compile => self.compile_string(&text),
            State::Immediate => {
                // Transient copy just past HERE; the next definition may
                // overwrite it.
                let pad = self.mem.here() + layout::PAD_OFFSET;
                let len = text.len() as Cell;
                if self.mem.unused() < (layout::PAD_OFFSET + len) as usize {
                    return Err(Error::OutOfMemory);
                }
                self.mem.set_text(pad, &text);
                self.push(pad)?;
                self.push(len)
            }
        }
    }

    pub fn dot_quote(&mut self) -> Result<(), Error> {
        let text = self.string_literal()?;
        match self.state() {
            State::Compile => {
                self.compile_string(&text)?;
                self.comma(self.core.type_)
            }
            State::Immediate => {
                self.print(&String::from_utf8_lossy(&text));
                Ok(())
            }
        }
    }

    pub fn paren(&mut self) -> Result<(), Error> {
        // An unclosed comment runs to the end of the line.
        let _ = self.input.scan_until(&self.mem, b')');
        Ok(())
    }

    pub fn immediate(&mut self) -> Result<(), Error> {
        let latest = self.dict.latest(&self.mem);
        self.dict.toggle(&mut self.mem, latest, Flags::IMMEDIATE);
        Ok(())
    }

    pub fn hidden(&mut self) -> Result<(), Error> {
        let word = self.pop()?;
        self.dict.toggle(&mut self.mem, word, Flags::HIDDEN);
        Ok(())
    }

    pub fn dirty(&mut self) -> Result<(), Error> {
        let word = self.pop()?;
        self.dict.toggle(&mut self.mem, word, Flags::DIRTY);
        Ok(())
    }

    /// `WORD` ( -- addr len ): the next token, in place in the line buffer.
    pub fn word_token(&mut self) -> Result<(), Error> {
        let (addr, len) = self.next_token()?;
        self.push(addr)?;
        self.push(len)
    }

    /// `CREATE` ( addr len -- ): appends a bare header.
    pub fn create(&mut self) -> Result<(), Error> {
        let len = self.pop()?;
        let addr = self.pop()?;
        let name = String::from_utf8_lossy(&self.mem.text(addr, len)).into_owned();
        self.dict.create(&mut self.mem, &name, Flags::NONE)?;
        Ok(())
    }

    /// `FIND` ( addr len -- word | 0 )
    pub fn find(&mut self) -> Result<(), Error> {
        let len = self.pop()?;
        let addr = self.pop()?;
        let name = String::from_utf8_lossy(&self.mem.text(addr, len)).into_owned();
        let word = self.dict.find(&self.mem, &name).unwrap_or(0);
        self.push(word)
    }

    pub fn to_cfa(&mut self) -> Result<(), Error> {
        let word = self.pop()?;
        let xt = self.dict.body(&self.mem, word);
        self.push(xt)
    }

    pub fn from_cfa(&mut self) -> Result<(), Error> {
        let xt = self.pop()?;
        let word = self.dict.link_for(&self.mem, xt).unwrap_or(0);
        self.push(word)
    }

    pub fn to_body(&mut self) -> Result<(), Error> {
        let xt = self.pop()?;
        self.push(xt.checked_add(CELL).ok_or(Error::NumberOutOfRange)?)
    }

    /// `CONSTANT name` ( val -- )
    pub fn constant(&mut self) -> Result<(), Error> {
        let val = self.pop()?;
        let name = self.word()?;
        self.dict
            .define_native(&mut self.mem, &name, Flags::NONE, Native::Push(val))?;
        Ok(())
    }

    /// `VARIABLE name`: a word pushing the address of a fresh, zeroed cell.
    pub fn variable(&mut self) -> Result<(), Error> {
        let name = self.word()?;
        let xt = self.dict.create(&mut self.mem, &name, Flags::NONE)?;
        self.comma(0)?;
        self.dict.register(xt, Native::Push(xt));
        Ok(())
    }

    pub fn see(&mut self) -> Result<(), Error> {
        let word = self.named_word()?;
        let mut text = self.dict.see(&self.mem, word, self.base());
        text.push('\n');
        self.print(&text);
        Ok(())
    }

    pub fn words(&mut self) -> Result<(), Error> {
        let mut text = self.dict.words(&self.mem).join(" ");
        text.push('\n');
        self.print(&text);
        Ok(())
    }

    pub fn forget(&mut self) -> Result<(), Error> {
        let word = self.named_word()?;
        if self.dict.is_builtin(word) {
            return Err(Error::CantForgetBuiltins);
        }
        self.dict.forget(&mut self.mem, word);
        Ok(())
    }
}

#[cfg(test)]
pub mod test {
    use crate::{system::BufferSystem, vm::MachineParams, Error, Machine, State};

    fn machine() -> Machine<BufferSystem> {
        let mut m = Machine::new(BufferSystem::default(), MachineParams::default()).unwrap();
        m.load_prelude().unwrap();
        m
    }

    fn eval(m: &mut Machine<BufferSystem>, line: &str) -> String {
        m.process_line(line).unwrap();
        m.system_mut().take_output()
    }

    #[test]
    fn see_decompiles_definitions() {
        let mut m = machine();
        m.process_line(": DOUBLE 2 * ;").unwrap();
        assert_eq!(eval(&mut m, "SEE DOUBLE"), ": DOUBLE 2 * ;\n");
        assert_eq!(eval(&mut m, "SEE DUP"), ": DUP ;\n");

        m.process_line(": SIGN DUP 0< IF DROP -1 ELSE 0> IF 1 ELSE 0 THEN THEN ;")
            .unwrap();
        assert_eq!(
            eval(&mut m, "SEE SIGN"),
            ": SIGN DUP 0< 0BRANCH 24 DROP -1 BRANCH 40 0> 0BRANCH 20 1 BRANCH 12 0 ;\n"
        );

        m.process_line(": GREET .\" hi\" ' DUP EXECUTE ;").unwrap();
        assert_eq!(
            eval(&mut m, "SEE GREET"),
            ": GREET S\" hi\" TYPE ' DUP EXECUTE ;\n"
        );
    }

    #[test]
    fn see_uses_base_and_marks_immediate() {
        let mut m = machine();
        m.process_line(": BIG 255 ;").unwrap();
        assert_eq!(eval(&mut m, "HEX SEE BIG DECIMAL"), ": BIG FF ;\n");
        assert_eq!(
            eval(&mut m, "SEE LITERAL"),
            ": LITERAL IMMEDIATE ' LIT , , ;\n"
        );
    }

    #[test]
    fn control_structures() {
        let mut m = machine();
        m.process_line(": ABS? 0< IF 1 ELSE 2 THEN ;").unwrap();
        assert_eq!(eval(&mut m, "-3 ABS? . 3 ABS? ."), "1 2 ");

        m.process_line(": COUNTDOWN BEGIN DUP . 1- DUP 0= UNTIL DROP ;").unwrap();
        assert_eq!(eval(&mut m, "3 COUNTDOWN"), "3 2 1 ");

        m.process_line(": SUM 0 SWAP 0 DO I + LOOP ;").unwrap();
        assert_eq!(eval(&mut m, "5 SUM ."), "10 ");

        m.process_line(": HALVE BEGIN DUP 1 > WHILE 2 / REPEAT ;").unwrap();
        assert_eq!(eval(&mut m, "100 HALVE ."), "1 ");

        m.process_line(": FACT DUP 1 > IF DUP 1- RECURSE * THEN ;").unwrap();
        assert_eq!(eval(&mut m, "6 FACT ."), "720 ");

        m.process_line(": SEVEN [ 3 4 + ] LITERAL ;").unwrap();
        assert_eq!(eval(&mut m, "SEVEN ."), "7 ");
    }

    #[test]
    fn strings_and_comments() {
        let mut m = machine();
        assert_eq!(eval(&mut m, ".\" hello world\" CR"), "hello world\n");
        assert_eq!(eval(&mut m, "S\" abc\" SWAP DROP ."), "3 ");
        assert_eq!(eval(&mut m, "S\" xyz\" TYPE"), "xyz");
        m.process_line(": HI .\" hi there\" ;").unwrap();
        assert_eq!(eval(&mut m, "HI HI"), "hi therehi there");
        assert_eq!(eval(&mut m, "1 ( this is ignored ) 2 + . \\ so is this"), "3 ");
        assert_eq!(m.process_line(".\" oops"), Err(Error::LQuoteMissingRQuote));
    }

    #[test]
    fn constants_and_variables() {
        let mut m = machine();
        m.process_line("42 CONSTANT ANSWER VARIABLE V").unwrap();
        assert_eq!(eval(&mut m, "ANSWER ."), "42 ");
        assert_eq!(eval(&mut m, "V @ . 5 V ! V @ . 3 V +! V @ ."), "0 5 8 ");
        m.process_line("VARIABLE W 9 W !").unwrap();
        assert_eq!(eval(&mut m, "V @ . W @ ."), "8 9 ");
    }

    #[test]
    fn compile_only_words() {
        let mut m = machine();
        assert_eq!(m.process_line(";"), Err(Error::InterpretingCompileOnlyWord));
        m.process_line(": X [").unwrap();
        assert_eq!(m.state(), State::Immediate);
        m.process_line("] 1 ;").unwrap();
        assert_eq!(eval(&mut m, "X ."), "1 ");
    }

    #[test]
    fn forget_and_words() {
        let mut m = machine();
        let here = m.memory().here();
        m.process_line(": ZZA 1 ; : ZZB 2 ;").unwrap();
        let words = eval(&mut m, "WORDS");
        assert!(words.contains(" ZZA ZZB "), "{words}");

        m.process_line("FORGET ZZA").unwrap();
        assert_eq!(m.memory().here(), here);
        assert!(!eval(&mut m, "WORDS").contains("ZZ"));
        assert_eq!(m.process_line("ZZB"), Err(Error::Parse("ZZB".into())));
        assert_eq!(m.process_line("FORGET DUP"), Err(Error::CantForgetBuiltins));
        assert_eq!(m.process_line("FORGET NOSUCH"), Err(Error::UnknownWord("NOSUCH".into())));
        assert_eq!(m.process_line("' NOSUCH"), Err(Error::UnknownWord("NOSUCH".into())));
    }

    #[test]
    fn shadowing() {
        let mut m = machine();
        m.process_line(": FOO 1 ; : BAR FOO ; : FOO 2 ;").unwrap();
        assert_eq!(eval(&mut m, "FOO . BAR ."), "2 1 ");
        // A definition can't see itself until it is finished.
        m.process_line(": FOO FOO 10 * ;").unwrap();
        assert_eq!(eval(&mut m, "FOO ."), "20 ");
    }

    #[test]
    fn dictionary_words() {
        let mut m = machine();
        m.process_line("WORD DUP FIND DUP >CFA CFA> =").unwrap();
        let stack = m.stack();
        assert_eq!(stack.len(), 2);
        assert_ne!(stack[0], 0);
        assert_eq!(stack[1], -1);

        let mut m = machine();
        m.process_line("WORD NOSUCH FIND").unwrap();
        assert_eq!(m.stack(), vec![0]);

        let mut m = machine();
        m.process_line("' DUP >BODY ' DUP -").unwrap();
        assert_eq!(m.stack(), vec![4]);

        let mut m = machine();
        m.process_line("WORD FRESH CREATE LATEST @ HIDDEN").unwrap();
        assert!(m.dictionary().find(m.memory(), "FRESH").is_none());
    }

    #[test]
    fn dump_memory() {
        let mut m = machine();
        let out = eval(&mut m, "S\" AB\" DUMP");
        assert!(out.contains(" 41 42 "), "{out}");
        assert!(out.contains("|AB|"), "{out}");
    }
}
