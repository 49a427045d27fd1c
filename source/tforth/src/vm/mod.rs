use std::sync::Arc;

use portable_atomic::{AtomicBool, Ordering};

use crate::{
    dictionary::{Dictionary, Native},
    input::LineBuffer,
    layout,
    memory::Memory,
    stack::{Stack, StackKind},
    system::System,
    word::{aligned, flag, Cell, Flags, CELL},
    Error, ReplaceErr, State, PRELUDE,
};

pub mod builtins;
mod outer;

/// Signature of every builtin word, static or added at runtime.
pub type WordFunc<S> = fn(&mut Machine<S>) -> Result<(), Error>;

pub struct BuiltinEntry<S: 'static> {
    pub name: &'static str,
    pub flags: Flags,
    pub func: WordFunc<S>,
}

#[derive(Debug, Clone, Copy)]
pub struct MachineParams {
    /// Memory grows in steps of this many bytes.
    pub memory_chunk: usize,
    /// Hard ceiling on the size of the address space, in bytes.
    pub memory_max: usize,
    /// Initial value of the `TRACE` register.
    pub trace: bool,
}

impl Default for MachineParams {
    fn default() -> Self {
        Self {
            memory_chunk: 4096,
            memory_max: 1024 * 1024,
            trace: false,
        }
    }
}

/// Asks a running machine to stop what it is doing and return to `QUIT`.
///
/// Clones share the same flag, so one can be handed to a signal handler or
/// another thread while the machine runs.
#[derive(Debug, Clone, Default)]
pub struct AbortHandle {
    requested: Arc<AtomicBool>,
}

impl AbortHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request(&self) {
        self.requested.store(true, Ordering::Release);
    }

    pub fn is_requested(&self) -> bool {
        self.requested.load(Ordering::Acquire)
    }

    /// Clears the flag, returning whether it was set.
    fn take(&self) -> bool {
        self.requested.swap(false, Ordering::AcqRel)
    }
}

/// How the word currently running was reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    /// Fetched from the instruction stream.
    Threaded,
    /// Scheduled by `EXECUTE`.
    Execute,
    /// Scheduled by `INTERPRET`.
    Interpret,
}

/// A pending call that the next step dispatches as if the cell at `resume`
/// held `target`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Indirect {
    target: Cell,
    resume: Cell,
    origin: Origin,
}

/// Execution tokens the machine itself needs to know about.
#[derive(Debug, Clone, Copy)]
struct CoreXts {
    enter: Cell,
    exit: Cell,
    lit: Cell,
    lit_string: Cell,
    interpret: Cell,
    quit: Cell,
    type_: Cell,
}

pub struct Machine<S: 'static> {
    mem: Memory,
    pstack: Stack,
    rstack: Stack,
    dict: Dictionary,
    input: LineBuffer,
    system: S,
    ip: Cell,
    caller: Cell,
    origin: Origin,
    indirect: Option<Indirect>,
    abort: AbortHandle,
    host_builtins: Vec<WordFunc<S>>,
    core: CoreXts,
}

impl<S: System + 'static> Machine<S> {
    pub fn new(system: S, params: MachineParams) -> Result<Self, Error> {
        let mut mem = Memory::new(params.memory_chunk, params.memory_max);
        mem.set_here(layout::DICTIONARY);
        mem.set_cell(layout::LATEST, 0);
        mem.set_cell(layout::STATE, State::Immediate.into());
        mem.set_cell(layout::BASE, 10);
        mem.set_cell(layout::TRACE, flag(params.trace));
        mem.set_cell(layout::R0, layout::RSTACK);
        mem.set_cell(layout::S0, layout::PSTACK);

        let mut dict = Dictionary::new();
        let mut native = |mem: &mut Memory, name: &str, op: Native| {
            dict.define_native(mem, name, Flags::NONE, op)
        };
        let enter = native(&mut mem, "ENTER", Native::Enter)?;
        let exit = native(&mut mem, "EXIT", Native::Exit)?;
        let lit = native(&mut mem, "LIT", Native::Lit)?;
        let lit_string = native(&mut mem, "LITSTRING", Native::LitString)?;
        let branch = native(&mut mem, "BRANCH", Native::Branch)?;
        native(&mut mem, "0BRANCH", Native::ZeroBranch)?;
        native(&mut mem, "(LOOP)", Native::Loop)?;
        native(&mut mem, "'", Native::Tick)?;

        for (name, addr) in [
            ("HERE", layout::HERE),
            ("LATEST", layout::LATEST),
            ("STATE", layout::STATE),
            ("BASE", layout::BASE),
            ("TRACE", layout::TRACE),
            ("S0", mem.cell(layout::S0)),
            ("R0", mem.cell(layout::R0)),
            ("CELL", CELL),
        ] {
            native(&mut mem, name, Native::Push(addr))?;
        }

        for (idx, bi) in Self::BUILTINS.iter().enumerate() {
            let idx = u16::try_from(idx).map_err(|_| Error::OutOfMemory)?;
            dict.define_native(&mut mem, bi.name, bi.flags, Native::Builtin(idx))?;
        }

        let xt = |mem: &Memory, dict: &Dictionary, name: &str| {
            dict.find(mem, name)
                .map(|word| dict.body(mem, word))
                .ok_or_else(|| Error::UnknownWord(name.to_string()))
        };
        let interpret = xt(&mem, &dict, "INTERPRET")?;
        let r0 = xt(&mem, &dict, "R0")?;
        let rsp_store = xt(&mem, &dict, "RSP!")?;
        let type_ = xt(&mem, &dict, "TYPE")?;
        let quit = dict.define_words(
            &mut mem,
            "QUIT",
            Flags::NONE,
            &[enter, r0, rsp_store, interpret, branch, -2 * CELL, exit],
        )?;
        dict.seal(&mem);

        tracing::debug!(
            here = mem.here(),
            words = Self::BUILTINS.len(),
            memory_max = params.memory_max,
            "machine ready"
        );

        let pstack = Stack::new(StackKind::Parameter, mem.cell(layout::S0), layout::PSTACK_SIZE);
        let rstack = Stack::new(StackKind::Return, mem.cell(layout::R0), layout::RSTACK_SIZE);
        Ok(Self {
            mem,
            pstack,
            rstack,
            dict,
            input: LineBuffer::new(),
            system,
            ip: quit,
            caller: 0,
            origin: Origin::Threaded,
            indirect: None,
            abort: AbortHandle::new(),
            host_builtins: Vec::new(),
            core: CoreXts {
                enter,
                exit,
                lit,
                lit_string,
                interpret,
                quit,
                type_,
            },
        })
    }

    /// Compiles the bundled prelude (control structures and friends).
    pub fn load_prelude(&mut self) -> Result<(), Error> {
        self.load(PRELUDE)
    }

    /// Adds a word implemented by the host.
    pub fn add_builtin(&mut self, name: &str, func: WordFunc<S>) -> Result<(), Error> {
        let idx = u16::try_from(self.host_builtins.len()).replace_err(Error::OutOfMemory)?;
        self.dict
            .define_native(&mut self.mem, name, Flags::NONE, Native::Host(idx))?;
        self.host_builtins.push(func);
        Ok(())
    }

    pub fn abort_handle(&self) -> AbortHandle {
        self.abort.clone()
    }

    pub fn system(&self) -> &S {
        &self.system
    }

    pub fn system_mut(&mut self) -> &mut S {
        &mut self.system
    }

    pub fn memory(&self) -> &Memory {
        &self.mem
    }

    pub fn dictionary(&self) -> &Dictionary {
        &self.dict
    }

    /// Tears the machine down, handing back the host system.
    pub fn release(self) -> S {
        self.system
    }

    pub fn state(&self) -> State {
        State::from(self.mem.cell(layout::STATE))
    }

    fn set_state(&mut self, state: State) {
        self.mem.set_cell(layout::STATE, state.into());
    }

    fn base(&self) -> Cell {
        self.mem.cell(layout::BASE)
    }

    /// Parameter stack contents, oldest first.
    pub fn stack(&self) -> Vec<Cell> {
        let depth = self.pstack.depth();
        (0..depth)
            .rev()
            .filter_map(|n| self.pstack.peek_back_n(&self.mem, n).ok())
            .collect()
    }

    #[inline]
    pub fn push(&mut self, val: Cell) -> Result<(), Error> {
        self.pstack.push(&mut self.mem, val)?;
        Ok(())
    }

    #[inline]
    pub fn pop(&mut self) -> Result<Cell, Error> {
        Ok(self.pstack.pop(&self.mem)?)
    }

    #[inline]
    fn peek(&self) -> Result<Cell, Error> {
        Ok(self.pstack.peek(&self.mem)?)
    }

    #[inline]
    fn rpush(&mut self, val: Cell) -> Result<(), Error> {
        self.rstack.push(&mut self.mem, val)?;
        Ok(())
    }

    #[inline]
    fn rpop(&mut self) -> Result<Cell, Error> {
        Ok(self.rstack.pop(&self.mem)?)
    }

    fn print(&mut self, text: &str) {
        self.system.print(text, false);
    }

    /// Appends a cell at `HERE`.
    fn comma(&mut self, val: Cell) -> Result<(), Error> {
        if self.mem.unused() < CELL as usize {
            return Err(Error::OutOfMemory);
        }
        self.mem.append_cell(val);
        Ok(())
    }

    /// Schedules `xt` to run next, returning to the current instruction.
    fn schedule(&mut self, target: Cell, origin: Origin) {
        let resume = self.ip;
        let (xt_reg, ip_reg) = match origin {
            Origin::Interpret => (layout::XT1, layout::IP1),
            _ => (layout::XT0, layout::IP0),
        };
        self.mem.set_cell(xt_reg, target);
        self.mem.set_cell(ip_reg, resume);
        self.indirect = Some(Indirect {
            target,
            resume,
            origin,
        });
    }

    /// Runs a single instruction.
    pub fn step(&mut self) -> Result<(), Error> {
        if self.abort.take() {
            return Err(Error::Abort);
        }
        let (site, xt, origin) = match self.indirect.take() {
            Some(ind) => (ind.resume, ind.target, ind.origin),
            None => (self.ip, self.mem.cell(self.ip), Origin::Threaded),
        };
        self.ip = site;
        self.origin = origin;
        tracing::trace!(ip = site, xt, ?origin, "step");

        match self.dict.native(xt) {
            Some(native) => {
                if self.mem.cell(layout::TRACE) != 0 {
                    self.trace_native(site, xt);
                }
                self.run_native(native)?;
                if self.indirect.is_none() {
                    self.advance()?;
                }
            }
            None => {
                self.caller = site;
                self.ip = xt;
            }
        }
        Ok(())
    }

    fn trace_native(&mut self, site: Cell, xt: Cell) {
        let name = self
            .dict
            .link_for(&self.mem, xt)
            .map(|word| self.dict.name(&self.mem, word))
            .unwrap_or_default();
        let line = format!("{site:08X} {name} {}\n", self.pstack.dump(&self.mem));
        self.system.print(&line, true);
    }

    fn run_native(&mut self, native: Native) -> Result<(), Error> {
        match native {
            Native::Enter => self.rpush(self.caller),
            Native::Exit => {
                self.ip = self.rpop()?;
                Ok(())
            }
            Native::Lit => {
                self.advance()?;
                let val = self.mem.cell(self.ip);
                self.push(val)
            }
            Native::LitString => {
                self.advance()?;
                let len = self.mem.cell(self.ip);
                let addr = self.ip.checked_add(CELL).ok_or(Error::NumberOutOfRange)?;
                self.push(addr)?;
                self.push(len)?;
                // The last cell of the text, so that the usual advance lands
                // just past it.
                self.ip = addr
                    .checked_add(len)
                    .filter(|end| *end <= Cell::MAX - CELL)
                    .and_then(|end| aligned(end).checked_sub(CELL))
                    .ok_or(Error::NumberOutOfRange)?;
                Ok(())
            }
            Native::Branch => self.branch(),
            Native::ZeroBranch => {
                if self.pop()? == 0 {
                    self.branch()
                } else {
                    self.advance()
                }
            }
            Native::Loop => {
                let index = self.rpop()?;
                let limit = self.rstack.peek(&self.mem)?;
                let index = index.checked_add(1).ok_or(Error::NumberOutOfRange)?;
                if index != limit {
                    self.rpush(index)?;
                    self.branch()
                } else {
                    self.rpop()?;
                    self.advance()
                }
            }
            Native::Tick => self.tick(),
            Native::Builtin(idx) => match Self::BUILTINS.get(usize::from(idx)) {
                Some(bi) => (bi.func)(self),
                None => Err(Error::UnknownWord(format!("builtin #{idx}"))),
            },
            Native::Host(idx) => match self.host_builtins.get(usize::from(idx)) {
                Some(&func) => func(self),
                None => Err(Error::UnknownWord(format!("host builtin #{idx}"))),
            },
            Native::Push(val) => self.push(val),
        }
    }

    /// Moves `ip` to the next cell.
    #[inline]
    fn advance(&mut self) -> Result<(), Error> {
        self.ip = self.ip.checked_add(CELL).ok_or(Error::NumberOutOfRange)?;
        Ok(())
    }

    /// Jumps by the offset in the next cell, relative to that cell.
    #[inline]
    fn branch(&mut self) -> Result<(), Error> {
        let offset = self.mem.cell(self.ip.wrapping_add(CELL));
        self.ip = self.ip.checked_add(offset).ok_or(Error::NumberOutOfRange)?;
        Ok(())
    }

    /// Puts the machine back into a known state after `err`.
    fn recover(&mut self, err: &Error) {
        match err {
            Error::Abort | Error::Halt(_) => {}
            e => self.system.print(&format!("ERROR: {e}\n"), true),
        }
        tracing::debug!(error = %err, ip = self.ip, "resetting");
        if let Some(word) = self.dict.oldest_dirty(&self.mem) {
            self.dict.forget(&mut self.mem, word);
        }
        self.pstack.clear();
        self.rstack.clear();
        self.set_state(State::Immediate);
        self.input.flush();
        self.indirect = None;
        self.ip = self.core.quit;
        self.caller = 0;
    }

    /// Runs until the input runs dry or the program exits, returning the
    /// exit code. Errors are reported and recovered from.
    pub fn run(&mut self) -> i32 {
        loop {
            match self.step() {
                Ok(()) => {}
                Err(Error::Halt(code)) => {
                    tracing::info!(code, "halting");
                    self.recover(&Error::Halt(code));
                    return code;
                }
                Err(e) => self.recover(&e),
            }
        }
    }

    /// Interprets a single line of input, returning once all of it has been
    /// consumed. On error the machine recovers before the error is returned.
    pub fn process_line(&mut self, line: &str) -> Result<(), Error> {
        self.input.fill(&mut self.mem, line);
        loop {
            let idle = self.indirect.is_none()
                && self.mem.cell(self.ip) == self.core.interpret
                && self.input.is_exhausted();
            if idle {
                return Ok(());
            }
            if let Err(e) = self.step() {
                self.recover(&e);
                return Err(e);
            }
        }
    }

    /// Interprets `source` line by line, stopping at the first error.
    pub fn load(&mut self, source: &str) -> Result<(), Error> {
        for line in source.lines() {
            self.process_line(line)?;
        }
        Ok(())
    }
}
