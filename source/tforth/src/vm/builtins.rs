use crate::{
    system::System,
    vm::{BuiltinEntry, Machine, Origin},
    word::{aligned, flag, Cell, Flags, CELL},
    Error,
};

// NOTE: This macro exists because we can't have const constructors that include
// "mut" items, which unfortunately covers things like `fn(&mut T)`. Use a macro
// until this is resolved.
macro_rules! builtin {
    ($name:literal, $func:expr) => {
        BuiltinEntry {
            name: $name,
            flags: Flags::NONE,
            func: $func,
        }
    };
    (immediate $name:literal, $func:expr) => {
        BuiltinEntry {
            name: $name,
            flags: Flags::IMMEDIATE,
            func: $func,
        }
    };
}

impl<S: System + 'static> Machine<S> {
    pub const BUILTINS: &'static [BuiltinEntry<S>] = &[
        //
        // arithmetic
        //
        builtin!("+", Self::add),
        builtin!("-", Self::sub),
        builtin!("*", Self::mul),
        builtin!("/", Self::div),
        builtin!("MOD", Self::modu),
        builtin!("/MOD", Self::div_mod),
        builtin!("NEGATE", Self::negate),
        builtin!("ABS", Self::abs),
        builtin!("MIN", Self::min),
        builtin!("MAX", Self::max),
        builtin!("1+", Self::one_plus),
        builtin!("1-", Self::one_minus),
        builtin!("2+", Self::two_plus),
        builtin!("2-", Self::two_minus),
        //
        // logic and comparison
        //
        builtin!("AND", Self::and),
        builtin!("OR", Self::or),
        builtin!("XOR", Self::xor),
        builtin!("INVERT", Self::invert),
        builtin!("=", Self::equal),
        builtin!("<>", Self::not_equal),
        builtin!("<", Self::less),
        builtin!(">", Self::greater),
        builtin!("<=", Self::less_equal),
        builtin!(">=", Self::greater_equal),
        builtin!("0=", Self::zero_equal),
        builtin!("0<>", Self::zero_not_equal),
        builtin!("0<", Self::zero_less),
        builtin!("0>", Self::zero_greater),
        builtin!("0<=", Self::zero_less_equal),
        builtin!("0>=", Self::zero_greater_equal),
        //
        // stack
        //
        builtin!("DUP", Self::dup),
        builtin!("DROP", Self::drop),
        builtin!("SWAP", Self::swap),
        builtin!("OVER", Self::over),
        builtin!("ROT", Self::rot),
        builtin!("-ROT", Self::minus_rot),
        builtin!("NIP", Self::nip),
        builtin!("TUCK", Self::tuck),
        builtin!("2DUP", Self::dup2),
        builtin!("2DROP", Self::drop2),
        builtin!("2SWAP", Self::swap2),
        builtin!("?DUP", Self::question_dup),
        builtin!("DEPTH", Self::depth),
        //
        // memory
        //
        builtin!("!", Self::store),
        builtin!("@", Self::fetch),
        builtin!("C!", Self::store_byte),
        builtin!("C@", Self::fetch_byte),
        builtin!("+!", Self::add_store),
        builtin!("-!", Self::sub_store),
        builtin!(",", Self::comma_cell),
        builtin!("C,", Self::comma_byte),
        builtin!("CELLS", Self::cells),
        builtin!("CHARS", Self::chars),
        builtin!("ALLOT", Self::allot),
        builtin!("ALIGN", Self::align),
        builtin!("ALIGNED", Self::aligned),
        //
        // return stack and loops
        //
        builtin!(">R", Self::data_to_return_stack),
        builtin!("R>", Self::return_to_data_stack),
        builtin!("R@", Self::return_fetch),
        builtin!("RDROP", Self::return_drop),
        builtin!("RSP@", Self::rsp_fetch),
        builtin!("RSP!", Self::rsp_store),
        builtin!("DSP@", Self::dsp_fetch),
        builtin!("DSP!", Self::dsp_store),
        builtin!("(DO)", Self::loop_start),
        builtin!("I", Self::loop_i),
        //
        // output and ports
        //
        builtin!(".", Self::pop_print),
        builtin!(".S", Self::print_stack),
        builtin!("EMIT", Self::emit),
        builtin!("CR", Self::cr),
        builtin!("SPACE", Self::space),
        builtin!("SPACES", Self::spaces),
        builtin!("TYPE", Self::type_str),
        builtin!("IN", Self::port_in),
        builtin!("OUT", Self::port_out),
        //
        // control
        //
        builtin!("EXECUTE", Self::execute),
        builtin!("ABORT", Self::abort),
        builtin!("SYS-EXIT", Self::sys_exit),
        //
        // outer interpreter and compiler
        //
        builtin!("INTERPRET", Self::interpret),
        builtin!(":", Self::colon),
        builtin!(immediate ";", Self::semicolon),
        builtin!(immediate "[", Self::lbrac),
        builtin!("]", Self::rbrac),
        builtin!(immediate "S\"", Self::s_quote),
        builtin!(immediate ".\"", Self::dot_quote),
        builtin!(immediate "(", Self::paren),
        builtin!(immediate "IMMEDIATE", Self::immediate),
        builtin!("HIDDEN", Self::hidden),
        builtin!("DIRTY", Self::dirty),
        builtin!("WORD", Self::word_token),
        builtin!("CREATE", Self::create),
        builtin!("FIND", Self::find),
        builtin!(">CFA", Self::to_cfa),
        builtin!("CFA>", Self::from_cfa),
        builtin!(">BODY", Self::to_body),
        builtin!("CONSTANT", Self::constant),
        builtin!("VARIABLE", Self::variable),
        //
        // introspection
        //
        builtin!("SEE", Self::see),
        builtin!("WORDS", Self::words),
        builtin!("DUMP", Self::dump),
        builtin!("FORGET", Self::forget),
    ];

    fn binary(&mut self, f: impl FnOnce(Cell, Cell) -> Option<Cell>) -> Result<(), Error> {
        let b = self.pop()?;
        let a = self.pop()?;
        let val = f(a, b).ok_or(Error::NumberOutOfRange)?;
        self.push(val)
    }

    fn unary(&mut self, f: impl FnOnce(Cell) -> Option<Cell>) -> Result<(), Error> {
        let a = self.pop()?;
        let val = f(a).ok_or(Error::NumberOutOfRange)?;
        self.push(val)
    }

    fn compare(&mut self, f: impl FnOnce(Cell, Cell) -> bool) -> Result<(), Error> {
        self.binary(|a, b| Some(flag(f(a, b))))
    }

    fn compare_zero(&mut self, f: impl FnOnce(Cell) -> bool) -> Result<(), Error> {
        self.unary(|a| Some(flag(f(a))))
    }

    /// Pops a divisor, rejecting zero.
    fn divisor(&mut self) -> Result<Cell, Error> {
        match self.pop()? {
            0 => Err(Error::DivisionByZero),
            b => Ok(b),
        }
    }

    pub fn add(&mut self) -> Result<(), Error> {
        self.binary(Cell::checked_add)
    }

    pub fn sub(&mut self) -> Result<(), Error> {
        self.binary(Cell::checked_sub)
    }

    pub fn mul(&mut self) -> Result<(), Error> {
        self.binary(Cell::checked_mul)
    }

    pub fn div(&mut self) -> Result<(), Error> {
        let b = self.divisor()?;
        let a = self.pop()?;
        self.push(a.checked_div(b).ok_or(Error::NumberOutOfRange)?)
    }

    pub fn modu(&mut self) -> Result<(), Error> {
        let b = self.divisor()?;
        let a = self.pop()?;
        self.push(a.checked_rem(b).ok_or(Error::NumberOutOfRange)?)
    }

    /// `( a b -- rem quot )`
    pub fn div_mod(&mut self) -> Result<(), Error> {
        let b = self.divisor()?;
        let a = self.pop()?;
        let quot = a.checked_div(b).ok_or(Error::NumberOutOfRange)?;
        let rem = a.checked_rem(b).ok_or(Error::NumberOutOfRange)?;
        self.push(rem)?;
        self.push(quot)
    }

    pub fn negate(&mut self) -> Result<(), Error> {
        self.unary(Cell::checked_neg)
    }

    pub fn abs(&mut self) -> Result<(), Error> {
        self.unary(Cell::checked_abs)
    }

    pub fn min(&mut self) -> Result<(), Error> {
        self.binary(|a, b| Some(a.min(b)))
    }

    pub fn max(&mut self) -> Result<(), Error> {
        self.binary(|a, b| Some(a.max(b)))
    }

    pub fn one_plus(&mut self) -> Result<(), Error> {
        self.unary(|a| a.checked_add(1))
    }

    pub fn one_minus(&mut self) -> Result<(), Error> {
        self.unary(|a| a.checked_sub(1))
    }

    pub fn two_plus(&mut self) -> Result<(), Error> {
        self.unary(|a| a.checked_add(2))
    }

    pub fn two_minus(&mut self) -> Result<(), Error> {
        self.unary(|a| a.checked_sub(2))
    }

    pub fn and(&mut self) -> Result<(), Error> {
        self.binary(|a, b| Some(a & b))
    }

    pub fn or(&mut self) -> Result<(), Error> {
        self.binary(|a, b| Some(a | b))
    }

    pub fn xor(&mut self) -> Result<(), Error> {
        self.binary(|a, b| Some(a ^ b))
    }

    pub fn invert(&mut self) -> Result<(), Error> {
        self.unary(|a| Some(!a))
    }

    pub fn equal(&mut self) -> Result<(), Error> {
        self.compare(|a, b| a == b)
    }

    pub fn not_equal(&mut self) -> Result<(), Error> {
        self.compare(|a, b| a != b)
    }

    pub fn less(&mut self) -> Result<(), Error> {
        self.compare(|a, b| a < b)
    }

    pub fn greater(&mut self) -> Result<(), Error> {
        self.compare(|a, b| a > b)
    }

    pub fn less_equal(&mut self) -> Result<(), Error> {
        self.compare(|a, b| a <= b)
    }

    pub fn greater_equal(&mut self) -> Result<(), Error> {
        self.compare(|a, b| a >= b)
    }

    pub fn zero_equal(&mut self) -> Result<(), Error> {
        self.compare_zero(|a| a == 0)
    }

    pub fn zero_not_equal(&mut self) -> Result<(), Error> {
        self.compare_zero(|a| a != 0)
    }

    pub fn zero_less(&mut self) -> Result<(), Error> {
        self.compare_zero(|a| a < 0)
    }

    pub fn zero_greater(&mut self) -> Result<(), Error> {
        self.compare_zero(|a| a > 0)
    }

    pub fn zero_less_equal(&mut self) -> Result<(), Error> {
        self.compare_zero(|a| a <= 0)
    }

    pub fn zero_greater_equal(&mut self) -> Result<(), Error> {
        self.compare_zero(|a| a >= 0)
    }

    pub fn dup(&mut self) -> Result<(), Error> {
        let val = self.peek()?;
        self.push(val)
    }

    pub fn drop(&mut self) -> Result<(), Error> {
        self.pop()?;
        Ok(())
    }

    pub fn swap(&mut self) -> Result<(), Error> {
        let a = self.pop()?;
        let b = self.pop()?;
        self.push(a)?;
        self.push(b)
    }

    pub fn over(&mut self) -> Result<(), Error> {
        let val = self.pstack.peek_back_n(&self.mem, 1)?;
        self.push(val)
    }

    /// `( a b c -- b c a )`
    pub fn rot(&mut self) -> Result<(), Error> {
        let c = self.pop()?;
        let b = self.pop()?;
        let a = self.pop()?;
        self.push(b)?;
        self.push(c)?;
        self.push(a)
    }

    /// `( a b c -- c a b )`
    pub fn minus_rot(&mut self) -> Result<(), Error> {
        let c = self.pop()?;
        let b = self.pop()?;
        let a = self.pop()?;
        self.push(c)?;
        self.push(a)?;
        self.push(b)
    }

    pub fn nip(&mut self) -> Result<(), Error> {
        let b = self.pop()?;
        self.pop()?;
        self.push(b)
    }

    /// `( a b -- b a b )`
    pub fn tuck(&mut self) -> Result<(), Error> {
        let b = self.pop()?;
        let a = self.pop()?;
        self.push(b)?;
        self.push(a)?;
        self.push(b)
    }

    pub fn dup2(&mut self) -> Result<(), Error> {
        let b = self.pstack.peek_back_n(&self.mem, 0)?;
        let a = self.pstack.peek_back_n(&self.mem, 1)?;
        self.push(a)?;
        self.push(b)
    }

    pub fn drop2(&mut self) -> Result<(), Error> {
        self.pop()?;
        self.pop()?;
        Ok(())
    }

    /// `( a b c d -- c d a b )`
    pub fn swap2(&mut self) -> Result<(), Error> {
        let d = self.pop()?;
        let c = self.pop()?;
        let b = self.pop()?;
        let a = self.pop()?;
        self.push(c)?;
        self.push(d)?;
        self.push(a)?;
        self.push(b)
    }

    pub fn question_dup(&mut self) -> Result<(), Error> {
        match self.peek()? {
            0 => Ok(()),
            val => self.push(val),
        }
    }

    pub fn depth(&mut self) -> Result<(), Error> {
        let depth = Cell::try_from(self.pstack.depth()).map_err(|_| Error::NumberOutOfRange)?;
        self.push(depth)
    }

    /// `( val addr -- )`
    pub fn store(&mut self) -> Result<(), Error> {
        let addr = self.pop()?;
        let val = self.pop()?;
        self.mem.set_cell(addr, val);
        Ok(())
    }

    pub fn fetch(&mut self) -> Result<(), Error> {
        let addr = self.pop()?;
        let val = self.mem.cell(addr);
        self.push(val)
    }

    pub fn store_byte(&mut self) -> Result<(), Error> {
        let addr = self.pop()?;
        let val = self.pop()?;
        self.mem.set_byte(addr, val as u8);
        Ok(())
    }

    pub fn fetch_byte(&mut self) -> Result<(), Error> {
        let addr = self.pop()?;
        let val = Cell::from(self.mem.byte(addr));
        self.push(val)
    }

    pub fn add_store(&mut self) -> Result<(), Error> {
        let addr = self.pop()?;
        let n = self.pop()?;
        let val = self.mem.cell(addr).wrapping_add(n);
        self.mem.set_cell(addr, val);
        Ok(())
    }

    pub fn sub_store(&mut self) -> Result<(), Error> {
        let addr = self.pop()?;
        let n = self.pop()?;
        let val = self.mem.cell(addr).wrapping_sub(n);
        self.mem.set_cell(addr, val);
        Ok(())
    }

    pub fn comma_cell(&mut self) -> Result<(), Error> {
        let val = self.pop()?;
        self.comma(val)
    }

    pub fn comma_byte(&mut self) -> Result<(), Error> {
        let val = self.pop()?;
        if self.mem.unused() < 1 {
            return Err(Error::OutOfMemory);
        }
        self.mem.append_byte(val as u8);
        Ok(())
    }

    pub fn cells(&mut self) -> Result<(), Error> {
        self.unary(|n| n.checked_mul(CELL))
    }

    pub fn chars(&mut self) -> Result<(), Error> {
        // One byte per character.
        self.peek()?;
        Ok(())
    }

    pub fn allot(&mut self) -> Result<(), Error> {
        let n = self.pop()?;
        let unused = Cell::try_from(self.mem.unused()).unwrap_or(Cell::MAX);
        if n > unused {
            return Err(Error::OutOfMemory);
        }
        let here = self.mem.here();
        let new_here = here.checked_add(n).ok_or(Error::NumberOutOfRange)?;
        if new_here < self.dict.latest(&self.mem) {
            return Err(Error::NumberOutOfRange);
        }
        self.mem.set_here(new_here);
        Ok(())
    }

    pub fn align(&mut self) -> Result<(), Error> {
        if self.mem.unused() < CELL as usize {
            return Err(Error::OutOfMemory);
        }
        self.mem.align();
        Ok(())
    }

    pub fn aligned(&mut self) -> Result<(), Error> {
        self.unary(|addr| addr.checked_add(CELL - 1).map(|_| aligned(addr)))
    }

    pub fn data_to_return_stack(&mut self) -> Result<(), Error> {
        let val = self.pop()?;
        self.rpush(val)
    }

    pub fn return_to_data_stack(&mut self) -> Result<(), Error> {
        let val = self.rpop()?;
        self.push(val)
    }

    pub fn return_fetch(&mut self) -> Result<(), Error> {
        let val = self.rstack.peek(&self.mem)?;
        self.push(val)
    }

    pub fn return_drop(&mut self) -> Result<(), Error> {
        self.rpop()?;
        Ok(())
    }

    pub fn rsp_fetch(&mut self) -> Result<(), Error> {
        let ptr = self.rstack.pointer();
        self.push(ptr)
    }

    pub fn rsp_store(&mut self) -> Result<(), Error> {
        let ptr = self.pop()?;
        self.rstack.set_pointer(ptr);
        Ok(())
    }

    pub fn dsp_fetch(&mut self) -> Result<(), Error> {
        let ptr = self.pstack.pointer();
        self.push(ptr)
    }

    pub fn dsp_store(&mut self) -> Result<(), Error> {
        let ptr = self.pop()?;
        self.pstack.set_pointer(ptr);
        Ok(())
    }

    /// `( limit index -- ) ( R: -- limit index )`
    pub fn loop_start(&mut self) -> Result<(), Error> {
        let index = self.pop()?;
        let limit = self.pop()?;
        self.rpush(limit)?;
        self.rpush(index)
    }

    pub fn loop_i(&mut self) -> Result<(), Error> {
        let index = self.rstack.peek(&self.mem)?;
        self.push(index)
    }

    /// Prints the top of the stack in decimal, regardless of `BASE`.
    pub fn pop_print(&mut self) -> Result<(), Error> {
        let val = self.pop()?;
        self.print(&format!("{val} "));
        Ok(())
    }

    pub fn print_stack(&mut self) -> Result<(), Error> {
        let dump = self.pstack.dump(&self.mem);
        self.print(&dump);
        self.print("\n");
        Ok(())
    }

    pub fn emit(&mut self) -> Result<(), Error> {
        let val = self.pop()?;
        let ch = char::from(val as u8);
        self.print(ch.encode_utf8(&mut [0u8; 4]));
        Ok(())
    }

    pub fn cr(&mut self) -> Result<(), Error> {
        self.print("\n");
        Ok(())
    }

    pub fn space(&mut self) -> Result<(), Error> {
        self.print(" ");
        Ok(())
    }

    pub fn spaces(&mut self) -> Result<(), Error> {
        let num = self.pop()?;
        let num = usize::try_from(num).unwrap_or(0);
        if num > self.mem.capacity() {
            return Err(Error::NumberOutOfRange);
        }
        self.print(&" ".repeat(num));
        Ok(())
    }

    /// `( addr len -- )`
    pub fn type_str(&mut self) -> Result<(), Error> {
        let len = self.pop()?;
        let addr = self.pop()?;
        let text = self.mem.text(addr, len);
        self.print(&String::from_utf8_lossy(&text));
        Ok(())
    }

    /// `( port -- val )`
    pub fn port_in(&mut self) -> Result<(), Error> {
        let port = self.pop()?;
        let val = self.system.input(port);
        self.push(val)
    }

    /// `( val port -- )`
    pub fn port_out(&mut self) -> Result<(), Error> {
        let port = self.pop()?;
        let val = self.pop()?;
        self.system.output(port, val);
        Ok(())
    }

    pub fn execute(&mut self) -> Result<(), Error> {
        let xt = self.pop()?;
        self.schedule(xt, Origin::Execute);
        Ok(())
    }

    pub fn abort(&mut self) -> Result<(), Error> {
        Err(Error::Abort)
    }

    /// `( code -- )`
    pub fn sys_exit(&mut self) -> Result<(), Error> {
        let code = self.pop()?;
        Err(Error::Halt(code))
    }

    /// Lists `len` bytes of memory starting at `addr` in `BASE`-independent hex.
    pub fn dump(&mut self) -> Result<(), Error> {
        let len = self.pop()?;
        let addr = self.pop()?;
        let text = self.mem.dump(addr, len);
        self.print(&text);
        Ok(())
    }
}
