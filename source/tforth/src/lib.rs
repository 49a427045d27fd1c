pub mod dictionary;
pub mod input;
pub mod layout;
pub mod memory;
pub mod number;
pub mod stack;
pub mod system;
pub mod vm;
pub mod word;

#[cfg(any(test, feature = "_force_test_utils"))]
pub mod testutil;

use core::fmt;

pub use crate::{
    system::{BufferSystem, System},
    vm::{AbortHandle, Machine, MachineParams},
    word::Cell,
};
use crate::stack::StackError;

/// Forth source compiled into every machine started by `tfrepl` and the
/// test harness: the control structures, written in terms of the primitives.
pub const PRELUDE: &str = include_str!("prelude.fs");

/// Interpreter state, as stored in the `STATE` register.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Immediate,
    Compile,
}

impl From<State> for Cell {
    fn from(state: State) -> Cell {
        match state {
            State::Immediate => 0,
            State::Compile => 1,
        }
    }
}

impl From<Cell> for State {
    fn from(cell: Cell) -> State {
        if cell == 0 {
            State::Immediate
        } else {
            State::Compile
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    Stack(StackError),
    /// The token is neither a known word nor a number in the current base.
    Parse(String),
    UnknownWord(String),
    NumberOutOfRange,
    DivisionByZero,
    /// Cancellation requested through an [`AbortHandle`] or the `ABORT` word.
    Abort,
    OutOfMemory,
    MissingName,
    NameTooLong,
    LQuoteMissingRQuote,
    InterpretingCompileOnlyWord,
    CantForgetBuiltins,
    /// Not a failure: the machine stops with the given exit code, either
    /// because the input ran dry or because of `SYS-EXIT`.
    Halt(i32),
}

impl From<StackError> for Error {
    fn from(se: StackError) -> Self {
        Error::Stack(se)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Stack(se) => se.fmt(f),
            Error::Parse(token) => write!(f, "parse error: {token}"),
            Error::UnknownWord(name) => write!(f, "unknown word: {name}"),
            Error::NumberOutOfRange => f.write_str("number out of range"),
            Error::DivisionByZero => f.write_str("division by zero"),
            Error::Abort => f.write_str("aborted"),
            Error::OutOfMemory => f.write_str("out of memory"),
            Error::MissingName => f.write_str("expected a word name"),
            Error::NameTooLong => f.write_str("word name too long"),
            Error::LQuoteMissingRQuote => f.write_str("unterminated string"),
            Error::InterpretingCompileOnlyWord => f.write_str("compile-only word"),
            Error::CantForgetBuiltins => f.write_str("cannot forget a built-in word"),
            Error::Halt(code) => write!(f, "halted with exit code {code}"),
        }
    }
}

impl std::error::Error for Error {}

trait ReplaceErr {
    type OK;
    fn replace_err<NE>(self, t: NE) -> Result<Self::OK, NE>;
}

impl<T, OE> ReplaceErr for Result<T, OE> {
    type OK = T;
    #[inline]
    fn replace_err<NE>(self, e: NE) -> Result<Self::OK, NE> {
        match self {
            Ok(t) => Ok(t),
            Err(_e) => Err(e),
        }
    }
}
