//! Fixed addresses inside the memory image.
//!
//! ```text
//! 0x0000   +---------------------------+
//!          | System registers          |
//! 0x002C   +---------------------------+
//!          | Line buffer               |
//! 0x012C   +---------------------------+
//!          | (unused)                  |
//! 0x0180   +---------------------------+
//!          | Return stack (grows down) |
//! 0x1000   +---------------------------+
//!          | Param. stack (grows down) |
//! 0x2000   +---------------------------+
//!          | Dictionary                |
//!          .                           .
//! ```
//!
//! Anything that reads a saved memory image depends on these staying put.

use crate::word::{Cell, CELL};

pub const HERE: Cell = 0;
pub const LATEST: Cell = CELL;
pub const STATE: Cell = CELL * 2;
pub const BASE: Cell = CELL * 3;
pub const TRACE: Cell = CELL * 4;
pub const R0: Cell = CELL * 5;
pub const S0: Cell = CELL * 6;
pub const XT0: Cell = CELL * 7;
pub const XT1: Cell = CELL * 8;
pub const IP0: Cell = CELL * 9;
pub const IP1: Cell = CELL * 10;

pub const BUFFER: Cell = CELL * 11;
pub const BUFFER_SIZE: Cell = 256;

/// Return stack top; the stack occupies the bytes below it.
pub const RSTACK: Cell = CELL * 1024;
pub const RSTACK_SIZE: Cell = CELL * (1024 - 96);

/// Parameter stack top.
pub const PSTACK: Cell = CELL * 2048;
pub const PSTACK_SIZE: Cell = CELL * 1024;

pub const DICTIONARY: Cell = CELL * 2048;

/// Distance from `HERE` to the transient string area used by `S"` outside
/// of a definition.
pub const PAD_OFFSET: Cell = CELL * 64;

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn regions_do_not_overlap() {
        assert!(BUFFER + BUFFER_SIZE <= RSTACK - RSTACK_SIZE);
        assert!(RSTACK <= PSTACK - PSTACK_SIZE);
        assert!(PSTACK <= DICTIONARY);
        assert_eq!(BUFFER + BUFFER_SIZE, 0x12C);
        assert_eq!(RSTACK - RSTACK_SIZE, 0x180);
    }
}
