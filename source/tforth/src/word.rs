use core::fmt;
use core::ops::{BitOr, BitOrAssign};

/// The machine word. Stack slots, addresses and dictionary links are all cells.
pub type Cell = i32;

/// Width of a [`Cell`] in bytes.
pub const CELL: Cell = core::mem::size_of::<Cell>() as Cell;

/// Marks the end of a colon definition's instruction stream.
pub const SENTINEL: Cell = -1;

pub const TRUE: Cell = -1;
pub const FALSE: Cell = 0;

#[inline]
pub fn flag(b: bool) -> Cell {
    if b {
        TRUE
    } else {
        FALSE
    }
}

/// Rounds `addr` up to the next cell boundary.
#[inline]
pub const fn aligned(addr: Cell) -> Cell {
    (addr + (CELL - 1)) & !(CELL - 1)
}

/// The flags byte of a dictionary header.
#[derive(Clone, Copy, PartialEq, Eq, Default)]
pub struct Flags(u8);

impl Flags {
    pub const NONE: Self = Self(0x00);
    /// Executed even while compiling.
    pub const IMMEDIATE: Self = Self(0x80);
    /// Definition still in progress; discarded if compilation is interrupted.
    pub const DIRTY: Self = Self(0x40);
    /// Invisible to lookup.
    pub const HIDDEN: Self = Self(0x20);

    #[inline]
    pub const fn from_bits(bits: u8) -> Self {
        Self(bits)
    }

    #[inline]
    pub const fn bits(self) -> u8 {
        self.0
    }

    #[inline]
    pub const fn contains(self, other: Self) -> bool {
        (self.0 & other.0) == other.0
    }
}

impl BitOr for Flags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for Flags {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl fmt::Debug for Flags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut set = f.debug_set();
        if self.contains(Self::IMMEDIATE) {
            set.entry(&"IMMEDIATE");
        }
        if self.contains(Self::DIRTY) {
            set.entry(&"DIRTY");
        }
        if self.contains(Self::HIDDEN) {
            set.entry(&"HIDDEN");
        }
        set.finish()
    }
}
