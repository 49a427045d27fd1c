use core::fmt::{self, Write as _};

use crate::{
    memory::Memory,
    word::{Cell, CELL},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StackKind {
    Parameter,
    Return,
}

impl fmt::Display for StackKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StackKind::Parameter => f.write_str("parameter stack"),
            StackKind::Return => f.write_str("return stack"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StackError {
    Overflow(StackKind),
    Depleted(StackKind),
}

impl fmt::Display for StackError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StackError::Overflow(kind) => write!(f, "stack overflow ({kind})"),
            StackError::Depleted(kind) => write!(f, "stack depleted ({kind})"),
        }
    }
}

/// A descending stack of cells stored in a region of [`Memory`].
///
/// `top` is one past the highest cell of the region; the stack is empty when
/// the pointer sits at `top` and full when it reaches `top - size`.
pub struct Stack {
    kind: StackKind,
    top: Cell,
    size: Cell,
    ptr: Cell,
}

impl Stack {
    pub fn new(kind: StackKind, top: Cell, size: Cell) -> Self {
        debug_assert!(top >= size);
        Self {
            kind,
            top,
            size,
            ptr: top,
        }
    }

    pub fn kind(&self) -> StackKind {
        self.kind
    }

    pub fn top(&self) -> Cell {
        self.top
    }

    #[inline]
    pub fn pointer(&self) -> Cell {
        self.ptr
    }

    /// Moves the stack pointer. No checking happens here; a pointer outside
    /// the region reads as an empty stack and makes the next push fail with
    /// an overflow.
    #[inline]
    pub fn set_pointer(&mut self, ptr: Cell) {
        self.ptr = ptr;
    }

    #[inline]
    fn in_region(&self) -> bool {
        (self.top - self.size..=self.top).contains(&self.ptr)
    }

    #[inline]
    pub fn depth(&self) -> usize {
        if !self.in_region() {
            return 0;
        }
        usize::try_from((self.top - self.ptr) / CELL).unwrap_or(0)
    }

    #[inline]
    pub fn push(&mut self, mem: &mut Memory, val: Cell) -> Result<(), StackError> {
        if !self.in_region() || self.ptr - CELL < self.top - self.size {
            return Err(StackError::Overflow(self.kind));
        }
        self.ptr -= CELL;
        mem.set_cell(self.ptr, val);
        Ok(())
    }

    #[inline]
    pub fn pop(&mut self, mem: &Memory) -> Result<Cell, StackError> {
        let val = self.peek(mem)?;
        self.ptr += CELL;
        Ok(val)
    }

    #[inline]
    pub fn peek(&self, mem: &Memory) -> Result<Cell, StackError> {
        if !self.in_region() || self.ptr >= self.top {
            return Err(StackError::Depleted(self.kind));
        }
        Ok(mem.cell(self.ptr))
    }

    /// Reads the `n`th item below the top without popping.
    pub fn peek_back_n(&self, mem: &Memory, n: usize) -> Result<Cell, StackError> {
        if n >= self.depth() {
            return Err(StackError::Depleted(self.kind));
        }
        Ok(mem.cell(self.ptr + (n as Cell) * CELL))
    }

    #[inline]
    pub fn clear(&mut self) {
        self.ptr = self.top;
    }

    /// `<depth> a b c`, oldest first.
    pub fn dump(&self, mem: &Memory) -> String {
        let depth = self.depth();
        let mut out = format!("<{depth}>");
        for n in (0..depth).rev() {
            let _ = write!(out, " {}", mem.cell(self.ptr + (n as Cell) * CELL));
        }
        out
    }
}

#[cfg(test)]
pub mod test {
    use super::{Stack, StackError, StackKind};
    use crate::{
        memory::Memory,
        word::{Cell, CELL},
    };

    #[test]
    fn stack() {
        const ITEMS: i32 = 16;
        let mut mem = Memory::new(256, 4096);
        let mut stack = Stack::new(StackKind::Parameter, 1024, ITEMS * CELL);

        for _ in 0..3 {
            for i in 0..ITEMS {
                assert!(stack.push(&mut mem, i).is_ok());
            }
            assert_eq!(
                stack.push(&mut mem, 100),
                Err(StackError::Overflow(StackKind::Parameter))
            );
            for i in (0..ITEMS).rev() {
                assert_eq!(stack.pop(&mem), Ok(i));
            }
            assert_eq!(
                stack.pop(&mem),
                Err(StackError::Depleted(StackKind::Parameter))
            );
        }
    }

    #[test]
    fn errors_name_the_stack() {
        let mut mem = Memory::new(256, 4096);
        let mut rs = Stack::new(StackKind::Return, 512, CELL);
        rs.push(&mut mem, 1).unwrap();
        let err = rs.push(&mut mem, 2).unwrap_err();
        assert_eq!(err.to_string(), "stack overflow (return stack)");
        rs.clear();
        let err = rs.pop(&mem).unwrap_err();
        assert_eq!(err.to_string(), "stack depleted (return stack)");
    }

    #[test]
    fn pointer_and_dump() {
        let mut mem = Memory::new(256, 4096);
        let mut stack = Stack::new(StackKind::Parameter, 1024, 64);
        for v in [1, 2, 3] {
            stack.push(&mut mem, v).unwrap();
        }
        assert_eq!(stack.depth(), 3);
        assert_eq!(stack.dump(&mem), "<3> 1 2 3");
        assert_eq!(stack.peek_back_n(&mem, 2), Ok(1));

        let saved = stack.pointer();
        stack.push(&mut mem, 4).unwrap();
        stack.set_pointer(saved);
        assert_eq!(stack.peek(&mem), Ok(3));

        stack.clear();
        assert_eq!(stack.depth(), 0);
        assert_eq!(stack.dump(&mem), "<0>");
    }

    #[test]
    fn wild_pointers_are_errors() {
        let mut mem = Memory::new(256, 4096);
        let mut stack = Stack::new(StackKind::Parameter, 1024, 64);
        for ptr in [Cell::MIN, -4, 0, 1024 - 68, 1028, Cell::MAX] {
            stack.set_pointer(ptr);
            assert_eq!(stack.depth(), 0, "{ptr}");
            assert_eq!(stack.dump(&mem), "<0>");
            assert_eq!(
                stack.push(&mut mem, 1),
                Err(StackError::Overflow(StackKind::Parameter))
            );
            assert_eq!(stack.pop(&mem), Err(StackError::Depleted(StackKind::Parameter)));
            assert_eq!(stack.pointer(), ptr);
        }
    }
}
