use core::fmt::Write as _;

use crate::{
    layout,
    word::{aligned, Cell, CELL},
};

/// The VM's single address space.
///
/// Backing storage grows in `chunk` sized steps up to `max` bytes. Accessors
/// never fault: reads outside the backing storage yield zero, and writes that
/// would land below zero or past `max` are dropped. Code that cares about
/// running out of room checks [`Memory::unused`] first.
pub struct Memory {
    data: Vec<u8>,
    chunk: usize,
    max: usize,
}

impl Memory {
    pub fn new(chunk: usize, max: usize) -> Self {
        let mut mem = Self {
            data: Vec::new(),
            chunk: chunk.max(CELL as usize),
            max: max.min(Cell::MAX as usize),
        };
        mem.set_here(CELL);
        mem
    }

    /// Maximum size of the address space in bytes.
    pub fn capacity(&self) -> usize {
        self.max
    }

    /// Size of the backing storage currently allocated.
    pub fn allocated(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn here(&self) -> Cell {
        self.cell(layout::HERE)
    }

    #[inline]
    pub fn set_here(&mut self, here: Cell) {
        self.set_cell(layout::HERE, here);
    }

    /// Bytes left between `HERE` and the end of the address space.
    pub fn unused(&self) -> usize {
        match usize::try_from(self.here()) {
            Ok(here) => self.max.saturating_sub(here),
            Err(_) => 0,
        }
    }

    /// Returns the backing range for `len` bytes at `addr`, growing the
    /// storage if needed, or `None` if the range is not writable.
    fn writable(&mut self, addr: Cell, len: usize) -> Option<core::ops::Range<usize>> {
        let start = usize::try_from(addr).ok()?;
        let end = start.checked_add(len)?;
        if end > self.max {
            tracing::warn!(addr, len, max = self.max, "dropping write past end of memory");
            return None;
        }
        if end > self.data.len() {
            let chunks = (end + self.chunk - 1) / self.chunk;
            let new_len = (chunks * self.chunk).min(self.max);
            tracing::debug!(from = self.data.len(), to = new_len, "growing memory");
            self.data.resize(new_len, 0);
        }
        Some(start..end)
    }

    pub fn byte(&self, addr: Cell) -> u8 {
        usize::try_from(addr)
            .ok()
            .and_then(|a| self.data.get(a))
            .copied()
            .unwrap_or(0)
    }

    pub fn set_byte(&mut self, addr: Cell, val: u8) {
        if let Some(range) = self.writable(addr, 1) {
            self.data[range.start] = val;
        }
    }

    /// Reads a big-endian cell.
    pub fn cell(&self, addr: Cell) -> Cell {
        let mut bytes = [0u8; CELL as usize];
        for (i, b) in bytes.iter_mut().enumerate() {
            *b = self.byte(addr.wrapping_add(i as Cell));
        }
        Cell::from_be_bytes(bytes)
    }

    /// Writes a big-endian cell.
    pub fn set_cell(&mut self, addr: Cell, val: Cell) {
        if let Some(range) = self.writable(addr, CELL as usize) {
            self.data[range].copy_from_slice(&val.to_be_bytes());
        }
    }

    /// Clamps `len` so that a read starting at `addr` stops at the end of
    /// the address space. Everything past it reads as zero anyway.
    pub fn readable(&self, addr: Cell, len: Cell) -> Cell {
        let start = usize::try_from(addr).unwrap_or(0);
        let room = self.max.saturating_sub(start);
        usize::try_from(len).map_or(0, |len| len.min(room)) as Cell
    }

    pub fn text(&self, addr: Cell, len: Cell) -> Vec<u8> {
        (0..self.readable(addr, len))
            .map(|i| self.byte(addr.wrapping_add(i)))
            .collect()
    }

    pub fn set_text(&mut self, addr: Cell, bytes: &[u8]) {
        if let Some(range) = self.writable(addr, bytes.len()) {
            self.data[range].copy_from_slice(bytes);
        }
    }

    pub fn append_byte(&mut self, val: u8) {
        let here = self.here();
        self.set_byte(here, val);
        self.set_here(here + 1);
    }

    pub fn append_cell(&mut self, val: Cell) {
        let here = self.here();
        self.set_cell(here, val);
        self.set_here(here + CELL);
    }

    pub fn append_text(&mut self, bytes: &[u8]) {
        let here = self.here();
        self.set_text(here, bytes);
        self.set_here(here + bytes.len() as Cell);
    }

    /// Pads `HERE` with zero bytes up to the next cell boundary.
    pub fn align(&mut self) {
        while self.here() != aligned(self.here()) {
            self.append_byte(0);
        }
    }

    /// Hex and ASCII listing of `len` bytes starting at `from`, 16 per row.
    pub fn dump(&self, from: Cell, len: Cell) -> String {
        const ROW: Cell = 16;
        let mut out = String::new();
        let end = from.saturating_add(self.readable(from, len));
        let mut addr = from;
        while addr < end {
            let _ = write!(out, "{addr:08X} ");
            let row = (end - addr).min(ROW);
            for i in 0..ROW {
                if i < row {
                    let _ = write!(out, " {:02X}", self.byte(addr + i));
                } else {
                    out.push_str("   ");
                }
            }
            out.push_str("  |");
            for i in 0..row {
                let b = self.byte(addr + i);
                out.push(if b.is_ascii_graphic() || b == b' ' {
                    b as char
                } else {
                    '.'
                });
            }
            out.push_str("|\n");
            addr += row;
        }
        out
    }
}

#[cfg(test)]
pub mod test {
    use super::Memory;
    use crate::word::{Cell, CELL};

    #[test]
    fn cells_are_big_endian() {
        let mut mem = Memory::new(64, 1024);
        mem.set_cell(100, 0x0102_0304);
        assert_eq!(mem.text(100, 4), vec![1, 2, 3, 4]);
        assert_eq!(mem.cell(100), 0x0102_0304);
        mem.set_cell(100, -1);
        assert_eq!(mem.byte(103), 0xFF);
        assert_eq!(mem.cell(100), -1);
    }

    #[test]
    fn grows_in_chunks_up_to_max() {
        let mut mem = Memory::new(64, 200);
        assert_eq!(mem.allocated(), 64);
        mem.set_byte(70, 7);
        assert_eq!(mem.allocated(), 128);
        mem.set_byte(199, 9);
        assert_eq!(mem.allocated(), 200);
        assert_eq!(mem.byte(199), 9);

        // Past the ceiling: dropped, never a fault.
        mem.set_byte(200, 1);
        mem.set_cell(198, 0x7777_7777);
        assert_eq!(mem.allocated(), 200);
        assert_eq!(mem.byte(200), 0);
        assert_eq!(mem.byte(198), 0);
    }

    #[test]
    fn out_of_range_reads_are_zero() {
        let mut mem = Memory::new(64, 1024);
        mem.set_byte(-1, 5);
        assert_eq!(mem.byte(-1), 0);
        assert_eq!(mem.cell(-2), 0);
        assert_eq!(mem.cell(5000), 0);
    }

    #[test]
    fn append_and_align() {
        let mut mem = Memory::new(64, 1024);
        assert_eq!(mem.here(), CELL);
        mem.append_byte(b'A');
        mem.append_text(b"BC");
        assert_eq!(mem.here(), CELL + 3);
        mem.align();
        assert_eq!(mem.here(), 2 * CELL);
        assert_eq!(mem.byte(7), 0);
        mem.append_cell(42);
        assert_eq!(mem.cell(2 * CELL), 42);
        assert_eq!(mem.unused(), 1024 - 3 * CELL as usize);
    }

    #[test]
    fn reads_stop_at_the_ceiling() {
        let mut mem = Memory::new(64, 1024);
        mem.set_byte(1023, b'Z');
        assert_eq!(mem.text(1020, Cell::MAX), vec![0, 0, 0, b'Z']);
        assert_eq!(mem.text(2000, 10), Vec::<u8>::new());
        assert_eq!(mem.text(-5, Cell::MAX).len(), 1024);
        assert_eq!(mem.dump(0, Cell::MAX).lines().count(), 1024 / 16);
        assert_eq!(mem.readable(100, -1), 0);
    }

    #[test]
    fn dump_shows_hex_and_ascii() {
        let mut mem = Memory::new(64, 1024);
        mem.set_text(32, b"HI!\n");
        let dump = mem.dump(32, 4);
        assert!(dump.starts_with("00000020  48 49 21 0A"));
        assert!(dump.trim_end().ends_with("|HI!.|"));
    }
}
