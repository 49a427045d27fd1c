use std::collections::VecDeque;

use crate::word::Cell;

/// The machine's window onto the host.
///
/// Everything the VM needs from the outside world goes through here, so a
/// machine can be driven by a terminal, a file or a test alike.
pub trait System {
    /// Writes `text` to standard output, or to the error stream if
    /// `to_error` is set.
    fn print(&mut self, text: &str, to_error: bool);

    /// Reads the next line of input, or `None` once input is exhausted.
    fn read_line(&mut self) -> Option<String>;

    /// Reads a value from an I/O port (`IN`).
    fn input(&mut self, _port: Cell) -> Cell {
        0
    }

    /// Writes a value to an I/O port (`OUT`).
    fn output(&mut self, _port: Cell, _value: Cell) {}
}

/// In-memory [`System`]: input comes from a queue of lines and output is
/// collected into strings.
#[derive(Debug, Default)]
pub struct BufferSystem {
    lines: VecDeque<String>,
    out: String,
    err: String,
    ports: Vec<(Cell, Cell)>,
}

impl BufferSystem {
    pub fn new<I, L>(lines: I) -> Self
    where
        I: IntoIterator<Item = L>,
        L: Into<String>,
    {
        Self {
            lines: lines.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    pub fn push_line(&mut self, line: impl Into<String>) {
        self.lines.push_back(line.into());
    }

    /// Everything written to standard output since the last call.
    pub fn take_output(&mut self) -> String {
        core::mem::take(&mut self.out)
    }

    /// Everything written to the error stream since the last call.
    pub fn take_errors(&mut self) -> String {
        core::mem::take(&mut self.err)
    }

    /// `(port, value)` pairs written with `OUT`, oldest first.
    pub fn port_writes(&self) -> &[(Cell, Cell)] {
        &self.ports
    }
}

impl System for BufferSystem {
    fn print(&mut self, text: &str, to_error: bool) {
        if to_error {
            self.err.push_str(text);
        } else {
            self.out.push_str(text);
        }
    }

    fn read_line(&mut self) -> Option<String> {
        self.lines.pop_front()
    }

    // Echoes the port number, which is enough to tell ports apart in tests.
    fn input(&mut self, port: Cell) -> Cell {
        port
    }

    fn output(&mut self, port: Cell, value: Cell) {
        self.ports.push((port, value));
    }
}
