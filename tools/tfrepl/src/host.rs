use std::{
    collections::VecDeque,
    io::{self, BufRead, IsTerminal, Write},
};

use owo_colors::{OwoColorize, Stream};
use rustyline::{error::ReadlineError, DefaultEditor};
use tforth::{Cell, System};

/// Feeds the VM queued source lines first, then standard input.
pub struct StdSystem {
    queued: VecDeque<String>,
    /// Line editor, used only when stdin is a terminal.
    editor: Option<DefaultEditor>,
}

impl StdSystem {
    pub fn new(queued: Vec<String>) -> Self {
        let editor = if io::stdin().is_terminal() {
            DefaultEditor::new()
                .map_err(|error| tracing::warn!(%error, "no line editor, reading stdin directly"))
                .ok()
        } else {
            None
        };
        Self {
            queued: queued.into(),
            editor,
        }
    }

    fn read_stdin() -> Option<String> {
        let mut line = String::new();
        match io::stdin().lock().read_line(&mut line) {
            Ok(0) => None,
            Ok(_) => Some(line),
            Err(error) => {
                tracing::warn!(%error, "failed to read stdin");
                None
            }
        }
    }
}

impl System for StdSystem {
    fn print(&mut self, text: &str, to_error: bool) {
        if to_error {
            eprint!("{}", text.if_supports_color(Stream::Stderr, |t| t.red()));
        } else {
            print!("{text}");
            let _ = io::stdout().flush();
        }
    }

    fn read_line(&mut self) -> Option<String> {
        if let Some(line) = self.queued.pop_front() {
            return Some(line);
        }
        let Some(editor) = self.editor.as_mut() else {
            return Self::read_stdin();
        };
        loop {
            match editor.readline("> ") {
                Ok(line) => {
                    let _ = editor.add_history_entry(line.as_str());
                    return Some(line);
                }
                // ^C at the prompt just discards the line.
                Err(ReadlineError::Interrupted) => continue,
                Err(ReadlineError::Eof) => return None,
                Err(error) => {
                    tracing::warn!(%error, "failed to read a line");
                    return None;
                }
            }
        }
    }

    fn output(&mut self, port: Cell, value: Cell) {
        tracing::info!(port, value, "OUT");
    }
}
