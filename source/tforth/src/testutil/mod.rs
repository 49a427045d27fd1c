//! # Test Utilities
//!
//! Helpers for running "ui tests": Forth sessions written as a transcript.
//!
//! ## UI Tests
//!
//! Each line of a transcript is one of:
//!
//! * Configuration values for the machine, specified as "frontmatter
//!   comments". These must appear before any other non-comment lines.
//!   Currently accepted:
//!     * `( memory_max USIZE )`
//!     * `( memory_chunk USIZE )`
//!     * `( trace on )`
//!     * `( prelude off )`: start from the bare primitives
//! * Comment lines. These are any lines just containing a `( ... )` style
//!   comment.
//! * Successful input lines, starting with `> ...`.
//! * Successful output lines, starting with `< ...`.
//!     * Any successful input line can have zero or more output lines
//!     * If *no* output lines are specified, ANY output is accepted.
//! * Unsuccessful input lines, starting with `x ...`.
//!     * This line is expected to make `process_line` return an `Err`,
//!       which also resets the machine.
//!
//! ### Example
//!
//! Doctests only see this module with the `_force_test_utils` feature enabled.
//!
//! ```rust,ignore
//! # use tforth::testutil::blocking_runtest;
//! #
//! # blocking_runtest(r#"
//! ( specify machine settings with frontmatter )
//! ( memory_max 65536 )
//!
//! ( specify input with no output )
//! > : star 42 emit ;
//!
//! ( specify input and output )
//! > star
//! < *
//!
//! ( specify lines that cause errors )
//! x starb
//! # "#)
//! ```

use crate::{system::BufferSystem, vm::MachineParams, Error, Machine};

#[derive(Debug, Clone, Copy)]
struct Settings {
    params: MachineParams,
    prelude: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            params: MachineParams::default(),
            prelude: true,
        }
    }
}

/// Run the given ui test against a fresh machine.
///
/// Accepts any/all/none of the configuration frontmatter listed above.
pub fn blocking_runtest(contents: &str) {
    let tokd = tokenize(contents, true).unwrap();
    let mut machine = Machine::new(BufferSystem::default(), tokd.settings.params).unwrap();
    if tokd.settings.prelude {
        machine.load_prelude().unwrap();
    }
    blocking_steps_with(tokd.steps.as_slice(), &mut machine);
}

/// Run the given ui test against the given machine.
///
/// Does not accept ui tests with frontmatter configuration (will panic).
pub fn blocking_runtest_with(machine: &mut Machine<BufferSystem>, contents: &str) {
    let tokd = tokenize(contents, false).unwrap();
    blocking_steps_with(tokd.steps.as_slice(), machine);
}

fn check_output(res: Result<(), Error>, outcome: &Outcome, output: &str, errors: &str) {
    println!("< {output}");
    match (res, outcome) {
        (Ok(()), Outcome::OkAnyOutput) => {}
        (Ok(()), Outcome::OkWithOutput(exp)) => {
            let act_lines = output.lines().collect::<Vec<&str>>();
            assert_eq!(act_lines.len(), exp.len(), "output: {output:?}");
            act_lines.iter().zip(exp.iter()).for_each(|(a, e)| {
                assert_eq!(a.trim_end(), e.trim_end());
            })
        }
        (Err(_e), Outcome::FatalError) => {}
        (res, exp) => {
            eprintln!("Error!");
            eprintln!("Expected: {exp:?}");
            eprintln!("Got: {res:?}");
            if res.is_ok() {
                eprintln!("Output:\n{output}");
            }
            eprintln!("Errors:\n{errors}");
            panic!();
        }
    }
}

// Runs the given steps against the given machine.
//
// Panics on any mismatch
fn blocking_steps_with(steps: &[Step], machine: &mut Machine<BufferSystem>) {
    for Step { input, output: outcome } in steps {
        println!("> {input}");
        let res = machine.process_line(input);
        let output = machine.system_mut().take_output();
        let errors = machine.system_mut().take_errors();
        check_output(res, outcome, &output, &errors);
    }
}

#[derive(Debug)]
enum Outcome {
    OkAnyOutput,
    OkWithOutput(Vec<String>),
    FatalError,
}

#[derive(Debug)]
struct Step {
    input: String,
    output: Outcome,
}

#[derive(Default, Debug)]
struct Tokenized {
    settings: Settings,
    steps: Vec<Step>,
}

fn tokenize(contents: &str, allow_frontmatter: bool) -> Result<Tokenized, ()> {
    let mut output = Tokenized::default();
    let mut frontmatter_done = !allow_frontmatter;

    for line in contents.lines() {
        let (tok, remain) = if let Some(t) = line.trim_start().split_once(' ') {
            t
        } else {
            continue;
        };

        match tok {
            ">" => {
                frontmatter_done = true;
                output.steps.push(Step {
                    input: remain.to_string(),
                    output: Outcome::OkAnyOutput,
                });
            }
            "<" => {
                frontmatter_done = true;
                let cur_step = output.steps.last_mut().ok_or(())?;
                let expected_out = remain.to_string();
                match &mut cur_step.output {
                    Outcome::OkAnyOutput => {
                        cur_step.output = Outcome::OkWithOutput(vec![expected_out]);
                    }
                    Outcome::OkWithOutput(o) => {
                        o.push(expected_out);
                    }
                    Outcome::FatalError => panic!("Fatal error can't set output"),
                }
            }
            "x" => {
                frontmatter_done = true;
                output.steps.push(Step {
                    input: remain.to_string(),
                    output: Outcome::FatalError,
                });
            }
            "(" => {
                let mut split = remain.split_whitespace();
                let mut is_comment = false;
                match split.next() {
                    Some("memory_max") => {
                        output.settings.params.memory_max =
                            split.next().unwrap().parse::<usize>().unwrap();
                    }
                    Some("memory_chunk") => {
                        output.settings.params.memory_chunk =
                            split.next().unwrap().parse::<usize>().unwrap();
                    }
                    Some("trace") => {
                        output.settings.params.trace = split.next() == Some("on");
                    }
                    Some("prelude") => {
                        output.settings.prelude = split.next() != Some("off");
                    }
                    Some(_) => {
                        is_comment = true;
                    }
                    _ => panic!(),
                }
                if !is_comment {
                    assert!(!frontmatter_done, "Unexpected frontmatter settings!");
                    assert_eq!(Some(")"), split.next());
                }
            }
            _ => {}
        }
    }

    Ok(output)
}

#[cfg(test)]
pub mod test {
    use super::{blocking_runtest, blocking_runtest_with};
    use crate::{system::BufferSystem, vm::MachineParams, Machine};

    #[test]
    fn transcript() {
        blocking_runtest(
            r#"
            ( a definition, then its use )
            > : DOUBLE 2 * ;
            > 3 DOUBLE .
            < 6
            > : QUAD DOUBLE DOUBLE ;
            > 3 QUAD .
            < 12
            > SEE QUAD
            < : QUAD DOUBLE DOUBLE ;
            x NOSUCH
            > 1 .S
            < <1> 1
            "#,
        );
    }

    #[test]
    fn frontmatter() {
        blocking_runtest(
            r#"
            ( prelude off )
            ( memory_chunk 1024 )
            x : T 1 IF 2 THEN ;
            > 1 2 + .
            < 3
            "#,
        );
    }

    #[test]
    fn existing_machine() {
        let mut m = Machine::new(BufferSystem::default(), MachineParams::default()).unwrap();
        m.load_prelude().unwrap();
        m.process_line("VARIABLE COUNTER").unwrap();
        blocking_runtest_with(
            &mut m,
            r#"
            > 3 COUNTER ! COUNTER @ 1+ .
            < 4
            "#,
        );
    }
}
