use std::path::PathBuf;

use clap::Parser;
use miette::{Context, IntoDiagnostic};
use tforth::{Machine, MachineParams, PRELUDE};
use tracing::level_filters::LevelFilter;

mod host;
mod interrupt;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Forth source files to load, in order, before reading from stdin.
    files: Vec<PathBuf>,

    /// Don't compile the bundled prelude (`IF`, `DO`, `RECURSE`, ...).
    #[arg(long)]
    no_prelude: bool,

    /// Upper bound on the VM's memory, in bytes.
    #[arg(long, default_value_t = MachineParams::default().memory_max)]
    memory_max: usize,

    /// Memory grows in steps of this many bytes.
    #[arg(long, default_value_t = MachineParams::default().memory_chunk)]
    memory_chunk: usize,

    /// Start with the VM's `TRACE` register set, printing every native word
    /// as it runs.
    #[arg(long)]
    trace_words: bool,

    /// a comma-separated list of `tracing` targets and levels to enable.
    ///
    /// for example, `warn,tforth=debug` will enable the `WARN` level
    /// globally and the `DEBUG` level for the VM itself.
    ///
    /// see <https://docs.rs/tracing-subscriber/latest/tracing_subscriber/filter/targets/struct.Targets.html#filtering-with-targets>
    /// for more details on this syntax.
    #[arg(
        short,
        long = "trace",
        env = "TFORTH_TRACE",
        default_value_t = tracing_subscriber::filter::Targets::new().with_default(LevelFilter::WARN),
    )]
    trace_filter: tracing_subscriber::filter::Targets,
}

fn main() -> miette::Result<()> {
    use tracing_subscriber::prelude::*;

    let Args {
        files,
        no_prelude,
        memory_max,
        memory_chunk,
        trace_words,
        trace_filter,
    } = Args::parse();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .without_time()
                .with_writer(std::io::stderr),
        )
        .with(trace_filter)
        .init();

    let mut source = Vec::new();
    if !no_prelude {
        source.extend(PRELUDE.lines().map(String::from));
    }
    for path in &files {
        let text = std::fs::read_to_string(path)
            .into_diagnostic()
            .with_context(|| format!("failed to read {}", path.display()))?;
        source.extend(text.lines().map(String::from));
    }
    tracing::debug!(lines = source.len(), files = files.len(), "loaded source");

    let params = MachineParams {
        memory_chunk,
        memory_max,
        trace: trace_words,
    };
    let mut machine = Machine::new(host::StdSystem::new(source), params)
        .into_diagnostic()
        .context("failed to start the VM")?;
    interrupt::forward_ctrl_c(machine.abort_handle())?;
    let code = machine.run();
    std::process::exit(code)
}
