//! Exercises the static heap through `malloc`/`free`.
//!
//! Each subcommand runs against one process-wide heap. A misused `free` ends
//! the process with status 2, a failed check with status 1. Blocks still
//! allocated when the process ends are reported on stderr as
//! `<bytes> leaked in <count> objects.`

use std::{
    env,
    io::{self, IsTerminal as _},
    process,
};

use argh::FromArgs;
use snafu_utils::{GenericError, Report};

use self::{log::LogLevel, scenario::Misuse};

#[macro_use]
mod log;

mod grind;
mod heap;
mod memtest;
mod scenario;

/// Drive the static heap allocator.
#[derive(Debug, FromArgs)]
struct Args {
    /// log every allocation
    #[argh(switch, short = 'v')]
    verbose: bool,
    /// only log warnings and errors
    #[argh(switch, short = 'q')]
    quiet: bool,
    #[argh(subcommand)]
    command: Command,
}

#[derive(Debug, FromArgs)]
#[argh(subcommand)]
enum Command {
    Memtest(MemtestArgs),
    Grind(GrindArgs),
    Misuse(MisuseArgs),
    Leak(LeakArgs),
}

/// Run the correctness suite.
#[derive(Debug, FromArgs)]
#[argh(subcommand, name = "memtest")]
struct MemtestArgs {
    /// fill the heap and exit without freeing anything
    #[argh(switch)]
    leak: bool,
}

/// Time allocation workloads.
#[derive(Debug, FromArgs)]
#[argh(subcommand, name = "grind")]
struct GrindArgs {
    /// number of runs to average over
    #[argh(option, default = "50")]
    runs: u32,
    /// seed for the random workload
    #[argh(option, default = "0")]
    seed: u64,
}

/// Pass a bad reference to free; exits with status 2.
#[derive(Debug, FromArgs)]
#[argh(subcommand, name = "misuse")]
struct MisuseArgs {
    /// one of invalid-pointer, not-chunk-start, double-free
    #[argh(positional)]
    kind: Misuse,
}

/// Allocate objects and exit without freeing them.
#[derive(Debug, FromArgs)]
#[argh(subcommand, name = "leak")]
struct LeakArgs {
    /// number of objects
    #[argh(option, default = "memtest::OBJECTS")]
    objects: usize,
    /// size of each object in bytes
    #[argh(option, default = "memtest::OBJSIZE")]
    size: usize,
}

fn main() {
    let args: Args = argh::from_env();

    let color = io::stderr().is_terminal() && env::var_os("NO_COLOR").is_none();
    ansi_term::set_enabled(color);
    if args.verbose && args.quiet {
        warn!("both --verbose and --quiet given, using --verbose");
    }
    if args.verbose {
        log::set_max_level(LogLevel::Trace);
    } else if args.quiet {
        log::set_max_level(LogLevel::Warn);
    }

    let result = run(&args);
    heap::report_leaks();
    if let Err(err) = result {
        let report = Report::new(err);
        eprintln!("{report}");
        process::exit(1);
    }
}

fn run(args: &Args) -> Result<(), GenericError> {
    match &args.command {
        Command::Memtest(args) => memtest::run(args.leak),
        Command::Grind(args) => grind::run(args.runs, args.seed),
        Command::Misuse(args) => scenario::misuse(args.kind),
        Command::Leak(args) => scenario::leak(args.objects, args.size),
    }
}
