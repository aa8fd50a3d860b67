use std::fs::File;
use std::path::PathBuf;
use std::time::Instant;

use clap::Parser;
use tracing::{debug, info, trace};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use valves::parser::{read_and_parse, read_from_stdin_and_parse};
use valves::{DistanceTable, DualAgentSearch, SingleAgentSearch, ValveGraph};

/// Works out the most pressure that can be released from a network of valves,
/// first alone and then together with a helper.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// Valve descriptions, read from stdin when omitted.
    input: Option<PathBuf>,

    /// Valve both agents start at.
    #[arg(long, default_value = "AA")]
    start: String,

    /// Minutes available when working alone.
    #[arg(long, default_value_t = 30)]
    minutes: u32,

    /// Minutes spent teaching the helper before the two of you set off.
    #[arg(long, default_value_t = 4)]
    training: u32,

    /// Log search progress to stderr.
    #[arg(short, long)]
    verbose: bool,
}

fn init_tracing(verbose: bool) -> Result<(), Box<dyn std::error::Error>> {
    let level = if verbose {
        "valves=debug,day16=trace"
    } else {
        "warn"
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .compact()
                .with_target(false)
                .with_writer(std::io::stderr)
                .with_ansi(false),
        )
        .try_init()?;

    Ok(())
}

pub fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    init_tracing(args.verbose)?;

    let graph = match &args.input {
        Some(path) => read_and_parse(File::open(path)?, ValveGraph::parse)?,
        None => read_from_stdin_and_parse(ValveGraph::parse)?,
    };

    debug!(
        valves = graph.len(),
        useful = graph.useful().count(),
        "parsed input"
    );

    let table = DistanceTable::build(&graph, &args.start)?;

    for (from, to) in table.pairs().filter(|(from, to)| from < to) {
        trace!(
            from = table.name(from),
            to = table.name(to),
            minutes = ?table.distance(from, to),
            "distance"
        );
    }

    let started = Instant::now();
    let alone = SingleAgentSearch::new(&table).run(args.minutes)?;
    info!(
        minutes = args.minutes,
        released = alone.released,
        states = alone.states,
        elapsed = ?started.elapsed(),
        "searched alone"
    );

    let minutes = args.minutes.saturating_sub(args.training);
    let started = Instant::now();
    let together = DualAgentSearch::new(&table).run(minutes)?;
    info!(
        minutes,
        released = together.released,
        states = together.states,
        elapsed = ?started.elapsed(),
        "searched with helper"
    );

    println!("{}", alone.released);
    println!("{}", together.released);

    Ok(())
}
