use life_lockstep::{
    draw::{Console, ConsoleMode, GenerationSink, TextWriter},
    Driver, Error, Grid, SimConfig, Strategy,
};

use std::{
    fs::File,
    io::{self, Write},
    path::PathBuf,
    time::Duration,
};

use anyhow::Result;
use clap::{Parser, ValueEnum};

/// Runs Conway's Game of Life on a bounded grid with a pool of worker threads.
#[derive(Parser)]
#[command(name = "life")]
#[command(version)]
struct Cli {
    /// Initial grid: `rows` lines of `cols` characters, '1' is alive
    input: PathBuf,

    /// Where every generation is written
    output: PathBuf,

    rows: usize,

    cols: usize,

    generations: u64,

    /// Worker threads for row striping [default: available parallelism]
    #[arg(short, long)]
    workers: Option<usize>,

    /// One worker thread per cell
    #[arg(long)]
    per_cell: bool,

    /// Pause after each generation
    #[arg(long, default_value_t = 0)]
    delay_ms: u64,

    #[arg(long, value_enum, default_value_t = ConsoleArg::Plain)]
    console: ConsoleArg,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum ConsoleArg {
    Off,
    Plain,
    Animate,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut config = SimConfig::new(cli.rows, cli.cols, cli.generations)?
        .with_pace(Duration::from_millis(cli.delay_ms));
    if let Some(n) = cli.workers {
        config = config.with_workers(n)?;
    }
    if cli.per_cell {
        if cli.workers.is_some() {
            tracing::warn!("--workers is ignored with --per-cell");
        }
        config = config.with_strategy(Strategy::PerCell);
    }

    let input = File::open(&cli.input).map_err(|source| Error::Open {
        path: cli.input.clone(),
        source,
    })?;
    let grid = Grid::read_from(input, config.size)?;

    let mut writer = TextWriter::create(&cli.output)?;
    let mut console = match cli.console {
        ConsoleArg::Off => None,
        ConsoleArg::Plain => Some(Console::stdout(ConsoleMode::Plain, &config.size)),
        ConsoleArg::Animate => Some(Console::stdout(ConsoleMode::Animate, &config.size)),
    };

    let driver = Driver::new(config, &grid)?;
    let summary = match console.as_mut() {
        Some(c) => driver.run(&mut [&mut writer as &mut dyn GenerationSink, c])?,
        None => driver.run(&mut [&mut writer])?,
    };

    // stdout may already be gone; the output file is complete either way
    if let Err(e) = writeln!(
        io::stdout(),
        "Simulation finished after {} generations on {} workers. Output written to {}",
        summary.generations,
        summary.workers,
        cli.output.display()
    ) {
        tracing::warn!(error = %e, "could not print the final status");
    }
    Ok(())
}
