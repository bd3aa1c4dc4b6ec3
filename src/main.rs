use std::{
    io::{BufWriter, Write},
    path::PathBuf,
    process::ExitCode,
};

use anyhow::Context;
use clap::{Parser, ValueEnum};

use shardstat::{
    config::{DEFAULT_MAX_LINE_LEN, DEFAULT_READ_BUFFER_SIZE, DEFAULT_TABLE_CAPACITY},
    Config, Engine, ReadMode,
};

/// Prints min/mean/max per key of a `key;value` measurements file.
#[derive(Debug, Parser)]
#[command(version, about, long_about = None)]
struct Args {
    #[arg(default_value = "measurements.txt")]
    path: PathBuf,

    /// Number of shards (and worker threads); defaults to the available parallelism
    #[arg(short, long)]
    shards: Option<usize>,

    /// Longest expected line, used when probing for shard boundaries
    #[arg(long, default_value_t = DEFAULT_MAX_LINE_LEN)]
    max_line_len: usize,

    /// Slots per shard table; a power of two above twice the distinct key count
    #[arg(long, default_value_t = DEFAULT_TABLE_CAPACITY)]
    table_capacity: usize,

    /// Worker threads; defaults to the available parallelism
    #[arg(short, long)]
    workers: Option<usize>,

    #[arg(long, default_value_t = DEFAULT_READ_BUFFER_SIZE)]
    read_buffer_size: usize,

    #[arg(long, default_value_t = ';')]
    delimiter: char,

    #[arg(long, value_enum, default_value_t = Mode::Buffered)]
    mode: Mode,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Mode {
    Buffered,
    Mapped,
}

fn main() -> ExitCode {
    env_logger::init();
    match run(Args::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> anyhow::Result<()> {
    let delimiter = u8::try_from(args.delimiter)
        .ok()
        .filter(u8::is_ascii)
        .context("delimiter must be a single ASCII character")?;

    let mut config = Config::new(&args.path)
        .with_max_line_len(args.max_line_len)
        .with_table_capacity(args.table_capacity)
        .with_read_buffer_size(args.read_buffer_size)
        .with_delimiter(delimiter)
        .with_read_mode(match args.mode {
            Mode::Buffered => ReadMode::Buffered,
            Mode::Mapped => ReadMode::Mapped,
        });
    if let Some(shards) = args.shards {
        config = config.with_shards(shards);
    }
    if let Some(workers) = args.workers {
        config = config.with_workers(workers);
    }

    let report = Engine::new(config)?
        .run()
        .with_context(|| format!("failed to aggregate {}", args.path.display()))?;

    let mut out = BufWriter::with_capacity(2 * 1024 * 1024, std::io::stdout());
    out.write_all(report.as_bytes())?;
    out.flush()?;
    Ok(())
}
