use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use mmpair::*;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use tracing::*;

#[derive(Parser, Debug)]
#[command(name = "mmp", version, about = "Matched molecular pair fragmentation and pairing")]
struct Cli {
    /// JSON configuration file (defaults apply when omitted).
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// error, warn, info, debug or trace.
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Debug)]
struct FragmentArgs {
    /// Input CSV with a SMILES column.
    input: PathBuf,
    /// Output CSV of Key/Value rows.
    #[arg(long, short)]
    output: PathBuf,
    /// Output CSV of rows that could not be fragmented.
    #[arg(long)]
    rejects: PathBuf,
    /// Also write the input row to fragment row correlation map as JSON.
    #[arg(long)]
    correlation: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Fragment every molecule of a CSV table.
    Fragment(FragmentArgs),
    /// Pair fragment rows that share a Key.
    Pair {
        /// Fragment CSV written by `mmp fragment`.
        input: PathBuf,
        #[arg(long, short)]
        output: PathBuf,
    },
    /// Fragment and pair in one go.
    Run {
        input: PathBuf,
        /// Output CSV of transforms.
        #[arg(long, short)]
        output: PathBuf,
        #[arg(long)]
        rejects: PathBuf,
    },
}

fn open(path: &Path) -> Result<BufReader<File>> {
    let file = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    Ok(BufReader::new(file))
}

fn create(path: &Path) -> Result<BufWriter<File>> {
    let file = File::create(path).with_context(|| format!("Failed to create {}", path.display()))?;
    Ok(BufWriter::new(file))
}

fn load_config(path: Option<&Path>) -> Result<MmpConfig> {
    let config = match path {
        Some(path) => MmpConfig::from_json_file(path)
            .with_context(|| format!("Failed to read configuration {}", path.display()))?,
        None => MmpConfig::default(),
    };
    config.validate().context("Invalid configuration")?;
    Ok(config)
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_level);
    let config = load_config(cli.config.as_deref())?;
    let cancel = CancellationToken::new();

    match cli.command {
        Command::Fragment(args) => {
            let mut correlation = args.correlation.as_ref().map(|_| CorrelationMap::new());
            let summary = fragment_table(
                &config,
                &cancel,
                open(&args.input)?,
                create(&args.output)?,
                create(&args.rejects)?,
                correlation.as_mut(),
            )
            .with_context(|| format!("Failed to fragment {}", args.input.display()))?;
            if let (Some(path), Some(map)) = (&args.correlation, &correlation) {
                map.save(create(path)?)
                    .with_context(|| format!("Failed to write {}", path.display()))?;
            }
            info!(
                "{} rows, {} fragments, {} rejected",
                summary.rows, summary.fragments, summary.rejected
            );
        }
        Command::Pair { input, output } => {
            let stats = pair_table(&config, &cancel, open(&input)?, create(&output)?)
                .with_context(|| format!("Failed to pair {}", input.display()))?;
            info!("{stats}");
        }
        Command::Run {
            input,
            output,
            rejects,
        } => {
            let (summary, stats) = run_table(
                &config,
                &cancel,
                open(&input)?,
                create(&output)?,
                create(&rejects)?,
            )
            .with_context(|| format!("Failed to process {}", input.display()))?;
            info!("{} rows, {} rejected; {stats}", summary.rows, summary.rejected);
        }
    }
    Ok(())
}
