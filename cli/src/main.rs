use clap::{Parser, Subcommand};
use std::path::PathBuf;
use anyhow::{Result, Context};
use pash_core::Sensitivity;

mod config;
mod commands;
mod error;

use config::Config;
use error::CliError;

#[derive(Parser)]
#[command(name = "pash")]
#[command(about = "pash - spaced-seed short read mapper")]
#[command(version)]
#[command(long_about = "
pash indexes short reads with spaced seeds, scans a genome against the index
and reports banded local alignments, with support for bisulfite-treated reads.

Examples:
  pash map --reads reads.fq --genome genome.fa --output reads.pash
  pash map -r reads.fq.gz -g chromosomes.fof -o reads.pash.gz -z -N 5 -P 2
  pash map -r bs_reads.fq -g genome.fa -o bs.pash --bisulfite --sensitivity high
  pash config --example > pash.toml
")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Configuration file path
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Number of threads to use
    #[arg(short, long, global = true)]
    pub threads: Option<usize>,

    /// Verbose output
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Quiet mode (suppress non-error output)
    #[arg(short, long, global = true)]
    pub quiet: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Map reads against a genome
    #[cfg(feature = "map")]
    Map {
        /// Read file (FASTA/FASTQ, optionally gzip-compressed)
        #[arg(short, long, required = true)]
        reads: PathBuf,

        /// Genome FASTA file, or a .fof file listing FASTA files
        #[arg(short, long, required = true)]
        genome: PathBuf,

        /// Output file
        #[arg(short, long, required = true)]
        output: PathBuf,

        /// Gzip-compress the output
        #[arg(short = 'z', long)]
        gzip: bool,

        /// Bitmap of seeds to ignore: one bit per key, least-significant bit
        /// first, with the file size (4^weight / 8 bytes) fixing the mask weight
        #[arg(short = 'L', long)]
        ignore_list: Option<PathBuf>,

        /// Maximum mappings reported per read
        #[arg(short = 'N', long)]
        max_mappings: Option<u32>,

        /// Report mappings within this percentage of the best score
        #[arg(short = 'P', long)]
        top_percent: Option<f64>,

        /// Map bisulfite-treated reads
        #[arg(short = 'B', long)]
        bisulfite: bool,

        /// Seeding density (high, medium, low, fast or user)
        #[arg(long)]
        sensitivity: Option<Sensitivity>,

        /// Seed step for the user sensitivity
        #[arg(long)]
        word_offset: Option<usize>,

        /// Percentage of seed occurrences kept in the index (90-100)
        #[arg(short = 'K', long)]
        keep_percent: Option<u32>,

        /// Spaced seed preset (e.g. 12from18) or literal 0/1 pattern
        #[arg(short, long)]
        pattern: Option<String>,

        /// Write run statistics as JSON
        #[arg(long)]
        stats: Option<PathBuf>,
    },

    /// Show the effective configuration
    Config {
        /// Print the default configuration instead
        #[arg(long)]
        example: bool,

        /// Write to a file instead of standard output
        #[arg(long)]
        write: Option<PathBuf>,
    },
}

fn setup_logging(verbose: u8, quiet: bool) -> Result<()> {
    if quiet {
        std::env::set_var("RUST_LOG", "error");
    } else {
        let level = match verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        };
        std::env::set_var("RUST_LOG", level);
    }

    env_logger::Builder::from_default_env()
        .format_timestamp_secs()
        .init();

    Ok(())
}

fn run(cli: Cli) -> Result<()> {
    setup_logging(cli.verbose, cli.quiet)?;

    let config = Config::load(cli.config.as_deref())
        .map_err(|e| CliError::config(format!("{:#}", e)))?;

    let threads = cli.threads.unwrap_or(config.general.threads).max(1);
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build_global()
        .context("Failed to set thread count")?;
    log::debug!("Using {} threads", threads);

    match cli.command {
        #[cfg(feature = "map")]
        Commands::Map {
            reads,
            genome,
            output,
            gzip,
            ignore_list,
            max_mappings,
            top_percent,
            bisulfite,
            sensitivity,
            word_offset,
            keep_percent,
            pattern,
            stats,
        } => {
            commands::map::execute(
                &config,
                commands::map::MapArgs {
                    reads,
                    genome,
                    output,
                    gzip,
                    ignore_list,
                    max_mappings,
                    top_percent,
                    bisulfite,
                    sensitivity,
                    word_offset,
                    keep_percent,
                    pattern,
                    stats,
                },
            )?;
        }

        Commands::Config { example, write } => {
            commands::config::execute(&config, example, write)?;
        }
    }

    Ok(())
}

fn main() {
    let cli = Cli::parse();

    if let Err(err) = run(cli) {
        match err.downcast_ref::<CliError>() {
            Some(cli_err) => error::print_error_and_exit(cli_err),
            None => {
                eprintln!("Error: {:#}", err);
                std::process::exit(1);
            }
        }
    }
}
