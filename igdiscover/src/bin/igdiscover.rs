// Copyright (c) 2026 igdiscover developers. All rights reserved.

use allele_discovery::{RunOutcome, Target};
use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use igdiscover::{
    run_clonotypes, run_config, run_group, run_init, run_pipeline, ConfigAction, GroupOptions,
    InitOptions, RunContext,
};
use log::info;
use read_group::PseudoCdr3Slice;
use std::io::Write;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "igdiscover", version, about = "Discover germline V and J alleles")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create a new run directory.
    Init {
        /// Directory with V.fasta, J.fasta and optionally D.fasta.
        #[arg(long)]
        database: PathBuf,
        /// First reads of a paired-end library.
        #[arg(long, conflicts_with = "single_reads")]
        reads1: Option<PathBuf>,
        #[arg(long)]
        single_reads: Option<PathBuf>,
        directory: PathBuf,
    },
    /// Show or change the configuration of a run.
    Config {
        #[arg(long, num_args = 2, value_names = ["KEY", "VALUE"], conflicts_with = "get")]
        set: Option<Vec<String>>,
        #[arg(long, value_name = "KEY")]
        get: Option<String>,
        #[arg(long, default_value = ".")]
        directory: PathBuf,
    },
    /// Group reads by barcode and pseudo-CDR3, one representative per group.
    Group {
        /// Barcode length. Negative for a 3' barcode.
        #[arg(short = 'b', long, allow_negative_numbers = true, default_value_t = 0)]
        barcode_length: i32,
        #[arg(long, value_name = "START:END", allow_hyphen_values = true)]
        pseudo_cdr3: Option<PseudoCdr3Slice>,
        /// Strip trailing G from the pseudo-CDR3.
        #[arg(long)]
        trim_g: bool,
        #[arg(long, default_value_t = 0)]
        minimum_length: usize,
        #[arg(long)]
        groups_output: Option<PathBuf>,
        input: PathBuf,
        output: PathBuf,
    },
    /// Print clonotypes of an assignment table, most abundant first.
    Clonotypes {
        /// Print at most this many clonotypes.
        #[arg(long)]
        limit: Option<usize>,
        /// For example iteration-01/assigned.tab.gz
        table: PathBuf,
    },
    /// Run the pipeline of a run directory.
    Run {
        /// grouped, nofinal or final
        #[arg(long, default_value = "final")]
        target: Target,
        #[arg(long, default_value = ".")]
        directory: PathBuf,
    },
}

fn init_log() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format(|buf, record| {
            writeln!(
                buf,
                "{} [{}] - {}",
                buf.timestamp_seconds(),
                record.level(),
                record.args()
            )
        })
        .init();
}

fn main() -> Result<()> {
    init_log();
    match Cli::parse().command {
        Command::Init {
            database,
            reads1,
            single_reads,
            directory,
        } => {
            run_init(
                &directory,
                &InitOptions {
                    database,
                    reads1,
                    single_reads,
                },
            )?;
        }
        Command::Config {
            set,
            get,
            directory,
        } => {
            let action = match (set, get) {
                (Some(pair), _) => match <[String; 2]>::try_from(pair) {
                    Ok([key, value]) => ConfigAction::Set(key, value),
                    Err(_) => bail!("--set needs a key and a value"),
                },
                (None, Some(key)) => ConfigAction::Get(key),
                (None, None) => ConfigAction::Show,
            };
            let out = run_config(&directory, &action)?;
            if !out.is_empty() {
                println!("{}", out.trim_end());
            }
        }
        Command::Group {
            barcode_length,
            pseudo_cdr3,
            trim_g,
            minimum_length,
            groups_output,
            input,
            output,
        } => {
            let options = GroupOptions {
                barcode_length,
                pseudo_cdr3,
                trim_g,
                minimum_length,
                groups_output,
            };
            let stats = run_group(&input, &output, &options)?;
            info!("{}", serde_json::to_string(&stats)?);
        }
        Command::Clonotypes { limit, table } => {
            run_clonotypes(&table, limit, std::io::stdout().lock())?;
        }
        Command::Run { target, directory } => {
            let ctx = RunContext::open(&directory)?;
            let summary = run_pipeline(&ctx, target)?;
            if let Some(outcome) = summary.outcome {
                info!(
                    "Finished after {} iterations ({})",
                    outcome.iterations(),
                    match outcome {
                        RunOutcome::Converged { .. } => "converged",
                        RunOutcome::NotConverged { .. } => "not converged",
                    }
                );
            }
            if let Some(database) = summary.database {
                info!("Final database: {database}");
            }
        }
    }
    Ok(())
}
