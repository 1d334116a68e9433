//! session 级质控启发式的命令行入口.
//!
//! ```bash
//! session-qc --input-csv anchor.csv --output-dir qc/ --fmriprep-subjects-csv qc/subjects.csv
//! ```

use std::path::PathBuf;

use clap::Parser;

mod report;
mod runner;

#[derive(Parser, Debug)]
#[command(version, about = "Run session-level QC heuristics")]
struct Args {
    /// Anchor + metadata table (CSV, or TSV by extension).
    #[arg(long)]
    input_csv: PathBuf,

    /// Directory where TSV outputs will be written.
    #[arg(long)]
    output_dir: PathBuf,

    /// Optional per-subject sessions CSV of the form [Subject_ID,sessions].
    #[arg(long)]
    fmriprep_subjects_csv: Option<PathBuf>,

    /// Highest phase index to run.
    #[arg(long, default_value_t = 2)]
    phase_limit: u32,

    /// YAML config file. Defaults to $QC_BERRY_CONFIG or ~/.qc-berry/config.yaml.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Also write a markdown summary of the run to this path.
    #[arg(long)]
    report: Option<PathBuf>,

    /// Write one `dropped_<heuristic>.tsv` per executed heuristic.
    #[arg(long)]
    all_drops: bool,

    /// Debug-level logging.
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    utils::init_logger(args.verbose)?;

    let config = utils::loader::load_config(args.config.as_deref())?;
    let opts = runner::Options {
        input: args.input_csv,
        output_dir: args.output_dir,
        subjects_csv: args.fmriprep_subjects_csv,
        phase_limit: args.phase_limit,
        report: args.report,
        all_drops: args.all_drops,
    };
    runner::run(&opts, config)?;
    Ok(())
}
