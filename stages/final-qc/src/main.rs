//! 最终质控: 头动汇总, Euler 数提取, 纳入判定, 以及 fMRIPrep 失败归类.
//!
//! ```bash
//! final-qc motion --output-dir qc/
//! final-qc euler --output-tsv qc/euler_summary.tsv
//! final-qc finalize --motion-summary qc/motion_summary.tsv \
//!     --euler-summary qc/euler_summary.tsv --output-dir qc/final
//! final-qc errors --logs slurm/logs --crashes derivatives/fmriprep \
//!     --bids bids/ --output-tsv qc/fmriprep_errors.tsv
//! ```

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use qc_berry::dataset::fmriprep::FailureScan;

mod runner;

#[derive(Parser, Debug)]
#[command(version, about = "Motion, Euler and final inclusion QC")]
struct Args {
    /// YAML config file. Defaults to $QC_BERRY_CONFIG or ~/.qc-berry/config.yaml.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Debug-level logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Summarize head motion from fMRIPrep confounds files.
    Motion {
        /// fMRIPrep derivatives directory. Defaults to $QC_DERIVATIVES_DIR or ~/dataset/derivatives.
        #[arg(long)]
        derivatives_dir: Option<PathBuf>,

        /// Directory for motion_summary.tsv and motion_timeseries.tsv.
        #[arg(long)]
        output_dir: PathBuf,

        /// FD threshold in mm for counting high-motion frames.
        #[arg(long)]
        fd_thresh: Option<f64>,
    },

    /// Extract Euler numbers from FreeSurfer recon-all logs.
    Euler {
        /// FreeSurfer SUBJECTS_DIR. Defaults to $SUBJECTS_DIR or ~/dataset/derivatives/freesurfer.
        #[arg(long)]
        freesurfer_dir: Option<PathBuf>,

        /// Output TSV path.
        #[arg(long)]
        output_tsv: PathBuf,
    },

    /// Combine motion, sitewise Euler and IQM outliers into the final decision.
    Finalize {
        /// motion_summary.tsv from `final-qc motion`.
        #[arg(long)]
        motion_summary: PathBuf,

        /// euler_summary.tsv from `final-qc euler`.
        #[arg(long)]
        euler_summary: PathBuf,

        /// Optional IQM outlier table with at least [sub, ses, exclude_mriqc].
        #[arg(long)]
        iqm_outliers: Option<PathBuf>,

        /// Exclude runs with mean FD_P above this threshold.
        #[arg(long)]
        fd_mean_thresh: Option<f64>,

        /// Exclude runs with more than this proportion of frames above the FD_P threshold.
        #[arg(long)]
        fd_prop_thresh: Option<f64>,

        /// Directory for included_sessions.tsv and excluded_sessions.tsv.
        #[arg(long)]
        output_dir: PathBuf,
    },

    /// Classify fMRIPrep failures from Slurm logs and crashfiles.
    Errors {
        /// Log file or directory, searched for *.out, *.err, *.log and *.txt. Repeatable.
        #[arg(long)]
        logs: Vec<PathBuf>,

        /// Crashfile or derivatives directory, searched for sub-*/log/*crash*. Repeatable.
        /// Defaults to $QC_DERIVATIVES_DIR or ~/dataset/derivatives when no --logs are given either.
        #[arg(long)]
        crashes: Vec<PathBuf>,

        /// BIDS root for checking whether BOLD images exist on disk.
        #[arg(long)]
        bids: Option<PathBuf>,

        /// Output TSV path.
        #[arg(long)]
        output_tsv: PathBuf,
    },

    /// Report the structural image header of one session directory.
    Probe {
        /// Session directory, e.g. `sub-01/ses-M000`.
        session_dir: PathBuf,

        /// Modality suffix of the image file.
        #[arg(long, default_value = "T1w")]
        modality: String,
    },
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    utils::init_logger(args.verbose)?;
    let mut config = utils::loader::load_config(args.config.as_deref())?;

    match args.command {
        Command::Motion {
            derivatives_dir,
            output_dir,
            fd_thresh,
        } => {
            if let Some(t) = fd_thresh {
                config.motion.fd_thresh = t;
            }
            let root = utils::loader::derivatives_dir_from_env_or_home(derivatives_dir.as_deref())?;
            runner::motion(&root, &output_dir, &config)?;
        }
        Command::Euler {
            freesurfer_dir,
            output_tsv,
        } => {
            let root = utils::loader::freesurfer_dir_from_env_or_home(freesurfer_dir.as_deref())?;
            runner::euler(&root, &output_tsv, &config)?;
        }
        Command::Finalize {
            motion_summary,
            euler_summary,
            iqm_outliers,
            fd_mean_thresh,
            fd_prop_thresh,
            output_dir,
        } => {
            if let Some(t) = fd_mean_thresh {
                config.inclusion.fd_mean_thresh = t;
            }
            if let Some(t) = fd_prop_thresh {
                config.inclusion.fd_prop_thresh = t;
            }
            let inputs = runner::FinalizeInputs {
                motion: motion_summary,
                euler: euler_summary,
                iqm: iqm_outliers,
            };
            runner::finalize(&inputs, &output_dir, &config)?;
        }
        Command::Errors {
            logs,
            mut crashes,
            bids,
            output_tsv,
        } => {
            if logs.is_empty() && crashes.is_empty() {
                crashes.push(utils::loader::derivatives_dir_from_env_or_home(None)?);
            }
            let scan = FailureScan { logs, crashes, bids };
            runner::errors(&scan, &output_tsv)?;
        }
        Command::Probe { session_dir, modality } => runner::probe(&session_dir, &modality)?,
    }
    Ok(())
}
