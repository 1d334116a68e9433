//! 按点分键路径打印配置值, 供 shell 脚本使用.
//!
//! ```bash
//! qc-config paths.fmriprep_output_dir
//! qc-config thresholds --config config/custom.yaml
//! ```
//!
//! 标量原样输出, 映射与序列输出为 JSON. 键不存在或配置无法读取时退出码为 1.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use qc_berry::config;

#[derive(Parser, Debug)]
#[command(about = "Print a value from the YAML config given a dotted key path")]
struct Args {
    /// Dotted key path, e.g. `paths.raw_dicom_dir`.
    key: String,

    /// YAML config file. Defaults to $QC_BERRY_CONFIG or ~/.qc-berry/config.yaml.
    #[arg(long)]
    config: Option<PathBuf>,
}

fn main() -> ExitCode {
    let args = Args::parse();

    let Some(path) = config::resolve_config_path(args.config.as_deref()) else {
        eprintln!("[qc-config] Failed to load config: no config file found");
        return ExitCode::FAILURE;
    };
    let cfg = match config::load_value(&path) {
        Ok(v) => v,
        Err(e) => {
            eprintln!("[qc-config] Failed to load config: {e}");
            return ExitCode::FAILURE;
        }
    };

    match config::get_value(&cfg, &args.key).and_then(config::render_value) {
        Ok(s) => {
            println!("{s}");
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("[qc-config] {e}");
            ExitCode::FAILURE
        }
    }
}
