//! 程序运行函数.

use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use qc_berry::data::Delimiter;
use qc_berry::prelude::*;

use crate::report;

/// 单独写出的丢弃表: `(启发式代码名, 文件名)`.
const TRACKED_DROPS: [(&str, &str); 2] = [
    ("filter_missing_t1w", "missing_t1w.tsv"),
    ("filter_missing_data", "missing_data.tsv"),
];

/// 最终工作表的文件名.
pub const FINAL_TABLE: &str = "final_heuristics.tsv";

/// 一次运行的参数.
#[derive(Clone, Debug)]
pub struct Options {
    pub input: PathBuf,
    pub output_dir: PathBuf,
    pub subjects_csv: Option<PathBuf>,
    pub phase_limit: u32,
    pub report: Option<PathBuf>,
    pub all_drops: bool,
}

/// 实际运行. 返回跑完的管线, 便于调用方检查.
pub fn run(opts: &Options, config: QcConfig) -> anyhow::Result<SessionFilterPipeline> {
    if !opts.input.is_file() {
        bail!("input table does not exist: {}", opts.input.display());
    }
    fs::create_dir_all(&opts.output_dir)
        .with_context(|| format!("cannot create {}", opts.output_dir.display()))?;

    let raw = RawTable::open(&opts.input)?;
    let table = SessionTable::ingest(raw, &config.fields)?;
    let mut pipeline = SessionFilterPipeline::new(table, config);

    let stdout = io::stdout();
    let mut out = stdout.lock();
    report::heuristics_table_into(pipeline.phases(), &mut out)?;

    pipeline.run(opts.phase_limit)?;
    if !pipeline.diagnostics().is_empty() {
        log::warn!("{} malformed rows were dropped, see warnings above", pipeline.diagnostics().len());
    }

    for (name, file) in TRACKED_DROPS {
        match pipeline.dropped(name) {
            Some(rows) => {
                let p = opts.output_dir.join(file);
                rows.to_raw().save(&p, Delimiter::Tab)?;
                writeln!(out, "Wrote {name} to: {}", p.display())?;
            }
            None => writeln!(out, "[warn] No entries for {name}; not writing {file}")?,
        }
    }

    if opts.all_drops {
        for entry in pipeline.drop_log() {
            let p = opts.output_dir.join(format!("dropped_{}.tsv", entry.heuristic));
            entry.rows.to_raw().save(&p, Delimiter::Tab)?;
            log::debug!("Wrote {} dropped rows to {}", entry.rows.len(), p.display());
        }
    }

    let p = opts.output_dir.join(FINAL_TABLE);
    pipeline.final_table().to_raw().save(&p, Delimiter::Tab)?;
    writeln!(out, "Wrote final heuristics table to: {}", p.display())?;

    if let Some(p) = opts.subjects_csv.as_deref() {
        ensure_parent(p)?;
        pipeline.visit_rollup().save(p, Delimiter::Comma)?;
        writeln!(out, "Wrote per-subject sessions to: {}", p.display())?;
    }

    utils::sep_to(&mut out)?;
    for &phase in pipeline.checkpoints().keys() {
        if let Some(o) = pipeline.overlap(phase)? {
            writeln!(out, "{o}")?;
        }
        if let Some(m) = pipeline.missing_by_manufacturer(phase) {
            report::missing_by_manufacturer_into(phase, &m, &mut out)?;
        }
    }

    let summary = pipeline.summary();
    log::info!(
        "Kept {} of {} sessions ({} subjects)",
        summary.final_kept,
        summary.initial_count,
        summary.final_subjects
    );
    if let Some(p) = opts.report.as_deref() {
        ensure_parent(p)?;
        let mut w = BufWriter::new(File::create(p)?);
        summary.write_markdown(&mut w)?;
        w.flush()?;
        writeln!(out, "Wrote summary report to: {}", p.display())?;
    }

    Ok(pipeline)
}

fn ensure_parent(p: &Path) -> io::Result<()> {
    match p.parent() {
        Some(d) if !d.as_os_str().is_empty() => fs::create_dir_all(d),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const HEADER: &str = "Image_ID,Subject_ID,VISCODE,NIfTI_exists,JSON_exists,T1w_exists,\
        nifti_dim,nifti_pixdim,json_RepetitionTime,json_PercentPhaseFOV,json_CoilString,json_Manufacturer";

    fn row(id: u32, sub: &str, viscode: &str, nifti: &str, t1w: &str) -> String {
        format!(
            "{id},{sub},{viscode},{nifti},TRUE,{t1w},\"[0, 0, 0, 160, 300]\",\"[0, 0, 0, 1.0, 0]\",3.0,80,HEAD,Siemens"
        )
    }

    fn options(dir: &Path, input: PathBuf) -> Options {
        Options {
            input,
            output_dir: dir.join("out"),
            subjects_csv: Some(dir.join("out").join("subjects.csv")),
            phase_limit: 2,
            report: Some(dir.join("report.md")),
            all_drops: true,
        }
    }

    #[test]
    fn test_run_writes_outputs() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("anchor.csv");
        let body = [
            HEADER.to_string(),
            row(1, "A", "bl", "TRUE", "TRUE"),
            row(2, "B", "m06", "TRUE", "FALSE"),
            row(3, "C", "bl", "FALSE", "TRUE"),
        ]
        .join("\n");
        fs::write(&input, body).unwrap();

        let opts = options(dir.path(), input);
        let pipeline = run(&opts, QcConfig::default()).unwrap();
        assert_eq!(pipeline.final_table().len(), 1);

        let out = &opts.output_dir;
        let kept = fs::read_to_string(out.join(FINAL_TABLE)).unwrap();
        assert_eq!(kept.lines().count(), 2);
        assert!(kept.lines().nth(1).unwrap().contains("\tA\t"));

        let t1w = fs::read_to_string(out.join("missing_t1w.tsv")).unwrap();
        assert!(t1w.lines().nth(1).unwrap().contains("\tB\t"));
        let data = fs::read_to_string(out.join("missing_data.tsv")).unwrap();
        assert!(data.lines().nth(1).unwrap().contains("\tC\t"));
        assert!(out.join("dropped_filter_short_duration.tsv").is_file());

        let subjects = fs::read_to_string(out.join("subjects.csv")).unwrap();
        assert_eq!(subjects.lines().collect::<Vec<_>>(), ["Subject_ID,sessions", "A,M000"]);

        let md = fs::read_to_string(dir.path().join("report.md")).unwrap();
        assert!(md.contains("Final: 1 sessions from 1 subjects (2 dropped)."));
    }

    #[test]
    fn test_phase_limit_zero() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("anchor.csv");
        fs::write(&input, [HEADER.to_string(), row(1, "A", "bl", "TRUE", "TRUE")].join("\n")).unwrap();

        let mut opts = options(dir.path(), input);
        opts.phase_limit = 0;
        opts.subjects_csv = None;
        let pipeline = run(&opts, QcConfig::default()).unwrap();
        assert_eq!(pipeline.drop_log().len(), 3);
        // 无丢弃时仍写出只有表头的文件
        let t1w = fs::read_to_string(opts.output_dir.join("missing_t1w.tsv")).unwrap();
        assert_eq!(t1w.lines().count(), 1);
        assert!(!opts.output_dir.join("dropped_filter_short_duration.tsv").exists());
    }

    #[test]
    fn test_missing_input() {
        let dir = TempDir::new().unwrap();
        let opts = options(dir.path(), dir.path().join("nope.csv"));
        assert!(run(&opts, QcConfig::default()).is_err());
    }
}
