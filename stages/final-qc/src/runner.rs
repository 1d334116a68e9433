//! 各子命令的实际运行函数.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use qc_berry::data::Delimiter;
use qc_berry::dataset::fmriprep::{self, Failure, FailureScan};
use qc_berry::dataset::probe::StructuralProbe;
use qc_berry::prelude::*;

/// 头动汇总文件名.
pub const MOTION_SUMMARY: &str = "motion_summary.tsv";
/// 头动时间序列文件名.
pub const MOTION_TIMESERIES: &str = "motion_timeseries.tsv";
/// 纳入的 session.
pub const INCLUDED: &str = "included_sessions.tsv";
/// 排除的 session.
pub const EXCLUDED: &str = "excluded_sessions.tsv";

/// 汇总 `root` 下的全部 confounds 文件.
pub fn motion(root: &Path, output_dir: &Path, config: &QcConfig) -> anyhow::Result<MotionBatch> {
    fs::create_dir_all(output_dir).with_context(|| format!("cannot create {}", output_dir.display()))?;

    let batch = MotionBatch::from_derivatives(root, &config.motion)?;
    log::info!(
        "Processed {} confounds files, skipped {}",
        batch.scans.len(),
        batch.skipped.len()
    );

    let summary = output_dir.join(MOTION_SUMMARY);
    let timeseries = output_dir.join(MOTION_TIMESERIES);
    batch.summary_table().save(&summary, Delimiter::Tab)?;
    batch.timeseries_table().save(&timeseries, Delimiter::Tab)?;

    let mut out = io::stdout().lock();
    writeln!(out, "Wrote motion summary to: {}", summary.display())?;
    writeln!(out, "Wrote motion timeseries to: {}", timeseries.display())?;
    Ok(batch)
}

/// 提取 `root` 下每个被试的 Euler 数, 写入 `output_tsv`.
pub fn euler(root: &Path, output_tsv: &Path, config: &QcConfig) -> anyhow::Result<EulerExtraction> {
    let ext = extract_tree(root, &config.euler)?;
    if let Some(d) = output_tsv.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(d)?;
    }
    ext.to_table().save(output_tsv, Delimiter::Tab)?;

    let mut out = io::stdout().lock();
    if !ext.missing.is_empty() {
        writeln!(out, "QC failed for {} subjects:", ext.missing.len())?;
        for name in ext.missing.iter() {
            writeln!(out, "    {name}")?;
        }
        utils::sep_to(&mut out)?;
    }
    writeln!(
        out,
        "Wrote Euler summary for {} rows to {}",
        ext.records.len(),
        output_tsv.display()
    )?;
    Ok(ext)
}

/// `finalize` 的输入文件.
#[derive(Clone, Debug)]
pub struct FinalizeInputs {
    pub motion: PathBuf,
    pub euler: PathBuf,
    pub iqm: Option<PathBuf>,
}

/// 合并头动, Euler 与 IQM, 写出纳入与排除表.
///
/// IQM 路径不存在时视为没有 IQM 排除.
pub fn finalize(inputs: &FinalizeInputs, output_dir: &Path, config: &QcConfig) -> anyhow::Result<InclusionDecision> {
    for p in [&inputs.motion, &inputs.euler] {
        if !p.is_file() {
            bail!("input table does not exist: {}", p.display());
        }
    }
    let motion = RawTable::open_with(&inputs.motion, Delimiter::Tab)?;
    let euler = RawTable::open_with(&inputs.euler, Delimiter::Tab)?;
    let iqm = match inputs.iqm.as_deref() {
        Some(p) if p.is_file() => Some(RawTable::open(p)?),
        Some(p) => {
            log::info!("IQM outliers file {} not found, skipping", p.display());
            None
        }
        None => None,
    };

    let d = qc_berry::inclusion::finalize(
        &motion,
        &euler,
        iqm.as_ref(),
        config.euler.outlier_threshold,
        &config.inclusion,
    )?;

    fs::create_dir_all(output_dir).with_context(|| format!("cannot create {}", output_dir.display()))?;
    let included = output_dir.join(INCLUDED);
    let excluded = output_dir.join(EXCLUDED);
    d.included.save(&included, Delimiter::Tab)?;
    d.excluded.save(&excluded, Delimiter::Tab)?;

    let mut out = io::stdout().lock();
    writeln!(out, "{} subjects removed based on sitewise Euler.", d.euler_removed)?;
    writeln!(out, "Wrote {} included rows to {}", d.included.len(), included.display())?;
    writeln!(out, "Wrote {} excluded rows to {}", d.excluded.len(), excluded.display())?;
    Ok(d)
}

/// 归类 fMRIPrep 日志与 crashfile 中的失败, 写入 `output_tsv`.
pub fn errors(scan: &FailureScan, output_tsv: &Path) -> anyhow::Result<Vec<Failure>> {
    if scan.logs.is_empty() && scan.crashes.is_empty() {
        bail!("nothing to scan: pass --logs or --crashes");
    }
    let rows = scan.run();
    if let Some(d) = output_tsv.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(d)?;
    }
    fmriprep::failures_table(&rows).save(output_tsv, Delimiter::Tab)?;

    let mut out = io::stdout().lock();
    writeln!(out, "Wrote {} rows to {}", rows.len(), output_tsv.display())?;
    let counts = fmriprep::category_counts(&rows);
    if counts.is_empty() {
        writeln!(out, "No errors classified.")?;
    } else {
        utils::sep_to(&mut out)?;
        writeln!(out, "Summary by category:")?;
        for (category, n) in counts.iter() {
            writeln!(out, "{n:>4}  {category}")?;
        }
    }
    Ok(rows)
}

/// 打印一个 session 目录的结构像 header.
pub fn probe(session_dir: &Path, modality: &str) -> anyhow::Result<()> {
    if !session_dir.is_dir() {
        bail!("session directory does not exist: {}", session_dir.display());
    }
    let r = StructuralProbe::default().probe(session_dir, modality);

    let mut out = io::stdout().lock();
    writeln!(out, "exists: {}", r.exists())?;
    if let Some(p) = r.path.as_deref() {
        writeln!(out, "path: {}", p.display())?;
    }
    if let Some(h) = r.header.as_ref() {
        let [d1, d2, d3] = h.shape();
        let [p1, p2, p3] = h.spacing();
        writeln!(out, "dim1..3: {d1} {d2} {d3}")?;
        writeln!(out, "pixdim1..3: {p1} {p2} {p3}")?;
        writeln!(out, "nifti_dim: {}", h.dim_text())?;
        writeln!(out, "nifti_pixdim: {}", h.pixdim_text())?;
    }
    Ok(())
}
