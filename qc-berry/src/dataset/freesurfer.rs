//! FreeSurfer `recon-all.log` 中 Euler 数的提取.
//!
//! `recon-all` 在拓扑修复前会输出形如
//! `orig.nofix lheno =  -38, rheno =  -52` 的一行, 这里取最后一次出现的值.
//! 日志缺失或没有这一行时, 对 `surf/{lh,rh}.orig.nofix` 运行 `mris_euler_number` 重新计算.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use walkdir::WalkDir;

use crate::config::EulerConfig;
use crate::data::{fmt_f64, RawTable};
use crate::error::{QcError, QcResult};

/// `recon-all.log` 中 Euler 数所在行的标记.
pub const EULER_MARKER: &str = "orig.nofix lheno";

/// Euler 汇总表的列.
pub const EULER_COLUMNS: [&str; 7] = ["fs_subject", "sub", "ses", "site", "lh_en", "rh_en", "avg_en"];

/// 解析日志文本, 返回 `(lh, rh)`. 找不到标记行或解析失败时返回 `None`.
pub fn parse_recon_log(text: &str) -> Option<(f64, f64)> {
    let line = text.lines().filter(|l| l.contains(EULER_MARKER)).last()?;
    let parts: Vec<&str> = line.split_whitespace().collect();
    let lh = parts.get(3)?.trim_end_matches(',').parse().ok()?;
    let rh = parts.get(6)?.parse().ok()?;
    Some((lh, rh))
}

/// `mris_euler_number` 输出首行中 Euler 数所在的 token 下标.
const MRIS_EULER_TOKEN: usize = 12;

/// 解析 `mris_euler_number` 的输出. Euler 数是首行第 13 个 token, 如
/// `euler # = v-e+f = 2g+2: 163994 - 491976 + 327984 = 2 --> 0 holes` 中的 `2`.
pub fn parse_mris_output(text: &str) -> Option<f64> {
    text.lines()
        .next()?
        .split_whitespace()
        .nth(MRIS_EULER_TOKEN)?
        .parse()
        .ok()
}

fn run_mris_euler_number(program: &str, surf: &Path) -> Result<f64, String> {
    let out = Command::new(program)
        .arg(surf)
        .output()
        .map_err(|e| format!("cannot run {program}: {e}"))?;
    if !out.status.success() {
        return Err(format!("{program} {} exited with {}", surf.display(), out.status));
    }
    let mut text = String::from_utf8_lossy(&out.stdout).into_owned();
    text.push_str(&String::from_utf8_lossy(&out.stderr));
    parse_mris_output(&text).ok_or_else(|| format!("unexpected {program} output for {}", surf.display()))
}

/// 对 `subject_dir/surf/{lh,rh}.orig.nofix` 分别运行 `program`, 返回 `(lh, rh)`.
///
/// 表面文件缺失、程序无法启动、退出码非零或输出无法解析时返回原因.
pub fn euler_from_surfaces(subject_dir: &Path, program: &str) -> Result<(f64, f64), String> {
    let surf = subject_dir.join("surf");
    let [lh, rh] = ["lh.orig.nofix", "rh.orig.nofix"].map(|n| surf.join(n));
    if !(lh.is_file() && rh.is_file()) {
        return Err(format!("no orig.nofix surfaces under {}", surf.display()));
    }
    Ok((
        run_mris_euler_number(program, &lh)?,
        run_mris_euler_number(program, &rh)?,
    ))
}

/// 从 FreeSurfer 被试名 (如 `sub-ADNI941S7074_ses-M000`) 解析 `(sub, ses)`.
///
/// 不含 `sub-` 实体时, 整个名字作为 `sub`.
pub fn parse_fs_subject(name: &str) -> (String, Option<String>) {
    let mut sub = None;
    let mut ses = None;
    for p in name.split('_') {
        if p.starts_with("sub-") {
            sub = Some(p.to_string());
        } else if p.starts_with("ses-") {
            ses = Some(p.to_string());
        }
    }
    (sub.unwrap_or_else(|| name.to_string()), ses)
}

/// 由被试 ID 推导站点代码: 去掉全部 `prefix` 后取前 `len` 个字符.
///
/// 如 `sub-ADNI941S7074` -> `941`.
pub fn site_code(sub: &str, prefix: &str, len: usize) -> String {
    let stripped = if prefix.is_empty() {
        sub.to_string()
    } else {
        sub.replace(prefix, "")
    };
    stripped.chars().take(len).collect()
}

/// 一个 FreeSurfer 被试的 Euler 数.
#[derive(Clone, Debug, PartialEq)]
pub struct EulerRecord {
    /// FreeSurfer 被试名 (目录名).
    pub fs_subject: String,
    /// `sub-*`.
    pub sub: String,
    /// `ses-*`, 可能缺失.
    pub ses: Option<String>,
    /// 站点代码.
    pub site: String,
    /// 左半球 Euler 数.
    pub lh_en: f64,
    /// 右半球 Euler 数.
    pub rh_en: f64,
    /// 两半球平均值.
    pub avg_en: f64,
}

/// 整棵目录树的提取结果.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct EulerExtraction {
    /// 成功提取的被试, 按被试名排序.
    pub records: Vec<EulerRecord>,
    /// 日志与 `mris_euler_number` 都拿不到 Euler 数的被试名.
    pub missing: Vec<String>,
}

impl EulerExtraction {
    /// 转为 `euler_summary.tsv` 格式的表.
    pub fn to_table(&self) -> RawTable {
        let rows = self
            .records
            .iter()
            .map(|r| {
                vec![
                    r.fs_subject.clone(),
                    r.sub.clone(),
                    r.ses.clone().unwrap_or_default(),
                    r.site.clone(),
                    fmt_f64(Some(r.lh_en)),
                    fmt_f64(Some(r.rh_en)),
                    fmt_f64(Some(r.avg_en)),
                ]
            })
            .collect();
        RawTable::new(
            "euler summary",
            EULER_COLUMNS.iter().map(|s| s.to_string()).collect(),
            rows,
        )
    }
}

/// 收集 `root` 下所有 `<fs_subject>/scripts/recon-all.log` 对应的被试目录.
///
/// 一个日志都没有时, `root` 下的每个子目录都视为被试.
fn collect_subjects(root: &Path) -> QcResult<BTreeMap<String, PathBuf>> {
    let mut ans = BTreeMap::new();
    for entry in WalkDir::new(root).into_iter().filter_map(|e| e.ok()) {
        let p = entry.path();
        if entry.file_type().is_file()
            && p.file_name().is_some_and(|n| n == "recon-all.log")
            && p.parent()
                .and_then(|s| s.file_name())
                .is_some_and(|n| n == "scripts")
        {
            if let Some(dir) = p.parent().and_then(Path::parent) {
                if let Some(name) = dir.file_name().and_then(|n| n.to_str()) {
                    ans.insert(name.to_string(), dir.to_owned());
                }
            }
        }
    }

    if ans.is_empty() {
        for entry in fs::read_dir(root)? {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                ans.insert(entry.file_name().to_string_lossy().into_owned(), entry.path());
            }
        }
    }
    Ok(ans)
}

/// 遍历 `SUBJECTS_DIR`, 提取每个被试的 Euler 数.
pub fn extract_tree<P: AsRef<Path>>(root: P, config: &EulerConfig) -> QcResult<EulerExtraction> {
    let root = root.as_ref();
    if !root.is_dir() {
        return Err(QcError::MissingInput(root.to_owned()));
    }

    let mut ans = EulerExtraction::default();
    for (i, (name, dir)) in collect_subjects(root)?.into_iter().enumerate() {
        let log_file = dir.join("scripts").join("recon-all.log");
        let parsed = match fs::read(&log_file) {
            Ok(bytes) => {
                let parsed = parse_recon_log(&String::from_utf8_lossy(&bytes));
                if parsed.is_none() {
                    log::warn!("{i}: {name} log parse failed, trying {}", config.mris_euler_number);
                }
                parsed
            }
            Err(_) => {
                log::warn!("{i}: {name} missing log, trying {}", config.mris_euler_number);
                None
            }
        };
        let parsed = parsed.or_else(|| match euler_from_surfaces(&dir, &config.mris_euler_number) {
            Ok(v) => Some(v),
            Err(reason) => {
                log::warn!("{i}: QC failed for {name}: {reason}");
                None
            }
        });

        match parsed {
            Some((lh_en, rh_en)) => {
                let (sub, ses) = parse_fs_subject(&name);
                let site = site_code(&sub, &config.site_prefix, config.site_len);
                let avg_en = (lh_en + rh_en) / 2.0;
                log::debug!("{i}: {name} processed. avg_en = {avg_en}");
                ans.records.push(EulerRecord {
                    fs_subject: name,
                    sub,
                    ses,
                    site,
                    lh_en,
                    rh_en,
                    avg_en,
                });
            }
            None => ans.missing.push(name),
        }
    }
    Ok(ans)
}
