//! fMRIPrep 失败归类.
//!
//! 扫描 Slurm 日志与 fMRIPrep crashfile, 按已知错误模式归类, 并在给出 BIDS 根目录时
//! 检查对应被试/session 在磁盘上是否真的有 BOLD 影像.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use regex::{Regex, RegexBuilder};
use walkdir::WalkDir;

use crate::data::RawTable;

/// 作为日志读取的文件扩展名.
pub const LOG_EXTS: [&str; 4] = ["out", "err", "log", "txt"];

/// 日志只读末尾这么多字节.
pub const LOG_TAIL_BYTES: usize = 40_000;
/// crashfile 只读末尾这么多字节.
pub const CRASH_TAIL_BYTES: usize = 60_000;

/// 明细最多保留的字符数.
const DETAIL_LEN: usize = 240;

/// 日志中报告找不到 BOLD 的类别.
pub const NO_BOLD_IN_LOG: &str = "Inputs: no BOLD detected (log)";
/// 所有模式都不匹配, 但有疑似错误行.
pub const UNCLASSIFIED: &str = "Unclassified error";
/// 什么也没有识别出来.
pub const UNKNOWN: &str = "Unknown";
/// crashfile 只记录了节点名.
pub const NODE_CRASH: &str = "Nipype node crash";

/// 已知错误模式: `(正则, 类别, 说明)`. 按顺序取第一个匹配.
const PATTERNS: [(&str, &str, &str); 19] = [
    (
        r"argument --session-label: expected at least one argument",
        "CLI: missing --session-label value",
        "Passed --session-label with no value. Remove it or supply a session.",
    ),
    (
        r"command not found.*--skip[-_]?bids[-_]?validation",
        "CLI: flag typo / line continuation broke",
        "Use --skip-bids-validation and check line continuations.",
    ),
    (
        r"RuntimeError: a valid license file is required for FreeSurfer",
        "FreeSurfer: license missing/invalid",
        "Bind a valid FS license to /opt/freesurfer/license.txt.",
    ),
    (
        r"No such file or directory: '.*/opt/freesurfer/license\.txt'",
        "FreeSurfer: license path not bound",
        "Bind the FS license path and pass --fs-license-file.",
    ),
    (
        r"MemoryError|Cannot allocate memory|killed process.*out of memory|killed\s+.*mem",
        "Resources: Out of memory",
        "Increase --mem or --cpus-per-task.",
    ),
    (
        r"TIME LIMIT",
        "Resources: Walltime exceeded",
        "Increase --time or split sessions.",
    ),
    (
        r"Permission denied",
        "I/O: Permission denied",
        "Fix write permissions on output and work directories.",
    ),
    (
        r"Read-only file system",
        "I/O: Read-only filesystem",
        "Do not bind outputs as read-only.",
    ),
    (
        r"ValueError: .*BIDS root.*does not exist",
        "BIDS: root missing",
        "Check the mounted BIDS path.",
    ),
    (
        r"BIDS root file structure is invalid|BIDS validation .* failed",
        "BIDS: invalid structure",
        "Run the BIDS validator and fix metadata.",
    ),
    (
        r"PhaseEncodingDirection.*not found|No fieldmaps found; SDC disabled",
        "BIDS: missing PEdir/fieldmaps",
        "Add PhaseEncodingDirection or use --use-syn-sdc.",
    ),
    (
        r"SliceTiming.*missing|slicetiming .* will be ignored",
        "BIDS: slice timing missing/invalid",
        "Consider --ignore slicetiming.",
    ),
    (
        r"No functional( scans)? were found for the participant|No BOLD files found|Selected data .* yielded no BOLD",
        NO_BOLD_IN_LOG,
        "fMRIPrep did not find BOLD based on selection/filtering.",
    ),
    (
        r"TemplateFlow.*(Error|not found|Could not fetch template|Dataset could not be found)",
        "TemplateFlow cache/bind issue",
        "Bind the TemplateFlow cache.",
    ),
    (
        r"antsRegistration.*Command failed|ANTs\) Exception",
        "ANTs: registration failed",
        "Often out of memory or bad inputs.",
    ),
    (
        r"segmentation fault|core dumped",
        "Crash: segmentation fault",
        "Check earlier errors and memory.",
    ),
    (
        r"Node .* failed|Crash file written to|Traceback \(most recent call last\):",
        NODE_CRASH,
        "Inspect the crashfile for node name and traceback.",
    ),
    (
        r"FileNotFoundError: .*bold.*",
        "Inputs: bold file missing",
        "Filter selected no BOLD; check --bids-filter-file.",
    ),
    (
        r"json.decoder.JSONDecodeError|Expecting property name enclosed in double quotes",
        "BIDS filter JSON invalid",
        "Fix the malformed --bids-filter-file JSON.",
    ),
];

fn case_insensitive(p: &str) -> Regex {
    RegexBuilder::new(p).case_insensitive(true).build().unwrap()
}

static COMPILED: Lazy<Vec<(Regex, &'static str, &'static str)>> = Lazy::new(|| {
    PATTERNS
        .iter()
        .map(|&(p, category, note)| (case_insensitive(p), category, note))
        .collect()
});

static ERROR_LINE: Lazy<Regex> =
    Lazy::new(|| case_insensitive(r"error|failed|exception|Traceback|not found|No such file"));
static SUBJECT: Lazy<Regex> = Lazy::new(|| Regex::new(r"\bsub-[A-Za-z0-9]+").unwrap());
static SESSION: Lazy<Regex> = Lazy::new(|| Regex::new(r"\bses-[A-Za-z0-9]+").unwrap());
static VISIT: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b(M\d{3})\b").unwrap());
static NODE: Lazy<Regex> = Lazy::new(|| Regex::new(r"Node: ([^\n]+)").unwrap());

#[inline]
fn clip(line: &str) -> String {
    line.trim().chars().take(DETAIL_LEN).collect()
}

/// 归类一段文本. 返回 `(类别, 明细)`.
///
/// 明细为第一条命中行 (截断到 240 个字符). 只有跨行才能命中时给出模式说明.
/// 没有模式命中时, 退而寻找疑似错误行并归为 [`UNCLASSIFIED`]; 仍然没有则为 [`UNKNOWN`].
pub fn classify(text: &str) -> (&'static str, String) {
    for (rx, category, note) in COMPILED.iter() {
        if !rx.is_match(text) {
            continue;
        }
        let detail = text
            .lines()
            .find(|l| rx.is_match(l))
            .map_or_else(|| note.to_string(), clip);
        return (*category, detail);
    }
    match text.lines().find(|l| ERROR_LINE.is_match(l)) {
        Some(l) => (UNCLASSIFIED, clip(l)),
        None => (UNKNOWN, String::new()),
    }
}

/// 从文本中猜测被试与 session.
///
/// 没有 `ses-*` 时, 形如 `M012` 的访视代码也视为 session.
pub fn guess_subject_session(text: &str) -> (Option<String>, Option<String>) {
    let sub = SUBJECT.find(text).map(|m| m.as_str().to_string());
    let ses = SESSION
        .find(text)
        .map(|m| m.as_str().to_string())
        .or_else(|| VISIT.captures(text).map(|c| format!("ses-{}", &c[1])));
    (sub, ses)
}

/// 命令中是否带有 session 筛选.
pub fn saw_session_filter(text: &str) -> bool {
    text.contains("--session-label") || (text.contains("\"session\"") && text.contains("bids-filter-file"))
}

/// BOLD 在磁盘上的缺失情况.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum BoldStatus {
    /// 被试的所有 session 都没有 BOLD.
    SubjectHasNone,
    /// 该 session 没有 BOLD, 但其他 session 有.
    SessionHasNone,
}

impl BoldStatus {
    /// `(类别, 明细)`.
    pub fn describe(self) -> (&'static str, &'static str) {
        match self {
            Self::SubjectHasNone => (
                "Inputs: no BOLD for subject",
                "Subject has no usable BOLD images across all sessions (filesystem check)",
            ),
            Self::SessionHasNone => (
                "Inputs: session has no BOLD",
                "This session directory exists but contains no BOLD images (filesystem check)",
            ),
        }
    }
}

#[inline]
fn is_bold(p: &Path) -> bool {
    p.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.ends_with("bold.nii.gz"))
}

/// `{subject_dir}/ses-*/func/*bold.nii.gz` 是否存在.
pub fn subject_has_bold(subject_dir: &Path) -> bool {
    WalkDir::new(subject_dir)
        .min_depth(3)
        .max_depth(3)
        .into_iter()
        .filter_map(|e| e.ok())
        .any(|e| {
            let p = e.path();
            let func = p.parent();
            let ses = func.and_then(Path::parent);
            is_bold(p)
                && func.is_some_and(|d| d.file_name().is_some_and(|n| n == "func"))
                && ses
                    .and_then(|d| d.file_name())
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.starts_with("ses-"))
        })
}

fn dir_has_bold(func_dir: &Path) -> bool {
    fs::read_dir(func_dir)
        .map(|it| it.filter_map(|e| e.ok()).any(|e| is_bold(&e.path())))
        .unwrap_or(false)
}

/// 检查 BOLD 在磁盘上是否存在. 被试目录不存在, 或 BOLD 存在时返回 `None`.
pub fn bold_status(bids_root: &Path, subject: &str, session: Option<&str>) -> Option<BoldStatus> {
    let subject_dir = bids_root.join(subject);
    if !subject_dir.is_dir() {
        return None;
    }
    let missing = || {
        Some(if subject_has_bold(&subject_dir) {
            BoldStatus::SessionHasNone
        } else {
            BoldStatus::SubjectHasNone
        })
    };
    match session {
        Some(ses) => {
            let label = ses.strip_prefix("ses-").unwrap_or(ses);
            let func = subject_dir.join(format!("ses-{label}")).join("func");
            if dir_has_bold(&func) {
                None
            } else {
                missing()
            }
        }
        None if subject_has_bold(&subject_dir) => None,
        None => Some(BoldStatus::SubjectHasNone),
    }
}

/// 失败记录的来源.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum FailureSource {
    /// Slurm 日志.
    Log,
    /// fMRIPrep crashfile.
    Crashfile,
}

impl fmt::Display for FailureSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Log => "log",
            Self::Crashfile => "crashfile",
        })
    }
}

/// 一条失败记录.
#[derive(Clone, Debug, PartialEq)]
pub struct Failure {
    /// 来源.
    pub source: FailureSource,
    /// 来源文件.
    pub file: PathBuf,
    /// `sub-*`.
    pub subject: Option<String>,
    /// `ses-*`.
    pub session: Option<String>,
    /// 失败类别.
    pub category: String,
    /// 命中行或说明.
    pub detail: String,
}

/// 扫描的输入位置.
#[derive(Clone, Debug, Default)]
pub struct FailureScan {
    /// 日志文件或目录.
    pub logs: Vec<PathBuf>,
    /// crashfile 或 derivatives 根目录.
    pub crashes: Vec<PathBuf>,
    /// 用于 BOLD 检查的 BIDS 根目录.
    pub bids: Option<PathBuf>,
}

fn has_log_ext(p: &Path) -> bool {
    p.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| LOG_EXTS.contains(&e.to_lowercase().as_str()))
}

/// `.../sub-*/log/*crash*.{txt,tsv}`.
fn is_crashfile(p: &Path) -> bool {
    let name = p.file_name().and_then(|n| n.to_str()).unwrap_or_default();
    let log_dir = p.parent();
    let subject_dir = log_dir.and_then(Path::parent);
    name.contains("crash")
        && (name.ends_with(".txt") || name.ends_with(".tsv"))
        && log_dir.is_some_and(|d| d.file_name().is_some_and(|n| n == "log"))
        && subject_dir
            .and_then(|d| d.file_name())
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.starts_with("sub-"))
}

fn collect(bases: &[PathBuf], file_ok: fn(&Path) -> bool, walk_ok: fn(&Path) -> bool) -> BTreeSet<PathBuf> {
    let mut ans = BTreeSet::new();
    for base in bases.iter() {
        if base.is_file() {
            if file_ok(base) {
                ans.insert(base.clone());
            }
        } else if base.is_dir() {
            ans.extend(
                WalkDir::new(base)
                    .into_iter()
                    .filter_map(|e| e.ok())
                    .filter(|e| e.file_type().is_file() && walk_ok(e.path()))
                    .map(|e| e.into_path()),
            );
        } else {
            log::warn!("{} does not exist, skipping", base.display());
        }
    }
    ans
}

/// 读取文件末尾 `n` 字节. 读取失败时返回空串.
fn read_tail(p: &Path, n: usize) -> String {
    match fs::read(p) {
        Ok(bytes) => String::from_utf8_lossy(&bytes[bytes.len().saturating_sub(n)..]).into_owned(),
        Err(e) => {
            log::warn!("cannot read {}: {e}", p.display());
            String::new()
        }
    }
}

impl FailureScan {
    /// 归类全部日志与 crashfile.
    ///
    /// 每个文件可能产生多条记录: 磁盘 BOLD 检查一条, "其他 session 有 BOLD 但被筛掉" 一条,
    /// 以及文本归类本身一条. 日志归为 [`UNKNOWN`] 时不产生文本归类记录, crashfile 总会产生.
    pub fn run(&self) -> Vec<Failure> {
        let bids = match self.bids.as_deref() {
            Some(p) if !p.is_dir() => {
                log::warn!("BIDS root does not exist: {}, skipping BOLD checks", p.display());
                None
            }
            other => other,
        };

        let mut ans = Vec::new();
        let logs = collect(&self.logs, has_log_ext, has_log_ext);
        for p in logs.iter() {
            let text = read_tail(p, LOG_TAIL_BYTES);
            scan_one(FailureSource::Log, p, &text, bids, &mut ans);
        }
        let crashes = collect(&self.crashes, |_| true, is_crashfile);
        for p in crashes.iter() {
            let text = read_tail(p, CRASH_TAIL_BYTES);
            scan_one(FailureSource::Crashfile, p, &text, bids, &mut ans);
        }
        log::debug!(
            "Classified {} log files and {} crashfiles into {} rows",
            logs.len(),
            crashes.len(),
            ans.len()
        );
        ans
    }
}

fn scan_one(source: FailureSource, p: &Path, text: &str, bids: Option<&Path>, out: &mut Vec<Failure>) {
    let file_name = p.file_name().and_then(|n| n.to_str()).unwrap_or_default();
    let (subject, session) = guess_subject_session(&format!("{text} {file_name}"));
    let (mut category, mut detail) = classify(text);

    let row = |category: &str, detail: String| Failure {
        source,
        file: p.to_owned(),
        subject: subject.clone(),
        session: session.clone(),
        category: category.to_string(),
        detail,
    };

    if let (Some(root), Some(sub)) = (bids, subject.as_deref()) {
        if let Some(status) = bold_status(root, sub, session.as_deref()) {
            let (c, d) = status.describe();
            out.push(row(c, d.to_string()));
        }
        let filtered = match source {
            FailureSource::Log => saw_session_filter(text),
            FailureSource::Crashfile => true,
        };
        if category == NO_BOLD_IN_LOG && filtered && subject_has_bold(&root.join(sub)) {
            out.push(row(
                "Inputs: BOLD exists in other sessions (filtered out)",
                format!("{source} says no BOLD, but BOLD exists in other sessions; selection likely excluded them."),
            ));
        }
    }

    match source {
        FailureSource::Log if category == UNKNOWN => {}
        FailureSource::Log => out.push(row(category, detail)),
        FailureSource::Crashfile => {
            if category == UNKNOWN {
                if let Some(c) = NODE.captures(text) {
                    category = NODE_CRASH;
                    detail = format!("Node: {}", c[1].trim());
                }
            }
            if detail.is_empty() {
                detail = "see crashfile".to_string();
            }
            out.push(row(category, detail));
        }
    }
}

/// 输出表的列.
pub const REPORT_COLUMNS: [&str; 6] = ["source", "file", "subject", "session", "category", "detail"];

/// 转换为表.
pub fn failures_table(rows: &[Failure]) -> RawTable {
    RawTable::new(
        "fmriprep_errors",
        REPORT_COLUMNS.iter().map(|c| c.to_string()).collect(),
        rows.iter()
            .map(|r| {
                vec![
                    r.source.to_string(),
                    r.file.display().to_string(),
                    r.subject.clone().unwrap_or_default(),
                    r.session.clone().unwrap_or_default(),
                    r.category.clone(),
                    r.detail.clone(),
                ]
            })
            .collect(),
    )
}

/// 按类别计数, 按次数降序、类别名升序排列.
pub fn category_counts(rows: &[Failure]) -> Vec<(String, usize)> {
    let mut m: BTreeMap<&str, usize> = BTreeMap::new();
    for r in rows.iter() {
        *m.entry(r.category.as_str()).or_default() += 1;
    }
    let mut ans: Vec<(String, usize)> = m.into_iter().map(|(k, v)| (k.to_string(), v)).collect();
    ans.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    ans
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(root: &Path, rel: &str, text: &str) -> PathBuf {
        let p = root.join(rel);
        fs::create_dir_all(p.parent().unwrap()).unwrap();
        fs::write(&p, text).unwrap();
        p
    }

    #[test]
    fn test_classify() {
        let (c, d) = classify("start\nslurmstepd: error: *** JOB 1 CANCELLED DUE TO TIME LIMIT ***\n");
        assert_eq!(c, "Resources: Walltime exceeded");
        assert!(d.starts_with("slurmstepd"));

        // 大小写不敏感, 取第一个匹配的模式
        let (c, _) = classify("permission DENIED\nTraceback (most recent call last):\n");
        assert_eq!(c, "I/O: Permission denied");

        let long = format!("oops: something failed {}", "x".repeat(400));
        let (c, d) = classify(&long);
        assert_eq!(c, UNCLASSIFIED);
        assert_eq!(d.chars().count(), 240);

        assert_eq!(classify("all good\n"), (UNKNOWN, String::new()));
    }

    #[test]
    fn test_guess_subject_session() {
        assert_eq!(
            guess_subject_session("sub-ADNI002S0413 ses-M012 done"),
            (Some("sub-ADNI002S0413".into()), Some("ses-M012".into()))
        );
        assert_eq!(
            guess_subject_session("job sub-01 visit M024"),
            (Some("sub-01".into()), Some("ses-M024".into()))
        );
        assert_eq!(guess_subject_session("nothing"), (None, None));
    }

    #[test]
    fn test_bold_status() {
        let dir = tempfile::tempdir().unwrap();
        let bids = dir.path();
        write(bids, "sub-01/ses-M000/func/sub-01_ses-M000_task-rest_bold.nii.gz", "");
        write(bids, "sub-01/ses-M012/anat/sub-01_ses-M012_T1w.nii.gz", "");
        write(bids, "sub-02/ses-M000/anat/sub-02_ses-M000_T1w.nii.gz", "");

        assert_eq!(bold_status(bids, "sub-01", Some("ses-M000")), None);
        assert_eq!(bold_status(bids, "sub-01", Some("M012")), Some(BoldStatus::SessionHasNone));
        assert_eq!(bold_status(bids, "sub-01", None), None);
        assert_eq!(bold_status(bids, "sub-02", Some("ses-M000")), Some(BoldStatus::SubjectHasNone));
        assert_eq!(bold_status(bids, "sub-02", None), Some(BoldStatus::SubjectHasNone));
        assert_eq!(bold_status(bids, "sub-03", None), None);
    }

    #[test]
    fn test_scan_logs_and_crashfiles() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        let bids = root.join("bids");
        write(&bids, "sub-01/ses-M000/func/sub-01_ses-M000_task-rest_bold.nii.gz", "");
        write(&bids, "sub-01/ses-M012/anat/sub-01_ses-M012_T1w.nii.gz", "");

        write(root, "logs/fmriprep_1.out", "sub-02 ses-M000\nMemoryError\n");
        write(
            root,
            "logs/fmriprep_2.err",
            "fmriprep --session-label M012 sub-01\nNo BOLD files found\n",
        );
        write(root, "logs/clean.log", "sub-03 finished\n");
        write(root, "logs/notes.md", "Permission denied\n");
        write(
            root,
            "deriv/sub-04/log/20240101/crash-node.txt",
            "ignored: not directly under log/\n",
        );
        write(
            root,
            "deriv/sub-04/log/crash-20240101-bold.txt",
            "Node: func_preproc_wf.bold_std\nWorking directory: /work/sub-04/bold_std\n",
        );
        write(root, "deriv/sub-04/figures/crash-x.txt", "Node: x\n");

        let scan = FailureScan {
            logs: vec![root.join("logs")],
            crashes: vec![root.join("deriv")],
            bids: Some(bids),
        };
        let rows = scan.run();
        let view: Vec<(FailureSource, &str, &str, &str)> = rows
            .iter()
            .map(|r| {
                (
                    r.source,
                    r.subject.as_deref().unwrap_or_default(),
                    r.session.as_deref().unwrap_or_default(),
                    r.category.as_str(),
                )
            })
            .collect();
        assert_eq!(
            view,
            [
                (FailureSource::Log, "sub-02", "ses-M000", "Resources: Out of memory"),
                (FailureSource::Log, "sub-01", "ses-M012", "Inputs: session has no BOLD"),
                (
                    FailureSource::Log,
                    "sub-01",
                    "ses-M012",
                    "Inputs: BOLD exists in other sessions (filtered out)"
                ),
                (FailureSource::Log, "sub-01", "ses-M012", NO_BOLD_IN_LOG),
                (FailureSource::Crashfile, "sub-04", "", NODE_CRASH),
            ]
        );
        assert_eq!(rows[4].detail, "Node: func_preproc_wf.bold_std");

        let t = failures_table(&rows);
        assert_eq!(t.headers(), REPORT_COLUMNS);
        assert_eq!(t.len(), 5);
        let counts = category_counts(&rows);
        assert_eq!(counts.len(), 5);
        assert_eq!(counts[0].0, "Inputs: BOLD exists in other sessions (filtered out)");
        assert_eq!(counts[1], (NO_BOLD_IN_LOG.to_string(), 1));
    }

    #[test]
    fn test_missing_bids_root_skips_bold_checks() {
        let dir = tempfile::tempdir().unwrap();
        let log = write(dir.path(), "job.out", "sub-01 ses-M000\nNo BOLD files found\n");
        let scan = FailureScan {
            logs: vec![log],
            crashes: vec![],
            bids: Some(dir.path().join("no-bids")),
        };
        let rows = scan.run();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].category, NO_BOLD_IN_LOG);
        assert_eq!(rows[0].detail, "No BOLD files found");
    }
}
