//! 运行汇总与报告.

use std::fmt;
use std::io::{self, Write};

use crate::consts::MANUFACTURERS;
use crate::data::SessionTable;

/// 单个启发式在累计过滤中的效果.
#[derive(Clone, Debug, PartialEq)]
pub struct DropDetail {
    /// 阶段号.
    pub phase: u32,
    /// 代码名.
    pub heuristic: &'static str,
    /// 可读名.
    pub label: &'static str,
    /// 判定标准.
    pub description: &'static str,
    /// 丢弃行数.
    pub dropped: usize,
    /// 执行后剩余行数.
    pub remaining: usize,
}

/// 一次运行的汇总.
#[derive(Clone, Debug, PartialEq)]
pub struct PhaseSummary {
    /// 初始 session 数.
    pub initial_count: usize,
    /// 初始被试数.
    pub initial_subjects: usize,
    /// 最终保留的 session 数.
    pub final_kept: usize,
    /// 最终保留的被试数.
    pub final_subjects: usize,
    /// 丢弃总数.
    pub total_dropped: usize,
    /// 按执行顺序排列的各启发式效果.
    pub drop_details: Vec<DropDetail>,
}

impl PhaseSummary {
    /// 以 markdown 表格的形式写出.
    pub fn write_markdown<W: Write>(&self, w: &mut W) -> io::Result<()> {
        writeln!(w, "# Session QC summary")?;
        writeln!(w)?;
        writeln!(
            w,
            "Initial: {} sessions from {} subjects.",
            self.initial_count, self.initial_subjects
        )?;
        writeln!(w)?;
        writeln!(w, "| Phase | Heuristic | Criteria | Dropped | Remaining |")?;
        writeln!(w, "|---:|---|---|---:|---:|")?;
        for d in self.drop_details.iter() {
            writeln!(
                w,
                "| {} | {} | {} | {} | {} |",
                d.phase,
                d.label,
                d.description.replace('|', "\\|"),
                d.dropped,
                d.remaining
            )?;
        }
        writeln!(w, "| | **TOTAL** | | {} | {} |", self.total_dropped, self.final_kept)?;
        writeln!(w)?;
        writeln!(
            w,
            "Final: {} sessions from {} subjects ({} dropped).",
            self.final_kept, self.final_subjects, self.total_dropped
        )?;
        Ok(())
    }
}

/// 某阶段的独立重叠分析结果.
#[derive(Clone, Debug, PartialEq)]
pub struct OverlapReport {
    /// 阶段号.
    pub phase: u32,
    /// 阶段输入行数.
    pub input_count: usize,
    /// 每个启发式单独运行时的丢弃数.
    pub per_heuristic: Vec<(&'static str, usize)>,
    /// 被全部启发式丢弃的行数.
    pub dropped_by_all: usize,
    /// 被任一启发式丢弃的行数.
    pub dropped_by_any: usize,
    /// 该阶段累计执行后实际剩余的行数.
    pub remaining: usize,
}

impl fmt::Display for OverlapReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const S4: &str = "    ";

        writeln!(f, "Overlap analysis for phase {} ({} sessions in):", self.phase, self.input_count)?;
        for (name, n) in self.per_heuristic.iter() {
            writeln!(f, "{S4}{name:<32} would drop {n:>5}")?;
        }
        writeln!(f, "{S4}Dropped by all: {}", self.dropped_by_all)?;
        writeln!(f, "{S4}Dropped by any: {}", self.dropped_by_any)?;
        write!(f, "{S4}Remaining after phase: {}", self.remaining)
    }
}

/// 某厂商的缺失字段计数.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ManufacturerMissing {
    /// 厂商名.
    pub manufacturer: &'static str,
    /// 该厂商的 session 数.
    pub sessions: usize,
    /// 缺少 TR 的 session 数.
    pub repetition_time: usize,
    /// `nifti_dim` 或 `nifti_pixdim` 缺失或不合法的 session 数.
    pub geometry: usize,
    /// 缺少 `PercentPhaseFOV` 的 session 数.
    pub percent_phase_fov: usize,
    /// 缺少线圈名的 session 数.
    pub coil_string: usize,
}

impl ManufacturerMissing {
    /// 统计 `table` 中各主要厂商的缺失字段.
    ///
    /// 厂商名须与 [`MANUFACTURERS`] 完全一致 (区分大小写), `SIEMENS` 或
    /// `Philips Medical Systems` 之类的写法不计入任何厂商.
    pub fn tally(table: &SessionTable) -> Vec<Self> {
        MANUFACTURERS
            .iter()
            .map(|&m| {
                let mut ans = Self {
                    manufacturer: m,
                    ..Default::default()
                };
                for r in table.iter().filter(|r| r.manufacturer.as_deref() == Some(m)) {
                    ans.sessions += 1;
                    ans.repetition_time += !matches!(r.repetition_time, Ok(Some(_))) as usize;
                    ans.geometry += (r.nifti_dim.is_err() || r.nifti_pixdim.is_err()) as usize;
                    ans.percent_phase_fov += !matches!(r.percent_phase_fov, Ok(Some(_))) as usize;
                    ans.coil_string += r.coil_string.is_none() as usize;
                }
                ans
            })
            .collect()
    }
}
