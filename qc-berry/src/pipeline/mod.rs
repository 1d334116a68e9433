//! 分阶段 session 过滤流水线.
//!
//! 流水线持有原始表的不可变快照与一张工作表. 每次 [`SessionFilterPipeline::run`]
//! 都从原始表重新开始, 按阶段号升序依次执行各阶段的启发式, 并记录:
//!
//! 1. 丢弃日志: 每个启发式一条 `(阶段, 启发式名, 被丢弃的行)`;
//! 2. 检查点: 每个阶段结束时工作表的深拷贝;
//! 3. 诊断: 畸形数据行.

use std::collections::BTreeMap;
use std::fmt;

use crate::config::{Field, QcConfig};
use crate::data::{visit, RawTable, SessionTable};
use crate::error::{QcError, QcResult};
use crate::heuristics::{self, Heuristic};

mod summary;

pub use summary::{DropDetail, ManufacturerMissing, OverlapReport, PhaseSummary};

/// 阶段号到该阶段启发式 (按执行顺序) 的映射.
pub type PhaseMap = BTreeMap<u32, Vec<Heuristic>>;

/// 默认阶段划分.
///
/// - 阶段 0: 文件存在性;
/// - 阶段 1: 采集几何与时长;
/// - 阶段 2: 采集质量.
pub fn default_phases() -> PhaseMap {
    use heuristics::*;

    BTreeMap::from([
        (0, vec![KNOWN_BAD_IMAGE, MISSING_DATA, MISSING_T1W]),
        (1, vec![LOW_SCAN_DEPTH, INVALID_REPETITION_TIME, SHORT_DURATION]),
        (2, vec![LOW_PERCENT_PHASE_FOV, BAD_COIL]),
    ])
}

/// 流水线状态.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum State {
    /// 尚未运行.
    Initialized,

    /// 正在执行某阶段.
    Running(u32),

    /// 某阶段已完成, 检查点已保存.
    Complete(u32),

    /// 不超过阶段上限的所有阶段都已执行.
    Done,
}

/// 一条畸形数据行的诊断信息.
#[derive(Clone, Debug, PartialEq)]
pub struct Diagnostic {
    /// 阶段号.
    pub phase: u32,
    /// 启发式代码名.
    pub heuristic: &'static str,
    /// 原始行号.
    pub row: usize,
    /// 被试 ID.
    pub subject_id: String,
    /// 访视代码.
    pub visit_code: String,
    /// 错误描述.
    pub message: String,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "phase {} `{}`: row {} ({}, {}) dropped: {}",
            self.phase, self.heuristic, self.row, self.subject_id, self.visit_code, self.message
        )
    }
}

/// 丢弃日志的一条记录.
#[derive(Clone, Debug, PartialEq)]
pub struct DropEntry {
    /// 阶段号.
    pub phase: u32,
    /// 启发式代码名.
    pub heuristic: &'static str,
    /// 被该启发式丢弃的行 (全部原始列).
    pub rows: SessionTable,
}

impl DropEntry {
    /// 被丢弃行的原始行号.
    #[inline]
    pub fn row_ids(&self) -> Vec<usize> {
        self.rows.row_ids()
    }
}

/// 分阶段 session 过滤流水线.
#[derive(Clone, Debug)]
pub struct SessionFilterPipeline {
    original: SessionTable,
    current: SessionTable,
    phases: PhaseMap,
    config: QcConfig,
    drops: Vec<DropEntry>,
    checkpoints: BTreeMap<u32, SessionTable>,
    diagnostics: Vec<Diagnostic>,
    state: State,
}

impl SessionFilterPipeline {
    /// 使用默认阶段划分构造.
    pub fn new(table: SessionTable, config: QcConfig) -> Self {
        Self {
            current: table.clone(),
            original: table,
            phases: default_phases(),
            config,
            drops: Vec::new(),
            checkpoints: BTreeMap::new(),
            diagnostics: Vec::new(),
            state: State::Initialized,
        }
    }

    /// 使用自定义阶段划分构造. 启发式名在整条流水线中必须唯一.
    pub fn with_phases(table: SessionTable, config: QcConfig, phases: PhaseMap) -> QcResult<Self> {
        let mut seen = Vec::new();
        for h in phases.values().flatten() {
            if seen.contains(&h.name()) {
                return Err(QcError::InvalidConfig(format!(
                    "heuristic `{}` appears more than once in the phase map",
                    h.name()
                )));
            }
            seen.push(h.name());
        }
        let mut ans = Self::new(table, config);
        ans.phases = phases;
        Ok(ans)
    }

    /// 运行阶段号不超过 `phase_limit` 的所有阶段, 返回最终工作表.
    ///
    /// 运行前先检查所有将要执行的启发式所需的列; 缺列时直接返回错误, 不改变任何状态.
    pub fn run(&mut self, phase_limit: u32) -> QcResult<&SessionTable> {
        for h in self.phases.range(..=phase_limit).flat_map(|(_, hs)| hs) {
            self.original.require(h.required(), &self.config.fields)?;
        }

        self.current = self.original.clone();
        self.drops.clear();
        self.checkpoints.clear();
        self.diagnostics.clear();
        self.state = State::Initialized;

        for (&phase, hs) in self.phases.range(..=phase_limit) {
            self.state = State::Running(phase);
            log::info!("Phase {phase}: {} sessions in", self.current.len());

            for h in hs.iter() {
                let mask = h.mask(&self.current, &self.config)?;
                for (pos, err) in mask.faults.iter() {
                    let r = &self.current.records()[*pos];
                    let d = Diagnostic {
                        phase,
                        heuristic: h.name(),
                        row: r.row,
                        subject_id: r.subject_id.clone(),
                        visit_code: r.visit_code.clone(),
                        message: err.to_string(),
                    };
                    log::warn!("{d}");
                    self.diagnostics.push(d);
                }

                let (kept, dropped) = self.current.partition(&mask.keep);
                log::info!(
                    "  {:<32} dropped {:>5}, remaining {:>5}",
                    h.name(),
                    dropped.len(),
                    kept.len()
                );
                self.drops.push(DropEntry {
                    phase,
                    heuristic: h.name(),
                    rows: dropped,
                });
                self.current = kept;
            }

            self.checkpoints.insert(phase, self.current.clone());
            self.state = State::Complete(phase);
        }

        self.state = State::Done;
        Ok(&self.current)
    }

    /// 原始表.
    #[inline]
    pub fn original(&self) -> &SessionTable {
        &self.original
    }

    /// 当前工作表. 运行结束后即最终结果.
    #[inline]
    pub fn final_table(&self) -> &SessionTable {
        &self.current
    }

    /// 阶段划分.
    #[inline]
    pub fn phases(&self) -> &PhaseMap {
        &self.phases
    }

    /// 配置.
    #[inline]
    pub fn config(&self) -> &QcConfig {
        &self.config
    }

    /// 当前状态.
    #[inline]
    pub fn state(&self) -> State {
        self.state
    }

    /// 按执行顺序排列的丢弃日志.
    #[inline]
    pub fn drop_log(&self) -> &[DropEntry] {
        &self.drops
    }

    /// 某个启发式在本次运行中丢弃的行. 该启发式未执行时返回 `None`.
    pub fn dropped(&self, heuristic: &str) -> Option<&SessionTable> {
        self.drops
            .iter()
            .find(|e| e.heuristic == heuristic)
            .map(|e| &e.rows)
    }

    /// 某阶段结束时的检查点.
    #[inline]
    pub fn checkpoint(&self, phase: u32) -> Option<&SessionTable> {
        self.checkpoints.get(&phase)
    }

    /// 所有检查点.
    #[inline]
    pub fn checkpoints(&self) -> &BTreeMap<u32, SessionTable> {
        &self.checkpoints
    }

    /// 畸形数据行的诊断.
    #[inline]
    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    /// 某阶段的输入表: 前一个已执行阶段的检查点, 或原始表.
    fn phase_input(&self, phase: u32) -> &SessionTable {
        self.checkpoints
            .range(..phase)
            .next_back()
            .map_or(&self.original, |(_, t)| t)
    }

    /// 阶段 `phase` 输入表上按厂商统计的缺失字段. 该阶段尚未执行时返回 `None`.
    pub fn missing_by_manufacturer(&self, phase: u32) -> Option<Vec<ManufacturerMissing>> {
        self.checkpoints
            .contains_key(&phase)
            .then(|| ManufacturerMissing::tally(self.phase_input(phase)))
    }

    /// 对最终工作表按被试汇总访视代码.
    pub fn visit_rollup(&self) -> RawTable {
        visit::visit_rollup(&self.current, self.config.fields.column(Field::SubjectId))
    }

    /// 本次运行的汇总.
    pub fn summary(&self) -> PhaseSummary {
        let mut remaining = self.original.len();
        let drop_details = self
            .drops
            .iter()
            .map(|e| {
                remaining -= e.rows.len();
                let h = self.heuristic(e.heuristic);
                DropDetail {
                    phase: e.phase,
                    heuristic: e.heuristic,
                    label: h.map_or(e.heuristic, |h| h.label()),
                    description: h.map_or("", |h| h.description()),
                    dropped: e.rows.len(),
                    remaining,
                }
            })
            .collect();

        PhaseSummary {
            initial_count: self.original.len(),
            initial_subjects: self.original.subject_count(),
            final_kept: self.current.len(),
            final_subjects: self.current.subject_count(),
            total_dropped: self.original.len() - self.current.len(),
            drop_details,
        }
    }

    fn heuristic(&self, name: &str) -> Option<Heuristic> {
        self.phases
            .values()
            .flatten()
            .copied()
            .find(|h| h.name() == name)
    }

    /// 独立重叠分析.
    ///
    /// 在阶段 `phase` 的输入表上单独重跑该阶段的每个启发式, 统计各自的丢弃数、
    /// 被全部启发式丢弃的行数与被任一启发式丢弃的行数. 只做报告, 不改变丢弃日志.
    /// 该阶段尚未执行时返回 `Ok(None)`.
    pub fn overlap(&self, phase: u32) -> QcResult<Option<OverlapReport>> {
        let (Some(hs), Some(after)) = (self.phases.get(&phase), self.checkpoints.get(&phase)) else {
            return Ok(None);
        };
        let input = self.phase_input(phase);

        let mut per_heuristic = Vec::with_capacity(hs.len());
        let mut all = vec![!hs.is_empty(); input.len()];
        let mut any = vec![false; input.len()];
        for h in hs.iter() {
            let mask = h.mask(input, &self.config)?;
            for (i, keep) in mask.keep.iter().enumerate() {
                all[i] &= !keep;
                any[i] |= !keep;
            }
            per_heuristic.push((h.name(), mask.dropped()));
        }

        Ok(Some(OverlapReport {
            phase,
            input_count: input.len(),
            per_heuristic,
            dropped_by_all: all.iter().filter(|b| **b).count(),
            dropped_by_any: any.iter().filter(|b| **b).count(),
            remaining: after.len(),
        }))
    }
}
