//! session 启发式库.
//!
//! 每个启发式都是无状态的纯函数: 对一张 [`SessionTable`] 与一份 [`QcConfig`]
//! 给出等长、同序的保留掩码 (`true` = 保留). 它们既可以单独调用
//! (统计 "单独运行会丢多少"), 也可以作为流水线的一个阶段顺序使用.

use crate::config::{Field, QcConfig};
use crate::data::{SessionRecord, SessionTable};
use crate::error::{ListParseError, QcResult};

mod acquisition;
mod existence;

/// 单行判定函数. `Err` 表示该行数据畸形, 视为丢弃.
pub type Evaluate = fn(&SessionRecord, &QcConfig) -> Result<bool, ListParseError>;

/// 一个具名启发式.
#[derive(Copy, Clone)]
pub struct Heuristic {
    name: &'static str,
    label: &'static str,
    description: &'static str,
    required: &'static [Field],
    eval: Evaluate,
}

impl std::fmt::Debug for Heuristic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Heuristic")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl PartialEq for Heuristic {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

/// 启发式对一张表的判定结果.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct HeuristicMask {
    /// 与输入表同序的保留掩码.
    pub keep: Vec<bool>,

    /// 畸形数据行: `(行在输入表中的位置, 错误)`. 这些行在 `keep` 中均为 `false`.
    pub faults: Vec<(usize, ListParseError)>,
}

impl HeuristicMask {
    /// 被丢弃的行数.
    #[inline]
    pub fn dropped(&self) -> usize {
        self.keep.iter().filter(|k| !**k).count()
    }
}

impl Heuristic {
    /// 构造启发式.
    pub const fn new(
        name: &'static str,
        label: &'static str,
        description: &'static str,
        required: &'static [Field],
        eval: Evaluate,
    ) -> Self {
        Self {
            name,
            label,
            description,
            required,
            eval,
        }
    }

    /// 代码名, 如 `filter_missing_t1w`. 在一条流水线中唯一.
    #[inline]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// 报告中使用的可读名.
    #[inline]
    pub fn label(&self) -> &'static str {
        self.label
    }

    /// 判定标准的一句话描述.
    #[inline]
    pub fn description(&self) -> &'static str {
        self.description
    }

    /// 该启发式读取的字段.
    #[inline]
    pub fn required(&self) -> &'static [Field] {
        self.required
    }

    /// 判定单行.
    #[inline]
    pub fn evaluate(&self, record: &SessionRecord, config: &QcConfig) -> Result<bool, ListParseError> {
        (self.eval)(record, config)
    }

    /// 判定整张表.
    ///
    /// 若表中缺少该启发式需要的列, 立即返回配置错误.
    pub fn mask(&self, table: &SessionTable, config: &QcConfig) -> QcResult<HeuristicMask> {
        table.require(self.required, &config.fields)?;

        let mut ans = HeuristicMask {
            keep: Vec::with_capacity(table.len()),
            faults: Vec::new(),
        };
        for (pos, record) in table.iter().enumerate() {
            match self.evaluate(record, config) {
                Ok(keep) => ans.keep.push(keep),
                Err(e) => {
                    ans.keep.push(false);
                    ans.faults.push((pos, e));
                }
            }
        }
        Ok(ans)
    }
}

/// 过滤已知有问题的 Image ID.
pub const KNOWN_BAD_IMAGE: Heuristic = Heuristic::new(
    "filter_missing_data_adnidap",
    "BIDS",
    "Sessions flagged due to known errors in BIDS conversion.",
    &[Field::ImageId],
    existence::known_bad_image,
);

/// NIfTI 与 JSON 都必须存在.
pub const MISSING_DATA: Heuristic = Heuristic::new(
    "filter_missing_data",
    "Missing Data",
    "Sessions where required NIfTI or JSON files are missing after conversion.",
    &[Field::NiftiExists, Field::JsonExists],
    existence::missing_data,
);

/// T1w 必须存在.
pub const MISSING_T1W: Heuristic = Heuristic::new(
    "filter_missing_t1w",
    "T1w Image Missing",
    "Session does not have a T1-weighted image.",
    &[Field::T1wExists],
    existence::missing_t1w,
);

/// 扫描深度 `dim3 * pixdim3` 必须位于区间内.
pub const LOW_SCAN_DEPTH: Heuristic = Heuristic::new(
    "filter_low_scan_depth",
    "ScanDepth (dim3×pixdim3)",
    "Scan depth (dim3 × pixdim3) is outside the range [155, 180].",
    &[Field::NiftiDim, Field::NiftiPixdim],
    acquisition::low_scan_depth,
);

/// TR 必须落在单带或多带区间内.
pub const INVALID_REPETITION_TIME: Heuristic = Heuristic::new(
    "filter_invalid_repetition_time",
    "RepetitionTime (TR)",
    "Sessions where TR falls outside [0.5–1.0] or [2.9–3.1] seconds.",
    &[Field::RepetitionTime],
    acquisition::invalid_repetition_time,
);

/// 扫描时长 (TR × volumes) 不能过短.
pub const SHORT_DURATION: Heuristic = Heuristic::new(
    "filter_short_duration",
    "Scan Duration",
    "Sessions where total scan duration (TR × volumes) is less than 5 minutes.",
    &[Field::RepetitionTime, Field::NiftiDim],
    acquisition::short_duration,
);

/// `PercentPhaseFOV` 必须严格大于下限.
pub const LOW_PERCENT_PHASE_FOV: Heuristic = Heuristic::new(
    "filter_low_percent_phase_fov",
    "PercentPhaseFOV",
    "A session with an unusually low value of ≤ 72.",
    &[Field::PercentPhaseFov],
    acquisition::low_percent_phase_fov,
);

/// 排除非脑部线圈.
pub const BAD_COIL: Heuristic = Heuristic::new(
    "filter_out_bad_coils",
    "CoilString",
    "Sessions that use Q-BODY or BODY coils.",
    &[Field::CoilString],
    acquisition::bad_coil,
);

/// 所有内置启发式, 按默认执行顺序排列.
pub const ALL: [Heuristic; 8] = [
    KNOWN_BAD_IMAGE,
    MISSING_DATA,
    MISSING_T1W,
    LOW_SCAN_DEPTH,
    INVALID_REPETITION_TIME,
    SHORT_DURATION,
    LOW_PERCENT_PHASE_FOV,
    BAD_COIL,
];

/// 按代码名查找内置启发式.
pub fn by_name(name: &str) -> Option<Heuristic> {
    ALL.iter().copied().find(|h| h.name == name)
}
