//! 运行时错误.
//!
//! 只有违反输入约定的错误 (缺列、缺文件、配置非法) 才会以 [`QcError`] 的形式向上传播;
//! 单行数据错误见 [`ListParseError`] 与 [`crate::pipeline::Diagnostic`].

use std::path::PathBuf;

use thiserror::Error;

/// 质控流程的致命错误. 出现时整次调用中止, 不产生部分输出.
#[derive(Debug, Error)]
pub enum QcError {
    /// 表中缺少必需的列. 第一个字段为表的描述, 第二个字段为列名.
    #[error("required column `{column}` is missing from {table}")]
    MissingColumn {
        /// 表的描述 (通常是文件路径或逻辑名).
        table: String,
        /// 缺失的列名.
        column: String,
    },

    /// 必需的输入文件或目录不存在.
    #[error("required input does not exist: {0}")]
    MissingInput(PathBuf),

    /// 配置文件中找不到给定的点分键路径.
    #[error("key path not found in config: {0}")]
    ConfigKey(String),

    /// 配置值不合法.
    #[error("invalid config: {0}")]
    InvalidConfig(String),

    /// 在 derivatives 目录下没有找到任何 confounds 文件.
    #[error("no confounds files found under {0}")]
    NoConfounds(PathBuf),

    /// confounds 表缺少计算 FD 所需的运动参数列.
    #[error("missing motion column `{0}` in confounds file")]
    MissingMotionColumn(String),

    /// 底层 I/O 错误.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// 分隔文本读写错误.
    #[error(transparent)]
    Csv(#[from] csv::Error),

    /// YAML 配置解析错误.
    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    /// JSON 序列化错误.
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// NIfTI header 读取错误.
    #[error(transparent)]
    Nifti(#[from] nifti::NiftiError),
}

impl QcError {
    /// 构造缺列错误.
    #[inline]
    pub fn missing_column<T: Into<String>, C: Into<String>>(table: T, column: C) -> Self {
        Self::MissingColumn {
            table: table.into(),
            column: column.into(),
        }
    }
}

/// 序列化数组字段 (如 `"[4, 64, 64, 36, 200]"`) 的解析错误.
///
/// 这是单行错误, 只会让当前启发式丢弃该行, 不会中止流程.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ListParseError {
    /// 字段为空.
    #[error("empty value")]
    Empty,

    /// 缺少成对的括号.
    #[error("value is not enclosed in brackets")]
    Unbracketed,

    /// 某个元素不是数字. 参数为该元素的原文.
    #[error("non-numeric element `{0}`")]
    NotANumber(String),

    /// 元素个数超过上限. 参数为上限.
    #[error("more than {0} elements")]
    TooLong(usize),

    /// 元素个数不足以取到所需下标. 第一个参数为实际长度, 第二个参数为所需下标.
    #[error("list of length {0} has no index {1}")]
    TooShort(usize, usize),

    /// 标量字段有值但不是数字. 参数为原文.
    #[error("non-numeric value `{0}`")]
    NonNumeric(String),
}

/// 质控流程结果.
pub type QcResult<T> = Result<T, QcError>;
