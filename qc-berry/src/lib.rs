#![warn(missing_docs)] // <= 合适时移除它.
// #![warn(clippy::missing_docs_in_private_items)]  // <= too strict.

//! 核心库. 提供神经影像队列的 session 质控流水线, 以及基于头动、Euler 数和 IQM
//! 离群标记的最终纳入判定.
//!
//! 该 crate 只处理元数据驱动的决策逻辑, 不做任何图像处理.
//!
//! # 注意
//!
//! 1. 违反输入约定的错误 (缺列、缺文件、配置非法) 以 [`QcError`] 返回, 整次调用中止;
//! 2. 单行数据错误 (数组字段畸形、数值缺失) 只会让该行被当前启发式丢弃,
//!   并记录一条 [`pipeline::Diagnostic`].
//!
//! # 开发计划
//!
//! ### session 启发式库 ✅
//!
//! 实现位于 `qc-berry/src/heuristics`.
//!
//! ### 分阶段过滤流水线, 丢弃日志与检查点 ✅
//!
//! 实现位于 `qc-berry/src/pipeline`.
//!
//! ### 阶段汇总、独立重叠分析、按厂商的缺失字段统计 ✅
//!
//! 实现位于 `qc-berry/src/pipeline/summary.rs`.
//!
//! ### confounds 头动汇总 ✅
//!
//! 实现位于 `qc-berry/src/motion`.
//!
//! ### FreeSurfer Euler 数提取与按站点离群检测 ✅
//!
//! 实现位于 `qc-berry/src/dataset/freesurfer.rs` 与 `qc-berry/src/euler`.
//!
//! ### 最终纳入判定 ✅
//!
//! 实现位于 `qc-berry/src/inclusion.rs`.
//!
//! ### fMRIPrep 失败归类 ✅
//!
//! 实现位于 `qc-berry/src/dataset/fmriprep.rs`.
//!
//! ### 结构像 header 探查 ✅
//!
//! 实现位于 `qc-berry/src/dataset/probe.rs`.
//!
//! ### `mris_euler_number` 回退 ✅
//!
//! 日志缺失或没有 Euler 行时调用 FreeSurfer 工具重新计算, 实现位于 `qc-berry/src/dataset/freesurfer.rs`.

pub mod config;
pub mod consts;

/// 表格数据与 session 表.
pub mod data;

pub mod dataset;
pub mod error;
pub mod euler;
pub mod heuristics;
pub mod inclusion;
pub mod motion;
pub mod pipeline;
pub mod prelude;
pub mod stats;

pub use config::QcConfig;
pub use data::{RawTable, SessionRecord, SessionTable};
pub use error::{ListParseError, QcError, QcResult};
pub use pipeline::SessionFilterPipeline;
