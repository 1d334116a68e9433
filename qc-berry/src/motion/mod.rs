//! 头动汇总.
//!
//! 对每个扫描的 confounds 时间序列计算 Power FD (FD_P) 与 DVARS,
//! 生成每扫描一行的汇总表和每时间点一行的时间序列表.

use std::path::Path;

use itertools::Itertools;
use ndarray::{s, Array1, Array2, Axis};

use crate::config::MotionConfig;
use crate::data::{fmt_f64, parse_f64, Delimiter, RawTable};
use crate::dataset::bids::{self, BidsEntities};
use crate::error::{QcError, QcResult};
use crate::stats::{nan_max, nan_mean, nan_median};

/// fMRIPrep 预计算的 FD 列.
pub const FD_COLUMN: &str = "framewise_displacement";

/// 平移参数列.
pub const TRANS_COLUMNS: [&str; 3] = ["trans_x", "trans_y", "trans_z"];

/// 旋转参数列 (弧度).
pub const ROT_COLUMNS: [&str; 3] = ["rot_x", "rot_y", "rot_z"];

/// DVARS 列, 按优先级排列.
pub const DVARS_COLUMNS: [&str; 2] = ["std_dvars", "dvars"];

/// 汇总表的列.
pub const SUMMARY_COLUMNS: [&str; 11] = [
    "sub",
    "ses",
    "task",
    "run",
    "n_volumes",
    "mean_fd_p",
    "median_fd_p",
    "max_fd_p",
    "prop_fd_p_over_thresh",
    "n_fd_p_over_thresh",
    "mean_dvars",
];

/// 时间序列表的列.
pub const TIMESERIES_COLUMNS: [&str; 8] =
    ["sub", "ses", "task", "run", "t", "FD_P", "DVARS", "FD_P_over_thresh"];

/// 把一列解析为浮点数组. 缺失或非数字为 `NaN`.
fn column_values(table: &RawTable, col: usize) -> Array1<f64> {
    (0..table.len())
        .map(|r| table.get(r, col).and_then(parse_f64).unwrap_or(f64::NAN))
        .collect()
}

/// 读取 `columns` 组成 `(时间点, 列)` 矩阵. 缺少任何一列时返回错误.
fn motion_params(table: &RawTable, columns: &[&str]) -> QcResult<Array2<f64>> {
    let mut ans = Array2::from_elem((table.len(), columns.len()), f64::NAN);
    for (j, name) in columns.iter().enumerate() {
        let col = table
            .column(name)
            .ok_or_else(|| QcError::MissingMotionColumn(name.to_string()))?;
        ans.column_mut(j).assign(&column_values(table, col));
    }
    Ok(ans)
}

/// 一阶差分的绝对值按行求和, 首帧为 0.
fn abs_diff_sum(params: &Array2<f64>) -> Array1<f64> {
    let n = params.nrows();
    let mut ans = Array1::zeros(n);
    if n > 1 {
        let d = &params.slice(s![1.., ..]) - &params.slice(s![..-1, ..]);
        ans.slice_mut(s![1..]).assign(&d.mapv(f64::abs).sum_axis(Axis(1)));
    }
    ans
}

/// 由平移与旋转参数计算 Power FD:
/// `FD_i = Σ|Δtrans| + R · Σ|Δrot|`, 首帧为 0.
pub fn fd_from_params(trans: &Array2<f64>, rot: &Array2<f64>, head_radius_mm: f64) -> Array1<f64> {
    abs_diff_sum(trans) + abs_diff_sum(rot) * head_radius_mm
}

/// confounds 表的 FD_P 序列.
///
/// 存在 `framewise_displacement` 列时直接使用 (缺失值记为 0), 否则由运动参数计算.
pub fn framewise_displacement(table: &RawTable, head_radius_mm: f64) -> QcResult<Array1<f64>> {
    if let Some(col) = table.column(FD_COLUMN) {
        return Ok(column_values(table, col).mapv(|v| if v.is_nan() { 0.0 } else { v }));
    }
    let trans = motion_params(table, &TRANS_COLUMNS)?;
    let rot = motion_params(table, &ROT_COLUMNS)?;
    Ok(fd_from_params(&trans, &rot, head_radius_mm))
}

/// confounds 表的 DVARS 序列. 没有任何 DVARS 列时全为 `NaN`.
pub fn dvars(table: &RawTable) -> Array1<f64> {
    DVARS_COLUMNS
        .iter()
        .find_map(|c| table.column(c))
        .map_or_else(
            || Array1::from_elem(table.len(), f64::NAN),
            |col| column_values(table, col),
        )
}

/// 一个扫描的头动序列.
#[derive(Clone, Debug, PartialEq)]
pub struct ScanMotion {
    /// BIDS 实体.
    pub entities: BidsEntities,
    /// FD_P 序列, mm.
    pub fd: Array1<f64>,
    /// DVARS 序列.
    pub dvars: Array1<f64>,
    /// 高头动帧阈值, mm.
    pub fd_thresh: f64,
}

/// 一个扫描的头动汇总.
#[derive(Clone, Debug, PartialEq)]
pub struct MotionSummary {
    /// BIDS 实体.
    pub entities: BidsEntities,
    /// 时间点数.
    pub n_volumes: usize,
    /// FD_P 均值 (忽略 `NaN`).
    pub mean_fd_p: f64,
    /// FD_P 中位数 (忽略 `NaN`).
    pub median_fd_p: f64,
    /// FD_P 最大值 (忽略 `NaN`).
    pub max_fd_p: f64,
    /// 超过阈值的帧占比.
    pub prop_fd_p_over_thresh: f64,
    /// 超过阈值的帧数.
    pub n_fd_p_over_thresh: usize,
    /// DVARS 均值 (忽略 `NaN`).
    pub mean_dvars: f64,
}

impl ScanMotion {
    /// 由 confounds 表构造.
    pub fn from_table(entities: BidsEntities, table: &RawTable, config: &MotionConfig) -> QcResult<Self> {
        Ok(Self {
            entities,
            fd: framewise_displacement(table, config.head_radius_mm)?,
            dvars: dvars(table),
            fd_thresh: config.fd_thresh,
        })
    }

    /// 读取 confounds 文件. 实体从文件名解析.
    pub fn open<P: AsRef<Path>>(path: P, config: &MotionConfig) -> QcResult<Self> {
        let path = path.as_ref();
        let table = RawTable::open_with(path, Delimiter::Tab)?;
        Self::from_table(BidsEntities::from_path(path), &table, config)
    }

    /// 每帧是否超过阈值. `NaN` 不超过.
    #[inline]
    pub fn over_thresh(&self) -> Array1<bool> {
        self.fd.mapv(|v| v > self.fd_thresh)
    }

    /// 汇总.
    pub fn summary(&self) -> MotionSummary {
        let n = self.fd.len();
        let n_over = self.over_thresh().iter().filter(|b| **b).count();
        MotionSummary {
            entities: self.entities.clone(),
            n_volumes: n,
            mean_fd_p: nan_mean(self.fd.iter().copied()),
            median_fd_p: nan_median(self.fd.iter().copied()),
            max_fd_p: nan_max(self.fd.iter().copied()),
            prop_fd_p_over_thresh: if n == 0 { f64::NAN } else { n_over as f64 / n as f64 },
            n_fd_p_over_thresh: n_over,
            mean_dvars: nan_mean(self.dvars.iter().copied()),
        }
    }

    /// 时间序列表的行.
    pub fn timeseries_rows(&self) -> Vec<Vec<String>> {
        let ents = self.entities.cells();
        self.fd
            .iter()
            .zip(self.dvars.iter())
            .enumerate()
            .map(|(t, (&fd, &dv))| {
                let mut row = ents.to_vec();
                row.push(t.to_string());
                row.push(fmt_f64(Some(fd)));
                row.push(fmt_f64(Some(dv)));
                row.push(((fd > self.fd_thresh) as u8).to_string());
                row
            })
            .collect()
    }
}

impl MotionSummary {
    /// 汇总表的一行.
    pub fn row(&self) -> Vec<String> {
        let mut row = self.entities.cells().to_vec();
        row.push(self.n_volumes.to_string());
        row.extend(
            [
                self.mean_fd_p,
                self.median_fd_p,
                self.max_fd_p,
                self.prop_fd_p_over_thresh,
            ]
            .map(|v| fmt_f64(Some(v))),
        );
        row.push(self.n_fd_p_over_thresh.to_string());
        row.push(fmt_f64(Some(self.mean_dvars)));
        row
    }
}

/// 一批扫描的头动结果.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MotionBatch {
    /// 成功处理的扫描.
    pub scans: Vec<ScanMotion>,
    /// 被跳过的文件及原因.
    pub skipped: Vec<(String, String)>,
}

impl MotionBatch {
    /// 处理一组 confounds 文件. 单个文件出错时跳过并记录警告.
    pub fn from_files<P: AsRef<Path>, I: IntoIterator<Item = P>>(files: I, config: &MotionConfig) -> Self {
        let mut ans = Self::default();
        for f in files {
            let f = f.as_ref();
            match ScanMotion::open(f, config) {
                Ok(m) => ans.scans.push(m),
                Err(e) => {
                    log::warn!("Skipping {} due to error: {e}", f.display());
                    ans.skipped.push((f.display().to_string(), e.to_string()));
                }
            }
        }
        ans
    }

    /// 在 fMRIPrep derivatives 目录下发现并处理全部 confounds 文件.
    ///
    /// 一个 confounds 文件都没有时返回错误.
    pub fn from_derivatives<P: AsRef<Path>>(root: P, config: &MotionConfig) -> QcResult<Self> {
        let files = bids::find_confounds(root)?;
        Ok(Self::from_files(files, config))
    }

    /// 汇总表, 每扫描一行.
    pub fn summary_table(&self) -> RawTable {
        RawTable::new(
            "motion summary",
            SUMMARY_COLUMNS.iter().map(|s| s.to_string()).collect(),
            self.scans.iter().map(|m| m.summary().row()).collect(),
        )
    }

    /// 时间序列表, 每扫描每时间点一行.
    pub fn timeseries_table(&self) -> RawTable {
        RawTable::new(
            "motion timeseries",
            TIMESERIES_COLUMNS.iter().map(|s| s.to_string()).collect(),
            self.scans.iter().flat_map(ScanMotion::timeseries_rows).collect_vec(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn float_eq(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    fn confounds(text: &str) -> RawTable {
        RawTable::from_reader("confounds", text.as_bytes(), Delimiter::Tab).unwrap()
    }

    #[test]
    fn test_fd_from_params() {
        let t = confounds(
            "trans_x\ttrans_y\ttrans_z\trot_x\trot_y\trot_z\n\
             0\t0\t0\t0\t0\t0\n\
             0.1\t0\t-0.2\t0.001\t0\t0\n\
             0.1\t0\t-0.2\t0.001\t0\t0\n",
        );
        let fd = framewise_displacement(&t, 50.0).unwrap();
        assert_eq!(fd.len(), 3);
        assert_eq!(fd[0], 0.0);
        assert!(float_eq(fd[1], 0.3 + 0.05));
        assert_eq!(fd[2], 0.0);
    }

    #[test]
    fn test_precomputed_fd_wins_and_fills_missing() {
        let t = confounds(
            "framewise_displacement\ttrans_x\tdvars\n\
             n/a\t0\t10\n\
             0.7\t5\t20\n\
             0.2\t9\tn/a\n",
        );
        let m = ScanMotion::from_table(BidsEntities::default(), &t, &MotionConfig::default()).unwrap();
        assert_eq!(m.fd.to_vec(), [0.0, 0.7, 0.2]);

        let s = m.summary();
        assert_eq!(s.n_volumes, 3);
        assert!(float_eq(s.mean_fd_p, 0.3));
        assert!(float_eq(s.median_fd_p, 0.2));
        assert!(float_eq(s.max_fd_p, 0.7));
        assert_eq!(s.n_fd_p_over_thresh, 1);
        assert!(float_eq(s.prop_fd_p_over_thresh, 1.0 / 3.0));
        assert!(float_eq(s.mean_dvars, 15.0));
    }

    #[test]
    fn test_dvars_preference() {
        let t = confounds("std_dvars\tdvars\n1\t100\n3\t300\n");
        assert_eq!(dvars(&t).to_vec(), [1.0, 3.0]);
        let t = confounds("framewise_displacement\n0\n");
        assert!(dvars(&t)[0].is_nan());
    }

    #[test]
    fn test_missing_motion_column() {
        let t = confounds("trans_x\ttrans_y\ttrans_z\trot_x\trot_y\n0\t0\t0\t0\t0\n");
        match framewise_displacement(&t, 50.0) {
            Err(QcError::MissingMotionColumn(c)) => assert_eq!(c, "rot_z"),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_timeseries_rows() {
        let t = confounds("framewise_displacement\n0\n0.6\n");
        let e = BidsEntities::parse("sub-01_ses-M000_task-rest_run-1_desc-confounds_timeseries.tsv");
        let m = ScanMotion::from_table(e, &t, &MotionConfig::default()).unwrap();
        let rows = m.timeseries_rows();
        assert_eq!(rows[1], ["sub-01", "ses-M000", "task-rest", "run-1", "1", "0.6", "", "1"]);
        assert_eq!(m.summary().row()[..5], ["sub-01", "ses-M000", "task-rest", "run-1", "2"]);
    }

    #[test]
    fn test_batch_skips_bad_files() {
        let dir = tempfile::tempdir().unwrap();
        let func = dir.path().join("sub-01").join("ses-M000").join("func");
        fs::create_dir_all(&func).unwrap();
        fs::write(
            func.join("sub-01_ses-M000_task-rest_desc-confounds_timeseries.tsv"),
            "framewise_displacement\tstd_dvars\nn/a\t1.0\n0.9\t1.2\n0.1\t1.1\n",
        )
        .unwrap();
        fs::write(
            func.join("sub-01_ses-M000_task-motor_desc-confounds_timeseries.tsv"),
            "trans_x\n0\n",
        )
        .unwrap();

        let batch = MotionBatch::from_derivatives(dir.path(), &MotionConfig::default()).unwrap();
        assert_eq!(batch.scans.len(), 1);
        assert_eq!(batch.skipped.len(), 1);
        assert!(batch.skipped[0].0.contains("task-motor"));

        let summary = batch.summary_table();
        assert_eq!(summary.headers(), SUMMARY_COLUMNS);
        assert_eq!(summary.len(), 1);
        assert_eq!(summary.get(0, 9), Some("1"));
        assert_eq!(batch.timeseries_table().len(), 3);
    }
}
