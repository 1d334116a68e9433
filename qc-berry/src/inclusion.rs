//! 最终纳入判定.
//!
//! 以头动汇总表为主表, 按 `(sub, ses)` 左连接 Euler 汇总表与可选的 IQM 离群表,
//! 对每一行独立判定四个排除条件. 任一条件成立即排除, 原因以 `;` 连接.

use std::collections::HashMap;

use crate::config::InclusionConfig;
use crate::data::{parse_f64, parse_flag, RawTable};
use crate::error::QcResult;
use crate::euler::EulerOutliers;

/// Euler 离群原因.
pub const EULER_REASON: &str = "euler_site_outlier";

/// IQM 离群原因.
pub const MRIQC_REASON: &str = "mriqc_outlier";

/// IQM 表中的排除标记列.
pub const MRIQC_COLUMN: &str = "exclude_mriqc";

/// 追加在头动列之后的列.
pub const APPENDED_COLUMNS: [&str; 6] = [
    "site",
    "avg_en",
    "exclude_euler",
    MRIQC_COLUMN,
    "exclude",
    "exclude_reason",
];

/// 按 `(sub, ses)` 建立索引. 重复键只保留第一次出现的行.
fn index_by_session(table: &RawTable) -> QcResult<HashMap<(String, String), usize>> {
    let sub = table.require("sub")?;
    let ses = table.require("ses")?;
    let mut ans = HashMap::with_capacity(table.len());
    for (i, r) in table.rows().iter().enumerate() {
        ans.entry((r[sub].clone(), r[ses].clone())).or_insert(i);
    }
    Ok(ans)
}

/// IQM 排除标记: `1`/`1.0`/`TRUE` 为真, 其余 (含缺失) 为假.
#[inline]
fn iqm_flag(cell: &str) -> bool {
    parse_flag(cell) || parse_f64(cell) == Some(1.0)
}

/// 合并后单行的判定.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Verdict {
    /// 是否排除.
    pub exclude: bool,
    /// 触发的原因, 按固定顺序排列.
    pub reasons: Vec<String>,
}

impl Verdict {
    /// 判定四个条件. `NaN` 与阈值比较为假.
    ///
    /// 原因中的阈值总带小数点, 如 `mean_fd_p>1.0`.
    pub fn judge(
        mean_fd_p: f64,
        prop_over: f64,
        euler: bool,
        mriqc: bool,
        config: &InclusionConfig,
    ) -> Self {
        let mut reasons = Vec::new();
        if mean_fd_p > config.fd_mean_thresh {
            reasons.push(format!("mean_fd_p>{:?}", config.fd_mean_thresh));
        }
        if prop_over > config.fd_prop_thresh {
            reasons.push(format!("prop_fd_p_over_thresh>{:?}", config.fd_prop_thresh));
        }
        if euler {
            reasons.push(EULER_REASON.to_string());
        }
        if mriqc {
            reasons.push(MRIQC_REASON.to_string());
        }
        Self {
            exclude: !reasons.is_empty(),
            reasons,
        }
    }

    /// `exclude_reason` 列的值.
    #[inline]
    pub fn reason(&self) -> String {
        self.reasons.join(";")
    }
}

/// 纳入判定结果.
#[derive(Clone, Debug, PartialEq)]
pub struct InclusionDecision {
    /// 合并后的全表.
    pub merged: RawTable,
    /// `exclude == 0` 的行.
    pub included: RawTable,
    /// `exclude == 1` 的行.
    pub excluded: RawTable,
    /// 被 Euler 检测排除的被试数.
    pub euler_removed: usize,
}

/// 合并三张表并判定.
///
/// - `motion`: 头动汇总, 至少含 `sub, ses, mean_fd_p, prop_fd_p_over_thresh`;
/// - `euler`: Euler 汇总, 至少含 `sub, ses, site, avg_en`;
/// - `iqm`: 可选的 IQM 离群表, 含 `sub, ses, exclude_mriqc`. `None` 表示不施加 IQM 排除.
pub fn finalize(
    motion: &RawTable,
    euler: &RawTable,
    iqm: Option<&RawTable>,
    euler_threshold: f64,
    config: &InclusionConfig,
) -> QcResult<InclusionDecision> {
    let m_sub = motion.require("sub")?;
    let m_ses = motion.require("ses")?;
    let m_mean = motion.require("mean_fd_p")?;
    let m_prop = motion.require("prop_fd_p_over_thresh")?;

    let outliers = EulerOutliers::from_table(euler, euler_threshold)?;
    let e_site = euler.require("site")?;
    let e_en = euler.require("avg_en")?;
    let euler_index = index_by_session(euler)?;

    let iqm = match iqm {
        Some(t) => Some((t, t.require(MRIQC_COLUMN)?, index_by_session(t)?)),
        None => None,
    };

    let mut headers = motion.headers().to_vec();
    headers.extend(APPENDED_COLUMNS.iter().map(|s| s.to_string()));

    let mut rows = Vec::with_capacity(motion.len());
    let mut included = Vec::new();
    let mut excluded = Vec::new();
    for r in motion.rows() {
        let key = (r[m_sub].clone(), r[m_ses].clone());
        let (site, avg_en) = match euler_index.get(&key) {
            Some(&i) => (euler.rows()[i][e_site].clone(), euler.rows()[i][e_en].clone()),
            None => (String::new(), String::new()),
        };
        let exclude_euler = outliers.is_flagged(&key.0);
        let exclude_mriqc = iqm.as_ref().is_some_and(|(t, col, idx)| {
            idx.get(&key).is_some_and(|&i| iqm_flag(&t.rows()[i][*col]))
        });

        let v = Verdict::judge(
            parse_f64(&r[m_mean]).unwrap_or(f64::NAN),
            parse_f64(&r[m_prop]).unwrap_or(f64::NAN),
            exclude_euler,
            exclude_mriqc,
            config,
        );

        let mut row = r.clone();
        row.push(site);
        row.push(avg_en);
        row.push((exclude_euler as u8).to_string());
        row.push((exclude_mriqc as u8).to_string());
        row.push((v.exclude as u8).to_string());
        row.push(v.reason());

        if v.exclude {
            excluded.push(row.clone());
        } else {
            included.push(row.clone());
        }
        rows.push(row);
    }

    log::info!(
        "{} included, {} excluded of {} motion rows",
        included.len(),
        excluded.len(),
        rows.len()
    );

    Ok(InclusionDecision {
        merged: RawTable::new("merged", headers.clone(), rows),
        included: RawTable::new("included sessions", headers.clone(), included),
        excluded: RawTable::new("excluded sessions", headers, excluded),
        euler_removed: outliers.removed_count(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Delimiter;
    use std::collections::BTreeSet;

    fn tsv(text: &str) -> RawTable {
        RawTable::from_reader("t", text.as_bytes(), Delimiter::Tab).unwrap()
    }

    fn motion() -> RawTable {
        tsv("sub\tses\ttask\tmean_fd_p\tprop_fd_p_over_thresh\n\
             sub-ADNI941S0001\tses-M000\trest\t0.1\t0.0\n\
             sub-ADNI941S0002\tses-M000\trest\t0.8\t0.5\n\
             sub-ADNI941S0003\tses-M000\trest\t0.2\t0.1\n\
             sub-ADNI941S0004\tses-M000\trest\t0.2\t0.1\n\
             sub-ADNI941S0005\tses-M000\trest\t0.2\t0.1\n\
             sub-ADNI002S0009\tses-M012\trest\t\t\n")
    }

    fn euler() -> RawTable {
        tsv("fs_subject\tsub\tses\tsite\tlh_en\trh_en\tavg_en\n\
             a\tsub-ADNI941S0001\tses-M000\t941\t0\t0\t-16\n\
             b\tsub-ADNI941S0002\tses-M000\t941\t0\t0\t-25\n\
             c\tsub-ADNI941S0003\tses-M000\t941\t0\t0\t-900\n\
             d\tsub-ADNI941S0004\tses-M000\t941\t0\t0\t-36\n\
             e\tsub-ADNI941S0005\tses-M000\t941\t0\t0\t-30\n")
    }

    #[test]
    fn test_verdict_reasons() {
        let cfg = InclusionConfig::default();
        let v = Verdict::judge(0.6, 0.31, true, true, &cfg);
        assert_eq!(
            v.reason(),
            "mean_fd_p>0.5;prop_fd_p_over_thresh>0.3;euler_site_outlier;mriqc_outlier"
        );
        let v = Verdict::judge(0.5, 0.30, false, false, &cfg);
        assert!(!v.exclude);
        assert_eq!(v.reason(), "");
        assert!(!Verdict::judge(f64::NAN, f64::NAN, false, false, &cfg).exclude);
    }

    #[test]
    fn test_verdict_reason_keeps_decimal_point() {
        let cfg = InclusionConfig {
            fd_mean_thresh: 1.0,
            fd_prop_thresh: 0.25,
        };
        let v = Verdict::judge(1.5, 0.5, false, false, &cfg);
        assert_eq!(v.reason(), "mean_fd_p>1.0;prop_fd_p_over_thresh>0.25");
    }

    #[test]
    fn test_partition_is_complete_and_reasons_consistent() {
        let iqm = tsv("sub\tses\texclude_mriqc\n\
                       sub-ADNI941S0004\tses-M000\t1\n\
                       sub-ADNI941S0005\tses-M000\t0\n");
        let d = finalize(&motion(), &euler(), Some(&iqm), 5.0, &InclusionConfig::default()).unwrap();
        assert_eq!(d.euler_removed, 1);
        assert_eq!(d.included.len() + d.excluded.len(), motion().len());

        let key = |t: &RawTable| -> BTreeSet<(String, String)> {
            t.rows().iter().map(|r| (r[0].clone(), r[1].clone())).collect()
        };
        assert!(key(&d.included).is_disjoint(&key(&d.excluded)));

        let exclude = d.merged.require("exclude").unwrap();
        let reason = d.merged.require("exclude_reason").unwrap();
        for r in d.merged.rows() {
            assert_eq!(r[exclude] == "1", !r[reason].is_empty());
        }

        let reasons: Vec<&str> = d.excluded.rows().iter().map(|r| r[reason].as_str()).collect();
        assert_eq!(
            reasons,
            [
                "mean_fd_p>0.5;prop_fd_p_over_thresh>0.3",
                "euler_site_outlier",
                "mriqc_outlier",
            ]
        );
    }

    #[test]
    fn test_left_join_keeps_rows_without_euler() {
        let d = finalize(&motion(), &euler(), None, 5.0, &InclusionConfig::default()).unwrap();
        let last = d.merged.rows().last().unwrap();
        let site = d.merged.require("site").unwrap();
        assert_eq!(last[0], "sub-ADNI002S0009");
        assert_eq!(last[site], "");
        assert_eq!(d.included.rows().last().unwrap()[0], "sub-ADNI002S0009");
        assert_eq!(&d.merged.headers()[5..], APPENDED_COLUMNS);
    }

    #[test]
    fn test_iqm_table_requires_flag_column() {
        let iqm = tsv("sub\tses\toutlier\nsub-ADNI941S0004\tses-M000\t1\n");
        assert!(finalize(&motion(), &euler(), Some(&iqm), 5.0, &InclusionConfig::default()).is_err());
    }
}
