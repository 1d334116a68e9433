//! 按站点的 Euler 数离群检测.
//!
//! 1. 每个被试聚合为一行: 各 session 平均 Euler 数的均值, 以及第一次出现的站点;
//! 2. 站点内只对负值做 `x' = sqrt(-x)`, 非负值不参与;
//! 3. 以站点内 `x'` 的中位数中心化, 中心化值大于阈值者排除.
//!
//! 不同站点之间互不影响.

use std::collections::{BTreeMap, BTreeSet};

use crate::data::{parse_f64, RawTable};
use crate::error::QcResult;
use crate::stats::{nan_mean, nan_median};

/// 单个被试的检测结果.
#[derive(Clone, Debug, PartialEq)]
pub struct SubjectEuler {
    /// 被试 ID.
    pub sub: String,
    /// 站点代码.
    pub site: String,
    /// 各 session 平均 Euler 数的均值. 全部缺失时为 `NaN`.
    pub avg_en: f64,
    /// 站点内中心化后的变换值. 非负或缺失的 Euler 数为 `None`.
    pub centered: Option<f64>,
    /// 是否排除.
    pub exclude: bool,
}

/// 全部被试的检测结果, 按被试 ID 排序.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct EulerOutliers {
    subjects: Vec<SubjectEuler>,
}

impl EulerOutliers {
    /// 对 `(sub, site, avg_en)` 记录做检测.
    pub fn detect<S, T, I>(rows: I, threshold: f64) -> Self
    where
        S: Into<String>,
        T: Into<String>,
        I: IntoIterator<Item = (S, T, f64)>,
    {
        // sub -> (第一个非空站点, 全部 avg_en)
        let mut per_subject: BTreeMap<String, (Option<String>, Vec<f64>)> = BTreeMap::new();
        for (sub, site, en) in rows {
            let site: String = site.into();
            let e = per_subject.entry(sub.into()).or_default();
            if e.0.is_none() && !site.is_empty() {
                e.0 = Some(site);
            }
            e.1.push(en);
        }

        let mut subjects: Vec<SubjectEuler> = per_subject
            .into_iter()
            .map(|(sub, (site, ens))| SubjectEuler {
                sub,
                site: site.unwrap_or_default(),
                avg_en: nan_mean(ens),
                centered: None,
                exclude: false,
            })
            .collect();

        let mut sites: BTreeMap<String, Vec<usize>> = BTreeMap::new();
        for (i, s) in subjects.iter().enumerate() {
            sites.entry(s.site.clone()).or_default().push(i);
        }

        for (site, members) in sites {
            let transformed: Vec<(usize, f64)> = members
                .iter()
                .filter(|&&i| subjects[i].avg_en < 0.0)
                .map(|&i| (i, (-subjects[i].avg_en).sqrt()))
                .collect();
            let med = nan_median(transformed.iter().map(|(_, t)| *t));
            if med.is_nan() {
                log::debug!("Site `{site}` has no negative Euler numbers");
                continue;
            }
            for (i, t) in transformed {
                let c = t - med;
                subjects[i].centered = Some(c);
                subjects[i].exclude = c > threshold;
            }
        }

        let ans = Self { subjects };
        log::info!(
            "{} subjects removed based on sitewise Euler.",
            ans.removed_count()
        );
        ans
    }

    /// 从 Euler 汇总表 (`sub`, `site`, `avg_en` 列) 检测.
    pub fn from_table(table: &RawTable, threshold: f64) -> QcResult<Self> {
        let sub = table.require("sub")?;
        let site = table.require("site")?;
        let en = table.require("avg_en")?;
        let rows = table.rows().iter().map(|r| {
            (
                r[sub].trim().to_string(),
                r[site].trim().to_string(),
                parse_f64(&r[en]).unwrap_or(f64::NAN),
            )
        });
        Ok(Self::detect(rows, threshold))
    }

    /// 所有被试.
    #[inline]
    pub fn subjects(&self) -> &[SubjectEuler] {
        &self.subjects
    }

    /// 被排除的被试.
    pub fn removed(&self) -> BTreeSet<&str> {
        self.subjects
            .iter()
            .filter(|s| s.exclude)
            .map(|s| s.sub.as_str())
            .collect()
    }

    /// 被排除的被试数.
    #[inline]
    pub fn removed_count(&self) -> usize {
        self.subjects.iter().filter(|s| s.exclude).count()
    }

    /// 被试是否被排除. 不在结果中的被试视为不排除.
    pub fn is_flagged(&self, sub: &str) -> bool {
        self.subjects
            .binary_search_by(|s| s.sub.as_str().cmp(sub))
            .is_ok_and(|i| self.subjects[i].exclude)
    }
}
