//! 访视代码规范化与按被试汇总.

use std::collections::BTreeMap;

use itertools::Itertools;
use once_cell::sync::Lazy;
use regex::Regex;

use super::{RawTable, SessionTable};

static MONTH_VISIT: Lazy<Regex> = Lazy::new(|| Regex::new(r"^m(\d+)$").unwrap());

/// 规范化访视代码.
///
/// 1. `bl` (大小写不敏感) 规范为 `M000`;
/// 2. 形如 `m<数字>` 的代码规范为 `M` 加三位补零的月份, 如 `m6` -> `M006`;
/// 3. 其它代码原样转为大写.
pub fn normalize_visit(code: &str) -> String {
    let lower = code.trim().to_lowercase();
    if lower == "bl" {
        return "M000".to_string();
    }
    match MONTH_VISIT
        .captures(&lower)
        .and_then(|c| c[1].parse::<u64>().ok())
    {
        Some(month) => format!("M{month:03}"),
        None => code.trim().to_uppercase(),
    }
}

/// 排序键: 月份访视按数值, 其余按字典序排在后面.
fn visit_order(code: &str) -> (u8, u64, String) {
    match code.strip_prefix('M').and_then(|n| n.parse::<u64>().ok()) {
        Some(n) => (0, n, String::new()),
        None => (1, 0, code.to_string()),
    }
}

/// 每个被试保留下来的、规范化后去重排序的访视代码.
pub fn visits_by_subject(table: &SessionTable) -> BTreeMap<String, Vec<String>> {
    let mut ans: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for r in table.iter() {
        ans.entry(r.subject_id.clone())
            .or_default()
            .push(normalize_visit(&r.visit_code));
    }
    for visits in ans.values_mut() {
        *visits = std::mem::take(visits)
            .into_iter()
            .unique()
            .sorted_by_cached_key(|v| visit_order(v))
            .collect();
    }
    ans
}

/// 生成两列 `(被试 ID 列名, sessions)` 的汇总表, `sessions` 以空格连接.
pub fn visit_rollup(table: &SessionTable, subject_column: &str) -> RawTable {
    let rows = visits_by_subject(table)
        .into_iter()
        .map(|(subject, visits)| vec![subject, visits.join(" ")])
        .collect();
    RawTable::new(
        "visit rollup",
        vec![subject_column.to_string(), "sessions".to_string()],
        rows,
    )
}
