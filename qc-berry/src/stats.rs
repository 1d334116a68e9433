//! 忽略 `NaN` 的统计量. 全为 `NaN` 或为空时结果为 `NaN`.

use ordered_float::NotNan;

/// 均值.
pub fn nan_mean<I: IntoIterator<Item = f64>>(it: I) -> f64 {
    let (sum, n) = it
        .into_iter()
        .filter(|v| !v.is_nan())
        .fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    if n == 0 {
        f64::NAN
    } else {
        sum / n as f64
    }
}

/// 中位数. 偶数个元素时取中间两个的平均.
pub fn nan_median<I: IntoIterator<Item = f64>>(it: I) -> f64 {
    let mut v: Vec<NotNan<f64>> = it.into_iter().filter_map(|x| NotNan::new(x).ok()).collect();
    if v.is_empty() {
        return f64::NAN;
    }
    v.sort_unstable();
    let mid = v.len() / 2;
    if v.len() % 2 == 1 {
        v[mid].into_inner()
    } else {
        (v[mid - 1].into_inner() + v[mid].into_inner()) / 2.0
    }
}

/// 最大值.
pub fn nan_max<I: IntoIterator<Item = f64>>(it: I) -> f64 {
    it.into_iter()
        .filter_map(|x| NotNan::new(x).ok())
        .max()
        .map_or(f64::NAN, NotNan::into_inner)
}
