//! 采集参数检查.

use crate::config::QcConfig;
use crate::data::{nth, SessionRecord};
use crate::error::ListParseError;

/// 闭区间判定. `NaN` 不落在任何区间内.
#[inline]
fn within((lo, hi): (f64, f64), v: f64) -> bool {
    lo <= v && v <= hi
}

/// `dim[3] * pixdim[3]` 落在区间内. 数组不合法时返回错误.
pub(super) fn low_scan_depth(r: &SessionRecord, cfg: &QcConfig) -> Result<bool, ListParseError> {
    let dim = r.nifti_dim.as_ref().map_err(Clone::clone)?;
    let pixdim = r.nifti_pixdim.as_ref().map_err(Clone::clone)?;
    let depth = nth(dim, 3)? * nth(pixdim, 3)?;
    Ok(within(cfg.thresholds.scan_depth_mm, depth))
}

/// TR 落在单带或多带区间内. 缺失时丢弃, 非数字时返回错误.
pub(super) fn invalid_repetition_time(
    r: &SessionRecord,
    cfg: &QcConfig,
) -> Result<bool, ListParseError> {
    let t = &cfg.thresholds;
    Ok(r.repetition_time
        .clone()?
        .is_some_and(|tr| within(t.tr_single_band, tr) || within(t.tr_multiband, tr)))
}

/// 时长 `TR * dim[4]` 不短于下限, 且在设置了上限时不超过上限.
///
/// 任一输入缺失, 或 `nifti_dim` 不合法时丢弃, 但不记为畸形行. TR 非数字时返回错误.
pub(super) fn short_duration(r: &SessionRecord, cfg: &QcConfig) -> Result<bool, ListParseError> {
    let tr = r.repetition_time.clone()?;
    let volumes = r.nifti_dim.as_ref().ok().and_then(|d| d.get(4).copied());
    let duration = match (tr, volumes) {
        (Some(tr), Some(n)) => tr * n,
        _ => return Ok(false),
    };
    let t = &cfg.thresholds;
    Ok(duration >= t.min_duration_sec && t.max_duration_sec.map_or(true, |max| duration <= max))
}

pub(super) fn low_percent_phase_fov(
    r: &SessionRecord,
    cfg: &QcConfig,
) -> Result<bool, ListParseError> {
    Ok(r.percent_phase_fov
        .clone()?
        .is_some_and(|v| v > cfg.thresholds.min_percent_phase_fov))
}

/// 线圈名与名单逐字匹配 (区分大小写) 时丢弃. 缺失线圈名的行保留.
pub(super) fn bad_coil(r: &SessionRecord, cfg: &QcConfig) -> Result<bool, ListParseError> {
    Ok(r
        .coil_string
        .as_deref()
        .map_or(true, |c| !cfg.thresholds.bad_coils.iter().any(|b| b == c)))
}
