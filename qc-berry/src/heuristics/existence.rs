//! 数据存在性检查.

use crate::config::QcConfig;
use crate::data::SessionRecord;
use crate::error::ListParseError;

/// Image ID 不在已知错误名单中. 缺失 ID 的行保留.
pub(super) fn known_bad_image(r: &SessionRecord, cfg: &QcConfig) -> Result<bool, ListParseError> {
    Ok(r.image_id
        .map_or(true, |id| !cfg.thresholds.bad_image_ids.contains(&id)))
}

pub(super) fn missing_data(r: &SessionRecord, _: &QcConfig) -> Result<bool, ListParseError> {
    Ok(r.nifti_exists && r.json_exists)
}

pub(super) fn missing_t1w(r: &SessionRecord, _: &QcConfig) -> Result<bool, ListParseError> {
    Ok(r.t1w_exists)
}
