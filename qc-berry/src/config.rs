//! 显式配置: 列名映射与数值阈值.
//!
//! 所有启发式和合并器都接受 `&QcConfig`, 不存在全局配置.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_yaml::Value;

use crate::consts::{euler, limits, motion};
use crate::error::{QcError, QcResult};

/// 指定配置文件路径的环境变量.
pub const CONFIG_ENV: &str = "QC_BERRY_CONFIG";

/// session 表中启发式会用到的语义字段.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub enum Field {
    /// 被试 ID.
    SubjectId,
    /// 访视代码.
    VisitCode,
    /// Image ID.
    ImageId,
    /// NIfTI 文件是否存在.
    NiftiExists,
    /// JSON sidecar 是否存在.
    JsonExists,
    /// T1w 图像是否存在.
    T1wExists,
    /// NIfTI `dim` 数组.
    NiftiDim,
    /// NIfTI `pixdim` 数组.
    NiftiPixdim,
    /// 重复时间, 秒.
    RepetitionTime,
    /// 相位视野百分比.
    PercentPhaseFov,
    /// 线圈名.
    CoilString,
    /// 厂商名.
    Manufacturer,
}

impl Field {
    /// 所有字段.
    pub const ALL: [Field; 12] = [
        Field::SubjectId,
        Field::VisitCode,
        Field::ImageId,
        Field::NiftiExists,
        Field::JsonExists,
        Field::T1wExists,
        Field::NiftiDim,
        Field::NiftiPixdim,
        Field::RepetitionTime,
        Field::PercentPhaseFov,
        Field::CoilString,
        Field::Manufacturer,
    ];
}

/// 语义字段到输入表列名的映射.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FieldMap {
    /// 被试 ID 列.
    pub subject_id: String,
    /// 访视代码列.
    pub visit_code: String,
    /// Image ID 列.
    pub image_id: String,
    /// NIfTI 存在标志列.
    pub nifti_exists: String,
    /// JSON 存在标志列.
    pub json_exists: String,
    /// T1w 存在标志列.
    pub t1w_exists: String,
    /// NIfTI `dim` 列.
    pub nifti_dim: String,
    /// NIfTI `pixdim` 列.
    pub nifti_pixdim: String,
    /// 重复时间列.
    pub repetition_time: String,
    /// 相位视野百分比列.
    pub percent_phase_fov: String,
    /// 线圈名列.
    pub coil_string: String,
    /// 厂商名列.
    pub manufacturer: String,
}

impl Default for FieldMap {
    fn default() -> Self {
        Self {
            subject_id: "Subject_ID".into(),
            visit_code: "VISCODE".into(),
            image_id: "Image_ID".into(),
            nifti_exists: "NIfTI_exists".into(),
            json_exists: "JSON_exists".into(),
            t1w_exists: "T1w_exists".into(),
            nifti_dim: "nifti_dim".into(),
            nifti_pixdim: "nifti_pixdim".into(),
            repetition_time: "json_RepetitionTime".into(),
            percent_phase_fov: "json_PercentPhaseFOV".into(),
            coil_string: "json_CoilString".into(),
            manufacturer: "json_Manufacturer".into(),
        }
    }
}

impl FieldMap {
    /// 字段对应的列名.
    pub fn column(&self, field: Field) -> &str {
        match field {
            Field::SubjectId => &self.subject_id,
            Field::VisitCode => &self.visit_code,
            Field::ImageId => &self.image_id,
            Field::NiftiExists => &self.nifti_exists,
            Field::JsonExists => &self.json_exists,
            Field::T1wExists => &self.t1w_exists,
            Field::NiftiDim => &self.nifti_dim,
            Field::NiftiPixdim => &self.nifti_pixdim,
            Field::RepetitionTime => &self.repetition_time,
            Field::PercentPhaseFov => &self.percent_phase_fov,
            Field::CoilString => &self.coil_string,
            Field::Manufacturer => &self.manufacturer,
        }
    }
}

/// session 启发式的阈值.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Thresholds {
    /// 单带 TR 区间 `[lo, hi]`, 秒.
    pub tr_single_band: (f64, f64),
    /// 多带 TR 区间 `[lo, hi]`, 秒.
    pub tr_multiband: (f64, f64),
    /// 扫描深度区间 `[lo, hi]`, 毫米.
    pub scan_depth_mm: (f64, f64),
    /// `PercentPhaseFOV` 必须严格大于该值.
    pub min_percent_phase_fov: f64,
    /// 最短扫描时长, 秒.
    pub min_duration_sec: f64,
    /// 最长扫描时长, 秒. 默认不启用.
    pub max_duration_sec: Option<f64>,
    /// 非脑部线圈名.
    pub bad_coils: Vec<String>,
    /// 已知有问题的 Image ID.
    pub bad_image_ids: Vec<i64>,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            tr_single_band: limits::TR_SINGLE_BAND,
            tr_multiband: limits::TR_MULTIBAND,
            scan_depth_mm: limits::SCAN_DEPTH_MM,
            min_percent_phase_fov: limits::MIN_PERCENT_PHASE_FOV,
            min_duration_sec: limits::MIN_DURATION_SEC,
            max_duration_sec: None,
            bad_coils: limits::BAD_COILS.iter().map(|s| s.to_string()).collect(),
            bad_image_ids: limits::BAD_IMAGE_IDS.to_vec(),
        }
    }
}

/// 运动汇总参数.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MotionConfig {
    /// 高运动帧的 FD 阈值, 毫米.
    pub fd_thresh: f64,
    /// 头部半径, 毫米.
    pub head_radius_mm: f64,
}

impl Default for MotionConfig {
    fn default() -> Self {
        Self {
            fd_thresh: motion::FD_THRESH_MM,
            head_radius_mm: motion::HEAD_RADIUS_MM,
        }
    }
}

/// Euler 数提取与离群检测参数.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EulerConfig {
    /// 中心化后超过该值即为离群.
    pub outlier_threshold: f64,
    /// 从被试名推断站点时需要去掉的前缀.
    pub site_prefix: String,
    /// 站点代码长度.
    pub site_len: usize,
    /// `mris_euler_number` 程序. 可以是 `PATH` 中的名字, 也可以是完整路径.
    pub mris_euler_number: String,
}

impl Default for EulerConfig {
    fn default() -> Self {
        Self {
            outlier_threshold: euler::OUTLIER_THRESH,
            site_prefix: euler::SITE_PREFIX.into(),
            site_len: euler::SITE_LEN,
            mris_euler_number: euler::MRIS_EULER_NUMBER.into(),
        }
    }
}

/// 最终纳入判定阈值.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InclusionConfig {
    /// 平均 FD 阈值.
    pub fd_mean_thresh: f64,
    /// 高运动帧占比阈值.
    pub fd_prop_thresh: f64,
}

impl Default for InclusionConfig {
    fn default() -> Self {
        Self {
            fd_mean_thresh: motion::FD_MEAN_THRESH_MM,
            fd_prop_thresh: motion::FD_PROP_THRESH,
        }
    }
}

/// 全部配置.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QcConfig {
    /// 列名映射.
    pub fields: FieldMap,
    /// session 启发式阈值.
    pub thresholds: Thresholds,
    /// 运动汇总参数.
    pub motion: MotionConfig,
    /// Euler 参数.
    pub euler: EulerConfig,
    /// 最终纳入阈值.
    pub inclusion: InclusionConfig,
}

impl QcConfig {
    /// 从 YAML 文本解析. 缺省的节与字段取默认值.
    pub fn from_yaml_str(s: &str) -> QcResult<Self> {
        let value = parse_yaml_mapping(s, "<inline>")?;
        Self::from_value(value)
    }

    /// 从 YAML 文件读取.
    pub fn open<P: AsRef<Path>>(path: P) -> QcResult<Self> {
        Self::from_value(load_value(path)?)
    }

    /// 从已经加载的 YAML 值解析. 配置文件里可以存在与本结构无关的节.
    pub fn from_value(value: Value) -> QcResult<Self> {
        let cfg: Self = serde_yaml::from_value(value)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// 检查区间与阈值的基本合理性.
    pub fn validate(&self) -> QcResult<()> {
        let t = &self.thresholds;
        for (name, (lo, hi)) in [
            ("tr_single_band", t.tr_single_band),
            ("tr_multiband", t.tr_multiband),
            ("scan_depth_mm", t.scan_depth_mm),
        ] {
            if !(lo <= hi) {
                return Err(QcError::InvalidConfig(format!(
                    "thresholds.{name}: lower bound {lo} exceeds upper bound {hi}"
                )));
            }
        }
        if let Some(max) = t.max_duration_sec {
            if !(max >= t.min_duration_sec) {
                return Err(QcError::InvalidConfig(format!(
                    "thresholds.max_duration_sec ({max}) is below min_duration_sec ({})",
                    t.min_duration_sec
                )));
            }
        }
        if !(self.motion.head_radius_mm > 0.0) {
            return Err(QcError::InvalidConfig(
                "motion.head_radius_mm must be positive".into(),
            ));
        }
        Ok(())
    }
}

/// 读取 YAML 文件为通用值. 顶层必须是映射.
pub fn load_value<P: AsRef<Path>>(path: P) -> QcResult<Value> {
    let path = path.as_ref();
    if !path.is_file() {
        return Err(QcError::MissingInput(path.to_owned()));
    }
    let text = fs::read_to_string(path)?;
    parse_yaml_mapping(&text, &path.display().to_string())
}

fn parse_yaml_mapping(text: &str, origin: &str) -> QcResult<Value> {
    let value: Value = serde_yaml::from_str(text)?;
    match value {
        Value::Null => Ok(Value::Mapping(Default::default())),
        Value::Mapping(_) => Ok(value),
        _ => Err(QcError::InvalidConfig(format!(
            "config at {origin} is not a mapping at top level"
        ))),
    }
}

/// 按点分路径 (如 `"paths.fmriprep_output_dir"`) 取嵌套值.
pub fn get_value<'a>(cfg: &'a Value, key_path: &str) -> QcResult<&'a Value> {
    let mut cur = cfg;
    for part in key_path.split('.').filter(|p| !p.is_empty()) {
        cur = cur
            .as_mapping()
            .and_then(|m| m.get(part))
            .ok_or_else(|| QcError::ConfigKey(key_path.to_string()))?;
    }
    Ok(cur)
}

/// 渲染配置值供 shell 使用: 标量原样输出, 映射与序列输出为单行 JSON.
///
/// `null` 渲染为空串.
pub fn render_value(value: &Value) -> QcResult<String> {
    Ok(match value {
        Value::Null => String::new(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.clone(),
        _ => serde_json::to_string(value)?,
    })
}

/// 获取 `{用户主目录}/.qc-berry/config.yaml`.
pub fn home_config_path() -> Option<PathBuf> {
    let mut ans = dirs::home_dir()?;
    ans.push(".qc-berry");
    ans.push("config.yaml");
    Some(ans)
}

/// 解析配置文件路径.
///
/// 1. 若 `explicit` 非空, 直接返回之 (是否存在由调用者检查);
/// 2. 若环境变量 `$QC_BERRY_CONFIG` 非空, 返回其值;
/// 3. 若 `{用户主目录}/.qc-berry/config.yaml` 存在, 返回之;
/// 4. 否则返回 `None`, 表示使用内置默认值.
pub fn resolve_config_path(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(p) = explicit {
        return Some(p.to_owned());
    }
    match env::var(CONFIG_ENV) {
        Ok(p) if !p.is_empty() => Some(PathBuf::from(p)),
        _ => home_config_path().filter(|p| p.is_file()),
    }
}
