//! 通用常量.

/// 采集参数阈值的默认值.
pub mod limits {
    /// 单带 (single-band) 协议的重复时间 (TR) 区间, 单位为秒, 两端闭合.
    pub const TR_SINGLE_BAND: (f64, f64) = (0.5, 1.0);

    /// 多带 (multiband) 协议的重复时间 (TR) 区间, 单位为秒, 两端闭合.
    pub const TR_MULTIBAND: (f64, f64) = (2.9, 3.1);

    /// 扫描深度 (`dim3 * pixdim3`) 区间, 单位为毫米, 两端闭合.
    pub const SCAN_DEPTH_MM: (f64, f64) = (155.0, 180.0);

    /// `PercentPhaseFOV` 必须严格大于该值.
    pub const MIN_PERCENT_PHASE_FOV: f64 = 72.0;

    /// 最短扫描时长 (TR × volumes), 单位为秒.
    pub const MIN_DURATION_SEC: f64 = 300.0;

    /// 非脑部线圈. 大小写敏感.
    pub const BAD_COILS: [&str; 2] = ["Q-Body", "BODY"];

    /// 已知有问题的采集 (BIDS 转换错误) 的 Image ID.
    pub const BAD_IMAGE_IDS: [i64; 4] = [1341794, 401073, 1636121, 1259845];
}

/// 头动质控与最终纳入的默认值.
pub mod motion {
    /// 将旋转位移 (弧度) 换算为弧长的头部半径, 单位为毫米.
    pub const HEAD_RADIUS_MM: f64 = 50.0;

    /// 高运动帧的 FD 阈值, 单位为毫米.
    pub const FD_THRESH_MM: f64 = 0.5;

    /// 平均 FD 超过该值的 run 将被排除.
    pub const FD_MEAN_THRESH_MM: f64 = 0.5;

    /// 高运动帧占比超过该值的 run 将被排除.
    pub const FD_PROP_THRESH: f64 = 0.30;
}

/// Euler 数提取与站点内离群检测的默认值.
pub mod euler {
    /// 中心化后的 `sqrt(-euler)` 超过该值即视为站点内离群.
    pub const OUTLIER_THRESH: f64 = 5.0;

    /// 从被试名推断站点时去掉的前缀.
    pub const SITE_PREFIX: &str = "sub-ADNI";

    /// 站点代码长度.
    pub const SITE_LEN: usize = 3;

    /// 日志中没有 Euler 数时调用的 FreeSurfer 程序.
    pub const MRIS_EULER_NUMBER: &str = "mris_euler_number";
}

/// 报告中按厂商分面统计时使用的厂商名.
pub const MANUFACTURERS: [&str; 3] = ["Philips", "Siemens", "GE"];

/// 序列化数组字段允许的最大元素个数, 与 NIfTI `dim`/`pixdim` 的 8 个元素一致.
pub const MAX_LIST_LEN: usize = 8;
