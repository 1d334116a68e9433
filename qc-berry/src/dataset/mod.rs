//! 数据集目录操作.
//!
//! 1. [`bids`]: fMRIPrep derivatives 下的 confounds 文件发现与 BIDS 实体解析;
//! 2. [`freesurfer`]: FreeSurfer `SUBJECTS_DIR` 下的 Euler 数提取;
//! 3. [`fmriprep`]: fMRIPrep 日志与 crashfile 的失败归类;
//! 4. [`probe`]: session 目录内结构像 NIfTI 的 header 探查.

use std::path::{Path, PathBuf};

pub mod bids;
pub mod fmriprep;
pub mod freesurfer;
pub mod probe;

/// 获取 `{用户主目录}/dataset` 目录.
pub fn home_dataset_dir() -> Option<PathBuf> {
    let mut ans = dirs::home_dir()?;
    ans.push("dataset");
    Some(ans)
}

/// 获取 `{用户主目录}/dataset` 目录下给定继续项组成的全路径.
pub fn home_dataset_dir_with<P: AsRef<Path>, I: IntoIterator<Item = P>>(it: I) -> Option<PathBuf> {
    let mut ans = home_dataset_dir()?;
    ans.extend(it);
    Some(ans)
}
