//! BIDS 文件名实体与 fMRIPrep confounds 文件发现.

use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::error::{QcError, QcResult};

/// confounds 文件名后缀.
pub const CONFOUNDS_SUFFIX: &str = "_desc-confounds_timeseries.tsv";

/// 从文件名中解析出的 BIDS 实体. 每个值都保留前缀, 如 `sub-01`.
#[derive(Clone, Debug, Default, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct BidsEntities {
    /// `sub-*`.
    pub sub: Option<String>,
    /// `ses-*`.
    pub ses: Option<String>,
    /// `task-*`.
    pub task: Option<String>,
    /// `run-*`.
    pub run: Option<String>,
}

impl BidsEntities {
    /// 解析以 `_` 分隔的文件名. 后出现的同名实体覆盖先出现的.
    pub fn parse(file_name: &str) -> Self {
        let mut ans = Self::default();
        for token in file_name.split('_') {
            let slot = if token.starts_with("sub-") {
                &mut ans.sub
            } else if token.starts_with("ses-") {
                &mut ans.ses
            } else if token.starts_with("task-") {
                &mut ans.task
            } else if token.starts_with("run-") {
                &mut ans.run
            } else {
                continue;
            };
            *slot = Some(token.to_string());
        }
        ans
    }

    /// 解析路径的文件名部分.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Self {
        path.as_ref()
            .file_name()
            .and_then(|n| n.to_str())
            .map(Self::parse)
            .unwrap_or_default()
    }

    /// 四个实体, 缺失者为空串. 顺序为 `sub, ses, task, run`.
    pub fn cells(&self) -> [String; 4] {
        [&self.sub, &self.ses, &self.task, &self.run].map(|e| e.clone().unwrap_or_default())
    }
}

#[inline]
fn name_has_prefix(p: &Path, prefix: &str) -> bool {
    p.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.starts_with(prefix))
}

/// 查找 `{root}/sub-*/ses-*/func/*_desc-confounds_timeseries.tsv`, 按路径排序.
///
/// 一个文件也没有找到时返回错误.
pub fn find_confounds<P: AsRef<Path>>(root: P) -> QcResult<Vec<PathBuf>> {
    let root = root.as_ref();
    if !root.is_dir() {
        return Err(QcError::MissingInput(root.to_owned()));
    }

    let mut ans: Vec<PathBuf> = WalkDir::new(root)
        .min_depth(4)
        .max_depth(4)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .filter(|p| {
            let Ok(rel) = p.strip_prefix(root) else {
                return false;
            };
            let parts: Vec<&Path> = rel.ancestors().skip(1).collect();
            // parts: [sub/ses/func, sub/ses, sub, ""]
            parts.len() == 4
                && name_has_prefix(parts[2], "sub-")
                && name_has_prefix(parts[1], "ses-")
                && parts[0].file_name().is_some_and(|n| n == "func")
                && p.file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.ends_with(CONFOUNDS_SUFFIX))
        })
        .collect();

    if ans.is_empty() {
        return Err(QcError::NoConfounds(root.to_owned()));
    }
    ans.sort();
    log::debug!("Found {} confounds files under {}", ans.len(), root.display());
    Ok(ans)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_parse_entities() {
        let e = BidsEntities::parse("sub-ADNI941S7074_ses-M012_task-rest_run-01_desc-confounds_timeseries.tsv");
        assert_eq!(e.sub.as_deref(), Some("sub-ADNI941S7074"));
        assert_eq!(e.ses.as_deref(), Some("ses-M012"));
        assert_eq!(e.task.as_deref(), Some("task-rest"));
        assert_eq!(e.run.as_deref(), Some("run-01"));

        let e = BidsEntities::parse("sub-01_task-rest_desc-confounds_timeseries.tsv");
        assert_eq!(e.cells(), ["sub-01", "", "task-rest", ""]);
    }

    #[test]
    fn test_find_confounds_matches_layout_only() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        let touch = |rel: &str| {
            let p = root.join(rel);
            fs::create_dir_all(p.parent().unwrap()).unwrap();
            fs::write(p, "framewise_displacement\n0\n").unwrap();
        };
        touch("sub-02/ses-M000/func/sub-02_ses-M000_task-rest_desc-confounds_timeseries.tsv");
        touch("sub-01/ses-M000/func/sub-01_ses-M000_task-rest_desc-confounds_timeseries.tsv");
        touch("sub-01/ses-M000/anat/sub-01_ses-M000_desc-confounds_timeseries.tsv");
        touch("sub-01/func/sub-01_task-rest_desc-confounds_timeseries.tsv");
        touch("sub-01/ses-M000/func/sub-01_ses-M000_task-rest_bold.nii.gz");
        touch("logs/ses-x/func/a_desc-confounds_timeseries.tsv");

        let found = find_confounds(root).unwrap();
        assert_eq!(found.len(), 2);
        assert!(found[0].ends_with("sub-01_ses-M000_task-rest_desc-confounds_timeseries.tsv"));
    }

    #[test]
    fn test_find_confounds_empty_is_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(find_confounds(dir.path()), Err(QcError::NoConfounds(_))));
        assert!(matches!(
            find_confounds(dir.path().join("nope")),
            Err(QcError::MissingInput(_))
        ));
    }
}
