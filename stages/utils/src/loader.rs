//! 对 `qc-berry::config` 与 `qc-berry::dataset` 的更一层封装. 提供命令行程序直接使用的路径与配置.

use std::env;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use qc_berry::config::{self, QcConfig};

/// 加载配置.
///
/// 1. 若 `explicit` 非空, 读取该文件 (不存在时报错);
/// 2. 若环境变量 `$QC_BERRY_CONFIG` 非空, 读取其值 (不存在时报错);
/// 3. 若 `$HOME/.qc-berry/config.yaml` 存在, 读取之;
/// 4. 否则使用内置默认值.
pub fn load_config(explicit: Option<&Path>) -> anyhow::Result<QcConfig> {
    match config::resolve_config_path(explicit) {
        Some(p) => {
            log::debug!("Loading config from {}", p.display());
            QcConfig::open(&p).with_context(|| format!("failed to load config {}", p.display()))
        }
        None => {
            log::debug!("No config file found, using built-in defaults");
            Ok(QcConfig::default())
        }
    }
}

/// 获取 fMRIPrep derivatives 目录.
///
/// 1. 若 `explicit` 非空, 返回之;
/// 2. 若环境变量 `$QC_DERIVATIVES_DIR` 非空, 返回其值;
/// 3. 否则, 返回 `$HOME/dataset/derivatives`.
pub fn derivatives_dir_from_env_or_home(explicit: Option<&Path>) -> anyhow::Result<PathBuf> {
    from_env_or_home(explicit, "QC_DERIVATIVES_DIR", &["derivatives"])
}

/// 获取 FreeSurfer `SUBJECTS_DIR`.
///
/// 1. 若 `explicit` 非空, 返回之;
/// 2. 若环境变量 `$SUBJECTS_DIR` 非空, 返回其值;
/// 3. 否则, 返回 `$HOME/dataset/derivatives/freesurfer`.
pub fn freesurfer_dir_from_env_or_home(explicit: Option<&Path>) -> anyhow::Result<PathBuf> {
    from_env_or_home(explicit, "SUBJECTS_DIR", &["derivatives", "freesurfer"])
}

fn from_env_or_home(explicit: Option<&Path>, var: &str, home: &[&str]) -> anyhow::Result<PathBuf> {
    if let Some(p) = explicit {
        return Ok(p.to_owned());
    }
    match env::var(var) {
        Ok(d) if !d.is_empty() => Ok(PathBuf::from(d)),
        _ => match qc_berry::dataset::home_dataset_dir_with(home) {
            Some(p) => Ok(p),
            None => bail!("cannot locate home directory; pass the path explicitly or set ${var}"),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_explicit_config_must_exist() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_config(Some(dir.path().join("missing.yaml").as_path())).is_err());

        let p = dir.path().join("qc.yaml");
        std::fs::write(&p, "inclusion:\n  fd_mean_thresh: 0.2\n").unwrap();
        let cfg = load_config(Some(p.as_path())).unwrap();
        assert_eq!(cfg.inclusion.fd_mean_thresh, 0.2);
    }

    #[test]
    fn test_explicit_dir_wins() {
        let p = Path::new("/data/fs");
        assert_eq!(freesurfer_dir_from_env_or_home(Some(p)).unwrap(), p);
    }
}
