//! session 目录内结构像的 header 探查.
//!
//! 只读取 NIfTI header, 不加载体数据.

use std::fs;
use std::path::{Path, PathBuf};

use nifti::NiftiHeader;

use crate::data::render_number_list;
use crate::error::QcResult;

/// 一个结构像文件的 header 摘要.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct HeaderSummary {
    /// `dim` 数组.
    pub dim: [u16; 8],
    /// `pixdim` 数组.
    pub pixdim: [f32; 8],
}

impl HeaderSummary {
    /// 从 header 构造.
    #[inline]
    pub fn from_header(h: &NiftiHeader) -> Self {
        Self {
            dim: h.dim,
            pixdim: h.pixdim,
        }
    }

    /// 读取文件 header. `.nii.gz` 自动解压.
    pub fn open<P: AsRef<Path>>(path: P) -> QcResult<Self> {
        let h = NiftiHeader::from_file(path)?;
        Ok(Self::from_header(&h))
    }

    /// 空间三维尺寸 `dim1..=dim3`.
    #[inline]
    pub fn shape(&self) -> [u16; 3] {
        let [_, x, y, z, ..] = self.dim;
        [x, y, z]
    }

    /// 空间三维体素尺寸 `pixdim1..=pixdim3`.
    #[inline]
    pub fn spacing(&self) -> [f32; 3] {
        let [_, x, y, z, ..] = self.pixdim;
        [x, y, z]
    }

    /// `dim` 的文本形式, 只保留 `dim[0] + 1` 个元素.
    ///
    /// 输出可以被 anchor 表的数组字段解析器直接读取.
    pub fn dim_text(&self) -> String {
        let n = (self.dim[0] as usize + 1).min(8);
        render_number_list(&self.dim[..n])
    }

    /// `pixdim` 的文本形式, 长度与 [`HeaderSummary::dim_text`] 相同.
    pub fn pixdim_text(&self) -> String {
        let n = (self.dim[0] as usize + 1).min(8);
        render_number_list(&self.pixdim[..n])
    }
}

/// 某模态的探查结果.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ProbeResult {
    /// 找到的文件.
    pub path: Option<PathBuf>,
    /// header 摘要. 文件不存在或 header 不可读时为 `None`.
    pub header: Option<HeaderSummary>,
}

impl ProbeResult {
    /// 是否找到了文件.
    #[inline]
    pub fn exists(&self) -> bool {
        self.path.is_some()
    }
}

/// 结构像探查器.
#[derive(Clone, Debug)]
pub struct StructuralProbe {
    folders: Vec<String>,
}

impl Default for StructuralProbe {
    fn default() -> Self {
        Self::new(["anat"])
    }
}

impl StructuralProbe {
    /// 在 session 目录的给定子目录中依次查找.
    pub fn new<S: Into<String>, I: IntoIterator<Item = S>>(folders: I) -> Self {
        Self {
            folders: folders.into_iter().map(Into::into).collect(),
        }
    }

    /// 查找第一个 `*{modality}.nii.gz` 或 `*{modality}.nii` 文件.
    ///
    /// 同一目录内按文件名排序, 优先 `.nii.gz`.
    pub fn find<P: AsRef<Path>>(&self, session_dir: P, modality: &str) -> Option<PathBuf> {
        let gz = format!("{modality}.nii.gz");
        let plain = format!("{modality}.nii");
        for folder in self.folders.iter() {
            let Ok(rd) = fs::read_dir(session_dir.as_ref().join(folder)) else {
                continue;
            };
            let mut files: Vec<PathBuf> = rd
                .filter_map(|e| e.ok())
                .map(|e| e.path())
                .filter(|p| p.is_file())
                .collect();
            files.sort();
            for suffix in [&gz, &plain] {
                if let Some(p) = files.iter().find(|p| {
                    p.file_name()
                        .and_then(|n| n.to_str())
                        .is_some_and(|n| n.ends_with(suffix.as_str()))
                }) {
                    return Some(p.clone());
                }
            }
        }
        None
    }

    /// 探查某模态. header 读取失败只记录警告.
    pub fn probe<P: AsRef<Path>>(&self, session_dir: P, modality: &str) -> ProbeResult {
        let Some(path) = self.find(session_dir, modality) else {
            return ProbeResult::default();
        };
        let header = match HeaderSummary::open(&path) {
            Ok(h) => Some(h),
            Err(e) => {
                log::warn!("Failed to read NIfTI header {}: {e}", path.display());
                None
            }
        };
        ProbeResult {
            path: Some(path),
            header,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 构造一个最小的 NIfTI-1 单文件 header (小端, 348 字节 + 4 字节扩展标记).
    fn fake_nii(dim: [i16; 8], pixdim: [f32; 8]) -> Vec<u8> {
        let mut buf = vec![0u8; 352];
        buf[0..4].copy_from_slice(&348i32.to_le_bytes());
        for (i, d) in dim.iter().enumerate() {
            buf[40 + 2 * i..42 + 2 * i].copy_from_slice(&d.to_le_bytes());
        }
        // datatype = 2 (u8), bitpix = 8
        buf[70..72].copy_from_slice(&2i16.to_le_bytes());
        buf[72..74].copy_from_slice(&8i16.to_le_bytes());
        for (i, p) in pixdim.iter().enumerate() {
            buf[76 + 4 * i..80 + 4 * i].copy_from_slice(&p.to_le_bytes());
        }
        buf[108..112].copy_from_slice(&352f32.to_le_bytes());
        buf[344..348].copy_from_slice(b"n+1\0");
        buf
    }

    #[test]
    fn test_header_text_matches_list_grammar() {
        let h = HeaderSummary {
            dim: [3, 176, 240, 256, 1, 1, 1, 1],
            pixdim: [1.0, 1.2, 1.0, 1.0, 0.0, 0.0, 0.0, 0.0],
        };
        assert_eq!(h.dim_text(), "[3, 176, 240, 256]");
        assert_eq!(h.pixdim_text(), "[1, 1.2, 1, 1]");
        assert_eq!(crate::data::parse_number_list(&h.dim_text()).unwrap()[3], 256.0);
        assert_eq!(h.shape(), [176, 240, 256]);
    }

    #[test]
    fn test_probe_reads_header_only() {
        let dir = tempfile::tempdir().unwrap();
        let anat = dir.path().join("anat");
        fs::create_dir_all(&anat).unwrap();
        fs::write(
            anat.join("sub-01_ses-M000_T1w.nii"),
            fake_nii([3, 4, 4, 160, 1, 1, 1, 1], [1.0, 1.0, 1.0, 1.0, 0.0, 0.0, 0.0, 0.0]),
        )
        .unwrap();
        fs::write(anat.join("sub-01_ses-M000_FLAIR.nii.gz"), b"not gzip").unwrap();

        let probe = StructuralProbe::default();
        let t1 = probe.probe(dir.path(), "T1w");
        assert!(t1.exists());
        let h = t1.header.unwrap();
        assert_eq!(h.shape(), [4, 4, 160]);
        assert_eq!(h.spacing(), [1.0, 1.0, 1.0]);

        let flair = probe.probe(dir.path(), "FLAIR");
        assert!(flair.exists());
        assert!(flair.header.is_none());

        assert!(!probe.probe(dir.path(), "T2w").exists());
    }
}
