//! 分隔文本表.
//!
//! [`RawTable`] 不理解任何列的含义, 只负责按列名取值和原样读写.
//! 所有输出表都保留输入表的全部列与列序.

use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

use csv::{ReaderBuilder, WriterBuilder};

use crate::error::{QcError, QcResult};

/// 分隔符.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Delimiter {
    /// 制表符.
    Tab,

    /// 逗号.
    Comma,
}

impl Delimiter {
    /// 根据扩展名推断分隔符: `.tsv` 为制表符, 其余为逗号.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Self {
        match path.as_ref().extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("tsv") => Self::Tab,
            _ => Self::Comma,
        }
    }

    /// 对应的字节.
    #[inline]
    pub const fn as_byte(self) -> u8 {
        match self {
            Self::Tab => b'\t',
            Self::Comma => b',',
        }
    }
}

/// 字符串单元格组成的矩形表.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RawTable {
    name: String,
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl RawTable {
    /// 由列名和行构造. 行长度不足时以空串补齐, 过长时截断.
    pub fn new<N: Into<String>>(name: N, headers: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        let width = headers.len();
        let rows = rows
            .into_iter()
            .map(|mut r| {
                r.resize(width, String::new());
                r
            })
            .collect();
        Self {
            name: name.into(),
            headers,
            rows,
        }
    }

    /// 打开文件, 分隔符由扩展名推断.
    pub fn open<P: AsRef<Path>>(path: P) -> QcResult<Self> {
        let path = path.as_ref();
        Self::open_with(path, Delimiter::from_path(path))
    }

    /// 以给定分隔符打开文件.
    pub fn open_with<P: AsRef<Path>>(path: P, delimiter: Delimiter) -> QcResult<Self> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(QcError::MissingInput(path.to_owned()));
        }
        let file = File::open(path)?;
        Self::from_reader(path.display().to_string(), file, delimiter)
    }

    /// 从任意读取器解析.
    pub fn from_reader<N: Into<String>, R: Read>(
        name: N,
        rdr: R,
        delimiter: Delimiter,
    ) -> QcResult<Self> {
        let mut reader = ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .delimiter(delimiter.as_byte())
            .from_reader(rdr);

        let headers: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record?;
            rows.push(record.iter().map(str::to_string).collect());
        }
        Ok(Self::new(name, headers, rows))
    }

    /// 写入文件. 父目录不存在时自动创建.
    pub fn save<P: AsRef<Path>>(&self, path: P, delimiter: Delimiter) -> QcResult<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        self.write_to(File::create(path)?, delimiter)
    }

    /// 写入任意写入器.
    pub fn write_to<W: Write>(&self, w: W, delimiter: Delimiter) -> QcResult<()> {
        let mut writer = WriterBuilder::new()
            .delimiter(delimiter.as_byte())
            .from_writer(w);
        writer.write_record(&self.headers)?;
        for row in self.rows.iter() {
            writer.write_record(row)?;
        }
        writer.flush()?;
        Ok(())
    }

    /// 表的描述 (通常是来源路径).
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// 列名.
    #[inline]
    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    /// 所有行.
    #[inline]
    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    /// 行数.
    #[inline]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// 是否没有任何行.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// 查找列下标.
    #[inline]
    pub fn column(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }

    /// 查找必需列的下标. 不存在时返回配置错误.
    pub fn require(&self, name: &str) -> QcResult<usize> {
        self.column(name)
            .ok_or_else(|| QcError::missing_column(self.name.as_str(), name))
    }

    /// 第 `row` 行、第 `col` 列的值.
    #[inline]
    pub fn get(&self, row: usize, col: usize) -> Option<&str> {
        self.rows.get(row)?.get(col).map(String::as_str)
    }

    /// 消费自我, 获得列名与行.
    #[inline]
    pub fn into_parts(self) -> (String, Vec<String>, Vec<Vec<String>>) {
        (self.name, self.headers, self.rows)
    }
}

/// 单元格是否为缺失值 (空串或 pandas 风格的 `NaN`/`n/a`).
#[inline]
pub fn is_missing(cell: &str) -> bool {
    let c = cell.trim();
    c.is_empty() || c.eq_ignore_ascii_case("nan") || c.eq_ignore_ascii_case("n/a")
}

/// 解析数值单元格. 缺失或非数字时返回 `None`.
#[inline]
pub fn parse_f64(cell: &str) -> Option<f64> {
    if is_missing(cell) {
        None
    } else {
        cell.trim().parse().ok()
    }
}

/// 将可选浮点数渲染为单元格. `None` 与 `NaN` 都渲染为空串.
#[inline]
pub fn fmt_f64(v: Option<f64>) -> String {
    match v {
        Some(v) if !v.is_nan() => v.to_string(),
        _ => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "sub\tses\tavg_en\nsub-01\tses-M000\t-12.5\nsub-02\tses-M000\n";

    #[test]
    fn test_read_pads_short_rows() {
        let t = RawTable::from_reader("sample", SAMPLE.as_bytes(), Delimiter::Tab).unwrap();
        assert_eq!(t.len(), 2);
        assert_eq!(t.headers(), ["sub", "ses", "avg_en"]);
        assert_eq!(t.get(1, 2), Some(""));
        assert_eq!(t.column("ses"), Some(1));
    }

    #[test]
    fn test_require_reports_table_and_column() {
        let t = RawTable::from_reader("euler.tsv", SAMPLE.as_bytes(), Delimiter::Tab).unwrap();
        match t.require("site") {
            Err(QcError::MissingColumn { table, column }) => {
                assert_eq!(table, "euler.tsv");
                assert_eq!(column, "site");
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_write_round_trip_keeps_column_order() {
        let t = RawTable::from_reader("sample", SAMPLE.as_bytes(), Delimiter::Tab).unwrap();
        let mut buf = Vec::new();
        t.write_to(&mut buf, Delimiter::Tab).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert!(text.starts_with("sub\tses\tavg_en\n"));
        assert!(text.contains("sub-02\tses-M000\t\n"));
    }

    #[test]
    fn test_cells() {
        assert!(is_missing(" NaN "));
        assert!(is_missing("n/a"));
        assert_eq!(parse_f64("3.0"), Some(3.0));
        assert_eq!(parse_f64("abc"), None);
        assert_eq!(fmt_f64(Some(f64::NAN)), "");
        assert_eq!(fmt_f64(Some(0.5)), "0.5");
        assert_eq!(Delimiter::from_path("a/b.TSV"), Delimiter::Tab);
        assert_eq!(Delimiter::from_path("a/b.csv"), Delimiter::Comma);
    }
}
