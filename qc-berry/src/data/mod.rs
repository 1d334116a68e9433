//! session 表: 原始分隔文本在进入核心逻辑之前的类型化边界.
//!
//! 字符串布尔值 ("TRUE"/"FALSE") 在这里被规范成 `bool`, 序列化数组在这里被严格解析,
//! 之后的启发式不再接触原始字符串.

use std::collections::{BTreeMap, BTreeSet};

use crate::config::{Field, FieldMap};
use crate::error::{ListParseError, QcError, QcResult};

mod list;
mod table;
pub mod visit;

pub use list::{nth, parse_number_list, render_number_list};
pub use table::{fmt_f64, is_missing, parse_f64, Delimiter, RawTable};

/// 已解析的数组字段. 缺失值解析为 `Err(ListParseError::Empty)`.
pub type ListCell = Result<Vec<f64>, ListParseError>;

/// 已解析的数值字段. 缺失为 `Ok(None)`, 有值但不是数字为 `Err(ListParseError::NonNumeric)`.
pub type NumCell = Result<Option<f64>, ListParseError>;

/// 一个 (被试, 访视) 的类型化 session 记录.
///
/// `row` 是该记录在原始输入表中的行号, 在一次运行中唯一且不变.
#[derive(Clone, Debug, PartialEq)]
pub struct SessionRecord {
    /// 原始行号 (从 0 开始, 不含表头).
    pub row: usize,
    /// 被试 ID.
    pub subject_id: String,
    /// 访视代码 (原文).
    pub visit_code: String,
    /// Image ID. 缺失或非整数时为 `None`.
    pub image_id: Option<i64>,
    /// NIfTI 是否存在.
    pub nifti_exists: bool,
    /// JSON sidecar 是否存在.
    pub json_exists: bool,
    /// T1w 是否存在.
    pub t1w_exists: bool,
    /// NIfTI `dim`.
    pub nifti_dim: ListCell,
    /// NIfTI `pixdim`.
    pub nifti_pixdim: ListCell,
    /// 重复时间, 秒.
    pub repetition_time: NumCell,
    /// 相位视野百分比.
    pub percent_phase_fov: NumCell,
    /// 线圈名.
    pub coil_string: Option<String>,
    /// 厂商名.
    pub manufacturer: Option<String>,
    cells: Vec<String>,
}

impl SessionRecord {
    /// 该记录的原始单元格, 与 [`SessionTable::headers`] 对齐.
    #[inline]
    pub fn cells(&self) -> &[String] {
        &self.cells
    }

    /// 行身份 `(subject_id, visit_code)`.
    #[inline]
    pub fn key(&self) -> (&str, &str) {
        (&self.subject_id, &self.visit_code)
    }
}

/// 把 "TRUE"/"FALSE" 风格 (大小写不敏感, 忽略首尾空白) 的单元格规范为布尔值.
/// 除 "TRUE" 以外的任何值都视为 `false`.
#[inline]
pub fn parse_flag(cell: &str) -> bool {
    cell.trim().eq_ignore_ascii_case("true")
}

/// 解析整数单元格. 兼容 pandas 把整数列写成 `123.0` 的情况.
pub fn parse_int(cell: &str) -> Option<i64> {
    let c = cell.trim();
    c.parse::<i64>().ok().or_else(|| {
        let f = parse_f64(c)?;
        (f.fract() == 0.0 && f.abs() < i64::MAX as f64).then_some(f as i64)
    })
}

/// 类型化的 session 表.
///
/// 行的顺序即输入顺序. 过滤只会删除行, 不会重排或新增.
#[derive(Clone, Debug, PartialEq)]
pub struct SessionTable {
    name: String,
    headers: Vec<String>,
    present: BTreeSet<Field>,
    records: Vec<SessionRecord>,
}

/// 列下标解析结果. 不存在的列取到的值一律为空串.
struct Columns(BTreeMap<Field, usize>);

impl Columns {
    fn resolve(raw: &RawTable, fields: &FieldMap) -> Self {
        Self(
            Field::ALL
                .iter()
                .filter_map(|f| raw.column(fields.column(*f)).map(|c| (*f, c)))
                .collect(),
        )
    }

    #[inline]
    fn get<'a>(&self, cells: &'a [String], field: Field) -> &'a str {
        self.0
            .get(&field)
            .and_then(|c| cells.get(*c))
            .map_or("", String::as_str)
    }

    #[inline]
    fn present(&self) -> BTreeSet<Field> {
        self.0.keys().copied().collect()
    }
}

fn non_missing(cell: &str) -> Option<String> {
    (!is_missing(cell)).then(|| cell.to_string())
}

impl SessionTable {
    /// 由原始表构造.
    ///
    /// 被试 ID 列与访视代码列是行身份的组成部分, 缺失时返回配置错误.
    /// 其余字段的列可以缺失, 由用到它们的启发式在运行前检查 (见 [`Self::require`]).
    pub fn ingest(raw: RawTable, fields: &FieldMap) -> QcResult<Self> {
        raw.require(&fields.subject_id)?;
        raw.require(&fields.visit_code)?;

        let cols = Columns::resolve(&raw, fields);
        let present = cols.present();
        let (name, headers, rows) = raw.into_parts();

        let records = rows
            .into_iter()
            .enumerate()
            .map(|(row, cells)| SessionRecord {
                row,
                subject_id: cols.get(&cells, Field::SubjectId).trim().to_string(),
                visit_code: cols.get(&cells, Field::VisitCode).trim().to_string(),
                image_id: parse_int(cols.get(&cells, Field::ImageId)),
                nifti_exists: parse_flag(cols.get(&cells, Field::NiftiExists)),
                json_exists: parse_flag(cols.get(&cells, Field::JsonExists)),
                t1w_exists: parse_flag(cols.get(&cells, Field::T1wExists)),
                nifti_dim: parse_list_cell(cols.get(&cells, Field::NiftiDim)),
                nifti_pixdim: parse_list_cell(cols.get(&cells, Field::NiftiPixdim)),
                repetition_time: parse_num_cell(cols.get(&cells, Field::RepetitionTime)),
                percent_phase_fov: parse_num_cell(cols.get(&cells, Field::PercentPhaseFov)),
                coil_string: non_missing(cols.get(&cells, Field::CoilString)),
                manufacturer: non_missing(cols.get(&cells, Field::Manufacturer)),
                cells,
            })
            .collect();

        Ok(Self {
            name,
            headers,
            present,
            records,
        })
    }

    /// 检查 `fields` 对应的列都存在于输入表中.
    pub fn require(&self, fields: &[Field], map: &FieldMap) -> QcResult<()> {
        match fields.iter().find(|f| !self.present.contains(*f)) {
            Some(f) => Err(QcError::missing_column(
                self.name.as_str(),
                map.column(*f),
            )),
            None => Ok(()),
        }
    }

    /// 表的描述 (通常是来源路径).
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// 原始列名.
    #[inline]
    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    /// 所有记录.
    #[inline]
    pub fn records(&self) -> &[SessionRecord] {
        &self.records
    }

    /// 按输入顺序迭代记录.
    #[inline]
    pub fn iter(&self) -> impl ExactSizeIterator<Item = &SessionRecord> {
        self.records.iter()
    }

    /// 行数.
    #[inline]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// 是否为空.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// 所有记录的原始行号.
    pub fn row_ids(&self) -> Vec<usize> {
        self.records.iter().map(|r| r.row).collect()
    }

    /// 不同被试的个数.
    pub fn subject_count(&self) -> usize {
        self.records
            .iter()
            .map(|r| r.subject_id.as_str())
            .collect::<BTreeSet<_>>()
            .len()
    }

    /// 按掩码把表切分为 `(保留, 丢弃)` 两部分. `true` 表示保留.
    ///
    /// `mask` 的长度必须与表的行数一致, 否则程序 panic.
    pub fn partition(&self, mask: &[bool]) -> (Self, Self) {
        assert_eq!(mask.len(), self.len(), "mask length mismatch");
        let (kept, dropped): (Vec<_>, Vec<_>) = self
            .records
            .iter()
            .zip(mask)
            .partition(|(_, keep)| **keep);
        (
            self.with_records(kept.into_iter().map(|(r, _)| r.clone()).collect()),
            self.with_records(dropped.into_iter().map(|(r, _)| r.clone()).collect()),
        )
    }

    /// 相同列结构的空表.
    #[inline]
    pub fn empty_like(&self) -> Self {
        self.with_records(Vec::new())
    }

    fn with_records(&self, records: Vec<SessionRecord>) -> Self {
        Self {
            name: self.name.clone(),
            headers: self.headers.clone(),
            present: self.present.clone(),
            records,
        }
    }

    /// 还原为原始表 (全部列, 输入列序).
    pub fn to_raw(&self) -> RawTable {
        RawTable::new(
            self.name.as_str(),
            self.headers.clone(),
            self.records.iter().map(|r| r.cells.clone()).collect(),
        )
    }
}

#[inline]
fn parse_list_cell(cell: &str) -> ListCell {
    if is_missing(cell) {
        Err(ListParseError::Empty)
    } else {
        parse_number_list(cell)
    }
}

#[inline]
fn parse_num_cell(cell: &str) -> NumCell {
    if is_missing(cell) {
        return Ok(None);
    }
    let c = cell.trim();
    c.parse()
        .map(Some)
        .map_err(|_| ListParseError::NonNumeric(c.to_string()))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// 测试用 anchor 表的列.
    pub(crate) const HEADERS: [&str; 12] = [
        "Image_ID",
        "Subject_ID",
        "VISCODE",
        "NIfTI_exists",
        "JSON_exists",
        "T1w_exists",
        "nifti_dim",
        "nifti_pixdim",
        "json_RepetitionTime",
        "json_PercentPhaseFOV",
        "json_CoilString",
        "json_Manufacturer",
    ];

    /// 一行各项均合格的 session: 深度 160, TR 3.0, 300 volumes.
    pub(crate) fn good_row(image_id: i64, subject: &str, visit: &str) -> Vec<String> {
        [
            image_id.to_string().as_str(),
            subject,
            visit,
            "TRUE",
            "TRUE",
            "TRUE",
            "[0, 0, 0, 160, 300]",
            "[0, 0, 0, 1.0, 0]",
            "3.0",
            "80",
            "HEAD",
            "Siemens",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect()
    }

    /// 把 `col` 列改为 `value`.
    pub(crate) fn with(mut row: Vec<String>, col: &str, value: &str) -> Vec<String> {
        let pos = HEADERS.iter().position(|h| *h == col).unwrap();
        row[pos] = value.to_string();
        row
    }

    pub(crate) fn table(rows: Vec<Vec<String>>) -> SessionTable {
        let raw = RawTable::new(
            "anchor.csv",
            HEADERS.iter().map(|s| s.to_string()).collect(),
            rows,
        );
        SessionTable::ingest(raw, &FieldMap::default()).unwrap()
    }

    #[test]
    fn test_ingest_normalises_cells() {
        let t = table(vec![
            with(good_row(7, "001_S_0001", "bl"), "NIfTI_exists", " true "),
            with(good_row(8, "001_S_0002", "m06"), "JSON_exists", "False"),
            with(good_row(9, "001_S_0003", "m12"), "nifti_dim", "[0, 0"),
        ]);
        let r = t.records();
        assert!(r[0].nifti_exists && r[0].json_exists);
        assert!(!r[1].json_exists);
        assert_eq!(r[0].image_id, Some(7));
        assert_eq!(r[0].nifti_dim.as_ref().unwrap()[4], 300.0);
        assert_eq!(r[2].nifti_dim, Err(ListParseError::Unbracketed));
        assert_eq!(r[0].coil_string.as_deref(), Some("HEAD"));
        assert_eq!(r[0].repetition_time, Ok(Some(3.0)));
        assert_eq!(r[2].row, 2);
        assert_eq!(t.subject_count(), 3);
    }

    #[test]
    fn test_ingest_numeric_cells() {
        let t = table(vec![
            with(good_row(1, "a", "bl"), "json_RepetitionTime", "3.0s"),
            with(good_row(2, "b", "bl"), "json_RepetitionTime", "NaN"),
            with(good_row(3, "c", "bl"), "json_PercentPhaseFOV", " eighty "),
        ]);
        let r = t.records();
        assert_eq!(r[0].repetition_time, Err(ListParseError::NonNumeric("3.0s".to_string())));
        assert_eq!(r[1].repetition_time, Ok(None));
        assert_eq!(r[2].percent_phase_fov, Err(ListParseError::NonNumeric("eighty".to_string())));
        assert_eq!(r[2].repetition_time, Ok(Some(3.0)));
    }

    #[test]
    fn test_ingest_requires_identity_columns() {
        let raw = RawTable::new("x.csv", vec!["Image_ID".into()], vec![]);
        assert!(matches!(
            SessionTable::ingest(raw, &FieldMap::default()),
            Err(QcError::MissingColumn { column, .. }) if column == "Subject_ID"
        ));
    }

    #[test]
    fn test_require_missing_optional_column() {
        let raw = RawTable::new(
            "x.csv",
            vec!["Subject_ID".into(), "VISCODE".into()],
            vec![vec!["a".into(), "bl".into()]],
        );
        let map = FieldMap::default();
        let t = SessionTable::ingest(raw, &map).unwrap();
        assert!(t.require(&[Field::SubjectId], &map).is_ok());
        assert!(matches!(
            t.require(&[Field::RepetitionTime], &map),
            Err(QcError::MissingColumn { column, .. }) if column == "json_RepetitionTime"
        ));
    }

    #[test]
    fn test_partition_is_complete() {
        let t = table(vec![
            good_row(1, "a", "bl"),
            good_row(2, "b", "bl"),
            good_row(3, "c", "bl"),
        ]);
        let (kept, dropped) = t.partition(&[true, false, true]);
        assert_eq!(kept.row_ids(), vec![0, 2]);
        assert_eq!(dropped.row_ids(), vec![1]);
        assert_eq!(kept.to_raw().headers(), t.headers());
    }

    #[test]
    fn test_parse_int_accepts_float_text() {
        assert_eq!(parse_int("1341794.0"), Some(1341794));
        assert_eq!(parse_int("12.5"), None);
        assert_eq!(parse_int(""), None);
    }
}
