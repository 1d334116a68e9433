//! 序列化数组字段的严格解析.
//!
//! 只接受形如 `[1, 2.5, -3e2]` 或 `(1, 2, 3)` 的数字列表, 允许末尾逗号,
//! 其余任何内容都视为单行数据错误.

use crate::consts::MAX_LIST_LEN;
use crate::error::ListParseError;

/// 解析数字列表.
///
/// ```
/// use qc_berry::data::parse_number_list;
///
/// assert_eq!(parse_number_list("[0, 0, 0, 160, 300]").unwrap()[3], 160.0);
/// assert!(parse_number_list("__import__('os')").is_err());
/// ```
pub fn parse_number_list(s: &str) -> Result<Vec<f64>, ListParseError> {
    let s = s.trim();
    if s.is_empty() {
        return Err(ListParseError::Empty);
    }

    let inner = match (s.as_bytes()[0], s.as_bytes()[s.len() - 1]) {
        (b'[', b']') | (b'(', b')') if s.len() >= 2 => &s[1..s.len() - 1],
        _ => return Err(ListParseError::Unbracketed),
    };

    let inner = inner.trim();
    if inner.is_empty() {
        return Ok(Vec::new());
    }
    let inner = inner.strip_suffix(',').unwrap_or(inner);

    let mut ans = Vec::with_capacity(8);
    for item in inner.split(',') {
        if ans.len() == MAX_LIST_LEN {
            return Err(ListParseError::TooLong(MAX_LIST_LEN));
        }
        ans.push(parse_element(item.trim())?);
    }
    Ok(ans)
}

/// 取列表第 `index` 个元素.
#[inline]
pub fn nth(list: &[f64], index: usize) -> Result<f64, ListParseError> {
    list.get(index)
        .copied()
        .ok_or(ListParseError::TooShort(list.len(), index))
}

/// 将数字列表重新渲染为 [`parse_number_list`] 能接受的文本.
pub fn render_number_list<T: std::fmt::Display>(values: &[T]) -> String {
    use itertools::Itertools;
    format!("[{}]", values.iter().join(", "))
}

fn parse_element(item: &str) -> Result<f64, ListParseError> {
    // `f64::from_str` 会接受 "inf"/"nan" 等文本, 这里只放行普通数字.
    let plain = !item.is_empty()
        && item
            .bytes()
            .all(|b| b.is_ascii_digit() || matches!(b, b'+' | b'-' | b'.' | b'e' | b'E'))
        && item.bytes().any(|b| b.is_ascii_digit());
    if !plain {
        return Err(ListParseError::NotANumber(item.to_string()));
    }
    item.parse::<f64>()
        .map_err(|_| ListParseError::NotANumber(item.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plain_lists() {
        assert_eq!(
            parse_number_list("[0, 0, 0, 160, 300]").unwrap(),
            vec![0.0, 0.0, 0.0, 160.0, 300.0]
        );
        assert_eq!(
            parse_number_list(" (1.0, 2.5e1, -3,) ").unwrap(),
            vec![1.0, 25.0, -3.0]
        );
        assert_eq!(parse_number_list("[]").unwrap(), Vec::<f64>::new());
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert_eq!(parse_number_list(""), Err(ListParseError::Empty));
        assert_eq!(parse_number_list("1, 2"), Err(ListParseError::Unbracketed));
        assert_eq!(parse_number_list("[1, 2"), Err(ListParseError::Unbracketed));
        assert_eq!(
            parse_number_list("[1, nan]"),
            Err(ListParseError::NotANumber("nan".to_string()))
        );
        assert_eq!(
            parse_number_list("[1,,2]"),
            Err(ListParseError::NotANumber(String::new()))
        );
        assert!(parse_number_list("[1 2 3]").is_err());
        assert!(parse_number_list("[os.system('rm')]").is_err());

        let long = format!("[{}]", vec!["1"; MAX_LIST_LEN + 1].join(","));
        assert_eq!(
            parse_number_list(&long),
            Err(ListParseError::TooLong(MAX_LIST_LEN))
        );
    }

    #[test]
    fn test_list_len_matches_nifti_header() {
        assert_eq!(parse_number_list("[1, 2, 3, 4, 5, 6, 7, 8]").unwrap().len(), 8);
        assert_eq!(
            parse_number_list("[1, 2, 3, 4, 5, 6, 7, 8, 9]"),
            Err(ListParseError::TooLong(8))
        );
    }

    #[test]
    fn test_nth_and_render() {
        let v = parse_number_list("[1, 2]").unwrap();
        assert_eq!(nth(&v, 1), Ok(2.0));
        assert_eq!(nth(&v, 3), Err(ListParseError::TooShort(2, 3)));
        assert_eq!(render_number_list(&[3u16, 64, 64, 36]), "[3, 64, 64, 36]");
    }
}
