// ==========================================
// 科研数据入库引擎 - 单元格清洗
// ==========================================
// 职责: TRIM / 空值标准化（空串与 "nan" → 缺失）/ 分组键规范化
// ==========================================

use crate::domain::CellValue;

pub struct DataCleaner;

impl DataCleaner {
    /// 表头文本：仅 TRIM
    pub fn clean_text(&self, value: &str) -> String {
        value.trim().to_string()
    }

    /// 标准化 NULL 值（空白 / "nan" → None）
    pub fn normalize_null(&self, value: Option<String>) -> Option<String> {
        value.and_then(|v| {
            let trimmed = v.trim();
            if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("nan") {
                None
            } else {
                Some(trimmed.to_string())
            }
        })
    }

    /// 原始文本单元格 → 标准化取值
    pub fn normalize_cell(&self, raw: &str) -> Option<CellValue> {
        self.normalize_null(Some(raw.to_string()))
            .map(CellValue::Text)
    }

    /// 已类型化的取值再做一次空值标准化（文本需 TRIM，浮点 NaN 视为缺失）
    pub fn normalize_value(&self, value: CellValue) -> Option<CellValue> {
        match value {
            CellValue::Text(s) => self.normalize_cell(&s),
            CellValue::Float(f) if f.is_nan() => None,
            other => Some(other),
        }
    }

    /// 唯一性分组键：TRIM 后的文本，空值为 None
    pub fn grouping_key(&self, value: Option<&CellValue>) -> Option<String> {
        value
            .cloned()
            .and_then(|v| self.normalize_value(v))
            .map(|v| v.as_text())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_text_basic() {
        let cleaner = DataCleaner;
        assert_eq!(cleaner.clean_text("  Body Weight  "), "Body Weight");
        assert_eq!(cleaner.clean_text("\tName"), "Name");
    }

    #[test]
    fn test_normalize_null() {
        let cleaner = DataCleaner;
        assert_eq!(cleaner.normalize_null(Some("  ".to_string())), None);
        assert_eq!(cleaner.normalize_null(Some("NaN".to_string())), None);
        assert_eq!(cleaner.normalize_null(Some("nan".to_string())), None);
        assert_eq!(
            cleaner.normalize_null(Some("  value  ".to_string())),
            Some("value".to_string())
        );
        assert_eq!(cleaner.normalize_null(None), None);
    }

    #[test]
    fn test_normalize_value_float_nan() {
        let cleaner = DataCleaner;
        assert_eq!(cleaner.normalize_value(CellValue::Float(f64::NAN)), None);
        assert_eq!(
            cleaner.normalize_value(CellValue::Text(" x ".to_string())),
            Some(CellValue::Text("x".to_string()))
        );
    }

    #[test]
    fn test_grouping_key() {
        let cleaner = DataCleaner;
        let v = CellValue::Text(" lactate ".to_string());
        assert_eq!(cleaner.grouping_key(Some(&v)), Some("lactate".to_string()));
        assert_eq!(cleaner.grouping_key(None), None);
    }
}
