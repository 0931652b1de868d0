// ==========================================
// 科研数据入库引擎 - 数据集模型
// ==========================================
// 职责: 表格读取结果的内存表示（行、工作表、工作簿）
// 约定: Row.index 为数据行在源文件中的零基位置
// ==========================================

use crate::domain::types::CellValue;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ==========================================
// Row - 数据行
// ==========================================
// 缺失值不入 map：空串 / "nan" 在读取阶段已被归一为缺失
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Row {
    pub index: usize,
    values: BTreeMap<String, CellValue>,
}

impl Row {
    pub fn new(index: usize) -> Self {
        Self {
            index,
            values: BTreeMap::new(),
        }
    }

    /// 以 (列名, 值) 序列构造一行，None 视为缺失
    pub fn from_pairs<I, K>(index: usize, pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, Option<CellValue>)>,
        K: Into<String>,
    {
        let mut row = Row::new(index);
        for (name, value) in pairs {
            row.set(name, value);
        }
        row
    }

    pub fn get(&self, column: &str) -> Option<&CellValue> {
        self.values.get(column)
    }

    pub fn has_value(&self, column: &str) -> bool {
        self.values.contains_key(column)
    }

    pub fn set(&mut self, column: impl Into<String>, value: Option<CellValue>) {
        let column = column.into();
        match value {
            Some(v) => {
                self.values.insert(column, v);
            }
            None => {
                self.values.remove(&column);
            }
        }
    }

    pub fn is_blank(&self) -> bool {
        self.values.is_empty()
    }

    pub fn values(&self) -> &BTreeMap<String, CellValue> {
        &self.values
    }
}

// ==========================================
// Dataset - 单个工作表 / CSV 文件
// ==========================================
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Dataset {
    /// 工作表名（CSV 为 None）
    pub sheet: Option<String>,
    /// 源文件标识（用于诊断定位）
    pub file: Option<String>,
    /// 表头（保持源文件顺序）
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
}

impl Dataset {
    pub fn new(columns: Vec<String>, rows: Vec<Row>) -> Self {
        Self {
            sheet: None,
            file: None,
            columns,
            rows,
        }
    }

    pub fn with_sheet(mut self, sheet: impl Into<String>) -> Self {
        self.sheet = Some(sheet.into());
        self
    }

    pub fn with_file(mut self, file: impl Into<String>) -> Self {
        self.file = Some(file.into());
        self
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c == name)
    }
}

// ==========================================
// Workbook - 多工作表输入
// ==========================================
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Workbook {
    pub file: Option<String>,
    pub sheets: Vec<Dataset>,
}

impl Workbook {
    pub fn sheet(&self, name: &str) -> Option<&Dataset> {
        self.sheets
            .iter()
            .find(|s| s.sheet.as_deref() == Some(name))
    }

    pub fn sheet_names(&self) -> Vec<String> {
        self.sheets.iter().filter_map(|s| s.sheet.clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_set_none_removes_value() {
        let mut row = Row::from_pairs(0, [("Name", Some(CellValue::from("glucose")))]);
        assert!(row.has_value("Name"));
        row.set("Name", None);
        assert!(!row.has_value("Name"));
        assert!(row.is_blank());
    }

    #[test]
    fn test_workbook_sheet_lookup() {
        let book = Workbook {
            file: Some("study.xlsx".to_string()),
            sheets: vec![
                Dataset::new(vec!["Name".to_string()], vec![]).with_sheet("Compounds"),
                Dataset::new(vec!["Animal Name".to_string()], vec![]).with_sheet("Animals"),
            ],
        };
        assert!(book.sheet("Animals").is_some());
        assert!(book.sheet("Tissues").is_none());
        assert_eq!(book.sheet_names(), vec!["Compounds", "Animals"]);
    }
}
