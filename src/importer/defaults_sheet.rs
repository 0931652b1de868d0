// ==========================================
// 科研数据入库引擎 - 外部默认值表
// ==========================================
// 职责: 从辅助表格读取 (工作表, 列名, 默认值) 记录
// 格式: 三列 "Sheet Name" / "Column Header" / "Default Value"
// ==========================================

use crate::domain::{CellValue, Dataset, Workbook};
use crate::importer::error::{ImportError, ImportResult};
use serde::{Deserialize, Serialize};

pub const DEFAULTS_SHEET_NAME: &str = "Defaults";
pub const SHEET_NAME_HEADER: &str = "Sheet Name";
pub const COLUMN_HEADER_HEADER: &str = "Column Header";
pub const DEFAULT_VALUE_HEADER: &str = "Default Value";

/// 一条外部默认值记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DefaultRecord {
    pub sheet: String,
    pub column: String,
    pub value: Option<CellValue>,
    /// 记录在默认值表中的零基行位置
    pub row_index: usize,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DefaultsSheet {
    /// 默认值表自身的来源（文件/工作表），用于诊断
    pub file: Option<String>,
    pub sheet: Option<String>,
    pub records: Vec<DefaultRecord>,
}

impl DefaultsSheet {
    /// 从数据集解析默认值记录
    ///
    /// 缺少工作表名或列名的记录被忽略；缺少三列表头之一视为结构错误。
    pub fn from_dataset(dataset: &Dataset) -> ImportResult<Self> {
        let missing: Vec<String> = [SHEET_NAME_HEADER, COLUMN_HEADER_HEADER, DEFAULT_VALUE_HEADER]
            .iter()
            .filter(|h| !dataset.has_column(h))
            .map(|h| h.to_string())
            .collect();
        if !missing.is_empty() {
            return Err(ImportError::MissingColumns {
                source_name: dataset
                    .sheet
                    .clone()
                    .or_else(|| dataset.file.clone())
                    .unwrap_or_else(|| DEFAULTS_SHEET_NAME.to_string()),
                columns: missing,
            });
        }

        let records = dataset
            .rows
            .iter()
            .filter_map(|row| {
                let sheet = row.get(SHEET_NAME_HEADER)?.as_text();
                let column = row.get(COLUMN_HEADER_HEADER)?.as_text();
                Some(DefaultRecord {
                    sheet,
                    column,
                    value: row.get(DEFAULT_VALUE_HEADER).cloned(),
                    row_index: row.index,
                })
            })
            .collect();

        Ok(Self {
            file: dataset.file.clone(),
            sheet: dataset.sheet.clone(),
            records,
        })
    }

    /// 从工作簿中取名为 Defaults 的工作表（不存在则返回 None）
    pub fn from_workbook(workbook: &Workbook) -> ImportResult<Option<Self>> {
        workbook
            .sheet(DEFAULTS_SHEET_NAME)
            .map(Self::from_dataset)
            .transpose()
    }

    /// 活动工作表对应的记录（保持源顺序）
    pub fn records_for<'a>(&'a self, sheet: &'a str) -> impl Iterator<Item = &'a DefaultRecord> {
        self.records.iter().filter(move |r| r.sheet == sheet)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Row;

    fn defaults_dataset() -> Dataset {
        Dataset::new(
            vec![
                SHEET_NAME_HEADER.to_string(),
                COLUMN_HEADER_HEADER.to_string(),
                DEFAULT_VALUE_HEADER.to_string(),
            ],
            vec![
                Row::from_pairs(
                    0,
                    [
                        (SHEET_NAME_HEADER, Some(CellValue::from("Animals"))),
                        (COLUMN_HEADER_HEADER, Some(CellValue::from("Diet"))),
                        (DEFAULT_VALUE_HEADER, Some(CellValue::from("chow"))),
                    ],
                ),
                Row::from_pairs(
                    1,
                    [
                        (SHEET_NAME_HEADER, Some(CellValue::from("Compounds"))),
                        (COLUMN_HEADER_HEADER, Some(CellValue::from("Formula"))),
                        (DEFAULT_VALUE_HEADER, None),
                    ],
                ),
            ],
        )
        .with_sheet(DEFAULTS_SHEET_NAME)
    }

    #[test]
    fn test_from_dataset_reads_records() {
        let defaults = DefaultsSheet::from_dataset(&defaults_dataset()).unwrap();
        assert_eq!(defaults.records.len(), 2);
        assert_eq!(defaults.records_for("Animals").count(), 1);
        assert_eq!(defaults.records[1].value, None);
    }

    #[test]
    fn test_from_dataset_missing_headers() {
        let dataset = Dataset::new(vec![SHEET_NAME_HEADER.to_string()], vec![]);
        let err = DefaultsSheet::from_dataset(&dataset).unwrap_err();
        match err {
            ImportError::MissingColumns { columns, .. } => {
                assert_eq!(columns, vec![COLUMN_HEADER_HEADER, DEFAULT_VALUE_HEADER]);
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }
}
