// ==========================================
// 科研数据入库引擎 - 文件解析器实现
// ==========================================
// 支持: Excel (.xlsx/.xls，全部工作表) / CSV (.csv) / TSV (.tsv)
// 输出: Workbook（每个工作表一个 Dataset，CSV 仅一个且无工作表名）
// 约定: 完全空白的行被丢弃，但其余行的 index 保持源文件位置
// ==========================================

use crate::domain::{CellValue, Dataset, Row, Workbook};
use crate::importer::data_cleaner::DataCleaner;
use crate::importer::error::{ImportError, ImportResult};
use calamine::{open_workbook_auto, Data, Reader};
use csv::ReaderBuilder;
use std::path::Path;
use tracing::{debug, info};

// ==========================================
// FileParser Trait
// ==========================================
pub trait FileParser: Send + Sync {
    /// 解析文件为工作簿
    ///
    /// # 返回
    /// - Ok(Workbook): 按源顺序排列的工作表
    /// - Err: 文件不存在、格式错误、无表头
    fn parse(&self, file_path: &Path) -> ImportResult<Workbook>;
}

fn ensure_exists(path: &Path) -> ImportResult<()> {
    if !path.exists() {
        return Err(ImportError::FileNotFound(path.display().to_string()));
    }
    Ok(())
}

fn extension_of(path: &Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase()
}

/// 记录起始行号（1 起）
///
/// csv 给出的位置停在上一条记录之后，其后的空行不计入，这里逐字节跳过
fn record_start_line(content: &[u8], pos: &csv::Position) -> u64 {
    let mut line = pos.line();
    let mut at = pos.byte() as usize;
    while let Some(&b) = content.get(at) {
        match b {
            b'\n' => line += 1,
            b'\r' => {}
            _ => break,
        }
        at += 1;
    }
    line
}

// ==========================================
// CSV Parser 实现
// ==========================================
pub struct CsvParser {
    delimiter: u8,
}

impl CsvParser {
    pub fn new() -> Self {
        Self { delimiter: b',' }
    }

    pub fn tab_separated() -> Self {
        Self { delimiter: b'\t' }
    }
}

impl Default for CsvParser {
    fn default() -> Self {
        Self::new()
    }
}

impl FileParser for CsvParser {
    fn parse(&self, file_path: &Path) -> ImportResult<Workbook> {
        ensure_exists(file_path)?;

        let ext = extension_of(file_path);
        if ext != "csv" && ext != "tsv" && ext != "txt" {
            return Err(ImportError::UnsupportedFormat(ext));
        }

        let cleaner = DataCleaner;
        let content = std::fs::read(file_path)?;
        let mut reader = ReaderBuilder::new()
            .has_headers(true)
            .flexible(true) // 允许行长度不一致
            .delimiter(self.delimiter)
            .from_reader(content.as_slice());

        let header_record = reader.headers()?.clone();
        let headers: Vec<String> = header_record
            .iter()
            .map(|h| cleaner.clean_text(h))
            .collect();
        if headers.iter().all(|h| h.is_empty()) {
            return Err(ImportError::MissingHeaderRow(file_path.display().to_string()));
        }
        let header_line = header_record
            .position()
            .map(|p| record_start_line(&content, p))
            .unwrap_or(1);

        let mut rows = Vec::new();
        let mut next_index = 0usize;
        for result in reader.records() {
            let record = result?;
            // csv 会静默跳过空行，行号须按源文件位置计算
            let line_index = record
                .position()
                .map(|p| record_start_line(&content, p).saturating_sub(header_line + 1) as usize)
                .unwrap_or(next_index);
            let row_idx = line_index.max(next_index);
            next_index = row_idx + 1;

            let mut row = Row::new(row_idx);
            for (col_idx, value) in record.iter().enumerate() {
                if let Some(header) = headers.get(col_idx) {
                    if !header.is_empty() {
                        row.set(header.clone(), cleaner.normalize_cell(value));
                    }
                }
            }
            if row.is_blank() {
                continue;
            }
            rows.push(row);
        }

        let file = file_path.display().to_string();
        debug!(file = %file, rows = rows.len(), "CSV 解析完成");

        let columns = headers.into_iter().filter(|h| !h.is_empty()).collect();
        Ok(Workbook {
            file: Some(file.clone()),
            sheets: vec![Dataset::new(columns, rows).with_file(file)],
        })
    }
}

// ==========================================
// Excel Parser 实现
// ==========================================
pub struct ExcelParser;

impl ExcelParser {
    fn convert_cell(cleaner: &DataCleaner, cell: &Data) -> Option<CellValue> {
        match cell {
            Data::Empty => None,
            Data::Int(v) => Some(CellValue::Integer(*v)),
            Data::Float(v) => cleaner.normalize_value(CellValue::Float(*v)),
            Data::Bool(v) => Some(CellValue::Bool(*v)),
            Data::String(s) => cleaner.normalize_cell(s),
            other => cleaner.normalize_cell(&other.to_string()),
        }
    }
}

impl FileParser for ExcelParser {
    fn parse(&self, file_path: &Path) -> ImportResult<Workbook> {
        ensure_exists(file_path)?;

        let ext = extension_of(file_path);
        if ext != "xlsx" && ext != "xls" {
            return Err(ImportError::UnsupportedFormat(ext));
        }

        let cleaner = DataCleaner;
        let file = file_path.display().to_string();
        let mut workbook = open_workbook_auto(file_path)?;

        let sheet_names = workbook.sheet_names();
        if sheet_names.is_empty() {
            return Err(ImportError::ExcelParseError(format!("Excel 文件无工作表: {}", file)));
        }

        let mut sheets = Vec::new();
        for sheet_name in sheet_names {
            let range = workbook.worksheet_range(&sheet_name)?;
            let mut raw_rows = range.rows();

            // 空工作表：保留一个无列的数据集，由表头校验给出诊断
            let headers: Vec<String> = match raw_rows.next() {
                Some(header_row) => header_row
                    .iter()
                    .map(|cell| cleaner.clean_text(&cell.to_string()))
                    .collect(),
                None => Vec::new(),
            };

            let mut rows = Vec::new();
            for (row_idx, data_row) in raw_rows.enumerate() {
                let mut row = Row::new(row_idx);
                for (col_idx, cell) in data_row.iter().enumerate() {
                    if let Some(header) = headers.get(col_idx) {
                        if !header.is_empty() {
                            row.set(header.clone(), Self::convert_cell(&cleaner, cell));
                        }
                    }
                }
                if row.is_blank() {
                    continue;
                }
                rows.push(row);
            }

            debug!(file = %file, sheet = %sheet_name, rows = rows.len(), "工作表解析完成");
            let columns = headers.into_iter().filter(|h| !h.is_empty()).collect();
            sheets.push(
                Dataset::new(columns, rows)
                    .with_sheet(sheet_name)
                    .with_file(file.clone()),
            );
        }

        Ok(Workbook {
            file: Some(file),
            sheets,
        })
    }
}

// ==========================================
// 通用文件解析器（根据扩展名自动选择）
// ==========================================
pub struct UniversalFileParser;

impl UniversalFileParser {
    pub fn parse<P: AsRef<Path>>(&self, file_path: P) -> ImportResult<Workbook> {
        let path = file_path.as_ref();
        let ext = extension_of(path);

        let workbook = match ext.as_str() {
            "csv" => CsvParser::new().parse(path)?,
            "tsv" => CsvParser::tab_separated().parse(path)?,
            "xlsx" | "xls" => ExcelParser.parse(path)?,
            _ => return Err(ImportError::UnsupportedFormat(ext)),
        };

        info!(
            file = %path.display(),
            sheets = workbook.sheets.len(),
            "文件解析完成"
        );
        Ok(workbook)
    }

}
