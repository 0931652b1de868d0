// ==========================================
// 科研数据入库引擎 - 导入层
// ==========================================
// 职责: 外部表格读取，生成内存数据集
// 支持: Excel, CSV, TSV
// ==========================================

pub mod data_cleaner;
pub mod defaults_sheet;
pub mod error;
pub mod file_parser;

pub use data_cleaner::DataCleaner;
pub use defaults_sheet::{DefaultRecord, DefaultsSheet, DEFAULTS_SHEET_NAME};
pub use error::{ImportError, ImportResult};
pub use file_parser::{CsvParser, ExcelParser, FileParser, UniversalFileParser};
