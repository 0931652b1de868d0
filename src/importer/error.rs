// ==========================================
// 科研数据入库引擎 - 文件读取错误类型
// ==========================================
// 工具: thiserror 派生宏
// 说明: 仅覆盖"读文件"阶段；数据层面的问题走诊断汇总，不走这里
// ==========================================

use thiserror::Error;

/// 文件读取错误类型
#[derive(Error, Debug)]
pub enum ImportError {
    // ===== 文件相关错误 =====
    #[error("文件不存在: {0}")]
    FileNotFound(String),

    #[error("文件格式不支持: {0}（仅支持 .xlsx/.xls/.csv/.tsv）")]
    UnsupportedFormat(String),

    #[error("文件读取失败: {0}")]
    FileReadError(String),

    #[error("Excel 解析失败: {0}")]
    ExcelParseError(String),

    #[error("CSV 解析失败: {0}")]
    CsvParseError(String),

    // ===== 结构错误 =====
    #[error("文件无表头: {0}")]
    MissingHeaderRow(String),

    #[error("缺少必需列 {columns:?}（{source_name}）")]
    MissingColumns {
        source_name: String,
        columns: Vec<String>,
    },

    #[error("工作表不存在: {sheet}（文件 {file}）")]
    SheetNotFound { file: String, sheet: String },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl From<std::io::Error> for ImportError {
    fn from(err: std::io::Error) -> Self {
        ImportError::FileReadError(err.to_string())
    }
}

impl From<csv::Error> for ImportError {
    fn from(err: csv::Error) -> Self {
        ImportError::CsvParseError(err.to_string())
    }
}

impl From<calamine::Error> for ImportError {
    fn from(err: calamine::Error) -> Self {
        ImportError::ExcelParseError(err.to_string())
    }
}

/// Result 类型别名
pub type ImportResult<T> = Result<T, ImportError>;
