// ==========================================
// 科研数据入库引擎 - 领域层
// ==========================================
// 职责: 与存储、校验无关的纯数据类型
// ==========================================

pub mod dataset;
pub mod types;

pub use dataset::{Dataset, Row, Workbook};
pub use types::{CellValue, ColumnKind};
