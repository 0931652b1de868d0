// ==========================================
// 科研数据入库引擎 - 核心库
// ==========================================
// 技术栈: Rust + SQLite + calamine/csv
// 系统定位: 将人工维护的表格（Excel/CSV）按声明式加载器校验后写入关系库，
//           全部故障缓存汇总，一次性报告
// ==========================================

// ==========================================
// 模块声明
// ==========================================

// 领域层 - 单元格/行/数据集
pub mod domain;

// 数据仓储层 - 实体声明与存储接口
pub mod repository;

// 引擎层 - 校验、诊断与加载事务
pub mod engine;

// 导入层 - 外部表格读取
pub mod importer;

// 配置层 - 加载选项与持久化配置
pub mod config;

// 具体加载器
pub mod loaders;

// API 层 - 异步门面
pub mod api;

// 数据库基础设施（连接初始化/PRAGMA 统一）
pub mod db;

// 日志系统
pub mod logging;

// ==========================================
// 重导出核心类型
// ==========================================

// 领域类型
pub use domain::{CellValue, ColumnKind, Dataset, Row, Workbook};

// 引擎
pub use engine::{
    AggregateResult, ColumnSpec, Diagnostic, Diagnostics, Fault, FaultKind, LoadError,
    LoadOutcome, LoadTransaction, LoaderConfigError, MultiSheetLoad, RequirementNode, RowContext,
    RowError, TableLoader, UniqueConstraint,
};

// 配置
pub use config::{ConfigManager, LoadOptions, LoaderProfile};

// 存储
pub use repository::{ModelSchema, RecordStore, SqliteRecordStore};

// 加载器
pub use loaders::{AnimalsLoader, CompoundsLoader, LoaderKind};

// API
pub use api::{LoadApi, LoadApiResponse};

// ==========================================
// 常量定义
// ==========================================

// 系统版本
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// 系统名称
pub const APP_NAME: &str = "科研数据入库引擎";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
