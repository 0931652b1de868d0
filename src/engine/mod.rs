// ==========================================
// 科研数据入库引擎 - 引擎层
// ==========================================
// 职责: 表头/默认值解析、必需性判定、文件内唯一性检查、
//       诊断聚合、存储故障分类与加载事务编排
// 红线: 引擎不拼业务 SQL，所有落库经 RecordStore
// ==========================================

pub mod diagnostics;
pub mod error;
pub mod fault_classifier;
pub mod headers;
pub mod loader;
pub mod orchestrator;
pub mod report;
pub mod requirement;
pub mod skip;
pub mod stats;
pub mod transaction;
pub mod uniqueness;

// 重导出核心类型
pub use diagnostics::{Diagnostic, Diagnostics, Fault, FaultKind, FieldDifference, Position};
pub use error::{LoadError, LoadResult, LoaderConfigError, RowError};
pub use fault_classifier::{FaultClassifier, FieldColumn};
pub use headers::{ColumnSpec, DefaultOverrides, HeaderOverrides, HeaderResolver};
pub use loader::{LoaderSchema, RowContext, TableLoader};
pub use orchestrator::{MultiLoadError, MultiLoadResult, MultiSheetLoad};
pub use report::{AggregateResult, LoadOutcome};
pub use requirement::{evaluate, evaluate_by, Evaluation, Nested, RequirementNode};
pub use skip::SkipTracker;
pub use stats::{LoadStatistics, ModelCounts};
pub use transaction::{LoadState, LoadTransaction};
pub use uniqueness::{UniqueConstraint, UniquenessChecker};
