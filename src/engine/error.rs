// ==========================================
// 科研数据入库引擎 - 引擎层错误类型
// ==========================================
// 工具: thiserror 派生宏
// 分层:
// - LoaderConfigError: 编程/配置错误，立即抛出，不进入诊断缓存
// - RowError: 行处理体的可预期失败（缓存后继续下一行）
// - LoadError: 一次加载尝试的终态失败
// ==========================================

use crate::domain::ColumnKind;
use crate::engine::diagnostics::Fault;
use crate::engine::report::AggregateResult;
use crate::repository::{FieldValues, RepositoryError};
use thiserror::Error;

/// 加载器声明 / 覆盖配置错误
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LoaderConfigError {
    #[error("加载器 {loader} 的{layer}包含未知列键: {key}")]
    UnknownOverrideKey {
        loader: String,
        layer: String,
        key: String,
    },

    #[error("加载器 {loader} 重复声明列键: {key}")]
    DuplicateKey { loader: String, key: String },

    #[error("加载器 {loader} 的默认表头名重复: {header}")]
    DuplicateDefaultHeader { loader: String, header: String },

    #[error("加载器 {loader} 列 {key} 的默认值 [{value}] 与声明类型 {expected} 不符")]
    DefaultKindMismatch {
        loader: String,
        key: String,
        expected: ColumnKind,
        value: String,
    },

    #[error("加载器 {loader} 的{context}引用了未声明的列键: {key}")]
    UndeclaredKey {
        loader: String,
        context: String,
        key: String,
    },

    #[error("加载器 {loader} 的字段映射引用了未知实体字段: {model}.{field}")]
    UndeclaredField {
        loader: String,
        model: String,
        field: String,
    },

    #[error("未知加载器: {0}")]
    UnknownLoader(String),
}

/// 行处理体的失败
#[derive(Error, Debug)]
pub enum RowError {
    /// 可定位的数据故障（例如类型不符）
    #[error("{0}")]
    Fault(Fault),

    /// 存储层故障，交由故障分类器重新表述
    #[error("{model} 写入失败: {source}")]
    Store {
        model: String,
        attempted: FieldValues,
        source: RepositoryError,
    },

    /// 行已被标记跳过，不再继续
    #[error("行已跳过")]
    Skip,
}

/// 加载尝试的终态失败
#[derive(Error, Debug)]
pub enum LoadError {
    #[error("加载失败，已回滚: {0}")]
    Failed(AggregateResult),

    #[error("缺少必需表头，加载中止: {0}")]
    MissingHeaders(AggregateResult),

    #[error(transparent)]
    Config(#[from] LoaderConfigError),

    #[error("事务操作失败: {0}")]
    Transaction(String),
}

impl LoadError {
    /// 失败时的聚合结果（配置/事务错误没有）
    pub fn aggregate(&self) -> Option<&AggregateResult> {
        match self {
            LoadError::Failed(result) | LoadError::MissingHeaders(result) => Some(result),
            _ => None,
        }
    }
}

impl From<rusqlite::Error> for LoadError {
    fn from(err: rusqlite::Error) -> Self {
        LoadError::Transaction(err.to_string())
    }
}

/// Result 类型别名
pub type LoadResult<T> = Result<T, LoadError>;
