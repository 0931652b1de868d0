// ==========================================
// 科研数据入库引擎 - API 层错误类型
// ==========================================
// 职责: 将各层错误转换为面向调用方的错误消息
// ==========================================

use crate::engine::error::{LoadError, LoaderConfigError};
use crate::engine::orchestrator::MultiLoadError;
use crate::engine::report::AggregateResult;
use crate::importer::ImportError;
use crate::repository::error::RepositoryError;
use thiserror::Error;

/// API 层错误类型
#[derive(Error, Debug)]
pub enum ApiError {
    // ==========================================
    // 输入错误
    // ==========================================
    #[error("无效输入: {0}")]
    InvalidInput(String),

    #[error("文件导入失败: {0}")]
    ImportError(String),

    #[error("加载器配置错误: {0}")]
    LoaderConfig(String),

    // ==========================================
    // 加载失败（携带完整诊断）
    // ==========================================
    #[error("{}", .0.render())]
    LoadFailed(Box<AggregateResult>),

    #[error("多工作表加载失败（{error_count} 个错误）:\n{report}")]
    MultiLoadFailed { error_count: usize, report: String },

    // ==========================================
    // 数据访问错误
    // ==========================================
    #[error("数据库错误: {0}")]
    DatabaseError(String),

    #[error("数据库事务失败: {0}")]
    DatabaseTransactionError(String),

    // ==========================================
    // 通用错误
    // ==========================================
    #[error("内部错误: {0}")]
    InternalError(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl From<ImportError> for ApiError {
    fn from(err: ImportError) -> Self {
        ApiError::ImportError(err.to_string())
    }
}

impl From<LoaderConfigError> for ApiError {
    fn from(err: LoaderConfigError) -> Self {
        match err {
            LoaderConfigError::UnknownLoader(name) => {
                ApiError::InvalidInput(format!("未知加载器: {}", name))
            }
            other => ApiError::LoaderConfig(other.to_string()),
        }
    }
}

impl From<RepositoryError> for ApiError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::DatabaseTransactionError(msg) => {
                ApiError::DatabaseTransactionError(msg)
            }
            RepositoryError::Other(err) => ApiError::Other(err),
            other => ApiError::DatabaseError(other.to_string()),
        }
    }
}

impl From<LoadError> for ApiError {
    fn from(err: LoadError) -> Self {
        match err {
            LoadError::Failed(result) | LoadError::MissingHeaders(result) => {
                ApiError::LoadFailed(Box::new(result))
            }
            LoadError::Config(e) => e.into(),
            LoadError::Transaction(msg) => ApiError::DatabaseTransactionError(msg),
        }
    }
}

impl From<MultiLoadError> for ApiError {
    fn from(err: MultiLoadError) -> Self {
        match err {
            MultiLoadError::Failed(result) => ApiError::MultiLoadFailed {
                error_count: result.error_count(),
                report: result.render(),
            },
            MultiLoadError::Config(e) => e.into(),
            MultiLoadError::Defaults(e) => e.into(),
            MultiLoadError::Transaction(msg) => ApiError::DatabaseTransactionError(msg),
        }
    }
}

impl From<rusqlite::Error> for ApiError {
    fn from(err: rusqlite::Error) -> Self {
        ApiError::DatabaseError(err.to_string())
    }
}

/// Result 类型别名
pub type ApiResult<T> = Result<T, ApiError>;
