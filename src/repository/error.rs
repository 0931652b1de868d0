// ==========================================
// 科研数据入库引擎 - 仓储层错误类型
// ==========================================
// 工具: thiserror 派生宏
// 职责: 按类别区分存储层故障（唯一 / 非空 / 枚举取值 / 其他），供故障分类器识别
// ==========================================

use thiserror::Error;

/// 仓储层错误类型
#[derive(Error, Debug)]
pub enum RepositoryError {
    // ===== 约束类错误（可被分类器重新表述）=====
    #[error("唯一约束违反: {message}")]
    UniqueConstraintViolation {
        table: String,
        columns: Vec<String>,
        message: String,
    },

    #[error("非空约束违反: {message}")]
    NotNullViolation {
        table: String,
        column: String,
        message: String,
    },

    #[error("取值不在允许范围: {model}.{field}={value}（允许: {allowed:?}）")]
    InvalidChoice {
        model: String,
        field: String,
        value: String,
        allowed: Vec<String>,
    },

    #[error("检查约束违反: {0}")]
    CheckConstraintViolation(String),

    #[error("外键约束违反: {0}")]
    ForeignKeyViolation(String),

    #[error("字段类型不符 ({model}.{field}): 期望 {expected}，实际 {value}")]
    FieldTypeMismatch {
        model: String,
        field: String,
        expected: String,
        value: String,
    },

    // ===== 编程/配置错误 =====
    #[error("未知字段: {model}.{field}")]
    UnknownField { model: String, field: String },

    // ===== 数据库错误 =====
    #[error("记录未找到: {entity}")]
    NotFound { entity: String },

    #[error("数据库事务失败: {0}")]
    DatabaseTransactionError(String),

    #[error("数据库查询失败: {0}")]
    DatabaseQueryError(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// 解析 "XXX constraint failed: t.a, t.b" 形式的约束列
///
/// # 返回
/// - (表名, 列名列表)；无法解析时表名为空
pub fn parse_constraint_columns(message: &str) -> (String, Vec<String>) {
    let detail = match message.split_once("constraint failed:") {
        Some((_, rest)) => rest.trim(),
        None => return (String::new(), Vec::new()),
    };

    let mut table = String::new();
    let mut columns = Vec::new();
    for part in detail.split(',') {
        let part = part.trim();
        match part.split_once('.') {
            Some((t, c)) => {
                if table.is_empty() {
                    table = t.trim().to_string();
                }
                columns.push(c.trim().to_string());
            }
            None if !part.is_empty() => columns.push(part.to_string()),
            None => {}
        }
    }
    (table, columns)
}

impl From<rusqlite::Error> for RepositoryError {
    fn from(err: rusqlite::Error) -> Self {
        match err {
            rusqlite::Error::SqliteFailure(_, Some(msg)) => {
                if msg.contains("UNIQUE constraint failed") {
                    let (table, columns) = parse_constraint_columns(&msg);
                    RepositoryError::UniqueConstraintViolation {
                        table,
                        columns,
                        message: msg,
                    }
                } else if msg.contains("NOT NULL constraint failed") {
                    let (table, columns) = parse_constraint_columns(&msg);
                    RepositoryError::NotNullViolation {
                        table,
                        column: columns.into_iter().next().unwrap_or_default(),
                        message: msg,
                    }
                } else if msg.contains("CHECK constraint failed") {
                    RepositoryError::CheckConstraintViolation(msg)
                } else if msg.contains("FOREIGN KEY") {
                    RepositoryError::ForeignKeyViolation(msg)
                } else {
                    RepositoryError::DatabaseQueryError(msg)
                }
            }
            rusqlite::Error::QueryReturnedNoRows => RepositoryError::NotFound {
                entity: "Unknown".to_string(),
            },
            _ => RepositoryError::DatabaseQueryError(err.to_string()),
        }
    }
}

/// Result 类型别名
pub type RepositoryResult<T> = Result<T, RepositoryError>;
