// ==========================================
// 科研数据入库引擎 - 基础值类型
// ==========================================
// 职责: 单元格取值 (CellValue) 与列类型 (ColumnKind)
// 红线: 空值一律以"缺失"表达，不存在 Null 变体
// ==========================================

use rusqlite::types::{FromSql, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};
use std::fmt;

// ==========================================
// CellValue - 单元格取值
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CellValue {
    Bool(bool),
    Integer(i64),
    Float(f64),
    Text(String),
}

impl CellValue {
    /// 以文本形式取值（用于分组、比对与报告）
    pub fn as_text(&self) -> String {
        self.to_string()
    }

    /// 对应的列类型
    pub fn kind(&self) -> ColumnKind {
        match self {
            CellValue::Bool(_) => ColumnKind::Bool,
            CellValue::Integer(_) => ColumnKind::Integer,
            CellValue::Float(_) => ColumnKind::Float,
            CellValue::Text(_) => ColumnKind::Text,
        }
    }

    /// 数值视图（整数/浮点/可解析文本）
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            CellValue::Integer(v) => Some(*v as f64),
            CellValue::Float(v) => Some(*v),
            CellValue::Text(s) => s.trim().parse::<f64>().ok(),
            CellValue::Bool(_) => None,
        }
    }

    /// 宽松相等：数值按数值比较，其余按文本比较
    ///
    /// 存储层的类型亲和会把 "5" 存成 5，逐字段比对时不能因此误报差异。
    pub fn loosely_eq(&self, other: &CellValue) -> bool {
        if self == other {
            return true;
        }
        match (self.as_f64(), other.as_f64()) {
            (Some(a), Some(b)) if !matches!(self, CellValue::Bool(_)) => a == b,
            _ => self.as_text() == other.as_text(),
        }
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Bool(v) => write!(f, "{}", v),
            CellValue::Integer(v) => write!(f, "{}", v),
            CellValue::Float(v) => write!(f, "{}", v),
            CellValue::Text(v) => write!(f, "{}", v),
        }
    }
}

impl From<&str> for CellValue {
    fn from(value: &str) -> Self {
        CellValue::Text(value.to_string())
    }
}

impl From<String> for CellValue {
    fn from(value: String) -> Self {
        CellValue::Text(value)
    }
}

impl From<i64> for CellValue {
    fn from(value: i64) -> Self {
        CellValue::Integer(value)
    }
}

impl From<f64> for CellValue {
    fn from(value: f64) -> Self {
        CellValue::Float(value)
    }
}

impl From<bool> for CellValue {
    fn from(value: bool) -> Self {
        CellValue::Bool(value)
    }
}

impl ToSql for CellValue {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            CellValue::Bool(v) => ToSqlOutput::from(*v),
            CellValue::Integer(v) => ToSqlOutput::from(*v),
            CellValue::Float(v) => ToSqlOutput::from(*v),
            CellValue::Text(v) => ToSqlOutput::from(v.as_str()),
        })
    }
}

impl FromSql for CellValue {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        match value {
            ValueRef::Integer(v) => Ok(CellValue::Integer(v)),
            ValueRef::Real(v) => Ok(CellValue::Float(v)),
            ValueRef::Text(_) => String::column_result(value).map(CellValue::Text),
            ValueRef::Blob(_) => Vec::<u8>::column_result(value)
                .map(|bytes| CellValue::Text(String::from_utf8_lossy(&bytes).into_owned())),
            ValueRef::Null => Err(rusqlite::types::FromSqlError::InvalidType),
        }
    }
}

// ==========================================
// ColumnKind - 声明的列类型
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnKind {
    Text,
    Integer,
    Float,
    Bool,
}

impl ColumnKind {
    /// 判断取值是否符合该列类型（整数可放入浮点列）
    pub fn accepts(&self, value: &CellValue) -> bool {
        matches!(
            (self, value),
            (ColumnKind::Text, _)
                | (ColumnKind::Integer, CellValue::Integer(_))
                | (ColumnKind::Float, CellValue::Float(_))
                | (ColumnKind::Float, CellValue::Integer(_))
                | (ColumnKind::Bool, CellValue::Bool(_))
        )
    }
}

impl fmt::Display for ColumnKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ColumnKind::Text => "text",
            ColumnKind::Integer => "integer",
            ColumnKind::Float => "float",
            ColumnKind::Bool => "bool",
        };
        write!(f, "{}", s)
    }
}
