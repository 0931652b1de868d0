// ==========================================
// 科研数据入库引擎 - 持久化实体声明
// ==========================================
// 职责: 声明单个存储实体（表名、字段、可选枚举取值、唯一字段组）
// 红线: 不负责建表/迁移，表结构由外部维护
// ==========================================

use crate::domain::{CellValue, ColumnKind};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// 字段名 → 取值（None 表示显式写入空值）
pub type FieldValues = BTreeMap<String, Option<CellValue>>;

/// 便捷构造 FieldValues
pub fn field_values<I, K>(pairs: I) -> FieldValues
where
    I: IntoIterator<Item = (K, Option<CellValue>)>,
    K: Into<String>,
{
    pairs.into_iter().map(|(k, v)| (k.into(), v)).collect()
}

// ==========================================
// FieldDef - 字段声明
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDef {
    pub name: String,
    pub kind: ColumnKind,
    pub nullable: bool,
    /// 枚举取值（None 表示不限）
    pub choices: Option<Vec<String>>,
}

impl FieldDef {
    pub fn new(name: &str, kind: ColumnKind) -> Self {
        Self {
            name: name.to_string(),
            kind,
            nullable: false,
            choices: None,
        }
    }

    pub fn text(name: &str) -> Self {
        Self::new(name, ColumnKind::Text)
    }

    pub fn integer(name: &str) -> Self {
        Self::new(name, ColumnKind::Integer)
    }

    pub fn float(name: &str) -> Self {
        Self::new(name, ColumnKind::Float)
    }

    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    pub fn with_choices(mut self, choices: &[&str]) -> Self {
        self.choices = Some(choices.iter().map(|c| c.to_string()).collect());
        self
    }

    /// 判断取值是否在枚举范围内（未声明枚举时恒为真）
    pub fn allows(&self, value: &CellValue) -> bool {
        match &self.choices {
            Some(choices) => choices.iter().any(|c| *c == value.as_text()),
            None => true,
        }
    }
}

// ==========================================
// ModelSchema - 实体声明
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSchema {
    /// 实体名（统计与诊断使用，如 "Compound"）
    pub name: String,
    pub table: String,
    pub fields: Vec<FieldDef>,
    /// 唯一字段组（与库表的 UNIQUE 约束一致）
    pub unique_together: Vec<Vec<String>>,
}

impl ModelSchema {
    pub fn new(name: &str, table: &str) -> Self {
        Self {
            name: name.to_string(),
            table: table.to_string(),
            fields: Vec::new(),
            unique_together: Vec::new(),
        }
    }

    pub fn field(mut self, field: FieldDef) -> Self {
        self.fields.push(field);
        self
    }

    pub fn unique(mut self, fields: &[&str]) -> Self {
        self.unique_together
            .push(fields.iter().map(|f| f.to_string()).collect());
        self
    }

    pub fn field_def(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// 包含给定列集合的唯一字段组（用于冲突回查）
    pub fn unique_sets_within<'a>(&'a self, columns: &'a [String]) -> impl Iterator<Item = &'a Vec<String>> {
        self.unique_together
            .iter()
            .filter(move |set| set.iter().all(|f| columns.contains(f)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn animal_model() -> ModelSchema {
        ModelSchema::new("Animal", "animal")
            .field(FieldDef::text("name"))
            .field(FieldDef::text("sex").nullable().with_choices(&["F", "M"]))
            .unique(&["name"])
    }

    #[test]
    fn test_field_allows_choices() {
        let model = animal_model();
        let sex = model.field_def("sex").unwrap();
        assert!(sex.allows(&CellValue::from("F")));
        assert!(!sex.allows(&CellValue::from("female")));
        assert!(model.field_def("name").unwrap().allows(&CellValue::from("anything")));
    }

    #[test]
    fn test_unique_sets_within() {
        let model = animal_model();
        let cols = vec!["name".to_string(), "sex".to_string()];
        assert_eq!(model.unique_sets_within(&cols).count(), 1);
        let cols = vec!["sex".to_string()];
        assert_eq!(model.unique_sets_within(&cols).count(), 0);
    }
}
