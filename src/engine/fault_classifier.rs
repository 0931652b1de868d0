// ==========================================
// 科研数据入库引擎 - 存储故障分类器
// ==========================================
// 职责: 把存储层故障（唯一 / 非空 / 枚举取值 / 其他）重新表述为
//       带文件位置的类型化诊断
// 红线: 任何故障都不会被静默丢弃，无法识别的故障原样包装
// ==========================================

use crate::engine::diagnostics::{Diagnostics, Fault, FaultKind, FieldDifference, Position};
use crate::engine::headers::HeaderResolver;
use crate::repository::{FieldValues, ModelSchema, RecordStore, RepositoryError};
use rusqlite::Connection;
use tracing::{debug, warn};

/// 实体字段 → 文件列键
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldColumn {
    pub model: String,
    pub field: String,
    pub key: String,
}

impl FieldColumn {
    pub fn new(model: &str, field: &str, key: &str) -> Self {
        Self {
            model: model.to_string(),
            field: field.to_string(),
            key: key.to_string(),
        }
    }
}

pub struct FaultClassifier<'a> {
    store: &'a dyn RecordStore,
    headers: &'a HeaderResolver,
    field_columns: &'a [FieldColumn],
}

impl<'a> FaultClassifier<'a> {
    pub fn new(
        store: &'a dyn RecordStore,
        headers: &'a HeaderResolver,
        field_columns: &'a [FieldColumn],
    ) -> Self {
        Self {
            store,
            headers,
            field_columns,
        }
    }

    /// 分类单个存储故障
    ///
    /// # 参数
    /// - conn: 已回滚行级保存点后的外层工作单元（用于回查已有记录）
    /// - model: 目标实体
    /// - attempted: 尝试写入的字段
    /// - source: 存储层错误
    pub fn classify(
        &self,
        conn: &Connection,
        model: &ModelSchema,
        attempted: &FieldValues,
        source: &RepositoryError,
    ) -> Fault {
        let classified = match source {
            RepositoryError::UniqueConstraintViolation { columns, .. } => {
                self.conflicting_value(conn, model, attempted, columns)
            }
            RepositoryError::NotNullViolation { column, .. } => Some(Fault::RequiredValue {
                model: model.name.clone(),
                field: column.clone(),
                column: self.header_for_field(&model.name, column),
            }),
            RepositoryError::InvalidChoice {
                field,
                value,
                allowed,
                ..
            } => Some(Fault::InvalidChoice {
                model: model.name.clone(),
                field: field.clone(),
                value: value.clone(),
                allowed: allowed.clone(),
            }),
            RepositoryError::CheckConstraintViolation(_) => Self::invalid_choice(model, attempted),
            _ => None,
        };

        classified.unwrap_or_else(|| Fault::UnclassifiedStore {
            model: model.name.clone(),
            message: source.to_string(),
            attempted: attempted.clone(),
        })
    }

    /// 分类并缓存（枚举取值故障按故障文本去重）
    ///
    /// # 返回
    /// - 分类后的故障类别
    #[track_caller]
    pub fn classify_and_buffer(
        &self,
        conn: &Connection,
        model: &ModelSchema,
        attempted: &FieldValues,
        source: &RepositoryError,
        position: Position,
        diagnostics: &mut Diagnostics,
    ) -> FaultKind {
        let fault = self.classify(conn, model, attempted, source);
        let kind = fault.kind();

        if kind == FaultKind::InvalidChoice
            && diagnostics.contains_message(kind, &fault.to_string())
        {
            debug!(model = %model.name, "重复的枚举取值故障已忽略");
            return kind;
        }
        if kind == FaultKind::UnclassifiedStore {
            warn!(model = %model.name, error = %source, "未分类存储故障");
        }
        diagnostics.buffer_error(fault, position);
        kind
    }

    fn header_for_field(&self, model: &str, field: &str) -> Option<String> {
        self.field_columns
            .iter()
            .find(|fc| fc.model == model && fc.field == field)
            .map(|fc| self.headers.header_or_key(&fc.key))
    }

    /// 唯一约束冲突 → 回查已有记录并逐字段比对
    fn conflicting_value(
        &self,
        conn: &Connection,
        model: &ModelSchema,
        attempted: &FieldValues,
        columns: &[String],
    ) -> Option<Fault> {
        let mut lookup_sets: Vec<Vec<String>> =
            model.unique_sets_within(columns).cloned().collect();
        if lookup_sets.is_empty() && !columns.is_empty() {
            lookup_sets.push(columns.to_vec());
        }

        for set in lookup_sets {
            let lookup: FieldValues = set
                .iter()
                .map(|f| (f.clone(), attempted.get(f).cloned().flatten()))
                .collect();
            let existing = match self.store.find_by(conn, model, &lookup) {
                Ok(Some(record)) => record,
                Ok(None) => continue,
                Err(e) => {
                    warn!(model = %model.name, error = %e, "冲突记录回查失败");
                    continue;
                }
            };

            let differences: Vec<FieldDifference> = attempted
                .iter()
                .filter_map(|(field, value)| {
                    let current = existing.values.get(field).cloned().flatten();
                    let same = match (&current, value) {
                        (None, None) => true,
                        (Some(a), Some(b)) => a.loosely_eq(b),
                        _ => false,
                    };
                    (!same).then(|| FieldDifference {
                        field: field.clone(),
                        existing: current,
                        attempted: value.clone(),
                    })
                })
                .collect();

            if !differences.is_empty() {
                return Some(Fault::ConflictingValue {
                    model: model.name.clone(),
                    differences,
                });
            }
        }
        None
    }

    /// 检查约束失败时，定位不在允许范围内的字段
    fn invalid_choice(model: &ModelSchema, attempted: &FieldValues) -> Option<Fault> {
        model.fields.iter().find_map(|field| {
            let allowed = field.choices.as_ref()?;
            let value = attempted.get(&field.name)?.as_ref()?;
            (!field.allows(value)).then(|| Fault::InvalidChoice {
                model: model.name.clone(),
                field: field.name.clone(),
                value: value.as_text(),
                allowed: allowed.clone(),
            })
        })
    }
}
