// ==========================================
// 科研数据入库引擎 - 加载器声明与行上下文
// ==========================================
// 职责:
// - TableLoader: 具体加载器的声明式接口（列、需求树、唯一约束、实体、行处理体）
// - LoaderSchema: 声明的结构自检（每个加载器名每进程一次）
// - RowContext: 行处理体可见的取值 / 存储 / 诊断 / 统计入口
// ==========================================

use crate::domain::{CellValue, ColumnKind, Row};
use crate::engine::diagnostics::{row_number, Diagnostic, Diagnostics, Fault, Position};
use crate::engine::error::{LoaderConfigError, RowError};
use crate::engine::fault_classifier::FieldColumn;
use crate::engine::headers::{ColumnSpec, HeaderResolver};
use crate::engine::requirement::RequirementNode;
use crate::engine::skip::SkipTracker;
use crate::engine::stats::LoadStatistics;
use crate::engine::uniqueness::UniqueConstraint;
use crate::repository::{FieldValues, ModelSchema, RecordStore, RepositoryError, StoredRecord};
use rusqlite::Connection;
use std::collections::BTreeSet;
use std::sync::{Mutex, OnceLock};
use tracing::{debug, trace};

// ==========================================
// TableLoader Trait
// ==========================================
// 实现者: loaders::CompoundsLoader / loaders::AnimalsLoader
pub trait TableLoader: Send + Sync {
    /// 加载器名（注册表键、诊断与日志使用）
    fn name(&self) -> &str;

    /// 默认工作表名
    fn default_sheet(&self) -> &str;

    fn columns(&self) -> Vec<ColumnSpec>;

    /// 必需表头（列键需求树）
    fn required_headers(&self) -> RequirementNode;

    /// 每行必填取值（列键需求树，默认值参与判断）
    fn required_values(&self) -> RequirementNode;

    fn unique_constraints(&self) -> Vec<UniqueConstraint> {
        Vec::new()
    }

    /// 本加载器写入的实体
    fn models(&self) -> Vec<ModelSchema>;

    /// 实体字段 → 列键（非空故障翻译为文件列名）
    fn field_columns(&self) -> Vec<FieldColumn> {
        Vec::new()
    }

    /// 行处理体
    fn load_row(&self, ctx: &mut RowContext<'_>) -> Result<(), RowError>;

    /// 被预检跳过的行
    fn skip_row(&self, ctx: &mut RowContext<'_>) {
        for model in self.models() {
            ctx.skipped(&model.name);
        }
    }

    /// 行处理体以数据故障失败
    fn row_errored(&self, ctx: &mut RowContext<'_>) {
        for model in self.models() {
            ctx.errored(&model.name);
        }
    }
}

// ==========================================
// LoaderSchema - 声明自检
// ==========================================
pub struct LoaderSchema;

fn validated_loaders() -> &'static Mutex<BTreeSet<String>> {
    static VALIDATED: OnceLock<Mutex<BTreeSet<String>>> = OnceLock::new();
    VALIDATED.get_or_init(|| Mutex::new(BTreeSet::new()))
}

impl LoaderSchema {
    /// 校验加载器声明（同名加载器只校验一次）
    ///
    /// # 返回
    /// - Err(LoaderConfigError): 声明不一致（配置错误，不是数据错误）
    pub fn validate(loader: &dyn TableLoader) -> Result<(), LoaderConfigError> {
        let name = loader.name().to_string();
        {
            let done = validated_loaders()
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            if done.contains(&name) {
                return Ok(());
            }
        }

        Self::check(loader)?;

        validated_loaders()
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(name.clone());
        debug!(loader = %name, "加载器声明自检通过");
        Ok(())
    }

    /// 不缓存结果的自检
    pub fn check(loader: &dyn TableLoader) -> Result<(), LoaderConfigError> {
        let name = loader.name().to_string();
        let columns = loader.columns();

        let mut keys = BTreeSet::new();
        let mut headers = BTreeSet::new();
        for column in &columns {
            if !keys.insert(column.key.as_str()) {
                return Err(LoaderConfigError::DuplicateKey {
                    loader: name,
                    key: column.key.clone(),
                });
            }
            if !headers.insert(column.header.as_str()) {
                return Err(LoaderConfigError::DuplicateDefaultHeader {
                    loader: name,
                    header: column.header.clone(),
                });
            }
            if let Some(default) = &column.default {
                if !column.kind.accepts(default) {
                    return Err(LoaderConfigError::DefaultKindMismatch {
                        loader: name,
                        key: column.key.clone(),
                        expected: column.kind,
                        value: default.as_text(),
                    });
                }
            }
        }

        let undeclared = |context: &str, key: &str| LoaderConfigError::UndeclaredKey {
            loader: name.clone(),
            context: context.to_string(),
            key: key.to_string(),
        };

        let required_headers = loader.required_headers();
        if let Some(key) = required_headers.leaves().into_iter().find(|k| !keys.contains(k)) {
            return Err(undeclared("必需表头", key));
        }
        let required_values = loader.required_values();
        if let Some(key) = required_values.leaves().into_iter().find(|k| !keys.contains(k)) {
            return Err(undeclared("必填取值", key));
        }
        for constraint in loader.unique_constraints() {
            if let Some(key) = constraint.keys.iter().find(|k| !keys.contains(k.as_str())) {
                return Err(undeclared("唯一约束", key));
            }
        }

        let models = loader.models();
        for fc in loader.field_columns() {
            if !keys.contains(fc.key.as_str()) {
                return Err(undeclared("字段映射", &fc.key));
            }
            let known = models
                .iter()
                .find(|m| m.name == fc.model)
                .and_then(|m| m.field_def(&fc.field))
                .is_some();
            if !known {
                return Err(LoaderConfigError::UndeclaredField {
                    loader: name.clone(),
                    model: fc.model.clone(),
                    field: fc.field.clone(),
                });
            }
        }
        Ok(())
    }
}

// ==========================================
// RowContext - 行处理体上下文
// ==========================================
pub struct RowContext<'a> {
    pub(crate) row: &'a Row,
    pub(crate) headers: &'a HeaderResolver,
    pub(crate) conn: &'a Connection,
    pub(crate) store: &'a dyn RecordStore,
    pub(crate) models: &'a [ModelSchema],
    pub(crate) diagnostics: &'a mut Diagnostics,
    pub(crate) skips: &'a mut SkipTracker,
    pub(crate) stats: &'a mut LoadStatistics,
    pub(crate) position: Position,
}

impl<'a> RowContext<'a> {
    pub fn row_index(&self) -> usize {
        self.row.index
    }

    /// 1 基行号
    pub fn row_number(&self) -> Option<usize> {
        self.position.row
    }

    pub fn connection(&self) -> &Connection {
        self.conn
    }

    /// 本行位置（可附带列）
    pub fn position(&self, key: Option<&str>) -> Position {
        match key {
            Some(k) => self.position.clone().at_column(self.headers.header_or_key(k)),
            None => self.position.clone(),
        }
    }

    /// 按列键取值（单元格缺失时回落到生效默认值）
    pub fn get(&self, key: &str) -> Option<&CellValue> {
        let header = self.headers.header(key)?;
        self.row
            .get(header)
            .or_else(|| self.headers.default_for_header(header))
    }

    pub fn get_text(&self, key: &str) -> Option<String> {
        self.get(key).map(CellValue::as_text)
    }

    fn invalid(&self, key: &str, value: &CellValue, expected: ColumnKind) -> RowError {
        RowError::Fault(Fault::InvalidValue {
            column: self.headers.header_or_key(key),
            value: value.as_text(),
            expected,
        })
    }

    pub fn get_integer(&self, key: &str) -> Result<Option<i64>, RowError> {
        let Some(value) = self.get(key) else {
            return Ok(None);
        };
        let parsed = match value {
            CellValue::Integer(v) => Some(*v),
            CellValue::Float(f) if f.fract() == 0.0 => Some(*f as i64),
            CellValue::Text(s) => s.trim().parse::<i64>().ok(),
            _ => None,
        };
        parsed
            .map(Some)
            .ok_or_else(|| self.invalid(key, value, ColumnKind::Integer))
    }

    pub fn get_float(&self, key: &str) -> Result<Option<f64>, RowError> {
        let Some(value) = self.get(key) else {
            return Ok(None);
        };
        match value {
            CellValue::Bool(_) => Err(self.invalid(key, value, ColumnKind::Float)),
            other => other
                .as_f64()
                .map(Some)
                .ok_or_else(|| self.invalid(key, value, ColumnKind::Float)),
        }
    }

    /// 查找或创建实体记录
    ///
    /// 成功时计入 created / existed；失败时计入 errored 并返回 RowError::Store
    pub fn get_or_create(
        &mut self,
        model: &str,
        lookup: FieldValues,
        values: FieldValues,
    ) -> Result<StoredRecord, RowError> {
        let mut attempted = lookup.clone();
        attempted.extend(values.iter().map(|(k, v)| (k.clone(), v.clone())));

        let Some(schema) = self.models.iter().find(|m| m.name == model) else {
            self.errored(model);
            return Err(RowError::Store {
                model: model.to_string(),
                attempted,
                source: RepositoryError::NotFound {
                    entity: model.to_string(),
                },
            });
        };

        match self.store.get_or_create(self.conn, schema, &lookup, &values) {
            Ok((record, true)) => {
                trace!(model = %model, id = record.id, row_index = self.row.index, "新建");
                self.created(model);
                Ok(record)
            }
            Ok((record, false)) => {
                self.existed(model);
                Ok(record)
            }
            Err(source) => {
                self.errored(model);
                Err(RowError::Store {
                    model: model.to_string(),
                    attempted,
                    source,
                })
            }
        }
    }

    /// 标记本行跳过（后续实体不再写入）
    pub fn mark_skipped(&mut self) {
        self.skips.mark(self.row.index);
    }

    pub fn is_skipped(&self) -> bool {
        self.skips.is_skipped(self.row.index)
    }

    #[track_caller]
    pub fn buffer_warning(&mut self, fault: Fault, key: Option<&str>) -> &Diagnostic {
        let position = self.position(key);
        self.diagnostics.buffer_warning(fault, position)
    }

    #[track_caller]
    pub fn buffer_error(&mut self, fault: Fault, key: Option<&str>) -> &Diagnostic {
        let position = self.position(key);
        self.diagnostics.buffer_error(fault, position)
    }

    pub fn created(&mut self, model: &str) {
        self.stats.created(model);
    }

    pub fn existed(&mut self, model: &str) {
        self.stats.existed(model);
    }

    pub fn skipped(&mut self, model: &str) {
        self.stats.skipped(model);
    }

    pub fn errored(&mut self, model: &str) {
        self.stats.errored(model);
    }
}

/// 构造行上下文（引擎内部使用）
#[allow(clippy::too_many_arguments)]
pub(crate) fn row_context<'a>(
    row: &'a Row,
    headers: &'a HeaderResolver,
    conn: &'a Connection,
    store: &'a dyn RecordStore,
    models: &'a [ModelSchema],
    diagnostics: &'a mut Diagnostics,
    skips: &'a mut SkipTracker,
    stats: &'a mut LoadStatistics,
    base: &Position,
    header_rows: usize,
) -> RowContext<'a> {
    RowContext {
        row,
        headers,
        conn,
        store,
        models,
        diagnostics,
        skips,
        stats,
        position: base.clone().at_row(row_number(row.index, header_rows)),
    }
}
