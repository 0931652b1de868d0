// ==========================================
// 科研数据入库引擎 - 加载事务包装器
// ==========================================
// 职责: 编排一次加载尝试
// 状态: Idle → PreflightChecking → Processing → Summarizing → Deciding → {Committed | RolledBack}
// 事务:
// - 外层工作单元: 一个保存点（裸连接上即一个事务）
// - 行级工作单元: 嵌套保存点，失败只回滚本行
// 红线:
// - 缺少必需表头是唯一“立即失败”的条件，其余故障一律缓存后继续
// - 存储层原始错误不直接抛给调用方，总是先分类或包装
// - 包装器单次使用（run 消耗 self）
// ==========================================

use crate::config::LoadOptions;
use crate::db::SavepointSource;
use crate::domain::Dataset;
use crate::engine::diagnostics::{row_number, Diagnostics, Fault, FaultKind, Position};
use crate::engine::error::{LoadError, LoadResult, RowError};
use crate::engine::fault_classifier::FaultClassifier;
use crate::engine::headers::HeaderResolver;
use crate::engine::loader::{row_context, LoaderSchema, RowContext, TableLoader};
use crate::engine::report::{AggregateResult, LoadOutcome};
use crate::engine::requirement::{evaluate, evaluate_by};
use crate::engine::skip::SkipTracker;
use crate::engine::stats::LoadStatistics;
use crate::engine::uniqueness::UniquenessChecker;
use crate::importer::DefaultsSheet;
use crate::repository::{ModelSchema, RecordStore};
use chrono::{DateTime, Utc};
use rusqlite::Savepoint;
use std::collections::BTreeSet;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

/// 包装器状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadState {
    Idle,
    PreflightChecking,
    Processing,
    Summarizing,
    Deciding,
    Committed,
    RolledBack,
}

// ==========================================
// LoadTransaction - 加载事务包装器
// ==========================================
pub struct LoadTransaction<'a> {
    loader: &'a dyn TableLoader,
    store: &'a dyn RecordStore,
    options: LoadOptions,
    attempt_id: Uuid,
    started_at: DateTime<Utc>,
    state: LoadState,
    diagnostics: Diagnostics,
    skips: SkipTracker,
    stats: LoadStatistics,
    headers: HeaderResolver,
    models: Vec<ModelSchema>,
}

impl<'a> LoadTransaction<'a> {
    pub fn new(
        loader: &'a dyn TableLoader,
        store: &'a dyn RecordStore,
        options: LoadOptions,
    ) -> Self {
        let models = loader.models();
        let mut stats = LoadStatistics::new();
        for model in &models {
            stats.register(&model.name);
        }
        Self {
            headers: HeaderResolver::new(loader.name(), loader.columns()),
            loader,
            store,
            options,
            attempt_id: Uuid::new_v4(),
            started_at: Utc::now(),
            state: LoadState::Idle,
            diagnostics: Diagnostics::new(),
            skips: SkipTracker::new(),
            stats,
            models,
        }
    }

    pub fn attempt_id(&self) -> Uuid {
        self.attempt_id
    }

    pub fn state(&self) -> LoadState {
        self.state
    }

    fn transition(&mut self, next: LoadState) {
        debug!(
            attempt_id = %self.attempt_id,
            loader = %self.loader.name(),
            from = ?self.state,
            to = ?next,
            "状态切换"
        );
        self.state = next;
    }

    fn active_sheet(&self, dataset: &Dataset) -> String {
        self.options
            .sheet
            .clone()
            .or_else(|| dataset.sheet.clone())
            .unwrap_or_else(|| self.loader.default_sheet().to_string())
    }

    fn base_position(&self, dataset: &Dataset) -> Position {
        let file = self.options.file.clone().or_else(|| dataset.file.clone());
        Position {
            file,
            sheet: Some(self.active_sheet(dataset)),
            row: None,
            column: None,
        }
    }

    fn aggregate(&self, dataset: &Dataset, outcome: LoadOutcome) -> AggregateResult {
        let position = self.base_position(dataset);
        AggregateResult {
            attempt_id: self.attempt_id,
            loader: self.loader.name().to_string(),
            file: position.file,
            sheet: position.sheet,
            started_at: self.started_at,
            finished_at: Utc::now(),
            outcome,
            diagnostics: self.diagnostics.iter().cloned().collect(),
            error_count: self.diagnostics.error_count(),
            warning_count: self.diagnostics.warning_count(),
            is_fatal: self.diagnostics.is_fatal(),
            statistics: self.stats.clone(),
        }
    }

    /// 以加载器自身的行处理体运行
    pub fn run<S>(
        self,
        source: &mut S,
        dataset: &Dataset,
        defaults: Option<&DefaultsSheet>,
    ) -> LoadResult<AggregateResult>
    where
        S: SavepointSource + ?Sized,
    {
        let loader = self.loader;
        self.run_with(source, dataset, defaults, |ctx| loader.load_row(ctx))
    }

    /// 以显式传入的行处理体运行
    ///
    /// # 返回
    /// - Ok(结果): 已提交 / 试运行已丢弃 / 延迟决定（结果中仍可能含致命诊断）
    /// - Err(LoadError::MissingHeaders): 缺少必需表头，未做任何写入
    /// - Err(LoadError::Failed): 存在致命诊断且未要求延迟回滚，已回滚
    #[instrument(skip_all, fields(loader = %self.loader.name(), attempt_id = %self.attempt_id, rows = dataset.len()))]
    pub fn run_with<S, F>(
        mut self,
        source: &mut S,
        dataset: &Dataset,
        defaults: Option<&DefaultsSheet>,
        mut row_body: F,
    ) -> LoadResult<AggregateResult>
    where
        S: SavepointSource + ?Sized,
        F: FnMut(&mut RowContext<'_>) -> Result<(), RowError>,
    {
        LoaderSchema::validate(self.loader)?;
        info!(
            dry_run = self.options.dry_run,
            defer_rollback = self.options.defer_rollback,
            permissive = self.options.permissive,
            "加载开始"
        );

        // ===== PreflightChecking =====
        self.transition(LoadState::PreflightChecking);
        if let Err(missing) = self.preflight(dataset, defaults) {
            self.transition(LoadState::RolledBack);
            return Err(missing);
        }

        // ===== Processing =====
        let mut unit = source.open_unit()?;
        self.transition(LoadState::Processing);
        self.process(&mut unit, dataset, &mut row_body)?;

        // ===== Summarizing =====
        self.transition(LoadState::Summarizing);
        for kind in FaultKind::SUMMARIZED {
            self.diagnostics.summarize(kind);
        }

        // ===== Deciding =====
        self.transition(LoadState::Deciding);
        self.decide(unit, dataset)
    }

    /// 预检：表头 → 默认值 → 逐行必填取值 → 文件内唯一性
    fn preflight(
        &mut self,
        dataset: &Dataset,
        defaults: Option<&DefaultsSheet>,
    ) -> LoadResult<()> {
        let base = self.base_position(dataset);
        let header_rows = self.options.header_rows;

        self.headers.resolve_headers(
            Some(&self.options.header_overrides),
            Some(&self.options.user_headers),
        )?;
        for fault in self.headers.duplicate_header_names() {
            self.diagnostics.buffer_error(fault, base.clone());
        }

        // 表头存在性：缺失即立即失败
        let required_headers = self
            .loader
            .required_headers()
            .map_leaves(&|k| self.headers.header_or_key(k));
        let supplied: BTreeSet<String> = dataset.columns.iter().cloned().collect();
        let evaluation = evaluate(&supplied, &required_headers);
        if let Some(missing) = evaluation.missing {
            error!(missing = %missing, "缺少必需表头");
            self.diagnostics.buffer_error(
                Fault::MissingHeaders {
                    missing,
                    all_required: evaluation.top_level_is_all,
                },
                base.clone(),
            );
            return Err(LoadError::MissingHeaders(
                self.aggregate(dataset, LoadOutcome::RolledBack),
            ));
        }

        let known: BTreeSet<String> = self.headers.header_names().into_iter().collect();
        let unknown: Vec<String> = dataset
            .columns
            .iter()
            .filter(|c| !known.contains(*c))
            .cloned()
            .collect();
        if !unknown.is_empty() {
            warn!(headers = ?unknown, "存在未识别的表头");
            self.diagnostics
                .buffer_warning(Fault::UnknownHeaders { headers: unknown }, base.clone());
        }

        let active_sheet = self.active_sheet(dataset);
        self.headers.resolve_defaults(
            Some(&self.options.default_overrides),
            defaults,
            Some(&active_sheet),
            header_rows,
            &mut self.diagnostics,
        )?;

        // 逐行必填取值（默认值参与判断）
        let required_values = self
            .loader
            .required_values()
            .map_leaves(&|k| self.headers.header_or_key(k));
        for row in &dataset.rows {
            let evaluation = evaluate_by(
                |name| row.has_value(name) || self.headers.default_for_header(name).is_some(),
                &required_values,
            );
            if let Some(missing) = evaluation.missing {
                let position = base
                    .clone()
                    .at_row(row_number(row.index, header_rows))
                    .at_column(missing.leaves().join(", "));
                self.diagnostics
                    .buffer_error(Fault::RequiredColumnValue { missing }, position);
                self.skips.mark(row.index);
            }
        }

        let found = UniquenessChecker::new(header_rows).check(
            dataset,
            &self.loader.unique_constraints(),
            &self.headers,
            &mut self.skips,
        );
        self.diagnostics.extend(found);

        info!(
            diagnostics = self.diagnostics.len(),
            skipped_rows = self.skips.len(),
            "预检完成"
        );
        Ok(())
    }

    /// 逐行处理：每个未跳过的行在独立保存点中执行
    fn process<F>(
        &mut self,
        unit: &mut Savepoint<'_>,
        dataset: &Dataset,
        row_body: &mut F,
    ) -> LoadResult<()>
    where
        F: FnMut(&mut RowContext<'_>) -> Result<(), RowError>,
    {
        let base = self.base_position(dataset);
        let header_rows = self.options.header_rows;
        let field_columns = self.loader.field_columns();

        for row in &dataset.rows {
            if self.skips.is_skipped(row.index) {
                let mut ctx = row_context(
                    row,
                    &self.headers,
                    &*unit,
                    self.store,
                    &self.models,
                    &mut self.diagnostics,
                    &mut self.skips,
                    &mut self.stats,
                    &base,
                    header_rows,
                );
                self.loader.skip_row(&mut ctx);
                continue;
            }

            // 行内计数先暂存，行回滚时只保留跳过/出错计数
            let mut row_stats = LoadStatistics::new();
            let outcome = {
                let row_unit = unit.savepoint()?;
                let result = {
                    let mut ctx = row_context(
                        row,
                        &self.headers,
                        &row_unit,
                        self.store,
                        &self.models,
                        &mut self.diagnostics,
                        &mut self.skips,
                        &mut row_stats,
                        &base,
                        header_rows,
                    );
                    let result = row_body(&mut ctx);
                    if result.is_err() {
                        // 仅数据故障由加载器决定计数；存储故障已在 get_or_create 中计入
                        if let Err(RowError::Fault(_)) = &result {
                            self.loader.row_errored(&mut ctx);
                        }
                    }
                    result
                };
                match result {
                    Ok(()) => {
                        row_unit.commit()?;
                        self.stats.merge(&row_stats);
                        Ok(())
                    }
                    Err(e) => {
                        // 回滚本行（默认 drop 行为为回滚），外层不受影响
                        row_unit.finish()?;
                        self.stats.merge_failures(&row_stats);
                        Err(e)
                    }
                }
            };

            let Err(row_error) = outcome else {
                continue;
            };

            let position = base
                .clone()
                .at_row(row_number(row.index, header_rows));
            match row_error {
                RowError::Skip => {
                    debug!(row_index = row.index, "行处理体要求跳过");
                    self.skips.mark(row.index);
                }
                RowError::Fault(fault) => {
                    debug!(row_index = row.index, kind = ?fault.kind(), "行数据故障");
                    let position = match &fault {
                        Fault::InvalidValue { column, .. } => position.at_column(column.clone()),
                        _ => position,
                    };
                    self.diagnostics.buffer_error(fault, position);
                }
                RowError::Store {
                    model,
                    attempted,
                    source,
                } => {
                    warn!(row_index = row.index, model = %model, error = %source, "存储故障");
                    match self.models.iter().find(|m| m.name == model) {
                        Some(schema) => {
                            let classifier =
                                FaultClassifier::new(self.store, &self.headers, &field_columns);
                            classifier.classify_and_buffer(
                                &*unit,
                                schema,
                                &attempted,
                                &source,
                                position,
                                &mut self.diagnostics,
                            );
                        }
                        None => {
                            self.diagnostics.buffer_error(
                                Fault::UnclassifiedStore {
                                    model,
                                    message: source.to_string(),
                                    attempted,
                                },
                                position,
                            );
                        }
                    }
                }
            }
        }

        info!(
            rows = dataset.len(),
            skipped_rows = self.skips.len(),
            diagnostics = self.diagnostics.len(),
            "逐行处理完成"
        );
        Ok(())
    }

    /// 终态决定
    fn decide(mut self, unit: Savepoint<'_>, dataset: &Dataset) -> LoadResult<AggregateResult> {
        let should_raise = self.diagnostics.should_raise(self.options.permissive);

        if should_raise && !self.options.defer_rollback {
            unit.finish()?;
            self.transition(LoadState::RolledBack);
            let result = self.aggregate(dataset, LoadOutcome::RolledBack);
            error!(
                errors = result.error_count,
                warnings = result.warning_count,
                "存在致命诊断，已回滚"
            );
            return Err(LoadError::Failed(result));
        }

        if self.options.dry_run {
            unit.finish()?;
            self.transition(LoadState::RolledBack);
            let result = self.aggregate(dataset, LoadOutcome::DryRun);
            info!(errors = result.error_count, "试运行完成，写入已丢弃");
            return Ok(result);
        }

        unit.commit()?;
        self.transition(LoadState::Committed);
        let outcome = if should_raise {
            LoadOutcome::Deferred
        } else {
            LoadOutcome::Committed
        };
        let result = self.aggregate(dataset, outcome);
        if should_raise {
            warn!(errors = result.error_count, "存在致命诊断，回滚决定交由外层");
        } else {
            info!(
                errors = result.error_count,
                warnings = result.warning_count,
                "加载已提交"
            );
        }
        Ok(result)
    }
}
