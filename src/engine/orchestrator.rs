// ==========================================
// 科研数据入库引擎 - 多工作表编排
// ==========================================
// 职责: 在同一外层事务中依次运行多个加载器（各自对应一个工作表），
//       每次尝试都强制延迟回滚，最终由编排器统一决定提交或回滚
// ==========================================

use crate::config::LoadOptions;
use crate::domain::{Dataset, Workbook};
use crate::engine::error::{LoadError, LoaderConfigError};
use crate::engine::loader::TableLoader;
use crate::engine::report::{AggregateResult, LoadOutcome};
use crate::engine::stats::LoadStatistics;
use crate::engine::transaction::LoadTransaction;
use crate::importer::{DefaultsSheet, ImportError};
use crate::repository::RecordStore;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, instrument, warn};

/// 多工作表加载的汇总结果
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MultiLoadResult {
    pub outcome: LoadOutcome,
    /// 各加载尝试结果（按运行顺序）
    pub attempts: Vec<AggregateResult>,
    pub statistics: LoadStatistics,
}

impl MultiLoadResult {
    fn new(outcome: LoadOutcome, attempts: Vec<AggregateResult>) -> Self {
        let mut statistics = LoadStatistics::new();
        for attempt in &attempts {
            statistics.merge(&attempt.statistics);
        }
        Self {
            outcome,
            attempts,
            statistics,
        }
    }

    pub fn error_count(&self) -> usize {
        self.attempts.iter().map(|a| a.error_count).sum()
    }

    pub fn warning_count(&self) -> usize {
        self.attempts.iter().map(|a| a.warning_count).sum()
    }

    pub fn render(&self) -> String {
        self.attempts
            .iter()
            .map(AggregateResult::render)
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

#[derive(Error, Debug)]
pub enum MultiLoadError {
    #[error("多工作表加载失败，已整体回滚: {} 个错误", .0.error_count())]
    Failed(MultiLoadResult),

    #[error(transparent)]
    Config(#[from] LoaderConfigError),

    #[error("默认值表读取失败: {0}")]
    Defaults(#[from] ImportError),

    #[error("事务操作失败: {0}")]
    Transaction(String),
}

impl From<rusqlite::Error> for MultiLoadError {
    fn from(err: rusqlite::Error) -> Self {
        MultiLoadError::Transaction(err.to_string())
    }
}

// ==========================================
// MultiSheetLoad
// ==========================================
pub struct MultiSheetLoad<'a> {
    store: &'a dyn RecordStore,
    steps: Vec<(&'a dyn TableLoader, LoadOptions)>,
    dry_run: bool,
    permissive: bool,
}

impl<'a> MultiSheetLoad<'a> {
    pub fn new(store: &'a dyn RecordStore) -> Self {
        Self {
            store,
            steps: Vec::new(),
            dry_run: false,
            permissive: false,
        }
    }

    pub fn dry_run(mut self, enabled: bool) -> Self {
        self.dry_run = enabled;
        self
    }

    pub fn permissive(mut self, enabled: bool) -> Self {
        self.permissive = enabled;
        self
    }

    /// 追加一个加载步骤（options.sheet 为空时使用加载器默认工作表）
    pub fn step(mut self, loader: &'a dyn TableLoader, options: LoadOptions) -> Self {
        self.steps.push((loader, options));
        self
    }

    /// 运行全部步骤并做最终决定
    #[instrument(skip_all, fields(steps = self.steps.len(), dry_run = self.dry_run))]
    pub fn run(
        self,
        conn: &mut Connection,
        workbook: &Workbook,
    ) -> Result<MultiLoadResult, MultiLoadError> {
        let defaults = DefaultsSheet::from_workbook(workbook)?;
        let mut tx = conn.transaction()?;
        let mut attempts = Vec::with_capacity(self.steps.len());

        for (loader, options) in &self.steps {
            let sheet = options
                .sheet
                .clone()
                .unwrap_or_else(|| loader.default_sheet().to_string());
            let mut options = options
                .clone()
                .defer_rollback(true)
                .dry_run(false)
                .permissive(self.permissive)
                .with_sheet(sheet.clone());
            if options.file.is_none() {
                options.file = workbook.file.clone();
            }

            // 缺失的工作表按空数据集处理，由表头检查产出致命诊断
            let empty = Dataset::default().with_sheet(sheet.clone());
            let dataset = match workbook.sheet(&sheet) {
                Some(ds) => ds,
                None => {
                    warn!(loader = %loader.name(), sheet = %sheet, "工作表不存在");
                    &empty
                }
            };

            let attempt = LoadTransaction::new(*loader, self.store, options).run(
                &mut tx,
                dataset,
                defaults.as_ref(),
            );
            match attempt {
                Ok(result) => attempts.push(result),
                Err(LoadError::MissingHeaders(result)) | Err(LoadError::Failed(result)) => {
                    attempts.push(result)
                }
                Err(LoadError::Config(e)) => return Err(MultiLoadError::Config(e)),
                Err(LoadError::Transaction(msg)) => return Err(MultiLoadError::Transaction(msg)),
            }
        }

        let should_raise = attempts.iter().any(|a| a.should_raise(self.permissive));
        if should_raise {
            tx.rollback()?;
            warn!(attempts = attempts.len(), "存在致命诊断，多工作表加载整体回滚");
            return Err(MultiLoadError::Failed(MultiLoadResult::new(
                LoadOutcome::RolledBack,
                attempts,
            )));
        }
        if self.dry_run {
            tx.rollback()?;
            // 各尝试在外层事务内以非试运行方式执行，后续工作表可见前序写入
            for attempt in &mut attempts {
                attempt.outcome = LoadOutcome::DryRun;
            }
            info!("多工作表试运行完成，写入已丢弃");
            return Ok(MultiLoadResult::new(LoadOutcome::DryRun, attempts));
        }
        tx.commit()?;
        info!(attempts = attempts.len(), "多工作表加载已提交");
        Ok(MultiLoadResult::new(LoadOutcome::Committed, attempts))
    }
}
