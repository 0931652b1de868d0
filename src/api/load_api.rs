// ==========================================
// 科研数据入库引擎 - 加载 API
// ==========================================
// 职责: 异步门面，封装文件读取 + 配置合并 + 加载事务
// 并发: 同一实例上的加载尝试串行执行（tokio Mutex），
//       同步引擎在 spawn_blocking 中运行
// ==========================================

use crate::api::error::{ApiError, ApiResult};
use crate::config::{ConfigManager, LoadOptions};
use crate::db::open_sqlite_connection;
use crate::domain::{Dataset, Workbook};
use crate::engine::orchestrator::{MultiLoadResult, MultiSheetLoad};
use crate::engine::report::{AggregateResult, LoadOutcome};
use crate::engine::stats::LoadStatistics;
use crate::engine::transaction::LoadTransaction;
use crate::importer::{DefaultsSheet, ImportError, UniversalFileParser};
use crate::loaders::LoaderKind;
use crate::repository::SqliteRecordStore;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{info, instrument, warn};

/// 加载 API 响应
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoadApiResponse {
    /// 加载器名称（多工作表时以逗号连接）
    pub loader: String,
    pub outcome: LoadOutcome,
    pub statistics: LoadStatistics,
    pub error_count: usize,
    pub warning_count: usize,
    /// 人类可读的诊断报告
    pub report: String,
    /// 耗时（毫秒）
    pub elapsed_ms: i64,
}

impl LoadApiResponse {
    fn from_result(result: &AggregateResult, elapsed: Duration) -> Self {
        Self {
            loader: result.loader.clone(),
            outcome: result.outcome,
            statistics: result.statistics.clone(),
            error_count: result.error_count,
            warning_count: result.warning_count,
            report: result.render(),
            elapsed_ms: elapsed.as_millis() as i64,
        }
    }

    fn from_multi(loaders: &[LoaderKind], result: &MultiLoadResult, elapsed: Duration) -> Self {
        Self {
            loader: loaders
                .iter()
                .map(|k| k.name())
                .collect::<Vec<_>>()
                .join(","),
            outcome: result.outcome,
            statistics: result.statistics.clone(),
            error_count: result.error_count(),
            warning_count: result.warning_count(),
            report: result.render(),
            elapsed_ms: elapsed.as_millis() as i64,
        }
    }
}

/// 加载 API
pub struct LoadApi {
    db_path: String,
    gate: Mutex<()>,
}

impl LoadApi {
    /// 创建新的 LoadApi 实例
    pub fn new(db_path: impl Into<String>) -> Self {
        Self {
            db_path: db_path.into(),
            gate: Mutex::new(()),
        }
    }

    pub fn db_path(&self) -> &str {
        &self.db_path
    }

    /// 加载单个表格文件
    ///
    /// # 参数
    /// - loader: 加载器名称（如 "compounds"）
    /// - file_path: .csv / .tsv / .xlsx / .xls 文件路径
    /// - options: 调用方选项（持久化的加载器配置会作为调用方层补充合并）
    ///
    /// # 返回
    /// - Ok(LoadApiResponse): 已提交、试运行或延迟回滚的结果
    /// - Err(ApiError::LoadFailed): 存在致命诊断，已回滚
    #[instrument(skip(self, options))]
    pub async fn load_file(
        &self,
        loader: &str,
        file_path: &str,
        options: LoadOptions,
    ) -> ApiResult<LoadApiResponse> {
        let kind: LoaderKind = loader.parse()?;
        self.run_single(kind, file_path, options).await
    }

    /// 校验文件（试运行 + 宽松模式），不写入任何数据
    ///
    /// 校验失败同样以响应返回，由调用方查看 error_count / report
    #[instrument(skip(self, options))]
    pub async fn validate_file(
        &self,
        loader: &str,
        file_path: &str,
        options: LoadOptions,
    ) -> ApiResult<LoadApiResponse> {
        let kind: LoaderKind = loader.parse()?;
        let options = options.dry_run(true).permissive(true);
        let started = Instant::now();
        match self.run_single(kind, file_path, options).await {
            Err(ApiError::LoadFailed(result)) => {
                info!(
                    loader = %result.loader,
                    errors = result.error_count,
                    warnings = result.warning_count,
                    "校验完成，存在诊断"
                );
                Ok(LoadApiResponse::from_result(&result, started.elapsed()))
            }
            other => other,
        }
    }

    /// 在同一事务中按顺序加载工作簿的多个工作表
    #[instrument(skip(self))]
    pub async fn load_workbook(
        &self,
        file_path: &str,
        loaders: Vec<LoaderKind>,
        dry_run: bool,
    ) -> ApiResult<LoadApiResponse> {
        if loaders.is_empty() {
            return Err(ApiError::InvalidInput("未指定加载器".to_string()));
        }

        let _guard = self.gate.lock().await;
        let db_path = self.db_path.clone();
        let file_path = file_path.to_string();
        let started = Instant::now();

        let (loaders, result) = tokio::task::spawn_blocking(move || {
            let result = load_workbook_blocking(&db_path, &file_path, &loaders, dry_run)?;
            Ok::<_, ApiError>((loaders, result))
        })
        .await
        .map_err(|e| ApiError::InternalError(format!("加载任务异常终止: {}", e)))??;

        Ok(LoadApiResponse::from_multi(
            &loaders,
            &result,
            started.elapsed(),
        ))
    }

    async fn run_single(
        &self,
        kind: LoaderKind,
        file_path: &str,
        options: LoadOptions,
    ) -> ApiResult<LoadApiResponse> {
        let _guard = self.gate.lock().await;
        let db_path = self.db_path.clone();
        let file_path = file_path.to_string();
        let started = Instant::now();

        let result = tokio::task::spawn_blocking(move || {
            load_file_blocking(&db_path, kind, &file_path, options)
        })
        .await
        .map_err(|e| ApiError::InternalError(format!("加载任务异常终止: {}", e)))??;

        Ok(LoadApiResponse::from_result(&result, started.elapsed()))
    }
}

// ==========================================
// 同步执行体
// ==========================================

fn load_file_blocking(
    db_path: &str,
    kind: LoaderKind,
    file_path: &str,
    options: LoadOptions,
) -> ApiResult<AggregateResult> {
    let loader = kind.loader();
    let mut options = merge_saved_profile(db_path, loader.name(), options)?;
    if options.file.is_none() {
        options.file = Some(file_path.to_string());
    }
    let sheet = options
        .sheet
        .clone()
        .unwrap_or_else(|| loader.default_sheet().to_string());

    let workbook = UniversalFileParser.parse(file_path)?;
    let defaults = DefaultsSheet::from_workbook(&workbook)?;
    let dataset = select_sheet(workbook, &sheet, file_path)?;

    let mut conn = open_sqlite_connection(db_path)?;
    let store = SqliteRecordStore::new();
    let result = LoadTransaction::new(loader.as_ref(), &store, options).run(
        &mut conn,
        &dataset,
        defaults.as_ref(),
    )?;
    Ok(result)
}

fn load_workbook_blocking(
    db_path: &str,
    file_path: &str,
    kinds: &[LoaderKind],
    dry_run: bool,
) -> ApiResult<MultiLoadResult> {
    let workbook = UniversalFileParser.parse(file_path)?;
    let loaders: Vec<_> = kinds.iter().map(|k| k.loader()).collect();

    let mut steps = Vec::with_capacity(loaders.len());
    for loader in &loaders {
        steps.push(merge_saved_profile(db_path, loader.name(), LoadOptions::new())?);
    }

    let mut conn = open_sqlite_connection(db_path)?;
    let store = SqliteRecordStore::new();
    let mut load = MultiSheetLoad::new(&store).dry_run(dry_run);
    for (loader, options) in loaders.iter().zip(steps) {
        load = load.step(loader.as_ref(), options);
    }
    Ok(load.run(&mut conn, &workbook)?)
}

/// 合并持久化的加载器配置；配置表不存在时原样返回
fn merge_saved_profile(db_path: &str, loader: &str, options: LoadOptions) -> ApiResult<LoadOptions> {
    let manager = ConfigManager::new(db_path)
        .map_err(|e| ApiError::DatabaseError(format!("打开配置库失败: {}", e)))?;
    let profile = manager
        .get_loader_profile(loader)
        .map_err(|e| ApiError::DatabaseError(format!("读取加载器配置失败: {}", e)))?;
    Ok(match profile {
        Some(profile) => options.merge_profile(&profile),
        None => options,
    })
}

/// 选取目标工作表；CSV 等单表文件直接使用唯一的数据集
fn select_sheet(workbook: Workbook, sheet: &str, file_path: &str) -> ApiResult<Dataset> {
    let Workbook { sheets, .. } = workbook;
    if sheets.len() == 1 && sheets[0].sheet.is_none() {
        let mut dataset = sheets.into_iter().next().unwrap_or_default();
        dataset.sheet = Some(sheet.to_string());
        return Ok(dataset);
    }
    match sheets.into_iter().find(|s| s.sheet.as_deref() == Some(sheet)) {
        Some(dataset) => Ok(dataset),
        None => {
            warn!(file = %file_path, sheet = %sheet, "工作表不存在");
            Err(ImportError::SheetNotFound {
                file: file_path.to_string(),
                sheet: sheet.to_string(),
            }
            .into())
        }
    }
}
