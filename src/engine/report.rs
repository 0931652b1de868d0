// ==========================================
// 科研数据入库引擎 - 加载结果
// ==========================================
// 职责: 一次加载尝试的终态（诊断、计数、统计、结局）
// 说明: 由单个加载尝试独占，不跨尝试共享
// ==========================================

use crate::engine::diagnostics::Diagnostic;
use crate::engine::stats::LoadStatistics;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// 加载尝试的结局
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadOutcome {
    /// 已提交
    Committed,
    /// 因致命故障回滚
    RolledBack,
    /// 试运行：全部处理完毕后主动丢弃
    DryRun,
    /// 延迟回滚：本次已释放工作单元，最终决定交给外层编排
    Deferred,
}

impl fmt::Display for LoadOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            LoadOutcome::Committed => "已提交",
            LoadOutcome::RolledBack => "已回滚",
            LoadOutcome::DryRun => "试运行(已丢弃)",
            LoadOutcome::Deferred => "延迟决定",
        };
        write!(f, "{}", label)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregateResult {
    pub attempt_id: Uuid,
    pub loader: String,
    pub file: Option<String>,
    pub sheet: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub outcome: LoadOutcome,
    pub diagnostics: Vec<Diagnostic>,
    pub error_count: usize,
    pub warning_count: usize,
    /// 任一诊断致命
    pub is_fatal: bool,
    pub statistics: LoadStatistics,
}

impl AggregateResult {
    /// 按调用方模式重新解读（校验模式下警告也视为致命）
    pub fn should_raise(&self, permissive: bool) -> bool {
        if permissive {
            !self.diagnostics.is_empty()
        } else {
            self.is_fatal
        }
    }

    /// 多行可读报告（顺序与诊断缓存顺序一致）
    pub fn render(&self) -> String {
        let mut lines = vec![
            format!("加载器: {}", self.loader),
            format!("尝试ID: {}", self.attempt_id),
        ];
        if let Some(file) = &self.file {
            lines.push(format!("文件: {}", file));
        }
        if let Some(sheet) = &self.sheet {
            lines.push(format!("工作表: {}", sheet));
        }
        lines.push(format!("结局: {}", self.outcome));
        lines.push(format!(
            "错误: {}  警告: {}  致命: {}",
            self.error_count,
            self.warning_count,
            if self.is_fatal { "是" } else { "否" }
        ));

        if !self.statistics.is_empty() {
            lines.push("统计:".to_string());
            for (model, counts) in self.statistics.iter() {
                lines.push(format!(
                    "  {}: 新建 {} / 已存在 {} / 跳过 {} / 出错 {}",
                    model, counts.created, counts.existed, counts.skipped, counts.errored
                ));
            }
        }

        if !self.diagnostics.is_empty() {
            lines.push("诊断:".to_string());
            for (i, d) in self.diagnostics.iter().enumerate() {
                lines.push(format!("  {}. {}", i + 1, d));
            }
        }
        lines.join("\n")
    }
}

impl fmt::Display for AggregateResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({}): {} 个错误，{} 个警告",
            self.loader, self.outcome, self.error_count, self.warning_count
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_is_stable() {
        let now = Utc::now();
        let mut statistics = LoadStatistics::new();
        statistics.created("Compound");
        let result = AggregateResult {
            attempt_id: Uuid::nil(),
            loader: "compounds".into(),
            file: Some("compounds.tsv".into()),
            sheet: None,
            started_at: now,
            finished_at: now,
            outcome: LoadOutcome::Committed,
            diagnostics: Vec::new(),
            error_count: 0,
            warning_count: 0,
            is_fatal: false,
            statistics,
        };
        let text = result.render();
        assert!(text.contains("文件: compounds.tsv"));
        assert!(text.contains("Compound: 新建 1 / 已存在 0 / 跳过 0 / 出错 0"));
        assert_eq!(text, result.render());
        assert!(!result.should_raise(true));
    }
}
