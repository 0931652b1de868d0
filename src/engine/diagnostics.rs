// ==========================================
// 科研数据入库引擎 - 诊断聚合器
// ==========================================
// 职责: 缓存一次加载尝试中捕获的全部故障（错误/警告、致命/非致命），
//       并在尝试结束时把同类故障合并为一条汇总
// 红线: 诊断按发现顺序追加；除汇总外不修改已缓存条目
// ==========================================

use crate::domain::{CellValue, ColumnKind};
use crate::engine::requirement::RequirementNode;
use crate::repository::FieldValues;
use serde::{Deserialize, Serialize};
use std::backtrace::{Backtrace, BacktraceStatus};
use std::fmt;
use std::panic::Location;
use thiserror::Error;
use tracing::debug;

/// 本 crate 的栈帧标识（用于过滤伪栈）
const CRATE_FRAME_MARKER: &str = "research_data_loader";

// ==========================================
// FaultKind - 故障类别
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FaultKind {
    MissingHeaders,
    UnknownHeaders,
    DuplicateHeaderName,
    RequiredColumnValue,
    DuplicateValues,
    ConflictingValue,
    RequiredValue,
    InvalidChoice,
    UnknownDefaultColumn,
    InvalidValue,
    UnclassifiedStore,
    Summary,
}

impl FaultKind {
    /// 尝试结束时需要合并的类别（按汇总顺序）
    pub const SUMMARIZED: [FaultKind; 4] = [
        FaultKind::ConflictingValue,
        FaultKind::RequiredValue,
        FaultKind::DuplicateValues,
        FaultKind::RequiredColumnValue,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            FaultKind::MissingHeaders => "缺少表头",
            FaultKind::UnknownHeaders => "未识别表头",
            FaultKind::DuplicateHeaderName => "表头名重复",
            FaultKind::RequiredColumnValue => "必填列取值缺失",
            FaultKind::DuplicateValues => "文件内重复取值",
            FaultKind::ConflictingValue => "与已有记录冲突",
            FaultKind::RequiredValue => "存储层必填字段缺失",
            FaultKind::InvalidChoice => "取值不在允许范围",
            FaultKind::UnknownDefaultColumn => "默认值指向未知列",
            FaultKind::InvalidValue => "取值类型不符",
            FaultKind::UnclassifiedStore => "未分类存储故障",
            FaultKind::Summary => "汇总",
        }
    }
}

impl fmt::Display for FaultKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// 冲突记录的单字段差异
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDifference {
    pub field: String,
    pub existing: Option<CellValue>,
    pub attempted: Option<CellValue>,
}

impl fmt::Display for FieldDifference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: 已有 [{}] / 文件 [{}]",
            self.field,
            display_opt(self.existing.as_ref()),
            display_opt(self.attempted.as_ref())
        )
    }
}

fn display_opt(value: Option<&CellValue>) -> String {
    value.map(|v| v.to_string()).unwrap_or_else(|| "空".to_string())
}

fn join_rows(rows: &[usize]) -> String {
    rows.iter()
        .map(|r| r.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

fn join_differences(diffs: &[FieldDifference]) -> String {
    diffs
        .iter()
        .map(|d| d.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

fn render_summary(kind: &FaultKind, members: &[Diagnostic]) -> String {
    let mut lines = vec![format!("{}: 共 {} 处", kind, members.len())];
    for m in members {
        lines.push(format!("  - [{}] {}", m.position, m.fault));
    }
    lines.join("\n")
}

// ==========================================
// Fault - 单个故障
// ==========================================
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Fault {
    #[error("缺少必需表头: {missing}")]
    MissingHeaders {
        missing: RequirementNode,
        all_required: bool,
    },

    #[error("存在未识别的表头: {}", .headers.join(", "))]
    UnknownHeaders { headers: Vec<String> },

    #[error("表头名 \"{name}\" 被多个列键使用: {}", .keys.join(", "))]
    DuplicateHeaderName { name: String, keys: Vec<String> },

    #[error("必填取值缺失: {missing}")]
    RequiredColumnValue { missing: RequirementNode },

    #[error("列 [{}] 取值 [{value}] 在文件内重复，行号: {}", .columns.join(", "), join_rows(.rows))]
    DuplicateValues {
        columns: Vec<String>,
        value: String,
        rows: Vec<usize>,
    },

    #[error("{model} 与已有记录冲突: {}", join_differences(.differences))]
    ConflictingValue {
        model: String,
        differences: Vec<FieldDifference>,
    },

    #[error("{model}.{field} 为必填字段（文件列: {}）", .column.as_deref().unwrap_or("无对应列"))]
    RequiredValue {
        model: String,
        field: String,
        column: Option<String>,
    },

    #[error("{model}.{field} 的取值 [{value}] 不在允许范围 {allowed:?}")]
    InvalidChoice {
        model: String,
        field: String,
        value: String,
        allowed: Vec<String>,
    },

    #[error("默认值表中工作表 \"{sheet}\" 的列 \"{column}\" 不存在")]
    UnknownDefaultColumn { sheet: String, column: String },

    #[error("列 \"{column}\" 的取值 [{value}] 不是 {expected}")]
    InvalidValue {
        column: String,
        value: String,
        expected: ColumnKind,
    },

    #[error("{model} 存储失败: {message}")]
    UnclassifiedStore {
        model: String,
        message: String,
        attempted: FieldValues,
    },

    #[error("{}", render_summary(.summarized, .members))]
    Summary {
        summarized: FaultKind,
        members: Vec<Diagnostic>,
    },
}

impl Fault {
    pub fn kind(&self) -> FaultKind {
        match self {
            Fault::MissingHeaders { .. } => FaultKind::MissingHeaders,
            Fault::UnknownHeaders { .. } => FaultKind::UnknownHeaders,
            Fault::DuplicateHeaderName { .. } => FaultKind::DuplicateHeaderName,
            Fault::RequiredColumnValue { .. } => FaultKind::RequiredColumnValue,
            Fault::DuplicateValues { .. } => FaultKind::DuplicateValues,
            Fault::ConflictingValue { .. } => FaultKind::ConflictingValue,
            Fault::RequiredValue { .. } => FaultKind::RequiredValue,
            Fault::InvalidChoice { .. } => FaultKind::InvalidChoice,
            Fault::UnknownDefaultColumn { .. } => FaultKind::UnknownDefaultColumn,
            Fault::InvalidValue { .. } => FaultKind::InvalidValue,
            Fault::UnclassifiedStore { .. } => FaultKind::UnclassifiedStore,
            Fault::Summary { .. } => FaultKind::Summary,
        }
    }
}

// ==========================================
// Position - 文件位置
// ==========================================
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    pub file: Option<String>,
    pub sheet: Option<String>,
    /// 1 基行号（已计入表头行数）
    pub row: Option<usize>,
    pub column: Option<String>,
}

impl Position {
    pub fn new(file: Option<&str>, sheet: Option<&str>) -> Self {
        Self {
            file: file.map(str::to_string),
            sheet: sheet.map(str::to_string),
            row: None,
            column: None,
        }
    }

    pub fn at_row(mut self, row: usize) -> Self {
        self.row = Some(row);
        self
    }

    pub fn at_column(mut self, column: impl Into<String>) -> Self {
        self.column = Some(column.into());
        self
    }
}

/// 零基行索引 → 1 基行号
pub fn row_number(index: usize, header_rows: usize) -> usize {
    index + header_rows + 1
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();
        if let Some(file) = &self.file {
            parts.push(format!("文件 {}", file));
        }
        if let Some(sheet) = &self.sheet {
            parts.push(format!("工作表 {}", sheet));
        }
        if let Some(row) = self.row {
            parts.push(format!("第 {} 行", row));
        }
        if let Some(column) = &self.column {
            parts.push(format!("列 {}", column));
        }
        if parts.is_empty() {
            write!(f, "-")
        } else {
            write!(f, "{}", parts.join(", "))
        }
    }
}

// ==========================================
// Diagnostic - 已缓存的故障
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub fault: Fault,
    pub is_error: bool,
    pub is_fatal: bool,
    pub position: Position,
    /// 缓存时的调用链（仅本 crate 栈帧）
    pub trace: Vec<String>,
}

impl Diagnostic {
    pub fn kind(&self) -> FaultKind {
        self.fault.kind()
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let level = match (self.is_error, self.is_fatal) {
            (true, true) => "错误",
            (true, false) => "错误(非致命)",
            (false, true) => "警告(致命)",
            (false, false) => "警告",
        };
        write!(f, "[{}] {} ({})", level, self.fault, self.position)
    }
}

#[track_caller]
fn capture_trace() -> Vec<String> {
    let caller = Location::caller();
    let mut trace = vec![format!("{}:{}", caller.file(), caller.line())];

    // 仅在 RUST_BACKTRACE 开启时才有完整调用链
    let backtrace = Backtrace::capture();
    if backtrace.status() == BacktraceStatus::Captured {
        trace.extend(
            backtrace
                .to_string()
                .lines()
                .map(str::trim)
                .filter(|line| line.contains(CRATE_FRAME_MARKER))
                .filter(|line| !line.contains("capture_trace"))
                .map(str::to_string),
        );
    }
    trace
}

// ==========================================
// Diagnostics - 聚合器
// ==========================================
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Diagnostics {
    items: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    /// 缓存错误（默认致命）
    #[track_caller]
    pub fn buffer_error(&mut self, fault: Fault, position: Position) -> &Diagnostic {
        self.buffer(fault, position, true, true)
    }

    /// 缓存错误并指定是否致命
    #[track_caller]
    pub fn buffer_error_with(
        &mut self,
        fault: Fault,
        position: Position,
        is_fatal: bool,
    ) -> &Diagnostic {
        self.buffer(fault, position, true, is_fatal)
    }

    /// 缓存警告（默认非致命）
    #[track_caller]
    pub fn buffer_warning(&mut self, fault: Fault, position: Position) -> &Diagnostic {
        self.buffer(fault, position, false, false)
    }

    /// 缓存警告并指定是否致命
    #[track_caller]
    pub fn buffer_warning_with(
        &mut self,
        fault: Fault,
        position: Position,
        is_fatal: bool,
    ) -> &Diagnostic {
        self.buffer(fault, position, false, is_fatal)
    }

    #[track_caller]
    fn buffer(
        &mut self,
        fault: Fault,
        position: Position,
        is_error: bool,
        is_fatal: bool,
    ) -> &Diagnostic {
        debug!(
            kind = ?fault.kind(),
            is_error = is_error,
            is_fatal = is_fatal,
            position = %position,
            "诊断已缓存"
        );
        let trace = capture_trace();
        let index = self.items.len();
        self.items.push(Diagnostic {
            fault,
            is_error,
            is_fatal,
            position,
            trace,
        });
        &self.items[index]
    }

    /// 是否应向调用方抛出
    ///
    /// # 参数
    /// - permissive: 校验模式下任何诊断（包括警告）都视为致命；
    ///   只改变解读方式，不改写已缓存的标志
    pub fn should_raise(&self, permissive: bool) -> bool {
        if permissive {
            !self.items.is_empty()
        } else {
            self.is_fatal()
        }
    }

    pub fn is_fatal(&self) -> bool {
        self.items.iter().any(|d| d.is_fatal)
    }

    /// 把同类诊断合并为一条汇总
    ///
    /// 汇总插入在首个成员的位置；is_error / is_fatal 取成员的“或”。
    ///
    /// # 返回
    /// - None: 该类别没有诊断
    pub fn summarize(&mut self, kind: FaultKind) -> Option<&Diagnostic> {
        let first = self.items.iter().position(|d| d.kind() == kind)?;

        let (members, rest): (Vec<Diagnostic>, Vec<Diagnostic>) =
            std::mem::take(&mut self.items)
                .into_iter()
                .partition(|d| d.kind() == kind);

        let is_error = members.iter().any(|d| d.is_error);
        let is_fatal = members.iter().any(|d| d.is_fatal);
        let position = Position {
            file: members[0].position.file.clone(),
            sheet: members[0].position.sheet.clone(),
            row: None,
            column: None,
        };
        debug!(kind = ?kind, members = members.len(), "同类诊断已汇总");

        self.items = rest;
        self.items.insert(
            first,
            Diagnostic {
                fault: Fault::Summary {
                    summarized: kind,
                    members,
                },
                is_error,
                is_fatal,
                position,
                trace: Vec::new(),
            },
        );
        self.items.get(first)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.items.iter()
    }

    pub fn of_kind(&self, kind: FaultKind) -> impl Iterator<Item = &Diagnostic> {
        self.items.iter().filter(move |d| d.kind() == kind)
    }

    pub fn error_count(&self) -> usize {
        self.items.iter().filter(|d| d.is_error).count()
    }

    pub fn warning_count(&self) -> usize {
        self.items.iter().filter(|d| !d.is_error).count()
    }

    /// 是否已有完全相同的故障文本（用于去重）
    pub fn contains_message(&self, kind: FaultKind, message: &str) -> bool {
        self.of_kind(kind).any(|d| d.fault.to_string() == message)
    }

    /// 追加另一聚合器的全部诊断（保持顺序）
    pub fn extend(&mut self, other: Diagnostics) {
        self.items.extend(other.items);
    }

    pub fn into_vec(self) -> Vec<Diagnostic> {
        self.items
    }
}
