// ==========================================
// 科研数据入库引擎 - 跳过行集合
// ==========================================
// 职责: 记录本次加载尝试中不得持久化的行（零基索引）
// 红线: 只增不减；新的加载尝试使用新的实例
// ==========================================

use std::collections::BTreeSet;

#[derive(Debug, Clone, Default)]
pub struct SkipTracker {
    rows: BTreeSet<usize>,
}

impl SkipTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// 标记一行（重复标记无副作用）
    ///
    /// # 返回
    /// - true: 首次标记
    pub fn mark(&mut self, row_index: usize) -> bool {
        self.rows.insert(row_index)
    }

    pub fn mark_many<I>(&mut self, row_indexes: I)
    where
        I: IntoIterator<Item = usize>,
    {
        self.rows.extend(row_indexes);
    }

    pub fn is_skipped(&self, row_index: usize) -> bool {
        self.rows.contains(&row_index)
    }

    pub fn all(&self) -> &BTreeSet<usize> {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}
