// ==========================================
// 科研数据入库引擎 - 加载统计
// ==========================================
// 职责: 按实体类型累计 created / existed / skipped / errored
// 红线: 计数只由行处理体显式调用，引擎不推断
// ==========================================

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelCounts {
    pub created: usize,
    pub existed: usize,
    pub skipped: usize,
    pub errored: usize,
}

impl ModelCounts {
    pub fn total(&self) -> usize {
        self.created + self.existed + self.skipped + self.errored
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LoadStatistics {
    counts: BTreeMap<String, ModelCounts>,
}

impl LoadStatistics {
    pub fn new() -> Self {
        Self::default()
    }

    fn entry(&mut self, model: &str) -> &mut ModelCounts {
        self.counts.entry(model.to_string()).or_default()
    }

    /// 预先登记实体类型（报告中显示 0 计数）
    pub fn register(&mut self, model: &str) {
        self.entry(model);
    }

    pub fn created(&mut self, model: &str) {
        self.entry(model).created += 1;
    }

    pub fn existed(&mut self, model: &str) {
        self.entry(model).existed += 1;
    }

    pub fn skipped(&mut self, model: &str) {
        self.entry(model).skipped += 1;
    }

    pub fn errored(&mut self, model: &str) {
        self.entry(model).errored += 1;
    }

    pub fn get(&self, model: &str) -> ModelCounts {
        self.counts.get(model).copied().unwrap_or_default()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &ModelCounts)> {
        self.counts.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    /// 只合并跳过/出错计数（回滚行的新建/已存在不计入）
    pub fn merge_failures(&mut self, other: &LoadStatistics) {
        for (model, counts) in &other.counts {
            let entry = self.entry(model);
            entry.skipped += counts.skipped;
            entry.errored += counts.errored;
        }
    }

    /// 合并另一次尝试的统计（多工作表编排使用）
    pub fn merge(&mut self, other: &LoadStatistics) {
        for (model, counts) in &other.counts {
            let entry = self.entry(model);
            entry.created += counts.created;
            entry.existed += counts.existed;
            entry.skipped += counts.skipped;
            entry.errored += counts.errored;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counts_and_merge() {
        let mut a = LoadStatistics::new();
        a.created("Study");
        a.existed("Study");
        a.errored("Animal");
        let mut b = LoadStatistics::new();
        b.created("Study");
        b.register("Compound");
        a.merge(&b);

        assert_eq!(a.get("Study").created, 2);
        assert_eq!(a.get("Study").total(), 3);
        assert_eq!(a.get("Animal").errored, 1);
        assert_eq!(a.get("Compound"), ModelCounts::default());
        assert_eq!(a.iter().count(), 3);
    }

    #[test]
    fn test_merge_failures_drops_creations() {
        let mut row = LoadStatistics::new();
        row.created("Study");
        row.errored("Animal");
        let mut total = LoadStatistics::new();
        total.merge_failures(&row);

        assert_eq!(total.get("Study").created, 0);
        assert_eq!(total.get("Animal").errored, 1);
    }
}
