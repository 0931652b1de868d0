// ==========================================
// 科研数据入库引擎 - 文件内唯一性检查
// ==========================================
// 职责: 按声明的列组合检查文件内重复取值，
//       每个冲突取值产出一条诊断，并把组内全部行加入跳过集合
// 说明: 无法判断哪一次出现是“正确”的，因此组内首行同样跳过
// ==========================================

use crate::domain::Dataset;
use crate::engine::diagnostics::{row_number, Diagnostics, Fault, Position};
use crate::engine::headers::HeaderResolver;
use crate::engine::skip::SkipTracker;
use crate::importer::DataCleaner;
use std::collections::BTreeMap;
use tracing::debug;

/// 文件内唯一约束（列键组合）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UniqueConstraint {
    pub name: String,
    pub keys: Vec<String>,
}

impl UniqueConstraint {
    pub fn new(name: &str, keys: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            keys: keys.iter().map(|k| k.to_string()).collect(),
        }
    }

    /// 单列约束，以列键命名
    pub fn single(key: &str) -> Self {
        Self::new(key, &[key])
    }
}

pub struct UniquenessChecker {
    header_rows: usize,
    cleaner: DataCleaner,
}

impl UniquenessChecker {
    pub fn new(header_rows: usize) -> Self {
        Self {
            header_rows,
            cleaner: DataCleaner,
        }
    }

    /// 检查全部约束
    ///
    /// # 返回
    /// - 本次检查产生的诊断（调用方并入主聚合器）
    pub fn check(
        &self,
        dataset: &Dataset,
        constraints: &[UniqueConstraint],
        headers: &HeaderResolver,
        skips: &mut SkipTracker,
    ) -> Diagnostics {
        let mut found = Diagnostics::new();
        for constraint in constraints {
            self.check_one(dataset, constraint, headers, skips, &mut found);
        }
        found
    }

    fn check_one(
        &self,
        dataset: &Dataset,
        constraint: &UniqueConstraint,
        headers: &HeaderResolver,
        skips: &mut SkipTracker,
        found: &mut Diagnostics,
    ) {
        let columns: Vec<String> = constraint
            .keys
            .iter()
            .map(|k| headers.header_or_key(k))
            .collect();

        // 分组键 → 行索引，保持首次出现顺序
        let mut order: Vec<Vec<Option<String>>> = Vec::new();
        let mut groups: BTreeMap<Vec<Option<String>>, Vec<usize>> = BTreeMap::new();
        for row in &dataset.rows {
            let key: Vec<Option<String>> = columns
                .iter()
                .map(|c| self.cleaner.grouping_key(row.get(c)))
                .collect();
            if key.iter().all(Option::is_none) {
                continue;
            }
            let members = groups.entry(key.clone()).or_insert_with(|| {
                order.push(key);
                Vec::new()
            });
            members.push(row.index);
        }

        for key in order {
            let Some(members) = groups.get(&key) else {
                continue;
            };
            if members.len() < 2 {
                continue;
            }
            skips.mark_many(members.iter().copied());
            let value = key
                .iter()
                .map(|v| v.clone().unwrap_or_default())
                .collect::<Vec<_>>()
                .join(", ");
            debug!(
                constraint = %constraint.name,
                value = %value,
                rows = members.len(),
                "文件内重复取值"
            );

            let position = Position::new(dataset.file.as_deref(), dataset.sheet.as_deref())
                .at_column(columns.join(", "));
            found.buffer_error(
                Fault::DuplicateValues {
                    columns: columns.clone(),
                    value,
                    rows: members
                        .iter()
                        .map(|i| row_number(*i, self.header_rows))
                        .collect(),
                },
                position,
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{CellValue, Row};
    use crate::engine::headers::ColumnSpec;

    fn dataset(rows: &[(Option<&str>, Option<&str>)]) -> Dataset {
        Dataset::new(
            vec!["Name".into(), "HMDB ID".into()],
            rows.iter()
                .enumerate()
                .map(|(i, (name, id))| {
                    Row::from_pairs(
                        i,
                        [
                            ("Name", name.map(CellValue::from)),
                            ("HMDB ID", id.map(CellValue::from)),
                        ],
                    )
                })
                .collect(),
        )
    }

    fn resolver() -> HeaderResolver {
        HeaderResolver::new(
            "compounds",
            vec![
                ColumnSpec::text("NAME", "Name"),
                ColumnSpec::text("HMDB", "HMDB ID"),
            ],
        )
    }

    #[test]
    fn test_all_group_members_skipped() {
        let ds = dataset(&[
            (Some("glucose"), Some("H1")),
            (Some("lactate"), Some("H2")),
            (Some(" glucose "), Some("H3")),
            (Some("alanine"), Some("H2")),
        ]);
        let mut skips = SkipTracker::new();
        let diags = UniquenessChecker::new(1).check(
            &ds,
            &[UniqueConstraint::single("NAME"), UniqueConstraint::single("HMDB")],
            &resolver(),
            &mut skips,
        );

        assert_eq!(diags.len(), 2);
        assert_eq!(
            skips.all().iter().copied().collect::<Vec<_>>(),
            vec![0, 1, 2, 3]
        );
        let first = diags.iter().next().unwrap();
        match &first.fault {
            Fault::DuplicateValues { columns, value, rows } => {
                assert_eq!(columns, &vec!["Name".to_string()]);
                assert_eq!(value, "glucose");
                assert_eq!(rows, &vec![2, 4]);
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_absent_values_ignored() {
        let ds = dataset(&[
            (Some("glucose"), None),
            (Some("lactate"), None),
        ]);
        let mut skips = SkipTracker::new();
        let diags = UniquenessChecker::new(1).check(
            &ds,
            &[UniqueConstraint::single("HMDB")],
            &resolver(),
            &mut skips,
        );
        assert!(diags.is_empty());
        assert!(skips.is_empty());
    }

    #[test]
    fn test_multi_key_grouping_by_tuple() {
        let ds = dataset(&[
            (Some("glucose"), Some("H1")),
            (Some("glucose"), Some("H2")),
            (Some("glucose"), Some("H1")),
        ]);
        let mut skips = SkipTracker::new();
        let diags = UniquenessChecker::new(1).check(
            &ds,
            &[UniqueConstraint::new("name_id", &["NAME", "HMDB"])],
            &resolver(),
            &mut skips,
        );
        assert_eq!(diags.len(), 1);
        assert_eq!(skips.all().iter().copied().collect::<Vec<_>>(), vec![0, 2]);
    }
}
