// ==========================================
// 文件内唯一性属性测试
// ==========================================
// 随机生成含缺失值的键列，与直接分组计数对照:
// 每个冲突取值一条诊断，冲突组内全部行进入跳过集合
// ==========================================

use proptest::prelude::*;
use research_data_loader::engine::{
    ColumnSpec, Fault, FaultKind, HeaderResolver, SkipTracker, UniqueConstraint,
    UniquenessChecker,
};
use research_data_loader::{CellValue, Dataset, Row};
use std::collections::{BTreeMap, BTreeSet};

const HEADER_ROWS: usize = 1;

// 含首尾空白与 "nan"，覆盖分组键规范化
const POOL: [Option<&str>; 6] = [None, Some("a"), Some(" a "), Some("b"), Some("c"), Some("nan")];

fn resolver() -> HeaderResolver {
    HeaderResolver::new(
        "compounds",
        vec![
            ColumnSpec::text("NAME", "Name"),
            ColumnSpec::text("HMDB", "HMDB ID"),
        ],
    )
}

fn cell_strategy() -> impl Strategy<Value = Option<&'static str>> {
    prop::sample::select(POOL.to_vec())
}

fn rows_strategy() -> impl Strategy<Value = Vec<(Option<&'static str>, Option<&'static str>)>> {
    prop::collection::vec((cell_strategy(), cell_strategy()), 0..12)
}

fn constraints_strategy() -> impl Strategy<Value = Vec<UniqueConstraint>> {
    prop::sample::subsequence(vec![0usize, 1, 2], 0..=3).prop_map(|picked| {
        picked
            .into_iter()
            .map(|i| match i {
                0 => UniqueConstraint::single("NAME"),
                1 => UniqueConstraint::single("HMDB"),
                _ => UniqueConstraint::new("NAME_HMDB", &["NAME", "HMDB"]),
            })
            .collect()
    })
}

fn build_dataset(rows: &[(Option<&str>, Option<&str>)]) -> Dataset {
    Dataset::new(
        vec!["Name".to_string(), "HMDB ID".to_string()],
        rows.iter()
            .enumerate()
            .map(|(i, (name, id))| {
                Row::from_pairs(
                    i,
                    [
                        ("Name".to_string(), name.map(CellValue::from)),
                        ("HMDB ID".to_string(), id.map(CellValue::from)),
                    ],
                )
            })
            .collect(),
    )
}

fn normalized(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty() && !v.eq_ignore_ascii_case("nan"))
        .map(str::to_string)
}

/// 直接分组：返回每个冲突组的 1 基行号（组内升序）
fn expected_groups(
    rows: &[(Option<&str>, Option<&str>)],
    constraint: &UniqueConstraint,
) -> Vec<Vec<usize>> {
    let mut groups: BTreeMap<Vec<Option<String>>, Vec<usize>> = BTreeMap::new();
    for (index, (name, id)) in rows.iter().enumerate() {
        let key: Vec<Option<String>> = constraint
            .keys
            .iter()
            .map(|k| if k == "NAME" { normalized(*name) } else { normalized(*id) })
            .collect();
        if key.iter().all(Option::is_none) {
            continue;
        }
        groups.entry(key).or_default().push(index + HEADER_ROWS + 1);
    }
    groups.into_values().filter(|g| g.len() >= 2).collect()
}

proptest! {
    #[test]
    fn duplicate_groups_match_direct_grouping(
        rows in rows_strategy(),
        constraints in constraints_strategy(),
    ) {
        let dataset = build_dataset(&rows);
        let mut skips = SkipTracker::new();
        let found = UniquenessChecker::new(HEADER_ROWS).check(
            &dataset,
            &constraints,
            &resolver(),
            &mut skips,
        );

        let mut expected: Vec<Vec<usize>> = constraints
            .iter()
            .flat_map(|c| expected_groups(&rows, c))
            .collect();
        let expected_skips: BTreeSet<usize> = expected
            .iter()
            .flatten()
            .map(|line| line - HEADER_ROWS - 1)
            .collect();

        // 每个冲突取值恰好一条诊断
        prop_assert_eq!(found.len(), expected.len());
        prop_assert!(found.iter().all(|d| d.kind() == FaultKind::DuplicateValues));

        let mut actual: Vec<Vec<usize>> = found
            .iter()
            .filter_map(|d| match &d.fault {
                Fault::DuplicateValues { rows, .. } => Some(rows.clone()),
                _ => None,
            })
            .collect();
        actual.sort();
        expected.sort();
        prop_assert_eq!(actual, expected);

        // 冲突组内全部行（含首行）进入跳过集合，其余行不受影响
        prop_assert_eq!(skips.all(), &expected_skips);
    }

    #[test]
    fn rows_without_any_key_value_never_skipped(
        rows in rows_strategy(),
        constraints in constraints_strategy(),
    ) {
        let dataset = build_dataset(&rows);
        let mut skips = SkipTracker::new();
        UniquenessChecker::new(HEADER_ROWS).check(&dataset, &constraints, &resolver(), &mut skips);

        for (index, (name, id)) in rows.iter().enumerate() {
            if normalized(*name).is_none() && normalized(*id).is_none() {
                prop_assert!(!skips.is_skipped(index));
            }
        }
    }
}
