// ==========================================
// 科研数据入库引擎 - 需求树求值器
// ==========================================
// 职责: 对 AND/OR 需求树求值，返回未满足的子树
// 用途: 表头存在性检查 + 逐行必填取值检查（同一函数）
// 红线: 纯函数；按树的声明顺序遍历，结果与集合迭代顺序无关
// ==========================================

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

// ==========================================
// RequirementNode - 显式标记的需求树
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequirementNode {
    Leaf(String),
    /// 子项全部满足
    All(Vec<RequirementNode>),
    /// 任一子项满足
    Any(Vec<RequirementNode>),
}

/// 交替嵌套的列表字面量（第 0 层为 AND，逐层翻转）
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Nested {
    Key(String),
    Group(Vec<Nested>),
}

impl RequirementNode {
    pub fn leaf(key: impl Into<String>) -> Self {
        RequirementNode::Leaf(key.into())
    }

    pub fn all<I, K>(keys: I) -> Self
    where
        I: IntoIterator<Item = K>,
        K: Into<RequirementNode>,
    {
        RequirementNode::All(keys.into_iter().map(Into::into).collect())
    }

    pub fn any<I, K>(keys: I) -> Self
    where
        I: IntoIterator<Item = K>,
        K: Into<RequirementNode>,
    {
        RequirementNode::Any(keys.into_iter().map(Into::into).collect())
    }

    /// 从交替嵌套字面量构造
    pub fn from_alternating(nested: &Nested) -> Self {
        Self::from_alternating_at(nested, true)
    }

    fn from_alternating_at(nested: &Nested, is_all: bool) -> Self {
        match nested {
            Nested::Key(k) => RequirementNode::Leaf(k.clone()),
            Nested::Group(children) => {
                let mapped = children
                    .iter()
                    .map(|c| Self::from_alternating_at(c, !is_all))
                    .collect();
                if is_all {
                    RequirementNode::All(mapped)
                } else {
                    RequirementNode::Any(mapped)
                }
            }
        }
    }

    /// 是否为 AND 组（叶子视为 AND）
    pub fn is_all(&self) -> bool {
        !matches!(self, RequirementNode::Any(_))
    }

    /// 按声明顺序列出全部叶子
    pub fn leaves(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_leaves(&mut out);
        out
    }

    fn collect_leaves<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            RequirementNode::Leaf(k) => out.push(k.as_str()),
            RequirementNode::All(children) | RequirementNode::Any(children) => {
                for child in children {
                    child.collect_leaves(out);
                }
            }
        }
    }

    /// 替换叶子（例如表头键 → 生效表头名），结构不变
    pub fn map_leaves<F>(&self, f: &F) -> RequirementNode
    where
        F: Fn(&str) -> String,
    {
        match self {
            RequirementNode::Leaf(k) => RequirementNode::Leaf(f(k)),
            RequirementNode::All(children) => {
                RequirementNode::All(children.iter().map(|c| c.map_leaves(f)).collect())
            }
            RequirementNode::Any(children) => {
                RequirementNode::Any(children.iter().map(|c| c.map_leaves(f)).collect())
            }
        }
    }

    fn render(&self, f: &mut fmt::Formatter<'_>, nested: bool) -> fmt::Result {
        let (children, op) = match self {
            RequirementNode::Leaf(k) => return write!(f, "\"{}\"", k),
            RequirementNode::All(children) => (children, " AND "),
            RequirementNode::Any(children) => (children, " OR "),
        };
        let wrap = nested && children.len() > 1;
        if wrap {
            write!(f, "(")?;
        }
        for (i, child) in children.iter().enumerate() {
            if i > 0 {
                write!(f, "{}", op)?;
            }
            child.render(f, true)?;
        }
        if wrap {
            write!(f, ")")?;
        }
        Ok(())
    }
}

impl From<&str> for RequirementNode {
    fn from(key: &str) -> Self {
        RequirementNode::Leaf(key.to_string())
    }
}

impl From<String> for RequirementNode {
    fn from(key: String) -> Self {
        RequirementNode::Leaf(key)
    }
}

impl fmt::Display for RequirementNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.render(f, false)
    }
}

// ==========================================
// 求值
// ==========================================

/// 求值结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Evaluation {
    /// 未满足的子树（None 表示已满足）
    pub missing: Option<RequirementNode>,
    /// 返回子树的顶层是否为 AND
    pub top_level_is_all: bool,
}

impl Evaluation {
    pub fn is_satisfied(&self) -> bool {
        self.missing.is_none()
    }
}

/// 对已提供集合求值
///
/// # 参数
/// - supplied: 已提供的键（或表头名）
/// - tree: 需求树
///
/// # 返回
/// - missing 为 None: 已满足，top_level_is_all 为树本身的运算符
/// - missing 为 Some: 未满足部分；单元素分组会被展开一层
pub fn evaluate(supplied: &BTreeSet<String>, tree: &RequirementNode) -> Evaluation {
    evaluate_by(|k| supplied.contains(k), tree)
}

/// 以谓词判断“是否已提供”的求值变体（逐行取值检查使用）
pub fn evaluate_by<F>(is_supplied: F, tree: &RequirementNode) -> Evaluation
where
    F: Fn(&str) -> bool,
{
    let missing = missing_of(&is_supplied, tree);
    let top_level_is_all = match &missing {
        Some(RequirementNode::Leaf(_)) | None => tree.is_all(),
        Some(group) => group.is_all(),
    };
    Evaluation {
        missing,
        top_level_is_all,
    }
}

fn missing_of<F>(is_supplied: &F, node: &RequirementNode) -> Option<RequirementNode>
where
    F: Fn(&str) -> bool,
{
    match node {
        RequirementNode::Leaf(k) => {
            if is_supplied(k) {
                None
            } else {
                Some(RequirementNode::Leaf(k.clone()))
            }
        }
        RequirementNode::All(children) => {
            let mut collected = Vec::new();
            for child in children {
                match missing_of(is_supplied, child) {
                    None => {}
                    Some(RequirementNode::All(inner)) => collected.extend(inner),
                    Some(other) => collected.push(other),
                }
            }
            simplify(collected, RequirementNode::All)
        }
        RequirementNode::Any(children) => {
            let mut collected = Vec::new();
            for child in children {
                match missing_of(is_supplied, child) {
                    // 任一分支满足即整体满足
                    None => return None,
                    Some(RequirementNode::Any(inner)) => collected.extend(inner),
                    Some(other) => collected.push(other),
                }
            }
            simplify(collected, RequirementNode::Any)
        }
    }
}

fn simplify(
    mut collected: Vec<RequirementNode>,
    wrap: fn(Vec<RequirementNode>) -> RequirementNode,
) -> Option<RequirementNode> {
    match collected.len() {
        0 => None,
        1 => collected.pop(),
        _ => Some(wrap(collected)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(keys: &[&str]) -> BTreeSet<String> {
        keys.iter().map(|k| k.to_string()).collect()
    }

    fn a_and_b_or_c() -> RequirementNode {
        RequirementNode::All(vec![
            RequirementNode::leaf("A"),
            RequirementNode::any(["B", "C"]),
        ])
    }

    #[test]
    fn test_satisfied_by_one_alternative() {
        let eval = evaluate(&set(&["A", "C"]), &a_and_b_or_c());
        assert_eq!(eval.missing, None);
        assert!(eval.top_level_is_all);
    }

    #[test]
    fn test_missing_alternatives_unwrapped() {
        let eval = evaluate(&set(&["A"]), &a_and_b_or_c());
        assert_eq!(eval.missing, Some(RequirementNode::any(["B", "C"])));
        assert!(!eval.top_level_is_all);
    }

    #[test]
    fn test_nothing_supplied() {
        let eval = evaluate(&set(&[]), &a_and_b_or_c());
        assert_eq!(eval.missing, Some(a_and_b_or_c()));
        assert!(eval.top_level_is_all);
    }

    #[test]
    fn test_same_operator_groups_flattened() {
        let tree = RequirementNode::All(vec![
            RequirementNode::leaf("A"),
            RequirementNode::Any(vec![
                RequirementNode::all(["B", "C"]),
                RequirementNode::all(["D", "E"]),
            ]),
        ]);
        // B 与 D 已提供：两个 AND 分支各缺一项，单元素分组被展开
        let eval = evaluate(&set(&["A", "B", "D"]), &tree);
        assert_eq!(eval.missing, Some(RequirementNode::any(["C", "E"])));
        assert!(!eval.top_level_is_all);
    }

    #[test]
    fn test_empty_groups_are_satisfied() {
        assert!(evaluate(&set(&[]), &RequirementNode::All(vec![])).is_satisfied());
        assert!(evaluate(&set(&[]), &RequirementNode::Any(vec![])).is_satisfied());
    }

    #[test]
    fn test_from_alternating() {
        let nested = Nested::Group(vec![
            Nested::Key("A".into()),
            Nested::Group(vec![Nested::Key("B".into()), Nested::Key("C".into())]),
        ]);
        assert_eq!(RequirementNode::from_alternating(&nested), a_and_b_or_c());
    }

    #[test]
    fn test_display_and_leaves() {
        let tree = a_and_b_or_c();
        assert_eq!(tree.to_string(), "\"A\" AND (\"B\" OR \"C\")");
        assert_eq!(tree.leaves(), vec!["A", "B", "C"]);
        let mapped = tree.map_leaves(&|k| format!("{} Name", k));
        assert_eq!(mapped.leaves(), vec!["A Name", "B Name", "C Name"]);
    }
}
