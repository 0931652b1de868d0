// ==========================================
// 科研数据入库引擎 - 具体加载器
// ==========================================
// 职责: 每张领域表一个声明式加载器 + 名称注册表
// ==========================================

pub mod animals;
pub mod compounds;

pub use animals::AnimalsLoader;
pub use compounds::CompoundsLoader;

use crate::engine::error::LoaderConfigError;
use crate::engine::loader::TableLoader;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// 已注册的加载器
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoaderKind {
    Compounds,
    Animals,
}

impl LoaderKind {
    pub const ALL: [LoaderKind; 2] = [LoaderKind::Compounds, LoaderKind::Animals];

    pub fn name(&self) -> &'static str {
        match self {
            LoaderKind::Compounds => "compounds",
            LoaderKind::Animals => "animals",
        }
    }

    pub fn loader(&self) -> Box<dyn TableLoader> {
        match self {
            LoaderKind::Compounds => Box::new(CompoundsLoader),
            LoaderKind::Animals => Box::new(AnimalsLoader),
        }
    }
}

impl FromStr for LoaderKind {
    type Err = LoaderConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        LoaderKind::ALL
            .into_iter()
            .find(|k| k.name() == wanted)
            .ok_or_else(|| LoaderConfigError::UnknownLoader(s.to_string()))
    }
}

impl fmt::Display for LoaderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::loader::LoaderSchema;

    #[test]
    fn test_registry_lookup() {
        assert_eq!("Animals".parse::<LoaderKind>().unwrap(), LoaderKind::Animals);
        assert!(matches!(
            "samples".parse::<LoaderKind>(),
            Err(LoaderConfigError::UnknownLoader(_))
        ));
    }

    #[test]
    fn test_registered_loaders_pass_self_check() {
        for kind in LoaderKind::ALL {
            let loader = kind.loader();
            assert_eq!(loader.name(), kind.name());
            LoaderSchema::check(loader.as_ref()).unwrap();
        }
    }
}
