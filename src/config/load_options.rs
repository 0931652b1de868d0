// ==========================================
// 科研数据入库引擎 - 加载选项
// ==========================================
// 职责: 单次加载尝试的调用方参数（试运行、延迟回滚、覆盖层、诊断定位）
// ==========================================

use crate::config::loader_profile::LoaderProfile;
use crate::domain::CellValue;
use crate::engine::headers::{DefaultOverrides, HeaderOverrides};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::error::Error;
use std::path::Path;

fn default_header_rows() -> usize {
    1
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoadOptions {
    /// 试运行：处理全部行后丢弃所有写入
    #[serde(default)]
    pub dry_run: bool,

    /// 延迟回滚：致命故障时仍释放本次工作单元，由外层决定提交/回滚
    #[serde(default)]
    pub defer_rollback: bool,

    /// 校验模式：警告也视为致命
    #[serde(default)]
    pub permissive: bool,

    /// 调用方表头覆盖层
    #[serde(default)]
    pub header_overrides: HeaderOverrides,

    /// 用户表头覆盖层（最高优先级）
    #[serde(default)]
    pub user_headers: HeaderOverrides,

    /// 调用方默认值覆盖层
    #[serde(default)]
    pub default_overrides: DefaultOverrides,

    /// 工作表名（诊断定位 + 外部默认值过滤）
    #[serde(default)]
    pub sheet: Option<String>,

    /// 文件标识（诊断定位）
    #[serde(default)]
    pub file: Option<String>,

    /// 表头行数（1 基行号偏移）
    #[serde(default = "default_header_rows")]
    pub header_rows: usize,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            dry_run: false,
            defer_rollback: false,
            permissive: false,
            header_overrides: HeaderOverrides::new(),
            user_headers: HeaderOverrides::new(),
            default_overrides: DefaultOverrides::new(),
            sheet: None,
            file: None,
            header_rows: default_header_rows(),
        }
    }
}

impl LoadOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// 从 JSON 文件读取
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self, Box<dyn Error>> {
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    pub fn dry_run(mut self, enabled: bool) -> Self {
        self.dry_run = enabled;
        self
    }

    pub fn defer_rollback(mut self, enabled: bool) -> Self {
        self.defer_rollback = enabled;
        self
    }

    pub fn permissive(mut self, enabled: bool) -> Self {
        self.permissive = enabled;
        self
    }

    pub fn with_sheet(mut self, sheet: impl Into<String>) -> Self {
        self.sheet = Some(sheet.into());
        self
    }

    pub fn with_file(mut self, file: impl Into<String>) -> Self {
        self.file = Some(file.into());
        self
    }

    pub fn with_header_rows(mut self, header_rows: usize) -> Self {
        self.header_rows = header_rows;
        self
    }

    pub fn header_override(mut self, key: &str, header: &str) -> Self {
        self.header_overrides
            .insert(key.to_string(), Some(header.to_string()));
        self
    }

    pub fn user_header(mut self, key: &str, header: &str) -> Self {
        self.user_headers
            .insert(key.to_string(), Some(header.to_string()));
        self
    }

    pub fn default_override(mut self, key: &str, value: impl Into<CellValue>) -> Self {
        self.default_overrides
            .insert(key.to_string(), Some(value.into()));
        self
    }

    /// 合并持久化的加载器配置（作为调用方层，显式传入的覆盖优先）
    ///
    /// 调用方传入的 None 表示“沿用下一层”，此时采用配置中的值
    pub fn merge_profile(mut self, profile: &LoaderProfile) -> Self {
        fill_from_profile(&mut self.header_overrides, &profile.header_overrides);
        fill_from_profile(&mut self.default_overrides, &profile.default_overrides);
        self
    }
}

fn fill_from_profile<T: Clone>(
    overrides: &mut BTreeMap<String, Option<T>>,
    profile: &BTreeMap<String, Option<T>>,
) {
    for (key, value) in profile {
        let slot = overrides.entry(key.clone()).or_insert(None);
        if slot.is_none() {
            *slot = value.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_and_json_file() {
        assert_eq!(LoadOptions::default().header_rows, 1);

        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"dry_run": true, "sheet": "Animals", "default_overrides": {{"DIET": "chow"}}}}"#
        )
        .unwrap();
        let opts = LoadOptions::from_json_file(file.path()).unwrap();
        assert!(opts.dry_run);
        assert!(!opts.defer_rollback);
        assert_eq!(opts.header_rows, 1);
        assert_eq!(opts.sheet.as_deref(), Some("Animals"));
        assert_eq!(
            opts.default_overrides.get("DIET"),
            Some(&Some(CellValue::from("chow")))
        );
    }

    #[test]
    fn test_merge_profile_keeps_explicit_overrides() {
        let mut profile = LoaderProfile {
            loader: "animals".into(),
            ..Default::default()
        };
        profile
            .header_overrides
            .insert("DIET".into(), Some("Feed".into()));
        profile
            .header_overrides
            .insert("SEX".into(), Some("Gender".into()));

        let opts = LoadOptions::new()
            .header_override("DIET", "Chow")
            .merge_profile(&profile);
        assert_eq!(opts.header_overrides["DIET"].as_deref(), Some("Chow"));
        assert_eq!(opts.header_overrides["SEX"].as_deref(), Some("Gender"));
    }

    #[test]
    fn test_merge_profile_fills_none_overrides() {
        let mut profile = LoaderProfile {
            loader: "animals".into(),
            ..Default::default()
        };
        profile
            .header_overrides
            .insert("DIET".into(), Some("Feed".into()));
        profile
            .default_overrides
            .insert("DIET".into(), Some(CellValue::from("chow")));

        let mut opts = LoadOptions::new();
        opts.header_overrides.insert("DIET".into(), None);
        opts.default_overrides.insert("DIET".into(), None);
        opts.default_overrides.insert("SEX".into(), None);

        let opts = opts.merge_profile(&profile);
        assert_eq!(opts.header_overrides["DIET"].as_deref(), Some("Feed"));
        assert_eq!(
            opts.default_overrides["DIET"],
            Some(CellValue::from("chow"))
        );
        assert_eq!(opts.default_overrides["SEX"], None);
    }
}
