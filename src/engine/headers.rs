// ==========================================
// 科研数据入库引擎 - 表头 / 默认值分层解析
// ==========================================
// 职责: 合并加载器声明、调用方覆盖、用户覆盖、外部默认值表，
//       得到生效的表头名与默认值
// 优先级（低 → 高）:
// - 表头: 加载器声明 < 调用方覆盖 < 用户覆盖
// - 默认值: 引擎基线(空) < 加载器声明 < 调用方覆盖 < 外部默认值表(按活动工作表)
// 红线: 覆盖层中的 None 表示“沿用上一层”，不是清空
// ==========================================

use crate::domain::{CellValue, ColumnKind};
use crate::engine::diagnostics::{row_number, Diagnostics, Fault, Position};
use crate::engine::error::LoaderConfigError;
use crate::importer::DefaultsSheet;
use std::collections::BTreeMap;
use tracing::debug;

/// 列键 → 表头名覆盖
pub type HeaderOverrides = BTreeMap<String, Option<String>>;

/// 列键 → 默认值覆盖
pub type DefaultOverrides = BTreeMap<String, Option<CellValue>>;

// ==========================================
// ColumnSpec - 列声明
// ==========================================
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnSpec {
    /// 稳定列键（与显示名无关）
    pub key: String,
    /// 默认表头名
    pub header: String,
    pub default: Option<CellValue>,
    pub kind: ColumnKind,
}

impl ColumnSpec {
    pub fn new(key: &str, header: &str, kind: ColumnKind) -> Self {
        Self {
            key: key.to_string(),
            header: header.to_string(),
            default: None,
            kind,
        }
    }

    pub fn text(key: &str, header: &str) -> Self {
        Self::new(key, header, ColumnKind::Text)
    }

    pub fn integer(key: &str, header: &str) -> Self {
        Self::new(key, header, ColumnKind::Integer)
    }

    pub fn float(key: &str, header: &str) -> Self {
        Self::new(key, header, ColumnKind::Float)
    }

    pub fn with_default(mut self, value: impl Into<CellValue>) -> Self {
        self.default = Some(value.into());
        self
    }
}

// ==========================================
// HeaderResolver
// ==========================================
#[derive(Debug, Clone)]
pub struct HeaderResolver {
    loader: String,
    columns: Vec<ColumnSpec>,
    headers: BTreeMap<String, String>,
    defaults: BTreeMap<String, Option<CellValue>>,
    /// 表头名 → 默认值（行处理使用的投影，每次解析后重算）
    defaults_by_name: BTreeMap<String, CellValue>,
    key_by_name: BTreeMap<String, String>,
}

impl HeaderResolver {
    pub fn new(loader: &str, columns: Vec<ColumnSpec>) -> Self {
        let mut resolver = Self {
            loader: loader.to_string(),
            headers: columns
                .iter()
                .map(|c| (c.key.clone(), c.header.clone()))
                .collect(),
            defaults: columns
                .iter()
                .map(|c| (c.key.clone(), c.default.clone()))
                .collect(),
            columns,
            defaults_by_name: BTreeMap::new(),
            key_by_name: BTreeMap::new(),
        };
        resolver.refresh_projection();
        resolver
    }

    fn check_keys<'a, V: 'a>(
        &self,
        layer: &str,
        overrides: impl IntoIterator<Item = (&'a String, &'a V)>,
    ) -> Result<(), LoaderConfigError> {
        for (key, _) in overrides {
            if !self.headers.contains_key(key) {
                return Err(LoaderConfigError::UnknownOverrideKey {
                    loader: self.loader.clone(),
                    layer: layer.to_string(),
                    key: key.clone(),
                });
            }
        }
        Ok(())
    }

    /// 解析生效表头名
    ///
    /// # 参数
    /// - caller: 调用方覆盖层
    /// - user: 用户覆盖层（最高优先级）
    ///
    /// # 返回
    /// - Err(LoaderConfigError): 覆盖层含未知列键（立即抛出）
    pub fn resolve_headers(
        &mut self,
        caller: Option<&HeaderOverrides>,
        user: Option<&HeaderOverrides>,
    ) -> Result<(), LoaderConfigError> {
        if let Some(layer) = caller {
            self.check_keys("调用方表头覆盖", layer)?;
        }
        if let Some(layer) = user {
            self.check_keys("用户表头覆盖", layer)?;
        }

        let mut headers: BTreeMap<String, String> = self
            .columns
            .iter()
            .map(|c| (c.key.clone(), c.header.clone()))
            .collect();
        for layer in [caller, user].into_iter().flatten() {
            for (key, name) in layer {
                if let Some(name) = name {
                    headers.insert(key.clone(), name.clone());
                }
            }
        }
        self.headers = headers;
        self.refresh_projection();
        debug!(loader = %self.loader, headers = ?self.headers, "表头已解析");
        Ok(())
    }

    /// 解析生效默认值
    ///
    /// # 参数
    /// - caller: 调用方默认值覆盖层
    /// - external: 外部默认值表
    /// - active_sheet: 活动工作表名（外部记录按此过滤）
    /// - diagnostics: 外部记录指向未知列时缓存非致命警告
    pub fn resolve_defaults(
        &mut self,
        caller: Option<&DefaultOverrides>,
        external: Option<&DefaultsSheet>,
        active_sheet: Option<&str>,
        header_rows: usize,
        diagnostics: &mut Diagnostics,
    ) -> Result<(), LoaderConfigError> {
        if let Some(layer) = caller {
            self.check_keys("调用方默认值覆盖", layer)?;
        }

        let mut defaults: BTreeMap<String, Option<CellValue>> = self
            .columns
            .iter()
            .map(|c| (c.key.clone(), c.default.clone()))
            .collect();
        if let Some(layer) = caller {
            for (key, value) in layer {
                if value.is_some() {
                    defaults.insert(key.clone(), value.clone());
                }
            }
        }

        if let (Some(sheet_defaults), Some(sheet)) = (external, active_sheet) {
            for record in sheet_defaults.records_for(sheet) {
                match self.key_by_name.get(&record.column) {
                    Some(key) => {
                        if record.value.is_some() {
                            defaults.insert(key.clone(), record.value.clone());
                        }
                    }
                    None => {
                        let position = Position::new(
                            sheet_defaults.file.as_deref(),
                            sheet_defaults.sheet.as_deref(),
                        )
                        .at_row(row_number(record.row_index, header_rows))
                        .at_column(record.column.clone());
                        diagnostics.buffer_warning(
                            Fault::UnknownDefaultColumn {
                                sheet: record.sheet.clone(),
                                column: record.column.clone(),
                            },
                            position,
                        );
                    }
                }
            }
        }

        self.defaults = defaults;
        self.refresh_projection();
        Ok(())
    }

    fn refresh_projection(&mut self) {
        self.key_by_name = self
            .headers
            .iter()
            .map(|(k, name)| (name.clone(), k.clone()))
            .collect();
        self.defaults_by_name = self
            .defaults
            .iter()
            .filter_map(|(k, v)| {
                let name = self.headers.get(k)?;
                v.clone().map(|v| (name.clone(), v))
            })
            .collect();
    }

    /// 多个列键解析为同一表头名的情况（按列声明顺序）
    pub fn duplicate_header_names(&self) -> Vec<Fault> {
        let mut by_name: Vec<(String, Vec<String>)> = Vec::new();
        for column in &self.columns {
            let name = self.header(&column.key).unwrap_or(&column.header).to_string();
            match by_name.iter_mut().find(|(n, _)| *n == name) {
                Some((_, keys)) => keys.push(column.key.clone()),
                None => by_name.push((name, vec![column.key.clone()])),
            }
        }
        by_name
            .into_iter()
            .filter(|(_, keys)| keys.len() > 1)
            .map(|(name, keys)| Fault::DuplicateHeaderName { name, keys })
            .collect()
    }

    pub fn loader(&self) -> &str {
        &self.loader
    }

    pub fn columns(&self) -> &[ColumnSpec] {
        &self.columns
    }

    pub fn column(&self, key: &str) -> Option<&ColumnSpec> {
        self.columns.iter().find(|c| c.key == key)
    }

    pub fn header(&self, key: &str) -> Option<&str> {
        self.headers.get(key).map(String::as_str)
    }

    /// 表头名（未知键原样返回）
    pub fn header_or_key(&self, key: &str) -> String {
        self.header(key).unwrap_or(key).to_string()
    }

    pub fn key_for(&self, header: &str) -> Option<&str> {
        self.key_by_name.get(header).map(String::as_str)
    }

    pub fn default_value(&self, key: &str) -> Option<&CellValue> {
        self.defaults.get(key).and_then(Option::as_ref)
    }

    pub fn default_for_header(&self, header: &str) -> Option<&CellValue> {
        self.defaults_by_name.get(header)
    }

    /// 生效表头名（按列声明顺序）
    pub fn header_names(&self) -> Vec<String> {
        self.columns
            .iter()
            .map(|c| self.header_or_key(&c.key))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::importer::DefaultRecord;

    fn resolver() -> HeaderResolver {
        HeaderResolver::new(
            "animals",
            vec![
                ColumnSpec::text("NAME", "Animal Name"),
                ColumnSpec::text("DIET", "Diet").with_default("chow"),
                ColumnSpec::float("WEIGHT", "Body Weight"),
            ],
        )
    }

    fn external(sheet: &str, column: &str, value: &str) -> DefaultsSheet {
        DefaultsSheet {
            file: Some("study.xlsx".into()),
            sheet: Some("Defaults".into()),
            records: vec![DefaultRecord {
                sheet: sheet.into(),
                column: column.into(),
                value: Some(CellValue::from(value)),
                row_index: 0,
            }],
        }
    }

    fn overrides(pairs: &[(&str, Option<&str>)]) -> DefaultOverrides {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.map(CellValue::from)))
            .collect()
    }

    #[test]
    fn test_defaults_precedence() {
        let mut diags = Diagnostics::new();
        let caller = overrides(&[("DIET", Some("high fat"))]);

        // 三层都在：外部记录胜出
        let mut r = resolver();
        r.resolve_defaults(
            Some(&caller),
            Some(&external("Animals", "Diet", "keto")),
            Some("Animals"),
            1,
            &mut diags,
        )
        .unwrap();
        assert_eq!(r.default_value("DIET"), Some(&CellValue::from("keto")));
        assert_eq!(r.default_for_header("Diet"), Some(&CellValue::from("keto")));

        // 外部记录属于其他工作表：调用方覆盖胜出
        let mut r = resolver();
        r.resolve_defaults(
            Some(&caller),
            Some(&external("Samples", "Diet", "keto")),
            Some("Animals"),
            1,
            &mut diags,
        )
        .unwrap();
        assert_eq!(r.default_value("DIET"), Some(&CellValue::from("high fat")));

        // 只有声明
        let mut r = resolver();
        r.resolve_defaults(None, None, Some("Animals"), 1, &mut diags)
            .unwrap();
        assert_eq!(r.default_value("DIET"), Some(&CellValue::from("chow")));
        assert!(diags.is_empty());
    }

    #[test]
    fn test_none_override_falls_through() {
        let mut r = resolver();
        let mut diags = Diagnostics::new();
        r.resolve_defaults(Some(&overrides(&[("DIET", None)])), None, None, 1, &mut diags)
            .unwrap();
        assert_eq!(r.default_value("DIET"), Some(&CellValue::from("chow")));
    }

    #[test]
    fn test_unknown_override_key_is_config_error() {
        let mut r = resolver();
        let caller: HeaderOverrides = [("TAIL".to_string(), Some("Tail".to_string()))].into();
        let err = r.resolve_headers(Some(&caller), None).unwrap_err();
        assert!(matches!(err, LoaderConfigError::UnknownOverrideKey { ref key, .. } if key == "TAIL"));
    }

    #[test]
    fn test_user_layer_wins_and_projection_refreshes() {
        let mut r = resolver();
        let caller: HeaderOverrides = [("DIET".to_string(), Some("Feed".to_string()))].into();
        let user: HeaderOverrides = [("DIET".to_string(), Some("Chow Type".to_string()))].into();
        r.resolve_headers(Some(&caller), Some(&user)).unwrap();
        assert_eq!(r.header("DIET"), Some("Chow Type"));
        assert_eq!(r.key_for("Chow Type"), Some("DIET"));
        assert_eq!(r.default_for_header("Chow Type"), Some(&CellValue::from("chow")));
        assert_eq!(r.default_for_header("Diet"), None);
    }

    #[test]
    fn test_unknown_default_column_buffered_as_warning() {
        let mut r = resolver();
        let mut diags = Diagnostics::new();
        r.resolve_defaults(
            None,
            Some(&external("Animals", "Tail Length", "5")),
            Some("Animals"),
            1,
            &mut diags,
        )
        .unwrap();
        assert_eq!(diags.len(), 1);
        assert_eq!(diags.warning_count(), 1);
        assert!(!diags.should_raise(false));
    }

    #[test]
    fn test_duplicate_header_names_detected() {
        let mut r = resolver();
        let user: HeaderOverrides = [("DIET".to_string(), Some("Animal Name".to_string()))].into();
        r.resolve_headers(None, Some(&user)).unwrap();
        let faults = r.duplicate_header_names();
        assert_eq!(faults.len(), 1);
        match &faults[0] {
            Fault::DuplicateHeaderName { name, keys } => {
                assert_eq!(name, "Animal Name");
                assert_eq!(keys, &vec!["NAME".to_string(), "DIET".to_string()]);
            }
            other => panic!("unexpected: {:?}", other),
        }
    }
}
