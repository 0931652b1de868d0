// ==========================================
// 科研数据入库引擎 - 加载器映射配置
// ==========================================
// 职责: 持久化的表头/默认值覆盖（按加载器名保存）
// ==========================================

use crate::domain::CellValue;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// 加载器映射配置（持久化对象）
///
/// 存储位置：config_kv（scope_id='global'，key='loader_profile/{loader}'）
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LoaderProfile {
    /// 加载器名（compounds / animals ...）
    pub loader: String,

    /// 说明（可选）
    #[serde(default)]
    pub description: Option<String>,

    /// 列键 → 表头名（作为调用方覆盖层合并）
    #[serde(default)]
    pub header_overrides: BTreeMap<String, Option<String>>,

    /// 列键 → 默认值（作为调用方覆盖层合并）
    #[serde(default)]
    pub default_overrides: BTreeMap<String, Option<CellValue>>,
}
