// ==========================================
// 科研数据入库引擎 - 配置管理器
// ==========================================
// 职责: 加载器映射配置的读取与保存
// 存储: config_kv 表 (key-value + scope)
// ==========================================

use crate::config::loader_profile::LoaderProfile;
use crate::db::{open_sqlite_connection, table_exists};
use rusqlite::{params, Connection};
use std::error::Error;
use std::path::PathBuf;
use std::sync::Mutex;

/// 默认数据库文件名
pub const DEFAULT_DB_FILE: &str = "research_data.db";

/// 配置键
pub mod config_keys {
    /// 加载器映射配置前缀（loader_profile/{loader}）
    pub const LOADER_PROFILE_PREFIX: &str = "loader_profile/";
}

/// 用户数据目录下的默认数据库路径
///
/// 无法解析用户目录时回落到当前目录
pub fn default_db_path() -> PathBuf {
    dirs::data_dir()
        .map(|dir| dir.join("research-data-loader"))
        .unwrap_or_else(|| PathBuf::from("."))
        .join(DEFAULT_DB_FILE)
}

// ==========================================
// ConfigManager - 配置管理器
// ==========================================
pub struct ConfigManager {
    conn: Mutex<Connection>,
}

impl ConfigManager {
    /// 创建新的 ConfigManager 实例
    ///
    /// # 参数
    /// - db_path: 数据库文件路径
    pub fn new(db_path: &str) -> Result<Self, Box<dyn Error>> {
        let conn = open_sqlite_connection(db_path)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// 确保 config_kv 表存在
    pub fn ensure_schema(&self) -> Result<(), Box<dyn Error>> {
        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS config_kv (
                scope_id TEXT NOT NULL,
                key TEXT NOT NULL,
                value TEXT NOT NULL,
                PRIMARY KEY (scope_id, key)
            );",
        )?;
        Ok(())
    }

    /// 从 config_kv 表读取配置值（scope_id='global'）
    ///
    /// # 返回
    /// - Some(String): 配置值
    /// - None: 配置不存在（含 config_kv 表不存在）
    fn get_config_value(&self, key: &str) -> Result<Option<String>, Box<dyn Error>> {
        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;

        if !table_exists(&conn, "config_kv")? {
            return Ok(None);
        }

        let result = conn.query_row(
            "SELECT value FROM config_kv WHERE scope_id = 'global' AND key = ?1",
            params![key],
            |row| row.get::<_, String>(0),
        );

        match result {
            Ok(value) => Ok(Some(value)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(Box::new(e)),
        }
    }

    /// 读取加载器映射配置（存储于 config_kv: loader_profile/{loader}）
    pub fn get_loader_profile(&self, loader: &str) -> Result<Option<LoaderProfile>, Box<dyn Error>> {
        let name = loader.trim();
        if name.is_empty() {
            return Ok(None);
        }

        let key = format!("{}{}", config_keys::LOADER_PROFILE_PREFIX, name);
        let raw = match self.get_config_value(&key)? {
            Some(v) => v,
            None => return Ok(None),
        };

        let profile: LoaderProfile = serde_json::from_str(&raw)?;
        Ok(Some(profile))
    }

    /// 保存加载器映射配置（UPSERT）
    pub fn save_loader_profile(&self, profile: &LoaderProfile) -> Result<(), Box<dyn Error>> {
        self.ensure_schema()?;
        let key = format!("{}{}", config_keys::LOADER_PROFILE_PREFIX, profile.loader.trim());
        let value = serde_json::to_string(profile)?;

        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;
        conn.execute(
            "INSERT INTO config_kv (scope_id, key, value) VALUES ('global', ?1, ?2)
             ON CONFLICT(scope_id, key) DO UPDATE SET value = ?2",
            params![key, value],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::CellValue;

    #[test]
    fn test_profile_roundtrip_through_config_kv() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let manager = ConfigManager::new(file.path().to_str().unwrap()).unwrap();

        // 表不存在时视为无配置
        assert!(manager.get_loader_profile("animals").unwrap().is_none());

        let mut profile = LoaderProfile {
            loader: "animals".into(),
            ..Default::default()
        };
        profile
            .default_overrides
            .insert("DIET".into(), Some(CellValue::from("chow")));
        manager.save_loader_profile(&profile).unwrap();

        let loaded = manager.get_loader_profile("animals").unwrap().unwrap();
        assert_eq!(loaded, profile);
        assert!(manager.get_loader_profile("  ").unwrap().is_none());
    }

    #[test]
    fn test_default_db_path_file_name() {
        assert!(default_db_path().ends_with(DEFAULT_DB_FILE));
    }
}
