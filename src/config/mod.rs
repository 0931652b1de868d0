// ==========================================
// 科研数据入库引擎 - 配置层
// ==========================================
// 职责: 单次加载选项 + 持久化的加载器映射配置
// 存储: config_kv 表
// ==========================================

pub mod config_manager;
pub mod load_options;
pub mod loader_profile;

// 重导出核心配置类型
pub use config_manager::{config_keys, default_db_path, ConfigManager};
pub use load_options::LoadOptions;
pub use loader_profile::LoaderProfile;
