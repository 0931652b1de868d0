// ==========================================
// 科研数据入库引擎 - API 层
// ==========================================
// 职责: 提供异步加载接口，供外部服务调用
// ==========================================

pub mod error;
pub mod load_api;

// 重导出核心类型
pub use error::{ApiError, ApiResult};
pub use load_api::{LoadApi, LoadApiResponse};
