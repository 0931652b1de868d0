// ==========================================
// 科研数据入库引擎 - 数据仓储层
// ==========================================
// 职责: 存储接口与 SQLite 实现
// 红线: Repository 不含业务规则，只做数据 CRUD
// ==========================================

pub mod error;
pub mod model;
pub mod record_store;
pub mod record_store_impl;

pub use error::{RepositoryError, RepositoryResult};
pub use model::{field_values, FieldDef, FieldValues, ModelSchema};
pub use record_store::{RecordStore, StoredRecord};
pub use record_store_impl::SqliteRecordStore;
