// ==========================================
// 科研数据入库引擎 - 记录存储 Trait
// ==========================================
// 职责: 定义加载引擎所依赖的最小存储接口（不包含实现）
// 红线: 不含业务规则；事务由调用方通过连接/保存点控制
// ==========================================

use crate::repository::error::RepositoryResult;
use crate::repository::model::{FieldValues, ModelSchema};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};

/// 已持久化的记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredRecord {
    pub id: i64,
    pub values: FieldValues,
}

// ==========================================
// RecordStore Trait
// ==========================================
// 用途: 加载引擎 / 故障分类器的存储接口
// 实现者: SqliteRecordStore
pub trait RecordStore: Send + Sync {
    /// 按字段组精确查找（空值按 IS NULL 匹配）
    fn find_by(
        &self,
        conn: &Connection,
        model: &ModelSchema,
        lookup: &FieldValues,
    ) -> RepositoryResult<Option<StoredRecord>>;

    /// 完整校验（类型 / 非空 / 枚举取值），在创建前调用
    fn full_clean(&self, model: &ModelSchema, values: &FieldValues) -> RepositoryResult<()>;

    /// 直接插入（不做查找）
    fn create(
        &self,
        conn: &Connection,
        model: &ModelSchema,
        values: &FieldValues,
    ) -> RepositoryResult<StoredRecord>;

    /// 统计实体记录数
    fn count(&self, conn: &Connection, model: &ModelSchema) -> RepositoryResult<usize>;

    /// 查找或创建
    ///
    /// # 参数
    /// - lookup: 查找字段组
    /// - values: 创建时写入的完整字段（应包含 lookup）
    ///
    /// # 返回
    /// - Ok((记录, true)): 新建
    /// - Ok((记录, false)): 已存在
    /// - Err: 校验失败或约束违反
    fn get_or_create(
        &self,
        conn: &Connection,
        model: &ModelSchema,
        lookup: &FieldValues,
        values: &FieldValues,
    ) -> RepositoryResult<(StoredRecord, bool)> {
        if let Some(existing) = self.find_by(conn, model, lookup)? {
            return Ok((existing, false));
        }
        let mut all = lookup.clone();
        all.extend(values.iter().map(|(k, v)| (k.clone(), v.clone())));
        self.full_clean(model, &all)?;
        let created = self.create(conn, model, &all)?;
        Ok((created, true))
    }
}
