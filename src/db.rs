// ==========================================
// 科研数据入库引擎 - SQLite 连接初始化
// ==========================================
// 目标:
// - 统一所有 Connection::open 的 PRAGMA 行为（外键、busy_timeout）
// - 提供可嵌套的工作单元入口（事务 / 保存点）
// ==========================================

use rusqlite::{Connection, OptionalExtension, Savepoint, Transaction};
use std::time::Duration;

/// 默认 busy_timeout（毫秒）
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

/// 配置 SQLite 连接的统一 PRAGMA
///
/// 说明：
/// - foreign_keys 需要“每个连接”单独开启
/// - busy_timeout 需要“每个连接”单独配置
pub fn configure_sqlite_connection(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    conn.busy_timeout(Duration::from_millis(DEFAULT_BUSY_TIMEOUT_MS))?;
    Ok(())
}

/// 打开 SQLite 连接并应用统一配置
pub fn open_sqlite_connection(db_path: &str) -> rusqlite::Result<Connection> {
    let conn = Connection::open(db_path)?;
    configure_sqlite_connection(&conn)?;
    Ok(conn)
}

/// 判断表是否存在
pub fn table_exists(conn: &Connection, table: &str) -> rusqlite::Result<bool> {
    let found = conn
        .query_row(
            "SELECT 1 FROM sqlite_master WHERE type='table' AND name=?1 LIMIT 1",
            [table],
            |_row| Ok(true),
        )
        .optional()?
        .unwrap_or(false);
    Ok(found)
}

// ==========================================
// SavepointSource - 工作单元来源
// ==========================================
// 加载尝试的外层工作单元总是一个保存点:
// - 在裸连接上: 保存点即一个新事务
// - 在外层事务/保存点内: 嵌套保存点，提交只是释放，最终决定权在外层
pub trait SavepointSource {
    fn open_unit(&mut self) -> rusqlite::Result<Savepoint<'_>>;
}

impl SavepointSource for Connection {
    fn open_unit(&mut self) -> rusqlite::Result<Savepoint<'_>> {
        self.savepoint()
    }
}

impl SavepointSource for Transaction<'_> {
    fn open_unit(&mut self) -> rusqlite::Result<Savepoint<'_>> {
        self.savepoint()
    }
}

impl SavepointSource for Savepoint<'_> {
    fn open_unit(&mut self) -> rusqlite::Result<Savepoint<'_>> {
        self.savepoint()
    }
}
