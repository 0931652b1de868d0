// ==========================================
// 测试辅助函数
// ==========================================
// 职责: 提供测试所需的数据库初始化、数据集构造等功能
// ==========================================
#![allow(dead_code)]

use research_data_loader::db::open_sqlite_connection;
use research_data_loader::{CellValue, Dataset, Row};
use rusqlite::Connection;
use std::error::Error;
use std::io::Write;
use tempfile::NamedTempFile;

/// 创建临时测试数据库并初始化 schema
///
/// # 返回
/// - NamedTempFile: 临时数据库文件（需要保持存活）
/// - String: 数据库文件路径
pub fn create_test_db() -> Result<(NamedTempFile, String), Box<dyn Error>> {
    research_data_loader::logging::init_test();
    let temp_file = NamedTempFile::new()?;
    let db_path = temp_file
        .path()
        .to_str()
        .ok_or("临时文件路径不是合法 UTF-8")?
        .to_string();

    let conn = Connection::open(&db_path)?;
    init_schema(&conn)?;

    Ok((temp_file, db_path))
}

/// 打开测试连接（与生产代码相同的 PRAGMA）
pub fn open_test_connection(db_path: &str) -> Connection {
    open_sqlite_connection(db_path).expect("打开测试数据库失败")
}

/// 初始化数据库 schema
fn init_schema(conn: &Connection) -> Result<(), Box<dyn Error>> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS config_kv (
            scope_id TEXT NOT NULL,
            key TEXT NOT NULL,
            value TEXT NOT NULL,
            PRIMARY KEY (scope_id, key)
        );

        CREATE TABLE IF NOT EXISTS compound (
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL UNIQUE,
            formula TEXT NOT NULL,
            hmdb_id TEXT UNIQUE
        );

        CREATE TABLE IF NOT EXISTS study (
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL UNIQUE
        );

        CREATE TABLE IF NOT EXISTS animal (
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL UNIQUE,
            study_id INTEGER NOT NULL REFERENCES study(id),
            sex TEXT CHECK (sex IN ('F', 'M')),
            body_weight REAL,
            diet TEXT
        );
        "#,
    )?;
    Ok(())
}

/// 统计表行数
pub fn count_rows(conn: &Connection, table: &str) -> i64 {
    conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| {
        row.get(0)
    })
    .expect("统计行数失败")
}

/// 文本单元格；空串视为缺失
pub fn cell(value: &str) -> Option<CellValue> {
    if value.is_empty() {
        None
    } else {
        Some(CellValue::Text(value.to_string()))
    }
}

/// 以表头 + 文本行构造数据集（行索引从 0 开始）
pub fn dataset(sheet: &str, columns: &[&str], rows: &[&[&str]]) -> Dataset {
    let rows = rows
        .iter()
        .enumerate()
        .map(|(index, values)| {
            Row::from_pairs(
                index,
                columns
                    .iter()
                    .zip(values.iter())
                    .map(|(c, v)| (c.to_string(), cell(v))),
            )
        })
        .collect();
    Dataset::new(columns.iter().map(|c| c.to_string()).collect(), rows).with_sheet(sheet)
}

/// 预置一条化合物记录
pub fn seed_compound(conn: &Connection, name: &str, formula: &str, hmdb_id: Option<&str>) {
    conn.execute(
        "INSERT INTO compound (name, formula, hmdb_id) VALUES (?1, ?2, ?3)",
        rusqlite::params![name, formula, hmdb_id],
    )
    .expect("预置化合物失败");
}

/// 写入临时 CSV 文件
pub fn write_csv(content: &str) -> NamedTempFile {
    let mut file = tempfile::Builder::new()
        .suffix(".csv")
        .tempfile()
        .expect("创建临时 CSV 失败");
    file.write_all(content.as_bytes()).expect("写入临时 CSV 失败");
    file.flush().expect("写入临时 CSV 失败");
    file
}
