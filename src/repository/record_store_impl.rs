// ==========================================
// 科研数据入库引擎 - 记录存储 SQLite 实现
// ==========================================
// 职责: 以 rusqlite 实现 RecordStore
// 说明: 所有方法接收 &Connection，可直接作用于事务或保存点
// ==========================================

use crate::domain::CellValue;
use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::repository::model::{FieldValues, ModelSchema};
use crate::repository::record_store::{RecordStore, StoredRecord};
use rusqlite::{params_from_iter, Connection, OptionalExtension};
use tracing::trace;

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

// ==========================================
// SqliteRecordStore
// ==========================================
#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteRecordStore;

impl SqliteRecordStore {
    pub fn new() -> Self {
        Self
    }

    fn ensure_known_fields<'a>(
        model: &ModelSchema,
        names: impl Iterator<Item = &'a String>,
    ) -> RepositoryResult<()> {
        for name in names {
            if model.field_def(name).is_none() {
                return Err(RepositoryError::UnknownField {
                    model: model.name.clone(),
                    field: name.clone(),
                });
            }
        }
        Ok(())
    }

    fn select_sql(model: &ModelSchema) -> String {
        let cols: Vec<String> = model.fields.iter().map(|f| quote_ident(&f.name)).collect();
        format!(
            "SELECT rowid, {} FROM {}",
            cols.join(", "),
            quote_ident(&model.table)
        )
    }

    fn read_record(model: &ModelSchema, row: &rusqlite::Row<'_>) -> rusqlite::Result<StoredRecord> {
        let id: i64 = row.get(0)?;
        let mut values = FieldValues::new();
        for (idx, field) in model.fields.iter().enumerate() {
            let value: Option<CellValue> = row.get(idx + 1)?;
            values.insert(field.name.clone(), value);
        }
        Ok(StoredRecord { id, values })
    }
}

impl RecordStore for SqliteRecordStore {
    fn find_by(
        &self,
        conn: &Connection,
        model: &ModelSchema,
        lookup: &FieldValues,
    ) -> RepositoryResult<Option<StoredRecord>> {
        Self::ensure_known_fields(model, lookup.keys())?;

        let mut sql = Self::select_sql(model);
        if !lookup.is_empty() {
            let conditions: Vec<String> = lookup
                .keys()
                .enumerate()
                .map(|(i, k)| format!("{} IS ?{}", quote_ident(k), i + 1))
                .collect();
            sql.push_str(" WHERE ");
            sql.push_str(&conditions.join(" AND "));
        }
        sql.push_str(" ORDER BY rowid LIMIT 1");

        let mut stmt = conn.prepare(&sql)?;
        let record = stmt
            .query_row(params_from_iter(lookup.values()), |row| {
                Self::read_record(model, row)
            })
            .optional()?;
        Ok(record)
    }

    fn full_clean(&self, model: &ModelSchema, values: &FieldValues) -> RepositoryResult<()> {
        Self::ensure_known_fields(model, values.keys())?;

        for field in &model.fields {
            match values.get(&field.name).cloned().flatten() {
                None if !field.nullable => {
                    return Err(RepositoryError::NotNullViolation {
                        table: model.table.clone(),
                        column: field.name.clone(),
                        message: format!(
                            "NOT NULL constraint failed: {}.{}",
                            model.table, field.name
                        ),
                    });
                }
                None => {}
                Some(value) => {
                    if !field.kind.accepts(&value) && !Self::coercible(field.kind, &value) {
                        return Err(RepositoryError::FieldTypeMismatch {
                            model: model.name.clone(),
                            field: field.name.clone(),
                            expected: field.kind.to_string(),
                            value: value.as_text(),
                        });
                    }
                    if !field.allows(&value) {
                        return Err(RepositoryError::InvalidChoice {
                            model: model.name.clone(),
                            field: field.name.clone(),
                            value: value.as_text(),
                            allowed: field.choices.clone().unwrap_or_default(),
                        });
                    }
                }
            }
        }
        Ok(())
    }

    fn create(
        &self,
        conn: &Connection,
        model: &ModelSchema,
        values: &FieldValues,
    ) -> RepositoryResult<StoredRecord> {
        Self::ensure_known_fields(model, values.keys())?;

        let cols: Vec<String> = values.keys().map(|k| quote_ident(k)).collect();
        let placeholders: Vec<String> = (1..=values.len()).map(|i| format!("?{}", i)).collect();
        let sql = if values.is_empty() {
            format!("INSERT INTO {} DEFAULT VALUES", quote_ident(&model.table))
        } else {
            format!(
                "INSERT INTO {} ({}) VALUES ({})",
                quote_ident(&model.table),
                cols.join(", "),
                placeholders.join(", ")
            )
        };

        conn.execute(&sql, params_from_iter(values.values()))?;
        let id = conn.last_insert_rowid();
        trace!(model = %model.name, id = id, "记录已创建");

        let mut stored = FieldValues::new();
        for field in &model.fields {
            stored.insert(field.name.clone(), values.get(&field.name).cloned().flatten());
        }
        Ok(StoredRecord { id, values: stored })
    }

    fn count(&self, conn: &Connection, model: &ModelSchema) -> RepositoryResult<usize> {
        let sql = format!("SELECT COUNT(*) FROM {}", quote_ident(&model.table));
        let n: i64 = conn.query_row(&sql, [], |row| row.get(0))?;
        Ok(n.max(0) as usize)
    }
}

impl SqliteRecordStore {
    /// 文本形式的数值可交由存储层做类型亲和转换
    fn coercible(kind: crate::domain::ColumnKind, value: &CellValue) -> bool {
        use crate::domain::ColumnKind;
        match (kind, value) {
            (ColumnKind::Integer, CellValue::Text(s)) => s.trim().parse::<i64>().is_ok(),
            (ColumnKind::Float, CellValue::Text(s)) => s.trim().parse::<f64>().is_ok(),
            (ColumnKind::Bool, CellValue::Text(s)) => {
                matches!(s.trim().to_lowercase().as_str(), "true" | "false" | "1" | "0")
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::model::{field_values, FieldDef};

    fn setup() -> (Connection, ModelSchema) {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE compound (name TEXT NOT NULL UNIQUE, formula TEXT NOT NULL, hmdb_id TEXT UNIQUE);",
        )
        .unwrap();
        let model = ModelSchema::new("Compound", "compound")
            .field(FieldDef::text("name"))
            .field(FieldDef::text("formula"))
            .field(FieldDef::text("hmdb_id").nullable())
            .unique(&["name"])
            .unique(&["hmdb_id"]);
        (conn, model)
    }

    #[test]
    fn test_get_or_create_then_existed() {
        let (conn, model) = setup();
        let store = SqliteRecordStore::new();
        let lookup = field_values([("name", Some(CellValue::from("glucose")))]);
        let values = field_values([("formula", Some(CellValue::from("C6H12O6")))]);

        let (first, created) = store.get_or_create(&conn, &model, &lookup, &values).unwrap();
        assert!(created);
        let (second, created) = store.get_or_create(&conn, &model, &lookup, &values).unwrap();
        assert!(!created);
        assert_eq!(first.id, second.id);
        assert_eq!(store.count(&conn, &model).unwrap(), 1);
    }

    #[test]
    fn test_full_clean_not_null() {
        let (_conn, model) = setup();
        let store = SqliteRecordStore::new();
        let values = field_values([("name", Some(CellValue::from("glucose")))]);
        let err = store.full_clean(&model, &values).unwrap_err();
        assert!(matches!(err, RepositoryError::NotNullViolation { ref column, .. } if column == "formula"));
    }

    #[test]
    fn test_create_unique_violation_is_typed() {
        let (conn, model) = setup();
        let store = SqliteRecordStore::new();
        let v1 = field_values([
            ("name", Some(CellValue::from("glucose"))),
            ("formula", Some(CellValue::from("C6H12O6"))),
            ("hmdb_id", Some(CellValue::from("HMDB0000122"))),
        ]);
        store.create(&conn, &model, &v1).unwrap();
        let v2 = field_values([
            ("name", Some(CellValue::from("dextrose"))),
            ("formula", Some(CellValue::from("C6H12O6"))),
            ("hmdb_id", Some(CellValue::from("HMDB0000122"))),
        ]);
        let err = store.create(&conn, &model, &v2).unwrap_err();
        match err {
            RepositoryError::UniqueConstraintViolation { columns, .. } => {
                assert_eq!(columns, vec!["hmdb_id"]);
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_unknown_field_rejected() {
        let (conn, model) = setup();
        let store = SqliteRecordStore::new();
        let lookup = field_values([("mass", Some(CellValue::Float(180.0)))]);
        assert!(matches!(
            store.find_by(&conn, &model, &lookup),
            Err(RepositoryError::UnknownField { .. })
        ));
    }
}
