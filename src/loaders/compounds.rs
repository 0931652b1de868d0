// ==========================================
// 科研数据入库引擎 - 化合物加载器
// ==========================================
// 工作表: Compounds
// 列: Name / Formula / HMDB ID
// 唯一: Name、HMDB ID（文件内各自唯一）
// ==========================================

use crate::engine::error::RowError;
use crate::engine::fault_classifier::FieldColumn;
use crate::engine::headers::ColumnSpec;
use crate::engine::loader::{RowContext, TableLoader};
use crate::engine::requirement::RequirementNode;
use crate::engine::uniqueness::UniqueConstraint;
use crate::repository::{field_values, FieldDef, FieldValues, ModelSchema};

pub const NAME_KEY: &str = "NAME";
pub const FORMULA_KEY: &str = "FORMULA";
pub const HMDB_ID_KEY: &str = "HMDB_ID";

pub const COMPOUND_MODEL: &str = "Compound";

#[derive(Debug, Clone, Copy, Default)]
pub struct CompoundsLoader;

impl CompoundsLoader {
    pub fn compound_model() -> ModelSchema {
        ModelSchema::new(COMPOUND_MODEL, "compound")
            .field(FieldDef::text("name"))
            .field(FieldDef::text("formula"))
            .field(FieldDef::text("hmdb_id").nullable())
            .unique(&["name"])
            .unique(&["hmdb_id"])
    }
}

impl TableLoader for CompoundsLoader {
    fn name(&self) -> &str {
        "compounds"
    }

    fn default_sheet(&self) -> &str {
        "Compounds"
    }

    fn columns(&self) -> Vec<ColumnSpec> {
        vec![
            ColumnSpec::text(NAME_KEY, "Name"),
            ColumnSpec::text(FORMULA_KEY, "Formula"),
            ColumnSpec::text(HMDB_ID_KEY, "HMDB ID"),
        ]
    }

    fn required_headers(&self) -> RequirementNode {
        RequirementNode::all([NAME_KEY, FORMULA_KEY, HMDB_ID_KEY])
    }

    fn required_values(&self) -> RequirementNode {
        RequirementNode::all([NAME_KEY, FORMULA_KEY])
    }

    fn unique_constraints(&self) -> Vec<UniqueConstraint> {
        vec![
            UniqueConstraint::single(NAME_KEY),
            UniqueConstraint::single(HMDB_ID_KEY),
        ]
    }

    fn models(&self) -> Vec<ModelSchema> {
        vec![Self::compound_model()]
    }

    fn field_columns(&self) -> Vec<FieldColumn> {
        vec![
            FieldColumn::new(COMPOUND_MODEL, "name", NAME_KEY),
            FieldColumn::new(COMPOUND_MODEL, "formula", FORMULA_KEY),
            FieldColumn::new(COMPOUND_MODEL, "hmdb_id", HMDB_ID_KEY),
        ]
    }

    fn load_row(&self, ctx: &mut RowContext<'_>) -> Result<(), RowError> {
        // 全字段查找：同名但取值不同的记录会触发唯一约束冲突并给出逐字段差异
        let lookup = field_values([
            ("name", ctx.get(NAME_KEY).cloned()),
            ("formula", ctx.get(FORMULA_KEY).cloned()),
            ("hmdb_id", ctx.get(HMDB_ID_KEY).cloned()),
        ]);
        ctx.get_or_create(COMPOUND_MODEL, lookup, FieldValues::new())?;
        Ok(())
    }
}
