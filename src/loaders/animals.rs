// ==========================================
// 科研数据入库引擎 - 动物加载器
// ==========================================
// 工作表: Animals
// 列: Animal Name / Study Name / Sex / Body Weight / Diet
// 写入: Study（查找或创建）→ Animal
// ==========================================

use crate::domain::CellValue;
use crate::engine::error::RowError;
use crate::engine::fault_classifier::FieldColumn;
use crate::engine::headers::ColumnSpec;
use crate::engine::loader::{RowContext, TableLoader};
use crate::engine::requirement::RequirementNode;
use crate::engine::uniqueness::UniqueConstraint;
use crate::repository::{field_values, FieldDef, FieldValues, ModelSchema};

pub const NAME_KEY: &str = "NAME";
pub const STUDY_KEY: &str = "STUDY";
pub const SEX_KEY: &str = "SEX";
pub const WEIGHT_KEY: &str = "WEIGHT";
pub const DIET_KEY: &str = "DIET";

pub const STUDY_MODEL: &str = "Study";
pub const ANIMAL_MODEL: &str = "Animal";

/// 性别可选值
pub const SEX_CHOICES: [&str; 2] = ["F", "M"];

#[derive(Debug, Clone, Copy, Default)]
pub struct AnimalsLoader;

impl AnimalsLoader {
    pub fn study_model() -> ModelSchema {
        ModelSchema::new(STUDY_MODEL, "study")
            .field(FieldDef::text("name"))
            .unique(&["name"])
    }

    pub fn animal_model() -> ModelSchema {
        ModelSchema::new(ANIMAL_MODEL, "animal")
            .field(FieldDef::text("name"))
            .field(FieldDef::integer("study_id"))
            .field(FieldDef::text("sex").nullable().with_choices(&SEX_CHOICES))
            .field(FieldDef::float("body_weight").nullable())
            .field(FieldDef::text("diet").nullable())
            .unique(&["name"])
    }
}

impl TableLoader for AnimalsLoader {
    fn name(&self) -> &str {
        "animals"
    }

    fn default_sheet(&self) -> &str {
        "Animals"
    }

    fn columns(&self) -> Vec<ColumnSpec> {
        vec![
            ColumnSpec::text(NAME_KEY, "Animal Name"),
            ColumnSpec::text(STUDY_KEY, "Study Name"),
            ColumnSpec::text(SEX_KEY, "Sex"),
            ColumnSpec::float(WEIGHT_KEY, "Body Weight"),
            ColumnSpec::text(DIET_KEY, "Diet"),
        ]
    }

    fn required_headers(&self) -> RequirementNode {
        RequirementNode::all([NAME_KEY, STUDY_KEY])
    }

    fn required_values(&self) -> RequirementNode {
        RequirementNode::all([NAME_KEY, STUDY_KEY])
    }

    fn unique_constraints(&self) -> Vec<UniqueConstraint> {
        vec![UniqueConstraint::single(NAME_KEY)]
    }

    fn models(&self) -> Vec<ModelSchema> {
        vec![Self::study_model(), Self::animal_model()]
    }

    fn field_columns(&self) -> Vec<FieldColumn> {
        vec![
            FieldColumn::new(STUDY_MODEL, "name", STUDY_KEY),
            FieldColumn::new(ANIMAL_MODEL, "name", NAME_KEY),
            FieldColumn::new(ANIMAL_MODEL, "sex", SEX_KEY),
            FieldColumn::new(ANIMAL_MODEL, "body_weight", WEIGHT_KEY),
            FieldColumn::new(ANIMAL_MODEL, "diet", DIET_KEY),
        ]
    }

    fn load_row(&self, ctx: &mut RowContext<'_>) -> Result<(), RowError> {
        let body_weight = ctx.get_float(WEIGHT_KEY)?;
        let study_name = ctx.get(STUDY_KEY).cloned();
        let study = ctx.get_or_create(
            STUDY_MODEL,
            field_values([("name", study_name)]),
            FieldValues::new(),
        )?;

        let lookup = field_values([
            ("name", ctx.get(NAME_KEY).cloned()),
            ("study_id", Some(CellValue::Integer(study.id))),
            ("sex", ctx.get(SEX_KEY).cloned()),
            ("body_weight", body_weight.map(CellValue::Float)),
            ("diet", ctx.get(DIET_KEY).cloned()),
        ]);
        ctx.get_or_create(ANIMAL_MODEL, lookup, FieldValues::new())?;
        Ok(())
    }
}
