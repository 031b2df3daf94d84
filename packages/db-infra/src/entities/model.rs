use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Values stored in `model_type`.
pub mod model_type {
    pub const BPMN: i32 = 0;
    pub const FORM: i32 = 2;
    pub const APP: i32 = 3;
    pub const DECISION_TABLE: i32 = 4;
}

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "ACT_DE_MODEL")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub name: String,
    #[sea_orm(column_name = "model_key")]
    pub model_key: String,
    #[sea_orm(column_type = "Text", nullable)]
    pub description: Option<String>,
    #[sea_orm(column_name = "model_comment", column_type = "Text", nullable)]
    pub model_comment: Option<String>,
    pub created: OffsetDateTime,
    #[sea_orm(column_name = "created_by")]
    pub created_by: Option<String>,
    #[sea_orm(column_name = "last_updated")]
    pub last_updated: OffsetDateTime,
    #[sea_orm(column_name = "last_updated_by")]
    pub last_updated_by: Option<String>,
    pub version: i32,
    #[sea_orm(column_name = "model_editor_json", column_type = "Text", nullable)]
    pub model_editor_json: Option<String>,
    #[sea_orm(column_name = "model_type")]
    pub model_type: i32,
    #[sea_orm(column_name = "tenant_id")]
    pub tenant_id: Option<String>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::model_history::Entity")]
    History,
}

impl Related<super::model_history::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::History.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
