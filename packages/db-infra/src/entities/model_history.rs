use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Snapshot of a model taken before it was overwritten or removed.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "ACT_DE_MODEL_HISTORY")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    #[sea_orm(column_name = "model_id")]
    pub model_id: i32,
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
    #[sea_orm(column_name = "removal_date")]
    pub removal_date: Option<OffsetDateTime>,
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
    #[sea_orm(
        belongs_to = "super::model::Entity",
        from = "Column::ModelId",
        to = "super::model::Column::Id",
        on_delete = "Cascade"
    )]
    Model,
}

impl Related<super::model::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Model.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
