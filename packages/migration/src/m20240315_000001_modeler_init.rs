use sea_orm_migration::prelude::*;
use sea_orm_migration::sea_query::{ColumnDef, ForeignKey, ForeignKeyAction, Index, Table};

#[derive(DeriveMigrationName)]
pub struct Migration;

// ----- Iden enums for tables & columns -----
#[derive(Iden)]
enum Model {
    #[iden = "ACT_DE_MODEL"]
    Table,
    Id,
    Name,
    ModelKey,
    Description,
    ModelComment,
    Created,
    CreatedBy,
    LastUpdated,
    LastUpdatedBy,
    Version,
    ModelEditorJson,
    ModelType,
    TenantId,
}

#[derive(Iden)]
enum ModelHistory {
    #[iden = "ACT_DE_MODEL_HISTORY"]
    Table,
    Id,
    ModelId,
    Name,
    ModelKey,
    Description,
    ModelComment,
    Created,
    CreatedBy,
    LastUpdated,
    LastUpdatedBy,
    RemovalDate,
    Version,
    ModelEditorJson,
    ModelType,
    TenantId,
}

#[derive(Iden)]
enum ModelRelation {
    #[iden = "ACT_DE_MODEL_RELATION"]
    Table,
    Id,
    ParentModelId,
    ModelId,
    RelationType,
}

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Model::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Model::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Model::Name).string_len(400).not_null())
                    .col(ColumnDef::new(Model::ModelKey).string_len(400).not_null())
                    .col(ColumnDef::new(Model::Description).text().null())
                    .col(ColumnDef::new(Model::ModelComment).text().null())
                    .col(
                        ColumnDef::new(Model::Created)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(ColumnDef::new(Model::CreatedBy).string_len(255).null())
                    .col(
                        ColumnDef::new(Model::LastUpdated)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(ColumnDef::new(Model::LastUpdatedBy).string_len(255).null())
                    .col(ColumnDef::new(Model::Version).integer().not_null().default(1))
                    .col(ColumnDef::new(Model::ModelEditorJson).text().null())
                    .col(ColumnDef::new(Model::ModelType).integer().not_null())
                    .col(ColumnDef::new(Model::TenantId).string_len(255).null())
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_act_de_model_key")
                    .table(Model::Table)
                    .col(Model::ModelKey)
                    .col(Model::ModelType)
                    .if_not_exists()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(ModelHistory::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ModelHistory::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(ModelHistory::ModelId).integer().not_null())
                    .col(ColumnDef::new(ModelHistory::Name).string_len(400).not_null())
                    .col(
                        ColumnDef::new(ModelHistory::ModelKey)
                            .string_len(400)
                            .not_null(),
                    )
                    .col(ColumnDef::new(ModelHistory::Description).text().null())
                    .col(ColumnDef::new(ModelHistory::ModelComment).text().null())
                    .col(
                        ColumnDef::new(ModelHistory::Created)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(ColumnDef::new(ModelHistory::CreatedBy).string_len(255).null())
                    .col(
                        ColumnDef::new(ModelHistory::LastUpdated)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ModelHistory::LastUpdatedBy)
                            .string_len(255)
                            .null(),
                    )
                    .col(
                        ColumnDef::new(ModelHistory::RemovalDate)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(ColumnDef::new(ModelHistory::Version).integer().not_null())
                    .col(ColumnDef::new(ModelHistory::ModelEditorJson).text().null())
                    .col(ColumnDef::new(ModelHistory::ModelType).integer().not_null())
                    .col(ColumnDef::new(ModelHistory::TenantId).string_len(255).null())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_act_de_model_history_model")
                            .from(ModelHistory::Table, ModelHistory::ModelId)
                            .to(Model::Table, Model::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_act_de_model_history_model")
                    .table(ModelHistory::Table)
                    .col(ModelHistory::ModelId)
                    .if_not_exists()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(ModelRelation::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ModelRelation::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(ModelRelation::ParentModelId)
                            .integer()
                            .not_null(),
                    )
                    .col(ColumnDef::new(ModelRelation::ModelId).integer().not_null())
                    .col(
                        ColumnDef::new(ModelRelation::RelationType)
                            .string_len(255)
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_act_de_model_relation_parent")
                            .from(ModelRelation::Table, ModelRelation::ParentModelId)
                            .to(Model::Table, Model::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_act_de_model_relation_child")
                            .from(ModelRelation::Table, ModelRelation::ModelId)
                            .to(Model::Table, Model::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_act_de_model_relation_parent")
                    .table(ModelRelation::Table)
                    .col(ModelRelation::ParentModelId)
                    .if_not_exists()
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // children first
        manager
            .drop_table(
                Table::drop()
                    .table(ModelRelation::Table)
                    .if_exists()
                    .to_owned(),
            )
            .await?;
        manager
            .drop_table(
                Table::drop()
                    .table(ModelHistory::Table)
                    .if_exists()
                    .to_owned(),
            )
            .await?;
        manager
            .drop_table(Table::drop().table(Model::Table).if_exists().to_owned())
            .await?;
        Ok(())
    }
}
