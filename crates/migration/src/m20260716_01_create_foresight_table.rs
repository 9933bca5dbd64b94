use sea_orm_migration::{
  prelude::*,
  schema::{custom, text, text_null, timestamp_with_time_zone, timestamp_with_time_zone_null, uuid},
  sea_orm::Statement,
};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
  async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
    manager
      .create_table(
        Table::create()
          .table(Foresight::Table)
          .if_not_exists()
          .col(uuid(Foresight::Id).primary_key())
          .col(uuid(Foresight::ParentEventId))
          .col(text_null(Foresight::UserId))
          .col(text(Foresight::GroupId))
          .col(text(Foresight::Content))
          .col(text_null(Foresight::Evidence))
          .col(timestamp_with_time_zone_null(Foresight::StartTime))
          .col(timestamp_with_time_zone_null(Foresight::EndTime))
          .col(custom(Foresight::Embedding, "vector(1024)").not_null())
          .col(timestamp_with_time_zone(Foresight::CreatedAt))
          .to_owned(),
      )
      .await?;

    manager
      .get_connection()
      .execute_raw(Statement::from_string(
        manager.get_database_backend(),
        "CREATE INDEX idx_foresight_embedding_hnsw ON foresight USING hnsw (embedding vector_cosine_ops);",
      ))
      .await?;

    manager
      .get_connection()
      .execute_raw(Statement::from_string(
        manager.get_database_backend(),
        "CREATE INDEX idx_foresight_content_bm25 ON foresight USING bm25 (id, (content::pdb.icu), created_at) WITH (key_field='id');",
      ))
      .await?;

    Ok(())
  }

  async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
    manager
      .drop_table(Table::drop().table(Foresight::Table).to_owned())
      .await?;

    Ok(())
  }
}

#[derive(Iden)]
pub enum Foresight {
  Table,

  Id,
  ParentEventId,
  UserId,
  GroupId,
  Content,
  Evidence,
  StartTime,
  EndTime,
  Embedding,
  CreatedAt,
}
