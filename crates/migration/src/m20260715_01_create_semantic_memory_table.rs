use sea_orm_migration::{
  prelude::*,
  schema::{custom, integer_null, text, text_null, timestamp_with_time_zone, timestamp_with_time_zone_null, uuid},
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
          .table(SemanticMemory::Table)
          .if_not_exists()
          .col(uuid(SemanticMemory::Id).primary_key())
          .col(uuid(SemanticMemory::ParentEventId))
          .col(text(SemanticMemory::UserId))
          .col(text(SemanticMemory::GroupId))
          .col(text(SemanticMemory::Content))
          .col(text_null(SemanticMemory::Evidence))
          .col(timestamp_with_time_zone_null(SemanticMemory::StartTime))
          .col(timestamp_with_time_zone_null(SemanticMemory::EndTime))
          .col(integer_null(SemanticMemory::DurationDays))
          .col(custom(SemanticMemory::Embedding, "vector(1024)").not_null())
          .col(timestamp_with_time_zone(SemanticMemory::CreatedAt))
          .to_owned(),
      )
      .await?;

    manager
      .create_index(
        Index::create()
          .name("idx_semantic_memory_group_user")
          .table(SemanticMemory::Table)
          .col(SemanticMemory::GroupId)
          .col(SemanticMemory::UserId)
          .to_owned(),
      )
      .await?;

    manager
      .get_connection()
      .execute_raw(Statement::from_string(
        manager.get_database_backend(),
        "CREATE INDEX idx_semantic_memory_embedding_hnsw ON semantic_memory USING hnsw (embedding vector_cosine_ops);",
      ))
      .await?;

    manager
      .get_connection()
      .execute_raw(Statement::from_string(
        manager.get_database_backend(),
        "CREATE INDEX idx_semantic_memory_content_bm25 ON semantic_memory USING bm25 (id, (content::pdb.icu), created_at) WITH (key_field='id');",
      ))
      .await?;

    Ok(())
  }

  async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
    manager
      .drop_table(Table::drop().table(SemanticMemory::Table).to_owned())
      .await?;

    Ok(())
  }
}

#[derive(Iden)]
pub enum SemanticMemory {
  Table,

  Id,
  ParentEventId,
  UserId,
  GroupId,
  Content,
  Evidence,
  StartTime,
  EndTime,
  DurationDays,
  Embedding,
  CreatedAt,
}
