use sea_orm_migration::{
  prelude::*,
  schema::{custom, text, text_null, timestamp_with_time_zone, uuid},
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
          .table(EpisodicMemory::Table)
          .if_not_exists()
          .col(uuid(EpisodicMemory::Id).primary_key())
          .col(
            ColumnDef::new(EpisodicMemory::ParentMemcellIds)
              .array(ColumnType::Uuid)
              .not_null(),
          )
          .col(text_null(EpisodicMemory::UserId))
          .col(text(EpisodicMemory::GroupId))
          .col(timestamp_with_time_zone(EpisodicMemory::Timestamp))
          .col(text(EpisodicMemory::Subject))
          .col(text(EpisodicMemory::Episode))
          .col(text(EpisodicMemory::Summary))
          .col(custom(EpisodicMemory::Embedding, "vector(1024)").not_null())
          .col(timestamp_with_time_zone(EpisodicMemory::CreatedAt))
          .to_owned(),
      )
      .await?;

    manager
      .create_index(
        Index::create()
          .name("idx_episodic_memory_group_user")
          .table(EpisodicMemory::Table)
          .col(EpisodicMemory::GroupId)
          .col(EpisodicMemory::UserId)
          .to_owned(),
      )
      .await?;

    // HNSW index for vector similarity search
    manager
      .get_connection()
      .execute_raw(Statement::from_string(
        manager.get_database_backend(),
        "CREATE INDEX idx_episodic_memory_embedding_hnsw ON episodic_memory USING hnsw (embedding vector_cosine_ops);",
      ))
      .await?;

    // BM25 index for full-text search over the episode narrative
    manager
      .get_connection()
      .execute_raw(Statement::from_string(
        manager.get_database_backend(),
        "CREATE INDEX idx_episodic_memory_episode_bm25 ON episodic_memory USING bm25 (id, (episode::pdb.icu), timestamp) WITH (key_field='id');",
      ))
      .await?;

    Ok(())
  }

  async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
    manager
      .drop_table(Table::drop().table(EpisodicMemory::Table).to_owned())
      .await?;

    Ok(())
  }
}

#[derive(Iden)]
pub enum EpisodicMemory {
  Table,

  Id,
  ParentMemcellIds,
  UserId,
  GroupId,
  Timestamp,
  Subject,
  Episode,
  Summary,
  Embedding,
  CreatedAt,
}
