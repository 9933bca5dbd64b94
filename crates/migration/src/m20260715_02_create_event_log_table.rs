use sea_orm_migration::{
  prelude::*,
  schema::{custom, integer, text, timestamp_with_time_zone, uuid},
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
          .table(EventLog::Table)
          .if_not_exists()
          .col(uuid(EventLog::Id).primary_key())
          .col(uuid(EventLog::ParentEventId))
          .col(text(EventLog::UserId))
          .col(text(EventLog::GroupId))
          .col(timestamp_with_time_zone(EventLog::Time))
          .col(integer(EventLog::FactIndex))
          .col(text(EventLog::AtomicFact))
          .col(custom(EventLog::Embedding, "vector(1024)").not_null())
          .col(timestamp_with_time_zone(EventLog::CreatedAt))
          .to_owned(),
      )
      .await?;

    manager
      .create_index(
        Index::create()
          .name("idx_event_log_group_user")
          .table(EventLog::Table)
          .col(EventLog::GroupId)
          .col(EventLog::UserId)
          .to_owned(),
      )
      .await?;

    // The event-log vector index uses L2 distance, unlike the cosine
    // indexes on episode/foresight.
    manager
      .get_connection()
      .execute_raw(Statement::from_string(
        manager.get_database_backend(),
        "CREATE INDEX idx_event_log_embedding_hnsw ON event_log USING hnsw (embedding vector_l2_ops);",
      ))
      .await?;

    manager
      .get_connection()
      .execute_raw(Statement::from_string(
        manager.get_database_backend(),
        "CREATE INDEX idx_event_log_fact_bm25 ON event_log USING bm25 (id, (atomic_fact::pdb.icu), time) WITH (key_field='id');",
      ))
      .await?;

    Ok(())
  }

  async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
    manager
      .drop_table(Table::drop().table(EventLog::Table).to_owned())
      .await?;

    Ok(())
  }
}

#[derive(Iden)]
pub enum EventLog {
  Table,

  Id,
  ParentEventId,
  UserId,
  GroupId,
  Time,
  FactIndex,
  AtomicFact,
  Embedding,
  CreatedAt,
}
