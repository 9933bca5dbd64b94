use sea_orm_migration::{
  prelude::*,
  schema::{boolean, json_binary, text, timestamp_with_time_zone, uuid},
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
          .table(ProfileMemory::Table)
          .if_not_exists()
          .col(uuid(ProfileMemory::Id).primary_key())
          .col(text(ProfileMemory::UserId))
          .col(text(ProfileMemory::GroupId))
          .col(text(ProfileMemory::Version))
          .col(boolean(ProfileMemory::IsLatest))
          .col(text(ProfileMemory::Scenario))
          .col(text(ProfileMemory::Summary))
          .col(json_binary(ProfileMemory::Interests))
          .col(json_binary(ProfileMemory::Skills))
          .col(json_binary(ProfileMemory::Traits))
          .col(timestamp_with_time_zone(ProfileMemory::CreatedAt))
          .to_owned(),
      )
      .await?;

    // At most one latest row per (user, group).
    manager
      .get_connection()
      .execute_raw(Statement::from_string(
        manager.get_database_backend(),
        "CREATE UNIQUE INDEX idx_profile_memory_latest ON profile_memory (user_id, group_id) WHERE is_latest;",
      ))
      .await?;

    Ok(())
  }

  async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
    manager
      .drop_table(Table::drop().table(ProfileMemory::Table).to_owned())
      .await?;

    Ok(())
  }
}

#[derive(Iden)]
pub enum ProfileMemory {
  Table,

  Id,
  UserId,
  GroupId,
  Version,
  IsLatest,
  Scenario,
  Summary,
  Interests,
  Skills,
  Traits,
  CreatedAt,
}
