pub use sea_orm_migration::*;

mod m20260714_01_create_conversation_tables;
mod m20260714_02_create_mem_cell_table;
mod m20260714_03_create_episodic_memory_table;
mod m20260715_01_create_semantic_memory_table;
mod m20260715_02_create_event_log_table;
mod m20260716_01_create_foresight_table;
mod m20260716_02_create_profile_memory_table;
mod m20260716_03_create_cluster_state_table;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
  fn migrations() -> Vec<Box<dyn MigrationTrait>> {
    vec![
      Box::new(m20260714_01_create_conversation_tables::Migration),
      Box::new(m20260714_02_create_mem_cell_table::Migration),
      Box::new(m20260714_03_create_episodic_memory_table::Migration),
      Box::new(m20260715_01_create_semantic_memory_table::Migration),
      Box::new(m20260715_02_create_event_log_table::Migration),
      Box::new(m20260716_01_create_foresight_table::Migration),
      Box::new(m20260716_02_create_profile_memory_table::Migration),
      Box::new(m20260716_03_create_cluster_state_table::Migration),
    ]
  }
}
