use anyhow::anyhow;
use chrono::{DateTime, Utc};
use sea_orm::{
  ConnectionTrait, DatabaseConnection, DbBackend, FromQueryResult, Statement, prelude::PgVector,
};
use stratamem_entities::{episodic_memory, event_log, foresight, semantic_memory};
use stratamem_shared::AppError;

use super::DataSource;
use super::fusion::{
  RetrievedMemory, episode_to_memory, event_log_to_memory, foresight_to_memory, semantic_to_memory,
};

/// Shared row filters for both legs.
#[derive(Debug, Clone, Default)]
pub(crate) struct SearchFilters<'a> {
  pub user_id: Option<&'a str>,
  pub group_id: Option<&'a str>,
  pub since: Option<DateTime<Utc>>,
  /// Foresight validity instant; ignored by other sources.
  pub valid_at: Option<DateTime<Utc>>,
}

fn common_values(filters: &SearchFilters<'_>) -> (sea_orm::Value, sea_orm::Value, sea_orm::Value) {
  (
    filters.user_id.map(str::to_owned).into(),
    filters.group_id.map(str::to_owned).into(),
    filters.since.into(),
  )
}

/// Full-text leg: one BM25 query against the source's text column,
/// rank order = descending BM25 score.
pub(crate) async fn bm25_leg(
  db: &DatabaseConnection,
  source: DataSource,
  query: &str,
  filters: &SearchFilters<'_>,
  limit: u64,
) -> Result<Vec<RetrievedMemory>, AppError> {
  let (user, group, since) = common_values(filters);

  let (sql, values): (&str, Vec<sea_orm::Value>) = match source {
    DataSource::Episode => (
      r"
      SELECT * FROM episodic_memory
      WHERE episode ||| $1
        AND ($2::text IS NULL OR user_id = $2)
        AND ($3::text IS NULL OR group_id = $3)
        AND ($4::timestamptz IS NULL OR timestamp >= $4)
      ORDER BY pdb.score(id) DESC
      LIMIT $5;
      ",
      vec![query.into(), user, group, since, (limit as i64).into()],
    ),
    DataSource::Semantic => (
      r"
      SELECT * FROM semantic_memory
      WHERE content ||| $1
        AND ($2::text IS NULL OR user_id = $2)
        AND ($3::text IS NULL OR group_id = $3)
        AND ($4::timestamptz IS NULL OR created_at >= $4)
      ORDER BY pdb.score(id) DESC
      LIMIT $5;
      ",
      vec![query.into(), user, group, since, (limit as i64).into()],
    ),
    DataSource::EventLog => (
      r"
      SELECT * FROM event_log
      WHERE atomic_fact ||| $1
        AND ($2::text IS NULL OR user_id = $2)
        AND ($3::text IS NULL OR group_id = $3)
        AND ($4::timestamptz IS NULL OR time >= $4)
      ORDER BY pdb.score(id) DESC
      LIMIT $5;
      ",
      vec![query.into(), user, group, since, (limit as i64).into()],
    ),
    DataSource::Foresight => (
      r"
      SELECT * FROM foresight
      WHERE content ||| $1
        AND ($2::text IS NULL OR user_id IS NULL OR user_id = $2)
        AND ($3::text IS NULL OR group_id = $3)
        AND ($4::timestamptz IS NULL OR created_at >= $4)
        AND ($5::timestamptz IS NULL
          OR ((start_time IS NULL OR start_time <= $5)
            AND (end_time IS NULL OR end_time >= $5)))
      ORDER BY pdb.score(id) DESC
      LIMIT $6;
      ",
      vec![
        query.into(),
        user,
        group,
        since,
        filters.valid_at.into(),
        (limit as i64).into(),
      ],
    ),
    DataSource::Profile => {
      return Err(AppError::new(anyhow!("profile is not a searchable data source")));
    }
  };

  let stmt = Statement::from_sql_and_values(DbBackend::Postgres, sql, values);
  let rows = db.query_all_raw(stmt).await?;

  rows_to_memories(source, &rows)
}

/// Vector leg: nearest-neighbor search over the source's embedding
/// column. Episode and foresight use cosine distance with an optional
/// similarity floor (`radius`); event_log uses L2 and ignores it.
pub(crate) async fn embedding_leg(
  db: &DatabaseConnection,
  source: DataSource,
  vector: &PgVector,
  filters: &SearchFilters<'_>,
  limit: u64,
  radius: Option<f32>,
) -> Result<Vec<RetrievedMemory>, AppError> {
  let (user, group, since) = common_values(filters);
  let radius: sea_orm::Value = radius.map(f64::from).into();

  let (sql, values): (&str, Vec<sea_orm::Value>) = match source {
    DataSource::Episode => (
      r"
      SELECT * FROM episodic_memory
      WHERE ($2::text IS NULL OR user_id = $2)
        AND ($3::text IS NULL OR group_id = $3)
        AND ($4::timestamptz IS NULL OR timestamp >= $4)
        AND ($5::float8 IS NULL OR 1 - (embedding <=> $1) >= $5)
      ORDER BY embedding <=> $1
      LIMIT $6;
      ",
      vec![vector.clone().into(), user, group, since, radius, (limit as i64).into()],
    ),
    DataSource::Semantic => (
      r"
      SELECT * FROM semantic_memory
      WHERE ($2::text IS NULL OR user_id = $2)
        AND ($3::text IS NULL OR group_id = $3)
        AND ($4::timestamptz IS NULL OR created_at >= $4)
        AND ($5::float8 IS NULL OR 1 - (embedding <=> $1) >= $5)
      ORDER BY embedding <=> $1
      LIMIT $6;
      ",
      vec![vector.clone().into(), user, group, since, radius, (limit as i64).into()],
    ),
    DataSource::EventLog => (
      r"
      SELECT * FROM event_log
      WHERE ($2::text IS NULL OR user_id = $2)
        AND ($3::text IS NULL OR group_id = $3)
        AND ($4::timestamptz IS NULL OR time >= $4)
      ORDER BY embedding <-> $1
      LIMIT $5;
      ",
      vec![vector.clone().into(), user, group, since, (limit as i64).into()],
    ),
    DataSource::Foresight => (
      r"
      SELECT * FROM foresight
      WHERE ($2::text IS NULL OR user_id IS NULL OR user_id = $2)
        AND ($3::text IS NULL OR group_id = $3)
        AND ($4::timestamptz IS NULL OR created_at >= $4)
        AND ($5::timestamptz IS NULL
          OR ((start_time IS NULL OR start_time <= $5)
            AND (end_time IS NULL OR end_time >= $5)))
        AND ($6::float8 IS NULL OR 1 - (embedding <=> $1) >= $6)
      ORDER BY embedding <=> $1
      LIMIT $7;
      ",
      vec![
        vector.clone().into(),
        user,
        group,
        since,
        filters.valid_at.into(),
        radius,
        (limit as i64).into(),
      ],
    ),
    DataSource::Profile => {
      return Err(AppError::new(anyhow!("profile is not a searchable data source")));
    }
  };

  let stmt = Statement::from_sql_and_values(DbBackend::Postgres, sql, values);
  let rows = db.query_all_raw(stmt).await?;

  rows_to_memories(source, &rows)
}

fn rows_to_memories(
  source: DataSource,
  rows: &[sea_orm::QueryResult],
) -> Result<Vec<RetrievedMemory>, AppError> {
  let mut memories = Vec::with_capacity(rows.len());
  for row in rows {
    let memory = match source {
      DataSource::Episode => episode_to_memory(&episodic_memory::Model::from_query_result(row, "")?),
      DataSource::Semantic => semantic_to_memory(&semantic_memory::Model::from_query_result(row, "")?),
      DataSource::EventLog => event_log_to_memory(&event_log::Model::from_query_result(row, "")?),
      DataSource::Foresight => foresight_to_memory(&foresight::Model::from_query_result(row, "")?),
      DataSource::Profile => unreachable!("profile handled before the legs"),
    };
    memories.push(memory);
  }
  Ok(memories)
}
