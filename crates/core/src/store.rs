use anyhow::anyhow;
use chrono::{DateTime, Utc};
use sea_orm::{
  ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, IntoActiveModel, QueryFilter,
  QueryOrder, QuerySelect, Set, TransactionTrait, prelude::PgVector,
};
use stratamem_entities::{episodic_memory, event_log, foresight, mem_cell, profile_memory, semantic_memory};
use stratamem_shared::AppError;
use tracing::{debug, info};
use uuid::Uuid;

// ──────────────────────────────────────────────────
// Write payloads
// ──────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct NewEpisodicMemory {
  pub parent_memcell_ids: Vec<Uuid>,
  pub user_id: Option<String>,
  pub group_id: String,
  pub timestamp: DateTime<Utc>,
  pub subject: String,
  pub episode: String,
  pub summary: String,
  pub embedding: PgVector,
}

#[derive(Debug, Clone)]
pub struct NewSemanticMemory {
  pub parent_event_id: Uuid,
  pub user_id: String,
  pub group_id: String,
  pub content: String,
  pub evidence: Option<String>,
  pub start_time: Option<DateTime<Utc>>,
  pub end_time: Option<DateTime<Utc>>,
  pub duration_days: Option<i32>,
  pub embedding: PgVector,
}

/// Domain-level event log: parallel facts and embeddings for one user
/// and one episode. Exploded into one row per fact at save time.
#[derive(Debug, Clone)]
pub struct EventLog {
  pub parent_event_id: Uuid,
  pub user_id: String,
  pub group_id: String,
  pub time: DateTime<Utc>,
  pub atomic_facts: Vec<String>,
  pub fact_embeddings: Vec<PgVector>,
}

#[derive(Debug, Clone)]
pub struct NewForesight {
  pub parent_event_id: Uuid,
  pub user_id: Option<String>,
  pub group_id: String,
  pub content: String,
  pub evidence: Option<String>,
  pub start_time: Option<DateTime<Utc>>,
  pub end_time: Option<DateTime<Utc>>,
  pub embedding: PgVector,
}

#[derive(Debug, Clone)]
pub struct NewProfileMemory {
  pub user_id: String,
  pub group_id: String,
  pub version: String,
  pub scenario: String,
  pub summary: String,
  pub interests: Vec<String>,
  pub skills: Vec<String>,
  pub traits: Vec<String>,
}

// ──────────────────────────────────────────────────
// Facade
// ──────────────────────────────────────────────────

/// Write surface over the persisted memory types. The document rows are
/// the source of truth; the full-text and vector indexes live on the
/// same tables and follow every insert.
#[derive(Clone)]
pub struct MemoryStore {
  db: DatabaseConnection,
}

impl MemoryStore {
  pub fn new(db: DatabaseConnection) -> Self {
    Self { db }
  }

  #[must_use]
  pub fn db(&self) -> &DatabaseConnection {
    &self.db
  }

  pub async fn save_episodic_batch(
    &self,
    items: Vec<NewEpisodicMemory>,
  ) -> Result<Vec<episodic_memory::Model>, AppError> {
    let now: sea_orm::prelude::DateTimeWithTimeZone = Utc::now().into();
    let models: Vec<episodic_memory::Model> = items
      .into_iter()
      .map(|item| episodic_memory::Model {
        id: Uuid::now_v7(),
        parent_memcell_ids: item.parent_memcell_ids,
        user_id: item.user_id,
        group_id: item.group_id,
        timestamp: item.timestamp.into(),
        subject: item.subject,
        episode: item.episode,
        summary: item.summary,
        embedding: item.embedding,
        created_at: now,
      })
      .collect();

    if models.is_empty() {
      return Ok(models);
    }

    episodic_memory::Entity::insert_many(
      models.iter().cloned().map(episodic_memory::ActiveModel::from),
    )
    .exec_without_returning(&self.db)
    .await?;

    debug!(count = models.len(), "saved episodic memories");
    Ok(models)
  }

  pub async fn save_semantic_batch(
    &self,
    items: Vec<NewSemanticMemory>,
  ) -> Result<Vec<semantic_memory::Model>, AppError> {
    let now: sea_orm::prelude::DateTimeWithTimeZone = Utc::now().into();
    let models: Vec<semantic_memory::Model> = items
      .into_iter()
      .map(|item| semantic_memory::Model {
        id: Uuid::now_v7(),
        parent_event_id: item.parent_event_id,
        user_id: item.user_id,
        group_id: item.group_id,
        content: item.content,
        evidence: item.evidence,
        start_time: item.start_time.map(Into::into),
        end_time: item.end_time.map(Into::into),
        duration_days: item.duration_days,
        embedding: item.embedding,
        created_at: now,
      })
      .collect();

    if models.is_empty() {
      return Ok(models);
    }

    semantic_memory::Entity::insert_many(
      models.iter().cloned().map(semantic_memory::ActiveModel::from),
    )
    .exec_without_returning(&self.db)
    .await?;

    debug!(count = models.len(), "saved semantic memories");
    Ok(models)
  }

  /// Save an event log, one row per atomic fact.
  ///
  /// A facts/embeddings length mismatch is an invariant violation: the
  /// whole log is rejected and the task that produced it must fail.
  pub async fn save_event_logs(
    &self,
    logs: Vec<EventLog>,
  ) -> Result<Vec<event_log::Model>, AppError> {
    for log in &logs {
      if log.atomic_facts.len() != log.fact_embeddings.len() {
        return Err(AppError::new(anyhow!(
          "event log for user {} has {} facts but {} embeddings",
          log.user_id,
          log.atomic_facts.len(),
          log.fact_embeddings.len()
        )));
      }
    }

    let now: sea_orm::prelude::DateTimeWithTimeZone = Utc::now().into();
    let mut models = Vec::new();
    for log in logs {
      let time: sea_orm::prelude::DateTimeWithTimeZone = log.time.into();
      for (index, (fact, embedding)) in log
        .atomic_facts
        .into_iter()
        .zip(log.fact_embeddings.into_iter())
        .enumerate()
      {
        models.push(event_log::Model {
          id: Uuid::now_v7(),
          parent_event_id: log.parent_event_id,
          user_id: log.user_id.clone(),
          group_id: log.group_id.clone(),
          time,
          fact_index: index as i32,
          atomic_fact: fact,
          embedding,
          created_at: now,
        });
      }
    }

    if models.is_empty() {
      return Ok(models);
    }

    event_log::Entity::insert_many(models.iter().cloned().map(event_log::ActiveModel::from))
      .exec_without_returning(&self.db)
      .await?;

    debug!(rows = models.len(), "saved event log facts");
    Ok(models)
  }

  pub async fn save_foresight_batch(
    &self,
    items: Vec<NewForesight>,
  ) -> Result<Vec<foresight::Model>, AppError> {
    let now: sea_orm::prelude::DateTimeWithTimeZone = Utc::now().into();
    let models: Vec<foresight::Model> = items
      .into_iter()
      .map(|item| foresight::Model {
        id: Uuid::now_v7(),
        parent_event_id: item.parent_event_id,
        user_id: item.user_id,
        group_id: item.group_id,
        content: item.content,
        evidence: item.evidence,
        start_time: item.start_time.map(Into::into),
        end_time: item.end_time.map(Into::into),
        embedding: item.embedding,
        created_at: now,
      })
      .collect();

    if models.is_empty() {
      return Ok(models);
    }

    foresight::Entity::insert_many(models.iter().cloned().map(foresight::ActiveModel::from))
      .exec_without_returning(&self.db)
      .await?;

    debug!(count = models.len(), "saved foresights");
    Ok(models)
  }

  /// Insert a new profile version and retire the previous latest in the
  /// same transaction, preserving the one-latest-row invariant.
  pub async fn save_profile(
    &self,
    profile: NewProfileMemory,
  ) -> Result<profile_memory::Model, AppError> {
    let txn = self.db.begin().await?;

    profile_memory::Entity::update_many()
      .col_expr(profile_memory::Column::IsLatest, sea_orm::prelude::Expr::value(false))
      .filter(profile_memory::Column::UserId.eq(&profile.user_id))
      .filter(profile_memory::Column::GroupId.eq(&profile.group_id))
      .filter(profile_memory::Column::IsLatest.eq(true))
      .exec(&txn)
      .await?;

    let model = profile_memory::Model {
      id: Uuid::now_v7(),
      user_id: profile.user_id,
      group_id: profile.group_id,
      version: profile.version,
      is_latest: true,
      scenario: profile.scenario,
      summary: profile.summary,
      interests: serde_json::to_value(&profile.interests)?,
      skills: serde_json::to_value(&profile.skills)?,
      traits: serde_json::to_value(&profile.traits)?,
      created_at: Utc::now().into(),
    };
    profile_memory::ActiveModel::from(model.clone()).insert(&txn).await?;

    txn.commit().await?;

    info!(
      user_id = %model.user_id,
      group_id = %model.group_id,
      version = %model.version,
      "saved profile version"
    );
    Ok(model)
  }

  pub async fn latest_profile(
    &self,
    user_id: &str,
    group_id: &str,
  ) -> Result<Option<profile_memory::Model>, AppError> {
    let model = profile_memory::Entity::find()
      .filter(profile_memory::Column::UserId.eq(user_id))
      .filter(profile_memory::Column::GroupId.eq(group_id))
      .filter(profile_memory::Column::IsLatest.eq(true))
      .one(&self.db)
      .await?;
    Ok(model)
  }

  /// Back-propagate the extracted narrative onto the MemCell row.
  pub async fn update_memcell_extraction(
    &self,
    event_id: Uuid,
    episode: &str,
    subject: &str,
  ) -> Result<(), AppError> {
    let Some(model) = mem_cell::Entity::find_by_id(event_id).one(&self.db).await? else {
      return Err(AppError::new(anyhow!("memcell {event_id} not found")));
    };

    let mut active = model.into_active_model();
    active.episode = Set(Some(episode.to_owned()));
    active.subject = Set(Some(subject.to_owned()));
    active.update(&self.db).await?;
    Ok(())
  }

  /// Most recent episode narratives for one user in one group, newest
  /// first. Used by profile extraction.
  pub async fn recent_episodes_for_user(
    &self,
    group_id: &str,
    user_id: &str,
    limit: u64,
  ) -> Result<Vec<episodic_memory::Model>, AppError> {
    let models = episodic_memory::Entity::find()
      .filter(episodic_memory::Column::GroupId.eq(group_id))
      .filter(episodic_memory::Column::UserId.eq(user_id))
      .order_by_desc(episodic_memory::Column::Timestamp)
      .limit(limit)
      .all(&self.db)
      .await?;
    Ok(models)
  }
}
