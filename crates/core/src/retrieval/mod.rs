mod fusion;
pub use fusion::RetrievedMemory;

mod search;

mod agentic;
pub use agentic::AgenticParams;

use anyhow::anyhow;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use sea_orm::prelude::PgVector;
use serde::{Deserialize, Serialize};
use stratamem_ai::embed;
use stratamem_shared::AppError;
use tracing::warn;
use utoipa::ToSchema;

use crate::MemoryStore;

use fusion::{RRF_K, rrf_fuse, score_single_leg};
use search::SearchFilters;

// ──────────────────────────────────────────────────
// Parameters
// ──────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum RetrievalMode {
  Bm25,
  Embedding,
  #[default]
  Rrf,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum DataSource {
  #[default]
  Episode,
  Semantic,
  EventLog,
  Foresight,
  Profile,
}

#[derive(Debug, Clone)]
pub struct LightweightParams {
  pub query: Option<String>,
  pub user_id: Option<String>,
  pub group_id: Option<String>,
  pub time_range_days: Option<i64>,
  pub top_k: usize,
  pub retrieval_mode: RetrievalMode,
  pub data_source: DataSource,
  /// Filters foresights to those valid at this instant.
  pub current_time: Option<DateTime<Utc>>,
  /// Cosine similarity floor; applies to the cosine vector legs
  /// (episode, semantic, foresight). event_log uses L2 distance and
  /// ignores it.
  pub radius: Option<f32>,
}

#[derive(Debug, Clone, Serialize, Default, ToSchema)]
pub struct RetrievalMetadata {
  pub retrieval_mode: String,
  pub total_latency_ms: f64,
  pub final_count: usize,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub emb_count: Option<usize>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub bm25_count: Option<usize>,
  #[serde(skip_serializing_if = "Vec::is_empty")]
  pub warnings: Vec<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub is_multi_round: Option<bool>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub is_sufficient: Option<bool>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub reasoning: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub refined_queries: Option<Vec<String>>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub round1_count: Option<usize>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub round2_count: Option<usize>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct RetrievalResult {
  pub memories: Vec<RetrievedMemory>,
  pub count: usize,
  pub metadata: RetrievalMetadata,
}

// ──────────────────────────────────────────────────
// Engine
// ──────────────────────────────────────────────────

/// Parallel BM25 + vector retrieval with reciprocal-rank fusion, plus
/// direct profile lookup and the agentic multi-round loop.
#[derive(Clone)]
pub struct RetrievalEngine {
  store: MemoryStore,
}

impl RetrievalEngine {
  pub fn new(store: MemoryStore) -> Self {
    Self { store }
  }

  pub async fn retrieve_lightweight(
    &self,
    params: &LightweightParams,
  ) -> Result<RetrievalResult, AppError> {
    let started = std::time::Instant::now();

    if params.data_source == DataSource::Profile {
      return self.retrieve_profile(params, started).await;
    }

    let query = params
      .query
      .as_deref()
      .filter(|q| !q.trim().is_empty())
      .ok_or_else(|| AppError::invalid_parameter(anyhow!("query is required")))?;

    let since = params
      .time_range_days
      .map(|days| Utc::now() - ChronoDuration::days(days));
    let filters = SearchFilters {
      user_id: params.user_id.as_deref(),
      group_id: params.group_id.as_deref(),
      since,
      valid_at: if params.data_source == DataSource::Foresight {
        params.current_time
      } else {
        None
      },
    };

    let mut metadata = RetrievalMetadata {
      retrieval_mode: mode_label(params.retrieval_mode).to_owned(),
      ..RetrievalMetadata::default()
    };

    let memories = match params.retrieval_mode {
      RetrievalMode::Bm25 => {
        let hits = search::bm25_leg(
          self.store.db(),
          params.data_source,
          query,
          &filters,
          params.top_k as u64,
        )
        .await?;
        metadata.bm25_count = Some(hits.len());
        score_single_leg(hits)
      }
      RetrievalMode::Embedding => {
        let vector = embed(query).await?;
        let hits = self
          .embedding_leg(params, &vector, &filters, params.top_k as u64)
          .await?;
        metadata.emb_count = Some(hits.len());
        score_single_leg(hits)
      }
      RetrievalMode::Rrf => {
        self
          .fused_legs(params, query, &filters, &mut metadata)
          .await?
      }
    };

    let mut memories = memories;
    memories.truncate(params.top_k);
    metadata.final_count = memories.len();
    metadata.total_latency_ms = started.elapsed().as_secs_f64() * 1000.0;

    Ok(RetrievalResult {
      count: memories.len(),
      memories,
      metadata,
    })
  }

  pub async fn retrieve_agentic(
    &self,
    params: &AgenticParams,
  ) -> Result<RetrievalResult, AppError> {
    agentic::run(self, params).await
  }

  async fn embedding_leg(
    &self,
    params: &LightweightParams,
    vector: &PgVector,
    filters: &SearchFilters<'_>,
    limit: u64,
  ) -> Result<Vec<RetrievedMemory>, AppError> {
    search::embedding_leg(
      self.store.db(),
      params.data_source,
      vector,
      filters,
      limit,
      params.radius,
    )
    .await
  }

  /// Both legs in parallel, each over-fetching 2×top_k, fused with
  /// reciprocal ranks. One failed arm degrades to the survivor.
  async fn fused_legs(
    &self,
    params: &LightweightParams,
    query: &str,
    filters: &SearchFilters<'_>,
    metadata: &mut RetrievalMetadata,
  ) -> Result<Vec<RetrievedMemory>, AppError> {
    let fetch = (params.top_k * 2) as u64;

    let vector = match embed(query).await {
      Ok(vector) => Some(vector),
      Err(err) => {
        warn!(error = %err, "query embedding failed, degrading to bm25 only");
        metadata
          .warnings
          .push("embedding arm unavailable".to_owned());
        None
      }
    };

    let bm25_future = search::bm25_leg(self.store.db(), params.data_source, query, filters, fetch);

    let (bm25_result, emb_result) = match &vector {
      Some(vector) => {
        let emb_future = self.embedding_leg(params, vector, filters, fetch);
        let (b, e) = tokio::join!(bm25_future, emb_future);
        (b, Some(e))
      }
      None => (bm25_future.await, None),
    };

    let bm25_hits = match bm25_result {
      Ok(hits) => hits,
      Err(err) => {
        warn!(error = %err, "bm25 arm failed, degrading to embedding only");
        metadata.warnings.push("bm25 arm unavailable".to_owned());
        Vec::new()
      }
    };
    let emb_hits = match emb_result {
      Some(Ok(hits)) => hits,
      Some(Err(err)) => {
        warn!(error = %err, "embedding arm failed, degrading to bm25 only");
        metadata
          .warnings
          .push("embedding arm unavailable".to_owned());
        Vec::new()
      }
      None => Vec::new(),
    };

    if bm25_hits.is_empty() && emb_hits.is_empty() && metadata.warnings.len() >= 2 {
      return Err(AppError::new(anyhow!("both retrieval arms failed")));
    }

    metadata.bm25_count = Some(bm25_hits.len());
    metadata.emb_count = Some(emb_hits.len());

    Ok(rrf_fuse(bm25_hits, emb_hits, RRF_K))
  }

  async fn retrieve_profile(
    &self,
    params: &LightweightParams,
    started: std::time::Instant,
  ) -> Result<RetrievalResult, AppError> {
    let (Some(user_id), Some(group_id)) = (params.user_id.as_deref(), params.group_id.as_deref())
    else {
      return Err(AppError::invalid_parameter(anyhow!(
        "user_id and group_id are required when data_source=profile"
      )));
    };

    let memories: Vec<RetrievedMemory> = self
      .store
      .latest_profile(user_id, group_id)
      .await?
      .map(|model| fusion::profile_to_memory(&model))
      .into_iter()
      .collect();

    let metadata = RetrievalMetadata {
      retrieval_mode: "profile".to_owned(),
      total_latency_ms: started.elapsed().as_secs_f64() * 1000.0,
      final_count: memories.len(),
      ..RetrievalMetadata::default()
    };

    Ok(RetrievalResult {
      count: memories.len(),
      memories,
      metadata,
    })
  }
}

fn mode_label(mode: RetrievalMode) -> &'static str {
  match mode {
    RetrievalMode::Bm25 => "bm25",
    RetrievalMode::Embedding => "embedding",
    RetrievalMode::Rrf => "rrf",
  }
}
