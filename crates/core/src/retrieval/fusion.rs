use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use stratamem_entities::{episodic_memory, event_log, foresight, profile_memory, semantic_memory};
use utoipa::ToSchema;
use uuid::Uuid;

/// Reciprocal-rank-fusion constant: `score(d) = Σ 1 / (K + rank)`.
pub(crate) const RRF_K: f64 = 60.0;

/// One retrieved memory in the unified response shape, regardless of
/// which store it came from.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct RetrievedMemory {
  pub id: Uuid,
  pub memory_type: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub user_id: Option<String>,
  pub group_id: String,
  pub timestamp: DateTime<Utc>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub subject: Option<String>,
  pub content: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub summary: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub evidence: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub parent_event_id: Option<Uuid>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub start_time: Option<DateTime<Utc>>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub end_time: Option<DateTime<Utc>>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub details: Option<serde_json::Value>,
  pub score: f64,
}

// ──────────────────────────────────────────────────
// Row conversions
// ──────────────────────────────────────────────────

pub(crate) fn episode_to_memory(model: &episodic_memory::Model) -> RetrievedMemory {
  RetrievedMemory {
    id: model.id,
    memory_type: "episode".to_owned(),
    user_id: model.user_id.clone(),
    group_id: model.group_id.clone(),
    timestamp: model.timestamp.with_timezone(&Utc),
    subject: Some(model.subject.clone()),
    content: model.episode.clone(),
    summary: Some(model.summary.clone()),
    evidence: None,
    parent_event_id: None,
    start_time: None,
    end_time: None,
    details: None,
    score: 0.0,
  }
}

pub(crate) fn semantic_to_memory(model: &semantic_memory::Model) -> RetrievedMemory {
  RetrievedMemory {
    id: model.id,
    memory_type: "semantic".to_owned(),
    user_id: Some(model.user_id.clone()),
    group_id: model.group_id.clone(),
    timestamp: model.created_at.with_timezone(&Utc),
    subject: None,
    content: model.content.clone(),
    summary: None,
    evidence: model.evidence.clone(),
    parent_event_id: Some(model.parent_event_id),
    start_time: model.start_time.map(|t| t.with_timezone(&Utc)),
    end_time: model.end_time.map(|t| t.with_timezone(&Utc)),
    details: None,
    score: 0.0,
  }
}

pub(crate) fn event_log_to_memory(model: &event_log::Model) -> RetrievedMemory {
  RetrievedMemory {
    id: model.id,
    memory_type: "event_log".to_owned(),
    user_id: Some(model.user_id.clone()),
    group_id: model.group_id.clone(),
    timestamp: model.time.with_timezone(&Utc),
    subject: None,
    content: model.atomic_fact.clone(),
    summary: None,
    evidence: None,
    parent_event_id: Some(model.parent_event_id),
    start_time: None,
    end_time: None,
    details: None,
    score: 0.0,
  }
}

pub(crate) fn foresight_to_memory(model: &foresight::Model) -> RetrievedMemory {
  RetrievedMemory {
    id: model.id,
    memory_type: "foresight".to_owned(),
    user_id: model.user_id.clone(),
    group_id: model.group_id.clone(),
    timestamp: model.created_at.with_timezone(&Utc),
    subject: None,
    content: model.content.clone(),
    summary: None,
    evidence: model.evidence.clone(),
    parent_event_id: Some(model.parent_event_id),
    start_time: model.start_time.map(|t| t.with_timezone(&Utc)),
    end_time: model.end_time.map(|t| t.with_timezone(&Utc)),
    details: None,
    score: 0.0,
  }
}

pub(crate) fn profile_to_memory(model: &profile_memory::Model) -> RetrievedMemory {
  RetrievedMemory {
    id: model.id,
    memory_type: "profile".to_owned(),
    user_id: Some(model.user_id.clone()),
    group_id: model.group_id.clone(),
    timestamp: model.created_at.with_timezone(&Utc),
    subject: None,
    content: model.summary.clone(),
    summary: None,
    evidence: None,
    parent_event_id: None,
    start_time: None,
    end_time: None,
    details: Some(serde_json::json!({
      "version": model.version,
      "scenario": model.scenario,
      "interests": model.interests,
      "skills": model.skills,
      "traits": model.traits,
    })),
    score: 0.0,
  }
}

// ──────────────────────────────────────────────────
// Fusion
// ──────────────────────────────────────────────────

/// Deterministic result order: score desc, then timestamp desc, then id
/// asc.
pub(crate) fn sort_deterministic(memories: &mut [RetrievedMemory]) {
  memories.sort_by(|a, b| {
    b.score
      .partial_cmp(&a.score)
      .unwrap_or(std::cmp::Ordering::Equal)
      .then_with(|| b.timestamp.cmp(&a.timestamp))
      .then_with(|| a.id.cmp(&b.id))
  });
}

/// Score a single ranked leg so its order survives the shared sort.
pub(crate) fn score_single_leg(hits: Vec<RetrievedMemory>) -> Vec<RetrievedMemory> {
  hits
    .into_iter()
    .enumerate()
    .map(|(index, mut memory)| {
      memory.score = 1.0 / (RRF_K + (index + 1) as f64);
      memory
    })
    .collect()
}

/// Reciprocal-rank fusion of two ranked legs, deduplicated by id.
pub(crate) fn rrf_fuse(
  bm25: Vec<RetrievedMemory>,
  embedding: Vec<RetrievedMemory>,
  k: f64,
) -> Vec<RetrievedMemory> {
  let mut scores: HashMap<Uuid, f64> = HashMap::new();
  let mut by_id: HashMap<Uuid, RetrievedMemory> = HashMap::new();

  for leg in [bm25, embedding] {
    for (index, memory) in leg.into_iter().enumerate() {
      let rank = (index + 1) as f64;
      *scores.entry(memory.id).or_insert(0.0) += 1.0 / (k + rank);
      by_id.entry(memory.id).or_insert(memory);
    }
  }

  let mut fused: Vec<RetrievedMemory> = by_id
    .into_values()
    .map(|mut memory| {
      memory.score = scores[&memory.id];
      memory
    })
    .collect();

  sort_deterministic(&mut fused);
  fused
}

/// Merge result sets from several queries, keeping the best score per id.
pub(crate) fn merge_dedupe(sets: Vec<Vec<RetrievedMemory>>) -> Vec<RetrievedMemory> {
  let mut by_id: HashMap<Uuid, RetrievedMemory> = HashMap::new();
  for set in sets {
    for memory in set {
      match by_id.get_mut(&memory.id) {
        Some(existing) if existing.score >= memory.score => {}
        _ => {
          by_id.insert(memory.id, memory);
        }
      }
    }
  }
  let mut merged: Vec<RetrievedMemory> = by_id.into_values().collect();
  sort_deterministic(&mut merged);
  merged
}

#[cfg(test)]
mod tests {
  use chrono::{TimeZone, Utc};

  use super::*;

  fn memory(id: u128, minutes: i64) -> RetrievedMemory {
    RetrievedMemory {
      id: Uuid::from_u128(id),
      memory_type: "episode".to_owned(),
      user_id: None,
      group_id: "g".to_owned(),
      timestamp: Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap()
        + chrono::Duration::minutes(minutes),
      subject: None,
      content: format!("memory {id}"),
      summary: None,
      evidence: None,
      parent_event_id: None,
      start_time: None,
      end_time: None,
      details: None,
      score: 0.0,
    }
  }

  #[test]
  fn double_rank_one_dominates() {
    // d1 is rank 1 in both legs; nothing can outscore it.
    let bm25 = vec![memory(1, 0), memory(2, 0), memory(3, 0)];
    let emb = vec![memory(1, 0), memory(3, 0), memory(4, 0)];

    let fused = rrf_fuse(bm25, emb, RRF_K);
    assert_eq!(fused[0].id, Uuid::from_u128(1));
    let top_score = fused[0].score;
    assert!(fused.iter().skip(1).all(|m| m.score < top_score));
  }

  #[test]
  fn fused_score_is_sum_of_reciprocal_ranks() {
    let bm25 = vec![memory(1, 0), memory(2, 0)];
    let emb = vec![memory(2, 0), memory(1, 0)];

    let fused = rrf_fuse(bm25, emb, 60.0);
    // Both appear at ranks 1 and 2; scores equal.
    let expected = 1.0 / 61.0 + 1.0 / 62.0;
    for m in &fused {
      assert!((m.score - expected).abs() < 1e-12);
    }
  }

  #[test]
  fn ties_break_by_timestamp_then_id() {
    let newer = memory(2, 10);
    let older = memory(1, 0);
    let mut memories = vec![older.clone(), newer.clone()];
    for m in &mut memories {
      m.score = 0.5;
    }

    sort_deterministic(&mut memories);
    assert_eq!(memories[0].id, newer.id);

    // Same timestamp: smaller id first.
    let mut same_ts = vec![memory(9, 0), memory(3, 0)];
    for m in &mut same_ts {
      m.score = 0.5;
    }
    sort_deterministic(&mut same_ts);
    assert_eq!(same_ts[0].id, Uuid::from_u128(3));
  }

  #[test]
  fn fusion_deduplicates_by_id() {
    let bm25 = vec![memory(1, 0), memory(2, 0)];
    let emb = vec![memory(1, 0)];
    let fused = rrf_fuse(bm25, emb, RRF_K);
    assert_eq!(fused.len(), 2);
  }

  #[test]
  fn merge_dedupe_keeps_best_score() {
    let mut a = memory(1, 0);
    a.score = 0.2;
    let mut b = memory(1, 0);
    b.score = 0.7;

    let merged = merge_dedupe(vec![vec![a], vec![b]]);
    assert_eq!(merged.len(), 1);
    assert!((merged[0].score - 0.7).abs() < 1e-12);
  }

  #[test]
  fn single_leg_scores_decrease_with_rank() {
    let scored = score_single_leg(vec![memory(1, 0), memory(2, 0), memory(3, 0)]);
    assert!(scored[0].score > scored[1].score);
    assert!(scored[1].score > scored[2].score);
  }
}
