use std::sync::Arc;

use anyhow::anyhow;
use futures::future::join_all;
use sea_orm::prelude::PgVector;
use stratamem_ai::{embed_many, with_retry};
use stratamem_core::{
  ClusterManager, EventLog, ExtractionTask, MemoryStore, NewEpisodicMemory, NewForesight,
  NewSemanticMemory, Scene,
  extraction::{
    EpisodeDraft, ForesightDraft, SemanticItemDraft, extract_atomic_facts, extract_episode,
    extract_foresights, extract_semantic_items, parse_loose_instant,
  },
  mark_memcell_extracted,
  participants::is_bot_participant,
};
use stratamem_shared::{APP_ENV, AppError};
use tracing::{info, warn};
use uuid::Uuid;

// ──────────────────────────────────────────────────
// Fan-out plan helpers
// ──────────────────────────────────────────────────

fn human_participants(participants: &[String]) -> Vec<String> {
  participants
    .iter()
    .filter(|p| !is_bot_participant(p))
    .cloned()
    .collect()
}

/// Users who get their own personal-episode extraction. Assistant scenes
/// skip these: the group episode is cloned instead.
fn personal_targets(scene: Scene, participants: &[String]) -> Vec<String> {
  if scene.is_assistant() {
    Vec::new()
  } else {
    human_participants(participants)
  }
}

/// Users who receive a clone of the group episode (and of its semantic /
/// event-log output) instead of their own extraction.
fn clone_targets(scene: Scene, participants: &[String]) -> Vec<String> {
  if scene.is_assistant() {
    human_participants(participants)
  } else {
    Vec::new()
  }
}

// ──────────────────────────────────────────────────
// Embedding demotion
// ──────────────────────────────────────────────────

fn zero_vector() -> PgVector {
  PgVector::from(vec![0.0_f32; APP_ENV.embed_dim])
}

/// Embed a batch; a failed batch demotes every item to a zero vector so
/// the rows are still persisted and text search keeps working.
async fn embed_or_zero(texts: &[String]) -> Vec<PgVector> {
  if texts.is_empty() {
    return Vec::new();
  }
  match embed_many(texts).await {
    Ok(vectors) => vectors,
    Err(err) => {
      warn!(count = texts.len(), error = %err, "embedding failed, demoting to zero vectors");
      texts.iter().map(|_| zero_vector()).collect()
    }
  }
}

// ──────────────────────────────────────────────────
// Per-task plan
// ──────────────────────────────────────────────────

struct ExtractionSource {
  /// Attribution for the extracted facts. For assistant scenes this is
  /// empty and the clone targets take over at persist time.
  user_id: Option<String>,
  episode_id: Uuid,
  episode_text: String,
}

pub(crate) async fn process_task(
  task: &ExtractionTask,
  store: &MemoryStore,
  clusters: &Arc<ClusterManager>,
) -> Result<(), AppError> {
  let memcell = &task.memcell;
  let personal = personal_targets(task.scene, &memcell.participants);
  let clones = clone_targets(task.scene, &memcell.participants);

  info!(
    event_id = %memcell.id,
    scene = ?task.scene,
    personal = personal.len(),
    clones = clones.len(),
    "extraction started"
  );

  // ── Stage A: episodic extraction, parallel ──
  let group_future = with_retry("group_episode", || extract_episode(memcell, None));
  let personal_future = join_all(personal.iter().map(|user_id| async move {
    let result =
      with_retry("personal_episode", || extract_episode(memcell, Some(user_id))).await;
    (user_id.clone(), result)
  }));
  let (group_result, personal_results) = tokio::join!(group_future, personal_future);

  let group_draft: Option<EpisodeDraft> = match group_result {
    Ok(draft) => Some(draft),
    Err(err) => {
      warn!(event_id = %memcell.id, error = %err, "group episode extraction failed");
      None
    }
  };
  let personal_drafts: Vec<(String, EpisodeDraft)> = personal_results
    .into_iter()
    .filter_map(|(user_id, result)| match result {
      Ok(draft) => Some((user_id, draft)),
      Err(err) => {
        warn!(user_id, error = %err, "personal episode extraction failed");
        None
      }
    })
    .collect();

  if group_draft.is_none() && personal_drafts.is_empty() {
    return Err(AppError::new(anyhow!(
      "episodic extraction produced nothing for memcell {}",
      memcell.id
    )));
  }

  // ── Stage B: back-propagate, then persist episodic memories ──
  if let Some(draft) = &group_draft {
    if let Err(err) = store
      .update_memcell_extraction(memcell.id, &draft.episode, &draft.subject)
      .await
    {
      warn!(event_id = %memcell.id, error = %err, "memcell back-propagation failed");
    }
  }

  let episode_texts: Vec<String> = group_draft
    .iter()
    .map(|d| d.episode.clone())
    .chain(personal_drafts.iter().map(|(_, d)| d.episode.clone()))
    .collect();
  let episode_embeddings = embed_or_zero(&episode_texts).await;
  let mut embeddings = episode_embeddings.into_iter();

  let mut new_episodics = Vec::new();
  // Saved-row index of each extraction source, in insert order.
  let mut source_slots: Vec<(Option<String>, usize)> = Vec::new();

  let group_embedding = group_draft.as_ref().map(|draft| {
    let embedding = embeddings.next().unwrap_or_else(zero_vector);
    source_slots.push((None, new_episodics.len()));
    new_episodics.push(NewEpisodicMemory {
      parent_memcell_ids: vec![memcell.id],
      user_id: None,
      group_id: memcell.group_id.clone(),
      timestamp: memcell.timestamp,
      subject: draft.subject.clone(),
      episode: draft.episode.clone(),
      summary: draft.summary.clone(),
      embedding: embedding.clone(),
    });
    embedding
  });

  for (user_id, draft) in &personal_drafts {
    let embedding = embeddings.next().unwrap_or_else(zero_vector);
    source_slots.push((Some(user_id.clone()), new_episodics.len()));
    new_episodics.push(NewEpisodicMemory {
      parent_memcell_ids: vec![memcell.id],
      user_id: Some(user_id.clone()),
      group_id: memcell.group_id.clone(),
      timestamp: memcell.timestamp,
      subject: draft.subject.clone(),
      episode: draft.episode.clone(),
      summary: draft.summary.clone(),
      embedding,
    });
  }

  // Assistant scene: persist a per-user copy of the group episode so
  // per-user retrieval works without redundant extraction.
  if let (Some(draft), Some(embedding)) = (&group_draft, &group_embedding) {
    for user_id in &clones {
      new_episodics.push(NewEpisodicMemory {
        parent_memcell_ids: vec![memcell.id],
        user_id: Some(user_id.clone()),
        group_id: memcell.group_id.clone(),
        timestamp: memcell.timestamp,
        subject: draft.subject.clone(),
        episode: draft.episode.clone(),
        summary: draft.summary.clone(),
        embedding: embedding.clone(),
      });
    }
  }

  let saved_episodics = store.save_episodic_batch(new_episodics).await?;

  // ── Stage C: semantic + event-log fan-out per source ──
  let sources: Vec<ExtractionSource> = source_slots
    .into_iter()
    .map(|(user_id, slot)| ExtractionSource {
      user_id,
      episode_id: saved_episodics[slot].id,
      episode_text: saved_episodics[slot].episode.clone(),
    })
    // Non-assistant scenes extract facts from personal perspectives only.
    .filter(|source| task.scene.is_assistant() || source.user_id.is_some())
    .collect();

  // The subject whose facts are extracted: the source's own user, or the
  // first human participant for the assistant-scene group episode.
  let fallback_user = clones.first().cloned().or_else(|| {
    memcell
      .participants
      .iter()
      .find(|p| !is_bot_participant(p))
      .cloned()
  });

  let per_source = join_all(sources.iter().map(|source| {
    let subject_user = source
      .user_id
      .clone()
      .or_else(|| fallback_user.clone())
      .unwrap_or_else(|| "user".to_owned());
    async move {
      let semantic_future = with_retry("semantic_extraction", || {
        extract_semantic_items(memcell, &source.episode_text, &subject_user)
      });
      let event_log_future = with_retry("event_log_extraction", || {
        extract_atomic_facts(memcell, &source.episode_text, &subject_user)
      });
      let (semantic, facts) = tokio::join!(semantic_future, event_log_future);

      let semantic: Vec<SemanticItemDraft> = match semantic {
        Ok(items) => items,
        Err(err) => {
          warn!(episode_id = %source.episode_id, error = %err, "semantic extraction failed");
          Vec::new()
        }
      };
      let facts: Vec<String> = match facts {
        Ok(facts) => facts,
        Err(err) => {
          warn!(episode_id = %source.episode_id, error = %err, "event log extraction failed");
          Vec::new()
        }
      };

      let semantic_texts: Vec<String> = semantic.iter().map(|i| i.content.clone()).collect();
      let semantic_embeddings = embed_or_zero(&semantic_texts).await;
      let fact_embeddings = embed_or_zero(&facts).await;

      (source, semantic, semantic_embeddings, facts, fact_embeddings)
    }
  }));

  let foresight_future = async {
    match (&group_draft, group_embedding.as_ref()) {
      (Some(draft), Some(_)) => {
        let group_episode_id = sources
          .iter()
          .find(|s| s.user_id.is_none())
          .map(|s| s.episode_id)
          .or_else(|| saved_episodics.first().map(|m| m.id));
        match with_retry("foresight_extraction", || {
          extract_foresights(memcell, &draft.episode)
        })
        .await
        {
          Ok(items) => group_episode_id.map(|id| (id, items)),
          Err(err) => {
            warn!(event_id = %memcell.id, error = %err, "foresight extraction failed");
            None
          }
        }
      }
      _ => None,
    }
  };

  let (per_source_results, foresight_result) = tokio::join!(per_source, foresight_future);

  // ── Stage D: attribute and persist ──
  let mut semantic_rows: Vec<NewSemanticMemory> = Vec::new();
  let mut event_logs: Vec<EventLog> = Vec::new();

  for (source, semantic, semantic_embeddings, facts, fact_embeddings) in per_source_results {
    let owners: Vec<String> = match &source.user_id {
      Some(user_id) => vec![user_id.clone()],
      // Assistant scene: the group episode's output materializes once
      // per human participant.
      None => clones.clone(),
    };

    for owner in owners {
      for (item, embedding) in semantic.iter().zip(semantic_embeddings.iter()) {
        semantic_rows.push(NewSemanticMemory {
          parent_event_id: source.episode_id,
          user_id: owner.clone(),
          group_id: memcell.group_id.clone(),
          content: item.content.clone(),
          evidence: item.evidence.clone(),
          start_time: parse_loose_instant(item.start_time.as_deref()),
          end_time: parse_loose_instant(item.end_time.as_deref()),
          duration_days: item.duration_days.and_then(|d| i32::try_from(d).ok()),
          embedding: embedding.clone(),
        });
      }

      if !facts.is_empty() {
        event_logs.push(EventLog {
          parent_event_id: source.episode_id,
          user_id: owner.clone(),
          group_id: memcell.group_id.clone(),
          time: memcell.timestamp,
          atomic_facts: facts.clone(),
          fact_embeddings: fact_embeddings.clone(),
        });
      }
    }
  }

  let foresight_rows: Vec<NewForesight> = match foresight_result {
    Some((group_episode_id, items)) => {
      let texts: Vec<String> = items.iter().map(|i| i.content.clone()).collect();
      let vectors = embed_or_zero(&texts).await;
      items
        .into_iter()
        .zip(vectors.into_iter())
        .map(|(item, embedding): (ForesightDraft, PgVector)| NewForesight {
          parent_event_id: group_episode_id,
          user_id: None,
          group_id: memcell.group_id.clone(),
          content: item.content,
          evidence: item.evidence,
          start_time: parse_loose_instant(item.start_time.as_deref()),
          end_time: parse_loose_instant(item.end_time.as_deref()),
          embedding,
        })
        .collect()
    }
    None => Vec::new(),
  };

  let semantic_count = semantic_rows.len();
  let foresight_count = foresight_rows.len();
  store.save_semantic_batch(semantic_rows).await?;
  let event_log_rows = store.save_event_logs(event_logs).await?;
  store.save_foresight_batch(foresight_rows).await?;

  // ── Stage E: clustering (fire-and-forget) + status ──
  let mut clustered_cell = memcell.clone();
  if let Some(draft) = &group_draft {
    clustered_cell.episode = Some(draft.episode.clone());
    clustered_cell.subject = Some(draft.subject.clone());
  }
  let clusters = Arc::clone(clusters);
  tokio::spawn(async move {
    if let Err(err) = clusters.assign(&clustered_cell).await {
      warn!(event_id = %clustered_cell.id, error = %err, "clustering failed");
    }
  });

  mark_memcell_extracted(&memcell.group_id, memcell.timestamp, store.db()).await?;

  info!(
    event_id = %memcell.id,
    episodes = saved_episodics.len(),
    semantic = semantic_count,
    event_log_facts = event_log_rows.len(),
    foresights = foresight_count,
    "extraction completed"
  );

  Ok(())
}

#[cfg(test)]
mod tests {
  use stratamem_shared::Scene;

  use super::{clone_targets, human_participants, personal_targets};

  fn participants() -> Vec<String> {
    vec!["user_A".to_owned(), "bot_X".to_owned(), "user_B".to_owned()]
  }

  #[test]
  fn assistant_scene_clones_instead_of_extracting() {
    let participants = participants();
    assert!(personal_targets(Scene::Assistant, &participants).is_empty());
    assert_eq!(
      clone_targets(Scene::Assistant, &participants),
      vec!["user_A", "user_B"]
    );
  }

  #[test]
  fn companion_scene_behaves_like_assistant() {
    let participants = participants();
    assert!(personal_targets(Scene::Companion, &participants).is_empty());
    assert_eq!(
      clone_targets(Scene::Companion, &participants),
      vec!["user_A", "user_B"]
    );
  }

  #[test]
  fn group_chat_extracts_per_human_and_never_clones() {
    let participants = participants();
    assert_eq!(
      personal_targets(Scene::GroupChat, &participants),
      vec!["user_A", "user_B"]
    );
    assert!(clone_targets(Scene::GroupChat, &participants).is_empty());
  }

  #[test]
  fn bots_are_excluded_everywhere() {
    let participants = participants();
    assert!(!human_participants(&participants).contains(&"bot_X".to_owned()));
  }
}
