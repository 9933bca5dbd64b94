use std::fmt::Write;

use futures::future::join_all;
use schemars::JsonSchema;
use serde::Deserialize;
use stratamem_ai::{
  ChatCompletionRequestMessage, ChatCompletionRequestSystemMessage,
  ChatCompletionRequestUserMessage, LlmConfig, generate_object_with,
};
use stratamem_shared::AppError;
use tracing::{debug, warn};

use super::fusion::{RetrievedMemory, merge_dedupe};
use super::{
  DataSource, LightweightParams, RetrievalEngine, RetrievalMetadata, RetrievalMode,
  RetrievalResult,
};

/// Upper bound on LLM-refined follow-up queries.
const MAX_REFINED: usize = 3;

#[derive(Debug, Clone)]
pub struct AgenticParams {
  pub query: String,
  pub user_id: Option<String>,
  pub group_id: Option<String>,
  pub time_range_days: Option<i64>,
  pub top_k: usize,
  pub data_source: DataSource,
  pub llm: LlmConfig,
}

// ──────────────────────────────────────────────────
// LLM payloads
// ──────────────────────────────────────────────────

#[derive(Debug, Deserialize, JsonSchema)]
struct RerankOutput {
  /// 1-based positions of the presented memories, most relevant first.
  ordered: Vec<i64>,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct SufficiencyOutput {
  /// Whether the retrieved memories can answer the query.
  is_sufficient: bool,
  reasoning: String,
  /// Follow-up queries to run when insufficient; empty otherwise.
  refined_queries: Vec<String>,
}

const RERANK_PROMPT: &str = "\
You rerank retrieved memories by relevance to a query.

Return the 1-based positions of the memories, most relevant first. \
Include every position exactly once.";

const SUFFICIENCY_PROMPT: &str = "\
You judge whether a set of retrieved memories suffices to answer a query.

If the memories already contain the needed information, set \
is_sufficient true and leave refined_queries empty. If something is \
missing, set it false and propose up to three refined queries that \
would surface the missing information — more specific wordings, \
synonyms, or adjacent facets of the original question.";

fn render_memories(memories: &[RetrievedMemory]) -> String {
  let mut out = String::new();
  for (index, memory) in memories.iter().enumerate() {
    let _ = writeln!(out, "[{}] {}", index + 1, memory.content);
  }
  out
}

/// Apply an LLM ordering, tolerating bad indices: unknown positions are
/// dropped, missing ones are appended in their original order.
fn apply_order(memories: Vec<RetrievedMemory>, ordered: &[i64]) -> Vec<RetrievedMemory> {
  let mut slots: Vec<Option<RetrievedMemory>> = memories.into_iter().map(Some).collect();
  let mut result = Vec::with_capacity(slots.len());

  for &position in ordered {
    if position >= 1 && (position as usize) <= slots.len() {
      if let Some(memory) = slots[position as usize - 1].take() {
        result.push(memory);
      }
    }
  }
  for slot in slots {
    if let Some(memory) = slot {
      result.push(memory);
    }
  }
  result
}

async fn rerank(
  llm: &LlmConfig,
  query: &str,
  memories: Vec<RetrievedMemory>,
) -> Vec<RetrievedMemory> {
  if memories.len() < 2 {
    return memories;
  }

  let system = ChatCompletionRequestSystemMessage::from(RERANK_PROMPT);
  let user = ChatCompletionRequestUserMessage::from(format!(
    "Query: {query}\n\nMemories:\n{}",
    render_memories(&memories)
  ));

  match generate_object_with::<RerankOutput>(
    llm,
    vec![
      ChatCompletionRequestMessage::System(system),
      ChatCompletionRequestMessage::User(user),
    ],
    "rerank".to_owned(),
    Some("Relevance ordering of retrieved memories".to_owned()),
  )
  .await
  {
    Ok(output) => apply_order(memories, &output.ordered),
    // A failed rerank keeps the fused order.
    Err(err) => {
      warn!(error = %err, "rerank failed, keeping fused order");
      memories
    }
  }
}

// ──────────────────────────────────────────────────
// Multi-round loop
// ──────────────────────────────────────────────────

pub(crate) async fn run(
  engine: &RetrievalEngine,
  params: &AgenticParams,
) -> Result<RetrievalResult, AppError> {
  let started = std::time::Instant::now();

  let lightweight = |query: String| LightweightParams {
    query: Some(query),
    user_id: params.user_id.clone(),
    group_id: params.group_id.clone(),
    time_range_days: params.time_range_days,
    top_k: params.top_k,
    retrieval_mode: RetrievalMode::Rrf,
    data_source: params.data_source,
    current_time: None,
    radius: None,
  };

  // Round 1: fused retrieval, then rerank.
  let round1 = engine
    .retrieve_lightweight(&lightweight(params.query.clone()))
    .await?;
  let round1_count = round1.count;
  let memories = rerank(&params.llm, &params.query, round1.memories).await;

  // Judge sufficiency.
  let system = ChatCompletionRequestSystemMessage::from(SUFFICIENCY_PROMPT);
  let user = ChatCompletionRequestUserMessage::from(format!(
    "Query: {}\n\nRetrieved memories:\n{}",
    params.query,
    render_memories(&memories)
  ));
  let judgement = match generate_object_with::<SufficiencyOutput>(
    &params.llm,
    vec![
      ChatCompletionRequestMessage::System(system),
      ChatCompletionRequestMessage::User(user),
    ],
    "retrieval_sufficiency".to_owned(),
    Some("Sufficiency judgement over retrieved memories".to_owned()),
  )
  .await
  {
    Ok(judgement) => judgement,
    // Without a judgement, round 1 stands.
    Err(err) => {
      warn!(error = %err, "sufficiency judgement failed, returning round 1");
      SufficiencyOutput {
        is_sufficient: true,
        reasoning: "judgement unavailable".to_owned(),
        refined_queries: Vec::new(),
      }
    }
  };

  let refined: Vec<String> = judgement
    .refined_queries
    .iter()
    .filter(|q| !q.trim().is_empty())
    .take(MAX_REFINED)
    .cloned()
    .collect();

  let mut metadata = RetrievalMetadata {
    retrieval_mode: "agentic".to_owned(),
    is_multi_round: Some(false),
    is_sufficient: Some(judgement.is_sufficient),
    reasoning: Some(judgement.reasoning),
    round1_count: Some(round1_count),
    ..RetrievalMetadata::default()
  };

  if judgement.is_sufficient || refined.is_empty() {
    let mut memories = memories;
    memories.truncate(params.top_k);
    metadata.final_count = memories.len();
    metadata.total_latency_ms = started.elapsed().as_secs_f64() * 1000.0;
    return Ok(RetrievalResult {
      count: memories.len(),
      memories,
      metadata,
    });
  }

  debug!(queries = ?refined, "running refined retrieval round");

  // Round 2: refined queries in parallel, merged with round 1.
  let refined_params: Vec<LightweightParams> =
    refined.iter().map(|query| lightweight(query.clone())).collect();
  let round2_results = join_all(
    refined_params
      .iter()
      .map(|params| engine.retrieve_lightweight(params)),
  )
  .await;

  let mut sets = vec![memories];
  let mut round2_count = 0;
  for result in round2_results {
    match result {
      Ok(result) => {
        round2_count += result.count;
        sets.push(result.memories);
      }
      Err(err) => warn!(error = %err, "refined query failed"),
    }
  }

  let merged = merge_dedupe(sets);
  let mut memories = rerank(&params.llm, &params.query, merged).await;
  memories.truncate(params.top_k);

  metadata.is_multi_round = Some(true);
  metadata.refined_queries = Some(refined);
  metadata.round2_count = Some(round2_count);
  metadata.final_count = memories.len();
  metadata.total_latency_ms = started.elapsed().as_secs_f64() * 1000.0;

  Ok(RetrievalResult {
    count: memories.len(),
    memories,
    metadata,
  })
}

#[cfg(test)]
mod tests {
  use chrono::Utc;
  use uuid::Uuid;

  use super::*;

  fn memory(id: u128) -> RetrievedMemory {
    RetrievedMemory {
      id: Uuid::from_u128(id),
      memory_type: "episode".to_owned(),
      user_id: None,
      group_id: "g".to_owned(),
      timestamp: Utc::now(),
      subject: None,
      content: format!("m{id}"),
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
  fn apply_order_reorders_by_position() {
    let ordered = apply_order(vec![memory(1), memory(2), memory(3)], &[3, 1, 2]);
    let ids: Vec<Uuid> = ordered.iter().map(|m| m.id).collect();
    assert_eq!(
      ids,
      vec![Uuid::from_u128(3), Uuid::from_u128(1), Uuid::from_u128(2)]
    );
  }

  #[test]
  fn apply_order_tolerates_bad_and_missing_positions() {
    // 0 and 7 are invalid, 2 never mentioned: it is appended at the end.
    let ordered = apply_order(vec![memory(1), memory(2), memory(3)], &[0, 3, 7, 1, 3]);
    let ids: Vec<Uuid> = ordered.iter().map(|m| m.id).collect();
    assert_eq!(
      ids,
      vec![Uuid::from_u128(3), Uuid::from_u128(1), Uuid::from_u128(2)]
    );
  }
}
