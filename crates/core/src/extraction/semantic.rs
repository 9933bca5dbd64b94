use schemars::JsonSchema;
use serde::Deserialize;
use stratamem_ai::{
  ChatCompletionRequestMessage, ChatCompletionRequestSystemMessage,
  ChatCompletionRequestUserMessage, generate_object,
};
use stratamem_shared::AppError;

use crate::MemCell;

use super::render_memcell;

/// One long-term fact about a user, as the extraction model emits it.
/// Validity times are strings so the model can answer with bare dates;
/// the worker parses them into instants.
#[derive(Debug, Deserialize, JsonSchema, Clone)]
pub struct SemanticItemDraft {
  /// The fact itself, one natural-language sentence.
  pub content: String,
  /// Quote or paraphrase of the message(s) supporting the fact.
  pub evidence: Option<String>,
  /// When the fact starts holding (RFC 3339 or YYYY-MM-DD).
  pub start_time: Option<String>,
  /// When the fact stops holding (RFC 3339 or YYYY-MM-DD).
  pub end_time: Option<String>,
  /// Expected lifetime in days when no explicit end exists.
  pub duration_days: Option<i64>,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct SemanticExtractionOutput {
  items: Vec<SemanticItemDraft>,
}

const SEMANTIC_PROMPT: &str = "\
You extract long-term facts about one specific user from an episode.

Rules:
1. Only extract facts that will still matter after this conversation: \
   preferences, personal info, relationships, plans, habits, opinions.
2. Ignore transient states (\"I'm hungry now\" is NOT a fact).
3. One self-contained sentence per fact, naming the user as the subject.
4. Attach evidence: a short quote or paraphrase of what supports it.
5. When the fact has a validity window (\"until May\", \"this quarter\"), \
   fill start_time / end_time as dates; otherwise leave them null.
6. No facts to extract is a valid answer: return an empty items array.";

/// Extract semantic facts about `user_id` from the episode narrative
/// plus the underlying transcript.
pub async fn extract_semantic_items(
  memcell: &MemCell,
  episode: &str,
  user_id: &str,
) -> Result<Vec<SemanticItemDraft>, AppError> {
  let user_content = format!(
    "User: {user_id}\n\nEpisode:\n{episode}\n\nTranscript:\n{}",
    render_memcell(memcell)
  );

  let system = ChatCompletionRequestSystemMessage::from(SEMANTIC_PROMPT);
  let user = ChatCompletionRequestUserMessage::from(user_content);

  let output = generate_object::<SemanticExtractionOutput>(
    vec![
      ChatCompletionRequestMessage::System(system),
      ChatCompletionRequestMessage::User(user),
    ],
    "semantic_facts".to_owned(),
    Some("Long-term facts about one user from an episode".to_owned()),
  )
  .await?;

  Ok(output.items)
}
