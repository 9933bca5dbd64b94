use schemars::JsonSchema;
use serde::Deserialize;
use stratamem_ai::{
  ChatCompletionRequestMessage, ChatCompletionRequestSystemMessage,
  ChatCompletionRequestUserMessage, generate_object,
};
use stratamem_shared::AppError;

use crate::MemCell;

use super::render_memcell;

/// A prediction or expectation with an optional validity window.
#[derive(Debug, Deserialize, JsonSchema, Clone)]
pub struct ForesightDraft {
  /// The expectation, one sentence.
  pub content: String,
  /// What in the conversation supports it.
  pub evidence: Option<String>,
  /// Start of the window in which it is relevant (RFC 3339 or YYYY-MM-DD).
  pub start_time: Option<String>,
  /// End of the window in which it is relevant (RFC 3339 or YYYY-MM-DD).
  pub end_time: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct ForesightOutput {
  items: Vec<ForesightDraft>,
}

const FORESIGHT_PROMPT: &str = "\
You extract foresights from an episode: things that are planned, \
expected, or likely to happen after this conversation.

Rules:
1. Each foresight is one sentence about the future \
   (\"Bob will present the roadmap next Monday\").
2. Attach the validity window when one is stated or clearly implied: \
   start_time when it becomes relevant, end_time when it expires.
3. Attach evidence quoting or paraphrasing the supporting message.
4. Do not invent plans nobody stated. An empty items array is valid.";

/// Extract foresights from the group episode.
pub async fn extract_foresights(
  memcell: &MemCell,
  episode: &str,
) -> Result<Vec<ForesightDraft>, AppError> {
  let user_content = format!("Episode:\n{episode}\n\nTranscript:\n{}", render_memcell(memcell));

  let system = ChatCompletionRequestSystemMessage::from(FORESIGHT_PROMPT);
  let user = ChatCompletionRequestUserMessage::from(user_content);

  let output = generate_object::<ForesightOutput>(
    vec![
      ChatCompletionRequestMessage::System(system),
      ChatCompletionRequestMessage::User(user),
    ],
    "foresights".to_owned(),
    Some("Future expectations extracted from an episode".to_owned()),
  )
  .await?;

  Ok(output.items)
}
